//! AppState：编辑会话核心状态（当前文档、当前表格、未保存标记）

use serde::Serialize;
use thiserror::Error;

use crate::model::access::{ConflictPolicy, WriteError};
use crate::model::discovery::{table_name, TableDescriptor};
use crate::model::grid::SheetDocument;
use crate::model::node::Node;
use crate::model::path::{Path, PathError, Step};
use crate::utils::fs::{DocumentStore, LoadedDocument, StorageError, StoredFile};
use crate::vm::bridge::{
    get_view, list_tables, nested_view, ItemSelector, NestedView, Source, TableEditor, TableView,
};

#[derive(Error, Debug)]
pub enum AppError {
    #[error(transparent)]
    Storage(#[from] StorageError),
    #[error("路径错误: {0}")]
    Path(#[from] PathError),
    #[error("写入失败: {0}")]
    Write(#[from] WriteError),
    #[error("状态错误: {0}")]
    State(String),
}

/// 已打开的文件
#[derive(Debug)]
struct OpenFile {
    identifier: String,
    source: Source,
    current: Option<Path>,
    dirty: bool,
}

/// 返回给表现层的整页数据（文件、工作表列表、当前视图）
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SheetPayload {
    pub identifier: String,
    pub tables: Vec<String>,
    pub current_table: Option<String>,
    #[serde(flatten)]
    pub view: TableView,
    pub dirty: bool,
}

pub struct AppState<S> {
    store: S,
    editor: TableEditor,
    open: Option<OpenFile>,
}

impl<S: DocumentStore> AppState<S> {
    pub fn new(store: S, policy: ConflictPolicy) -> Self {
        Self {
            store,
            editor: TableEditor::new(policy),
            open: None,
        }
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn list_files(&self) -> Result<Vec<StoredFile>, AppError> {
        Ok(self.store.list()?)
    }

    pub fn upload(&self, original_name: &str, bytes: &[u8]) -> Result<StoredFile, AppError> {
        Ok(self.store.store_upload(original_name, bytes)?)
    }

    /// 加载文件并选中表格；`table` 缺省时选中第一个表格
    ///
    /// JSON 文档中找不到指定表格时报错；工作簿中未知或隐藏的工作表回退到首个可见表。
    pub fn open(&mut self, identifier: &str, table: Option<&str>) -> Result<(), AppError> {
        let source = match self.store.load(identifier)? {
            LoadedDocument::Json(doc) => Source::Json(doc),
            LoadedDocument::Workbook(book) => Source::Sheets(SheetDocument::from_workbook(&book)),
        };
        let tables = list_tables(&source);
        let requested = match table {
            Some(text) => Some(table_path(&source, text)?),
            None => None,
        };
        let current = match requested {
            Some(path) if tables.iter().any(|t| t.path == path) => Some(path),
            Some(path) if matches!(source, Source::Json(_)) => {
                return Err(AppError::State(format!("表格不存在: {}", table_name(&path))));
            }
            _ => tables.first().map(|t| t.path.clone()),
        };
        tracing::info!(
            "文件加载成功: {}，{} 个表格，当前: {}",
            identifier,
            tables.len(),
            current.as_ref().map(table_name).unwrap_or_default()
        );
        self.open = Some(OpenFile {
            identifier: identifier.to_string(),
            source,
            current,
            dirty: false,
        });
        Ok(())
    }

    fn file(&self) -> Result<&OpenFile, AppError> {
        self.open
            .as_ref()
            .ok_or_else(|| AppError::State("文档尚未加载".into()))
    }

    fn file_mut(&mut self) -> Result<&mut OpenFile, AppError> {
        self.open
            .as_mut()
            .ok_or_else(|| AppError::State("文档尚未加载".into()))
    }

    fn current(&self) -> Result<(&OpenFile, &Path), AppError> {
        let file = self.file()?;
        let path = file
            .current
            .as_ref()
            .ok_or_else(|| AppError::State("没有可编辑的表格".into()))?;
        Ok((file, path))
    }

    pub fn document(&self) -> Result<&Node, AppError> {
        Ok(self.file()?.source.root())
    }

    pub fn is_dirty(&self) -> bool {
        self.open.as_ref().is_some_and(|f| f.dirty)
    }

    pub fn current_table(&self) -> Option<&Path> {
        self.open.as_ref().and_then(|f| f.current.as_ref())
    }

    pub fn tables(&self) -> Result<Vec<TableDescriptor>, AppError> {
        Ok(list_tables(&self.file()?.source))
    }

    /// 按文本解析表格：JSON 先匹配表格列表中的标签，再按路径解析；工作簿为工作表名
    pub fn resolve_table(&self, text: &str) -> Result<Path, AppError> {
        table_path(&self.file()?.source, text)
    }

    pub fn view(&self) -> Result<TableView, AppError> {
        let file = self.file()?;
        Ok(match &file.current {
            Some(path) => get_view(&file.source, path),
            None => get_view(&file.source, &Path::root()),
        })
    }

    pub fn payload(&self) -> Result<SheetPayload, AppError> {
        let file = self.file()?;
        Ok(SheetPayload {
            identifier: file.identifier.clone(),
            tables: list_tables(&file.source).iter().map(TableDescriptor::name).collect(),
            current_table: file.current.as_ref().map(table_name),
            view: self.view()?,
            dirty: file.dirty,
        })
    }

    pub fn nested(&self, row: usize, nested_path: &Path) -> Result<NestedView, AppError> {
        let (file, table) = self.current()?;
        Ok(nested_view(file.source.root(), table, row, nested_path))
    }

    /// 切换表格；有未保存修改时先自动保存，保存失败则不切换
    pub fn select_table(&mut self, path: Path) -> Result<(), AppError> {
        let file = self.file()?;
        if file.current.as_ref() == Some(&path) {
            return Ok(());
        }
        if !list_tables(&file.source).iter().any(|t| t.path == path) {
            return Err(AppError::State(format!("表格不存在: {}", table_name(&path))));
        }
        if file.dirty {
            tracing::info!(
                "切换表格前自动保存: {}",
                file.current.as_ref().map(table_name).unwrap_or_default()
            );
            if let Err(e) = self.save() {
                tracing::error!("自动保存失败，取消切换: {}", e);
                return Err(e);
            }
        }
        self.file_mut()?.current = Some(path);
        Ok(())
    }

    /// 保存：JSON 整份覆盖；工作簿只覆盖当前工作表
    pub fn save(&mut self) -> Result<(), AppError> {
        let file = self.file()?;
        match &file.source {
            Source::Json(doc) => self.store.persist_json(&file.identifier, doc)?,
            Source::Sheets(sheets) => {
                let (_, table) = self.current()?;
                let sheet = match table.steps() {
                    [Step::Key(name)] => name.as_str(),
                    _ => return Err(AppError::State(format!("不是工作表路径: {}", table))),
                };
                let grid = sheets
                    .to_grid(sheet)
                    .ok_or_else(|| AppError::State(format!("工作表不存在: {}", sheet)))?;
                self.store.persist_sheet(&file.identifier, sheet, &grid)?;
            }
        }
        self.file_mut()?.dirty = false;
        Ok(())
    }

    fn apply<F>(&mut self, edit: F) -> Result<(), AppError>
    where
        F: FnOnce(&TableEditor, &Node, &Path) -> Result<Node, WriteError>,
    {
        let (file, table) = self.current()?;
        let updated = edit(&self.editor, file.source.root(), table)?;
        let unchanged = updated.ptr_eq(file.source.root());
        let file = self.file_mut()?;
        if !unchanged {
            file.source.replace_root(updated);
            file.dirty = true;
        }
        Ok(())
    }

    pub fn set_cell(&mut self, row: usize, header: &str, value: impl Into<Node>) -> Result<(), AppError> {
        let value = value.into();
        self.apply(|editor, doc, table| editor.set_cell(doc, table, row, header, value))
    }

    /// 追加空行，字段取当前视图的表头
    pub fn add_row(&mut self) -> Result<(), AppError> {
        let headers = self.view()?.view.headers;
        self.apply(|editor, doc, table| editor.add_row(doc, table, &headers))
    }

    pub fn delete_row(&mut self, row: usize) -> Result<(), AppError> {
        self.apply(|editor, doc, table| editor.delete_row(doc, table, row))
    }

    pub fn set_nested_cell(
        &mut self,
        row: usize,
        nested_path: &Path,
        item: ItemSelector,
        nested_header: &str,
        value: impl Into<Node>,
    ) -> Result<(), AppError> {
        let value = value.into();
        self.apply(|editor, doc, table| {
            editor.set_nested_cell(doc, table, row, nested_path, item, nested_header, value)
        })
    }

    pub fn add_nested_row(&mut self, row: usize, nested_path: &Path) -> Result<(), AppError> {
        self.apply(|editor, doc, table| editor.add_nested_row(doc, table, row, nested_path))
    }

    pub fn delete_nested_row(&mut self, row: usize, nested_path: &Path, item_index: usize) -> Result<(), AppError> {
        self.apply(|editor, doc, table| editor.delete_nested_row(doc, table, row, nested_path, item_index))
    }
}

fn table_path(source: &Source, text: &str) -> Result<Path, AppError> {
    match source {
        Source::Json(_) => match list_tables(source).into_iter().find(|t| t.name() == text) {
            Some(table) => Ok(table.path),
            None => Ok(Path::parse(text)?),
        },
        Source::Sheets(_) => Ok(Path::root().child_key(text)),
    }
}
