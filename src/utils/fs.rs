//! IO helper: content directory store and safe file read/write for JSON

use std::fs::{self, File};
use std::io::{BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};

use serde::Serialize;
use thiserror::Error;

use crate::model::grid::{GridModel, Workbook};
use crate::model::node::Node;

#[derive(Error, Debug)]
pub enum StorageError {
    #[error("IO失败: {0}")]
    Io(#[from] std::io::Error),
    #[error("JSON解析失败: {0}")]
    Parse(#[from] serde_json::Error),
    #[error("文件不存在: {0}")]
    NotFound(String),
    #[error("不支持的文件类型: {0}")]
    Unsupported(String),
    #[error("工作簿读写失败: {0}")]
    Workbook(String),
}

/// 加载结果：JSON 文档或工作簿
#[derive(Debug, Clone, PartialEq)]
pub enum LoadedDocument {
    Json(Node),
    Workbook(Workbook),
}

/// 内容目录中的一个文件
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StoredFile {
    pub display_name: String,
    pub identifier: String,
}

/// 外部存储协作者：加载、整份覆盖保存、枚举
pub trait DocumentStore {
    fn list(&self) -> Result<Vec<StoredFile>, StorageError>;
    fn load(&self, identifier: &str) -> Result<LoadedDocument, StorageError>;
    fn persist_json(&self, identifier: &str, doc: &Node) -> Result<(), StorageError>;
    /// 只覆盖指定工作表，其余工作表保持不变
    fn persist_sheet(&self, identifier: &str, sheet: &str, grid: &GridModel) -> Result<(), StorageError>;
    fn store_upload(&self, original_name: &str, bytes: &[u8]) -> Result<StoredFile, StorageError>;
}

/// 从文件读取JSON数据
pub fn read_json_file(p: &Path) -> Result<Node, StorageError> {
    let f = File::open(p)?;
    let rdr = BufReader::new(f);
    let v: serde_json::Value = serde_json::from_reader(rdr)?;
    Ok(Node::from(v))
}

/// 将JSON数据保存到文件
pub fn write_json_file(p: &Path, doc: &Node, pretty: bool) -> Result<(), StorageError> {
    let mut w = BufWriter::new(File::create(p)?);
    if pretty {
        serde_json::to_writer_pretty(&mut w, doc)?;
    } else {
        serde_json::to_writer(&mut w, doc)?;
    }
    w.flush()?;
    Ok(())
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum FileFormat {
    Json,
    Workbook,
}

fn format_of(identifier: &str) -> Option<FileFormat> {
    let ext = Path::new(identifier)
        .extension()?
        .to_str()?
        .to_ascii_lowercase();
    match ext.as_str() {
        "json" => Some(FileFormat::Json),
        "xlsx" | "xlsm" | "xlsb" | "xls" | "ods" => Some(FileFormat::Workbook),
        _ => None,
    }
}

/// 上传文件名：`<毫秒时间戳>-<原文件名>`，去掉路径部分
pub fn upload_file_name(original_name: &str, now: SystemTime) -> String {
    let millis = now
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis())
        .unwrap_or_default();
    let base = Path::new(original_name)
        .file_name()
        .and_then(|n| n.to_str())
        .unwrap_or("upload");
    format!("{}-{}", millis, base)
}

/// 以文件名为键的内容目录
#[derive(Debug, Clone)]
pub struct ContentDir {
    root: PathBuf,
    pretty_json: bool,
}

impl ContentDir {
    pub fn new(root: impl Into<PathBuf>, pretty_json: bool) -> Self {
        Self {
            root: root.into(),
            pretty_json,
        }
    }

    /// 目录不存在时创建
    pub fn open(root: impl Into<PathBuf>, pretty_json: bool) -> Result<Self, StorageError> {
        let dir = Self::new(root, pretty_json);
        fs::create_dir_all(&dir.root)?;
        Ok(dir)
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// 标识符只能是目录内的文件名
    fn resolve(&self, identifier: &str) -> Result<PathBuf, StorageError> {
        let name = Path::new(identifier);
        if name.file_name().map(Path::new) != Some(name) {
            return Err(StorageError::NotFound(identifier.to_string()));
        }
        Ok(self.root.join(name))
    }

    fn existing(&self, identifier: &str) -> Result<PathBuf, StorageError> {
        let path = self.resolve(identifier)?;
        if !path.is_file() {
            return Err(StorageError::NotFound(identifier.to_string()));
        }
        Ok(path)
    }
}

/// 去掉上传时间戳前缀后的显示名
fn display_name_of(identifier: &str) -> String {
    match identifier.split_once('-') {
        Some((stamp, rest)) if !rest.is_empty() && stamp.chars().all(|c| c.is_ascii_digit()) => {
            rest.to_string()
        }
        _ => identifier.to_string(),
    }
}

impl DocumentStore for ContentDir {
    fn list(&self) -> Result<Vec<StoredFile>, StorageError> {
        let mut out = Vec::new();
        for entry in fs::read_dir(&self.root)? {
            let entry = entry?;
            if !entry.file_type()?.is_file() {
                continue;
            }
            let Some(identifier) = entry.file_name().to_str().map(str::to_string) else {
                continue;
            };
            if format_of(&identifier).is_none() {
                continue;
            }
            out.push(StoredFile {
                display_name: display_name_of(&identifier),
                identifier,
            });
        }
        out.sort_by(|a, b| a.identifier.cmp(&b.identifier));
        Ok(out)
    }

    fn load(&self, identifier: &str) -> Result<LoadedDocument, StorageError> {
        let format = format_of(identifier)
            .ok_or_else(|| StorageError::Unsupported(identifier.to_string()))?;
        let path = self.existing(identifier)?;
        match format {
            FileFormat::Json => Ok(LoadedDocument::Json(read_json_file(&path)?)),
            FileFormat::Workbook => load_workbook(&path).map(LoadedDocument::Workbook),
        }
    }

    fn persist_json(&self, identifier: &str, doc: &Node) -> Result<(), StorageError> {
        let path = self.resolve(identifier)?;
        write_json_file(&path, doc, self.pretty_json)?;
        tracing::info!("JSON文件已保存到: {}", path.display());
        Ok(())
    }

    fn persist_sheet(&self, identifier: &str, sheet: &str, grid: &GridModel) -> Result<(), StorageError> {
        let path = self.existing(identifier)?;
        let mut book = load_workbook(&path)?;
        if !book.replace_grid(sheet, grid.clone()) {
            tracing::warn!("工作簿 {} 中不存在工作表 `{}`，已追加", identifier, sheet);
        }
        save_workbook(&path, &book)?;
        tracing::info!("工作表 `{}` 已保存到: {}", sheet, path.display());
        Ok(())
    }

    fn store_upload(&self, original_name: &str, bytes: &[u8]) -> Result<StoredFile, StorageError> {
        let identifier = upload_file_name(original_name, SystemTime::now());
        if format_of(&identifier).is_none() {
            return Err(StorageError::Unsupported(original_name.to_string()));
        }
        let path = self.resolve(&identifier)?;
        fs::write(&path, bytes)?;
        tracing::info!("上传文件已存储: {} ({} 字节)", path.display(), bytes.len());
        Ok(StoredFile {
            display_name: display_name_of(&identifier),
            identifier,
        })
    }
}

#[cfg(feature = "xlsx")]
fn load_workbook(path: &Path) -> Result<Workbook, StorageError> {
    crate::utils::xlsx::read_workbook(path)
}

#[cfg(feature = "xlsx")]
fn save_workbook(path: &Path, book: &Workbook) -> Result<(), StorageError> {
    crate::utils::xlsx::write_workbook(path, book)
}

#[cfg(not(feature = "xlsx"))]
fn load_workbook(path: &Path) -> Result<Workbook, StorageError> {
    Err(StorageError::Unsupported(format!(
        "{}（未启用 xlsx 功能）",
        path.display()
    )))
}

#[cfg(not(feature = "xlsx"))]
fn save_workbook(path: &Path, _book: &Workbook) -> Result<(), StorageError> {
    Err(StorageError::Unsupported(format!(
        "{}（未启用 xlsx 功能）",
        path.display()
    )))
}
