//! 表格发现（网格）：在稀疏单元格网格中定位表头行，并把下方各行投影为记录
//!
//! 工作簿编码本身是黑盒（见 `utils::xlsx`），这里只处理解码后的
//! “已用区域 + 稀疏单元格”模型。

use std::collections::BTreeMap;

use serde::Serialize;

use crate::model::node::{Node, ObjectMap};

/// 判定表头行所需的最少有内容单元格数（固定策略，不可配置）
pub const MIN_HEADER_CELLS: usize = 2;

/// 单元格坐标，行列均从 0 开始；按行优先排序
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub struct CellRef {
    pub row: u32,
    pub col: u32,
}

impl CellRef {
    pub const fn new(row: u32, col: u32) -> Self {
        Self { row, col }
    }
}

/// 已用区域（闭区间，start 不大于 end）
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct UsedRange {
    pub start: CellRef,
    pub end: CellRef,
}

impl UsedRange {
    pub fn new(a: CellRef, b: CellRef) -> Self {
        Self {
            start: CellRef::new(a.row.min(b.row), a.col.min(b.col)),
            end: CellRef::new(a.row.max(b.row), a.col.max(b.col)),
        }
    }

    fn include(self, cell: CellRef) -> Self {
        Self {
            start: CellRef::new(self.start.row.min(cell.row), self.start.col.min(cell.col)),
            end: CellRef::new(self.end.row.max(cell.row), self.end.col.max(cell.col)),
        }
    }
}

/// 稀疏网格：未填充的单元格不存在于映射中
#[derive(Debug, Clone, Default, PartialEq)]
pub struct GridModel {
    range: Option<UsedRange>,
    cells: BTreeMap<CellRef, Node>,
}

impl GridModel {
    pub fn new() -> Self {
        Self::default()
    }

    /// 由逐行数据构建；`null` 视为未填充。区域覆盖全部行与最宽的一行
    pub fn from_rows<R, V>(rows: R) -> Self
    where
        R: IntoIterator<Item = Vec<V>>,
        V: Into<Node>,
    {
        let mut grid = GridModel::new();
        let mut height = 0u32;
        let mut width = 0u32;
        for (r, row) in rows.into_iter().enumerate() {
            height = r as u32 + 1;
            width = width.max(row.len() as u32);
            for (c, value) in row.into_iter().enumerate() {
                let value = value.into();
                if value != Node::Null {
                    grid.cells.insert(CellRef::new(r as u32, c as u32), value);
                }
            }
        }
        if !grid.cells.is_empty() {
            grid.range = Some(UsedRange::new(
                CellRef::new(0, 0),
                CellRef::new(height - 1, width.saturating_sub(1)),
            ));
        }
        grid
    }

    /// 声明已用区域（解码器报告的区域可能大于实际填充的单元格）
    pub fn with_range(mut self, range: UsedRange) -> Self {
        self.range = Some(range);
        self
    }

    pub fn range(&self) -> Option<UsedRange> {
        self.range
    }

    pub fn get(&self, cell: CellRef) -> Option<&Node> {
        self.cells.get(&cell)
    }

    /// 填充单元格并扩展已用区域
    pub fn set(&mut self, cell: CellRef, value: Node) {
        self.range = Some(match self.range {
            Some(range) => range.include(cell),
            None => UsedRange::new(cell, cell),
        });
        self.cells.insert(cell, value);
    }

    pub fn cells(&self) -> impl Iterator<Item = (CellRef, &Node)> {
        self.cells.iter().map(|(k, v)| (*k, v))
    }

    pub fn is_empty(&self) -> bool {
        self.cells.is_empty()
    }

    /// 按表头与记录重建网格：第 0 行为表头，其后每条记录一行
    ///
    /// 没有表头时得到空网格；复合值按 JSON 文本写入单元格。
    pub fn from_table(headers: &[String], records: &[Node]) -> Self {
        let mut grid = GridModel::new();
        if headers.is_empty() {
            return grid;
        }
        for (c, header) in headers.iter().enumerate() {
            grid.set(CellRef::new(0, c as u32), Node::String(header.clone()));
        }
        for (r, record) in records.iter().enumerate() {
            let Some(fields) = record.as_object() else {
                continue;
            };
            for (c, header) in headers.iter().enumerate() {
                let cell = CellRef::new(r as u32 + 1, c as u32);
                match fields.get(header) {
                    None | Some(Node::Null) => {}
                    Some(value) if value.is_scalar() => grid.set(cell, value.clone()),
                    Some(compound) => grid.set(cell, Node::String(compound.display_text())),
                }
            }
        }
        grid
    }
}

/// 网格中发现的表格
#[derive(Debug, Clone, Default, PartialEq)]
pub struct GridTable {
    /// 表头行的绝对行号；没有达到阈值的行时为 `None`
    pub header_row: Option<u32>,
    pub headers: Vec<String>,
    pub records: Vec<Node>,
}

/// 自上而下扫描，首个有内容单元格数不少于 [`MIN_HEADER_CELLS`] 的行为表头行
///
/// 表头以下每行按同列表头投影为记录，未填充单元格取空字符串；
/// 全部为空字符串的记录被丢弃。表头重复时右侧的列覆盖左侧的值。
pub fn detect_table(grid: &GridModel) -> GridTable {
    let Some(range) = grid.range() else {
        return GridTable::default();
    };
    let cols = range.start.col..=range.end.col;

    let header_row = (range.start.row..=range.end.row).find(|&r| {
        cols.clone()
            .filter(|&c| grid.get(CellRef::new(r, c)).is_some_and(Node::is_truthy))
            .count()
            >= MIN_HEADER_CELLS
    });
    let Some(header_row) = header_row else {
        tracing::debug!("没有任何行达到 {} 个有内容单元格，表格为空", MIN_HEADER_CELLS);
        return GridTable::default();
    };

    let headers: Vec<String> = cols
        .clone()
        .map(|c| {
            grid.get(CellRef::new(header_row, c))
                .map(Node::display_text)
                .unwrap_or_default()
        })
        .collect();

    let mut records = Vec::new();
    for r in header_row + 1..=range.end.row {
        let mut fields = ObjectMap::with_capacity(headers.len());
        for (c, header) in cols.clone().zip(&headers) {
            let value = grid
                .get(CellRef::new(r, c))
                .cloned()
                .unwrap_or_else(Node::empty_default);
            fields.insert(header.clone(), value);
        }
        if fields.values().all(Node::is_empty_default) {
            continue;
        }
        records.push(Node::object(fields));
    }

    GridTable {
        header_row: Some(header_row),
        headers,
        records,
    }
}

/// 工作簿中的一张工作表
#[derive(Debug, Clone, PartialEq)]
pub struct Sheet {
    pub name: String,
    pub visible: bool,
    pub grid: GridModel,
}

impl Sheet {
    pub fn new(name: impl Into<String>, grid: GridModel) -> Self {
        Self {
            name: name.into(),
            visible: true,
            grid,
        }
    }

    pub fn hidden(mut self) -> Self {
        self.visible = false;
        self
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Workbook {
    pub sheets: Vec<Sheet>,
}

impl Workbook {
    pub fn new(sheets: Vec<Sheet>) -> Self {
        Self { sheets }
    }

    /// 可见工作表名称（隐藏表不出现在工作表列表中）
    pub fn visible_names(&self) -> Vec<&str> {
        self.sheets
            .iter()
            .filter(|s| s.visible)
            .map(|s| s.name.as_str())
            .collect()
    }

    pub fn sheet(&self, name: &str) -> Option<&Sheet> {
        self.sheets.iter().find(|s| s.name == name)
    }

    /// 按名称选择可见工作表；名称未知或为隐藏表时回退到首个可见表
    pub fn resolve(&self, requested: Option<&str>) -> Option<&Sheet> {
        let visible = || self.sheets.iter().filter(|s| s.visible);
        requested
            .and_then(|name| visible().find(|s| s.name == name))
            .or_else(|| visible().next())
    }

    /// 整表覆盖；不存在时追加新表。返回是否覆盖了已有表
    pub fn replace_grid(&mut self, name: &str, grid: GridModel) -> bool {
        match self.sheets.iter_mut().find(|s| s.name == name) {
            Some(sheet) => {
                sheet.grid = grid;
                true
            }
            None => {
                self.sheets.push(Sheet::new(name, grid));
                false
            }
        }
    }
}

/// 工作簿的表格投影：根对象下每个可见工作表对应一个记录数组
///
/// 编辑操作与 JSON 文档共用同一套读写器；保存时用表头与记录重建网格。
#[derive(Debug, Clone, PartialEq)]
pub struct SheetDocument {
    pub root: Node,
    headers: Vec<(String, Vec<String>)>,
}

impl SheetDocument {
    pub fn from_workbook(book: &Workbook) -> Self {
        let mut root = ObjectMap::new();
        let mut headers = Vec::new();
        for sheet in book.sheets.iter().filter(|s| s.visible) {
            let table = detect_table(&sheet.grid);
            tracing::debug!(
                "工作表 `{}`: 表头行 {:?}，{} 列，{} 条记录",
                sheet.name,
                table.header_row,
                table.headers.len(),
                table.records.len()
            );
            root.insert(sheet.name.clone(), Node::array(table.records));
            headers.push((sheet.name.clone(), table.headers));
        }
        Self {
            root: Node::object(root),
            headers,
        }
    }

    pub fn sheet_names(&self) -> impl Iterator<Item = &str> {
        self.headers.iter().map(|(name, _)| name.as_str())
    }

    pub fn headers(&self, sheet: &str) -> Option<&[String]> {
        self.headers
            .iter()
            .find(|(name, _)| name == sheet)
            .map(|(_, h)| h.as_slice())
    }

    /// 当前记录重建的整表网格（用于保存）
    pub fn to_grid(&self, sheet: &str) -> Option<GridModel> {
        let headers = self.headers(sheet)?;
        let records = self
            .root
            .as_object()
            .and_then(|m| m.get(sheet))
            .and_then(Node::as_array)
            .unwrap_or_default();
        Some(GridModel::from_table(headers, records))
    }
}
