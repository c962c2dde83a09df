//! 工作簿编解码（黑盒）：calamine 读取，rust_xlsxwriter 整簿重写
//!
//! 只搬运单元格的原始值；样式、公式与合并区域不保留。

use std::path::Path;

use calamine::{open_workbook_auto, Data, Reader, SheetType, SheetVisible};
use rust_xlsxwriter::{Workbook as XlsxWorkbook, XlsxError};

use crate::model::grid::{CellRef, GridModel, Sheet, UsedRange, Workbook};
use crate::model::node::Node;
use crate::utils::fs::StorageError;

fn xlsx_err(e: XlsxError) -> StorageError {
    StorageError::Workbook(e.to_string())
}

/// 整数值的浮点数按整数保存，表头 `1.0` 显示为 `1`
fn number(f: f64) -> Node {
    if f.fract() == 0.0 && f.abs() < 9.0e15 {
        Node::from(f as i64)
    } else {
        Node::from(f)
    }
}

fn cell_value(data: &Data) -> Option<Node> {
    match data {
        Data::Empty => None,
        Data::String(s) => Some(Node::String(s.clone())),
        Data::Float(f) => Some(number(*f)),
        Data::Int(i) => Some(Node::from(*i)),
        Data::Bool(b) => Some(Node::Bool(*b)),
        Data::DateTime(dt) => Some(number(dt.as_f64())),
        Data::DateTimeIso(s) | Data::DurationIso(s) => Some(Node::String(s.clone())),
        Data::Error(e) => Some(Node::String(e.to_string())),
    }
}

pub fn read_workbook(path: &Path) -> Result<Workbook, StorageError> {
    let mut wb = open_workbook_auto(path).map_err(|e| StorageError::Workbook(e.to_string()))?;
    let metadata = wb.sheets_metadata().to_vec();

    let mut sheets = Vec::with_capacity(metadata.len());
    for meta in metadata {
        if meta.typ != SheetType::WorkSheet {
            tracing::debug!("跳过非工作表 `{}` ({:?})", meta.name, meta.typ);
            continue;
        }
        let range = wb
            .worksheet_range(&meta.name)
            .map_err(|e| StorageError::Workbook(e.to_string()))?;

        let mut grid = GridModel::new();
        // calamine 的坐标相对于 range.start()
        if let (Some((sr, sc)), Some((er, ec))) = (range.start(), range.end()) {
            for (row, col, data) in range.used_cells() {
                if let Some(value) = cell_value(data) {
                    grid.set(CellRef::new(sr + row as u32, sc + col as u32), value);
                }
            }
            grid = grid.with_range(UsedRange::new(CellRef::new(sr, sc), CellRef::new(er, ec)));
        }

        let mut sheet = Sheet::new(meta.name.clone(), grid);
        sheet.visible = meta.visible == SheetVisible::Visible;
        sheets.push(sheet);
    }
    tracing::debug!("读取工作簿 {}: {} 张工作表", path.display(), sheets.len());
    Ok(Workbook::new(sheets))
}

pub fn write_workbook(path: &Path, book: &Workbook) -> Result<(), StorageError> {
    let is_xlsx = path
        .extension()
        .and_then(|e| e.to_str())
        .is_some_and(|e| e.eq_ignore_ascii_case("xlsx"));
    if !is_xlsx {
        return Err(StorageError::Unsupported(format!(
            "只能写回 .xlsx: {}",
            path.display()
        )));
    }

    let mut out = XlsxWorkbook::new();
    for sheet in &book.sheets {
        let ws = out.add_worksheet();
        ws.set_name(&sheet.name).map_err(xlsx_err)?;
        if !sheet.visible {
            ws.set_hidden(true);
        }
        for (cell, value) in sheet.grid.cells() {
            let col = u16::try_from(cell.col)
                .map_err(|_| StorageError::Workbook(format!("列号超出范围: {}", cell.col)))?;
            match value {
                Node::Null => continue,
                Node::String(s) => ws.write_string(cell.row, col, s),
                Node::Number(n) => ws.write_number(cell.row, col, n.as_f64().unwrap_or_default()),
                Node::Bool(b) => ws.write_boolean(cell.row, col, *b),
                compound => ws.write_string(cell.row, col, compound.display_text()),
            }
            .map_err(xlsx_err)?;
        }
    }
    out.save(path).map_err(xlsx_err)?;
    Ok(())
}
