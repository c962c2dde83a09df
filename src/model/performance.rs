//! 性能基准测试模块
//!
//! 用于测试大文档的表格发现、视图投影与写入的耗时

use std::time::Instant;

use serde::Serialize;
use serde_json::{json, Value};

use crate::model::access::{read, write};
use crate::model::discovery::discover;
use crate::model::node::Node;
use crate::model::path::Path;
use crate::vm::bridge::{get_view, Source, TableEditor};

/// 性能测试结果
#[derive(Debug, Clone, Serialize)]
pub struct PerformanceResult {
    pub operation: String,
    pub duration_ms: u128,
    pub success: bool,
    pub details: String,
}

impl PerformanceResult {
    pub fn new(operation: &str, duration_ms: u128, success: bool, details: &str) -> Self {
        Self {
            operation: operation.to_string(),
            duration_ms,
            success,
            details: details.to_string(),
        }
    }
}

/// 生成带多个表格的大型测试文档
///
/// `tables` 个顶层记录数组，每个 `rows` 行；每行含标量、嵌套对象与嵌套记录数组。
pub fn generate_large_document(tables: usize, rows: usize) -> Value {
    let mut root = serde_json::Map::new();
    root.insert(
        "metadata".to_string(),
        json!({
            "tables": tables,
            "rows": rows,
            "description": "性能测试用大型表格文档"
        }),
    );

    for t in 0..tables {
        let records: Vec<Value> = (0..rows)
            .map(|i| {
                json!({
                    "id": i,
                    "name": format!("项目_{}_{}", t, i),
                    "value": i * 2,
                    "active": i % 3 == 0,
                    "owner": {"name": format!("负责人_{}", i % 7), "team": t},
                    "lines": [
                        {"sku": format!("s{}", i), "qty": 1},
                        {"sku": format!("s{}", i + 1), "qty": 2}
                    ]
                })
            })
            .collect();
        root.insert(format!("table_{}", t), Value::Array(records));
    }

    Value::Object(root)
}

/// 测试表格发现性能
pub fn benchmark_discovery(doc: &Node) -> PerformanceResult {
    let start = Instant::now();
    let tables = discover(doc);
    let duration = start.elapsed();

    PerformanceResult::new(
        "表格发现",
        duration.as_millis(),
        !tables.is_empty(),
        &format!("发现了 {} 个表格", tables.len()),
    )
}

/// 测试视图投影性能
pub fn benchmark_projection(doc: &Node, table_path: &Path) -> PerformanceResult {
    let source = Source::Json(doc.clone());
    let start = Instant::now();
    let view = get_view(&source, table_path);
    let duration = start.elapsed();

    PerformanceResult::new(
        &format!("视图投影: {}", table_path),
        duration.as_millis(),
        !view.view.rows.is_empty(),
        &format!("{} 行 x {} 列", view.view.rows.len(), view.view.headers.len()),
    )
}

/// 测试单元格写入性能，并确认未修改的分支仍然共享
pub fn benchmark_write(doc: &Node, table_path: &Path, rows: usize) -> PerformanceResult {
    let editor = TableEditor::default();
    let start = Instant::now();
    let mut current = doc.clone();
    let mut failures = 0;
    for row in 0..rows {
        match editor.set_cell(&current, table_path, row, "name", format!("改写_{}", row)) {
            Ok(updated) => current = updated,
            Err(e) => {
                tracing::warn!("写入失败: {}", e);
                failures += 1;
            }
        }
    }
    let duration = start.elapsed();

    let metadata = Path::root().child_key("metadata");
    let shared = match (read(doc, &metadata), read(&current, &metadata)) {
        (Some(before), Some(after)) => before.ptr_eq(after),
        _ => false,
    };

    PerformanceResult::new(
        &format!("单元格写入: {}", table_path),
        duration.as_millis(),
        failures == 0 && shared,
        &format!("写入 {} 次，未修改分支共享: {}", rows, shared),
    )
}

/// 运行综合性能测试
pub fn run_performance_suite() -> Vec<PerformanceResult> {
    let mut results = Vec::new();

    // 测试不同规模的数据
    let test_cases = [
        (3, 100),   // 小型
        (5, 1_000), // 中型
        (8, 5_000), // 大型
    ];

    for (tables, rows) in test_cases {
        tracing::info!("测试规模：{} 个表格，每表 {} 行", tables, rows);

        let start = Instant::now();
        let value = generate_large_document(tables, rows);
        results.push(PerformanceResult::new(
            &format!("数据生成({}x{})", tables, rows),
            start.elapsed().as_millis(),
            true,
            &format!("生成了 {} 个表格", tables),
        ));

        let start = Instant::now();
        let text = value.to_string();
        let parsed = serde_json::from_str::<Value>(&text);
        let duration = start.elapsed().as_millis();
        let doc = match parsed {
            Ok(v) => {
                results.push(PerformanceResult::new(
                    &format!("JSON解析({}x{})", tables, rows),
                    duration,
                    true,
                    &format!("解析了 {} 字节的JSON", text.len()),
                ));
                Node::from(v)
            }
            Err(e) => {
                results.push(PerformanceResult::new(
                    &format!("JSON解析({}x{})", tables, rows),
                    duration,
                    false,
                    &format!("解析失败: {}", e),
                ));
                continue;
            }
        };

        results.push(benchmark_discovery(&doc));
        let table = Path::root().child_key("table_0");
        results.push(benchmark_projection(&doc, &table));
        results.push(benchmark_write(&doc, &table, rows.min(500)));

        // 整份替换写入作为对照
        let start = Instant::now();
        let replaced = write(&doc, &Path::root().child_key("metadata"), Node::from("x"));
        results.push(PerformanceResult::new(
            &format!("根级写入({}x{})", tables, rows),
            start.elapsed().as_millis(),
            !replaced.ptr_eq(&doc),
            "替换 metadata",
        ));
    }

    results
}
