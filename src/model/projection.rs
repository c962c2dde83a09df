//! 行/列投影：把记录数组变成固定表头的平面视图

use serde::Serialize;

use crate::model::node::{Node, ObjectMap, EMPTY_DEFAULT};
use crate::model::path::Path;

/// 平面视图（派生数据，不持久化，每次读取时重建）
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ProjectedView {
    pub headers: Vec<String>,
    /// 每行只包含表头声明的键，缺失的键补空字符串
    pub rows: Vec<Node>,
    pub table_path: Path,
}

impl ProjectedView {
    pub fn empty(table_path: Path) -> Self {
        Self {
            headers: Vec::new(),
            rows: Vec::new(),
            table_path,
        }
    }

    /// 取单元格；未声明的表头或越界行返回空默认值
    pub fn cell(&self, row: usize, header: &str) -> &Node {
        self.rows
            .get(row)
            .and_then(Node::as_object)
            .and_then(|fields| fields.get(header))
            .unwrap_or(&EMPTY_DEFAULT)
    }

    pub fn first_row(&self) -> Option<&Node> {
        self.rows.first()
    }
}

/// 首条记录的键（非对象时为空）
pub fn headers_of(records: &[Node]) -> Vec<String> {
    records
        .first()
        .and_then(Node::as_object)
        .map(|fields| fields.keys().map(str::to_string).collect())
        .unwrap_or_default()
}

/// 投影记录数组
///
/// 表头取自 `headers`（网格表头行），否则取首条记录的键；不对所有行的键求并集。
pub fn project(records: &[Node], headers: Option<&[String]>, table_path: Path) -> ProjectedView {
    let headers = match headers {
        Some(h) => h.to_vec(),
        None => headers_of(records),
    };
    let rows = records.iter().map(|r| normalize(r, &headers)).collect();
    ProjectedView {
        headers,
        rows,
        table_path,
    }
}

fn normalize(record: &Node, headers: &[String]) -> Node {
    let fields = record.as_object();
    let mut out = ObjectMap::with_capacity(headers.len());
    for header in headers {
        let value = fields
            .and_then(|f| f.get(header))
            .cloned()
            .unwrap_or_else(Node::empty_default);
        out.insert(header.clone(), value);
    }
    Node::object(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::{json, Value};

    fn records(value: Value) -> Vec<Node> {
        match Node::from(value) {
            Node::Array(items) => items.to_vec(),
            other => panic!("需要数组: {other:?}"),
        }
    }

    #[test]
    fn test_headers_from_first_record_only() {
        let rows = records(json!([
            {"id": 1, "name": "A"},
            {"id": 2, "extra": true}
        ]));
        let view = project(&rows, None, Path::parse("users").unwrap());
        assert_eq!(view.headers, vec!["id", "name"], "表头只取首条记录");
        assert_eq!(Value::from(view.rows[1].clone()), json!({"id": 2, "name": ""}));
        assert_eq!(view.table_path.render(), "users");
    }

    #[test]
    fn test_explicit_headers_win() {
        let rows = records(json!([{"b": 1, "a": 2}]));
        let headers = vec!["a".to_string(), "z".to_string()];
        let view = project(&rows, Some(&headers), Path::root());
        assert_eq!(view.headers, headers);
        assert_eq!(Value::from(view.rows[0].clone()), json!({"a": 2, "z": ""}));
    }

    #[test]
    fn test_cell_defaults_to_empty_string() {
        let rows = records(json!([{"id": 1}]));
        let view = project(&rows, None, Path::root());
        assert_eq!(view.cell(0, "id"), &Node::from(1));
        assert_eq!(view.cell(0, "missing"), &Node::empty_default());
        assert_eq!(view.cell(9, "id"), &Node::empty_default());
    }

    #[test]
    fn test_empty_and_non_record_inputs() {
        let view = project(&[], None, Path::root());
        assert!(view.headers.is_empty());
        assert!(view.rows.is_empty());

        let view = project(&records(json!([1, 2])), None, Path::root());
        assert!(view.headers.is_empty());
        assert_eq!(view.rows.len(), 2);
    }

    #[test]
    fn test_compound_values_pass_through() {
        let rows = records(json!([{"id": 1, "tags": [{"k": "a"}]}]));
        let view = project(&rows, None, Path::root());
        assert!(view.cell(0, "tags").is_array());
    }
}
