//! VM桥接层：表现层唯一依赖的契约面
//!
//! 表格列表、视图读取与各类单元格/行编辑。所有编辑都经由路径 + 写入器，
//! 返回新的整份文档，调用方随后重新生成视图。

use serde::{Deserialize, Serialize};

use crate::model::access::{read, resolve_conflict, write_with, ConflictPolicy, WriteError};
use crate::model::classify::{Classification, FieldKind};
use crate::model::discovery::{discover, TableDescriptor, TableKind};
use crate::model::grid::SheetDocument;
use crate::model::node::{Node, NodeKind, ObjectMap};
use crate::model::path::{Path, Step};
use crate::model::projection::{headers_of, project, ProjectedView};

/// 当前编辑的文档，按来源区分
#[derive(Debug, Clone, PartialEq)]
pub enum Source {
    /// 任意 JSON 文档
    Json(Node),
    /// 工作簿的表格投影
    Sheets(SheetDocument),
}

impl Source {
    pub fn root(&self) -> &Node {
        match self {
            Source::Json(doc) => doc,
            Source::Sheets(sheets) => &sheets.root,
        }
    }

    pub fn replace_root(&mut self, root: Node) {
        match self {
            Source::Json(doc) => *doc = root,
            Source::Sheets(sheets) => sheets.root = root,
        }
    }

    /// 工作表名对应的表格路径
    fn sheet_of<'a>(&self, table_path: &'a Path) -> Option<&'a str> {
        match (self, table_path.steps()) {
            (Source::Sheets(_), [Step::Key(name)]) => Some(name.as_str()),
            _ => None,
        }
    }
}

/// 工作表列表：JSON 走结构发现，工作簿按可见工作表顺序
pub fn list_tables(source: &Source) -> Vec<TableDescriptor> {
    match source {
        Source::Json(doc) => discover(doc),
        Source::Sheets(sheets) => sheets
            .sheet_names()
            .map(|name| {
                let path = Path::root().child_key(name);
                let has_rows = read(&sheets.root, &path)
                    .and_then(Node::as_array)
                    .is_some_and(|rows| !rows.is_empty());
                TableDescriptor {
                    path,
                    kind: if has_rows {
                        TableKind::RecordArray
                    } else {
                        TableKind::EmptyArray
                    },
                }
            })
            .collect(),
    }
}

/// 视图 + 每个表头的分类
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TableView {
    #[serde(flatten)]
    pub view: ProjectedView,
    pub fields: Classification,
}

impl TableView {
    fn build(view: ProjectedView) -> Self {
        let fields = Classification::of(&view);
        Self { view, fields }
    }

    pub fn kind_of(&self, header: &str) -> FieldKind {
        self.fields.kind_of(header)
    }
}

/// 读取表格视图；路径缺失或不是数组时得到空视图
pub fn get_view(source: &Source, table_path: &Path) -> TableView {
    let records = read(source.root(), table_path)
        .and_then(Node::as_array)
        .unwrap_or_default();
    let headers = match (source, source.sheet_of(table_path)) {
        (Source::Sheets(sheets), Some(name)) => sheets.headers(name),
        _ => None,
    };
    TableView::build(project(records, headers, table_path.clone()))
}

/// 嵌套子表中的条目寻址
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ItemSelector {
    /// 直接操作嵌套对象自身的字段（路径中不插入下标）
    WholeObject,
    /// 操作嵌套记录数组的第 N 个元素
    ElementAt(usize),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum NestedShape {
    RecordArray,
    Object,
    Absent,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NestedView {
    pub shape: NestedShape,
    #[serde(flatten)]
    pub table: TableView,
}

/// 嵌套字段的基准路径：`<table>[<row>].<nested path>`
pub fn nested_base(table_path: &Path, row: usize, nested_path: &Path) -> Path {
    table_path.child_index(row).join(nested_path)
}

/// 嵌套视图
///
/// 记录数组按子表投影；单对象投影为只有一行的表（该行即对象本身），
/// 编辑时使用 [`ItemSelector::WholeObject`]。
pub fn nested_view(doc: &Node, table_path: &Path, row: usize, nested_path: &Path) -> NestedView {
    let base = nested_base(table_path, row, nested_path);
    match read(doc, &base) {
        Some(Node::Array(items)) => NestedView {
            shape: NestedShape::RecordArray,
            table: TableView::build(project(items, None, base)),
        },
        Some(object @ Node::Object(_)) => NestedView {
            shape: NestedShape::Object,
            table: TableView::build(project(std::slice::from_ref(object), None, base)),
        },
        _ => NestedView {
            shape: NestedShape::Absent,
            table: TableView::build(ProjectedView::empty(base)),
        },
    }
}

/// 被编辑的行或条目不存在时记录警告；调用方随后原样返回文档
fn absent(doc: &Node, path: &Path) -> bool {
    let missing = read(doc, path).is_none();
    if missing {
        tracing::warn!("编辑目标 `{}` 不存在，已忽略", path);
    }
    missing
}

/// 编辑操作；冲突策略决定写入遇到类型不符时是替换还是报错
#[derive(Debug, Clone, Copy, Default)]
pub struct TableEditor {
    pub policy: ConflictPolicy,
}

impl TableEditor {
    pub fn new(policy: ConflictPolicy) -> Self {
        Self { policy }
    }

    pub fn set_cell(
        &self,
        doc: &Node,
        table_path: &Path,
        row: usize,
        header: &str,
        value: impl Into<Node>,
    ) -> Result<Node, WriteError> {
        let row_path = table_path.child_index(row);
        if absent(doc, &row_path) {
            return Ok(doc.clone());
        }
        write_with(doc, &row_path.child_key(header), value.into(), self.policy)
    }

    /// 追加一条所有字段都为空字符串的记录
    pub fn add_row(&self, doc: &Node, table_path: &Path, headers: &[String]) -> Result<Node, WriteError> {
        let record: ObjectMap = headers
            .iter()
            .map(|h| (h.clone(), Node::empty_default()))
            .collect();
        self.append(doc, table_path, Node::object(record))
    }

    /// 删除一行；越界时原样返回文档
    pub fn delete_row(&self, doc: &Node, table_path: &Path, row: usize) -> Result<Node, WriteError> {
        self.remove(doc, table_path, row)
    }

    #[allow(clippy::too_many_arguments)]
    pub fn set_nested_cell(
        &self,
        doc: &Node,
        table_path: &Path,
        row: usize,
        nested_path: &Path,
        item: ItemSelector,
        nested_header: &str,
        value: impl Into<Node>,
    ) -> Result<Node, WriteError> {
        if absent(doc, &table_path.child_index(row)) {
            return Ok(doc.clone());
        }
        let mut path = nested_base(table_path, row, nested_path);
        if let ItemSelector::ElementAt(index) = item {
            path.push_index(index);
            if absent(doc, &path) {
                return Ok(doc.clone());
            }
        }
        path.push_key(nested_header);
        write_with(doc, &path, value.into(), self.policy)
    }

    /// 向嵌套记录数组追加一条记录，字段沿用首个已有条目的键
    pub fn add_nested_row(
        &self,
        doc: &Node,
        table_path: &Path,
        row: usize,
        nested_path: &Path,
    ) -> Result<Node, WriteError> {
        let base = nested_base(table_path, row, nested_path);
        let headers = read(doc, &base)
            .and_then(Node::as_array)
            .map(headers_of)
            .unwrap_or_default();
        self.add_row(doc, &base, &headers)
    }

    pub fn delete_nested_row(
        &self,
        doc: &Node,
        table_path: &Path,
        row: usize,
        nested_path: &Path,
        item_index: usize,
    ) -> Result<Node, WriteError> {
        let base = nested_base(table_path, row, nested_path);
        self.remove(doc, &base, item_index)
    }

    fn items(&self, doc: &Node, path: &Path) -> Result<Vec<Node>, WriteError> {
        match read(doc, path) {
            Some(Node::Array(items)) => Ok(items.to_vec()),
            None => Ok(Vec::new()),
            Some(other) => {
                resolve_conflict(path, path.len(), NodeKind::Array, other, self.policy)?;
                Ok(Vec::new())
            }
        }
    }

    fn append(&self, doc: &Node, path: &Path, record: Node) -> Result<Node, WriteError> {
        let mut items = self.items(doc, path)?;
        items.push(record);
        write_with(doc, path, Node::array(items), self.policy)
    }

    fn remove(&self, doc: &Node, path: &Path, index: usize) -> Result<Node, WriteError> {
        let mut items = self.items(doc, path)?;
        if index >= items.len() {
            tracing::warn!("删除行越界: `{}` 只有 {} 行，请求第 {} 行", path, items.len(), index);
            return Ok(doc.clone());
        }
        items.remove(index);
        write_with(doc, path, Node::array(items), self.policy)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::grid::{GridModel, Sheet, Workbook};
    use pretty_assertions::assert_eq;
    use serde_json::{json, Value};

    fn p(text: &str) -> Path {
        Path::parse(text).unwrap()
    }

    fn orders() -> Node {
        Node::from(json!({
            "orders": [
                {
                    "id": 1,
                    "customer": {"name": "A", "city": "X"},
                    "lines": [{"sku": "s1", "qty": 2}, {"sku": "s2", "qty": 1}]
                },
                {"id": 2, "customer": {"name": "B"}, "lines": []}
            ],
            "meta": {"version": 1}
        }))
    }

    #[test]
    fn test_get_view_splits_flat_and_nested() {
        let source = Source::Json(orders());
        let tables = list_tables(&source);
        assert_eq!(tables.len(), 1);

        let view = get_view(&source, &tables[0].path);
        assert_eq!(view.view.headers, vec!["id", "customer", "lines"]);
        assert_eq!(view.fields.flat_headers(), vec!["id"]);
        assert_eq!(view.kind_of("customer"), FieldKind::NestedObject);
        assert_eq!(view.kind_of("lines"), FieldKind::NestedRecordArray);
    }

    #[test]
    fn test_get_view_on_missing_or_non_array_path() {
        let source = Source::Json(orders());
        assert!(get_view(&source, &p("nope")).view.rows.is_empty());
        assert!(get_view(&source, &p("meta")).view.headers.is_empty());
    }

    #[test]
    fn test_set_cell_writes_through_to_document() {
        let editor = TableEditor::default();
        let doc = orders();
        let updated = editor.set_cell(&doc, &p("orders"), 1, "id", "22").unwrap();
        assert_eq!(read(&updated, &p("orders[1].id")), Some(&Node::from("22")));
        assert!(read(&doc, &p("meta")).unwrap().ptr_eq(read(&updated, &p("meta")).unwrap()));
    }

    #[test]
    fn test_add_then_delete_row_restores_document() {
        let editor = TableEditor::default();
        let doc = orders();
        let source = Source::Json(doc.clone());
        let headers = get_view(&source, &p("orders")).view.headers;

        let added = editor.add_row(&doc, &p("orders"), &headers).unwrap();
        assert_eq!(
            read(&added, &p("orders[2]")).cloned().map(Value::from),
            Some(json!({"id": "", "customer": "", "lines": ""}))
        );

        let restored = editor.delete_row(&added, &p("orders"), 2).unwrap();
        assert_eq!(restored, doc);
    }

    #[test]
    fn test_add_row_to_empty_and_absent_tables() {
        let editor = TableEditor::default();
        let doc = Node::from(json!({"todo": []}));
        let headers = vec!["task".to_string()];

        let updated = editor.add_row(&doc, &p("todo"), &headers).unwrap();
        assert_eq!(Value::from(updated), json!({"todo": [{"task": ""}]}));

        let created = editor.add_row(&doc, &p("later.items"), &headers).unwrap();
        assert_eq!(
            Value::from(created),
            json!({"todo": [], "later": {"items": [{"task": ""}]}})
        );
    }

    #[test]
    fn test_delete_row_out_of_range_is_noop() {
        let editor = TableEditor::default();
        let doc = orders();
        let same = editor.delete_row(&doc, &p("orders"), 9).unwrap();
        assert!(same.ptr_eq(&doc));
    }

    #[test]
    fn test_set_cell_on_missing_row_is_noop() {
        let editor = TableEditor::default();
        let doc = Node::from(json!({"users": [{"id": 1, "name": "A"}, {"id": 2, "name": "B"}]}));
        let same = editor.set_cell(&doc, &p("users"), 4, "name", "Z").unwrap();
        assert!(same.ptr_eq(&doc), "不存在的行不应被补齐");
        assert_eq!(get_view(&Source::Json(same), &p("users")).view.rows.len(), 2);

        let huge = editor.set_cell(&doc, &p("users"), usize::MAX / 64, "id", "x").unwrap();
        assert!(huge.ptr_eq(&doc));
        let strict = TableEditor::new(ConflictPolicy::Reject);
        assert!(strict.set_cell(&doc, &p("users"), 2, "id", "x").unwrap().ptr_eq(&doc));
    }

    #[test]
    fn test_set_nested_cell_on_missing_item_is_noop() {
        let editor = TableEditor::default();
        let doc = orders();
        let lines = p("lines");

        let same = editor
            .set_nested_cell(&doc, &p("orders"), 0, &lines, ItemSelector::ElementAt(5), "qty", "9")
            .unwrap();
        assert!(same.ptr_eq(&doc), "不存在的条目不应被补齐");

        let same = editor
            .set_nested_cell(&doc, &p("orders"), 1, &lines, ItemSelector::ElementAt(0), "qty", "9")
            .unwrap();
        assert!(same.ptr_eq(&doc), "空子表中没有第 0 条");

        let same = editor
            .set_nested_cell(&doc, &p("orders"), 7, &p("customer"), ItemSelector::WholeObject, "name", "Q")
            .unwrap();
        assert!(same.ptr_eq(&doc), "不存在的行不应被创建");
    }

    #[test]
    fn test_add_row_conflict_policies() {
        let doc = Node::from(json!({"meta": {"v": 1}}));
        let rejected = TableEditor::new(ConflictPolicy::Reject).add_row(&doc, &p("meta"), &[]);
        assert!(matches!(rejected, Err(WriteError::TypeConflict { .. })));

        let replaced = TableEditor::default().add_row(&doc, &p("meta"), &[]).unwrap();
        assert_eq!(Value::from(replaced), json!({"meta": [{}]}));
    }

    #[test]
    fn test_nested_record_array_edits() {
        let editor = TableEditor::default();
        let doc = orders();
        let lines = p("lines");

        let view = nested_view(&doc, &p("orders"), 0, &lines);
        assert_eq!(view.shape, NestedShape::RecordArray);
        assert_eq!(view.table.view.headers, vec!["sku", "qty"]);
        assert_eq!(view.table.view.table_path.render(), "orders[0].lines");

        let updated = editor
            .set_nested_cell(&doc, &p("orders"), 0, &lines, ItemSelector::ElementAt(1), "qty", "5")
            .unwrap();
        assert_eq!(read(&updated, &p("orders[0].lines[1].qty")), Some(&Node::from("5")));

        let added = editor.add_nested_row(&updated, &p("orders"), 0, &lines).unwrap();
        assert_eq!(
            read(&added, &p("orders[0].lines[2]")).cloned().map(Value::from),
            Some(json!({"sku": "", "qty": ""}))
        );

        let removed = editor.delete_nested_row(&added, &p("orders"), 0, &lines, 0).unwrap();
        assert_eq!(
            read(&removed, &p("orders[0].lines")).cloned().map(Value::from),
            Some(json!([{"sku": "s2", "qty": "5"}, {"sku": "", "qty": ""}]))
        );
    }

    #[test]
    fn test_nested_object_uses_whole_object_selector() {
        let editor = TableEditor::default();
        let doc = orders();
        let customer = p("customer");

        let view = nested_view(&doc, &p("orders"), 0, &customer);
        assert_eq!(view.shape, NestedShape::Object);
        assert_eq!(view.table.view.headers, vec!["name", "city"]);
        assert_eq!(view.table.view.cell(0, "city"), &Node::from("X"));

        let updated = editor
            .set_nested_cell(&doc, &p("orders"), 0, &customer, ItemSelector::WholeObject, "city", "Y")
            .unwrap();
        assert_eq!(read(&updated, &p("orders[0].customer.city")), Some(&Node::from("Y")));
        assert_eq!(read(&updated, &p("orders[0].customer.name")), Some(&Node::from("A")));
    }

    #[test]
    fn test_nested_add_on_empty_array_and_deeper_paths() {
        let editor = TableEditor::default();
        let doc = Node::from(json!({
            "orders": [
                {"id": 2, "lines": []},
                {"id": 3, "lines": [{"sku": "a", "parts": [{"pn": "p1"}]}]}
            ]
        }));

        let added = editor.add_nested_row(&doc, &p("orders"), 0, &p("lines")).unwrap();
        assert_eq!(
            read(&added, &p("orders[0].lines")).cloned().map(Value::from),
            Some(json!([{}]))
        );

        let deeper = p("lines[0].parts");
        let view = nested_view(&doc, &p("orders"), 1, &deeper);
        assert_eq!(view.table.view.table_path.render(), "orders[1].lines[0].parts");
        let updated = editor
            .set_nested_cell(&doc, &p("orders"), 1, &deeper, ItemSelector::ElementAt(0), "pn", "p9")
            .unwrap();
        assert_eq!(
            read(&updated, &p("orders[1].lines[0].parts[0].pn")),
            Some(&Node::from("p9"))
        );

        let absent = nested_view(&doc, &p("orders"), 0, &p("missing"));
        assert_eq!(absent.shape, NestedShape::Absent);
    }

    #[test]
    fn test_sheet_source_uses_header_row() {
        let grid = GridModel::from_rows(vec![
            vec![Node::from("Report")],
            vec![Node::from("ID"), Node::from("Name"), Node::from("Note")],
            vec![Node::from(1), Node::from("Alice")],
        ]);
        let book = Workbook::new(vec![
            Sheet::new("People", grid),
            Sheet::new("Empty", GridModel::new()),
        ]);
        let source = Source::Sheets(SheetDocument::from_workbook(&book));

        let tables = list_tables(&source);
        assert_eq!(
            tables.iter().map(|t| (t.name(), t.kind)).collect::<Vec<_>>(),
            vec![
                ("People".to_string(), TableKind::RecordArray),
                ("Empty".to_string(), TableKind::EmptyArray),
            ]
        );

        let view = get_view(&source, &tables[0].path);
        assert_eq!(view.view.headers, vec!["ID", "Name", "Note"]);
        assert_eq!(view.view.cell(0, "Note"), &Node::empty_default());
        assert!(view.fields.nested_headers().is_empty());
    }

    #[test]
    fn test_view_serializes_as_flat_payload() {
        let source = Source::Json(Node::from(json!({"users": [{"id": 1, "meta": {"x": 1}}]})));
        let payload = serde_json::to_value(get_view(&source, &p("users"))).unwrap();
        assert_eq!(
            payload,
            json!({
                "headers": ["id", "meta"],
                "rows": [{"id": 1, "meta": {"x": 1}}],
                "table_path": "users",
                "fields": [
                    {"header": "id", "kind": "flat"},
                    {"header": "meta", "kind": "nested_object"}
                ]
            })
        );
    }
}
