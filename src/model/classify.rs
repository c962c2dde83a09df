//! 嵌套字段分类：按首行的值判断每个表头是平面列还是嵌套子表

use serde::Serialize;

use crate::model::node::Node;
use crate::model::projection::ProjectedView;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FieldKind {
    /// 标量，作为可编辑列显示
    #[default]
    Flat,
    /// 非数组对象，以单对象表单显示
    NestedObject,
    /// 元素全为对象的数组（含空数组），以子表显示
    NestedRecordArray,
}

impl FieldKind {
    pub fn is_nested(self) -> bool {
        self != FieldKind::Flat
    }
}

pub fn classify_value(value: Option<&Node>) -> FieldKind {
    match value {
        Some(Node::Array(items)) if items.iter().all(Node::is_object) => FieldKind::NestedRecordArray,
        Some(Node::Object(_)) => FieldKind::NestedObject,
        _ => FieldKind::Flat,
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FieldClass {
    pub header: String,
    pub kind: FieldKind,
}

/// 每个表头的分类，顺序与表头一致
///
/// 只看首行：其余行形状不同不会被调和。没有行时全部为 `Flat`。
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct Classification {
    fields: Vec<FieldClass>,
}

impl Classification {
    pub fn of(view: &ProjectedView) -> Self {
        let first = view.first_row().and_then(Node::as_object);
        let fields = view
            .headers
            .iter()
            .map(|header| FieldClass {
                header: header.clone(),
                kind: classify_value(first.and_then(|f| f.get(header))),
            })
            .collect();
        Self { fields }
    }

    pub fn fields(&self) -> &[FieldClass] {
        &self.fields
    }

    pub fn kind_of(&self, header: &str) -> FieldKind {
        self.fields
            .iter()
            .find(|f| f.header == header)
            .map(|f| f.kind)
            .unwrap_or_default()
    }

    pub fn flat_headers(&self) -> Vec<&str> {
        self.fields
            .iter()
            .filter(|f| !f.kind.is_nested())
            .map(|f| f.header.as_str())
            .collect()
    }

    pub fn nested_headers(&self) -> Vec<&str> {
        self.fields
            .iter()
            .filter(|f| f.kind.is_nested())
            .map(|f| f.header.as_str())
            .collect()
    }
}
