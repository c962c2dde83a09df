//! 文档树：不可变节点，容器以 Arc 共享，写入时只复制路径上的节点

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Number, Value};

/// JSON 节点类型（与 UI 展示解耦）
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum NodeKind {
    Object,
    Array,
    String,
    Number,
    Bool,
    Null,
}

/// 有序对象：保持键的插入顺序（重新序列化与表头推断都依赖它）
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ObjectMap {
    entries: Vec<(String, Node)>,
}

impl ObjectMap {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            entries: Vec::with_capacity(capacity),
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn get(&self, key: &str) -> Option<&Node> {
        self.entries.iter().find(|(k, _)| k == key).map(|(_, v)| v)
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.get(key).is_some()
    }

    /// 已存在的键原位替换（顺序不变），否则追加到末尾
    pub fn insert(&mut self, key: String, value: Node) -> Option<Node> {
        match self.entries.iter_mut().find(|(k, _)| *k == key) {
            Some((_, slot)) => Some(std::mem::replace(slot, value)),
            None => {
                self.entries.push((key, value));
                None
            }
        }
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|(k, _)| k.as_str())
    }

    pub fn values(&self) -> impl Iterator<Item = &Node> {
        self.entries.iter().map(|(_, v)| v)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &Node)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v))
    }
}

impl FromIterator<(String, Node)> for ObjectMap {
    fn from_iter<T: IntoIterator<Item = (String, Node)>>(iter: T) -> Self {
        let mut map = ObjectMap::new();
        for (k, v) in iter {
            map.insert(k, v);
        }
        map
    }
}

/// 文档节点
///
/// 标量直接内联；对象与数组放在 `Arc` 之后，克隆一个节点只增加引用计数。
/// 写入器复制容器时，未被路径触及的子树与原文档是同一份内存。
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(from = "Value", into = "Value")]
pub enum Node {
    Null,
    Bool(bool),
    Number(Number),
    String(String),
    Array(Arc<Vec<Node>>),
    Object(Arc<ObjectMap>),
}

/// 表格单元的空默认值（空字符串，而不是“缺失”）
pub static EMPTY_DEFAULT: Node = Node::String(String::new());

impl Default for Node {
    fn default() -> Self {
        Node::Null
    }
}

impl Node {
    pub fn empty_default() -> Self {
        Node::String(String::new())
    }

    pub fn array(items: Vec<Node>) -> Self {
        Node::Array(Arc::new(items))
    }

    pub fn object(map: ObjectMap) -> Self {
        Node::Object(Arc::new(map))
    }

    pub fn kind(&self) -> NodeKind {
        match self {
            Node::Object(_) => NodeKind::Object,
            Node::Array(_) => NodeKind::Array,
            Node::String(_) => NodeKind::String,
            Node::Number(_) => NodeKind::Number,
            Node::Bool(_) => NodeKind::Bool,
            Node::Null => NodeKind::Null,
        }
    }

    pub fn as_object(&self) -> Option<&ObjectMap> {
        match self {
            Node::Object(map) => Some(map),
            _ => None,
        }
    }

    pub fn as_array(&self) -> Option<&[Node]> {
        match self {
            Node::Array(items) => Some(items),
            _ => None,
        }
    }

    pub fn is_object(&self) -> bool {
        matches!(self, Node::Object(_))
    }

    pub fn is_array(&self) -> bool {
        matches!(self, Node::Array(_))
    }

    pub fn is_scalar(&self) -> bool {
        !self.is_object() && !self.is_array()
    }

    pub fn is_empty_default(&self) -> bool {
        matches!(self, Node::String(s) if s.is_empty())
    }

    /// 单元格是否算作“有内容”：非空字符串、非零数字、true
    pub fn is_truthy(&self) -> bool {
        match self {
            Node::Null => false,
            Node::Bool(b) => *b,
            Node::Number(n) => n.as_f64().map_or(true, |f| f != 0.0 && !f.is_nan()),
            Node::String(s) => !s.is_empty(),
            Node::Array(_) | Node::Object(_) => true,
        }
    }

    /// 同一性比较：容器比较指针，标量比较值。用于廉价的变更检测
    pub fn ptr_eq(&self, other: &Node) -> bool {
        match (self, other) {
            (Node::Array(a), Node::Array(b)) => Arc::ptr_eq(a, b),
            (Node::Object(a), Node::Object(b)) => Arc::ptr_eq(a, b),
            (a, b) if a.is_scalar() && b.is_scalar() => a == b,
            _ => false,
        }
    }

    /// 单元格文本：字符串原样、null 为空、其余按 JSON 文本
    pub fn display_text(&self) -> String {
        match self {
            Node::String(s) => s.clone(),
            Node::Null => String::new(),
            Node::Bool(b) => b.to_string(),
            Node::Number(n) => n.to_string(),
            compound => Value::from(compound.clone()).to_string(),
        }
    }

    /// 轻量预览（字符串截断、容器显示规模）
    pub fn preview(&self) -> String {
        match self {
            Node::String(s) => {
                let s = s.trim();
                if s.chars().count() > 32 {
                    let truncated: String = s.chars().take(32).collect();
                    format!("\"{}...\"", truncated)
                } else {
                    format!("\"{}\"", s)
                }
            }
            Node::Number(n) => n.to_string(),
            Node::Bool(b) => b.to_string(),
            Node::Null => "null".to_string(),
            Node::Object(m) => format!("{{..}} ({} keys)", m.len()),
            Node::Array(a) => format!("[..] ({} items)", a.len()),
        }
    }
}

impl From<Value> for Node {
    fn from(value: Value) -> Self {
        match value {
            Value::Null => Node::Null,
            Value::Bool(b) => Node::Bool(b),
            Value::Number(n) => Node::Number(n),
            Value::String(s) => Node::String(s),
            Value::Array(items) => Node::array(items.into_iter().map(Node::from).collect()),
            Value::Object(map) => Node::object(
                map.into_iter()
                    .map(|(k, v)| (k, Node::from(v)))
                    .collect(),
            ),
        }
    }
}

impl From<Node> for Value {
    fn from(node: Node) -> Self {
        match node {
            Node::Null => Value::Null,
            Node::Bool(b) => Value::Bool(b),
            Node::Number(n) => Value::Number(n),
            Node::String(s) => Value::String(s),
            Node::Array(items) => Value::Array(items.iter().cloned().map(Value::from).collect()),
            Node::Object(map) => {
                let mut out = Map::with_capacity(map.len());
                for (k, v) in map.iter() {
                    out.insert(k.to_string(), Value::from(v.clone()));
                }
                Value::Object(out)
            }
        }
    }
}

impl From<&str> for Node {
    fn from(s: &str) -> Self {
        Node::String(s.to_string())
    }
}

impl From<String> for Node {
    fn from(s: String) -> Self {
        Node::String(s)
    }
}

impl From<bool> for Node {
    fn from(b: bool) -> Self {
        Node::Bool(b)
    }
}

impl From<i64> for Node {
    fn from(n: i64) -> Self {
        Node::Number(n.into())
    }
}

impl From<f64> for Node {
    /// 非有限数（NaN/inf）无法表示为 JSON 数字，落为 null
    fn from(f: f64) -> Self {
        Number::from_f64(f).map_or(Node::Null, Node::Number)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_key_order_survives_round_trip() {
        let value = json!({"zeta": 1, "alpha": 2, "mid": {"b": 1, "a": 2}});
        let node = Node::from(value.clone());

        let keys: Vec<&str> = node.as_object().unwrap().keys().collect();
        assert_eq!(keys, vec!["zeta", "alpha", "mid"], "键顺序应保持插入顺序");

        let back = Value::from(node);
        assert_eq!(serde_json::to_string(&back).unwrap(), serde_json::to_string(&value).unwrap());
    }

    #[test]
    fn test_insert_existing_key_keeps_position() {
        let mut map: ObjectMap = vec![
            ("a".to_string(), Node::from(1)),
            ("b".to_string(), Node::from(2)),
        ]
        .into_iter()
        .collect();

        let old = map.insert("a".to_string(), Node::from("x"));
        assert_eq!(old, Some(Node::from(1)));
        assert_eq!(map.keys().collect::<Vec<_>>(), vec!["a", "b"]);
        assert_eq!(map.get("a"), Some(&Node::from("x")));
    }

    #[test]
    fn test_serde_goes_through_json_value() {
        let node: Node = serde_json::from_str(r#"{"id":1,"tags":["x"]}"#).unwrap();
        assert!(node.is_object());
        assert_eq!(serde_json::to_string(&node).unwrap(), r#"{"id":1,"tags":["x"]}"#);
    }

    #[test]
    fn test_truthiness_follows_cell_rules() {
        assert!(!Node::from("").is_truthy());
        assert!(!Node::from(0).is_truthy());
        assert!(!Node::from(false).is_truthy());
        assert!(!Node::Null.is_truthy());
        assert!(Node::from("x").is_truthy());
        assert!(Node::from(3).is_truthy());
        assert!(Node::from(true).is_truthy());
    }

    #[test]
    fn test_ptr_eq_distinguishes_copies() {
        let a = Node::from(json!({"k": [1, 2]}));
        let shared = a.clone();
        let rebuilt = Node::from(json!({"k": [1, 2]}));

        assert!(a.ptr_eq(&shared), "克隆应共享同一容器");
        assert!(!a.ptr_eq(&rebuilt), "重建的容器不是同一份");
        assert_eq!(a, rebuilt, "但内容相等");
    }

    #[test]
    fn test_display_text_and_preview() {
        assert_eq!(Node::Null.display_text(), "");
        assert_eq!(Node::from(42).display_text(), "42");
        assert_eq!(Node::from(json!({"a": 1})).display_text(), r#"{"a":1}"#);
        assert_eq!(Node::from(json!([1, 2, 3])).preview(), "[..] (3 items)");
        assert!(Node::from("这是一个非常长的字符串，应该被截断以便在预览中显示，不应该显示完整内容")
            .preview()
            .contains("..."));
    }

    #[test]
    fn test_non_finite_float_becomes_null() {
        assert_eq!(Node::from(f64::NAN), Node::Null);
        assert_eq!(Node::from(1.5), Node::Number(Number::from_f64(1.5).unwrap()));
    }
}
