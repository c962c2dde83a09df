//! 表格发现（JSON）：先序遍历文档，找出所有“记录数组”（或空数组）作为工作表列表

use serde::Serialize;

use crate::model::node::Node;
use crate::model::path::Path;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TableKind {
    /// 首元素为对象的数组
    RecordArray,
    /// 空数组（尚无数据，但可以添加行）
    EmptyArray,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TableDescriptor {
    pub path: Path,
    pub kind: TableKind,
}

/// 根数组表格的标签
pub const ROOT_TABLE_NAME: &str = "$";

/// 工作表标签：渲染后的路径，根数组显示为 `$`
pub fn table_name(path: &Path) -> String {
    if path.is_root() {
        ROOT_TABLE_NAME.to_string()
    } else {
        path.render()
    }
}

impl TableDescriptor {
    pub fn name(&self) -> String {
        table_name(&self.path)
    }
}

/// 发现文档中的所有表格，顺序即文档遍历顺序（首个结果为默认工作表）
///
/// 已判定为表格的数组是叶子：其内部嵌套数组只在投影时经由字段分类可见。
/// 根为标量时返回空列表。
pub fn discover(doc: &Node) -> Vec<TableDescriptor> {
    fn walk(out: &mut Vec<TableDescriptor>, node: &Node, path: &mut Path) {
        match node {
            Node::Array(items) => {
                match items.first() {
                    None => {
                        out.push(TableDescriptor {
                            path: path.clone(),
                            kind: TableKind::EmptyArray,
                        });
                    }
                    Some(first) if first.is_object() => {
                        out.push(TableDescriptor {
                            path: path.clone(),
                            kind: TableKind::RecordArray,
                        });
                    }
                    Some(_) => {
                        for (idx, child) in items.iter().enumerate() {
                            path.push_index(idx);
                            walk(out, child, path);
                            path.pop();
                        }
                    }
                }
            }
            Node::Object(map) => {
                for (key, child) in map.iter() {
                    path.push_key(key);
                    walk(out, child, path);
                    path.pop();
                }
            }
            _ => {}
        }
    }

    let mut out = Vec::new();
    if doc.is_scalar() {
        tracing::debug!("文档根为标量 {:?}，没有可发现的表格", doc.kind());
        return out;
    }
    walk(&mut out, doc, &mut Path::root());
    out
}
