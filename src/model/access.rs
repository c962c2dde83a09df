//! 结构读写：按路径读取节点；按路径写入并返回新文档（写时复制，仅复制路径上的容器）

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::model::node::{Node, NodeKind, ObjectMap};
use crate::model::path::{Path, Step};

/// 写入时遇到“现有节点类型与步骤不符”的处理策略
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConflictPolicy {
    /// 用步骤所需类型的新空容器原位替换冲突节点
    #[default]
    Replace,
    /// 拒绝写入，返回 [`WriteError::TypeConflict`]
    Reject,
}

#[derive(Error, Debug, Clone, PartialEq)]
pub enum WriteError {
    #[error("类型冲突: 路径 `{path}` 需要 {expected:?}，实际为 {found:?}")]
    TypeConflict {
        path: Path,
        expected: NodeKind,
        found: NodeKind,
    },
    #[error("下标越界: `{path}` 处数组只有 {len} 个元素")]
    IndexOutOfRange { path: Path, len: usize },
}

/// 读取路径处的节点；类型不符或键/下标不存在时返回 `None`（缺失不是错误）
pub fn read<'a>(doc: &'a Node, path: &Path) -> Option<&'a Node> {
    let mut current = doc;
    for step in path.steps() {
        current = match (step, current) {
            (Step::Key(key), Node::Object(map)) => map.get(key)?,
            (Step::Index(index), Node::Array(items)) => items.get(*index)?,
            _ => return None,
        };
    }
    Some(current)
}

/// 以默认策略（替换）写入；替换策略下不会失败，出错时原样返回文档
pub fn write(doc: &Node, path: &Path, value: Node) -> Node {
    write_with(doc, path, value, ConflictPolicy::Replace).unwrap_or_else(|_| doc.clone())
}

/// 写入 `value` 到 `path`，返回新文档；`doc` 本身不被修改
///
/// 缺失的中间容器按步骤类型创建：下标步骤创建数组，键步骤创建对象。
/// 下标只能指向已有元素或数组末尾（追加）；更大的下标在替换策略下
/// 不做任何修改，在拒绝策略下返回 [`WriteError::IndexOutOfRange`]。
pub fn write_with(
    doc: &Node,
    path: &Path,
    value: Node,
    policy: ConflictPolicy,
) -> Result<Node, WriteError> {
    if let Some((depth, len)) = index_gap(doc, path) {
        let at = path.prefix(depth + 1);
        return match policy {
            ConflictPolicy::Replace => {
                tracing::warn!("写入路径 `{}` 时下标越界（`{}` 处长度 {}），已忽略", path, at, len);
                Ok(doc.clone())
            }
            ConflictPolicy::Reject => Err(WriteError::IndexOutOfRange { path: at, len }),
        };
    }
    write_at(Some(doc), path, 0, value, policy)
}

/// 第一个越过数组末尾的下标步骤：(步骤序号, 该处数组长度)
///
/// 按写入时的视角计算：缺失或类型不符的节点会被新建为空容器，长度记为 0。
fn index_gap(doc: &Node, path: &Path) -> Option<(usize, usize)> {
    let mut current = Some(doc);
    for (depth, step) in path.steps().iter().enumerate() {
        current = match (step, current) {
            (Step::Key(key), Some(Node::Object(map))) => map.get(key),
            (Step::Key(_), _) => None,
            (Step::Index(index), node) => {
                let items = node.and_then(Node::as_array).unwrap_or_default();
                if *index > items.len() {
                    return Some((depth, items.len()));
                }
                items.get(*index)
            }
        };
    }
    None
}

fn write_at(
    node: Option<&Node>,
    path: &Path,
    depth: usize,
    value: Node,
    policy: ConflictPolicy,
) -> Result<Node, WriteError> {
    let Some(step) = path.steps().get(depth) else {
        return Ok(value);
    };
    match step {
        Step::Key(key) => {
            let mut fields = match node {
                Some(Node::Object(map)) => ObjectMap::clone(map),
                None => ObjectMap::new(),
                Some(other) => {
                    resolve_conflict(path, depth, NodeKind::Object, other, policy)?;
                    ObjectMap::new()
                }
            };
            let child = write_at(fields.get(key), path, depth + 1, value, policy)?;
            fields.insert(key.clone(), child);
            Ok(Node::Object(Arc::new(fields)))
        }
        Step::Index(index) => {
            let mut items = match node {
                Some(Node::Array(items)) => Vec::clone(items),
                None => Vec::new(),
                Some(other) => {
                    resolve_conflict(path, depth, NodeKind::Array, other, policy)?;
                    Vec::new()
                }
            };
            let child = write_at(items.get(*index), path, depth + 1, value, policy)?;
            // index_gap 已保证 index <= len
            if *index < items.len() {
                items[*index] = child;
            } else {
                items.push(child);
            }
            Ok(Node::Array(Arc::new(items)))
        }
    }
}

pub(crate) fn resolve_conflict(
    path: &Path,
    depth: usize,
    expected: NodeKind,
    found: &Node,
    policy: ConflictPolicy,
) -> Result<(), WriteError> {
    let at = path.prefix(depth);
    match policy {
        ConflictPolicy::Replace => {
            tracing::warn!(
                "写入路径 `{}` 时类型冲突：`{}` 处为 {:?}，已替换为 {:?}",
                path,
                at,
                found.kind(),
                expected
            );
            Ok(())
        }
        ConflictPolicy::Reject => Err(WriteError::TypeConflict {
            path: at,
            expected,
            found: found.kind(),
        }),
    }
}
