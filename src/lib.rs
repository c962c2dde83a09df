//! 表格编辑工具库
//!
//! 把任意 JSON 文档或工作簿呈现为可编辑的表格：发现记录数组、
//! 投影为行列视图、按路径写回，并支持嵌套对象与嵌套记录数组的编辑

pub mod config;
pub mod model;
pub mod utils;
pub mod vm;

// 重新导出主要类型
pub use config::{ConfigError, EditorConfig};
pub use model::access::{read, write, write_with, ConflictPolicy, WriteError};
pub use model::data_core::{AppError, AppState};
pub use model::node::{Node, NodeKind};
pub use model::path::{Path, PathError, Step};
pub use utils::fs::{ContentDir, DocumentStore, StorageError};
