//! 数据层：文档树、路径、读写器与表格视图

pub mod access;
pub mod classify;
pub mod data_core;
pub mod discovery;
pub mod grid;
pub mod node;
pub mod path;
pub mod performance;
pub mod projection;
