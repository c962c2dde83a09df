//! 运行配置：可选 JSON 配置文件 + 环境变量覆盖

use std::path::{Path, PathBuf};

use serde::Deserialize;
use thiserror::Error;

use crate::model::access::ConflictPolicy;

// === 常量定义（消除魔法值） ===
pub const DEFAULT_CONFIG_FILE: &str = "biaoge.json";
pub const ENV_CONFIG: &str = "BIAOGE_CONFIG";
pub const ENV_CONTENT_DIR: &str = "BIAOGE_CONTENT_DIR";
pub const ENV_LOG: &str = "BIAOGE_LOG";

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("读取配置文件失败 {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("配置文件格式错误 {}: {source}", .path.display())]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct EditorConfig {
    /// 以文件名为键的内容目录
    pub content_dir: PathBuf,
    pub conflict_policy: ConflictPolicy,
    pub pretty_json: bool,
    pub log_level: String,
}

impl Default for EditorConfig {
    fn default() -> Self {
        Self {
            content_dir: PathBuf::from("uploads"),
            conflict_policy: ConflictPolicy::Replace,
            pretty_json: true,
            log_level: "info".to_string(),
        }
    }
}

impl EditorConfig {
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        serde_json::from_str(&text).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    /// 依次读取 `$BIAOGE_CONFIG` 或工作目录下的 `biaoge.json`（不存在则用默认值），再应用环境变量
    pub fn load() -> Result<Self, ConfigError> {
        let explicit = std::env::var_os(ENV_CONFIG).map(PathBuf::from);
        let mut config = match explicit {
            Some(path) => Self::from_file(&path)?,
            None => {
                let default_path = Path::new(DEFAULT_CONFIG_FILE);
                if default_path.is_file() {
                    Self::from_file(default_path)?
                } else {
                    Self::default()
                }
            }
        };
        config.apply_overrides(|key| std::env::var(key).ok());
        Ok(config)
    }

    fn apply_overrides<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(dir) = lookup(ENV_CONTENT_DIR).filter(|s| !s.is_empty()) {
            self.content_dir = PathBuf::from(dir);
        }
        if let Some(level) = lookup(ENV_LOG).filter(|s| !s.is_empty()) {
            self.log_level = level;
        }
    }

    /// 日志级别；无法识别时回退为 INFO
    pub fn max_level(&self) -> tracing::Level {
        self.log_level.parse().unwrap_or(tracing::Level::INFO)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn test_partial_file_keeps_defaults() {
        let mut file = NamedTempFile::new().expect("创建临时文件失败");
        file.write_all(br#"{"conflict_policy": "reject", "content_dir": "data"}"#)
            .expect("写入临时文件失败");

        let config = EditorConfig::from_file(file.path()).unwrap();
        assert_eq!(config.conflict_policy, ConflictPolicy::Reject);
        assert_eq!(config.content_dir, PathBuf::from("data"));
        assert!(config.pretty_json, "未指定的字段取默认值");
        assert_eq!(config.log_level, "info");
    }

    #[test]
    fn test_env_overrides() {
        let mut config = EditorConfig::default();
        config.apply_overrides(|key| match key {
            ENV_CONTENT_DIR => Some("/srv/files".to_string()),
            ENV_LOG => Some("debug".to_string()),
            _ => None,
        });
        assert_eq!(config.content_dir, PathBuf::from("/srv/files"));
        assert_eq!(config.max_level(), tracing::Level::DEBUG);
    }

    #[test]
    fn test_unknown_level_falls_back_to_info() {
        let config = EditorConfig {
            log_level: "loud".to_string(),
            ..EditorConfig::default()
        };
        assert_eq!(config.max_level(), tracing::Level::INFO);
    }

    #[test]
    fn test_malformed_file_is_an_error() {
        let mut file = NamedTempFile::new().expect("创建临时文件失败");
        file.write_all(b"{oops").expect("写入临时文件失败");
        let err = EditorConfig::from_file(file.path()).unwrap_err();
        assert!(matches!(err, ConfigError::Parse { .. }));
        assert!(err.to_string().contains("配置文件格式错误"));
    }

    #[test]
    fn test_missing_file_names_the_path() {
        let dir = tempfile::tempdir().expect("创建临时目录失败");
        let path = dir.path().join("absent.json");
        match EditorConfig::from_file(&path) {
            Err(ConfigError::Io { path: reported, .. }) => assert_eq!(reported, path),
            other => panic!("应为读取错误: {other:?}"),
        }
    }
}
