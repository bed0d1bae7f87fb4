//! 引擎配置
//!
//! 可从 TOML 文件加载，未提供的字段使用默认值。

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

use crate::core::error::{DBError, DBResult};

#[derive(Debug, Deserialize, Serialize, Clone)]
#[serde(default)]
pub struct EngineConfig {
    pub optimizer: OptimizerConfig,
    pub scheduler: SchedulerConfig,
    pub log: LogConfig,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            optimizer: OptimizerConfig::default(),
            scheduler: SchedulerConfig::default(),
            log: LogConfig::default(),
        }
    }
}

impl EngineConfig {
    pub fn from_file(path: impl AsRef<Path>) -> DBResult<Self> {
        let content = fs::read_to_string(path.as_ref())
            .map_err(|e| DBError::Config(format!("failed to read config file: {}", e)))?;
        toml::from_str(&content)
            .map_err(|e| DBError::Config(format!("failed to parse config: {}", e)))
    }
}

#[derive(Debug, Deserialize, Serialize, Clone)]
#[serde(default)]
pub struct OptimizerConfig {
    /// 不动点迭代的轮数上限；规则对震荡时触发 NoFixpoint 错误而不是死循环
    pub max_iteration_rounds: usize,
}

impl Default for OptimizerConfig {
    fn default() -> Self {
        Self {
            max_iteration_rounds: 64,
        }
    }
}

#[derive(Debug, Deserialize, Serialize, Clone)]
#[serde(default)]
pub struct SchedulerConfig {
    /// 存储 RPC 部分成功时是否按完全失败处理
    pub complete_required: bool,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            complete_required: false,
        }
    }
}

#[derive(Debug, Deserialize, Serialize, Clone)]
#[serde(default)]
pub struct LogConfig {
    pub level: String,
    pub to_file: bool,
    pub dir: String,
    pub file_basename: String,
    pub max_file_size: u64,
    pub max_files: usize,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            to_file: false,
            dir: "logs".to_string(),
            file_basename: "graphquery".to_string(),
            max_file_size: 10 * 1024 * 1024,
            max_files: 5,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_default_config() {
        let config = EngineConfig::default();
        assert_eq!(config.optimizer.max_iteration_rounds, 64);
        assert!(!config.scheduler.complete_required);
        assert_eq!(config.log.level, "info");
    }

    #[test]
    fn test_from_toml_file() {
        let mut file = tempfile::NamedTempFile::new().expect("临时文件创建失败");
        writeln!(
            file,
            "[optimizer]\nmax_iteration_rounds = 8\n\n[scheduler]\ncomplete_required = true\n"
        )
        .expect("写入失败");

        let config = EngineConfig::from_file(file.path()).expect("加载配置失败");
        assert_eq!(config.optimizer.max_iteration_rounds, 8);
        assert!(config.scheduler.complete_required);
        assert_eq!(config.log.level, "info");
    }

    #[test]
    fn test_malformed_toml_is_config_error() {
        let mut file = tempfile::NamedTempFile::new().expect("临时文件创建失败");
        writeln!(file, "[optimizer\nmax_iteration_rounds = 8").expect("写入失败");

        let err = EngineConfig::from_file(file.path()).unwrap_err();
        assert!(matches!(err, DBError::Config(_)));
        assert!(err.to_string().contains("failed to parse config"));
    }

    #[test]
    fn test_missing_file_is_config_error() {
        let dir = tempfile::tempdir().expect("临时目录创建失败");
        let err = EngineConfig::from_file(dir.path().join("absent.toml")).unwrap_err();
        assert!(matches!(err, DBError::Config(_)));
        assert!(err.to_string().contains("failed to read config file"));
    }
}
