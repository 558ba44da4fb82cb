//! # Config 模块
//!
//! 播放器配置，集中管理所有配置项。
//!
//! ## 配置优先级
//!
//! 1. 命令行参数（最高）
//! 2. 配置文件 (player.json)
//! 3. 默认值（最低）

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use lvna_runtime::ScenePath;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// 播放器配置
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlayerConfig {
    /// `.lvna` 文件路径
    #[serde(default = "default_story_path")]
    pub story_path: PathBuf,

    /// 帧率（每秒 tick 次数）
    #[serde(default = "default_frame_rate")]
    pub frame_rate: u32,

    /// 最多运行的帧数，防止脚本永不结束
    #[serde(default = "default_max_frames")]
    pub max_frames: u64,

    /// 自动推进 halt 和 choice
    #[serde(default = "default_auto_advance")]
    pub auto_advance: bool,

    /// 自动推进前等待的时间（毫秒）
    #[serde(default = "default_auto_advance_delay_ms")]
    pub auto_advance_delay_ms: u64,

    /// 自动选择时使用的选项下标，超出范围时取最后一项
    #[serde(default)]
    pub auto_choice_index: usize,

    /// 手动指定启动场景
    #[serde(default)]
    pub startup: Option<ScenePath>,

    /// 日志级别，`RUST_LOG` 优先
    #[serde(default = "default_log_level")]
    pub log_level: String,

    /// 每帧输出渲染快照
    #[serde(default)]
    pub print_snapshots: bool,
}

// 默认值函数
fn default_story_path() -> PathBuf {
    PathBuf::from("story.lvna")
}

fn default_frame_rate() -> u32 {
    60
}

fn default_max_frames() -> u64 {
    // 60 帧下十分钟
    36_000
}

fn default_auto_advance() -> bool {
    true
}

fn default_auto_advance_delay_ms() -> u64 {
    500
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for PlayerConfig {
    fn default() -> Self {
        Self {
            story_path: default_story_path(),
            frame_rate: default_frame_rate(),
            max_frames: default_max_frames(),
            auto_advance: default_auto_advance(),
            auto_advance_delay_ms: default_auto_advance_delay_ms(),
            auto_choice_index: 0,
            startup: None,
            log_level: default_log_level(),
            print_snapshots: false,
        }
    }
}

impl PlayerConfig {
    /// 加载配置文件
    ///
    /// 文件不存在时返回默认配置；解析失败返回错误，避免静默使用错误的配置。
    /// 此时日志尚未初始化，提示直接打印。
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();

        if !path.exists() {
            println!("⚠️ 配置文件不存在: {:?}，使用默认配置", path);
            return Ok(Self::default());
        }

        let content = fs::read_to_string(path).map_err(|e| ConfigError::Io {
            path: path.to_path_buf(),
            message: e.to_string(),
        })?;
        let config = serde_json::from_str(&content).map_err(|e| ConfigError::Parse {
            path: path.to_path_buf(),
            message: e.to_string(),
        })?;
        println!("✅ 配置文件加载成功: {:?}", path);
        Ok(config)
    }

    /// 保存配置到文件
    pub fn save(&self, path: impl AsRef<Path>) -> Result<(), ConfigError> {
        let path = path.as_ref();
        let json = serde_json::to_string_pretty(self).map_err(|e| ConfigError::Parse {
            path: path.to_path_buf(),
            message: e.to_string(),
        })?;
        fs::write(path, json).map_err(|e| ConfigError::Io {
            path: path.to_path_buf(),
            message: e.to_string(),
        })
    }

    /// 验证配置有效性
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.frame_rate == 0 {
            return Err(ConfigError::Invalid("frame_rate 必须大于 0".to_string()));
        }
        if self.max_frames == 0 {
            return Err(ConfigError::Invalid("max_frames 必须大于 0".to_string()));
        }
        if self.log_level.trim().is_empty() {
            return Err(ConfigError::Invalid("log_level 不能为空".to_string()));
        }
        Ok(())
    }

    /// 每帧的时长
    pub fn frame_time(&self) -> Duration {
        Duration::from_secs(1) / self.frame_rate.max(1)
    }
}

/// 配置错误
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ConfigError {
    /// IO 错误
    #[error("配置文件 {path:?} 读写失败: {message}")]
    Io { path: PathBuf, message: String },

    /// 格式错误
    #[error("配置文件 {path:?} 解析失败: {message}")]
    Parse { path: PathBuf, message: String },

    /// 验证失败
    #[error("配置验证失败: {0}")]
    Invalid(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = PlayerConfig::default();
        assert_eq!(config.frame_rate, 60);
        assert_eq!(config.max_frames, 36_000);
        assert!(config.auto_advance);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_partial_json_uses_defaults() {
        let config: PlayerConfig =
            serde_json::from_str(r#"{ "frame_rate": 30, "startup": { "chapter": "ch2", "scene": "intro" } }"#)
                .unwrap();
        assert_eq!(config.frame_rate, 30);
        assert_eq!(config.auto_advance_delay_ms, 500);
        assert_eq!(config.startup, Some(ScenePath::new("ch2", "intro")));
    }

    #[test]
    fn test_zero_frame_rate_rejected() {
        let config = PlayerConfig {
            frame_rate: 0,
            ..PlayerConfig::default()
        };
        assert!(matches!(config.validate(), Err(ConfigError::Invalid(_))));
    }

    #[test]
    fn test_frame_time() {
        let config = PlayerConfig {
            frame_rate: 50,
            ..PlayerConfig::default()
        };
        assert_eq!(config.frame_time(), Duration::from_millis(20));
    }
}
