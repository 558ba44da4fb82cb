//! # LVNA Player
//!
//! `lvna-runtime` 的无头驱动方。
//!
//! ## 架构说明
//!
//! 播放器负责：
//! - 读取配置和 `.lvna` 文件
//! - 按固定帧率驱动会话
//! - 把会话发出的命令写入日志
//! - 自动推进 halt 和 choice
//!
//! 播放器不包含脚本逻辑，也不做渲染和音频播放。

pub mod config;
pub mod driver;

pub use config::{ConfigError, PlayerConfig};
pub use driver::{HeadlessDriver, RunReport, StopReason};

use anyhow::Context;
use lvna_runtime::{Session, SessionOptions, read_story};

/// 按配置加载故事并创建驱动
pub fn load_driver(config: PlayerConfig) -> anyhow::Result<HeadlessDriver> {
    let bytes = std::fs::read(&config.story_path)
        .with_context(|| format!("无法读取故事文件 {:?}", config.story_path))?;
    let story = read_story(&bytes)
        .with_context(|| format!("无法加载故事文件 {:?}", config.story_path))?;

    let options = SessionOptions {
        startup: config.startup.clone(),
    };
    let session = Session::new(story, options).context("无法创建播放会话")?;
    Ok(HeadlessDriver::new(session, config))
}
