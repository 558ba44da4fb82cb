//! LVNA Player - 无头播放器
//!
//! ## 用法
//!
//! ```bash
//! cargo run -p lvna-player -- story.lvna
//! cargo run -p lvna-player -- story.lvna --chapter ch2 --scene intro
//! cargo run -p lvna-player -- --config player.json --no-auto-advance
//! RUST_LOG=lvna_runtime=debug cargo run -p lvna-player -- story.lvna
//! ```

use std::path::PathBuf;

use anyhow::Context;
use clap::Parser;
use lvna_player::{PlayerConfig, StopReason, load_driver};
use lvna_runtime::ScenePath;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "lvna-player")]
#[command(about = "LVNAuth 无头播放器 - 按固定帧率播放 .lvna 故事")]
#[command(version)]
struct Cli {
    /// .lvna 文件（覆盖配置文件中的 story_path）
    story: Option<PathBuf>,

    /// 配置文件
    #[arg(short, long, default_value = "player.json")]
    config: PathBuf,

    /// 帧率
    #[arg(long)]
    frame_rate: Option<u32>,

    /// 最多运行的帧数
    #[arg(long)]
    max_frames: Option<u64>,

    /// 关闭自动推进，遇到 halt 或 choice 时停止
    #[arg(long)]
    no_auto_advance: bool,

    /// 自动选择使用的选项下标
    #[arg(long)]
    choice: Option<usize>,

    /// 启动章节（需要和 --scene 一起使用）
    #[arg(long, requires = "scene")]
    chapter: Option<String>,

    /// 启动场景
    #[arg(long, requires = "chapter")]
    scene: Option<String>,

    /// 日志级别（RUST_LOG 优先）
    #[arg(long)]
    log_level: Option<String>,

    /// 每帧输出渲染快照
    #[arg(long)]
    print_snapshots: bool,
}

impl Cli {
    /// 命令行参数覆盖配置文件
    fn apply(self, mut config: PlayerConfig) -> PlayerConfig {
        if let Some(story) = self.story {
            config.story_path = story;
        }
        if let Some(frame_rate) = self.frame_rate {
            config.frame_rate = frame_rate;
        }
        if let Some(max_frames) = self.max_frames {
            config.max_frames = max_frames;
        }
        if self.no_auto_advance {
            config.auto_advance = false;
        }
        if let Some(choice) = self.choice {
            config.auto_choice_index = choice;
        }
        if let (Some(chapter), Some(scene)) = (self.chapter, self.scene) {
            config.startup = Some(ScenePath::new(chapter, scene));
        }
        if let Some(level) = self.log_level {
            config.log_level = level;
        }
        if self.print_snapshots {
            config.print_snapshots = true;
        }
        config
    }
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let config = PlayerConfig::load(&cli.config).context("配置加载失败")?;
    let config = cli.apply(config);
    config.validate().context("配置无效")?;

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.log_level)),
        )
        .init();

    tracing::info!(story = ?config.story_path, frame_rate = config.frame_rate, "启动播放器");

    let mut driver = load_driver(config)?;
    let report = driver.run().context("播放失败")?;

    println!();
    println!("📊 播放报告");
    println!("   帧数: {}", report.frames);
    println!("   命令数: {}", report.commands);
    println!("   对话行数: {}", report.dialog.len());
    println!("   素材错误: {}", report.asset_errors);

    match report.reason {
        StopReason::Finished => {
            println!("✅ 播放完成");
            Ok(())
        }
        StopReason::WaitingForInput => {
            println!("⏸️ 停在等待输入处（自动推进已关闭）");
            Ok(())
        }
        StopReason::FrameLimit => {
            anyhow::bail!("达到帧数上限 {} 仍未播放完毕", report.frames)
        }
        StopReason::SceneError => {
            for error in &report.scene_errors {
                eprintln!("❌ {}", error);
            }
            anyhow::bail!("场景因运行时错误中止")
        }
    }
}
