//! # Story Packer
//!
//! 故事打包工具 - 将工程目录编译为单个 .lvna 文件，用于发布。
//!
//! ## 用法
//!
//! ```bash
//! # 在项目根目录使用 cargo 运行
//! cargo run -p story-packer
//! cargo run -p story-packer -- --input story --output tea.lvna
//! cargo run -p story-packer -- list tea.lvna
//! cargo run -p story-packer -- verify tea.lvna --input story
//!
//! # 或安装后直接使用
//! cargo install --path tools/story-packer
//! packer --input story --output tea.lvna
//! ```

use std::path::{Path, PathBuf};
use std::process::ExitCode;

use anyhow::Context;
use clap::{Parser, Subcommand};
use lvna_runtime::container::checksum;
use lvna_runtime::{DiagnosticLevel, read_story, write_story};
use sha2::{Digest, Sha256};
use story_packer::check_project;

#[derive(Parser)]
#[command(name = "packer")]
#[command(about = "故事打包工具 - 将工程目录编译为 .lvna 文件")]
#[command(version, author)]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,

    /// 工程目录（默认：story）
    #[arg(short, long, default_value = "story", global = true)]
    input: PathBuf,

    /// 输出文件（默认：story.lvna）
    #[arg(short, long, default_value = "story.lvna", global = true)]
    output: PathBuf,
}

#[derive(Subcommand)]
enum Commands {
    /// 列出 .lvna 内容
    List {
        /// .lvna 文件路径
        file: PathBuf,
    },

    /// 验证 .lvna 完整性
    Verify {
        /// .lvna 文件路径
        file: PathBuf,

        /// 工程目录（用于对比）
        #[arg(short, long)]
        input: Option<PathBuf>,
    },
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    let result = match cli.command {
        // 默认行为：编译工程
        None => pack_story(&cli.input, &cli.output),
        Some(Commands::List { file }) => list_story(&file),
        Some(Commands::Verify { file, input }) => verify_story(&file, input.as_deref()),
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("❌ {e:#}");
            ExitCode::from(1)
        }
    }
}

/// 编译工程目录到 .lvna 文件
fn pack_story(input: &Path, output: &Path) -> anyhow::Result<()> {
    println!("📦 编译工程: {:?} -> {:?}", input, output);

    if !input.exists() {
        anyhow::bail!("工程目录不存在: {:?}", input);
    }

    let (story, diagnostics) = check_project(input)?;
    for diagnostic in diagnostics.filter_by_level(DiagnosticLevel::Warn) {
        println!("  {}", diagnostic);
    }

    let bytes = write_story(&story).context("链接期检查未通过")?;
    std::fs::write(output, &bytes).with_context(|| format!("无法写入 {:?}", output))?;

    let scenes: usize = story.chapters.iter().map(|c| c.scenes.len()).sum();
    println!();
    println!("✅ 编译完成！");
    println!("   章节数: {}", story.chapters.len());
    println!("   场景数: {}", scenes);
    println!("   可复用脚本: {}", story.reusables.len());
    println!("   素材数: {}", story.assets.len());
    println!("   文件大小: {}", format_size(bytes.len() as u64));
    println!("   SHA-256: {:x}", Sha256::digest(&bytes));

    Ok(())
}

/// 列出 .lvna 内容
fn list_story(file: &Path) -> anyhow::Result<()> {
    println!("📋 .lvna 内容: {:?}", file);
    println!();

    let bytes = std::fs::read(file).with_context(|| format!("无法读取 {:?}", file))?;
    let story = read_story(&bytes)?;

    println!("标题: {}", story.title);
    println!("启动场景: {}", story.startup);
    println!();

    for chapter in &story.chapters {
        let prelude = if chapter.prelude.is_some() { "（含前导脚本）" } else { "" };
        println!("📖 {}{}", chapter.name, prelude);
        for scene in &chapter.scenes {
            println!("   - {} ({} 条指令)", scene.name, scene.script.len());
        }
    }

    if !story.reusables.is_empty() {
        println!();
        println!("🔁 可复用脚本");
        for (name, block) in &story.reusables {
            println!("   - {} ({} 条指令)", name, block.len());
        }
    }

    println!();
    println!("{:<32} {:<8} {:>12}  {}", "素材", "类型", "大小", "SHA-256");
    println!("{}", "-".repeat(120));
    let mut total_size = 0u64;
    for asset in story.assets.iter() {
        total_size += asset.bytes.len() as u64;
        println!(
            "{:<32} {:<8} {:>12}  {}",
            asset.key,
            asset.kind.describe(),
            format_size(asset.bytes.len() as u64),
            checksum(&asset.bytes)
        );
    }
    println!("{}", "-".repeat(120));
    println!(
        "{:<41} {:>12}",
        format!("共 {} 个素材", story.assets.len()),
        format_size(total_size)
    );

    Ok(())
}

/// 验证 .lvna 完整性
fn verify_story(file: &Path, input: Option<&Path>) -> anyhow::Result<()> {
    println!("🔍 验证: {:?}", file);

    let bytes = std::fs::read(file).with_context(|| format!("无法读取 {:?}", file))?;
    // 读取时已校验魔数、版本、边界和每个素材的校验和
    let story = read_story(&bytes)?;

    let diagnostics = story.validate();
    if diagnostics.has_errors() {
        for message in diagnostics.error_messages() {
            println!("  ❌ {}", message);
        }
        anyhow::bail!("发现 {} 个错误", diagnostics.error_count());
    }

    if let Some(input) = input {
        println!("   对比工程目录: {:?}", input);
        let (source, _) = check_project(input)?;
        if source != story {
            anyhow::bail!(".lvna 与工程目录内容不一致，请重新编译");
        }
    }

    println!("✅ 验证通过！");
    Ok(())
}

/// 格式化文件大小
fn format_size(size: u64) -> String {
    if size < 1024 {
        format!("{} B", size)
    } else if size < 1024 * 1024 {
        format!("{:.1} KB", size as f64 / 1024.0)
    } else {
        format!("{:.2} MB", size as f64 / 1024.0 / 1024.0)
    }
}
