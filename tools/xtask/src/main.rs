//! # xtask - 开发辅助工具
//!
//! 提供本地质量门禁与开发辅助命令。
//!
//! ## 命令
//!
//! - `check-all`: 运行 fmt、clippy、test
//! - `script-check`: 检查工程或脚本文件（语法、悬空引用、素材）

use std::path::{Path, PathBuf};
use std::process::{Command, ExitCode};

use lvna_runtime::{DiagnosticLevel, DiagnosticResult, Parser};
use story_packer::{MANIFEST_FILE, SCRIPT_EXTENSION, check_project, collect_files};

fn run(step: &str, cmd: &mut Command) -> anyhow::Result<()> {
    eprintln!("\n==> {step}");
    let status = cmd.status()?;
    if !status.success() {
        anyhow::bail!("{step} failed with {status}");
    }
    Ok(())
}

fn main() -> ExitCode {
    if let Err(e) = real_main() {
        eprintln!("xtask error: {e:#}");
        return ExitCode::from(1);
    }
    ExitCode::from(0)
}

fn real_main() -> anyhow::Result<()> {
    let mut args = std::env::args().skip(1);
    let sub = args.next().unwrap_or_else(|| "help".to_string());

    match sub.as_str() {
        "check-all" => {
            let mut fmt = Command::new("cargo");
            fmt.args(["fmt", "--all", "--", "--check"]);
            run("cargo fmt --all -- --check", &mut fmt)?;

            let mut clippy = Command::new("cargo");
            clippy.args(["clippy", "--workspace", "--all-targets"]);
            run("cargo clippy --workspace --all-targets", &mut clippy)?;

            let mut test = Command::new("cargo");
            test.args(["test", "--workspace"]);
            run("cargo test --workspace", &mut test)?;
        }
        "script-check" => {
            let path = args.next();
            script_check(path.as_deref())?;
        }
        "help" | "-h" | "--help" => {
            print_help();
        }
        other => anyhow::bail!("unknown xtask subcommand: {other}"),
    }

    Ok(())
}

fn print_help() {
    eprintln!(
        r#"xtask - 开发辅助工具

USAGE:
  cargo xtask <command>

COMMANDS:
  check-all       运行 fmt、clippy、test 门禁检查
  script-check    检查工程或脚本文件

SCRIPT-CHECK:
  cargo xtask script-check [path]

  不带参数：检查 story/ 工程
  工程目录（含 story.json）：编译整个工程并运行链接期检查
  .lvs 文件或普通目录：只检查脚本语法

  链接期检查内容：
    - 章节、场景、可复用脚本重名
    - 未声明的精灵别名
    - 不存在的场景、可复用脚本
    - 素材缺失或类型不符

ALIASES (in .cargo/config.toml):
  cargo check-all     -> cargo xtask check-all
  cargo script-check  -> cargo xtask script-check
"#
    );
}

//=============================================================================
// script-check 命令实现
//=============================================================================

/// 默认工程目录（相对于 workspace root）
const DEFAULT_PROJECT_DIR: &str = "story";

/// 脚本检查结果
struct ScriptCheckResult {
    /// 检查的脚本数量
    scripts_checked: usize,
    /// 解析错误数量
    parse_errors: usize,
    /// 诊断结果
    diagnostics: DiagnosticResult,
}

/// 执行脚本检查
fn script_check(path: Option<&str>) -> anyhow::Result<()> {
    let path = PathBuf::from(path.unwrap_or(DEFAULT_PROJECT_DIR));
    if !path.exists() {
        anyhow::bail!(
            "路径不存在: {}\n请在 workspace 根目录运行，或指定工程/脚本路径",
            path.display()
        );
    }

    let mut result = ScriptCheckResult {
        scripts_checked: 0,
        parse_errors: 0,
        diagnostics: DiagnosticResult::new(),
    };

    if path.join(MANIFEST_FILE).is_file() {
        check_project_dir(&path, &mut result);
    } else {
        let files = if path.is_file() {
            vec![path]
        } else {
            collect_files(&path)?
                .into_iter()
                .filter(|p| p.extension().is_some_and(|ext| ext == SCRIPT_EXTENSION))
                .collect()
        };
        if files.is_empty() {
            eprintln!("未找到脚本文件（.{SCRIPT_EXTENSION}）");
            return Ok(());
        }
        eprintln!("==> 检查 {} 个脚本文件...\n", files.len());
        for file in &files {
            check_script_file(file, &mut result);
        }
    }

    print_check_result(&result);

    if result.parse_errors > 0 || result.diagnostics.has_errors() {
        anyhow::bail!("脚本检查发现错误");
    }
    Ok(())
}

/// 编译整个工程并运行链接期检查
fn check_project_dir(root: &Path, result: &mut ScriptCheckResult) {
    eprintln!("==> 检查工程 {}...\n", root.display());
    match check_project(root) {
        Ok((story, diagnostics)) => {
            result.scripts_checked = story.blocks().count();
            result.diagnostics.merge(diagnostics);
        }
        Err(e) => {
            eprintln!("[ERROR] {e:#}");
            result.parse_errors += 1;
        }
    }
}

/// 检查单个脚本文件的语法
fn check_script_file(file: &Path, result: &mut ScriptCheckResult) {
    let script_id = file.display().to_string();
    result.scripts_checked += 1;

    let content = match std::fs::read_to_string(file) {
        Ok(c) => c,
        Err(e) => {
            eprintln!("[ERROR] {}: 无法读取文件 - {}", script_id, e);
            result.parse_errors += 1;
            return;
        }
    };

    if let Err(e) = Parser::new().parse(&content) {
        eprintln!("[ERROR] {}: {}", script_id, e);
        result.parse_errors += 1;
    }
}

/// 输出检查结果
fn print_check_result(result: &ScriptCheckResult) {
    eprintln!("─────────────────────────────────────────────────────");
    eprintln!("检查完成: {} 个脚本", result.scripts_checked);
    eprintln!();

    for diag in result.diagnostics.filter_by_level(DiagnosticLevel::Info) {
        eprintln!("{}", diag);
    }

    let error_count = result.parse_errors + result.diagnostics.error_count();
    let warn_count = result.diagnostics.warn_count();

    eprintln!();
    if error_count > 0 {
        eprintln!("❌ {} 个错误, {} 个警告", error_count, warn_count);
    } else if warn_count > 0 {
        eprintln!("⚠️  0 个错误, {} 个警告", warn_count);
    } else {
        eprintln!("✅ 检查通过，无错误");
    }
}
