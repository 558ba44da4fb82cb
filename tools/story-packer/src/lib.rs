//! # Story Packer
//!
//! 把工程目录编译成 [`Story`]。
//!
//! ## 工程目录结构
//!
//! ```text
//! project/
//! ├── story.json                 标题、启动场景、初始变量、章节与场景顺序
//! ├── scripts/<chapter>/<scene>.lvs
//! ├── scripts/<chapter>/prelude.lvs    可选，章节前导脚本
//! ├── reusables/<name>.lvs       可复用脚本，名称取文件名
//! └── assets/**/<key>.<ext>      素材，键取文件名，类型由扩展名决定
//! ```

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use anyhow::Context;
use lvna_runtime::{
    AssetKind, Chapter, DiagnosticResult, Parser, Scene, ScenePath, ScriptBlock, Story, VarValue,
};
use serde::{Deserialize, Serialize};
use walkdir::WalkDir;

/// 工程清单文件名
pub const MANIFEST_FILE: &str = "story.json";
/// 脚本扩展名
pub const SCRIPT_EXTENSION: &str = "lvs";
/// 章节前导脚本的文件名（不含扩展名）
pub const PRELUDE_NAME: &str = "prelude";

/// story.json
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Manifest {
    pub title: String,
    pub startup: ScenePath,
    /// 初始变量，值按字面量推断类型
    #[serde(default)]
    pub variables: BTreeMap<String, String>,
    pub chapters: Vec<ChapterManifest>,
}

/// 章节清单，场景按列出的顺序编译
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChapterManifest {
    pub name: String,
    pub scenes: Vec<String>,
}

impl Manifest {
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("无法读取清单 {:?}", path))?;
        serde_json::from_str(&content).with_context(|| format!("清单格式错误 {:?}", path))
    }
}

/// 按扩展名判断素材类型
pub fn asset_kind(path: &Path) -> Option<AssetKind> {
    let ext = path.extension()?.to_str()?.to_ascii_lowercase();
    match ext.as_str() {
        "png" | "jpg" | "jpeg" | "gif" | "bmp" | "webp" => Some(AssetKind::Image),
        "ttf" | "otf" => Some(AssetKind::Font),
        "ogg" | "mp3" | "wav" | "flac" => Some(AssetKind::Audio),
        _ => None,
    }
}

/// 解析单个脚本文件，错误信息带上文件路径
pub fn parse_script(parser: &mut Parser, path: &Path) -> anyhow::Result<ScriptBlock> {
    let text = std::fs::read_to_string(path).with_context(|| format!("无法读取脚本 {:?}", path))?;
    parser
        .parse(&text)
        .with_context(|| format!("脚本解析失败 {}", path.display()))
}

/// 编译工程目录
pub fn load_project(root: &Path) -> anyhow::Result<Story> {
    let manifest = Manifest::load(&root.join(MANIFEST_FILE))?;
    let mut parser = Parser::new();

    let mut story = Story::new(manifest.title, manifest.startup);
    story.variables = manifest
        .variables
        .iter()
        .map(|(name, value)| (name.clone(), VarValue::parse_literal(value)))
        .collect();

    let scripts = root.join("scripts");
    for chapter_manifest in &manifest.chapters {
        let dir = scripts.join(&chapter_manifest.name);
        let mut chapter = Chapter::new(&chapter_manifest.name);

        let prelude = script_path(&dir, PRELUDE_NAME);
        if prelude.is_file() {
            chapter = chapter.with_prelude(parse_script(&mut parser, &prelude)?);
        }
        for scene in &chapter_manifest.scenes {
            let block = parse_script(&mut parser, &script_path(&dir, scene))?;
            chapter = chapter.with_scene(Scene::new(scene, block));
        }
        story.chapters.push(chapter);
    }

    let reusables = root.join("reusables");
    if reusables.is_dir() {
        for path in collect_files(&reusables)? {
            if path.extension().is_none_or(|ext| ext != SCRIPT_EXTENSION) {
                continue;
            }
            let name = file_stem(&path)?;
            let block = parse_script(&mut parser, &path)?;
            if story.reusables.insert(name.clone(), block).is_some() {
                anyhow::bail!("可复用脚本重名: {}", name);
            }
        }
    }

    let assets = root.join("assets");
    if assets.is_dir() {
        for path in collect_files(&assets)? {
            let Some(kind) = asset_kind(&path) else {
                eprintln!("⚠️ 跳过无法识别类型的文件: {}", path.display());
                continue;
            };
            let key = file_stem(&path)?;
            if story.assets.lookup(&key).is_some() {
                anyhow::bail!("素材键重复: {} ({})", key, path.display());
            }
            let bytes = std::fs::read(&path).with_context(|| format!("无法读取素材 {:?}", path))?;
            story.assets.insert(key, kind, bytes);
        }
    }

    Ok(story)
}

/// 编译并运行链接期检查
pub fn check_project(root: &Path) -> anyhow::Result<(Story, DiagnosticResult)> {
    let story = load_project(root)?;
    let diagnostics = story.validate();
    Ok((story, diagnostics))
}

fn script_path(dir: &Path, name: &str) -> PathBuf {
    dir.join(format!("{name}.{SCRIPT_EXTENSION}"))
}

fn file_stem(path: &Path) -> anyhow::Result<String> {
    path.file_stem()
        .and_then(|s| s.to_str())
        .map(str::to_string)
        .with_context(|| format!("无效的文件名: {}", path.display()))
}

/// 目录下所有文件，按路径排序保证输出稳定
pub fn collect_files(dir: &Path) -> anyhow::Result<Vec<PathBuf>> {
    let mut files = Vec::new();
    for entry in WalkDir::new(dir) {
        let entry = entry.with_context(|| format!("无法遍历目录 {:?}", dir))?;
        if entry.file_type().is_file() {
            files.push(entry.into_path());
        }
    }
    files.sort();
    Ok(files)
}
