//! # 诊断模块
//!
//! 故事的链接期静态检查，不依赖 IO 或会话。
//!
//! ## 设计原则
//!
//! - 纯函数 API，可在无 IO 环境下运行
//! - 诊断分级：Error（必须修复）、Warn（建议修复）、Info（信息提示）
//! - 复用已解析的指令块，不重复解析逻辑
//!
//! 容器写入前和 `xtask script-check` 都会调用 [`validate_story`]。

use std::collections::{BTreeMap, BTreeSet, HashSet};

use crate::error::AssetError;
use crate::script::{Instruction, SpriteCategory};
use crate::story::{AssetKind, Story};

/// 诊断级别
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum DiagnosticLevel {
    /// 信息提示
    Info,
    /// 警告（建议修复）
    Warn,
    /// 错误（必须修复）
    Error,
}

impl std::fmt::Display for DiagnosticLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Info => write!(f, "INFO"),
            Self::Warn => write!(f, "WARN"),
            Self::Error => write!(f, "ERROR"),
        }
    }
}

/// 诊断条目
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Diagnostic {
    pub level: DiagnosticLevel,
    /// 指令块名称（`chapter/scene`、`chapter/<prelude>`、`reusable:name`）或 `story`
    pub block: String,
    /// 行号（如果可定位，从 1 开始）
    pub line: Option<usize>,
    pub message: String,
    /// 诊断详情（可选）
    pub detail: Option<String>,
}

impl Diagnostic {
    fn new(level: DiagnosticLevel, block: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            level,
            block: block.into(),
            line: None,
            message: message.into(),
            detail: None,
        }
    }

    /// 创建错误诊断
    pub fn error(block: impl Into<String>, message: impl Into<String>) -> Self {
        Self::new(DiagnosticLevel::Error, block, message)
    }

    /// 创建警告诊断
    pub fn warn(block: impl Into<String>, message: impl Into<String>) -> Self {
        Self::new(DiagnosticLevel::Warn, block, message)
    }

    /// 创建信息诊断
    pub fn info(block: impl Into<String>, message: impl Into<String>) -> Self {
        Self::new(DiagnosticLevel::Info, block, message)
    }

    /// 设置行号（0 表示未知）
    pub fn with_line(mut self, line: usize) -> Self {
        self.line = (line > 0).then_some(line);
        self
    }

    pub fn with_detail(mut self, detail: impl Into<String>) -> Self {
        self.detail = Some(detail.into());
        self
    }
}

impl std::fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "[{}] {}", self.level, self.block)?;
        if let Some(line) = self.line {
            write!(f, ":{}", line)?;
        }
        write!(f, ": {}", self.message)?;
        if let Some(detail) = &self.detail {
            write!(f, "\n  | {}", detail)?;
        }
        Ok(())
    }
}

/// 诊断结果
#[derive(Debug, Clone, Default)]
pub struct DiagnosticResult {
    pub diagnostics: Vec<Diagnostic>,
}

impl DiagnosticResult {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, diagnostic: Diagnostic) {
        self.diagnostics.push(diagnostic);
    }

    /// 合并另一个结果
    pub fn merge(&mut self, other: DiagnosticResult) {
        self.diagnostics.extend(other.diagnostics);
    }

    pub fn error_count(&self) -> usize {
        self.diagnostics
            .iter()
            .filter(|d| d.level == DiagnosticLevel::Error)
            .count()
    }

    pub fn warn_count(&self) -> usize {
        self.diagnostics
            .iter()
            .filter(|d| d.level == DiagnosticLevel::Warn)
            .count()
    }

    pub fn has_errors(&self) -> bool {
        self.error_count() > 0
    }

    pub fn is_empty(&self) -> bool {
        self.diagnostics.is_empty()
    }

    /// 按级别过滤
    pub fn filter_by_level(&self, min_level: DiagnosticLevel) -> Vec<&Diagnostic> {
        self.diagnostics
            .iter()
            .filter(|d| d.level >= min_level)
            .collect()
    }

    /// 所有错误的单行描述
    pub fn error_messages(&self) -> Vec<String> {
        self.filter_by_level(DiagnosticLevel::Error)
            .into_iter()
            .map(|d| match d.line {
                Some(line) => format!("{}:{}: {}", d.block, line, d.message),
                None => format!("{}: {}", d.block, d.message),
            })
            .collect()
    }
}

//=============================================================================
// 故事检查 API
//=============================================================================

/// 检查整个故事
///
/// 执行以下检查：
/// - 重复的章节名 / 场景名
/// - 启动场景不存在
/// - 引用了从未声明的精灵别名
/// - 图像 / 字体 / 音频素材缺失或类型不符
/// - call / after / 动画结束钩子的目标不是可复用脚本
/// - scene 跳转目标不存在
pub fn validate_story(story: &Story) -> DiagnosticResult {
    let mut result = DiagnosticResult::new();

    check_structure(story, &mut result);

    let declared = collect_declarations(story);
    for (block_name, block) in story.blocks() {
        for (index, instruction) in block.instructions.iter().enumerate() {
            let line = block.line_of(index);
            check_instruction(story, &declared, &block_name, line, instruction, &mut result);
        }
    }

    check_unused_reusables(story, &mut result);

    result
}

fn check_structure(story: &Story, result: &mut DiagnosticResult) {
    let mut chapter_names = HashSet::new();
    for chapter in &story.chapters {
        if !chapter_names.insert(chapter.name.as_str()) {
            result.push(Diagnostic::error(
                "story",
                format!("重复的章节名: '{}'", chapter.name),
            ));
        }
        let mut scene_names = HashSet::new();
        for scene in &chapter.scenes {
            if !scene_names.insert(scene.name.as_str()) {
                result.push(Diagnostic::error(
                    "story",
                    format!("章节 '{}' 中场景名重复: '{}'", chapter.name, scene.name),
                ));
            }
        }
    }

    if story.scene(&story.startup).is_none() {
        result.push(Diagnostic::error(
            "story",
            format!("启动场景 '{}' 不存在", story.startup),
        ));
    }
}

/// 收集故事中所有 load / load_as 声明过的别名
fn collect_declarations(story: &Story) -> BTreeSet<(SpriteCategory, String)> {
    story
        .blocks()
        .flat_map(|(_, block)| block.instructions.iter())
        .filter_map(|i| i.sprite_declaration())
        .map(|(category, alias)| (category, alias.to_string()))
        .collect()
}

fn check_instruction(
    story: &Story,
    declared: &BTreeSet<(SpriteCategory, String)>,
    block_name: &str,
    line: usize,
    instruction: &Instruction,
    result: &mut DiagnosticResult,
) {
    if let Some((category, alias)) = instruction.sprite_reference() {
        check_declared(declared, block_name, line, category, alias, result);
    }

    if let Some(key) = instruction.image_reference() {
        check_asset(story, block_name, line, key, AssetKind::Image, result);
    }

    match instruction {
        Instruction::Font { name } => {
            check_asset(story, block_name, line, name, AssetKind::Font, result);
        }
        Instruction::PlayAudio { key, .. } => {
            check_asset(story, block_name, line, key, AssetKind::Audio, result);
        }
        Instruction::Scene { chapter, scene } => {
            if story.chapter(chapter).and_then(|c| c.scene(scene)).is_none() {
                result.push(
                    Diagnostic::error(block_name, format!("跳转目标场景 '{chapter}/{scene}' 不存在"))
                        .with_line(line),
                );
            }
        }
        Instruction::CenterXWith {
            other_category,
            other_alias,
            ..
        } => {
            check_declared(declared, block_name, line, *other_category, other_alias, result);
        }
        Instruction::AfterCancel { script } => {
            if story.reusable(script).is_none() {
                result.push(
                    Diagnostic::warn(block_name, format!("after_cancel 的目标 '{script}' 不是可复用脚本"))
                        .with_line(line),
                );
            }
        }
        _ => {}
    }

    if let Some(script) = instruction.script_reference()
        && story.reusable(script).is_none()
    {
        result.push(
            Diagnostic::error(block_name, format!("可复用脚本 '{script}' 不存在")).with_line(line),
        );
    }
}

fn check_declared(
    declared: &BTreeSet<(SpriteCategory, String)>,
    block_name: &str,
    line: usize,
    category: SpriteCategory,
    alias: &str,
    result: &mut DiagnosticResult,
) {
    if declared.contains(&(category, alias.to_string())) {
        return;
    }
    result.push(
        Diagnostic::error(block_name, format!("{category} 精灵 '{alias}' 从未被加载"))
            .with_line(line)
            .with_detail(format!("故事中没有 <load_{category}: ..., {alias}> 或 load_as 声明")),
    );
}

fn check_asset(
    story: &Story,
    block_name: &str,
    line: usize,
    key: &str,
    kind: AssetKind,
    result: &mut DiagnosticResult,
) {
    let checked = match kind {
        AssetKind::Image => story.assets.resolve_image(key).map(|_| ()),
        _ => story.assets.require(key, kind).map(|_| ()),
    };
    match checked {
        Ok(()) => {}
        // 数据无法识别时播放仍可继续，精灵只是不显示
        Err(e @ AssetError::Undecodable { .. }) => {
            result.push(Diagnostic::warn(block_name, e.to_string()).with_line(line));
        }
        Err(e) => {
            result.push(Diagnostic::error(block_name, e.to_string()).with_line(line));
        }
    }
}

fn check_unused_reusables(story: &Story, result: &mut DiagnosticResult) {
    let mut referenced: BTreeMap<&str, usize> = BTreeMap::new();
    for (_, block) in story.blocks() {
        for script in block.instructions.iter().filter_map(|i| i.script_reference()) {
            *referenced.entry(script).or_default() += 1;
        }
    }
    for name in story.reusables.keys() {
        if !referenced.contains_key(name.as_str()) {
            result.push(Diagnostic::info(
                format!("reusable:{name}"),
                "可复用脚本从未被引用",
            ));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::script::{Parser, ScriptBlock};
    use crate::story::{Chapter, Scene, ScenePath};

    const PNG: &[u8] = b"\x89PNG\r\n\x1a\n0000";

    fn block(text: &str) -> ScriptBlock {
        Parser::new().parse(text).unwrap()
    }

    fn story_with(scene_text: &str) -> Story {
        let mut story = Story::new("测试", ScenePath::new("ch1", "intro"));
        story.chapters.push(Chapter::new("ch1").with_scene(Scene::new("intro", block(scene_text))));
        story.assets.insert("rave_normal", AssetKind::Image, PNG);
        story.assets.insert("theme", AssetKind::Audio, &b"OggS"[..]);
        story
    }

    #[test]
    fn test_diagnostic_display() {
        let diag = Diagnostic::error("ch1/intro", "可复用脚本 'x' 不存在")
            .with_line(10)
            .with_detail("call 的目标");

        let display = format!("{}", diag);
        assert!(display.contains("[ERROR]"));
        assert!(display.contains("ch1/intro:10"));
        assert!(display.contains("call 的目标"));
    }

    #[test]
    fn test_valid_story_has_no_errors() {
        let story = story_with(
            "<load_character: rave_normal, rave>\n<character_show: rave>\n<play_music: theme, loop>",
        );
        let result = validate_story(&story);
        assert!(!result.has_errors(), "{:?}", result.diagnostics);
    }

    #[test]
    fn test_undeclared_alias_reported_with_line() {
        let story = story_with("Hello\n<character_show: theo>");
        let result = validate_story(&story);
        assert_eq!(result.error_count(), 1);
        let diag = &result.diagnostics[0];
        assert_eq!(diag.line, Some(2));
        assert!(diag.message.contains("theo"));
    }

    #[test]
    fn test_center_x_with_checks_both_sprites() {
        let story = story_with(
            "<load_character: rave_normal, rave>\n<character_center_x_with: rave, object, cup>",
        );
        let result = validate_story(&story);
        assert_eq!(result.error_count(), 1, "{:?}", result.diagnostics);
        let diag = &result.diagnostics[0];
        assert_eq!(diag.line, Some(2));
        assert!(diag.message.contains("cup"));

        let story = story_with(
            "<load_object: rave_normal, cup>\n<character_center_x_with: rave, object, cup>",
        );
        let result = validate_story(&story);
        assert_eq!(result.error_count(), 1, "{:?}", result.diagnostics);
        assert!(result.diagnostics[0].message.contains("rave"));
    }

    #[test]
    fn test_alias_declared_in_other_block_is_accepted() {
        let mut story = story_with("<call: enter>");
        story.reusables.insert(
            "enter".to_string(),
            block("<character_fade: rave, 100, 500>"),
        );
        story.chapters[0].prelude = Some(block("<load_character: rave_normal, rave>"));
        let result = validate_story(&story);
        assert!(!result.has_errors(), "{:?}", result.diagnostics);
    }

    #[test]
    fn test_asset_problems() {
        let story = story_with("<load_object: cup_img, cup>\n<play_sound: rave_normal>");
        let result = validate_story(&story);
        assert_eq!(result.error_count(), 2);
        assert!(result.diagnostics[0].message.contains("cup_img"));
        assert!(result.diagnostics[1].message.contains("不是音频"));
    }

    #[test]
    fn test_undecodable_image_is_warning() {
        let mut story = story_with("<load_object: cup_img, cup>");
        story.assets.insert("cup_img", AssetKind::Image, &b"not an image"[..]);
        let result = validate_story(&story);
        assert!(!result.has_errors());
        assert_eq!(result.warn_count(), 1);
    }

    #[test]
    fn test_missing_targets() {
        let story = story_with("<call: nowhere>\n<scene: ch2, start>");
        let result = validate_story(&story);
        assert_eq!(result.error_count(), 2);
        let messages = result.error_messages();
        assert!(messages[0].contains("nowhere"));
        assert!(messages[1].contains("ch2/start"));
    }

    #[test]
    fn test_duplicate_names_and_missing_startup() {
        let mut story = Story::new("测试", ScenePath::new("ch1", "missing"));
        story.chapters.push(
            Chapter::new("ch1")
                .with_scene(Scene::new("a", ScriptBlock::default()))
                .with_scene(Scene::new("a", ScriptBlock::default())),
        );
        story.chapters.push(Chapter::new("ch1"));
        let result = validate_story(&story);
        // 场景名重复、章节名重复、启动场景不存在
        assert_eq!(result.error_count(), 3);
    }

    #[test]
    fn test_unused_reusable_is_info() {
        let mut story = story_with("Hi");
        story.reusables.insert("idle".to_string(), ScriptBlock::default());
        let result = validate_story(&story);
        assert!(!result.has_errors());
        assert_eq!(result.filter_by_level(DiagnosticLevel::Info).len(), 1);
    }
}
