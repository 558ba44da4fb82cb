//! # Engine 模块
//!
//! 会话：一个故事的播放状态机。
//!
//! ## 执行模型
//!
//! ```text
//! tick(dt)       -> Vec<Command>   每帧调用一次
//! advance(event) -> Vec<Command>   收到用户输入时调用
//! snapshot()     -> Snapshot       渲染适配器读取
//! ```
//!
//! 单次 tick 的顺序：
//!
//! 1. 推进会话时钟和所有补间（动画先于等待检查，恰好在本帧结束的动画本帧可见）
//! 2. 动画完成钩子派生后台读取器
//! 3. 到期的 after 计时器派生后台读取器
//! 4. 检查主读取器的等待条件，满足则继续执行到下一个阻塞点
//! 5. 依次运行后台读取器
//! 6. 如有场景切换，清空精灵、读取器、计时器和等待，新场景在下一次 tick 开始执行

use std::collections::BTreeMap;
use std::time::Duration;

use tracing::{debug, info, warn};

use super::call_stack::{CallStack, Frame, ScriptRef};
use super::executor::{DialogState, ExecContext, Executor};
use super::timer::TimerQueue;
use crate::animation::{AnimationEnd, AnimationEvent, AnimationScheduler};
use crate::command::Command;
use crate::error::{AssetError, RuntimeError};
use crate::input::PlayerEvent;
use crate::script::Instruction;
use crate::snapshot::Snapshot;
use crate::sprite::SpriteRegistry;
use crate::state::{
    HaltReason, InputKind, InterpreterState, SceneError, VarValue, VariableTable,
};
use crate::story::{ScenePath, Story};

/// 会话选项
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SessionOptions {
    /// 覆盖故事自带的启动场景
    pub startup: Option<ScenePath>,
}

/// 读取器：一条独立推进的指令流
#[derive(Debug, Clone)]
struct Reader {
    stack: CallStack,
    state: InterpreterState,
    /// 后台读取器运行的可复用脚本名，主读取器为 `None`
    background: Option<String>,
}

impl Reader {
    /// 场景主读取器；章节前导脚本压在场景帧之上，先于场景执行
    fn main(story: &Story, chapter: usize, scene: usize) -> Result<Self, RuntimeError> {
        let mut stack = CallStack::new(0);
        stack.push(Frame::new(ScriptRef::Scene { chapter, scene }))?;
        if story
            .chapters
            .get(chapter)
            .is_some_and(|c| c.prelude.is_some())
        {
            stack.push(Frame::new(ScriptRef::Prelude { chapter }))?;
        }
        Ok(Self {
            stack,
            state: InterpreterState::Running,
            background: None,
        })
    }

    fn idle() -> Self {
        Self {
            stack: CallStack::new(0),
            state: InterpreterState::Halted(HaltReason::Finished),
            background: None,
        }
    }

    /// 后台读取器
    fn spawn(
        story: &Story,
        script: &str,
        base_depth: usize,
        locals: BTreeMap<String, VarValue>,
    ) -> Result<Self, RuntimeError> {
        if story.reusable(script).is_none() {
            return Err(RuntimeError::UnknownScript {
                name: script.to_string(),
            });
        }
        let mut stack = CallStack::new(base_depth);
        stack.push(Frame::new(ScriptRef::Reusable(script.to_string())).with_locals(locals))?;
        Ok(Self {
            stack,
            state: InterpreterState::Running,
            background: Some(script.to_string()),
        })
    }
}

/// 读取器出错的位置
#[derive(Debug)]
struct Failure {
    error: RuntimeError,
    script: Option<String>,
    instruction: usize,
    line: usize,
}

impl Failure {
    fn spawn(error: RuntimeError, script: &str) -> Self {
        Self {
            error,
            script: Some(script.to_string()),
            instruction: 0,
            line: 0,
        }
    }
}

/// 播放会话
///
/// # 使用示例
///
/// ```ignore
/// let story = read_story(&bytes)?;
/// let mut session = Session::new(story, SessionOptions::default())?;
///
/// loop {
///     let commands = session.tick(frame_time);
///     // 驱动方执行 commands（音频、对话框）...
///     renderer.draw(&session.snapshot());
///     // 收到输入时：session.advance(PlayerEvent::Advance)?
/// }
/// ```
pub struct Session {
    story: Story,
    executor: Executor,
    registry: SpriteRegistry,
    scheduler: AnimationScheduler,
    variables: VariableTable,
    timers: TimerQueue,
    dialog: DialogState,
    asset_errors: Vec<AssetError>,
    main: Reader,
    background: Vec<Reader>,
    current: ScenePath,
    clock: Duration,
    /// 尚未交给驱动方的命令（如场景开始）
    outbox: Vec<Command>,
    finished_reported: bool,
}

impl Session {
    /// 创建会话并进入启动场景
    ///
    /// 启动场景的第一条指令在第一次 `tick` 时执行。
    pub fn new(story: Story, options: SessionOptions) -> Result<Self, RuntimeError> {
        let startup = options.startup.unwrap_or_else(|| story.startup.clone());
        let variables = VariableTable::new(story.variables.clone());
        let mut session = Self {
            story,
            executor: Executor::new(),
            registry: SpriteRegistry::new(),
            scheduler: AnimationScheduler::new(),
            variables,
            timers: TimerQueue::new(),
            dialog: DialogState::default(),
            asset_errors: Vec::new(),
            main: Reader::idle(),
            background: Vec::new(),
            current: startup.clone(),
            clock: Duration::ZERO,
            outbox: Vec::new(),
            finished_reported: true,
        };
        session.enter_scene(startup)?;
        Ok(session)
    }

    /// 推进一帧
    pub fn tick(&mut self, dt: Duration) -> Vec<Command> {
        let mut commands = std::mem::take(&mut self.outbox);
        self.clock += dt;

        self.scheduler.tick(&mut self.registry, dt);
        let events = self.scheduler.drain_events();

        if let Err(failure) = self.fire_hooks(&events).and_then(|_| self.fire_timers()) {
            self.halt_scene(failure, &mut commands);
            return commands;
        }

        let clears_dialog = matches!(
            self.main.state,
            InterpreterState::WaitingTimer {
                clear_dialog: true,
                ..
            }
        );
        if resolve_wait(&mut self.main, &events, self.clock, &self.registry) && clears_dialog {
            commands.extend(self.dialog.finish_halt());
        }
        let outcome = self.run_main(&mut commands);
        let mut scene_change = match outcome {
            Ok(change) => change,
            Err(failure) => {
                self.halt_scene(failure, &mut commands);
                return commands;
            }
        };
        self.report_finished(&mut commands);

        if scene_change.is_none() {
            match self.run_background(&events, &mut commands) {
                Ok(change) => scene_change = change,
                Err(failure) => {
                    self.halt_scene(failure, &mut commands);
                    return commands;
                }
            }
        }

        if let Some(path) = scene_change {
            self.change_scene(path, &mut commands);
        }
        commands
    }

    /// 处理用户输入
    ///
    /// 输入与当前等待匹配时解除等待并立即继续执行主读取器；
    /// 不匹配时什么也不做。选择索引越界返回 `InvalidChoice`，会话状态不变。
    pub fn advance(&mut self, event: PlayerEvent) -> Result<Vec<Command>, RuntimeError> {
        let mut resolved = Vec::new();
        match (&self.main.state, event) {
            (InterpreterState::WaitingUserInput(InputKind::Advance), PlayerEvent::Advance) => {
                resolved.extend(self.dialog.finish_halt());
            }
            (
                InterpreterState::WaitingUserInput(InputKind::Choice { variable, options }),
                PlayerEvent::ChoiceSelected { index },
            ) => {
                let option = options.get(index).ok_or(RuntimeError::InvalidChoice {
                    index,
                    max: options.len(),
                })?;
                debug!(variable = %variable, option = %option, "用户选择");
                self.variables
                    .set(variable.clone(), VarValue::Text(option.clone()));
            }
            (state, event) => {
                debug!(state = state.name(), event = ?event, "输入与当前等待不匹配，忽略");
                return Ok(std::mem::take(&mut self.outbox));
            }
        }

        let mut commands = std::mem::take(&mut self.outbox);
        commands.append(&mut resolved);
        self.main.state = InterpreterState::Running;

        match self.run_main(&mut commands) {
            Ok(change) => {
                self.report_finished(&mut commands);
                if let Some(path) = change {
                    self.change_scene(path, &mut commands);
                }
            }
            Err(failure) => self.halt_scene(failure, &mut commands),
        }
        Ok(commands)
    }

    /// 立即切换到指定场景
    ///
    /// 也用于从出错的场景中恢复。
    pub fn jump_to_scene(&mut self, path: ScenePath) -> Result<(), RuntimeError> {
        self.enter_scene(path)
    }

    /// 当前帧的渲染快照
    pub fn snapshot(&self) -> Snapshot {
        Snapshot::capture(&self.registry, &self.dialog.view)
    }

    /// 主读取器状态
    pub fn state(&self) -> &InterpreterState {
        &self.main.state
    }

    pub fn current_scene(&self) -> &ScenePath {
        &self.current
    }

    pub fn variables(&self) -> &VariableTable {
        &self.variables
    }

    pub fn registry(&self) -> &SpriteRegistry {
        &self.registry
    }

    pub fn story(&self) -> &Story {
        &self.story
    }

    /// 播放过程中记录的素材错误
    pub fn asset_errors(&self) -> &[AssetError] {
        &self.asset_errors
    }

    /// 会话时钟
    pub fn clock(&self) -> Duration {
        self.clock
    }

    pub fn background_reader_count(&self) -> usize {
        self.background.len()
    }

    pub fn pending_timer_count(&self) -> usize {
        self.timers.len()
    }

    /// 主脚本已结束，且没有后台读取器和排队的计时器
    pub fn is_finished(&self) -> bool {
        self.main.state.is_halted() && self.background.is_empty() && self.timers.is_empty()
    }

    //=========================================================================
    // 内部实现
    //=========================================================================

    fn enter_scene(&mut self, path: ScenePath) -> Result<(), RuntimeError> {
        let (chapter, scene) =
            self.story
                .locate(&path)
                .ok_or_else(|| RuntimeError::UnknownScene {
                    chapter: path.chapter.clone(),
                    scene: path.scene.clone(),
                })?;
        let main = Reader::main(&self.story, chapter, scene)?;

        self.registry.clear();
        self.scheduler.clear();
        self.timers.clear();
        self.background.clear();
        self.dialog.view.lines.clear();
        self.dialog.no_clear = false;
        self.dialog.continuation = false;
        self.main = main;
        self.finished_reported = false;

        info!(scene = %path, "进入场景");
        self.outbox.push(Command::SceneStarted {
            chapter: path.chapter.clone(),
            scene: path.scene.clone(),
        });
        self.current = path;
        Ok(())
    }

    fn change_scene(&mut self, path: ScenePath, commands: &mut Vec<Command>) {
        match self.enter_scene(path) {
            Ok(()) => commands.append(&mut self.outbox),
            Err(error) => self.halt_scene(
                Failure {
                    error,
                    script: None,
                    instruction: 0,
                    line: 0,
                },
                commands,
            ),
        }
    }

    fn run_main(&mut self, commands: &mut Vec<Command>) -> Result<Option<ScenePath>, Failure> {
        let Session {
            story,
            executor,
            registry,
            scheduler,
            variables,
            timers,
            dialog,
            asset_errors,
            main,
            clock,
            ..
        } = self;
        let mut ctx = ExecContext {
            story,
            registry,
            scheduler,
            variables,
            timers,
            dialog,
            asset_errors,
            clock: *clock,
        };
        run_reader(main, executor, &mut ctx, commands)
    }

    fn run_background(
        &mut self,
        events: &[AnimationEvent],
        commands: &mut Vec<Command>,
    ) -> Result<Option<ScenePath>, Failure> {
        let Session {
            story,
            executor,
            registry,
            scheduler,
            variables,
            timers,
            dialog,
            asset_errors,
            background,
            clock,
            ..
        } = self;
        let mut ctx = ExecContext {
            story,
            registry,
            scheduler,
            variables,
            timers,
            dialog,
            asset_errors,
            clock: *clock,
        };

        let mut change = None;
        for reader in background.iter_mut() {
            resolve_wait(reader, events, ctx.clock, ctx.registry);
            if let Some(path) = run_reader(reader, executor, &mut ctx, commands)? {
                change = Some(path);
                break;
            }
        }
        background.retain(|r| !r.state.is_halted());
        Ok(change)
    }

    /// 动画完成时运行一次性钩子
    fn fire_hooks(&mut self, events: &[AnimationEvent]) -> Result<(), Failure> {
        for event in events.iter().filter(|e| e.end == AnimationEnd::Completed) {
            let Some(hook) = self
                .registry
                .get_mut(event.category, &event.alias)
                .and_then(|sprite| sprite.take_hook(event.kind))
            else {
                continue;
            };
            debug!(
                category = %event.category,
                alias = %event.alias,
                kind = %event.kind,
                script = %hook.script,
                depth = hook.depth,
                "动画结束，运行钩子脚本"
            );
            let reader = Reader::spawn(&self.story, &hook.script, hook.depth, BTreeMap::new())
                .map_err(|error| Failure::spawn(error, &hook.script))?;
            self.background.push(reader);
        }
        Ok(())
    }

    fn fire_timers(&mut self) -> Result<(), Failure> {
        for timer in self.timers.take_due(self.clock) {
            debug!(script = %timer.script, depth = timer.depth, "after 计时器到期");
            let reader = Reader::spawn(&self.story, &timer.script, timer.depth, timer.locals)
                .map_err(|error| Failure::spawn(error, &timer.script))?;
            self.background.push(reader);
        }
        Ok(())
    }

    fn report_finished(&mut self, commands: &mut Vec<Command>) {
        if self.finished_reported || self.main.state != InterpreterState::Halted(HaltReason::Finished) {
            return;
        }
        self.finished_reported = true;
        info!(scene = %self.current, "场景脚本执行完毕");
        commands.push(Command::SceneFinished {
            chapter: self.current.chapter.clone(),
            scene: self.current.scene.clone(),
        });
    }

    /// 运行时错误：中止当前场景，会话本身保持可用
    fn halt_scene(&mut self, failure: Failure, commands: &mut Vec<Command>) {
        let error = SceneError {
            chapter: self.current.chapter.clone(),
            scene: self.current.scene.clone(),
            script: failure.script,
            instruction: failure.instruction,
            line: failure.line,
            error: failure.error,
        };
        warn!(error = %error, "场景因运行时错误中止");

        self.main.stack.clear();
        self.main.state = InterpreterState::Halted(HaltReason::Error(error.clone()));
        self.background.clear();
        self.timers.clear();
        self.scheduler.clear();
        for sprite in self.registry.iter_mut() {
            sprite.cancel_all();
        }
        self.finished_reported = true;
        commands.push(Command::SceneError(error));
    }
}

/// 检查等待条件，满足则回到 Running 并返回 true
fn resolve_wait(
    reader: &mut Reader,
    events: &[AnimationEvent],
    clock: Duration,
    registry: &SpriteRegistry,
) -> bool {
    let satisfied = match &reader.state {
        InterpreterState::WaitingTimer { deadline, .. } => clock >= *deadline,
        InterpreterState::WaitingAnimation {
            category,
            alias,
            kind,
        } => {
            let ended = kind.is_some_and(|kind| {
                events
                    .iter()
                    .any(|e| e.category == *category && e.alias == *alias && e.kind == kind)
            });
            // 精灵被移除或替换时补间随之消失，也视为结束
            let idle = registry
                .get(*category, alias)
                .is_none_or(|sprite| match kind {
                    Some(kind) => !sprite.is_animating(*kind),
                    None => !sprite.has_tweens(),
                });
            ended || idle
        }
        _ => false,
    };
    if satisfied {
        reader.state = InterpreterState::Running;
    }
    satisfied
}

/// 运行读取器直到阻塞、结束或请求切换场景
fn run_reader(
    reader: &mut Reader,
    executor: &mut Executor,
    ctx: &mut ExecContext<'_>,
    commands: &mut Vec<Command>,
) -> Result<Option<ScenePath>, Failure> {
    let story = ctx.story;

    loop {
        if reader.state != InterpreterState::Running {
            return Ok(None);
        }

        let depth = reader.stack.depth();
        let Some(frame) = reader.stack.top_mut() else {
            reader.state = InterpreterState::Halted(HaltReason::Finished);
            return Ok(None);
        };

        let Some(block) = frame.script.resolve(story) else {
            let name = frame.script.reusable_name().unwrap_or_default().to_string();
            return Err(Failure {
                error: RuntimeError::UnknownScript { name: name.clone() },
                script: Some(name),
                instruction: frame.cursor,
                line: 0,
            });
        };

        let cursor = frame.cursor;
        let Some(instruction) = block.get(cursor) else {
            // 指令块结束，回到调用方
            reader.stack.pop();
            continue;
        };
        let line = block.line_of(cursor);

        if let Some(script) = &reader.background
            && matches!(
                instruction,
                Instruction::Dialog { .. }
                    | Instruction::Halt
                    | Instruction::HaltAuto { .. }
                    | Instruction::Choice { .. }
            )
        {
            debug!(script = %script, line, "后台脚本忽略对话、halt 和 choice");
            frame.cursor += 1;
            continue;
        }

        debug!(line, instruction = ?instruction, "执行指令");
        let result = match executor.execute(instruction, block, &mut frame.locals, depth, ctx) {
            Ok(result) => result,
            Err(error) => {
                return Err(Failure {
                    error,
                    script: frame.script.reusable_name().map(str::to_string),
                    instruction: cursor,
                    line,
                });
            }
        };
        commands.extend(result.commands);

        if let Some(path) = result.scene_change {
            frame.cursor += 1;
            reader.state = InterpreterState::Halted(HaltReason::Finished);
            return Ok(Some(path));
        }

        if let Some(callee) = result.call {
            frame.cursor += 1;
            let caller = frame.script.reusable_name().map(str::to_string);
            reader.stack.push(callee).map_err(|error| Failure {
                error,
                script: caller,
                instruction: cursor,
                line,
            })?;
            continue;
        }

        match result.jump_to {
            Some(target) if target > cursor => frame.cursor = target,
            Some(target) => {
                return Err(Failure {
                    error: RuntimeError::MalformedBranch { target },
                    script: frame.script.reusable_name().map(str::to_string),
                    instruction: cursor,
                    line,
                });
            }
            None => frame.cursor += 1,
        }

        if let Some(waiting) = result.waiting {
            reader.state = waiting;
            return Ok(None);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::script::{AnimationKind, Parser, ScriptBlock, SpriteCategory};
    use crate::story::{AssetKind, Chapter, Scene};

    const PNG: &[u8] = b"\x89PNG\r\n\x1a\nimage";
    const FRAME: Duration = Duration::from_millis(16);

    fn script(text: &str) -> ScriptBlock {
        Parser::new().parse(text).unwrap()
    }

    fn story(scenes: &[(&str, &str)], reusables: &[(&str, &str)]) -> Story {
        let mut chapter = Chapter::new("ch1");
        for (name, text) in scenes {
            chapter = chapter.with_scene(Scene::new(*name, script(text)));
        }
        let mut story = Story::new("测试", ScenePath::new("ch1", scenes[0].0));
        story.chapters.push(chapter);
        for (name, text) in reusables {
            story.reusables.insert(name.to_string(), script(text));
        }
        for key in ["park", "rave_normal", "rave_smile"] {
            story.assets.insert(key, AssetKind::Image, PNG.to_vec());
        }
        story
    }

    fn session(scenes: &[(&str, &str)], reusables: &[(&str, &str)]) -> Session {
        Session::new(story(scenes, reusables), SessionOptions::default()).unwrap()
    }

    fn texts(commands: &[Command]) -> Vec<&str> {
        commands
            .iter()
            .filter_map(|c| match c {
                Command::ShowDialogText { text, .. } => Some(text.as_str()),
                _ => None,
            })
            .collect()
    }

    #[test]
    fn test_halt_waits_for_advance() {
        let mut s = session(&[("intro", "Hello\n<halt>\nBye")], &[]);

        let commands = s.tick(FRAME);
        assert_eq!(
            commands[0],
            Command::SceneStarted {
                chapter: "ch1".to_string(),
                scene: "intro".to_string(),
            }
        );
        assert_eq!(texts(&commands), vec!["Hello"]);
        assert_eq!(
            s.state(),
            &InterpreterState::WaitingUserInput(InputKind::Advance)
        );

        // 再次 tick 不会越过 halt
        assert!(texts(&s.tick(FRAME)).is_empty());

        let commands = s.advance(PlayerEvent::Advance).unwrap();
        assert_eq!(commands[0], Command::ClearDialogText);
        assert_eq!(texts(&commands), vec!["Bye"]);
        assert!(commands.contains(&Command::SceneFinished {
            chapter: "ch1".to_string(),
            scene: "intro".to_string(),
        }));
        assert_eq!(s.state(), &InterpreterState::Halted(HaltReason::Finished));
        assert!(s.is_finished());
    }

    #[test]
    fn test_no_clear_keeps_text() {
        let mut s = session(&[("intro", "Hello\n<no_clear>\n<halt>\nAgain")], &[]);
        s.tick(FRAME);
        let commands = s.advance(PlayerEvent::Advance).unwrap();
        assert!(!commands.contains(&Command::ClearDialogText));
        assert_eq!(s.snapshot().dialog.lines, vec!["Hello", "Again"]);
    }

    #[test]
    fn test_wait_resumes_on_clock() {
        let mut s = session(&[("intro", "<wait: 100>\nDone")], &[]);
        s.tick(FRAME);
        assert!(matches!(s.state(), InterpreterState::WaitingTimer { .. }));

        assert!(texts(&s.tick(Duration::from_millis(50))).is_empty());
        assert_eq!(texts(&s.tick(Duration::from_millis(100))), vec!["Done"]);
    }

    #[test]
    fn test_halt_auto_continues_after_frames() {
        let mut s = session(&[("intro", "Hello\n<halt_auto: 60>\nBye")], &[]);
        assert_eq!(texts(&s.tick(FRAME)), vec!["Hello"]);
        assert!(matches!(
            s.state(),
            InterpreterState::WaitingTimer {
                clear_dialog: true,
                ..
            }
        ));

        // 点击不会提前结束
        assert!(s.advance(PlayerEvent::Advance).unwrap().is_empty());
        assert!(s.tick(Duration::from_millis(500)).is_empty());
        assert_eq!(s.snapshot().dialog.lines, vec!["Hello"]);

        // 60 帧 = 1 秒
        let commands = s.tick(Duration::from_millis(500));
        assert_eq!(commands[0], Command::ClearDialogText);
        assert_eq!(texts(&commands), vec!["Bye"]);
        assert_eq!(s.snapshot().dialog.lines, vec!["Bye"]);
    }

    #[test]
    fn test_halt_auto_respects_no_clear() {
        let mut s = session(&[("intro", "Hello\n<no_clear>\n<halt_auto: 1>\nAgain")], &[]);
        s.tick(FRAME);
        let commands = s.tick(FRAME * 2);
        assert!(!commands.contains(&Command::ClearDialogText));
        assert_eq!(s.snapshot().dialog.lines, vec!["Hello", "Again"]);
    }

    #[test]
    fn test_center_uses_image_size() {
        // 100×60 与 40×20 的灰度 PNG
        const WIDE: &[u8] = b"\x89\x50\x4e\x47\x0d\x0a\x1a\x0a\x00\x00\x00\x0d\x49\x48\x44\x52\x00\x00\x00\x64\x00\x00\x00\x3c\x08\x00\x00\x00\x00\xb5\x54\x40\x12\x00\x00\x00\x1d\x49\x44\x41\x54\x78\xda\xed\xc1\x31\x01\x00\x00\x00\xc2\xa0\xf5\x4f\x6d\x0c\x1f\xa0\x00\x00\x00\x00\x00\x80\xa7\x01\x17\xac\x00\x01\x0a\x85\x04\x8f\x00\x00\x00\x00\x49\x45\x4e\x44\xae\x42\x60\x82";
        const SMALL: &[u8] = b"\x89\x50\x4e\x47\x0d\x0a\x1a\x0a\x00\x00\x00\x0d\x49\x48\x44\x52\x00\x00\x00\x28\x00\x00\x00\x14\x08\x00\x00\x00\x00\xda\x2d\x20\x67\x00\x00\x00\x10\x49\x44\x41\x54\x78\xda\x63\x60\x18\x05\xa3\x60\x14\x90\x02\x00\x03\x34\x00\x01\x86\x74\x22\xe3\x00\x00\x00\x00\x49\x45\x4e\x44\xae\x42\x60\x82";

        let mut story = story(
            &[(
                "intro",
                "<load_object: wide, table>\n\
                 <object_show: table>\n\
                 <object_set_center: table, 300, 200>\n\
                 <load_character: small, rave>\n\
                 <character_show: rave>\n\
                 <character_scale_current_value: rave, 2>\n\
                 <character_center_x_with: rave, object, table>\n\
                 <load_character: rave_normal, ghost>\n\
                 <character_set_center: ghost, 10, 20>\n\
                 <halt>",
            )],
            &[],
        );
        story.assets.insert("wide", AssetKind::Image, WIDE);
        story.assets.insert("small", AssetKind::Image, SMALL);
        let mut s = Session::new(story, SessionOptions::default()).unwrap();
        s.tick(FRAME);

        let snapshot = s.snapshot();
        let table = snapshot.find(SpriteCategory::Object, "table").unwrap();
        assert_eq!((table.x, table.y), (250.0, 170.0));
        // 缩放后 80×40，中心与桌子对齐，y 不变
        let rave = snapshot.find(SpriteCategory::Character, "rave").unwrap();
        assert_eq!((rave.x, rave.y), (260.0, 0.0));

        // 尺寸未知的图像按 0×0 处理
        let ghost = s.registry().get(SpriteCategory::Character, "ghost").unwrap();
        assert_eq!((ghost.transform.x, ghost.transform.y), (10.0, 20.0));
    }

    #[test]
    fn test_center_x_with_unknown_sprite_halts_scene() {
        let mut s = session(
            &[(
                "intro",
                "<load_character: rave_normal, rave>\n<character_center_x_with: rave, object, cup>\nAfter",
            )],
            &[],
        );
        let commands = s.tick(FRAME);
        assert!(texts(&commands).is_empty());
        assert!(commands.iter().any(|c| matches!(
            c,
            Command::SceneError(SceneError {
                error: RuntimeError::UnknownSpriteAlias { .. },
                ..
            })
        )));
    }

    #[test]
    fn test_current_value_cancels_running_tween() {
        let mut s = session(
            &[(
                "intro",
                "<load_character: rave_normal, rave>\n\
                 <character_show: rave>\n\
                 <character_fade: rave, 0, 1000, no_wait>\n\
                 <wait: 100>\n\
                 <character_fade_current_value: rave, 50>\n\
                 <halt>",
            )],
            &[],
        );
        s.tick(FRAME);
        s.tick(Duration::from_millis(100));
        s.tick(Duration::from_millis(500));
        let rave = s.registry().get(SpriteCategory::Character, "rave").unwrap();
        assert!(!rave.is_animating(AnimationKind::Fade));
        assert_eq!(rave.transform.opacity, 0.5);
    }

    #[test]
    fn test_mismatched_input_is_ignored() {
        let mut s = session(&[("intro", "<wait: 100>\nDone")], &[]);
        s.tick(FRAME);
        let commands = s.advance(PlayerEvent::Advance).unwrap();
        assert!(commands.is_empty());
        assert!(matches!(s.state(), InterpreterState::WaitingTimer { .. }));
    }

    #[test]
    fn test_tween_blocks_until_complete() {
        let mut s = session(
            &[(
                "intro",
                "<load_character: rave_normal, rave>\n<character_show: rave>\n<character_fade: rave, 0, 100>\nDone",
            )],
            &[],
        );
        s.tick(FRAME);
        assert!(matches!(
            s.state(),
            InterpreterState::WaitingAnimation {
                kind: Some(AnimationKind::Fade),
                ..
            }
        ));
        assert!(texts(&s.tick(Duration::from_millis(50))).is_empty());

        assert_eq!(texts(&s.tick(Duration::from_millis(100))), vec!["Done"]);
        let rave = s.registry().get(SpriteCategory::Character, "rave").unwrap();
        assert_eq!(rave.transform.opacity, 0.0);
    }

    #[test]
    fn test_choice_sets_variable() {
        let mut s = session(
            &[("intro", "<choice: drink, Tea, Coffee>\nYou chose ($drink).")],
            &[],
        );
        s.tick(FRAME);

        let err = s.advance(PlayerEvent::choice(5)).unwrap_err();
        assert_eq!(err, RuntimeError::InvalidChoice { index: 5, max: 2 });
        assert!(matches!(
            s.state(),
            InterpreterState::WaitingUserInput(InputKind::Choice { .. })
        ));

        let commands = s.advance(PlayerEvent::choice(1)).unwrap();
        assert_eq!(texts(&commands), vec!["You chose Coffee."]);
        assert_eq!(
            s.variables().get("drink"),
            Some(&VarValue::Text("Coffee".to_string()))
        );
    }

    #[test]
    fn test_call_binds_arguments_and_returns() {
        let mut s = session(
            &[("intro", "<call: greet, who=Rave>\nAfter")],
            &[("greet", "Hi ($who)")],
        );
        let commands = s.tick(FRAME);
        assert_eq!(texts(&commands), vec!["Hi Rave", "After"]);
    }

    #[test]
    fn test_recursion_limit_halts_scene() {
        let mut s = session(&[("intro", "<call: loop>")], &[("loop", "<call: loop>")]);
        let commands = s.tick(FRAME);

        let Some(Command::SceneError(error)) = commands.last() else {
            panic!("期望 SceneError: {commands:?}");
        };
        assert_eq!(error.script.as_deref(), Some("loop"));
        assert_eq!(
            error.error,
            RuntimeError::RecursionLimitExceeded {
                script: "loop".to_string(),
                limit: crate::runtime::call_stack::MAX_CALL_DEPTH,
            }
        );
        assert!(matches!(
            s.state(),
            InterpreterState::Halted(HaltReason::Error(_))
        ));
    }

    #[test]
    fn test_after_runs_in_background() {
        let mut s = session(
            &[("intro", "<after: 100, blink>\n<after: 50, blink>\n<halt>")],
            &[("blink", "Hidden\n<halt>\n<variable_set: blinked, yes>")],
        );
        s.tick(FRAME);
        // 同一脚本只排队一次
        assert_eq!(s.pending_timer_count(), 1);

        let commands = s.tick(Duration::from_millis(100));
        // 后台脚本忽略对话和 halt
        assert!(texts(&commands).is_empty());
        assert_eq!(
            s.variables().get("blinked"),
            Some(&VarValue::Text("yes".to_string()))
        );
        assert_eq!(s.pending_timer_count(), 0);
        assert_eq!(s.background_reader_count(), 0);
    }

    #[test]
    fn test_after_cancel() {
        let mut s = session(
            &[("intro", "<after: 100, blink>\n<after_cancel: blink>\n<halt>")],
            &[("blink", "<variable_set: blinked, yes>")],
        );
        s.tick(FRAME);
        s.tick(Duration::from_millis(200));
        assert_eq!(s.variables().get("blinked"), None);
    }

    #[test]
    fn test_hook_fires_once_on_completion() {
        let mut s = session(
            &[(
                "intro",
                "<load_character: rave_normal, rave>\n<character_show: rave>\n\
                 <character_after_fading_stop: rave, faded>\n\
                 <character_fade: rave, 0, 100, no_wait>\n<halt>",
            )],
            &[("faded", "<variable_set: faded, true>")],
        );
        s.tick(FRAME);
        assert_eq!(s.variables().get("faded"), None);

        s.tick(Duration::from_millis(200));
        assert_eq!(s.variables().get("faded"), Some(&VarValue::Bool(true)));
        let rave = s.registry().get(SpriteCategory::Character, "rave").unwrap();
        assert_eq!(rave.hook(AnimationKind::Fade), None);
    }

    #[test]
    fn test_stop_does_not_fire_hook() {
        let mut s = session(
            &[(
                "intro",
                "<load_character: rave_normal, rave>\n<character_show: rave>\n\
                 <character_after_fading_stop: rave, faded>\n\
                 <character_fade: rave, 0, 100, no_wait>\n\
                 <character_stop_fading: rave>\n<halt>",
            )],
            &[("faded", "<variable_set: faded, true>")],
        );
        s.tick(FRAME);
        s.tick(Duration::from_millis(200));
        assert_eq!(s.variables().get("faded"), None);
    }

    #[test]
    fn test_scene_change_resets_sprites() {
        let mut s = session(
            &[
                (
                    "first",
                    "<load_background: park, park>\n<background_show: park>\n<scene: ch1, second>\nNever",
                ),
                ("second", "Second"),
            ],
            &[],
        );
        let commands = s.tick(FRAME);
        assert!(texts(&commands).is_empty());
        assert_eq!(
            commands.last(),
            Some(&Command::SceneStarted {
                chapter: "ch1".to_string(),
                scene: "second".to_string(),
            })
        );
        assert_eq!(s.current_scene(), &ScenePath::new("ch1", "second"));
        assert!(s.registry().is_empty());

        assert_eq!(texts(&s.tick(FRAME)), vec!["Second"]);
    }

    #[test]
    fn test_prelude_runs_before_scene() {
        let chapter = Chapter::new("ch1")
            .with_prelude(script("Prelude"))
            .with_scene(Scene::new("intro", script("Scene")));
        let mut story = Story::new("测试", ScenePath::new("ch1", "intro"));
        story.chapters.push(chapter);

        let mut s = Session::new(story, SessionOptions::default()).unwrap();
        assert_eq!(texts(&s.tick(FRAME)), vec!["Prelude", "Scene"]);
    }

    #[test]
    fn test_runtime_error_then_jump_recovers() {
        let mut s = session(&[("broken", "<character_show: ghost>"), ("safe", "Safe")], &[]);
        let commands = s.tick(FRAME);
        let Some(Command::SceneError(error)) = commands.last() else {
            panic!("期望 SceneError: {commands:?}");
        };
        assert_eq!(error.scene, "broken");
        assert_eq!(error.line, 1);
        assert!(s.tick(FRAME).is_empty());

        s.jump_to_scene(ScenePath::new("ch1", "safe")).unwrap();
        assert_eq!(texts(&s.tick(FRAME)), vec!["Safe"]);
    }

    #[test]
    fn test_malformed_branch_halts_scene() {
        for bad_end in [0, usize::MAX] {
            let mut story = story(&[("intro", "Hi")], &[]);
            story.variables.insert("a".to_string(), VarValue::Bool(true));
            let mut block = script("<case: ?a>\nA\n<or_case: ?b>\nB\n<case_end>\nDone");
            if let Some(Instruction::OrCase { end, .. }) = block.instructions.get_mut(2) {
                *end = bad_end;
            }
            story.chapters[0].scenes[0] = Scene::new("intro", block);

            let mut s = Session::new(story, SessionOptions::default()).unwrap();
            let commands = s.tick(FRAME);
            let Some(Command::SceneError(error)) = commands.last() else {
                panic!("期望 SceneError: {commands:?}");
            };
            assert!(matches!(error.error, RuntimeError::MalformedBranch { .. }));
            assert_eq!(error.instruction, 2);
            assert_eq!(texts(&commands), vec!["A"]);
        }
    }

    #[test]
    fn test_unknown_startup_scene() {
        let result = Session::new(
            story(&[("intro", "Hi")], &[]),
            SessionOptions {
                startup: Some(ScenePath::new("ch9", "nowhere")),
            },
        );
        assert!(matches!(result, Err(RuntimeError::UnknownScene { .. })));
    }
}
