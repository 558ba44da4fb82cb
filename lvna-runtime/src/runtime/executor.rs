//! # Executor 模块
//!
//! 执行单条 [`Instruction`]。
//!
//! ## 职责
//!
//! - 修改精灵注册表、动画调度器、变量表和对话框状态
//! - 产生对应的 Command
//! - 决定是否需要等待、跳转、调用或切换场景

use std::collections::BTreeMap;
use std::time::Duration;

use tracing::{debug, warn};

use super::call_stack::{Frame, ScriptRef};
use super::timer::{PendingTimer, TimerQueue};
use crate::animation::{AnimationScheduler, SpriteProperty};
use crate::command::Command;
use crate::error::{AssetError, RuntimeError};
use crate::script::{Axis, CallArg, CaseTest, FlipAxis, Instruction, ScriptBlock};
use crate::snapshot::DialogView;
use crate::sprite::{ImageRef, SpriteInstance, SpriteRegistry};
use crate::state::{InputKind, InterpreterState, Scope, VarValue, VariableTable};
use crate::story::{AssetKind, ScenePath, Story};

/// `halt_auto` 的帧数按此帧率换算为时间
pub const HALT_AUTO_FRAME_RATE: u64 = 60;

/// 对话框状态
#[derive(Debug, Clone, Default)]
pub struct DialogState {
    pub view: DialogView,
    /// 下一次 halt 结束时保留文本
    pub no_clear: bool,
    /// 下一行文本接在当前行之后
    pub continuation: bool,
}

impl DialogState {
    /// halt 结束：清除对话文本，`no_clear` 只保留一次
    pub fn finish_halt(&mut self) -> Option<Command> {
        let keep = std::mem::take(&mut self.no_clear);
        if keep {
            return None;
        }
        self.view.lines.clear();
        Some(Command::ClearDialogText)
    }
}

/// 执行上下文：单个读取器执行期间可修改的会话状态
pub struct ExecContext<'a> {
    pub story: &'a Story,
    pub registry: &'a mut SpriteRegistry,
    pub scheduler: &'a mut AnimationScheduler,
    pub variables: &'a mut VariableTable,
    pub timers: &'a mut TimerQueue,
    pub dialog: &'a mut DialogState,
    pub asset_errors: &'a mut Vec<AssetError>,
    /// 会话时钟
    pub clock: Duration,
}

/// 执行结果
#[derive(Debug, Default)]
pub struct ExecuteResult {
    /// 产生的命令
    pub commands: Vec<Command>,
    /// 等待状态（如果需要等待）
    pub waiting: Option<InterpreterState>,
    /// 跳转目标（同一指令块内的下标）
    pub jump_to: Option<usize>,
    /// 需要压入的调用帧
    pub call: Option<Frame>,
    /// 需要切换到的场景
    pub scene_change: Option<ScenePath>,
}

impl ExecuteResult {
    fn empty() -> Self {
        Self::default()
    }

    fn with_commands(commands: Vec<Command>) -> Self {
        Self {
            commands,
            ..Self::default()
        }
    }

    fn with_wait(commands: Vec<Command>, waiting: InterpreterState) -> Self {
        Self {
            commands,
            waiting: Some(waiting),
            ..Self::default()
        }
    }

    fn with_jump(jump_to: usize) -> Self {
        Self {
            jump_to: Some(jump_to),
            ..Self::default()
        }
    }

    fn with_call(frame: Frame) -> Self {
        Self {
            call: Some(frame),
            ..Self::default()
        }
    }

    fn with_scene_change(path: ScenePath) -> Self {
        Self {
            scene_change: Some(path),
            ..Self::default()
        }
    }
}

/// 指令执行器
pub struct Executor;

impl Executor {
    pub fn new() -> Self {
        Self
    }

    /// 执行单条指令
    ///
    /// - `block`: 指令所在的指令块（条件指令需要据此查找分支）
    /// - `locals`: 当前帧的局部变量
    /// - `depth`: 当前读取器的调用深度（after 排队时记录）
    pub fn execute(
        &mut self,
        instruction: &Instruction,
        block: &ScriptBlock,
        locals: &mut BTreeMap<String, VarValue>,
        depth: usize,
        ctx: &mut ExecContext<'_>,
    ) -> Result<ExecuteResult, RuntimeError> {
        match instruction {
            //=================================================================
            // 精灵
            //=================================================================
            Instruction::Load {
                category,
                image,
                alias,
            } => {
                let image_ref = resolve_image(ctx, image);
                ctx.registry.declare(*category, alias, image_ref);
                Ok(ExecuteResult::empty())
            }

            Instruction::LoadAs {
                category,
                source,
                alias,
            } => {
                ctx.registry.load_as(*category, source, alias)?;
                Ok(ExecuteResult::empty())
            }

            Instruction::Swap {
                category,
                alias,
                image,
                keep_transform,
            } => {
                ctx.registry.require(*category, alias)?;
                let image_ref = resolve_image(ctx, image);
                let sprite = ctx.registry.require_mut(*category, alias)?;
                sprite.image = image_ref;
                if !keep_transform {
                    // 属性停在当前值，进行中的补间丢弃
                    sprite.cancel_all();
                }
                Ok(ExecuteResult::empty())
            }

            Instruction::Show { category, alias } => {
                ctx.registry.show(*category, alias)?;
                Ok(ExecuteResult::empty())
            }

            Instruction::Hide { category, alias } => {
                ctx.registry.hide(*category, alias)?;
                Ok(ExecuteResult::empty())
            }

            Instruction::HideAll { category } => {
                ctx.registry.hide_all(*category);
                Ok(ExecuteResult::empty())
            }

            Instruction::Remove { category, alias } => {
                ctx.registry
                    .remove(*category, alias)
                    .ok_or_else(|| RuntimeError::UnknownSpriteAlias {
                        category: *category,
                        alias: alias.clone(),
                    })?;
                Ok(ExecuteResult::empty())
            }

            Instruction::SetPosition {
                category,
                alias,
                axis,
                value,
            } => {
                let property = match axis {
                    Axis::X => SpriteProperty::X,
                    Axis::Y => SpriteProperty::Y,
                };
                ctx.registry
                    .require_mut(*category, alias)?
                    .set_property(property, *value);
                Ok(ExecuteResult::empty())
            }

            Instruction::Flip {
                category,
                alias,
                axis,
            } => {
                let transform = &mut ctx.registry.require_mut(*category, alias)?.transform;
                if matches!(axis, FlipAxis::Horizontal | FlipAxis::Both) {
                    transform.flip_horizontal = !transform.flip_horizontal;
                }
                if matches!(axis, FlipAxis::Vertical | FlipAxis::Both) {
                    transform.flip_vertical = !transform.flip_vertical;
                }
                Ok(ExecuteResult::empty())
            }

            Instruction::SetCenter {
                category,
                alias,
                x,
                y,
            } => {
                let (width, height) = display_size(ctx.story, ctx.registry.require(*category, alias)?);
                let sprite = ctx.registry.require_mut(*category, alias)?;
                sprite.set_property(SpriteProperty::X, *x - width / 2.0);
                sprite.set_property(SpriteProperty::Y, *y - height / 2.0);
                Ok(ExecuteResult::empty())
            }

            Instruction::CenterXWith {
                category,
                alias,
                other_category,
                other_alias,
            } => {
                let other = ctx.registry.require(*other_category, other_alias)?;
                let (other_width, _) = display_size(ctx.story, other);
                let center_x = other.transform.x + other_width / 2.0;
                let (width, _) = display_size(ctx.story, ctx.registry.require(*category, alias)?);
                ctx.registry
                    .require_mut(*category, alias)?
                    .set_property(SpriteProperty::X, center_x - width / 2.0);
                Ok(ExecuteResult::empty())
            }

            Instruction::SetCurrentValue {
                category,
                alias,
                kind,
                value,
            } => {
                let sprite = ctx.registry.require_mut(*category, alias)?;
                sprite.cancel_kind(*kind);
                for property in SpriteProperty::of_kind(*kind) {
                    sprite.set_property(*property, *value);
                }
                Ok(ExecuteResult::empty())
            }

            //=================================================================
            // 动画
            //=================================================================
            Instruction::Tween {
                category,
                alias,
                spec,
            } => {
                ctx.scheduler.start(ctx.registry, *category, alias, spec)?;
                if spec.no_wait || spec.duration_ms == 0 {
                    return Ok(ExecuteResult::empty());
                }
                Ok(ExecuteResult::with_wait(
                    Vec::new(),
                    InterpreterState::WaitingAnimation {
                        category: *category,
                        alias: alias.clone(),
                        kind: Some(spec.target.kind()),
                    },
                ))
            }

            Instruction::StopTween {
                category,
                alias,
                kind,
            } => {
                ctx.scheduler.stop(ctx.registry, *category, alias, *kind)?;
                Ok(ExecuteResult::empty())
            }

            Instruction::AfterStop {
                category,
                alias,
                kind,
                script,
            } => {
                ctx.registry
                    .require_mut(*category, alias)?
                    .set_hook(*kind, script.clone(), depth);
                Ok(ExecuteResult::empty())
            }

            Instruction::WaitForAnimation {
                category,
                alias,
                kind,
            } => {
                let sprite = ctx.registry.require(*category, alias)?;
                let animating = match kind {
                    Some(kind) => sprite.is_animating(*kind),
                    None => sprite.has_tweens(),
                };
                if !animating {
                    return Ok(ExecuteResult::empty());
                }
                Ok(ExecuteResult::with_wait(
                    Vec::new(),
                    InterpreterState::WaitingAnimation {
                        category: *category,
                        alias: alias.clone(),
                        kind: *kind,
                    },
                ))
            }

            //=================================================================
            // 流程
            //=================================================================
            Instruction::Wait { duration_ms } => {
                if *duration_ms == 0 {
                    return Ok(ExecuteResult::empty());
                }
                Ok(ExecuteResult::with_wait(
                    Vec::new(),
                    InterpreterState::WaitingTimer {
                        deadline: ctx.clock + Duration::from_millis(*duration_ms),
                        clear_dialog: false,
                    },
                ))
            }

            Instruction::Halt => Ok(ExecuteResult::with_wait(
                Vec::new(),
                InterpreterState::WaitingUserInput(InputKind::Advance),
            )),

            Instruction::HaltAuto { frames } => Ok(ExecuteResult::with_wait(
                Vec::new(),
                InterpreterState::WaitingTimer {
                    deadline: ctx.clock + frames_to_duration(*frames),
                    clear_dialog: true,
                },
            )),

            Instruction::Choice { variable, options } => {
                let scope = Scope::new(Some(&*locals), ctx.variables);
                let options: Vec<String> = options.iter().map(|o| scope.substitute(o)).collect();
                Ok(ExecuteResult::with_wait(
                    vec![Command::PresentChoices {
                        options: options.clone(),
                    }],
                    InterpreterState::WaitingUserInput(InputKind::Choice {
                        variable: variable.clone(),
                        options,
                    }),
                ))
            }

            Instruction::Scene { chapter, scene } => {
                let path = ScenePath::new(chapter.clone(), scene.clone());
                if ctx.story.locate(&path).is_none() {
                    return Err(RuntimeError::UnknownScene {
                        chapter: chapter.clone(),
                        scene: scene.clone(),
                    });
                }
                Ok(ExecuteResult::with_scene_change(path))
            }

            Instruction::Call { script, args } => {
                require_reusable(ctx.story, script)?;
                let frame_locals = bind_args(args, locals, ctx.variables);
                Ok(ExecuteResult::with_call(
                    Frame::new(ScriptRef::Reusable(script.clone())).with_locals(frame_locals),
                ))
            }

            Instruction::After {
                delay_ms,
                script,
                args,
            } => {
                require_reusable(ctx.story, script)?;
                let timer = PendingTimer {
                    script: script.clone(),
                    deadline: ctx.clock + Duration::from_millis(*delay_ms),
                    depth,
                    locals: bind_args(args, locals, ctx.variables),
                };
                if !ctx.timers.schedule(timer) {
                    debug!(script = %script, "脚本已在 after 队列中，忽略");
                }
                Ok(ExecuteResult::empty())
            }

            Instruction::AfterCancel { script } => {
                ctx.timers.cancel(script);
                Ok(ExecuteResult::empty())
            }

            Instruction::AfterCancelAll => {
                ctx.timers.clear();
                Ok(ExecuteResult::empty())
            }

            //=================================================================
            // 变量与条件
            //=================================================================
            Instruction::VariableSet { name, value } => {
                let value = VarValue::parse_literal(&Scope::new(Some(&*locals), ctx.variables).substitute(value));
                if let Some(local) = locals.get_mut(name) {
                    *local = value;
                } else {
                    ctx.variables.set(name.clone(), value);
                }
                Ok(ExecuteResult::empty())
            }

            Instruction::Case { test, next, .. } => {
                let scope = Scope::new(Some(&*locals), ctx.variables);
                if evaluate(test, &scope)? {
                    return Ok(ExecuteResult::empty());
                }
                Ok(ExecuteResult::with_jump(find_branch(block, *next, &scope)?))
            }

            // 顺序执行到后续分支说明前面的分支已经命中
            Instruction::OrCase { end, .. } | Instruction::CaseElse { end } => {
                Ok(ExecuteResult::with_jump(branch_exit(*end)?))
            }

            Instruction::CaseEnd => Ok(ExecuteResult::empty()),

            //=================================================================
            // 对话与音频
            //=================================================================
            Instruction::Dialog { text } => {
                let text = Scope::new(Some(&*locals), ctx.variables).substitute(text);
                let dialog = &mut *ctx.dialog;
                let continuation = std::mem::take(&mut dialog.continuation);
                if continuation && let Some(last) = dialog.view.lines.last_mut() {
                    last.push_str(&text);
                } else {
                    dialog.view.lines.push(text.clone());
                }
                Ok(ExecuteResult::with_commands(vec![Command::ShowDialogText {
                    text,
                    continuation,
                }]))
            }

            Instruction::DialogShow => {
                ctx.dialog.view.visible = true;
                Ok(ExecuteResult::with_commands(vec![Command::ShowDialog]))
            }

            Instruction::DialogClose => {
                ctx.dialog.view.visible = false;
                Ok(ExecuteResult::with_commands(vec![Command::CloseDialog]))
            }

            Instruction::Continue => {
                ctx.dialog.continuation = true;
                Ok(ExecuteResult::empty())
            }

            Instruction::NoClear => {
                ctx.dialog.no_clear = true;
                Ok(ExecuteResult::empty())
            }

            Instruction::Font { name } => {
                if let Err(e) = ctx.story.assets.require(name, AssetKind::Font) {
                    record_asset_error(ctx, e);
                    return Ok(ExecuteResult::empty());
                }
                ctx.dialog.view.font = Some(name.clone());
                Ok(ExecuteResult::with_commands(vec![Command::SetFont {
                    name: name.clone(),
                }]))
            }

            Instruction::PlayAudio {
                channel,
                key,
                looping,
            } => {
                if let Err(e) = ctx.story.assets.require(key, AssetKind::Audio) {
                    record_asset_error(ctx, e);
                    return Ok(ExecuteResult::empty());
                }
                Ok(ExecuteResult::with_commands(vec![Command::PlayAudio {
                    channel: *channel,
                    key: key.clone(),
                    looping: *looping,
                }]))
            }

            Instruction::StopAudio { channel } => {
                Ok(ExecuteResult::with_commands(vec![Command::StopAudio {
                    channel: *channel,
                }]))
            }

            Instruction::Volume { channel, level } => {
                Ok(ExecuteResult::with_commands(vec![Command::SetVolume {
                    channel: *channel,
                    level: *level,
                }]))
            }
        }
    }
}

impl Default for Executor {
    fn default() -> Self {
        Self::new()
    }
}

/// 解析图像素材；失败时记录 AssetError，精灵以"不存在"渲染
fn resolve_image(ctx: &mut ExecContext<'_>, key: &str) -> ImageRef {
    match ctx.story.assets.resolve_image(key) {
        Ok(id) => ImageRef::new(key, Some(id)),
        Err(e) => {
            record_asset_error(ctx, e);
            ImageRef::new(key, None)
        }
    }
}

/// 缩放后的显示尺寸，图像不可用或尺寸未知时按 0×0 计算
fn display_size(story: &Story, sprite: &SpriteInstance) -> (f32, f32) {
    let (width, height) = sprite
        .image
        .asset
        .and_then(|id| story.assets.image_size(id))
        .unwrap_or((0, 0));
    let scale = sprite.transform.scale;
    (width as f32 * scale, height as f32 * scale)
}

fn frames_to_duration(frames: u32) -> Duration {
    Duration::from_nanos(u64::from(frames) * 1_000_000_000 / HALT_AUTO_FRAME_RATE)
}

fn record_asset_error(ctx: &mut ExecContext<'_>, error: AssetError) {
    warn!(error = %error, "素材不可用");
    ctx.asset_errors.push(error);
}

fn require_reusable(story: &Story, script: &str) -> Result<(), RuntimeError> {
    match story.reusable(script) {
        Some(_) => Ok(()),
        None => Err(RuntimeError::UnknownScript {
            name: script.to_string(),
        }),
    }
}

/// 计算调用参数（在调用方的作用域中做变量替换）
fn bind_args(
    args: &[CallArg],
    locals: &BTreeMap<String, VarValue>,
    variables: &VariableTable,
) -> BTreeMap<String, VarValue> {
    let scope = Scope::new(Some(locals), variables);
    args.iter()
        .map(|arg| {
            (
                arg.name.clone(),
                VarValue::parse_literal(&scope.substitute(&arg.value)),
            )
        })
        .collect()
}

/// 计算条件
///
/// 标志形式要求变量存在（`?flag` 除外）；比较形式从不报错。
pub fn evaluate(test: &CaseTest, scope: &Scope<'_>) -> Result<bool, RuntimeError> {
    match test {
        CaseTest::Flag { name, optional } => match scope.lookup(name) {
            Some(value) => Ok(value.is_truthy()),
            None if *optional => Ok(false),
            None => Err(RuntimeError::UnspecifiedCondition { name: name.clone() }),
        },
        CaseTest::Compare { left, op, right } => {
            Ok(op.evaluate(&scope.substitute(left), &scope.substitute(right)))
        }
    }
}

/// 从未命中的分支出发，找到下一条应执行的指令
///
/// 分支链上的偏移必须严格递增。
fn find_branch(block: &ScriptBlock, mut target: usize, scope: &Scope<'_>) -> Result<usize, RuntimeError> {
    loop {
        match block.get(target) {
            Some(Instruction::OrCase { test, next, .. }) => {
                if evaluate(test, scope)? {
                    return branch_exit(target);
                }
                if *next <= target {
                    return Err(RuntimeError::MalformedBranch { target: *next });
                }
                target = *next;
            }
            // case_else 或 case_end：进入其后的指令
            _ => return branch_exit(target),
        }
    }
}

fn branch_exit(target: usize) -> Result<usize, RuntimeError> {
    target
        .checked_add(1)
        .ok_or(RuntimeError::MalformedBranch { target })
}
