//! # 阶段 2：指令解析
//!
//! 将识别出的行转换为类型化的 [`Instruction`]，并回填条件块的跳转偏移。

use crate::command::{AudioChannel, VolumeChannel};
use crate::condition::CompareOp;
use crate::error::ParseError;
use crate::script::ast::{
    AnimationKind, Axis, CaseTest, FlipAxis, Instruction, SpriteCategory, TweenSpec, TweenTarget,
};

use super::helpers::{Args, is_identifier, parse_tween_options, split_args};
use super::phase1::Line;

/// 阶段 2 解析器
pub struct Phase2Parser;

impl Phase2Parser {
    pub fn new() -> Self {
        Self
    }

    /// 解析单行
    pub fn parse_line(&self, line: &Line) -> Result<Instruction, ParseError> {
        match line {
            Line::Text { text, .. } => Ok(Instruction::Dialog { text: text.clone() }),
            Line::Command {
                name,
                args,
                line_number,
            } => {
                let items = args.as_deref().map(split_args).unwrap_or_default();
                self.parse_command(name, &items, *line_number)
            }
        }
    }

    fn parse_command(
        &self,
        name: &str,
        items: &[String],
        line: usize,
    ) -> Result<Instruction, ParseError> {
        // load_<category>
        if let Some(category) = name.strip_prefix("load_").and_then(SpriteCategory::from_name) {
            let mut args = Args::new(name, line, "<load_类别: image, alias>", items);
            let image = args.identifier()?.to_string();
            let alias = args.identifier()?.to_string();
            args.finish()?;
            return Ok(Instruction::Load {
                category,
                image,
                alias,
            });
        }

        // <category>_<operation>
        for category in SpriteCategory::ALL {
            if let Some(op) = name
                .strip_prefix(category.as_str())
                .and_then(|rest| rest.strip_prefix('_'))
            {
                return self.parse_sprite_command(category, op, name, items, line);
            }
        }

        match name {
            "line" => no_args(name, items, line, Instruction::Dialog {
                text: String::new(),
            }),
            "halt" => no_args(name, items, line, Instruction::Halt),
            "halt_auto" => {
                let mut args = Args::new(name, line, "<halt_auto: frames>", items);
                let frames = args.frames()?;
                args.finish()?;
                Ok(Instruction::HaltAuto { frames })
            }
            "text_dialog_show" => no_args(name, items, line, Instruction::DialogShow),
            "text_dialog_close" => no_args(name, items, line, Instruction::DialogClose),
            "continue" => no_args(name, items, line, Instruction::Continue),
            "no_clear" => no_args(name, items, line, Instruction::NoClear),
            "after_cancel_all" => no_args(name, items, line, Instruction::AfterCancelAll),
            "case_else" => no_args(name, items, line, Instruction::CaseElse { end: 0 }),
            "case_end" => no_args(name, items, line, Instruction::CaseEnd),
            "stop_sound" => no_args(name, items, line, Instruction::StopAudio {
                channel: Some(AudioChannel::Sound),
            }),
            "stop_voice" => no_args(name, items, line, Instruction::StopAudio {
                channel: Some(AudioChannel::Voice),
            }),
            "stop_music" => no_args(name, items, line, Instruction::StopAudio {
                channel: Some(AudioChannel::Music),
            }),
            "stop_all_audio" => no_args(name, items, line, Instruction::StopAudio { channel: None }),

            "wait" => {
                let mut args = Args::new(name, line, "<wait: milliseconds>", items);
                let duration_ms = args.duration_ms()?;
                args.finish()?;
                Ok(Instruction::Wait { duration_ms })
            }
            "wait_for_animation" => {
                let mut args = Args::new(
                    name,
                    line,
                    "<wait_for_animation: category, alias, fade|move|rotate|scale|any>",
                    items,
                );
                let category_token = args.next()?;
                let category = SpriteCategory::from_name(category_token).ok_or_else(|| {
                    args.invalid(category_token, "background|object|character|dialog_sprite")
                })?;
                let alias = args.identifier()?.to_string();
                let kind_token = args.next()?;
                let kind = if kind_token.eq_ignore_ascii_case("any") {
                    None
                } else {
                    Some(
                        AnimationKind::from_name(kind_token)
                            .ok_or_else(|| args.invalid(kind_token, "fade|move|rotate|scale|any"))?,
                    )
                };
                args.finish()?;
                Ok(Instruction::WaitForAnimation {
                    category,
                    alias,
                    kind,
                })
            }
            "choice" => {
                let mut args = Args::new(name, line, "<choice: variable, option, option...>", items);
                let variable = args.identifier()?.to_string();
                if args.remaining() == 0 {
                    // 触发 MissingArgument
                    args.next()?;
                }
                let mut options = Vec::new();
                while args.remaining() > 0 {
                    options.push(args.next()?.to_string());
                }
                Ok(Instruction::Choice { variable, options })
            }
            "scene" => {
                let mut args = Args::new(name, line, "<scene: chapter, scene>", items);
                let chapter = args.identifier()?.to_string();
                let scene = args.identifier()?.to_string();
                args.finish()?;
                Ok(Instruction::Scene { chapter, scene })
            }
            "call" => {
                let mut args = Args::new(name, line, "<call: script[, name=value...]>", items);
                let script = args.identifier()?.to_string();
                let call_args = args.call_args()?;
                Ok(Instruction::Call {
                    script,
                    args: call_args,
                })
            }
            "after" => {
                let mut args = Args::new(
                    name,
                    line,
                    "<after: milliseconds, script[, name=value...]>",
                    items,
                );
                let delay_ms = args.duration_ms()?;
                let script = args.identifier()?.to_string();
                let call_args = args.call_args()?;
                Ok(Instruction::After {
                    delay_ms,
                    script,
                    args: call_args,
                })
            }
            "after_cancel" => {
                let mut args = Args::new(name, line, "<after_cancel: script>", items);
                let script = args.identifier()?.to_string();
                args.finish()?;
                Ok(Instruction::AfterCancel { script })
            }
            "variable_set" => {
                let mut args = Args::new(name, line, "<variable_set: name, value>", items);
                let variable = args.identifier()?.to_string();
                if args.remaining() == 0 {
                    args.next()?;
                }
                // 值里的逗号原样保留
                let value = args.rest().join(", ");
                Ok(Instruction::VariableSet {
                    name: variable,
                    value,
                })
            }
            "case" => {
                let (test, chain) = parse_case(name, items, line)?;
                Ok(Instruction::Case {
                    test,
                    chain,
                    next: 0,
                })
            }
            "or_case" => {
                let (test, chain) = parse_case(name, items, line)?;
                Ok(Instruction::OrCase {
                    test,
                    chain,
                    next: 0,
                    end: 0,
                })
            }
            "font" => {
                let mut args = Args::new(name, line, "<font: name>", items);
                let font = args.identifier()?.to_string();
                args.finish()?;
                Ok(Instruction::Font { name: font })
            }
            "play_sound" | "play_voice" | "play_music" => {
                let channel = match name {
                    "play_sound" => AudioChannel::Sound,
                    "play_voice" => AudioChannel::Voice,
                    _ => AudioChannel::Music,
                };
                let form = if channel == AudioChannel::Music {
                    "<play_music: key[, loop]>"
                } else {
                    "<play_sound|play_voice: key>"
                };
                let mut args = Args::new(name, line, form, items);
                let key = args.identifier()?.to_string();
                let looping = match args.next_optional() {
                    Some(flag) if channel == AudioChannel::Music && flag.eq_ignore_ascii_case("loop") => true,
                    Some(flag) => return Err(args.invalid(flag, form)),
                    None => false,
                };
                args.finish()?;
                Ok(Instruction::PlayAudio {
                    channel,
                    key,
                    looping,
                })
            }
            "volume_sound" | "volume_voice" | "volume_music" | "volume_text" => {
                let channel = match name {
                    "volume_sound" => VolumeChannel::Sound,
                    "volume_voice" => VolumeChannel::Voice,
                    "volume_music" => VolumeChannel::Music,
                    _ => VolumeChannel::Text,
                };
                let mut args = Args::new(name, line, "<volume_*: percent>", items);
                let level = args.percent()? / 100.0;
                args.finish()?;
                Ok(Instruction::Volume { channel, level })
            }
            _ => Err(ParseError::UnknownCommand {
                line,
                command: name.to_string(),
            }),
        }
    }

    fn parse_sprite_command(
        &self,
        category: SpriteCategory,
        op: &str,
        name: &str,
        items: &[String],
        line: usize,
    ) -> Result<Instruction, ParseError> {
        let alias_only = |form: &str| -> Result<String, ParseError> {
            let mut args = Args::new(name, line, form, items);
            let alias = args.identifier()?.to_string();
            args.finish()?;
            Ok(alias)
        };

        match op {
            "load_as" => {
                let mut args = Args::new(name, line, "<类别_load_as: source_alias, new_alias>", items);
                let source = args.identifier()?.to_string();
                let alias = args.identifier()?.to_string();
                args.finish()?;
                Ok(Instruction::LoadAs {
                    category,
                    source,
                    alias,
                })
            }
            "swap" => {
                let form = "<类别_swap: alias, image[, keep]>";
                let mut args = Args::new(name, line, form, items);
                let alias = args.identifier()?.to_string();
                let image = args.identifier()?.to_string();
                let keep_transform = match args.next_optional() {
                    Some(flag) if flag.eq_ignore_ascii_case("keep") => true,
                    Some(flag) => return Err(args.invalid(flag, "keep")),
                    None => false,
                };
                args.finish()?;
                Ok(Instruction::Swap {
                    category,
                    alias,
                    image,
                    keep_transform,
                })
            }
            "show" => Ok(Instruction::Show {
                category,
                alias: alias_only("<类别_show: alias>")?,
            }),
            "hide" => Ok(Instruction::Hide {
                category,
                alias: alias_only("<类别_hide: alias>")?,
            }),
            "remove" => Ok(Instruction::Remove {
                category,
                alias: alias_only("<类别_remove: alias>")?,
            }),
            "hide_all" => no_args(name, items, line, Instruction::HideAll { category }),
            "set_position_x" | "set_position_y" => {
                let mut args = Args::new(name, line, "<类别_set_position_x|y: alias, value>", items);
                let alias = args.identifier()?.to_string();
                let value = args.number()?;
                args.finish()?;
                Ok(Instruction::SetPosition {
                    category,
                    alias,
                    axis: if op.ends_with('x') { Axis::X } else { Axis::Y },
                    value,
                })
            }
            "flip_horizontal" | "flip_vertical" | "flip_both" => {
                let axis = match op {
                    "flip_horizontal" => FlipAxis::Horizontal,
                    "flip_vertical" => FlipAxis::Vertical,
                    _ => FlipAxis::Both,
                };
                Ok(Instruction::Flip {
                    category,
                    alias: alias_only("<类别_flip_*: alias>")?,
                    axis,
                })
            }
            "set_center" => {
                let mut args = Args::new(name, line, "<类别_set_center: alias, x, y>", items);
                let alias = args.identifier()?.to_string();
                let x = args.number()?;
                let y = args.number()?;
                args.finish()?;
                Ok(Instruction::SetCenter {
                    category,
                    alias,
                    x,
                    y,
                })
            }
            "center_x_with" => {
                let mut args = Args::new(
                    name,
                    line,
                    "<类别_center_x_with: alias, other_category, other_alias>",
                    items,
                );
                let alias = args.identifier()?.to_string();
                let category_token = args.next()?;
                // 也接受 "dialog sprite" 这样带空格的写法
                let other_category = SpriteCategory::from_name(&category_token.replace(' ', "_"))
                    .ok_or_else(|| {
                        args.invalid(category_token, "background|object|character|dialog_sprite")
                    })?;
                let other_alias = args.identifier()?.to_string();
                args.finish()?;
                Ok(Instruction::CenterXWith {
                    category,
                    alias,
                    other_category,
                    other_alias,
                })
            }
            "fade_current_value" | "rotate_current_value" | "scale_current_value" => {
                let mut args = Args::new(name, line, "<类别_*_current_value: alias, value>", items);
                let alias = args.identifier()?.to_string();
                let (kind, value) = match op {
                    "fade_current_value" => (AnimationKind::Fade, args.percent()? / 100.0),
                    "rotate_current_value" => (AnimationKind::Rotate, args.number()?),
                    _ => (AnimationKind::Scale, args.non_negative()?),
                };
                args.finish()?;
                Ok(Instruction::SetCurrentValue {
                    category,
                    alias,
                    kind,
                    value,
                })
            }
            "fade" | "move" | "rotate" | "scale" => {
                let form = match op {
                    "fade" => "<类别_fade: alias, percent, milliseconds[, easing][, no_wait]>",
                    "move" => "<类别_move: alias, x, y, milliseconds[, easing][, no_wait]>",
                    "rotate" => "<类别_rotate: alias, degrees, milliseconds[, easing][, no_wait]>",
                    _ => "<类别_scale: alias, factor, milliseconds[, easing][, no_wait]>",
                };
                let mut args = Args::new(name, line, form, items);
                let alias = args.identifier()?.to_string();
                let target = match op {
                    "fade" => TweenTarget::Fade {
                        opacity: args.percent()? / 100.0,
                    },
                    "move" => TweenTarget::Move {
                        x: args.number()?,
                        y: args.number()?,
                    },
                    "rotate" => TweenTarget::Rotate {
                        degrees: args.number()?,
                    },
                    _ => TweenTarget::Scale {
                        factor: args.non_negative()?,
                    },
                };
                let duration_ms = args.duration_ms()?;
                let (easing, no_wait) = parse_tween_options(&mut args)?;
                Ok(Instruction::Tween {
                    category,
                    alias,
                    spec: TweenSpec {
                        target,
                        duration_ms,
                        easing,
                        no_wait,
                    },
                })
            }
            "stop_fading" | "stop_moving" | "stop_rotating" | "stop_scaling" => {
                let kind = match op {
                    "stop_fading" => AnimationKind::Fade,
                    "stop_moving" => AnimationKind::Move,
                    "stop_rotating" => AnimationKind::Rotate,
                    _ => AnimationKind::Scale,
                };
                Ok(Instruction::StopTween {
                    category,
                    alias: alias_only("<类别_stop_*: alias>")?,
                    kind,
                })
            }
            "after_fading_stop" | "after_movement_stop" | "after_rotating_stop"
            | "after_scaling_stop" => {
                let kind = match op {
                    "after_fading_stop" => AnimationKind::Fade,
                    "after_movement_stop" => AnimationKind::Move,
                    "after_rotating_stop" => AnimationKind::Rotate,
                    _ => AnimationKind::Scale,
                };
                let mut args = Args::new(name, line, "<类别_after_*_stop: alias, script>", items);
                let alias = args.identifier()?.to_string();
                let script = args.identifier()?.to_string();
                args.finish()?;
                Ok(Instruction::AfterStop {
                    category,
                    alias,
                    kind,
                    script,
                })
            }
            _ => Err(ParseError::UnknownCommand {
                line,
                command: name.to_string(),
            }),
        }
    }
}

impl Default for Phase2Parser {
    fn default() -> Self {
        Self::new()
    }
}

fn no_args(
    name: &str,
    items: &[String],
    line: usize,
    instruction: Instruction,
) -> Result<Instruction, ParseError> {
    Args::new(name, line, "无参数", items).finish()?;
    Ok(instruction)
}

/// 解析 case / or_case 的条件部分
///
/// - 1 个参数：`flag` 或 `?flag`
/// - 3 个参数：`value1, operator, value2`
/// - 4 个参数：`value1, operator, value2, chain`
fn parse_case(
    name: &str,
    items: &[String],
    line: usize,
) -> Result<(CaseTest, Option<String>), ParseError> {
    let form = "<case: flag> 或 <case: ?flag> 或 <case: value1, operator, value2[, chain]>";
    let mut args = Args::new(name, line, form, items);
    match items.len() {
        1 => {
            let token = args.next()?;
            let (flag, optional) = match token.strip_prefix('?') {
                Some(rest) => (rest.trim(), true),
                None => (token, false),
            };
            if !is_identifier(flag) {
                return Err(args.invalid(token, "条件名"));
            }
            Ok((
                CaseTest::Flag {
                    name: flag.to_string(),
                    optional,
                },
                None,
            ))
        }
        3 | 4 => {
            let left = args.next()?.to_string();
            let op_token = args.next()?;
            let op = CompareOp::from_name(op_token).ok_or_else(|| {
                args.invalid(
                    op_token,
                    "is|is not|more than|same or more than|less than|same or less than|between|not between",
                )
            })?;
            let right = args.next()?.to_string();
            let chain = match args.next_optional() {
                Some(chain) if is_identifier(chain) => Some(chain.to_string()),
                Some(chain) => return Err(args.invalid(chain, "条件链名")),
                None => None,
            };
            Ok((CaseTest::Compare { left, op, right }, chain))
        }
        0 => Err(ParseError::MissingArgument {
            line,
            command: name.to_string(),
            expected: form.to_string(),
        }),
        _ => Err(ParseError::InvalidArgument {
            line,
            token: items.join(", "),
            expected: form.to_string(),
        }),
    }
}

/// 打开的条件块
struct OpenCase {
    /// case 指令下标
    start: usize,
    chain: Option<String>,
    /// 上一个需要回填 `next` 的分支
    last_branch: usize,
    /// 需要回填 `end` 的 or_case / case_else
    branches: Vec<usize>,
    has_else: bool,
}

/// 检查条件块配对并回填跳转偏移
pub fn resolve_branches(instructions: &mut [Instruction], lines: &[usize]) -> Result<(), ParseError> {
    let mut stack: Vec<OpenCase> = Vec::new();
    let line_of = |i: usize| lines.get(i).copied().unwrap_or(0);

    for i in 0..instructions.len() {
        match &instructions[i] {
            Instruction::Case { chain, .. } => stack.push(OpenCase {
                start: i,
                chain: chain.clone(),
                last_branch: i,
                branches: Vec::new(),
                has_else: false,
            }),
            Instruction::OrCase { chain, .. } => {
                let chain = chain.clone();
                let open = stack.last_mut().ok_or_else(|| unbalanced(line_of(i), "or_case", "之前的 <case>"))?;
                if open.has_else {
                    return Err(unbalanced(line_of(i), "or_case", "<case_end>（case_else 之后不能再有 or_case）"));
                }
                if let (Some(expected), Some(found)) = (&open.chain, &chain)
                    && expected != found
                {
                    return Err(unbalanced(
                        line_of(i),
                        found,
                        &format!("与 case 相同的条件链名 '{expected}'"),
                    ));
                }
                let previous = open.last_branch;
                open.last_branch = i;
                open.branches.push(i);
                set_next(instructions, previous, i);
            }
            Instruction::CaseElse { .. } => {
                let open = stack.last_mut().ok_or_else(|| unbalanced(line_of(i), "case_else", "之前的 <case>"))?;
                if open.has_else {
                    return Err(unbalanced(line_of(i), "case_else", "<case_end>（重复的 case_else）"));
                }
                open.has_else = true;
                let previous = open.last_branch;
                open.last_branch = i;
                open.branches.push(i);
                set_next(instructions, previous, i);
            }
            Instruction::CaseEnd => {
                let open = stack.pop().ok_or_else(|| unbalanced(line_of(i), "case_end", "之前的 <case>"))?;
                set_next(instructions, open.last_branch, i);
                for branch in open.branches {
                    match &mut instructions[branch] {
                        Instruction::OrCase { end, .. } | Instruction::CaseElse { end } => *end = i,
                        _ => {}
                    }
                }
            }
            _ => {}
        }
    }

    match stack.pop() {
        Some(open) => Err(unbalanced(line_of(open.start), "case", "配对的 <case_end>")),
        None => Ok(()),
    }
}

fn set_next(instructions: &mut [Instruction], branch: usize, target: usize) {
    if let Some(Instruction::Case { next, .. } | Instruction::OrCase { next, .. }) =
        instructions.get_mut(branch)
    {
        *next = target;
    }
}

fn unbalanced(line: usize, token: &str, expected: &str) -> ParseError {
    ParseError::UnbalancedCase {
        line,
        token: token.to_string(),
        expected: expected.to_string(),
    }
}
