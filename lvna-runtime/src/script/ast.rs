//! # AST 模块
//!
//! 定义编译后的指令（Instruction）。
//!
//! ## 设计说明
//!
//! 指令集是封闭的：每条脚本指令对应 [`Instruction`] 的一个变体，
//! 解释器对其做穷尽匹配。新增指令时编译器会指出所有需要处理的位置。

use serde::{Deserialize, Serialize};

use crate::animation::EasingFunction;
use crate::command::{AudioChannel, VolumeChannel};
use crate::condition::CompareOp;

/// 精灵类别
///
/// 同一类别内别名唯一；声明顺序即绘制层级（背景在最底层）。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SpriteCategory {
    /// 背景
    Background,
    /// 物体
    Object,
    /// 角色
    Character,
    /// 对话框精灵
    DialogSprite,
}

impl SpriteCategory {
    /// 所有类别，按绘制顺序排列
    pub const ALL: [SpriteCategory; 4] = [
        SpriteCategory::Background,
        SpriteCategory::Object,
        SpriteCategory::Character,
        SpriteCategory::DialogSprite,
    ];

    /// 脚本中的类别前缀
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Background => "background",
            Self::Object => "object",
            Self::Character => "character",
            Self::DialogSprite => "dialog_sprite",
        }
    }

    /// 从脚本前缀解析
    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL
            .into_iter()
            .find(|c| c.as_str().eq_ignore_ascii_case(name.trim()))
    }
}

impl std::fmt::Display for SpriteCategory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// 动画种类
///
/// 一种动画可能驱动多个属性（移动同时驱动 x 和 y）。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AnimationKind {
    Fade,
    Move,
    Rotate,
    Scale,
}

impl AnimationKind {
    pub const ALL: [AnimationKind; 4] = [
        AnimationKind::Fade,
        AnimationKind::Move,
        AnimationKind::Rotate,
        AnimationKind::Scale,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Fade => "fade",
            Self::Move => "move",
            Self::Rotate => "rotate",
            Self::Scale => "scale",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL
            .into_iter()
            .find(|k| k.as_str().eq_ignore_ascii_case(name.trim()))
    }
}

impl std::fmt::Display for AnimationKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// 坐标轴
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Axis {
    X,
    Y,
}

/// 翻转方向
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum FlipAxis {
    Horizontal,
    Vertical,
    Both,
}

/// 补间目标值
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum TweenTarget {
    /// 透明度（0.0 - 1.0，脚本中写百分比）
    Fade { opacity: f32 },
    /// 移动到指定坐标
    Move { x: f32, y: f32 },
    /// 旋转到指定角度（度）
    Rotate { degrees: f32 },
    /// 缩放到指定倍数
    Scale { factor: f32 },
}

impl TweenTarget {
    /// 对应的动画种类
    pub fn kind(&self) -> AnimationKind {
        match self {
            Self::Fade { .. } => AnimationKind::Fade,
            Self::Move { .. } => AnimationKind::Move,
            Self::Rotate { .. } => AnimationKind::Rotate,
            Self::Scale { .. } => AnimationKind::Scale,
        }
    }
}

/// 补间参数
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TweenSpec {
    pub target: TweenTarget,
    /// 时长（毫秒）
    pub duration_ms: u64,
    pub easing: EasingFunction,
    /// 为 true 时不阻塞解释器
    pub no_wait: bool,
}

/// 条件判断
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum CaseTest {
    /// `<case: flag>` 或 `<case: ?flag>`
    ///
    /// `optional` 为 true 时条件缺失视为 false，而不是报错。
    Flag { name: String, optional: bool },
    /// `<case: value1, operator, value2>`
    Compare {
        left: String,
        op: CompareOp,
        right: String,
    },
}

/// 调用参数 `name=value`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CallArg {
    pub name: String,
    /// 原始文本，执行时才做变量替换
    pub value: String,
}

/// 指令
///
/// 条件指令中的跳转偏移量是同一指令块内的绝对下标，由解析器回填。
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Instruction {
    /// 对话文本（`<line>` 对应空文本）
    Dialog { text: String },

    /// `load_<category>: image, alias`
    Load {
        category: SpriteCategory,
        image: String,
        alias: String,
    },

    /// `<category>_load_as: source_alias, new_alias`
    LoadAs {
        category: SpriteCategory,
        source: String,
        alias: String,
    },

    /// `<category>_swap: alias, image[, keep]`
    Swap {
        category: SpriteCategory,
        alias: String,
        image: String,
        keep_transform: bool,
    },

    Show {
        category: SpriteCategory,
        alias: String,
    },

    Hide {
        category: SpriteCategory,
        alias: String,
    },

    HideAll { category: SpriteCategory },

    Remove {
        category: SpriteCategory,
        alias: String,
    },

    /// `<category>_set_position_x|y: alias, value`
    SetPosition {
        category: SpriteCategory,
        alias: String,
        axis: Axis,
        value: f32,
    },

    Flip {
        category: SpriteCategory,
        alias: String,
        axis: FlipAxis,
    },

    /// `<category>_set_center: alias, x, y`
    ///
    /// 把精灵（按缩放后的图像尺寸）的中心放到 (x, y)。
    SetCenter {
        category: SpriteCategory,
        alias: String,
        x: f32,
        y: f32,
    },

    /// `<category>_center_x_with: alias, other_category, other_alias`
    ///
    /// 水平方向与另一个精灵的中心对齐，y 不变。
    CenterXWith {
        category: SpriteCategory,
        alias: String,
        other_category: SpriteCategory,
        other_alias: String,
    },

    /// `<category>_fade|rotate|scale_current_value: alias, value`
    ///
    /// 直接设置属性值，并取消该属性上的补间。
    SetCurrentValue {
        category: SpriteCategory,
        alias: String,
        kind: AnimationKind,
        value: f32,
    },

    Tween {
        category: SpriteCategory,
        alias: String,
        spec: TweenSpec,
    },

    /// `<category>_stop_fading|moving|rotating|scaling: alias`
    StopTween {
        category: SpriteCategory,
        alias: String,
        kind: AnimationKind,
    },

    /// `<category>_after_<kind>_stop: alias, script`
    AfterStop {
        category: SpriteCategory,
        alias: String,
        kind: AnimationKind,
        script: String,
    },

    /// `wait: ms`
    Wait { duration_ms: u64 },

    /// `wait_for_animation: category, alias, kind|any`
    WaitForAnimation {
        category: SpriteCategory,
        alias: String,
        kind: Option<AnimationKind>,
    },

    Halt,

    /// `halt_auto: frames`
    ///
    /// 与 halt 相同，但不响应用户输入，经过指定帧数后自动继续。
    HaltAuto { frames: u32 },

    /// `choice: variable, option...`
    Choice {
        variable: String,
        options: Vec<String>,
    },

    /// `scene: chapter, scene`
    Scene { chapter: String, scene: String },

    Call { script: String, args: Vec<CallArg> },

    After {
        delay_ms: u64,
        script: String,
        args: Vec<CallArg>,
    },

    AfterCancel { script: String },

    AfterCancelAll,

    VariableSet { name: String, value: String },

    /// 条件为假时跳到 `next`（下一个 or_case / case_else / case_end）
    Case {
        test: CaseTest,
        chain: Option<String>,
        next: usize,
    },

    /// 顺序执行到达时说明前面分支已命中，直接跳到 `end`
    OrCase {
        test: CaseTest,
        chain: Option<String>,
        next: usize,
        end: usize,
    },

    CaseElse { end: usize },

    CaseEnd,

    DialogShow,

    DialogClose,

    /// 下一行文本接在当前行后
    Continue,

    /// 下一次 halt 结束时保留文本
    NoClear,

    Font { name: String },

    PlayAudio {
        channel: AudioChannel,
        key: String,
        looping: bool,
    },

    /// `None` 表示停止所有声道
    StopAudio { channel: Option<AudioChannel> },

    /// 音量（0.0 - 1.0，脚本中写百分比）
    Volume { channel: VolumeChannel, level: f32 },
}

impl Instruction {
    /// 指令引用的精灵（类别 + 别名）
    pub fn sprite_reference(&self) -> Option<(SpriteCategory, &str)> {
        match self {
            Self::LoadAs {
                category, source, ..
            } => Some((*category, source)),
            Self::Swap {
                category, alias, ..
            }
            | Self::Show { category, alias }
            | Self::Hide { category, alias }
            | Self::Remove { category, alias }
            | Self::SetPosition {
                category, alias, ..
            }
            | Self::Flip {
                category, alias, ..
            }
            | Self::SetCenter {
                category, alias, ..
            }
            | Self::CenterXWith {
                category, alias, ..
            }
            | Self::SetCurrentValue {
                category, alias, ..
            }
            | Self::Tween {
                category, alias, ..
            }
            | Self::StopTween {
                category, alias, ..
            }
            | Self::AfterStop {
                category, alias, ..
            }
            | Self::WaitForAnimation {
                category, alias, ..
            } => Some((*category, alias)),
            _ => None,
        }
    }

    /// 指令声明的精灵别名
    pub fn sprite_declaration(&self) -> Option<(SpriteCategory, &str)> {
        match self {
            Self::Load {
                category, alias, ..
            }
            | Self::LoadAs {
                category, alias, ..
            } => Some((*category, alias)),
            _ => None,
        }
    }

    /// 指令引用的图像素材键
    pub fn image_reference(&self) -> Option<&str> {
        match self {
            Self::Load { image, .. } | Self::Swap { image, .. } => Some(image),
            _ => None,
        }
    }

    /// 指令引用的可复用脚本
    pub fn script_reference(&self) -> Option<&str> {
        match self {
            Self::Call { script, .. }
            | Self::After { script, .. }
            | Self::AfterStop { script, .. } => Some(script),
            _ => None,
        }
    }
}

/// 编译后的指令块
///
/// `source_lines[i]` 是第 i 条指令在脚本中的行号。
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ScriptBlock {
    pub instructions: Vec<Instruction>,
    pub source_lines: Vec<usize>,
}

impl ScriptBlock {
    pub fn new(instructions: Vec<Instruction>, source_lines: Vec<usize>) -> Self {
        Self {
            instructions,
            source_lines,
        }
    }

    pub fn get(&self, index: usize) -> Option<&Instruction> {
        self.instructions.get(index)
    }

    pub fn len(&self) -> usize {
        self.instructions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.instructions.is_empty()
    }

    /// 获取指令对应的源码行号，越界时返回 0
    pub fn line_of(&self, index: usize) -> usize {
        self.source_lines.get(index).copied().unwrap_or(0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_category_names() {
        assert_eq!(
            SpriteCategory::from_name("dialog_sprite"),
            Some(SpriteCategory::DialogSprite)
        );
        assert_eq!(
            SpriteCategory::from_name(" Character "),
            Some(SpriteCategory::Character)
        );
        assert_eq!(SpriteCategory::from_name("sprite"), None);
        assert_eq!(SpriteCategory::Object.to_string(), "object");
    }

    #[test]
    fn test_category_draw_order() {
        let mut categories = SpriteCategory::ALL.to_vec();
        categories.sort();
        assert_eq!(categories.first(), Some(&SpriteCategory::Background));
        assert_eq!(categories.last(), Some(&SpriteCategory::DialogSprite));
    }

    #[test]
    fn test_instruction_references() {
        let show = Instruction::Show {
            category: SpriteCategory::Character,
            alias: "hero".to_string(),
        };
        assert_eq!(
            show.sprite_reference(),
            Some((SpriteCategory::Character, "hero"))
        );
        assert_eq!(show.sprite_declaration(), None);

        let load_as = Instruction::LoadAs {
            category: SpriteCategory::Object,
            source: "cup".to_string(),
            alias: "cup2".to_string(),
        };
        assert_eq!(load_as.sprite_reference(), Some((SpriteCategory::Object, "cup")));
        assert_eq!(
            load_as.sprite_declaration(),
            Some((SpriteCategory::Object, "cup2"))
        );

        let call = Instruction::Call {
            script: "shake".to_string(),
            args: Vec::new(),
        };
        assert_eq!(call.script_reference(), Some("shake"));
    }

    #[test]
    fn test_block_line_lookup() {
        let block = ScriptBlock::new(vec![Instruction::Halt], vec![7]);
        assert_eq!(block.line_of(0), 7);
        assert_eq!(block.line_of(5), 0);
        assert_eq!(block.len(), 1);
    }
}
