//! # State 模块
//!
//! 定义解释器的运行时状态、等待模型和变量表。
//!
//! ## 设计原则
//!
//! - 所有状态必须**显式建模**
//! - 变量表是会话持有的上下文对象，通过引用传入解释器，不存在全局可变状态

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::time::Duration;

use crate::condition::parse_number;
use crate::error::RuntimeError;
use crate::script::{AnimationKind, SpriteCategory};

/// 脚本变量值
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum VarValue {
    Number(f64),
    Text(String),
    Bool(bool),
}

impl VarValue {
    /// 按字面量推断类型：`true`/`false` → Bool，数字 → Number，其余 → Text
    pub fn parse_literal(text: &str) -> Self {
        let trimmed = text.trim();
        if trimmed.eq_ignore_ascii_case("true") {
            Self::Bool(true)
        } else if trimmed.eq_ignore_ascii_case("false") {
            Self::Bool(false)
        } else if let Some(n) = parse_number(trimmed) {
            Self::Number(n)
        } else {
            Self::Text(trimmed.to_string())
        }
    }

    /// 条件判断时的真值
    pub fn is_truthy(&self) -> bool {
        match self {
            Self::Bool(b) => *b,
            Self::Number(n) => *n != 0.0,
            Self::Text(s) => !s.is_empty() && s != "false" && s != "0",
        }
    }
}

impl std::fmt::Display for VarValue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Number(n) => write!(f, "{n}"),
            Self::Text(s) => f.write_str(s),
            Self::Bool(b) => write!(f, "{b}"),
        }
    }
}

/// 变量表
///
/// 会话级全局变量，由 Story 的初始变量表复制而来。
#[derive(Debug, Clone, Default, PartialEq)]
pub struct VariableTable {
    values: BTreeMap<String, VarValue>,
}

impl VariableTable {
    pub fn new(initial: BTreeMap<String, VarValue>) -> Self {
        Self { values: initial }
    }

    pub fn get(&self, name: &str) -> Option<&VarValue> {
        self.values.get(name)
    }

    pub fn set(&mut self, name: impl Into<String>, value: VarValue) {
        self.values.insert(name.into(), value);
    }

    pub fn contains(&self, name: &str) -> bool {
        self.values.contains_key(name)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &VarValue)> {
        self.values.iter()
    }
}

/// 变量作用域：调用帧的局部变量优先，其次全局变量
pub struct Scope<'a> {
    pub locals: Option<&'a BTreeMap<String, VarValue>>,
    pub globals: &'a VariableTable,
}

impl<'a> Scope<'a> {
    pub fn new(locals: Option<&'a BTreeMap<String, VarValue>>, globals: &'a VariableTable) -> Self {
        Self { locals, globals }
    }

    pub fn lookup(&self, name: &str) -> Option<&'a VarValue> {
        self.locals
            .and_then(|locals| locals.get(name))
            .or_else(|| self.globals.get(name))
    }

    /// 替换文本中的 `($name)` 引用
    ///
    /// 变量值本身可以再包含引用，最多展开 [`MAX_SUBSTITUTION_PASSES`] 轮；
    /// 无法解析的引用原样保留。
    pub fn substitute(&self, text: &str) -> String {
        let mut current = text.to_string();
        for _ in 0..MAX_SUBSTITUTION_PASSES {
            let (next, replaced) = self.substitute_once(&current);
            current = next;
            if !replaced {
                break;
            }
        }
        current
    }

    fn substitute_once(&self, text: &str) -> (String, bool) {
        let mut output = String::with_capacity(text.len());
        let mut rest = text;
        let mut replaced = false;
        while let Some(start) = rest.find("($") {
            output.push_str(&rest[..start]);
            let after = &rest[start + 2..];
            match after.find(')') {
                Some(end) => {
                    let name = &after[..end];
                    match self.lookup(name.trim()) {
                        Some(value) => {
                            output.push_str(&value.to_string());
                            replaced = true;
                        }
                        None => {
                            output.push_str("($");
                            output.push_str(name);
                            output.push(')');
                        }
                    }
                    rest = &after[end + 1..];
                }
                None => {
                    output.push_str(&rest[start..]);
                    rest = "";
                }
            }
        }
        output.push_str(rest);
        (output, replaced)
    }
}

/// 变量替换的最大展开轮数
pub const MAX_SUBSTITUTION_PASSES: usize = 4;

/// 等待的用户输入类型
#[derive(Debug, Clone, PartialEq)]
pub enum InputKind {
    /// 等待推进（halt）
    Advance,
    /// 等待选择，选中项文本写入 `variable`
    Choice {
        variable: String,
        options: Vec<String>,
    },
}

/// 场景级运行时错误
///
/// 携带出错位置，供驱动方报告"哪个场景的哪条指令因何失败"。
#[derive(Debug, Clone, PartialEq)]
pub struct SceneError {
    pub chapter: String,
    pub scene: String,
    /// 出错的可复用脚本（主脚本出错时为 `None`）
    pub script: Option<String>,
    /// 指令下标
    pub instruction: usize,
    /// 源码行号
    pub line: usize,
    pub error: RuntimeError,
}

impl std::fmt::Display for SceneError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "场景 {}/{}", self.chapter, self.scene)?;
        if let Some(script) = &self.script {
            write!(f, " 的可复用脚本 '{script}'")?;
        }
        write!(
            f,
            " 第 {} 条指令（第 {} 行）出错: {}",
            self.instruction, self.line, self.error
        )
    }
}

impl std::error::Error for SceneError {}

/// 停止原因
#[derive(Debug, Clone, PartialEq)]
pub enum HaltReason {
    /// 脚本正常执行完毕
    Finished,
    /// 运行时错误导致场景中止
    Error(SceneError),
}

/// 解释器状态
///
/// # 状态转换
///
/// ```text
/// Running            -> 顺序执行指令，直到遇到阻塞指令或脚本结束
/// WaitingTimer       -> 会话时钟到达 deadline 后继续
/// WaitingAnimation   -> 对应精灵的动画结束后继续
/// WaitingUserInput   -> 收到匹配的 PlayerEvent 后继续
/// Halted             -> 脚本结束或出错，不再执行
/// ```
#[derive(Debug, Clone, PartialEq, Default)]
pub enum InterpreterState {
    #[default]
    Running,

    /// 等待计时器，`deadline` 是会话时钟上的绝对时间
    ///
    /// `clear_dialog` 为真时（`halt_auto`）到期后按 halt 的规则清除对话文本。
    WaitingTimer { deadline: Duration, clear_dialog: bool },

    /// 等待动画结束，`kind` 为 `None` 表示任意动画
    WaitingAnimation {
        category: SpriteCategory,
        alias: String,
        kind: Option<AnimationKind>,
    },

    WaitingUserInput(InputKind),

    Halted(HaltReason),
}

impl InterpreterState {
    /// 是否处于等待状态
    pub fn is_waiting(&self) -> bool {
        matches!(
            self,
            Self::WaitingTimer { .. } | Self::WaitingAnimation { .. } | Self::WaitingUserInput(_)
        )
    }

    pub fn is_halted(&self) -> bool {
        matches!(self, Self::Halted(_))
    }

    /// 状态名称（用于日志和错误信息）
    pub fn name(&self) -> &'static str {
        match self {
            Self::Running => "Running",
            Self::WaitingTimer { .. } => "WaitingTimer",
            Self::WaitingAnimation { .. } => "WaitingAnimation",
            Self::WaitingUserInput(InputKind::Advance) => "WaitingUserInput(Advance)",
            Self::WaitingUserInput(InputKind::Choice { .. }) => "WaitingUserInput(Choice)",
            Self::Halted(HaltReason::Finished) => "Halted(Finished)",
            Self::Halted(HaltReason::Error(_)) => "Halted(Error)",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_literal() {
        assert_eq!(VarValue::parse_literal("TRUE"), VarValue::Bool(true));
        assert_eq!(VarValue::parse_literal(" 42 "), VarValue::Number(42.0));
        assert_eq!(
            VarValue::parse_literal("green tea"),
            VarValue::Text("green tea".to_string())
        );
        // NaN/inf 不视为数字
        assert_eq!(
            VarValue::parse_literal("inf"),
            VarValue::Text("inf".to_string())
        );
    }

    #[test]
    fn test_truthiness() {
        assert!(VarValue::Bool(true).is_truthy());
        assert!(!VarValue::Number(0.0).is_truthy());
        assert!(VarValue::Number(-1.0).is_truthy());
        assert!(!VarValue::Text(String::new()).is_truthy());
        assert!(!VarValue::Text("false".to_string()).is_truthy());
        assert!(VarValue::Text("yes".to_string()).is_truthy());
    }

    #[test]
    fn test_display_numbers() {
        assert_eq!(VarValue::Number(3.0).to_string(), "3");
        assert_eq!(VarValue::Number(2.5).to_string(), "2.5");
    }

    #[test]
    fn test_scope_prefers_locals() {
        let mut globals = VariableTable::default();
        globals.set("name", VarValue::Text("Rave".to_string()));
        globals.set("mood", VarValue::Text("calm".to_string()));
        let mut locals = BTreeMap::new();
        locals.insert("mood".to_string(), VarValue::Text("angry".to_string()));

        let scope = Scope::new(Some(&locals), &globals);
        assert_eq!(
            scope.substitute("($name) is ($mood)."),
            "Rave is angry."
        );

        let global_only = Scope::new(None, &globals);
        assert_eq!(global_only.substitute("($mood)"), "calm");
    }

    #[test]
    fn test_substitute_keeps_unknown_and_unclosed() {
        let globals = VariableTable::default();
        let scope = Scope::new(None, &globals);
        assert_eq!(scope.substitute("hi ($who)!"), "hi ($who)!");
        assert_eq!(scope.substitute("broken ($who"), "broken ($who");
    }

    #[test]
    fn test_substitute_nested_is_bounded() {
        let mut globals = VariableTable::default();
        globals.set("a", VarValue::Text("($b)".to_string()));
        globals.set("b", VarValue::Text("done".to_string()));
        globals.set("loop", VarValue::Text("($loop)".to_string()));
        let scope = Scope::new(None, &globals);
        assert_eq!(scope.substitute("($a)"), "done");
        assert_eq!(scope.substitute("($loop)"), "($loop)");
    }

    #[test]
    fn test_state_predicates() {
        assert!(!InterpreterState::Running.is_waiting());
        assert!(InterpreterState::WaitingUserInput(InputKind::Advance).is_waiting());
        assert!(InterpreterState::Halted(HaltReason::Finished).is_halted());
        assert_eq!(
            InterpreterState::WaitingTimer {
                deadline: Duration::from_millis(5),
                clear_dialog: false,
            }
            .name(),
            "WaitingTimer"
        );
    }
}
