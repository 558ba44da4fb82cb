//! # Call Stack 模块
//!
//! 读取器的调用栈。每帧记录正在执行的指令块、游标和局部变量。

use std::collections::BTreeMap;

use crate::error::RuntimeError;
use crate::script::ScriptBlock;
use crate::state::VarValue;
use crate::story::Story;

/// 调用栈深度上限
pub const MAX_CALL_DEPTH: usize = 64;

/// 帧所执行的指令块
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ScriptRef {
    /// 章节前导脚本
    Prelude { chapter: usize },
    /// 场景脚本
    Scene { chapter: usize, scene: usize },
    /// 可复用脚本
    Reusable(String),
}

impl ScriptRef {
    pub fn resolve<'s>(&self, story: &'s Story) -> Option<&'s ScriptBlock> {
        match self {
            Self::Prelude { chapter } => story.chapters.get(*chapter)?.prelude.as_ref(),
            Self::Scene { chapter, scene } => {
                Some(&story.chapters.get(*chapter)?.scenes.get(*scene)?.script)
            }
            Self::Reusable(name) => story.reusable(name),
        }
    }

    /// 可复用脚本名（场景和前导脚本返回 `None`）
    pub fn reusable_name(&self) -> Option<&str> {
        match self {
            Self::Reusable(name) => Some(name),
            _ => None,
        }
    }
}

/// 调用帧
#[derive(Debug, Clone, PartialEq)]
pub struct Frame {
    pub script: ScriptRef,
    /// 下一条要执行的指令下标
    pub cursor: usize,
    /// call / after 传入的参数
    pub locals: BTreeMap<String, VarValue>,
}

impl Frame {
    pub fn new(script: ScriptRef) -> Self {
        Self {
            script,
            cursor: 0,
            locals: BTreeMap::new(),
        }
    }

    pub fn with_locals(mut self, locals: BTreeMap<String, VarValue>) -> Self {
        self.locals = locals;
        self
    }
}

/// 调用栈
///
/// `base_depth` 是派生出本读取器的调用链深度，
/// 通过 after 自我调度的脚本因此也受 [`MAX_CALL_DEPTH`] 约束。
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CallStack {
    frames: Vec<Frame>,
    base_depth: usize,
}

impl CallStack {
    pub fn new(base_depth: usize) -> Self {
        Self {
            frames: Vec::new(),
            base_depth,
        }
    }

    /// 当前深度（含继承的深度）
    pub fn depth(&self) -> usize {
        self.base_depth + self.frames.len()
    }

    /// 压入新帧，超过上限时返回 `RecursionLimitExceeded`
    pub fn push(&mut self, frame: Frame) -> Result<(), RuntimeError> {
        if self.depth() >= MAX_CALL_DEPTH {
            let script = match &frame.script {
                ScriptRef::Reusable(name) => name.clone(),
                other => format!("{other:?}"),
            };
            return Err(RuntimeError::RecursionLimitExceeded {
                script,
                limit: MAX_CALL_DEPTH,
            });
        }
        self.frames.push(frame);
        Ok(())
    }

    pub fn pop(&mut self) -> Option<Frame> {
        self.frames.pop()
    }

    pub fn top(&self) -> Option<&Frame> {
        self.frames.last()
    }

    pub fn top_mut(&mut self) -> Option<&mut Frame> {
        self.frames.last_mut()
    }

    pub fn is_empty(&self) -> bool {
        self.frames.is_empty()
    }

    pub fn clear(&mut self) {
        self.frames.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_depth_limit() {
        let mut stack = CallStack::new(0);
        for _ in 0..MAX_CALL_DEPTH {
            stack.push(Frame::new(ScriptRef::Reusable("loop".to_string()))).unwrap();
        }
        assert_eq!(stack.depth(), MAX_CALL_DEPTH);
        let err = stack
            .push(Frame::new(ScriptRef::Reusable("loop".to_string())))
            .unwrap_err();
        assert_eq!(
            err,
            RuntimeError::RecursionLimitExceeded {
                script: "loop".to_string(),
                limit: MAX_CALL_DEPTH,
            }
        );
    }

    #[test]
    fn test_inherited_depth_counts() {
        let mut stack = CallStack::new(MAX_CALL_DEPTH - 1);
        stack.push(Frame::new(ScriptRef::Reusable("tick".to_string()))).unwrap();
        assert!(stack.push(Frame::new(ScriptRef::Reusable("tick".to_string()))).is_err());
    }

    #[test]
    fn test_pop_returns_to_caller() {
        let mut stack = CallStack::new(0);
        stack
            .push(Frame::new(ScriptRef::Scene { chapter: 0, scene: 0 }))
            .unwrap();
        stack.top_mut().unwrap().cursor = 3;
        stack.push(Frame::new(ScriptRef::Reusable("wave".to_string()))).unwrap();
        stack.pop();
        assert_eq!(stack.top().unwrap().cursor, 3);
    }
}
