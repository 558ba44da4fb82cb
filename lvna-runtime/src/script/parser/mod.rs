//! # Parser 模块
//!
//! 两阶段脚本解析器实现（手写，无 regex 依赖）。
//!
//! ## 架构
//!
//! ```text
//! 原始文本 → [阶段1: 行识别] → Vec<Line> → [阶段2: 指令解析] → ScriptBlock
//! ```
//!
//! 解析在第一个错误处停止，错误带行号和期望格式。
//! 条件块（case / or_case / case_else / case_end）在阶段 2 结束后回填跳转偏移。
//!
//! ## 模块结构
//!
//! - `helpers`: 辅助解析函数
//! - `phase1`: 行识别
//! - `phase2`: 指令解析

mod helpers;
mod phase1;
mod phase2;


use crate::error::ParseError;
use crate::script::ast::ScriptBlock;

use phase1::recognize_lines;
use phase2::{Phase2Parser, resolve_branches};

pub use helpers::{is_identifier, split_args, starts_with_ignore_case};

/// 脚本解析器
pub struct Parser {
    phase2: Phase2Parser,
}

impl Parser {
    /// 创建新的解析器
    pub fn new() -> Self {
        Self {
            phase2: Phase2Parser::new(),
        }
    }

    /// 解析脚本文本为指令块
    pub fn parse(&mut self, text: &str) -> Result<ScriptBlock, ParseError> {
        // 阶段 1：行识别
        let lines = recognize_lines(text)?;

        // 阶段 2：指令解析（同时收集行号）
        let mut instructions = Vec::with_capacity(lines.len());
        let mut source_lines = Vec::with_capacity(lines.len());
        for line in &lines {
            instructions.push(self.phase2.parse_line(line)?);
            source_lines.push(line.line_number());
        }

        resolve_branches(&mut instructions, &source_lines)?;

        Ok(ScriptBlock::new(instructions, source_lines))
    }
}

/// 校验指令块中条件块的跳转偏移
///
/// 从容器解码的指令块不经过解析器，偏移必须与按结构重新推导的结果完全一致。
pub fn verify_branches(block: &ScriptBlock) -> Result<(), ParseError> {
    let mut relinked = block.instructions.clone();
    resolve_branches(&mut relinked, &block.source_lines)?;
    match relinked
        .iter()
        .zip(&block.instructions)
        .position(|(expected, found)| expected != found)
    {
        Some(index) => Err(ParseError::UnbalancedCase {
            line: block.line_of(index),
            token: format!("第 {index} 条指令"),
            expected: "与条件块结构一致的跳转偏移".to_string(),
        }),
        None => Ok(()),
    }
}

impl Default for Parser {
    fn default() -> Self {
        Self::new()
    }
}
