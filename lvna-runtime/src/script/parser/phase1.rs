//! # 阶段 1：行识别
//!
//! 将原始文本按行识别为指令行或文本行。
//!
//! ```text
//! <halt>                      -> 指令行（无参数）
//! <load_character: img, hero> -> 指令行（参数串 " img, hero"）
//! # 注释                      -> 跳过
//! 其他非空行                  -> 文本行（对话）
//! ```

use crate::error::ParseError;

/// 行类型（阶段 1 输出）
#[derive(Debug, Clone, PartialEq)]
pub enum Line {
    /// 指令行
    Command {
        /// 小写的指令名
        name: String,
        /// 冒号后的原始参数串（无冒号时为 `None`）
        args: Option<String>,
        line_number: usize,
    },
    /// 文本行
    Text { text: String, line_number: usize },
}

impl Line {
    /// 获取行号
    pub fn line_number(&self) -> usize {
        match self {
            Line::Command { line_number, .. } | Line::Text { line_number, .. } => *line_number,
        }
    }
}

/// 识别文本中的行
pub fn recognize_lines(text: &str) -> Result<Vec<Line>, ParseError> {
    let mut lines = Vec::new();

    for (line_idx, raw) in text.lines().enumerate() {
        let line_number = line_idx + 1;
        let trimmed = raw.trim();

        // 空行与注释
        if trimmed.is_empty() || trimmed.starts_with('#') {
            continue;
        }

        if !trimmed.starts_with('<') {
            lines.push(Line::Text {
                text: trimmed.to_string(),
                line_number,
            });
            continue;
        }

        let inner = trimmed
            .strip_prefix('<')
            .and_then(|s| s.strip_suffix('>'))
            .ok_or_else(|| ParseError::InvalidLine {
                line: line_number,
                token: trimmed.to_string(),
                expected: "<command> 或 <command: arguments>".to_string(),
            })?;

        let (name, args) = match inner.split_once(':') {
            Some((name, args)) => (name.trim(), Some(args.to_string())),
            None => (inner.trim(), None),
        };

        if !is_command_name(name) {
            return Err(ParseError::InvalidLine {
                line: line_number,
                token: trimmed.to_string(),
                expected: "以字母开头、由字母数字和下划线组成的指令名".to_string(),
            });
        }

        lines.push(Line::Command {
            name: name.to_ascii_lowercase(),
            args,
            line_number,
        });
    }

    Ok(lines)
}

fn is_command_name(name: &str) -> bool {
    let mut chars = name.chars();
    matches!(chars.next(), Some(c) if c.is_ascii_alphabetic())
        && chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}
