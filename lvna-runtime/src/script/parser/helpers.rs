//! # 辅助解析函数
//!
//! 参数切分与类型化取值，所有失败都带行号和期望格式。

use crate::animation::EasingFunction;
use crate::condition::parse_number;
use crate::error::ParseError;
use crate::script::ast::CallArg;

/// 检查字符串是否以指定前缀开头（大小写不敏感）
pub fn starts_with_ignore_case(s: &str, prefix: &str) -> bool {
    s.len() >= prefix.len()
        && s.chars()
            .zip(prefix.chars())
            .all(|(a, b)| a.eq_ignore_ascii_case(&b))
}

/// 按逗号切分参数并去除两端空白
///
/// 空参数串返回空列表。
pub fn split_args(args: &str) -> Vec<String> {
    if args.trim().is_empty() {
        return Vec::new();
    }
    args.split(',').map(|a| a.trim().to_string()).collect()
}

/// 检查是否是合法的标识符（变量名、别名等）
///
/// 允许字母（含非 ASCII）、数字、下划线、连字符、点和空格。
pub fn is_identifier(s: &str) -> bool {
    !s.is_empty() && s.chars().all(|c| c.is_alphanumeric() || c == '_' || c == '-' || c == '.' || c == ' ')
}

/// 单条指令的参数游标
pub struct Args<'a> {
    pub command: &'a str,
    pub line: usize,
    /// 用于错误信息的完整格式描述
    pub form: &'a str,
    items: &'a [String],
    pos: usize,
}

impl<'a> Args<'a> {
    pub fn new(command: &'a str, line: usize, form: &'a str, items: &'a [String]) -> Self {
        Self {
            command,
            line,
            form,
            items,
            pos: 0,
        }
    }

    /// 剩余参数数量
    pub fn remaining(&self) -> usize {
        self.items.len().saturating_sub(self.pos)
    }

    /// 取下一个非空参数
    pub fn next(&mut self) -> Result<&'a str, ParseError> {
        let items = self.items;
        match items.get(self.pos) {
            Some(item) => {
                self.pos += 1;
                if item.is_empty() {
                    return Err(self.invalid(item, self.form));
                }
                Ok(item.as_str())
            }
            None => Err(ParseError::MissingArgument {
                line: self.line,
                command: self.command.to_string(),
                expected: self.form.to_string(),
            }),
        }
    }

    /// 取下一个参数（可选）
    pub fn next_optional(&mut self) -> Option<&'a str> {
        let items = self.items;
        let item = items.get(self.pos)?;
        self.pos += 1;
        Some(item.as_str())
    }

    /// 剩余参数全部取出
    pub fn rest(&mut self) -> &'a [String] {
        let items = self.items;
        let rest = &items[self.pos.min(items.len())..];
        self.pos = self.items.len();
        rest
    }

    /// 取标识符
    pub fn identifier(&mut self) -> Result<&'a str, ParseError> {
        let token = self.next()?;
        if !is_identifier(token) {
            return Err(self.invalid(token, "名称（字母、数字、下划线）"));
        }
        Ok(token)
    }

    /// 取有限的数字
    pub fn number(&mut self) -> Result<f32, ParseError> {
        let token = self.next()?;
        parse_number(token)
            .map(|n| n as f32)
            .filter(|n| n.is_finite())
            .ok_or_else(|| self.invalid(token, "数字"))
    }

    /// 取非负数字
    pub fn non_negative(&mut self) -> Result<f32, ParseError> {
        let items = self.items;
        let token = items.get(self.pos).map(String::as_str).unwrap_or("");
        let value = self.number()?;
        if value < 0.0 {
            return Err(self.invalid(token, "非负数字"));
        }
        Ok(value)
    }

    /// 取百分比 [0, 100]
    pub fn percent(&mut self) -> Result<f32, ParseError> {
        let items = self.items;
        let token = items.get(self.pos).map(String::as_str).unwrap_or("");
        let value = self.number()?;
        if !(0.0..=100.0).contains(&value) {
            return Err(self.invalid(token, "0 到 100 之间的百分比"));
        }
        Ok(value)
    }

    /// 取时长（毫秒，非负整数）
    pub fn duration_ms(&mut self) -> Result<u64, ParseError> {
        let token = self.next()?;
        token
            .parse::<u64>()
            .map_err(|_| self.invalid(token, "非负整数毫秒数"))
    }

    /// 正整数帧数
    pub fn frames(&mut self) -> Result<u32, ParseError> {
        let token = self.next()?;
        match token.parse::<u32>() {
            Ok(frames) if frames > 0 => Ok(frames),
            _ => Err(self.invalid(token, "正整数帧数")),
        }
    }

    /// 解析 `name=value` 形式的调用参数
    pub fn call_args(&mut self) -> Result<Vec<CallArg>, ParseError> {
        let line = self.line;
        self.rest()
            .iter()
            .map(|item| {
                let (name, value) = item.split_once('=').ok_or_else(|| ParseError::InvalidArgument {
                    line,
                    token: item.clone(),
                    expected: "name=value".to_string(),
                })?;
                let name = name.trim();
                if !is_identifier(name) {
                    return Err(ParseError::InvalidArgument {
                        line,
                        token: item.clone(),
                        expected: "name=value".to_string(),
                    });
                }
                Ok(CallArg {
                    name: name.to_string(),
                    value: value.trim().to_string(),
                })
            })
            .collect()
    }

    /// 确认没有多余参数
    pub fn finish(&self) -> Result<(), ParseError> {
        match self.items.get(self.pos) {
            Some(extra) => Err(ParseError::UnexpectedArgument {
                line: self.line,
                command: self.command.to_string(),
                token: extra.clone(),
                expected: self.form.to_string(),
            }),
            None => Ok(()),
        }
    }

    pub fn invalid(&self, token: &str, expected: &str) -> ParseError {
        ParseError::InvalidArgument {
            line: self.line,
            token: token.to_string(),
            expected: expected.to_string(),
        }
    }
}

/// 补间的可选尾参数：缓动函数名和 `no_wait`
pub fn parse_tween_options(args: &mut Args<'_>) -> Result<(EasingFunction, bool), ParseError> {
    let mut easing = None;
    let mut no_wait = false;
    for option in args.rest() {
        if option.eq_ignore_ascii_case("no_wait") && !no_wait {
            no_wait = true;
        } else if let Some(e) = EasingFunction::from_name(option).filter(|_| easing.is_none()) {
            easing = Some(e);
        } else {
            return Err(args.invalid(option, "缓动函数名或 no_wait"));
        }
    }
    Ok((easing.unwrap_or_default(), no_wait))
}
