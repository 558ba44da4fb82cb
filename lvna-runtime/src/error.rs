//! # Error 模块
//!
//! 定义 lvna-runtime 中使用的错误类型。
//!
//! 错误按发现时机分层：
//!
//! - [`ParseError`]：脚本文本解析失败，加载阶段即报告
//! - [`ContainerError`]：`.lvna` 容器读写失败，整个故事不可用
//! - [`RuntimeError`]：播放过程中才能发现的动态错误，在场景边界恢复
//! - [`AssetError`]：单个素材不可用，对应精灵按"不存在"渲染

use thiserror::Error;

use crate::script::SpriteCategory;

/// 解析错误
///
/// 所有变体都携带 1 起始的行号，方便编辑器定位。
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ParseError {
    /// 无法识别的行格式（例如缺少右尖括号）
    #[error("第 {line} 行：无效的格式 '{token}'，期望 {expected}")]
    InvalidLine {
        line: usize,
        token: String,
        expected: String,
    },

    /// 未知指令
    #[error("第 {line} 行：未知指令 '{command}'")]
    UnknownCommand { line: usize, command: String },

    /// 缺少必需参数
    #[error("第 {line} 行：指令 '{command}' 缺少参数，期望 {expected}")]
    MissingArgument {
        line: usize,
        command: String,
        expected: String,
    },

    /// 多余的参数
    #[error("第 {line} 行：指令 '{command}' 的参数 '{token}' 多余，期望 {expected}")]
    UnexpectedArgument {
        line: usize,
        command: String,
        token: String,
        expected: String,
    },

    /// 无效的参数值
    #[error("第 {line} 行：参数 '{token}' 无效，期望 {expected}")]
    InvalidArgument {
        line: usize,
        token: String,
        expected: String,
    },

    /// case 结构不完整
    #[error("第 {line} 行：条件块结构错误 '{token}'，期望 {expected}")]
    UnbalancedCase {
        line: usize,
        token: String,
        expected: String,
    },
}

impl ParseError {
    /// 出错的行号
    pub fn line(&self) -> usize {
        match self {
            Self::InvalidLine { line, .. }
            | Self::UnknownCommand { line, .. }
            | Self::MissingArgument { line, .. }
            | Self::UnexpectedArgument { line, .. }
            | Self::InvalidArgument { line, .. }
            | Self::UnbalancedCase { line, .. } => *line,
        }
    }
}

/// 容器错误
///
/// 读取失败时不会返回任何部分构造的 Story。
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ContainerError {
    /// 魔数不匹配
    #[error("不是 .lvna 文件：魔数不匹配")]
    BadMagic,

    /// 数据被截断
    #[error("容器数据被截断：{what} 需要 {needed} 字节，实际只有 {available} 字节")]
    Truncated {
        what: String,
        needed: u64,
        available: u64,
    },

    /// 不支持的格式版本
    #[error("不支持的容器版本 {found}，当前支持 1..={supported}")]
    UnsupportedVersion { found: u16, supported: u16 },

    /// 索引无法解析
    #[error("容器索引无法解析: {message}")]
    MalformedIndex { message: String },

    /// 指令块无法解析
    #[error("指令块 '{block}' 无法解析: {message}")]
    MalformedBlock { block: String, message: String },

    /// 素材校验和不匹配
    #[error("素材 '{key}' 校验失败：期望 {expected}，实际 {actual}")]
    CorruptAsset {
        key: String,
        expected: String,
        actual: String,
    },

    /// 故事本身不完整（重名、悬空引用等）
    #[error("故事完整性检查失败: {}", problems.join("; "))]
    IntegrityError { problems: Vec<String> },
}

/// 运行时错误
#[derive(Error, Debug, Clone, PartialEq)]
pub enum RuntimeError {
    /// 精灵别名不存在
    #[error("{category} 精灵 '{alias}' 未加载")]
    UnknownSpriteAlias {
        category: SpriteCategory,
        alias: String,
    },

    /// 条件变量未设置且不允许省略
    #[error("条件 '{name}' 未设置")]
    UnspecifiedCondition { name: String },

    /// 调用栈超过上限
    #[error("调用 '{script}' 时调用栈深度超过上限 {limit}")]
    RecursionLimitExceeded { script: String, limit: usize },

    /// 可复用脚本不存在
    #[error("可复用脚本 '{name}' 不存在")]
    UnknownScript { name: String },

    /// 场景不存在
    #[error("场景 '{chapter}/{scene}' 不存在")]
    UnknownScene { chapter: String, scene: String },

    /// 无效的选择索引
    #[error("无效的选择索引 {index}，有效范围是 0..{max}")]
    InvalidChoice { index: usize, max: usize },

    /// 条件块的跳转目标不在当前指令之后
    #[error("条件跳转目标 {target} 无效")]
    MalformedBranch { target: usize },
}

/// 素材错误
///
/// 只影响引用该素材的精灵，不会中断播放。
#[derive(Error, Debug, Clone, PartialEq)]
pub enum AssetError {
    /// 素材表中不存在
    #[error("素材 '{key}' 不存在")]
    Missing { key: String },

    /// 素材类型不符
    #[error("素材 '{key}' 不是{expected}")]
    WrongKind { key: String, expected: String },

    /// 无法识别的图像数据
    #[error("素材 '{key}' 不是可识别的图像格式")]
    Undecodable { key: String },
}

/// lvna-runtime 统一错误类型
#[derive(Error, Debug, Clone, PartialEq)]
pub enum LvnError {
    /// 解析错误
    #[error("解析错误: {0}")]
    Parse(#[from] ParseError),

    /// 容器错误
    #[error("容器错误: {0}")]
    Container(#[from] ContainerError),

    /// 运行时错误
    #[error("运行时错误: {0}")]
    Runtime(#[from] RuntimeError),

    /// 素材错误
    #[error("素材错误: {0}")]
    Asset(#[from] AssetError),
}

/// Result 类型别名
pub type LvnResult<T> = Result<T, LvnError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_error_display() {
        let err = ParseError::UnknownCommand {
            line: 3,
            command: "jump".to_string(),
        };
        insta::assert_snapshot!(err.to_string(), @"第 3 行：未知指令 'jump'");
        assert_eq!(err.line(), 3);
    }

    #[test]
    fn test_integrity_error_joins_problems() {
        let err = ContainerError::IntegrityError {
            problems: vec!["章节 'a' 重名".to_string(), "素材 'bg' 不存在".to_string()],
        };
        insta::assert_snapshot!(
            err.to_string(),
            @"故事完整性检查失败: 章节 'a' 重名; 素材 'bg' 不存在"
        );
    }

    #[test]
    fn test_runtime_error_mentions_category() {
        let err = RuntimeError::UnknownSpriteAlias {
            category: SpriteCategory::Character,
            alias: "hero".to_string(),
        };
        insta::assert_snapshot!(err.to_string(), @"character 精灵 'hero' 未加载");
    }

    #[test]
    fn test_lvn_error_from() {
        let err: LvnError = RuntimeError::UnknownScript {
            name: "loop".to_string(),
        }
        .into();
        assert!(matches!(err, LvnError::Runtime(RuntimeError::UnknownScript { .. })));
    }
}
