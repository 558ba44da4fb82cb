//! # Input 模块
//!
//! 定义驱动方向会话传递的输入事件。
//!
//! ## 设计说明
//!
//! - 会话不直接处理鼠标/键盘事件，只处理语义化的输入
//! - 时间流逝通过 `tick(dt)` 传入，不是输入事件

use serde::{Deserialize, Serialize};

/// 驱动方传递给会话的输入
///
/// - `Advance`：解除 `halt` 造成的等待
/// - `ChoiceSelected`：解除 `choice` 造成的等待，并传递用户选择
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PlayerEvent {
    /// 推进（点击 / 回车）
    Advance,

    /// 用户选择了某个选项
    ///
    /// `index` 是选项的索引（从 0 开始）
    ChoiceSelected { index: usize },
}

impl PlayerEvent {
    pub fn advance() -> Self {
        Self::Advance
    }

    pub fn choice(index: usize) -> Self {
        Self::ChoiceSelected { index }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_event_creation() {
        assert_eq!(PlayerEvent::advance(), PlayerEvent::Advance);
        assert_eq!(
            PlayerEvent::choice(2),
            PlayerEvent::ChoiceSelected { index: 2 }
        );
    }

    #[test]
    fn test_event_serialization() {
        let event = PlayerEvent::ChoiceSelected { index: 1 };
        let json = serde_json::to_string(&event).unwrap();
        let deserialized: PlayerEvent = serde_json::from_str(&json).unwrap();
        assert_eq!(event, deserialized);
    }
}
