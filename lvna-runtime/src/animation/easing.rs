//! # Easing 模块
//!
//! 缓动函数库，用于补间的时间插值。

use serde::{Deserialize, Serialize};
use std::f32::consts::PI;

/// 缓动函数类型
///
/// 脚本中以蛇形命名书写，例如 `ease_in_out`。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EasingFunction {
    /// 线性（匀速）
    #[default]
    Linear,
    /// 缓入（先慢后快）
    EaseIn,
    /// 缓出（先快后慢）
    EaseOut,
    /// 缓入缓出（两头慢中间快）
    EaseInOut,
    /// 二次缓入
    EaseInQuad,
    /// 二次缓出
    EaseOutQuad,
    /// 正弦缓入缓出
    EaseInOutSine,
}

impl EasingFunction {
    const NAMES: [(&'static str, EasingFunction); 7] = [
        ("linear", EasingFunction::Linear),
        ("ease_in", EasingFunction::EaseIn),
        ("ease_out", EasingFunction::EaseOut),
        ("ease_in_out", EasingFunction::EaseInOut),
        ("ease_in_quad", EasingFunction::EaseInQuad),
        ("ease_out_quad", EasingFunction::EaseOutQuad),
        ("ease_in_out_sine", EasingFunction::EaseInOutSine),
    ];

    /// 按脚本名称查找（大小写不敏感）
    pub fn from_name(name: &str) -> Option<Self> {
        let name = name.trim();
        Self::NAMES
            .iter()
            .find(|(n, _)| n.eq_ignore_ascii_case(name))
            .map(|(_, e)| *e)
    }

    /// 计算缓动值
    ///
    /// # 参数
    /// - `t`: 时间进度 (0.0 - 1.0)
    ///
    /// # 返回
    /// - 缓动后的进度值 (0.0 - 1.0)
    pub fn apply(&self, t: f32) -> f32 {
        let t = t.clamp(0.0, 1.0);

        let eased = match self {
            EasingFunction::Linear => t,
            EasingFunction::EaseIn => t * t * t,
            EasingFunction::EaseOut => 1.0 - (1.0 - t).powi(3),
            EasingFunction::EaseInOut => {
                if t < 0.5 {
                    4.0 * t * t * t
                } else {
                    1.0 - (-2.0 * t + 2.0).powi(3) / 2.0
                }
            }
            EasingFunction::EaseInQuad => t * t,
            EasingFunction::EaseOutQuad => 1.0 - (1.0 - t) * (1.0 - t),
            EasingFunction::EaseInOutSine => -((PI * t).cos() - 1.0) / 2.0,
        };

        // 浮点误差不得把进度推出区间
        eased.clamp(0.0, 1.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_linear() {
        let easing = EasingFunction::Linear;
        assert_eq!(easing.apply(0.0), 0.0);
        assert_eq!(easing.apply(0.5), 0.5);
        assert_eq!(easing.apply(1.0), 1.0);
    }

    #[test]
    fn test_ease_in_out() {
        let easing = EasingFunction::EaseInOut;
        assert_eq!(easing.apply(0.0), 0.0);
        assert_eq!(easing.apply(1.0), 1.0);
        // 中点应该是 0.5
        let mid = easing.apply(0.5);
        assert!((mid - 0.5).abs() < 0.01);
    }

    #[test]
    fn test_clamp() {
        let easing = EasingFunction::Linear;
        assert_eq!(easing.apply(-0.5), 0.0);
        assert_eq!(easing.apply(1.5), 1.0);
    }

    #[test]
    fn test_all_curves_stay_in_range() {
        for (_, easing) in EasingFunction::NAMES {
            for step in 0..=20 {
                let v = easing.apply(step as f32 / 20.0);
                assert!((0.0..=1.0).contains(&v), "{easing:?} 越界: {v}");
            }
        }
    }

    #[test]
    fn test_from_name() {
        assert_eq!(
            EasingFunction::from_name("Ease_In_Out"),
            Some(EasingFunction::EaseInOut)
        );
        assert_eq!(EasingFunction::from_name("bounce"), None);
    }
}
