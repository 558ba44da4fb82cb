//! # Tween 模块
//!
//! 单个属性的补间实例。
//!
//! 补间只关注一个 f32 值的时间轴变化，由所属精灵独占。

use std::time::Duration;

use super::EasingFunction;
use crate::script::AnimationKind;

/// 可补间的精灵属性
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum SpriteProperty {
    Opacity,
    X,
    Y,
    Rotation,
    Scale,
}

impl SpriteProperty {
    /// 属性所属的动画种类
    pub fn kind(&self) -> AnimationKind {
        match self {
            Self::Opacity => AnimationKind::Fade,
            Self::X | Self::Y => AnimationKind::Move,
            Self::Rotation => AnimationKind::Rotate,
            Self::Scale => AnimationKind::Scale,
        }
    }

    /// 动画种类驱动的属性
    pub fn of_kind(kind: AnimationKind) -> &'static [SpriteProperty] {
        match kind {
            AnimationKind::Fade => &[Self::Opacity],
            AnimationKind::Move => &[Self::X, Self::Y],
            AnimationKind::Rotate => &[Self::Rotation],
            AnimationKind::Scale => &[Self::Scale],
        }
    }
}

/// 补间实例
///
/// 管理单个 f32 值从 `from` 到 `to` 在 `duration` 时间内的变化。
#[derive(Debug, Clone, PartialEq)]
pub struct Tween {
    pub property: SpriteProperty,
    /// 起始值（发起补间时精灵的实时值）
    pub from: f32,
    /// 目标值
    pub to: f32,
    pub duration: Duration,
    pub easing: EasingFunction,
    /// 已经过的时间
    elapsed: Duration,
}

impl Tween {
    pub fn new(
        property: SpriteProperty,
        from: f32,
        to: f32,
        duration: Duration,
        easing: EasingFunction,
    ) -> Self {
        Self {
            property,
            from,
            to,
            duration,
            easing,
            elapsed: Duration::ZERO,
        }
    }

    /// 推进补间
    ///
    /// # 返回
    /// - `true`: 补间仍在进行中
    /// - `false`: 补间已结束，当前值恰好等于目标值
    pub fn advance(&mut self, dt: Duration) -> bool {
        self.elapsed = self.elapsed.saturating_add(dt).min(self.duration);
        !self.is_finished()
    }

    pub fn is_finished(&self) -> bool {
        self.elapsed >= self.duration
    }

    pub fn elapsed(&self) -> Duration {
        self.elapsed
    }

    /// 原始时间进度（0.0 - 1.0，未应用缓动）
    pub fn progress(&self) -> f32 {
        if self.duration.is_zero() {
            return 1.0;
        }
        (self.elapsed.as_secs_f64() / self.duration.as_secs_f64()).clamp(0.0, 1.0) as f32
    }

    /// 当前值
    ///
    /// 结束时直接返回 `to`，不经过浮点插值。
    pub fn current_value(&self) -> f32 {
        if self.is_finished() {
            return self.to;
        }
        self.from + (self.to - self.from) * self.easing.apply(self.progress())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fade_in() -> Tween {
        Tween::new(
            SpriteProperty::Opacity,
            0.0,
            1.0,
            Duration::from_millis(1000),
            EasingFunction::Linear,
        )
    }

    #[test]
    fn test_tween_update() {
        let mut tween = fade_in();

        assert!(tween.advance(Duration::from_millis(400)));
        let value = tween.current_value();
        assert!(value > 0.0 && value < 1.0);

        // 超出时长也只停在终点
        assert!(!tween.advance(Duration::from_millis(900)));
        assert_eq!(tween.elapsed(), Duration::from_millis(1000));
        assert_eq!(tween.current_value(), 1.0);
    }

    #[test]
    fn test_tween_hundred_ms_steps_end_exactly() {
        let mut tween = fade_in();
        for step in 1..=10 {
            let running = tween.advance(Duration::from_millis(100));
            let value = tween.current_value();
            assert!(value <= 1.0, "第 {step} 步越界: {value}");
            assert_eq!(running, step < 10);
        }
        assert_eq!(tween.current_value(), 1.0);
    }

    #[test]
    fn test_tween_zero_duration_is_finished() {
        let tween = Tween::new(
            SpriteProperty::Scale,
            1.0,
            2.0,
            Duration::ZERO,
            EasingFunction::EaseIn,
        );
        assert!(tween.is_finished());
        assert_eq!(tween.current_value(), 2.0);
    }

    #[test]
    fn test_property_kind_mapping() {
        assert_eq!(SpriteProperty::X.kind(), AnimationKind::Move);
        assert_eq!(
            SpriteProperty::of_kind(AnimationKind::Move),
            &[SpriteProperty::X, SpriteProperty::Y]
        );
    }
}
