//! # Animation 模块
//!
//! 精灵补间动画。
//!
//! ## 核心概念
//!
//! - `Tween`: 单个属性的补间，管理 f32 值的时间变化
//! - `AnimationScheduler`: 每帧推进所有补间并产生结束事件
//! - `EasingFunction`: 缓动函数
//!
//! 时间统一用 [`std::time::Duration`] 累加，避免浮点累积误差；
//! 补间完成时属性被精确设为终值。

mod easing;
mod scheduler;
mod tween;

pub use easing::EasingFunction;
pub use scheduler::{AnimationEnd, AnimationEvent, AnimationScheduler};
pub use tween::{SpriteProperty, Tween};
