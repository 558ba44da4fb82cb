//! # Scheduler 模块
//!
//! 动画调度器：每帧推进所有精灵上的补间。
//!
//! 补间由精灵实例独占存储，调度器只负责发起、停止和推进，
//! 并把"某精灵的某种动画结束"记录为 [`AnimationEvent`]。

use std::time::Duration;

use tracing::debug;

use super::{SpriteProperty, Tween};
use crate::error::RuntimeError;
use crate::script::{AnimationKind, SpriteCategory, TweenSpec, TweenTarget};
use crate::sprite::SpriteRegistry;

/// 动画结束原因
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AnimationEnd {
    /// 自然完成
    Completed,
    /// 被 stop 指令打断
    Stopped,
}

/// 动画事件
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AnimationEvent {
    pub category: SpriteCategory,
    pub alias: String,
    pub kind: AnimationKind,
    pub end: AnimationEnd,
}

/// 动画调度器
#[derive(Debug, Default)]
pub struct AnimationScheduler {
    /// 待处理的事件队列
    events: Vec<AnimationEvent>,
}

impl AnimationScheduler {
    pub fn new() -> Self {
        Self::default()
    }

    /// 发起补间
    ///
    /// 同一属性上的旧补间被替换，新补间从精灵的实时值出发。
    /// 时长为 0 时立即落到目标值并记录完成事件。
    pub fn start(
        &mut self,
        registry: &mut SpriteRegistry,
        category: SpriteCategory,
        alias: &str,
        spec: &TweenSpec,
    ) -> Result<(), RuntimeError> {
        let sprite = registry.require_mut(category, alias)?;
        let duration = Duration::from_millis(spec.duration_ms);
        let kind = spec.target.kind();

        for (property, to) in target_values(&spec.target) {
            if duration.is_zero() {
                sprite.set_property(property, to);
                continue;
            }
            let from = sprite.property(property);
            sprite.start_tween(Tween::new(property, from, to, duration, spec.easing));
        }

        if duration.is_zero() {
            sprite.cancel_kind(kind);
            self.push(category, alias, kind, AnimationEnd::Completed);
        } else {
            debug!(%category, alias, %kind, duration_ms = spec.duration_ms, "开始补间");
        }
        Ok(())
    }

    /// 停止补间，属性停在当前值
    pub fn stop(
        &mut self,
        registry: &mut SpriteRegistry,
        category: SpriteCategory,
        alias: &str,
        kind: AnimationKind,
    ) -> Result<(), RuntimeError> {
        if registry.require_mut(category, alias)?.cancel_kind(kind) {
            self.push(category, alias, kind, AnimationEnd::Stopped);
        }
        Ok(())
    }

    /// 推进一帧
    ///
    /// 完成的补间会把属性精确设为终值。
    pub fn tick(&mut self, registry: &mut SpriteRegistry, dt: Duration) {
        for sprite in registry.iter_mut() {
            if !sprite.has_tweens() {
                continue;
            }
            for kind in sprite.advance_tweens(dt) {
                self.events.push(AnimationEvent {
                    category: sprite.category,
                    alias: sprite.alias.clone(),
                    kind,
                    end: AnimationEnd::Completed,
                });
            }
        }
    }

    /// 取出所有待处理事件
    pub fn drain_events(&mut self) -> Vec<AnimationEvent> {
        std::mem::take(&mut self.events)
    }

    /// 丢弃待处理事件（场景切换）
    pub fn clear(&mut self) {
        self.events.clear();
    }

    fn push(&mut self, category: SpriteCategory, alias: &str, kind: AnimationKind, end: AnimationEnd) {
        self.events.push(AnimationEvent {
            category,
            alias: alias.to_string(),
            kind,
            end,
        });
    }
}

fn target_values(target: &TweenTarget) -> Vec<(SpriteProperty, f32)> {
    match *target {
        TweenTarget::Fade { opacity } => vec![(SpriteProperty::Opacity, opacity)],
        TweenTarget::Move { x, y } => vec![(SpriteProperty::X, x), (SpriteProperty::Y, y)],
        TweenTarget::Rotate { degrees } => vec![(SpriteProperty::Rotation, degrees)],
        TweenTarget::Scale { factor } => vec![(SpriteProperty::Scale, factor)],
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::animation::EasingFunction;
    use crate::sprite::ImageRef;
    use crate::story::AssetId;

    fn setup() -> (AnimationScheduler, SpriteRegistry) {
        let mut registry = SpriteRegistry::new();
        registry.declare(
            SpriteCategory::Character,
            "hero",
            ImageRef::new("hero_img", Some(AssetId(0))),
        );
        (AnimationScheduler::new(), registry)
    }

    fn spec(target: TweenTarget, duration_ms: u64) -> TweenSpec {
        TweenSpec {
            target,
            duration_ms,
            easing: EasingFunction::Linear,
            no_wait: false,
        }
    }

    fn opacity(registry: &SpriteRegistry) -> f32 {
        registry
            .get(SpriteCategory::Character, "hero")
            .unwrap()
            .transform
            .opacity
    }

    #[test]
    fn test_fade_reaches_exact_end() {
        let (mut scheduler, mut registry) = setup();
        registry
            .get_mut(SpriteCategory::Character, "hero")
            .unwrap()
            .transform
            .opacity = 0.0;
        scheduler
            .start(
                &mut registry,
                SpriteCategory::Character,
                "hero",
                &spec(TweenTarget::Fade { opacity: 1.0 }, 1000),
            )
            .unwrap();

        for step in 1..=10 {
            scheduler.tick(&mut registry, Duration::from_millis(100));
            assert!(opacity(&registry) <= 1.0);
            if step < 10 {
                assert!(scheduler.drain_events().is_empty());
            }
        }
        assert_eq!(opacity(&registry), 1.0);
        let events = scheduler.drain_events();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].kind, AnimationKind::Fade);
        assert_eq!(events[0].end, AnimationEnd::Completed);
    }

    #[test]
    fn test_concurrent_kinds_do_not_interfere() {
        let (mut scheduler, mut registry) = setup();
        scheduler
            .start(
                &mut registry,
                SpriteCategory::Character,
                "hero",
                &spec(TweenTarget::Fade { opacity: 0.0 }, 200),
            )
            .unwrap();
        scheduler
            .start(
                &mut registry,
                SpriteCategory::Character,
                "hero",
                &spec(TweenTarget::Move { x: 100.0, y: 50.0 }, 400),
            )
            .unwrap();

        scheduler.tick(&mut registry, Duration::from_millis(200));
        let sprite = registry.get(SpriteCategory::Character, "hero").unwrap();
        assert_eq!(sprite.transform.opacity, 0.0);
        assert_eq!(sprite.transform.x, 50.0);
        assert!(sprite.is_animating(AnimationKind::Move));

        scheduler.tick(&mut registry, Duration::from_millis(200));
        let sprite = registry.get(SpriteCategory::Character, "hero").unwrap();
        assert_eq!(sprite.transform.x, 100.0);
        assert_eq!(sprite.transform.y, 50.0);
        let kinds: Vec<AnimationKind> = scheduler.drain_events().iter().map(|e| e.kind).collect();
        assert_eq!(kinds, vec![AnimationKind::Fade, AnimationKind::Move]);
    }

    #[test]
    fn test_same_property_restarts_from_live_value() {
        let (mut scheduler, mut registry) = setup();
        scheduler
            .start(
                &mut registry,
                SpriteCategory::Character,
                "hero",
                &spec(TweenTarget::Scale { factor: 3.0 }, 1000),
            )
            .unwrap();
        scheduler.tick(&mut registry, Duration::from_millis(500));

        scheduler
            .start(
                &mut registry,
                SpriteCategory::Character,
                "hero",
                &spec(TweenTarget::Scale { factor: 1.0 }, 1000),
            )
            .unwrap();
        let tween = registry
            .get(SpriteCategory::Character, "hero")
            .unwrap()
            .tween(SpriteProperty::Scale)
            .unwrap()
            .clone();
        assert_eq!(tween.from, 2.0);
        assert_eq!(tween.to, 1.0);
    }

    #[test]
    fn test_stop_emits_stopped_event() {
        let (mut scheduler, mut registry) = setup();
        scheduler
            .start(
                &mut registry,
                SpriteCategory::Character,
                "hero",
                &spec(TweenTarget::Rotate { degrees: 90.0 }, 1000),
            )
            .unwrap();
        scheduler.tick(&mut registry, Duration::from_millis(500));
        scheduler
            .stop(&mut registry, SpriteCategory::Character, "hero", AnimationKind::Rotate)
            .unwrap();

        let events = scheduler.drain_events();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].end, AnimationEnd::Stopped);

        // 没有进行中的补间时停止不产生事件
        scheduler
            .stop(&mut registry, SpriteCategory::Character, "hero", AnimationKind::Rotate)
            .unwrap();
        assert!(scheduler.drain_events().is_empty());
    }

    #[test]
    fn test_zero_duration_applies_immediately() {
        let (mut scheduler, mut registry) = setup();
        scheduler
            .start(
                &mut registry,
                SpriteCategory::Character,
                "hero",
                &spec(TweenTarget::Fade { opacity: 0.25 }, 0),
            )
            .unwrap();
        assert_eq!(opacity(&registry), 0.25);
        assert_eq!(scheduler.drain_events().len(), 1);
    }

    #[test]
    fn test_unknown_alias() {
        let (mut scheduler, mut registry) = setup();
        let err = scheduler
            .start(
                &mut registry,
                SpriteCategory::Object,
                "hero",
                &spec(TweenTarget::Fade { opacity: 0.0 }, 100),
            )
            .unwrap_err();
        assert!(matches!(err, RuntimeError::UnknownSpriteAlias { .. }));
    }
}
