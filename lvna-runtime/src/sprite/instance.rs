//! # Instance 模块
//!
//! 精灵实例：别名、图像引用、变换状态和独占的补间集合。

use std::collections::BTreeMap;

use crate::animation::{SpriteProperty, Tween};
use crate::script::{AnimationKind, SpriteCategory};
use crate::story::AssetId;

/// 图像引用
///
/// `asset` 为 `None` 表示素材不可用，精灵按"不存在"渲染。
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageRef {
    pub key: String,
    pub asset: Option<AssetId>,
}

impl ImageRef {
    pub fn new(key: impl Into<String>, asset: Option<AssetId>) -> Self {
        Self {
            key: key.into(),
            asset,
        }
    }
}

/// 变换状态
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Transform {
    pub x: f32,
    pub y: f32,
    /// 透明度 [0, 1]
    pub opacity: f32,
    pub scale: f32,
    /// 旋转角度（度）
    pub rotation: f32,
    pub flip_horizontal: bool,
    pub flip_vertical: bool,
}

impl Default for Transform {
    fn default() -> Self {
        Self {
            x: 0.0,
            y: 0.0,
            opacity: 1.0,
            scale: 1.0,
            rotation: 0.0,
            flip_horizontal: false,
            flip_vertical: false,
        }
    }
}

/// 精灵实例
#[derive(Debug, Clone, PartialEq)]
pub struct SpriteInstance {
    pub alias: String,
    pub category: SpriteCategory,
    pub image: ImageRef,
    pub transform: Transform,
    pub visible: bool,
    /// 绘制层级，每次 show 时重新分配
    pub z: u64,
    tweens: BTreeMap<SpriteProperty, Tween>,
    /// 动画完成时运行的可复用脚本
    hooks: BTreeMap<AnimationKind, StopHook>,
}

/// 动画完成钩子
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StopHook {
    pub script: String,
    /// 设置钩子的读取器当时的调用深度，钩子脚本从这里继续计数
    pub depth: usize,
}

impl SpriteInstance {
    pub fn new(category: SpriteCategory, alias: impl Into<String>, image: ImageRef) -> Self {
        Self {
            alias: alias.into(),
            category,
            image,
            transform: Transform::default(),
            visible: false,
            z: 0,
            tweens: BTreeMap::new(),
            hooks: BTreeMap::new(),
        }
    }

    /// 以同一图像创建独立副本（load_as）
    ///
    /// 副本只共享图像引用，变换、补间和钩子都是全新的。
    pub fn copy_as(&self, alias: impl Into<String>) -> Self {
        Self::new(self.category, alias, self.image.clone())
    }

    /// 是否能被渲染
    pub fn is_renderable(&self) -> bool {
        self.visible && self.image.asset.is_some()
    }

    pub fn property(&self, property: SpriteProperty) -> f32 {
        match property {
            SpriteProperty::Opacity => self.transform.opacity,
            SpriteProperty::X => self.transform.x,
            SpriteProperty::Y => self.transform.y,
            SpriteProperty::Rotation => self.transform.rotation,
            SpriteProperty::Scale => self.transform.scale,
        }
    }

    pub fn set_property(&mut self, property: SpriteProperty, value: f32) {
        match property {
            SpriteProperty::Opacity => self.transform.opacity = value.clamp(0.0, 1.0),
            SpriteProperty::X => self.transform.x = value,
            SpriteProperty::Y => self.transform.y = value,
            SpriteProperty::Rotation => self.transform.rotation = value,
            SpriteProperty::Scale => self.transform.scale = value,
        }
    }

    /// 启动补间，替换同一属性上已有的补间
    pub fn start_tween(&mut self, tween: Tween) {
        self.tweens.insert(tween.property, tween);
    }

    /// 取消某种动画，属性停在当前值
    ///
    /// 返回是否确实有补间被取消。
    pub fn cancel_kind(&mut self, kind: AnimationKind) -> bool {
        let before = self.tweens.len();
        self.tweens.retain(|property, _| property.kind() != kind);
        before != self.tweens.len()
    }

    pub fn cancel_all(&mut self) {
        self.tweens.clear();
    }

    pub fn is_animating(&self, kind: AnimationKind) -> bool {
        self.tweens.keys().any(|p| p.kind() == kind)
    }

    pub fn has_tweens(&self) -> bool {
        !self.tweens.is_empty()
    }

    pub fn tween(&self, property: SpriteProperty) -> Option<&Tween> {
        self.tweens.get(&property)
    }

    /// 推进所有补间，返回本次完成的动画种类
    pub fn advance_tweens(&mut self, dt: std::time::Duration) -> Vec<AnimationKind> {
        let mut finished = Vec::new();
        let mut updates = Vec::with_capacity(self.tweens.len());
        for (property, tween) in self.tweens.iter_mut() {
            let running = tween.advance(dt);
            updates.push((*property, tween.current_value(), running));
        }
        for (property, value, running) in updates {
            self.set_property(property, value);
            if !running {
                self.tweens.remove(&property);
                let kind = property.kind();
                if !self.is_animating(kind) && !finished.contains(&kind) {
                    finished.push(kind);
                }
            }
        }
        finished
    }

    pub fn set_hook(&mut self, kind: AnimationKind, script: impl Into<String>, depth: usize) {
        self.hooks.insert(
            kind,
            StopHook {
                script: script.into(),
                depth,
            },
        );
    }

    pub fn hook(&self, kind: AnimationKind) -> Option<&str> {
        self.hooks.get(&kind).map(|hook| hook.script.as_str())
    }

    /// 取出钩子（钩子只触发一次）
    pub fn take_hook(&mut self, kind: AnimationKind) -> Option<StopHook> {
        self.hooks.remove(&kind)
    }
}
