//! # Registry 模块
//!
//! 当前加载的所有精灵实例。
//!
//! 同一类别下每个别名最多一个实例。重新声明别名是一次原子替换：
//! 旧实例连同其补间一起被丢弃，调度器下一次 tick 只能看到新实例。

use std::collections::BTreeMap;

use tracing::debug;

use super::{ImageRef, SpriteInstance};
use crate::error::RuntimeError;
use crate::script::SpriteCategory;

type SpriteKey = (SpriteCategory, String);

/// 精灵注册表
#[derive(Debug, Clone, Default)]
pub struct SpriteRegistry {
    sprites: BTreeMap<SpriteKey, SpriteInstance>,
    next_z: u64,
}

impl SpriteRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// 声明精灵
    ///
    /// 别名已存在时替换旧实例：补间、钩子和变换全部重置，
    /// 但沿用旧实例的可见性和层级，避免替换瞬间出现空帧或重复。
    pub fn declare(&mut self, category: SpriteCategory, alias: &str, image: ImageRef) {
        let mut instance = SpriteInstance::new(category, alias, image);
        self.insert_replacing(&mut instance);
        self.sprites.insert((category, alias.to_string()), instance);
    }

    /// 以已加载精灵的图像创建独立副本
    pub fn load_as(
        &mut self,
        category: SpriteCategory,
        source: &str,
        alias: &str,
    ) -> Result<(), RuntimeError> {
        let mut instance = self.require(category, source)?.copy_as(alias);
        self.insert_replacing(&mut instance);
        self.sprites.insert((category, alias.to_string()), instance);
        Ok(())
    }

    fn insert_replacing(&mut self, instance: &mut SpriteInstance) {
        if let Some(previous) = self
            .sprites
            .remove(&(instance.category, instance.alias.clone()))
        {
            debug!(
                category = %instance.category,
                alias = %instance.alias,
                cancelled_tweens = previous.has_tweens(),
                "替换已存在的精灵"
            );
            instance.visible = previous.visible;
            instance.z = previous.z;
        }
    }

    pub fn get(&self, category: SpriteCategory, alias: &str) -> Option<&SpriteInstance> {
        self.sprites.get(&(category, alias.to_string()))
    }

    pub fn get_mut(&mut self, category: SpriteCategory, alias: &str) -> Option<&mut SpriteInstance> {
        self.sprites.get_mut(&(category, alias.to_string()))
    }

    /// 获取精灵，不存在时返回 `UnknownSpriteAlias`
    pub fn require(&self, category: SpriteCategory, alias: &str) -> Result<&SpriteInstance, RuntimeError> {
        self.get(category, alias)
            .ok_or_else(|| RuntimeError::UnknownSpriteAlias {
                category,
                alias: alias.to_string(),
            })
    }

    pub fn require_mut(
        &mut self,
        category: SpriteCategory,
        alias: &str,
    ) -> Result<&mut SpriteInstance, RuntimeError> {
        self.get_mut(category, alias)
            .ok_or_else(|| RuntimeError::UnknownSpriteAlias {
                category,
                alias: alias.to_string(),
            })
    }

    pub fn remove(&mut self, category: SpriteCategory, alias: &str) -> Option<SpriteInstance> {
        self.sprites.remove(&(category, alias.to_string()))
    }

    /// 显示精灵并放到本类别最上层
    ///
    /// 同一时刻只显示一个背景。
    pub fn show(&mut self, category: SpriteCategory, alias: &str) -> Result<(), RuntimeError> {
        self.require(category, alias)?;
        if category == SpriteCategory::Background {
            for ((c, a), sprite) in self.sprites.iter_mut() {
                if *c == SpriteCategory::Background && a != alias {
                    sprite.visible = false;
                }
            }
        }
        self.next_z += 1;
        let z = self.next_z;
        let sprite = self.require_mut(category, alias)?;
        sprite.visible = true;
        sprite.z = z;
        Ok(())
    }

    pub fn hide(&mut self, category: SpriteCategory, alias: &str) -> Result<(), RuntimeError> {
        self.require_mut(category, alias)?.visible = false;
        Ok(())
    }

    pub fn hide_all(&mut self, category: SpriteCategory) {
        self.sprites
            .values_mut()
            .filter(|s| s.category == category)
            .for_each(|s| s.visible = false);
    }

    /// 某类别中可渲染的精灵，按层级从下到上排列
    pub fn list_visible(&self, category: SpriteCategory) -> Vec<&SpriteInstance> {
        let mut visible: Vec<&SpriteInstance> = self
            .sprites
            .values()
            .filter(|s| s.category == category && s.is_renderable())
            .collect();
        visible.sort_by_key(|s| s.z);
        visible
    }

    /// 按 (类别, 别名) 顺序遍历
    pub fn iter(&self) -> impl Iterator<Item = &SpriteInstance> {
        self.sprites.values()
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = &mut SpriteInstance> {
        self.sprites.values_mut()
    }

    pub fn len(&self) -> usize {
        self.sprites.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sprites.is_empty()
    }

    /// 清空所有精灵（场景切换）
    pub fn clear(&mut self) {
        self.sprites.clear();
    }
}
