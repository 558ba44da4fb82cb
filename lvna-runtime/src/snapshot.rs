//! # Snapshot 模块
//!
//! 每帧交给渲染适配器的只读视图。
//!
//! 快照是值类型，不借用会话内部状态；两次运行在相同输入下应产生相等的快照序列。

use serde::Serialize;

use crate::script::SpriteCategory;
use crate::sprite::{SpriteInstance, SpriteRegistry};
use crate::story::AssetId;

/// 单个可见精灵
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SpriteView {
    pub alias: String,
    pub image_key: String,
    pub asset: AssetId,
    pub x: f32,
    pub y: f32,
    pub opacity: f32,
    pub scale: f32,
    pub rotation: f32,
    pub flip_horizontal: bool,
    pub flip_vertical: bool,
}

impl SpriteView {
    fn from_instance(sprite: &SpriteInstance, asset: AssetId) -> Self {
        let t = &sprite.transform;
        Self {
            alias: sprite.alias.clone(),
            image_key: sprite.image.key.clone(),
            asset,
            x: t.x,
            y: t.y,
            opacity: t.opacity,
            scale: t.scale,
            rotation: t.rotation,
            flip_horizontal: t.flip_horizontal,
            flip_vertical: t.flip_vertical,
        }
    }
}

/// 一个类别的可见精灵，按层级从下到上
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Layer {
    pub category: SpriteCategory,
    pub sprites: Vec<SpriteView>,
}

/// 对话框状态
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct DialogView {
    pub visible: bool,
    /// 当前累积的文本行
    pub lines: Vec<String>,
    pub font: Option<String>,
}

/// 一帧的完整快照
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Snapshot {
    /// 按绘制顺序排列：背景、物件、角色、对话框精灵
    pub layers: Vec<Layer>,
    pub dialog: DialogView,
}

impl Snapshot {
    /// 从注册表和对话框状态生成快照
    pub fn capture(registry: &SpriteRegistry, dialog: &DialogView) -> Self {
        let mut categories = SpriteCategory::ALL.to_vec();
        categories.sort();
        let layers = categories
            .into_iter()
            .map(|category| Layer {
                category,
                sprites: registry
                    .list_visible(category)
                    .into_iter()
                    .filter_map(|s| s.image.asset.map(|asset| SpriteView::from_instance(s, asset)))
                    .collect(),
            })
            .collect();
        Self {
            layers,
            dialog: dialog.clone(),
        }
    }

    /// 某类别的可见精灵
    pub fn layer(&self, category: SpriteCategory) -> &[SpriteView] {
        self.layers
            .iter()
            .find(|l| l.category == category)
            .map(|l| l.sprites.as_slice())
            .unwrap_or(&[])
    }

    /// 查找可见精灵
    pub fn find(&self, category: SpriteCategory, alias: &str) -> Option<&SpriteView> {
        self.layer(category).iter().find(|s| s.alias == alias)
    }

    /// 可见精灵总数
    pub fn visible_count(&self) -> usize {
        self.layers.iter().map(|l| l.sprites.len()).sum()
    }
}
