//! # Story 模块
//!
//! 编译后的故事模型：章节 → 场景 → 指令块，外加可复用脚本、
//! 初始变量表和素材表。
//!
//! 加载完成后整个 Story 只读；解释器只维护自己的游标和运行时状态。

use image::ImageFormat;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::io::Cursor;
use std::sync::Arc;

use crate::diagnostic::{DiagnosticResult, validate_story};
use crate::error::AssetError;
use crate::script::{ScriptBlock, SpriteCategory};
use crate::state::VarValue;

/// 素材 ID（素材表中的下标）
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct AssetId(pub u32);

/// 素材类型
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AssetKind {
    Image,
    Font,
    Audio,
}

impl AssetKind {
    /// 用于提示信息的名称
    pub fn describe(&self) -> &'static str {
        match self {
            Self::Image => "图像",
            Self::Font => "字体",
            Self::Audio => "音频",
        }
    }
}

/// 素材
///
/// 字节数据解码后不可变，可被多个精灵实例共享。
#[derive(Debug, Clone, PartialEq)]
pub struct Asset {
    pub key: String,
    pub kind: AssetKind,
    pub bytes: Arc<[u8]>,
}

/// 素材表
///
/// 按插入顺序存储素材，[`AssetId`] 即其下标。
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AssetTable {
    assets: Vec<Asset>,
    index: BTreeMap<String, AssetId>,
}

impl AssetTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// 插入素材
    ///
    /// 键已存在时原位替换，ID 不变。
    pub fn insert(&mut self, key: impl Into<String>, kind: AssetKind, bytes: impl Into<Arc<[u8]>>) -> AssetId {
        let key = key.into();
        let asset = Asset {
            key: key.clone(),
            kind,
            bytes: bytes.into(),
        };
        if let Some(&id) = self.index.get(&key) {
            self.assets[id.0 as usize] = asset;
            return id;
        }
        let id = AssetId(self.assets.len() as u32);
        self.assets.push(asset);
        self.index.insert(key, id);
        id
    }

    pub fn get(&self, id: AssetId) -> Option<&Asset> {
        self.assets.get(id.0 as usize)
    }

    pub fn lookup(&self, key: &str) -> Option<AssetId> {
        self.index.get(key).copied()
    }

    pub fn get_by_key(&self, key: &str) -> Option<&Asset> {
        self.lookup(key).and_then(|id| self.get(id))
    }

    pub fn iter(&self) -> impl Iterator<Item = &Asset> {
        self.assets.iter()
    }

    pub fn len(&self) -> usize {
        self.assets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.assets.is_empty()
    }

    /// 检查素材存在且为指定类型
    pub fn require(&self, key: &str, kind: AssetKind) -> Result<AssetId, AssetError> {
        let id = self.lookup(key).ok_or_else(|| AssetError::Missing {
            key: key.to_string(),
        })?;
        match self.get(id) {
            Some(asset) if asset.kind == kind => Ok(id),
            _ => Err(AssetError::WrongKind {
                key: key.to_string(),
                expected: kind.describe().to_string(),
            }),
        }
    }

    /// 图像素材的像素尺寸，文件头无法读取时返回 `None`
    pub fn image_size(&self, id: AssetId) -> Option<(u32, u32)> {
        let asset = self.get(id)?;
        if asset.kind != AssetKind::Image {
            return None;
        }
        image_dimensions(&asset.bytes)
    }

    /// 解析图像素材
    ///
    /// 除存在性和类型外，还检查数据是否带有可识别的栅格图像签名。
    pub fn resolve_image(&self, key: &str) -> Result<AssetId, AssetError> {
        let id = self.require(key, AssetKind::Image)?;
        match self.get(id) {
            Some(asset) if is_raster_image(&asset.bytes) => Ok(id),
            _ => Err(AssetError::Undecodable {
                key: key.to_string(),
            }),
        }
    }
}

/// 可作为精灵图像的格式
const RASTER_FORMATS: [ImageFormat; 5] = [
    ImageFormat::Png,
    ImageFormat::Jpeg,
    ImageFormat::Gif,
    ImageFormat::Bmp,
    ImageFormat::WebP,
];

/// 识别 PNG / JPEG / GIF / BMP / WebP 文件头
pub fn is_raster_image(bytes: &[u8]) -> bool {
    image::guess_format(bytes).is_ok_and(|format| RASTER_FORMATS.contains(&format))
}

/// 只读取文件头得到像素尺寸，不解码像素
pub fn image_dimensions(bytes: &[u8]) -> Option<(u32, u32)> {
    image::io::Reader::new(Cursor::new(bytes))
        .with_guessed_format()
        .ok()?
        .into_dimensions()
        .ok()
}

/// 场景路径 `chapter/scene`
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ScenePath {
    pub chapter: String,
    pub scene: String,
}

impl ScenePath {
    pub fn new(chapter: impl Into<String>, scene: impl Into<String>) -> Self {
        Self {
            chapter: chapter.into(),
            scene: scene.into(),
        }
    }
}

impl std::fmt::Display for ScenePath {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}", self.chapter, self.scene)
    }
}

/// 场景内的精灵声明
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub struct SpriteDeclaration {
    pub category: SpriteCategory,
    pub alias: String,
}

/// 场景
#[derive(Debug, Clone, PartialEq)]
pub struct Scene {
    pub name: String,
    pub script: ScriptBlock,
}

impl Scene {
    pub fn new(name: impl Into<String>, script: ScriptBlock) -> Self {
        Self {
            name: name.into(),
            script,
        }
    }

    /// 场景中 load / load_as 声明的精灵集合
    pub fn sprite_declarations(&self) -> Vec<SpriteDeclaration> {
        let mut declarations: Vec<SpriteDeclaration> = self
            .script
            .instructions
            .iter()
            .filter_map(|i| i.sprite_declaration())
            .map(|(category, alias)| SpriteDeclaration {
                category,
                alias: alias.to_string(),
            })
            .collect();
        declarations.sort();
        declarations.dedup();
        declarations
    }
}

/// 章节
///
/// `prelude` 在本章每个场景开始前执行。
#[derive(Debug, Clone, PartialEq)]
pub struct Chapter {
    pub name: String,
    pub prelude: Option<ScriptBlock>,
    pub scenes: Vec<Scene>,
}

impl Chapter {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            prelude: None,
            scenes: Vec::new(),
        }
    }

    pub fn with_prelude(mut self, prelude: ScriptBlock) -> Self {
        self.prelude = Some(prelude);
        self
    }

    pub fn with_scene(mut self, scene: Scene) -> Self {
        self.scenes.push(scene);
        self
    }

    pub fn scene(&self, name: &str) -> Option<&Scene> {
        self.scenes.iter().find(|s| s.name == name)
    }
}

/// 故事
#[derive(Debug, Clone, PartialEq)]
pub struct Story {
    pub title: String,
    /// 启动场景
    pub startup: ScenePath,
    /// 初始变量表
    pub variables: BTreeMap<String, VarValue>,
    pub chapters: Vec<Chapter>,
    /// 可复用脚本（call / after / 动画结束钩子的目标）
    pub reusables: BTreeMap<String, ScriptBlock>,
    pub assets: AssetTable,
}

impl Story {
    pub fn new(title: impl Into<String>, startup: ScenePath) -> Self {
        Self {
            title: title.into(),
            startup,
            variables: BTreeMap::new(),
            chapters: Vec::new(),
            reusables: BTreeMap::new(),
            assets: AssetTable::new(),
        }
    }

    pub fn chapter(&self, name: &str) -> Option<&Chapter> {
        self.chapters.iter().find(|c| c.name == name)
    }

    /// 查找场景，返回章节与场景的下标
    pub fn locate(&self, path: &ScenePath) -> Option<(usize, usize)> {
        let chapter_index = self.chapters.iter().position(|c| c.name == path.chapter)?;
        let scene_index = self.chapters[chapter_index]
            .scenes
            .iter()
            .position(|s| s.name == path.scene)?;
        Some((chapter_index, scene_index))
    }

    pub fn scene(&self, path: &ScenePath) -> Option<&Scene> {
        self.chapter(&path.chapter)?.scene(&path.scene)
    }

    pub fn reusable(&self, name: &str) -> Option<&ScriptBlock> {
        self.reusables.get(name)
    }

    /// 链接期检查，见 [`validate_story`]
    pub fn validate(&self) -> DiagnosticResult {
        validate_story(self)
    }

    /// 遍历所有指令块（前导脚本、场景、可复用脚本），附带用于报告的名称
    pub fn blocks(&self) -> impl Iterator<Item = (String, &ScriptBlock)> {
        let chapter_blocks = self.chapters.iter().flat_map(|chapter| {
            let prelude = chapter
                .prelude
                .iter()
                .map(move |block| (format!("{}/<prelude>", chapter.name), block));
            let scenes = chapter
                .scenes
                .iter()
                .map(move |scene| (format!("{}/{}", chapter.name, scene.name), &scene.script));
            prelude.chain(scenes)
        });
        let reusables = self
            .reusables
            .iter()
            .map(|(name, block)| (format!("reusable:{name}"), block));
        chapter_blocks.chain(reusables)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::script::Instruction;

    const PNG_BYTES: &[u8] = b"\x89PNG\r\n\x1a\nrest";
    /// 40×20 灰度 PNG
    const PNG_40X20: &[u8] = b"\x89\x50\x4e\x47\x0d\x0a\x1a\x0a\x00\x00\x00\x0d\x49\x48\x44\x52\x00\x00\x00\x28\x00\x00\x00\x14\x08\x00\x00\x00\x00\xda\x2d\x20\x67\x00\x00\x00\x10\x49\x44\x41\x54\x78\xda\x63\x60\x18\x05\xa3\x60\x14\x90\x02\x00\x03\x34\x00\x01\x86\x74\x22\xe3\x00\x00\x00\x00\x49\x45\x4e\x44\xae\x42\x60\x82";

    #[test]
    fn test_asset_table_insert_and_replace() {
        let mut table = AssetTable::new();
        let a = table.insert("bg", AssetKind::Image, PNG_BYTES.to_vec());
        let b = table.insert("theme", AssetKind::Audio, vec![1, 2, 3]);
        assert_eq!(a, AssetId(0));
        assert_eq!(b, AssetId(1));

        // 同名替换保持 ID
        let again = table.insert("bg", AssetKind::Image, b"GIF89a".to_vec());
        assert_eq!(again, a);
        assert_eq!(table.len(), 2);
        assert_eq!(&*table.get(a).unwrap().bytes, b"GIF89a");
    }

    #[test]
    fn test_resolve_image_errors() {
        let mut table = AssetTable::new();
        table.insert("ok", AssetKind::Image, PNG_BYTES.to_vec());
        table.insert("song", AssetKind::Audio, vec![0u8; 4]);
        table.insert("junk", AssetKind::Image, b"not an image".to_vec());

        assert!(table.resolve_image("ok").is_ok());
        assert!(matches!(
            table.resolve_image("missing"),
            Err(AssetError::Missing { .. })
        ));
        assert!(matches!(
            table.resolve_image("song"),
            Err(AssetError::WrongKind { .. })
        ));
        assert!(matches!(
            table.resolve_image("junk"),
            Err(AssetError::Undecodable { .. })
        ));
    }

    #[test]
    fn test_raster_signatures() {
        assert!(is_raster_image(&[0xFF, 0xD8, 0xFF, 0xE0]));
        assert!(is_raster_image(b"RIFF\0\0\0\0WEBPVP8 "));
        assert!(!is_raster_image(b"RIFF\0\0\0\0WAVEfmt "));
        assert!(!is_raster_image(&[]));
    }

    #[test]
    fn test_image_size_from_header() {
        let mut table = AssetTable::new();
        let real = table.insert("real", AssetKind::Image, PNG_40X20);
        let fake = table.insert("fake", AssetKind::Image, PNG_BYTES);
        let song = table.insert("song", AssetKind::Audio, PNG_40X20);

        assert_eq!(table.image_size(real), Some((40, 20)));
        // 签名可识别但文件头不完整
        assert_eq!(table.image_size(fake), None);
        assert_eq!(table.image_size(song), None);
    }

    #[test]
    fn test_story_locate_and_declarations() {
        let scene = Scene::new(
            "opening",
            ScriptBlock::new(
                vec![
                    Instruction::Load {
                        category: SpriteCategory::Character,
                        image: "hero_img".to_string(),
                        alias: "hero".to_string(),
                    },
                    Instruction::Load {
                        category: SpriteCategory::Character,
                        image: "hero_img".to_string(),
                        alias: "hero".to_string(),
                    },
                ],
                vec![1, 2],
            ),
        );
        let mut story = Story::new("demo", ScenePath::new("ch1", "opening"));
        story.chapters.push(Chapter::new("ch1").with_scene(scene));

        assert_eq!(story.locate(&ScenePath::new("ch1", "opening")), Some((0, 0)));
        assert_eq!(story.locate(&ScenePath::new("ch1", "ending")), None);

        let declarations = story
            .scene(&ScenePath::new("ch1", "opening"))
            .unwrap()
            .sprite_declarations();
        assert_eq!(declarations.len(), 1);
        assert_eq!(declarations[0].alias, "hero");
        assert_eq!(story.blocks().count(), 1);
    }
}
