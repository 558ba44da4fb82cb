//! # 容器读取
//!
//! 所有检查（签名、版本、边界、指令块解码、素材校验和、重名）
//! 都在构造 [`Story`] 之前完成，失败时不返回任何部分结果。

use std::collections::{BTreeMap, HashSet};

use tracing::debug;

use super::format::{ByteRange, FORMAT_VERSION, HEADER_LEN, MAGIC, StoryIndex, checksum};
use crate::error::ContainerError;
use crate::script::{ScriptBlock, verify_branches};
use crate::story::{AssetTable, Chapter, Scene, Story};

/// 从 `.lvna` 字节读取故事
pub fn read_story(bytes: &[u8]) -> Result<Story, ContainerError> {
    let header = bytes.get(..HEADER_LEN).ok_or(ContainerError::Truncated {
        what: "文件头".to_string(),
        needed: HEADER_LEN as u64,
        available: bytes.len() as u64,
    })?;

    if &header[0..8] != MAGIC {
        return Err(ContainerError::BadMagic);
    }

    let version = u16::from_le_bytes([header[8], header[9]]);
    if version == 0 || version > FORMAT_VERSION {
        return Err(ContainerError::UnsupportedVersion {
            found: version,
            supported: FORMAT_VERSION,
        });
    }

    let index_len = u32::from_le_bytes([header[12], header[13], header[14], header[15]]) as u64;
    let body = &bytes[HEADER_LEN..];
    if index_len > body.len() as u64 {
        return Err(ContainerError::Truncated {
            what: "索引".to_string(),
            needed: index_len,
            available: body.len() as u64,
        });
    }
    let (index_bytes, data) = body.split_at(index_len as usize);

    let index: StoryIndex =
        serde_json::from_slice(index_bytes).map_err(|e| ContainerError::MalformedIndex {
            message: e.to_string(),
        })?;

    let mut problems = Vec::new();

    let mut chapter_names = HashSet::new();
    let mut chapters = Vec::with_capacity(index.chapters.len());
    for entry in &index.chapters {
        if !chapter_names.insert(entry.name.as_str()) {
            problems.push(format!("重复的章节名: '{}'", entry.name));
        }
        let mut chapter = Chapter::new(&entry.name);
        if let Some(range) = entry.prelude {
            chapter.prelude = Some(decode_block(data, range, &format!("{}/<prelude>", entry.name))?);
        }
        let mut scene_names = HashSet::new();
        for scene in &entry.scenes {
            if !scene_names.insert(scene.name.as_str()) {
                problems.push(format!("章节 '{}' 中场景名重复: '{}'", entry.name, scene.name));
            }
            let block = decode_block(data, scene.range, &format!("{}/{}", entry.name, scene.name))?;
            chapter.scenes.push(Scene::new(&scene.name, block));
        }
        chapters.push(chapter);
    }

    let mut reusables = BTreeMap::new();
    for entry in &index.reusables {
        let block = decode_block(data, entry.range, &format!("reusable:{}", entry.name))?;
        if reusables.insert(entry.name.clone(), block).is_some() {
            problems.push(format!("重复的可复用脚本名: '{}'", entry.name));
        }
    }

    let mut assets = AssetTable::new();
    for entry in &index.assets {
        let bytes = slice(data, entry.range, &format!("素材 '{}'", entry.key))?;
        let actual = checksum(bytes);
        if !actual.eq_ignore_ascii_case(&entry.sha256) {
            return Err(ContainerError::CorruptAsset {
                key: entry.key.clone(),
                expected: entry.sha256.clone(),
                actual,
            });
        }
        if assets.lookup(&entry.key).is_some() {
            problems.push(format!("重复的素材键: '{}'", entry.key));
            continue;
        }
        assets.insert(entry.key.clone(), entry.kind, bytes);
    }

    if !problems.is_empty() {
        return Err(ContainerError::IntegrityError { problems });
    }

    debug!(
        title = %index.title,
        version,
        chapters = chapters.len(),
        assets = assets.len(),
        "容器读取完成"
    );

    Ok(Story {
        title: index.title,
        startup: index.startup,
        variables: index.variables,
        chapters,
        reusables,
        assets,
    })
}

fn slice<'a>(data: &'a [u8], range: ByteRange, what: &str) -> Result<&'a [u8], ContainerError> {
    let available = data.len() as u64;
    let end = range.offset.checked_add(range.length);
    match end {
        Some(end) if end <= available => Ok(&data[range.offset as usize..end as usize]),
        _ => Err(ContainerError::Truncated {
            what: what.to_string(),
            needed: range.offset.saturating_add(range.length),
            available,
        }),
    }
}

fn decode_block(data: &[u8], range: ByteRange, name: &str) -> Result<ScriptBlock, ContainerError> {
    let bytes = slice(data, range, &format!("指令块 '{name}'"))?;
    let block: ScriptBlock =
        serde_json::from_slice(bytes).map_err(|e| ContainerError::MalformedBlock {
            block: name.to_string(),
            message: e.to_string(),
        })?;
    if block.source_lines.len() != block.instructions.len() {
        return Err(ContainerError::MalformedBlock {
            block: name.to_string(),
            message: format!(
                "行号表长度 {} 与指令数 {} 不一致",
                block.source_lines.len(),
                block.instructions.len()
            ),
        });
    }
    verify_branches(&block).map_err(|e| ContainerError::MalformedBlock {
        block: name.to_string(),
        message: e.to_string(),
    })?;
    Ok(block)
}
