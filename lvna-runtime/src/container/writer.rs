//! # 容器写入

use tracing::debug;

use super::format::{
    AssetEntry, BlockEntry, ByteRange, ChapterEntry, FORMAT_VERSION, HEADER_LEN, MAGIC, StoryIndex,
    checksum,
};
use crate::error::ContainerError;
use crate::script::ScriptBlock;
use crate::story::Story;

/// 将故事写成 `.lvna` 字节
///
/// 写入前执行链接期检查，有任何 Error 级诊断时返回 `IntegrityError`。
pub fn write_story(story: &Story) -> Result<Vec<u8>, ContainerError> {
    let diagnostics = story.validate();
    if diagnostics.has_errors() {
        return Err(ContainerError::IntegrityError {
            problems: diagnostics.error_messages(),
        });
    }

    let mut data = Vec::new();

    let mut chapters = Vec::with_capacity(story.chapters.len());
    for chapter in &story.chapters {
        let prelude = match &chapter.prelude {
            Some(block) => Some(append_block(
                &mut data,
                &format!("{}/<prelude>", chapter.name),
                block,
            )?),
            None => None,
        };
        let mut scenes = Vec::with_capacity(chapter.scenes.len());
        for scene in &chapter.scenes {
            let name = format!("{}/{}", chapter.name, scene.name);
            scenes.push(BlockEntry {
                name: scene.name.clone(),
                range: append_block(&mut data, &name, &scene.script)?,
            });
        }
        chapters.push(ChapterEntry {
            name: chapter.name.clone(),
            prelude,
            scenes,
        });
    }

    let mut reusables = Vec::with_capacity(story.reusables.len());
    for (name, block) in &story.reusables {
        reusables.push(BlockEntry {
            name: name.clone(),
            range: append_block(&mut data, &format!("reusable:{name}"), block)?,
        });
    }

    let assets = story
        .assets
        .iter()
        .map(|asset| AssetEntry {
            key: asset.key.clone(),
            kind: asset.kind,
            range: append_bytes(&mut data, &asset.bytes),
            sha256: checksum(&asset.bytes),
        })
        .collect();

    let index = StoryIndex {
        title: story.title.clone(),
        startup: story.startup.clone(),
        variables: story.variables.clone(),
        chapters,
        reusables,
        assets,
    };
    let index_bytes = serde_json::to_vec(&index).map_err(|e| ContainerError::MalformedIndex {
        message: e.to_string(),
    })?;
    let index_len = u32::try_from(index_bytes.len()).map_err(|_| ContainerError::MalformedIndex {
        message: format!("索引过大（{} 字节）", index_bytes.len()),
    })?;

    let mut out = Vec::with_capacity(HEADER_LEN + index_bytes.len() + data.len());
    out.extend_from_slice(MAGIC);
    out.extend_from_slice(&FORMAT_VERSION.to_le_bytes());
    out.extend_from_slice(&0u16.to_le_bytes());
    out.extend_from_slice(&index_len.to_le_bytes());
    out.extend_from_slice(&index_bytes);
    out.extend_from_slice(&data);

    debug!(
        title = %story.title,
        chapters = story.chapters.len(),
        assets = story.assets.len(),
        bytes = out.len(),
        "故事已写入容器"
    );
    Ok(out)
}

fn append_block(data: &mut Vec<u8>, name: &str, block: &ScriptBlock) -> Result<ByteRange, ContainerError> {
    let bytes = serde_json::to_vec(block).map_err(|e| ContainerError::MalformedBlock {
        block: name.to_string(),
        message: e.to_string(),
    })?;
    Ok(append_bytes(data, &bytes))
}

fn append_bytes(data: &mut Vec<u8>, bytes: &[u8]) -> ByteRange {
    let range = ByteRange {
        offset: data.len() as u64,
        length: bytes.len() as u64,
    };
    data.extend_from_slice(bytes);
    range
}
