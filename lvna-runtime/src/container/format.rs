//! # 容器格式定义
//!
//! ```text
//! +---------------------+  0
//! | magic "LVNAUTH-"    |  8 字节
//! | version   (u16 LE)  |
//! | reserved  (u16 LE)  |
//! | index_len (u32 LE)  |
//! +---------------------+  16
//! | index (JSON)        |  index_len 字节
//! +---------------------+
//! | data section        |  指令块与素材，偏移相对于此处
//! +---------------------+
//! ```

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;

use crate::state::VarValue;
use crate::story::{AssetKind, ScenePath};

/// 文件签名
pub const MAGIC: &[u8; 8] = b"LVNAUTH-";

/// 当前格式版本
///
/// 读取器接受 `1..=FORMAT_VERSION`。
pub const FORMAT_VERSION: u16 = 1;

/// 文件头长度
pub const HEADER_LEN: usize = 16;

/// 数据区中的一段字节
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ByteRange {
    pub offset: u64,
    pub length: u64,
}

/// 带名称的指令块位置
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlockEntry {
    pub name: String,
    #[serde(flatten)]
    pub range: ByteRange,
}

/// 章节目录
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChapterEntry {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub prelude: Option<ByteRange>,
    pub scenes: Vec<BlockEntry>,
}

/// 素材表条目
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AssetEntry {
    pub key: String,
    pub kind: AssetKind,
    #[serde(flatten)]
    pub range: ByteRange,
    /// SHA-256 小写十六进制
    pub sha256: String,
}

/// 容器索引
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoryIndex {
    pub title: String,
    pub startup: ScenePath,
    #[serde(default)]
    pub variables: BTreeMap<String, VarValue>,
    pub chapters: Vec<ChapterEntry>,
    #[serde(default)]
    pub reusables: Vec<BlockEntry>,
    #[serde(default)]
    pub assets: Vec<AssetEntry>,
}

/// 计算 SHA-256 十六进制摘要
pub fn checksum(bytes: &[u8]) -> String {
    format!("{:x}", Sha256::digest(bytes))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_checksum_of_empty_input() {
        assert_eq!(
            checksum(b""),
            "e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855"
        );
    }

    #[test]
    fn test_index_entry_layout() {
        let entry = BlockEntry {
            name: "intro".to_string(),
            range: ByteRange {
                offset: 4,
                length: 10,
            },
        };
        let json = serde_json::to_string(&entry).unwrap();
        assert_eq!(json, r#"{"name":"intro","offset":4,"length":10}"#);
    }
}
