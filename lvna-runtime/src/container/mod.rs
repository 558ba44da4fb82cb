//! # Container 模块
//!
//! `.lvna` 单文件容器的读写：文件头、JSON 索引、指令块和带校验和的素材表。
//!
//! - [`write_story`]：链接期检查通过后序列化故事
//! - [`read_story`]：完整校验后反序列化，失败时不返回部分结果
//!
//! 不变量：对任意通过检查的故事 `s`，`read_story(&write_story(&s)?)? == s`。

mod format;
mod reader;
mod writer;

pub use format::{
    AssetEntry, BlockEntry, ByteRange, ChapterEntry, FORMAT_VERSION, HEADER_LEN, MAGIC, StoryIndex,
    checksum,
};
pub use reader::read_story;
pub use writer::write_story;
