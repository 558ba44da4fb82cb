//! # Sprite 模块
//!
//! 精灵注册表：持有当前场景中所有精灵实例及其视觉状态。
//!
//! - [`instance`]：单个精灵实例
//! - [`registry`]：按类别和别名索引的实例集合

pub mod instance;
pub mod registry;

pub use instance::{ImageRef, SpriteInstance, StopHook, Transform};
pub use registry::SpriteRegistry;
