//! # LVNA Runtime
//!
//! LVNAuth 视觉小说的核心运行时库。
//!
//! ## 架构概述
//!
//! `lvna-runtime` 是纯逻辑核心，不做任何 IO，也不依赖渲染引擎。
//! 它通过 **命令驱动模式** 与驱动方（播放器、测试）通信：
//!
//! ```text
//! Driver                          Session
//!   │                                │
//!   │──── tick(dt) ────────────────►│  推进时钟、动画、读取器
//!   │◄─── Vec<Command> ─────────────│
//!   │──── advance(PlayerEvent) ────►│  解除 halt / choice
//!   │◄─── Vec<Command> ─────────────│
//!   │──── snapshot() ──────────────►│
//!   │◄─── Snapshot ─────────────────│  交给渲染适配器
//! ```
//!
//! ## 使用示例
//!
//! ```ignore
//! use lvna_runtime::{PlayerEvent, Session, SessionOptions, read_story};
//!
//! let story = read_story(&std::fs::read("tea.lvna")?)?;
//! let mut session = Session::new(story, SessionOptions::default())?;
//!
//! loop {
//!     for command in session.tick(frame_time) {
//!         driver.execute(command);
//!     }
//!     renderer.draw(&session.snapshot());
//! }
//! ```
//!
//! ## 模块结构
//!
//! - [`script`]：脚本解析（AST 和 Parser）
//! - [`story`]：章节、场景、可复用脚本和素材表
//! - [`diagnostic`]：链接期检查
//! - [`container`]：`.lvna` 容器读写
//! - [`sprite`]：精灵实例与注册表
//! - [`animation`]：缓动、补间和动画调度
//! - [`runtime`]：会话、读取器和指令执行
//! - [`snapshot`]：渲染快照
//! - [`command`] / [`input`] / [`state`] / [`condition`]：会话边界上的值类型
//! - [`error`]：错误类型定义

pub mod animation;
pub mod command;
pub mod condition;
pub mod container;
pub mod diagnostic;
pub mod error;
pub mod input;
pub mod runtime;
pub mod script;
pub mod snapshot;
pub mod sprite;
pub mod state;
pub mod story;

// 重导出核心类型
pub use animation::{AnimationEnd, AnimationEvent, AnimationScheduler, EasingFunction};
pub use command::{AudioChannel, Command, VolumeChannel};
pub use condition::CompareOp;
pub use container::{read_story, write_story};
pub use diagnostic::{Diagnostic, DiagnosticLevel, DiagnosticResult, validate_story};
pub use error::{AssetError, ContainerError, LvnError, LvnResult, ParseError, RuntimeError};
pub use input::PlayerEvent;
pub use runtime::{MAX_CALL_DEPTH, Session, SessionOptions};
pub use script::{AnimationKind, Instruction, Parser, ScriptBlock, SpriteCategory};
pub use snapshot::{DialogView, Layer, Snapshot, SpriteView};
pub use sprite::{SpriteInstance, SpriteRegistry};
pub use state::{HaltReason, InputKind, InterpreterState, SceneError, VarValue, VariableTable};
pub use story::{AssetId, AssetKind, AssetTable, Chapter, Scene, ScenePath, Story};

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_public_api_accessible() {
        let block = Parser::new().parse("<halt>").unwrap();
        let mut story = Story::new("api", ScenePath::new("ch1", "intro"));
        story
            .chapters
            .push(Chapter::new("ch1").with_scene(Scene::new("intro", block)));

        let session = Session::new(story, SessionOptions::default()).unwrap();
        assert_eq!(session.state(), &InterpreterState::Running);
        assert_eq!(session.snapshot().visible_count(), 0);
        let _event = PlayerEvent::Advance;
    }
}
