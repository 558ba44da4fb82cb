//! # Runtime 模块
//!
//! 会话执行引擎，负责读取器调度、指令执行和等待管理。
//!
//! ## 模块结构
//!
//! - [`engine`]：会话与读取器调度
//! - [`executor`]：单条指令的执行
//! - [`call_stack`]：调用栈与深度上限
//! - [`timer`]：after 延时队列

pub mod call_stack;
pub mod engine;
pub mod executor;
pub mod timer;

pub use call_stack::MAX_CALL_DEPTH;
pub use engine::{Session, SessionOptions};
