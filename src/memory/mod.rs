//! 记忆层：长期情景记忆（跨 Activity 检索）
//!
//! 每个 Activity 的信念与事件属于 Activity 自身（见 activity 模块），不存放在全局共享结构里。

pub mod episodic;
pub mod long_term;

pub use episodic::EpisodicRecord;
pub use long_term::{EpisodicStore, InMemoryEpisodicStore, NoopEpisodicStore};
