//! 核心编排层：错误、就绪队列、Activity 注册表、单写者调度循环、优雅关闭

pub mod error;
pub mod queue;
pub mod registry;
pub mod scheduler;
pub mod shutdown;

pub use error::{AgentError, RoutingError};
pub use queue::ReadyQueue;
pub use registry::ActivityRegistry;
pub use scheduler::{Scheduler, StepOutcome};
pub use shutdown::{ShutdownManager, ShutdownReason};
