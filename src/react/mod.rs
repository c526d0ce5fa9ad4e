//! 认知层接口：Brain 协作者契约、调用上下文窗口、Brain 输出的宽容解析

pub mod brain;
pub mod context;
pub mod mock;
pub mod parse;

pub use brain::{Brain, BrainError};
pub use context::{CallContext, DEFAULT_HISTORY_WINDOW, NO_PLAN_YET};
pub use mock::{BrainOp, DemoBrain, MockBrain, RecordedCall, DEMO_TOOL};
pub use parse::{
    extract_json_span, parse_act, parse_completed, parse_observation, parse_structured,
    ActDecision, MalformedResponse, ObservationOutcome,
};
