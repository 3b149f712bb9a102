pub mod chat;
pub mod executor;
pub mod orchestrator;
pub mod planner;
pub mod progress;
pub mod types;
pub mod workflow;
pub mod writer;

#[cfg(test)]
pub mod testutil;

pub use orchestrator::Runtime;
pub use progress::{ChannelSink, Frame, NullSink, ProgressSink};
pub use types::{AgentResponse, ConversationTurn, MissingInput, RouteKind};
