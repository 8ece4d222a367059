pub mod ack_tracker;
pub mod processor;
pub mod schema;

pub use ack_tracker::AckTracker;
pub use processor::CommandProcessor;
pub use schema::{CommandSchema, CommandSchemaRegistry, ParamSpec};
