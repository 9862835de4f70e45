//! Command side of the bridge: parsing mentions, running handlers,
//! formatting replies, and the loop that ties them to the channel.

mod dispatch;
mod format;
mod orchestrator;
mod parser;
mod status;

pub use dispatch::Dispatcher;
pub use format::{Marker, Outcome, Reply, ReplyFormatter};
pub use orchestrator::{Bridge, CommandPipeline};
pub use parser::{Command, CommandKind, CommandParser, VERBS, VerbSpec};
pub use status::{BridgeStatus, ConnectionState, StatusSnapshot, format_uptime};
