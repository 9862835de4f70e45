//! comms-bridge - chat-command bridge between a COMMS console and local
//! chat-session transcripts

pub mod bridge;
pub mod channel;
pub mod commands;
pub mod config;
pub mod context_doc;
pub mod error;
pub mod store;
pub mod telemetry;
pub mod template;
