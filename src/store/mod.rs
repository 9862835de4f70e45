//! Session transcripts on disk and the in-memory index over them.

mod index;
mod transcript;

pub use index::{LookupError, SessionIndex};
pub use transcript::{Role, Transcript, TranscriptStore, Turn, title_from_first_message};

use std::path::PathBuf;

use chrono::{DateTime, Utc};
use serde::Serialize;

/// Metadata of one stored chat session. Read-only outside the store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Session {
    pub session_id: String,
    pub title: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub transcript_location: PathBuf,
    pub message_count: usize,
}

/// One search hit. Lives only for the duration of a search reply.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SearchMatch {
    pub session: Session,
    pub snippet: String,
    pub match_count: usize,
}

/// Failure to load a single transcript. Never fatal to a listing.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("reading {path}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("parsing {path}: {source}")]
    Json {
        path: PathBuf,
        source: serde_json::Error,
    },

    #[error("{path} is not a chat session")]
    NotASession { path: PathBuf },

    #[error("{path} is {size} bytes, over the {limit} byte limit")]
    TooLarge { path: PathBuf, size: u64, limit: u64 },
}
