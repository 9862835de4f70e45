use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use rayon::prelude::*;
use tracing::debug;

use super::{SearchMatch, Session, Transcript, TranscriptStore};

const SNIPPET_MAX_CHARS: usize = 60;

#[derive(Debug, thiserror::Error)]
pub enum LookupError {
    #[error("no session matches \"{0}\"")]
    NotFound(String),

    #[error("\"{id}\" matches {count} sessions; use more of the id")]
    Ambiguous { id: String, count: usize },
}

struct Entry {
    transcript: Transcript,
    /// Lower-cased transcript text.
    haystack: String,
}

struct Snapshot {
    entries: Vec<Entry>,
    built: Instant,
}

impl Snapshot {
    fn build(store: &TranscriptStore) -> Self {
        let started = Instant::now();
        let entries: Vec<Entry> = store
            .load_all()
            .into_iter()
            .map(|transcript| Entry {
                haystack: transcript.text().to_lowercase(),
                transcript,
            })
            .collect();
        debug!(
            sessions = entries.len(),
            elapsed_ms = u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX),
            "session index rebuilt"
        );
        Self {
            entries,
            built: Instant::now(),
        }
    }
}

/// Recency listing and full-text search over the transcript store.
///
/// With a zero staleness window every call rescans the store, so results
/// always reflect the files on disk when the call was made. A non-zero
/// window reuses the last scan for that long.
pub struct SessionIndex {
    store: TranscriptStore,
    max_staleness: Duration,
    cache: Mutex<Option<Arc<Snapshot>>>,
}

impl SessionIndex {
    pub fn new(store: TranscriptStore, max_staleness: Duration) -> Self {
        Self {
            store,
            max_staleness,
            cache: Mutex::new(None),
        }
    }

    fn snapshot(&self) -> Arc<Snapshot> {
        if !self.max_staleness.is_zero()
            && let Ok(cache) = self.cache.lock()
            && let Some(snapshot) = cache.as_ref()
            && snapshot.built.elapsed() <= self.max_staleness
        {
            return Arc::clone(snapshot);
        }

        // Built without holding the lock; concurrent commands may each scan.
        let fresh = Arc::new(Snapshot::build(&self.store));
        if let Ok(mut cache) = self.cache.lock() {
            *cache = Some(Arc::clone(&fresh));
        }
        fresh
    }

    /// Up to `n` sessions, most recently updated first. Ties keep discovery
    /// order.
    pub fn list_recent(&self, n: usize) -> Vec<Session> {
        let snapshot = self.snapshot();
        let mut sessions: Vec<Session> = snapshot
            .entries
            .iter()
            .map(|e| e.transcript.session.clone())
            .collect();
        sessions.sort_by(|a, b| b.updated_at.cmp(&a.updated_at));
        sessions.truncate(n);
        sessions
    }

    /// Sessions containing `query` (case-insensitive substring), ranked by
    /// occurrence count, then recency, then discovery order.
    pub fn search(&self, query: &str) -> Vec<SearchMatch> {
        let needle = query.trim().to_lowercase();
        if needle.is_empty() {
            return Vec::new();
        }
        let snapshot = self.snapshot();
        let mut matches: Vec<SearchMatch> = snapshot
            .entries
            .par_iter()
            .filter_map(|entry| {
                let match_count = entry.haystack.matches(&needle).count();
                (match_count > 0).then(|| SearchMatch {
                    session: entry.transcript.session.clone(),
                    snippet: snippet(&entry.transcript, &needle),
                    match_count,
                })
            })
            .collect();
        matches.sort_by(|a, b| {
            b.match_count
                .cmp(&a.match_count)
                .then_with(|| b.session.updated_at.cmp(&a.session.updated_at))
        });
        matches
    }

    /// Look a session up by exact id, else by unique id prefix.
    pub fn find(&self, id: &str) -> Result<Transcript, LookupError> {
        let id = id.trim();
        let snapshot = self.snapshot();
        if let Some(entry) = snapshot
            .entries
            .iter()
            .find(|e| e.transcript.session.session_id == id)
        {
            return Ok(entry.transcript.clone());
        }

        let candidates: Vec<&Entry> = if id.is_empty() {
            Vec::new()
        } else {
            snapshot
                .entries
                .iter()
                .filter(|e| e.transcript.session.session_id.starts_with(id))
                .collect()
        };
        match candidates.as_slice() {
            [] => Err(LookupError::NotFound(id.to_string())),
            [only] => Ok(only.transcript.clone()),
            many => Err(LookupError::Ambiguous {
                id: id.to_string(),
                count: many.len(),
            }),
        }
    }

    pub fn session_count(&self) -> usize {
        self.snapshot().entries.len()
    }
}

/// First line mentioning the needle, trimmed and cut to fit a chat line.
fn snippet(transcript: &Transcript, needle: &str) -> String {
    let line = transcript
        .turns
        .iter()
        .flat_map(|t| t.text.lines())
        .find(|line| line.to_lowercase().contains(needle))
        .unwrap_or_default()
        .trim();
    if line.chars().count() <= SNIPPET_MAX_CHARS {
        return line.to_string();
    }
    let cut: String = line.chars().take(SNIPPET_MAX_CHARS - 3).collect();
    format!("{}...", cut.trim_end())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::Path;

    fn write_session(dir: &Path, id: &str, last_ms: i64, turns: &[(&str, &str)]) {
        let requests: Vec<serde_json::Value> = turns
            .iter()
            .map(|(user, reply)| {
                serde_json::json!({
                    "message": {"text": user},
                    "response": [{"kind": "markdownContent", "content": {"value": reply}}]
                })
            })
            .collect();
        let body = serde_json::json!({
            "sessionId": id,
            "creationDate": last_ms - 1000,
            "lastMessageDate": last_ms,
            "requests": requests,
        });
        std::fs::write(dir.join(format!("{id}.json")), body.to_string()).unwrap();
    }

    fn index(dir: &Path) -> SessionIndex {
        SessionIndex::new(TranscriptStore::new(dir), Duration::ZERO)
    }

    #[test]
    fn empty_store_lists_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let idx = index(dir.path());
        assert!(idx.list_recent(30).is_empty());
        assert!(idx.search("anything").is_empty());
        assert_eq!(idx.session_count(), 0);
    }

    #[test]
    fn list_recent_orders_by_update_and_truncates() {
        let dir = tempfile::tempdir().unwrap();
        write_session(dir.path(), "old", 1_000_000, &[("old question", "a")]);
        write_session(dir.path(), "new", 3_000_000, &[("new question", "b")]);
        write_session(dir.path(), "mid", 2_000_000, &[("mid question", "c")]);
        let idx = index(dir.path());

        let ids: Vec<String> = idx.list_recent(2).into_iter().map(|s| s.session_id).collect();
        assert_eq!(ids, vec!["new", "mid"]);
        assert_eq!(idx.list_recent(10).len(), 3);
    }

    #[test]
    fn ties_keep_discovery_order() {
        let dir = tempfile::tempdir().unwrap();
        write_session(dir.path(), "b-second", 5_000, &[("x", "y")]);
        write_session(dir.path(), "a-first", 5_000, &[("x", "y")]);
        let ids: Vec<String> = index(dir.path())
            .list_recent(5)
            .into_iter()
            .map(|s| s.session_id)
            .collect();
        assert_eq!(ids, vec!["a-first", "b-second"]);
    }

    #[test]
    fn search_ranks_by_count_then_recency() {
        let dir = tempfile::tempdir().unwrap();
        write_session(dir.path(), "one", 1_000, &[("Tokio runtime", "use tokio")]);
        write_session(dir.path(), "three", 2_000, &[("TOKIO tokio", "tokio!")]);
        write_session(dir.path(), "two-new", 9_000, &[("tokio", "Tokio")]);
        write_session(dir.path(), "two-old", 3_000, &[("tokio", "tokio")]);
        write_session(dir.path(), "none", 8_000, &[("async-std", "smol")]);
        let idx = index(dir.path());

        let results = idx.search("tokio");
        let ranked: Vec<(&str, usize)> = results
            .iter()
            .map(|m| (m.session.session_id.as_str(), m.match_count))
            .collect();
        assert_eq!(
            ranked,
            vec![("three", 3), ("two-new", 2), ("two-old", 2), ("one", 2)]
        );
        assert_eq!(results[0].snippet, "TOKIO tokio");

        // Idempotent against an unchanged store.
        let again: Vec<String> = idx
            .search("tokio")
            .into_iter()
            .map(|m| m.session.session_id)
            .collect();
        assert_eq!(again, vec!["three", "two-new", "two-old", "one"]);
    }

    #[test]
    fn counts_non_overlapping_occurrences() {
        let dir = tempfile::tempdir().unwrap();
        write_session(dir.path(), "s", 1, &[("aaaa", "")]);
        let results = index(dir.path()).search("aa");
        assert_eq!(results[0].match_count, 2);
    }

    #[test]
    fn blank_query_matches_nothing() {
        let dir = tempfile::tempdir().unwrap();
        write_session(dir.path(), "s", 1, &[("anything", "")]);
        assert!(index(dir.path()).search("   ").is_empty());
    }

    #[test]
    fn snippet_is_cut_to_sixty_chars() {
        let dir = tempfile::tempdir().unwrap();
        let long = format!("needle {}", "word ".repeat(30));
        write_session(dir.path(), "s", 1, &[(long.as_str(), "")]);
        let results = index(dir.path()).search("needle");
        assert!(results[0].snippet.starts_with("needle word"));
        assert!(results[0].snippet.ends_with("..."));
        assert!(results[0].snippet.chars().count() <= 60);
    }

    #[test]
    fn reflects_store_changes_between_queries() {
        let dir = tempfile::tempdir().unwrap();
        let idx = index(dir.path());
        assert_eq!(idx.session_count(), 0);
        write_session(dir.path(), "late", 1, &[("hello", "")]);
        assert_eq!(idx.session_count(), 1);
    }

    #[test]
    fn staleness_window_reuses_scan() {
        let dir = tempfile::tempdir().unwrap();
        let idx = SessionIndex::new(TranscriptStore::new(dir.path()), Duration::from_secs(3600));
        assert_eq!(idx.session_count(), 0);
        write_session(dir.path(), "late", 1, &[("hello", "")]);
        assert_eq!(idx.session_count(), 0);
    }

    #[test]
    fn find_by_id_or_unique_prefix() {
        let dir = tempfile::tempdir().unwrap();
        write_session(dir.path(), "abc-111", 1, &[("first", "")]);
        write_session(dir.path(), "abc-222", 2, &[("second", "")]);
        write_session(dir.path(), "xyz-333", 3, &[("third", "")]);
        let idx = index(dir.path());

        assert_eq!(idx.find("abc-222").unwrap().session.title, "second");
        assert_eq!(idx.find("xyz").unwrap().session.session_id, "xyz-333");
        assert!(matches!(
            idx.find("abc"),
            Err(LookupError::Ambiguous { count: 2, .. })
        ));
        assert!(matches!(idx.find("nope"), Err(LookupError::NotFound(_))));
    }
}
