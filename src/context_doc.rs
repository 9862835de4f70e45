//! The shared `context.md` document.

use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use anyhow::{Context, bail};
use chrono::Utc;
use serde::Serialize;

use crate::error::ExitError;
use crate::template;

/// Section of the starter document; not itself a session entry.
const HISTORY_HEADING: &str = "## Session History";

#[derive(Debug, Clone)]
pub struct ContextDocument {
    path: PathBuf,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ContextSummary {
    pub path: PathBuf,
    pub sessions: usize,
    pub lines: usize,
    pub words: usize,
    pub bytes: u64,
}

impl ContextSummary {
    pub fn size_kb(&self) -> String {
        #[allow(clippy::cast_precision_loss)]
        let kb = self.bytes as f64 / 1024.0;
        format!("{kb:.2}")
    }
}

impl ContextDocument {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn exists(&self) -> bool {
        self.path.is_file()
    }

    fn missing(&self) -> anyhow::Error {
        ExitError::Missing {
            what: "context document".into(),
            path: self.path.display().to_string(),
        }
        .into()
    }

    /// Full text, or `None` when the document does not exist.
    pub fn read(&self) -> anyhow::Result<Option<String>> {
        match fs::read_to_string(&self.path) {
            Ok(content) => Ok(Some(content)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e).with_context(|| format!("reading {}", self.path.display())),
        }
    }

    /// Write the starter document. Never overwrites.
    pub fn init(&self) -> anyhow::Result<()> {
        if self.path.exists() {
            bail!("{} already exists", self.path.display());
        }
        if let Some(parent) = self.path.parent()
            && !parent.as_os_str().is_empty()
        {
            fs::create_dir_all(parent)
                .with_context(|| format!("creating {}", parent.display()))?;
        }
        let mut body = template::render(
            "context.md",
            minijinja::context! { initialized => Utc::now().to_rfc3339() },
        )?;
        if !body.ends_with('\n') {
            body.push('\n');
        }
        fs::write(&self.path, body).with_context(|| format!("writing {}", self.path.display()))
    }

    /// Append a `## Session` entry. Returns the heading used.
    pub fn append(&self, content: &str, title: Option<&str>) -> anyhow::Result<String> {
        let content = content.trim();
        if content.is_empty() {
            bail!("content cannot be empty");
        }
        let heading = match title.map(str::trim).filter(|t| !t.is_empty()) {
            Some(title) => title.to_string(),
            None => Utc::now().format("%Y-%m-%d %H:%M").to_string(),
        };
        self.append_raw(&format!("\n## Session {heading}\n\n{content}\n\n---\n"))?;
        Ok(heading)
    }

    /// Append pre-rendered markdown verbatim.
    pub fn append_raw(&self, markdown: &str) -> anyhow::Result<()> {
        if !self.exists() {
            return Err(self.missing());
        }
        let mut file = fs::OpenOptions::new()
            .append(true)
            .open(&self.path)
            .with_context(|| format!("opening {}", self.path.display()))?;
        file.write_all(markdown.as_bytes())
            .with_context(|| format!("appending to {}", self.path.display()))
    }

    pub fn summary(&self) -> anyhow::Result<ContextSummary> {
        let Some(content) = self.read()? else {
            return Err(self.missing());
        };
        Ok(ContextSummary {
            path: self.path.clone(),
            sessions: content
                .lines()
                .filter(|l| l.starts_with("## Session") && !l.starts_with(HISTORY_HEADING))
                .count(),
            lines: content.split('\n').count(),
            words: content.split_whitespace().count(),
            bytes: content.len() as u64,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn doc() -> (tempfile::TempDir, ContextDocument) {
        let dir = tempfile::tempdir().unwrap();
        let doc = ContextDocument::new(dir.path().join("context.md"));
        (dir, doc)
    }

    #[test]
    fn read_missing_is_none() {
        let (_dir, doc) = doc();
        assert!(doc.read().unwrap().is_none());
        assert!(!doc.exists());
    }

    #[test]
    fn init_writes_template_once() {
        let (_dir, doc) = doc();
        doc.init().unwrap();
        let content = doc.read().unwrap().unwrap();
        assert!(content.contains("## Session History"));
        assert!(content.ends_with('\n'));

        let err = doc.init().unwrap_err();
        assert!(err.to_string().contains("already exists"));
    }

    #[test]
    fn append_adds_session_entries() {
        let (_dir, doc) = doc();
        doc.init().unwrap();
        let heading = doc.append("  decided on SSE  ", Some("Transport")).unwrap();
        assert_eq!(heading, "Transport");
        doc.append("second note", None).unwrap();

        let content = doc.read().unwrap().unwrap();
        assert!(content.contains("\n## Session Transport\n\ndecided on SSE\n\n---\n"));
        assert_eq!(doc.summary().unwrap().sessions, 2);
    }

    #[test]
    fn append_requires_document_and_content() {
        let (_dir, doc) = doc();
        let err = doc.append("note", None).unwrap_err();
        assert!(matches!(
            err.downcast_ref::<ExitError>(),
            Some(ExitError::Missing { .. })
        ));

        doc.init().unwrap();
        assert!(doc.append("   ", None).is_err());
    }

    #[test]
    fn summary_counts() {
        let (_dir, doc) = doc();
        std::fs::write(doc.path(), "# T\n## Session a\none two\n## Sessions b\n").unwrap();
        let summary = doc.summary().unwrap();
        assert_eq!(summary.sessions, 2);
        assert_eq!(summary.lines, 5);
        assert_eq!(summary.words, 10);
        assert_eq!(summary.bytes, 39);
        assert_eq!(summary.size_kb(), "0.04");
    }
}
