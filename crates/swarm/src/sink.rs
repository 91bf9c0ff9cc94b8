//! Persistence sinks for finished outputs
//!
//! Sinks must accept concurrent independent writes: each task saves its own
//! document and no write spans several tasks.

use crate::error::{Result, SwarmError};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::Serialize;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::io::AsyncWriteExt;
use tracing::debug;

/// Stores a document and returns its identifier
#[async_trait]
pub trait PersistenceSink: Send + Sync {
    async fn save(&self, title: &str, content: &str, tags: &[String]) -> Result<String>;
}

/// A stored document
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Document {
    pub id: String,
    pub title: String,
    pub content: String,
    pub tags: Vec<String>,
    pub created_at: DateTime<Utc>,
}

/// Keeps documents in memory
#[derive(Debug, Default)]
pub struct MemorySink {
    docs: Mutex<Vec<Document>>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of everything saved so far
    pub fn documents(&self) -> Vec<Document> {
        self.docs.lock().clone()
    }

    pub fn get(&self, id: &str) -> Option<Document> {
        self.docs.lock().iter().find(|d| d.id == id).cloned()
    }

    pub fn len(&self) -> usize {
        self.docs.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.docs.lock().is_empty()
    }
}

#[async_trait]
impl PersistenceSink for MemorySink {
    async fn save(&self, title: &str, content: &str, tags: &[String]) -> Result<String> {
        let mut docs = self.docs.lock();
        let id = (docs.len() + 1).to_string();
        docs.push(Document {
            id: id.clone(),
            title: title.to_string(),
            content: content.to_string(),
            tags: tags.to_vec(),
            created_at: Utc::now(),
        });
        Ok(id)
    }
}

/// Writes each document to `<dir>/<id>.md` with a front-matter header
#[derive(Debug)]
pub struct MarkdownDirSink {
    dir: PathBuf,
    next_id: AtomicU64,
}

impl MarkdownDirSink {
    /// Open (creating if needed) a document directory; ids continue after
    /// the highest existing `<n>.md`
    pub async fn open(dir: impl Into<PathBuf>) -> Result<Self> {
        let dir = dir.into();
        tokio::fs::create_dir_all(&dir).await?;

        let mut highest = 0;
        let mut entries = tokio::fs::read_dir(&dir).await?;
        while let Some(entry) = entries.next_entry().await? {
            let name = entry.file_name();
            if let Some(n) = name
                .to_str()
                .and_then(|n| n.strip_suffix(".md"))
                .and_then(|n| n.parse::<u64>().ok())
            {
                highest = highest.max(n);
            }
        }

        Ok(Self {
            dir,
            next_id: AtomicU64::new(highest + 1),
        })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Path a document id is stored at
    pub fn path_for(&self, id: &str) -> PathBuf {
        self.dir.join(format!("{id}.md"))
    }
}

#[async_trait]
impl PersistenceSink for MarkdownDirSink {
    async fn save(&self, title: &str, content: &str, tags: &[String]) -> Result<String> {
        let body = render_markdown(title, content, tags, Utc::now())?;

        // Ids already on disk are skipped, never overwritten
        loop {
            let id = self.next_id.fetch_add(1, Ordering::SeqCst).to_string();
            let path = self.path_for(&id);
            let opened = tokio::fs::OpenOptions::new()
                .write(true)
                .create_new(true)
                .open(&path)
                .await;
            let mut file = match opened {
                Ok(file) => file,
                Err(e) if e.kind() == ErrorKind::AlreadyExists => {
                    debug!(doc_id = %id, "Document id taken, trying the next one");
                    continue;
                }
                Err(e) => {
                    return Err(SwarmError::persistence(format!(
                        "failed to create {}: {}",
                        path.display(),
                        e
                    )));
                }
            };

            let written = async {
                file.write_all(body.as_bytes()).await?;
                file.flush().await
            }
            .await;
            written.map_err(|e| {
                SwarmError::persistence(format!("failed to write {}: {}", path.display(), e))
            })?;
            debug!(doc_id = %id, path = %path.display(), "Document saved");
            return Ok(id);
        }
    }
}

fn render_markdown(
    title: &str,
    content: &str,
    tags: &[String],
    created_at: DateTime<Utc>,
) -> Result<String> {
    // JSON strings are valid YAML scalars, so quoting goes through serde_json
    Ok(format!(
        "---\ntitle: {}\ntags: {}\ncreated: {}\n---\n\n{}\n",
        serde_json::to_string(title)?,
        serde_json::to_string(tags)?,
        created_at.to_rfc3339(),
        content.trim_end()
    ))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn memory_sink_assigns_sequential_ids() {
        let sink = MemorySink::new();
        let a = sink.save("A", "first", &["x".into()]).await.unwrap();
        let b = sink.save("B", "second", &[]).await.unwrap();

        assert_eq!(a, "1");
        assert_eq!(b, "2");
        assert_eq!(sink.len(), 2);
        assert_eq!(sink.get("1").unwrap().tags, vec!["x".to_string()]);
    }

    #[tokio::test]
    async fn markdown_sink_writes_front_matter() {
        let dir = tempfile::tempdir().unwrap();
        let sink = MarkdownDirSink::open(dir.path()).await.unwrap();

        let id = sink
            .save("Swarm: \"quoted\" title", "body text\n", &["swarm".into(), "a".into()])
            .await
            .unwrap();
        let written = std::fs::read_to_string(sink.path_for(&id)).unwrap();

        assert!(written.starts_with("---\ntitle: \"Swarm: \\\"quoted\\\" title\"\n"));
        assert!(written.contains("tags: [\"swarm\",\"a\"]\n"));
        assert!(written.ends_with("---\n\nbody text\n"));
    }

    #[tokio::test]
    async fn markdown_sink_continues_numbering() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("7.md"), "old").unwrap();
        std::fs::write(dir.path().join("notes.md"), "ignored").unwrap();

        let sink = MarkdownDirSink::open(dir.path()).await.unwrap();
        assert_eq!(sink.save("t", "c", &[]).await.unwrap(), "8");
        assert_eq!(sink.save("t", "c", &[]).await.unwrap(), "9");
    }

    #[tokio::test]
    async fn markdown_sink_skips_ids_taken_after_open() {
        let dir = tempfile::tempdir().unwrap();
        let sink = MarkdownDirSink::open(dir.path()).await.unwrap();
        std::fs::write(dir.path().join("1.md"), "written elsewhere").unwrap();

        assert_eq!(sink.save("t", "c", &[]).await.unwrap(), "2");
        assert_eq!(
            std::fs::read_to_string(dir.path().join("1.md")).unwrap(),
            "written elsewhere"
        );
    }
}
