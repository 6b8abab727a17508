//! Reference material for grounding technical questions and answer scoring.
//!
//! A `ContextSource` returns the passages most relevant to a query. `ChunkIndex` ranks a
//! pre-chunked corpus by keyword overlap (Jaccard over normalized words); `NoContext`
//! returns nothing and leaves prompts ungrounded.
//!
//! Corpus format (`context_chunks.json`):
//!
//! ```json
//! [ { "text": "A process is a program in execution ...", "source": "os_concepts.pdf" } ]
//! ```

use crate::error::ContextError;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::Path;
use tracing::{info, warn};

pub const DEFAULT_CONTEXT_TOP_K: usize = 8;

/// Prompt budgets for joined context, in characters.
pub const GENERATION_CONTEXT_CHARS: usize = 12_000;
pub const SCORING_CONTEXT_CHARS: usize = 8_000;

const STOPWORDS: [&str; 24] = [
    "the", "and", "for", "with", "that", "this", "what", "how", "why", "are", "from", "into",
    "does", "explain", "between", "difference", "about", "your", "you", "can", "which", "when",
    "following", "detail",
];

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContextChunk {
    pub text: String,
    #[serde(default)]
    pub source: String,
}

#[async_trait]
pub trait ContextSource: Send + Sync {
    /// Up to `top_k` passages for `query`, best first. Empty when nothing matches.
    async fn relevant(&self, query: &str, top_k: usize) -> Vec<ContextChunk>;
}

pub struct NoContext;

#[async_trait]
impl ContextSource for NoContext {
    async fn relevant(&self, _query: &str, _top_k: usize) -> Vec<ContextChunk> {
        Vec::new()
    }
}

fn keywords(text: &str) -> HashSet<String> {
    text.split(|c: char| !c.is_alphanumeric())
        .filter(|w| w.chars().count() >= 3)
        .map(str::to_lowercase)
        .filter(|w| !STOPWORDS.contains(&w.as_str()))
        .collect()
}

/// |a ∩ b| / |a ∪ b|, or 0.0 when both are empty.
pub fn keyword_jaccard(a: &HashSet<String>, b: &HashSet<String>) -> f32 {
    let union = a.union(b).count();
    if union == 0 {
        return 0.0;
    }
    a.intersection(b).count() as f32 / union as f32
}

/// In-memory corpus ranked by keyword overlap with the query.
#[derive(Debug, Default)]
pub struct ChunkIndex {
    chunks: Vec<(ContextChunk, HashSet<String>)>,
}

impl ChunkIndex {
    pub fn from_chunks(chunks: Vec<ContextChunk>) -> Self {
        let chunks = chunks
            .into_iter()
            .filter(|c| !c.text.trim().is_empty())
            .map(|c| {
                let words = keywords(&c.text);
                (c, words)
            })
            .collect();
        Self { chunks }
    }

    pub fn from_json_str(raw: &str) -> Result<Self, ContextError> {
        let chunks: Vec<ContextChunk> = serde_json::from_str(raw)?;
        Ok(Self::from_chunks(chunks))
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self, ContextError> {
        let raw = std::fs::read_to_string(path.as_ref())?;
        Self::from_json_str(&raw)
    }

    /// Load `path` when given; an unreadable corpus yields an empty index.
    pub fn load_or_empty(path: Option<&Path>) -> Self {
        let Some(path) = path else {
            return Self::default();
        };
        match Self::load(path) {
            Ok(index) => {
                info!(target: "hiresense::context", path = %path.display(), chunks = index.len(), "reference corpus loaded");
                index
            }
            Err(e) => {
                warn!(target: "hiresense::context", path = %path.display(), "reference corpus unavailable ({}); prompts will not be grounded", e);
                Self::default()
            }
        }
    }

    pub fn len(&self) -> usize {
        self.chunks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.chunks.is_empty()
    }

    /// Chunks sharing at least one keyword with `query`, best first; ties keep corpus order.
    pub fn rank(&self, query: &str, top_k: usize) -> Vec<ContextChunk> {
        let query_words = keywords(query);
        if query_words.is_empty() {
            return Vec::new();
        }
        let mut scored: Vec<(f32, &ContextChunk)> = self
            .chunks
            .iter()
            .map(|(chunk, words)| (keyword_jaccard(&query_words, words), chunk))
            .filter(|(score, _)| *score > 0.0)
            .collect();
        scored.sort_by(|a, b| b.0.partial_cmp(&a.0).unwrap_or(std::cmp::Ordering::Equal));
        scored
            .into_iter()
            .take(top_k)
            .map(|(_, chunk)| chunk.clone())
            .collect()
    }
}

#[async_trait]
impl ContextSource for ChunkIndex {
    async fn relevant(&self, query: &str, top_k: usize) -> Vec<ContextChunk> {
        self.rank(query, top_k)
    }
}

/// Passages joined by blank lines, cut to at most `max_chars` characters.
pub fn join_context(chunks: &[ContextChunk], max_chars: usize) -> String {
    let joined = chunks
        .iter()
        .map(|c| c.text.trim())
        .collect::<Vec<_>>()
        .join("\n\n");
    match joined.char_indices().nth(max_chars) {
        Some((idx, _)) => joined[..idx].to_string(),
        None => joined,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn corpus() -> ChunkIndex {
        ChunkIndex::from_chunks(vec![
            ContextChunk {
                text: "A deadlock occurs when processes wait on each other in a circular wait.".into(),
                source: "os.pdf".into(),
            },
            ContextChunk {
                text: "Paging splits memory into fixed-size pages; the TLB caches page translations.".into(),
                source: "os.pdf".into(),
            },
            ContextChunk {
                text: "   ".into(),
                source: "blank.pdf".into(),
            },
            ContextChunk {
                text: "Normalization reduces redundancy in relational database tables.".into(),
                source: "db.pdf".into(),
            },
        ])
    }

    #[test]
    fn blank_chunks_are_dropped() {
        assert_eq!(corpus().len(), 3);
    }

    #[test]
    fn rank_prefers_overlapping_chunks() {
        let index = corpus();
        let hits = index.rank("What is a deadlock and circular wait?", 5);
        assert_eq!(hits.len(), 1);
        assert!(hits[0].text.contains("deadlock"));

        let hits = index.rank("Explain paging and the TLB", 1);
        assert_eq!(hits.len(), 1);
        assert!(hits[0].text.contains("TLB"));

        assert!(index.rank("knitting patterns", 5).is_empty());
        assert!(index.rank("what is the", 5).is_empty());
    }

    #[test]
    fn jaccard_of_disjoint_and_identical_sets() {
        let a = keywords("mutex semaphore");
        let b = keywords("semaphore mutex");
        assert_eq!(keyword_jaccard(&a, &b), 1.0);
        assert_eq!(keyword_jaccard(&a, &keywords("normalization")), 0.0);
        assert_eq!(keyword_jaccard(&HashSet::new(), &HashSet::new()), 0.0);
    }

    #[test]
    fn join_respects_budget_on_char_boundary() {
        let chunks = vec![
            ContextChunk { text: "héllo".into(), source: String::new() },
            ContextChunk { text: "world".into(), source: String::new() },
        ];
        assert_eq!(join_context(&chunks, 100), "héllo\n\nworld");
        assert_eq!(join_context(&chunks, 2), "hé");
        assert_eq!(join_context(&[], 10), "");
    }

    #[test]
    fn corpus_loads_from_json_or_falls_back_empty() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("chunks.json");
        std::fs::write(&path, r#"[{"text": "Hash tables give average O(1) lookup."}]"#).unwrap();
        let index = ChunkIndex::load_or_empty(Some(&path));
        assert_eq!(index.len(), 1);
        assert_eq!(index.rank("hash tables", 3)[0].source, "");

        std::fs::write(&path, "not json").unwrap();
        assert!(ChunkIndex::load_or_empty(Some(&path)).is_empty());
        assert!(ChunkIndex::load_or_empty(None).is_empty());
    }

    #[tokio::test]
    async fn no_context_is_always_empty() {
        assert!(NoContext.relevant("deadlock", 8).await.is_empty());
    }
}
