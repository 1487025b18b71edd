use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

/// Language tag carried by fallback chunks.
pub const TEXT_LANGUAGE: &str = "text";
/// Chunk type carried by fallback chunks.
pub const BLOCK_CHUNK_TYPE: &str = "block";
/// Symbol name used when a definition has no identifier child.
pub const ANONYMOUS: &str = "anonymous";

/// Scalar metadata value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum MetaValue {
    Bool(bool),
    Int(i64),
    Float(f64),
    Text(String),
}

impl fmt::Display for MetaValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Bool(v) => write!(f, "{v}"),
            Self::Int(v) => write!(f, "{v}"),
            Self::Float(v) => write!(f, "{v}"),
            Self::Text(v) => f.write_str(v),
        }
    }
}

impl From<&str> for MetaValue {
    fn from(v: &str) -> Self {
        Self::Text(v.to_string())
    }
}

impl From<String> for MetaValue {
    fn from(v: String) -> Self {
        Self::Text(v)
    }
}

impl From<i64> for MetaValue {
    fn from(v: i64) -> Self {
        Self::Int(v)
    }
}

impl From<bool> for MetaValue {
    fn from(v: bool) -> Self {
        Self::Bool(v)
    }
}

/// Metadata accumulated on a chunk by every stage that touches it.
///
/// Well-known keys are fields; anything else goes into `extra`. Stages only
/// fill in what is still missing, nothing already set is replaced.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ChunkMetadata {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default)]
    pub lines: usize,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub repo_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub git_branch: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub full_path: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub relative_path: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub file_size: Option<u64>,
    #[serde(default, flatten)]
    pub extra: BTreeMap<String, MetaValue>,
}

/// Keys owned by the typed fields of a stored record. They share one flat
/// JSON object with `extra`, so none of them may appear there.
pub const RESERVED_KEYS: &[&str] = &[
    "file_path",
    "start_line",
    "end_line",
    "language",
    "chunk_type",
    "name",
    "lines",
    "repo_name",
    "git_branch",
    "full_path",
    "relative_path",
    "file_size",
];

impl ChunkMetadata {
    /// Add an extra key. Returns `false` and leaves the map untouched when
    /// the key is reserved or already present.
    pub fn insert_extra(&mut self, key: impl Into<String>, value: impl Into<MetaValue>) -> bool {
        let key = key.into();
        if RESERVED_KEYS.contains(&key.as_str()) || self.extra.contains_key(&key) {
            return false;
        }
        self.extra.insert(key, value.into());
        true
    }
}

/// Repository-level context appended to each chunk during ingestion.
#[derive(Debug, Clone, Default)]
pub struct FileContext {
    pub repo_name: String,
    pub git_branch: Option<String>,
    pub full_path: String,
    pub relative_path: String,
    pub file_size: u64,
}

/// The atomic retrievable unit: a contiguous fragment of one file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Chunk {
    pub content: String,
    pub file_path: String,
    /// 1-based, inclusive.
    pub start_line: usize,
    /// 1-based, inclusive.
    pub end_line: usize,
    pub language: String,
    pub chunk_type: String,
    pub metadata: ChunkMetadata,
}

impl Chunk {
    pub fn is_fallback(&self) -> bool {
        self.chunk_type == BLOCK_CHUNK_TYPE && self.language == TEXT_LANGUAGE
    }

    /// Extend the metadata with repository context.
    pub fn enrich(&mut self, ctx: &FileContext) {
        let meta = &mut self.metadata;
        meta.repo_name.get_or_insert_with(|| ctx.repo_name.clone());
        meta.full_path.get_or_insert_with(|| ctx.full_path.clone());
        meta.relative_path
            .get_or_insert_with(|| ctx.relative_path.clone());
        meta.file_size.get_or_insert(ctx.file_size);
        if meta.git_branch.is_none() {
            meta.git_branch.clone_from(&ctx.git_branch);
        }
    }

    /// Text handed to the embedding function. File and type context keep
    /// otherwise similar snippets apart.
    pub fn embedding_text(&self) -> String {
        format!(
            "File: {}\nType: {}\nLanguage: {}\n\n{}",
            self.file_path, self.chunk_type, self.language, self.content
        )
        .trim()
        .to_string()
    }

    /// Identifier derived from location and content, so re-ingesting an
    /// unchanged chunk maps to the same record.
    pub fn record_id(&self) -> String {
        let hash = blake3::hash(self.content.as_bytes()).to_hex();
        format!(
            "{}:{}-{}#{}",
            self.file_path,
            self.start_line,
            self.end_line,
            &hash.as_str()[..12]
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> Chunk {
        Chunk {
            content: "def login():\n    pass".to_string(),
            file_path: "auth/login.py".to_string(),
            start_line: 3,
            end_line: 4,
            language: "python".to_string(),
            chunk_type: "function_definition".to_string(),
            metadata: ChunkMetadata {
                name: Some("login".to_string()),
                lines: 2,
                ..Default::default()
            },
        }
    }

    #[test]
    fn test_embedding_text_includes_context() {
        let text = sample().embedding_text();
        assert!(text.starts_with("File: auth/login.py\nType: function_definition\nLanguage: python"));
        assert!(text.ends_with("def login():\n    pass"));
    }

    #[test]
    fn test_record_id_is_stable_and_content_addressed() {
        let a = sample();
        let mut b = sample();
        assert_eq!(a.record_id(), b.record_id());
        assert!(a.record_id().starts_with("auth/login.py:3-4#"));

        b.content.push_str("\n    return 1");
        assert_ne!(a.record_id(), b.record_id());
    }

    #[test]
    fn test_enrich_does_not_overwrite() {
        let mut chunk = sample();
        chunk.metadata.repo_name = Some("original".to_string());

        chunk.enrich(&FileContext {
            repo_name: "other".to_string(),
            git_branch: Some("main".to_string()),
            full_path: "/tmp/repo/auth/login.py".to_string(),
            relative_path: "auth/login.py".to_string(),
            file_size: 42,
        });

        assert_eq!(chunk.metadata.repo_name.as_deref(), Some("original"));
        assert_eq!(chunk.metadata.git_branch.as_deref(), Some("main"));
        assert_eq!(chunk.metadata.file_size, Some(42));
        assert_eq!(chunk.metadata.name.as_deref(), Some("login"));
    }

    #[test]
    fn test_insert_extra_keeps_first_value() {
        let mut meta = ChunkMetadata::default();
        assert!(meta.insert_extra("owner", "team-a"));
        assert!(!meta.insert_extra("owner", "team-b"));
        assert_eq!(meta.extra["owner"], MetaValue::Text("team-a".to_string()));
    }

    #[test]
    fn test_insert_extra_rejects_reserved_keys() {
        let mut meta = ChunkMetadata::default();
        for key in RESERVED_KEYS {
            assert!(!meta.insert_extra(*key, "shadow"), "{key} accepted");
        }
        assert!(meta.extra.is_empty());
    }

    #[test]
    fn test_metadata_serializes_flat() {
        let mut meta = ChunkMetadata {
            name: Some("f".to_string()),
            lines: 1,
            ..Default::default()
        };
        meta.insert_extra("reviewed", true);
        let json = serde_json::to_value(&meta).unwrap();
        assert_eq!(json["name"], "f");
        assert_eq!(json["reviewed"], true);
        assert!(json.get("repo_name").is_none());

        let back: ChunkMetadata = serde_json::from_value(json).unwrap();
        assert_eq!(back, meta);
    }
}
