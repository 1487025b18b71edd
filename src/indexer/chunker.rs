//! File → chunk conversion.
//!
//! Code in a language with a compiled-in grammar is split at definition
//! boundaries (one chunk per function, class, method...). Everything else,
//! and any file where that fails, is split into line blocks of roughly
//! `chunk_size` characters.
use std::path::Path;

use thiserror::Error;
use tracing::{debug, warn};
use tree_sitter::{Node, Parser};

use super::chunk::{ANONYMOUS, BLOCK_CHUNK_TYPE, Chunk, ChunkMetadata, TEXT_LANGUAGE};
use super::languages::Lang;

pub const DEFAULT_CHUNK_SIZE: usize = 1000;

#[derive(Error, Debug)]
enum StructuralError {
    #[error("no grammar available for {0}")]
    GrammarUnavailable(Lang),

    #[error("failed to load {lang} grammar: {source}")]
    Grammar {
        lang: Lang,
        #[source]
        source: tree_sitter::LanguageError,
    },

    #[error("parser produced no syntax tree")]
    NoTree,

    #[error("no definitions found")]
    NoDefinitions,
}

#[derive(Debug, Clone)]
pub struct Chunker {
    chunk_size: usize,
}

impl Default for Chunker {
    fn default() -> Self {
        Self::new(DEFAULT_CHUNK_SIZE)
    }
}

impl Chunker {
    #[must_use]
    pub fn new(chunk_size: usize) -> Self {
        Self {
            chunk_size: chunk_size.max(1),
        }
    }

    #[must_use]
    pub fn chunk_size(&self) -> usize {
        self.chunk_size
    }

    /// Split a file into ordered chunks. Never fails: structural problems
    /// are logged and the file is split into line blocks instead.
    pub fn chunk(&self, file_path: &str, content: &str) -> Vec<Chunk> {
        if content.is_empty() {
            return Vec::new();
        }

        let Some(lang) = Lang::from_path(Path::new(file_path)) else {
            return self.fallback_chunks(file_path, content);
        };

        match extract_definitions(file_path, content, lang) {
            Ok(chunks) => {
                debug!("{file_path}: {} {lang} definitions", chunks.len());
                chunks
            }
            Err(e) => {
                warn!("Syntax parsing failed for {file_path}, using line blocks: {e}");
                self.fallback_chunks(file_path, content)
            }
        }
    }

    /// Line-accumulation chunking.
    ///
    /// Lines are collected until the next one would push the character count
    /// past `chunk_size`; the pending block is then closed and the line
    /// starts a new one. Blocks are never cut in front of an empty line or
    /// after a block holding no characters, so every block carries text.
    /// Joining all block contents with `\n` gives back `content`.
    pub fn fallback_chunks(&self, file_path: &str, content: &str) -> Vec<Chunk> {
        if content.is_empty() {
            return Vec::new();
        }

        let mut chunks = Vec::new();
        let mut pending: Vec<&str> = Vec::new();
        let mut pending_chars = 0usize;
        let mut start_line = 1usize;

        for (idx, line) in content.split('\n').enumerate() {
            let line_no = idx + 1;
            let line_chars = line.chars().count();

            if pending_chars > 0 && line_chars > 0 && pending_chars + line_chars > self.chunk_size
            {
                chunks.push(block_chunk(file_path, &pending, start_line));
                pending.clear();
                pending_chars = 0;
                start_line = line_no;
            }

            pending.push(line);
            pending_chars += line_chars;
        }

        if !pending.is_empty() {
            chunks.push(block_chunk(file_path, &pending, start_line));
        }

        chunks
    }
}

fn block_chunk(file_path: &str, lines: &[&str], start_line: usize) -> Chunk {
    Chunk {
        content: lines.join("\n"),
        file_path: file_path.to_string(),
        start_line,
        end_line: start_line + lines.len() - 1,
        language: TEXT_LANGUAGE.to_string(),
        chunk_type: BLOCK_CHUNK_TYPE.to_string(),
        metadata: ChunkMetadata {
            lines: lines.len(),
            ..Default::default()
        },
    }
}

fn extract_definitions(
    file_path: &str,
    content: &str,
    lang: Lang,
) -> Result<Vec<Chunk>, StructuralError> {
    let grammar = lang
        .grammar()
        .ok_or(StructuralError::GrammarUnavailable(lang))?;

    let mut parser = Parser::new();
    parser
        .set_language(&grammar)
        .map_err(|source| StructuralError::Grammar { lang, source })?;

    let tree = parser
        .parse(content, None)
        .ok_or(StructuralError::NoTree)?;

    let targets = lang.target_node_kinds();
    let mut chunks = Vec::new();

    // Pre-order walk: a class is emitted before the methods nested in it.
    let mut cursor = tree.root_node().walk();
    'walk: loop {
        let node = cursor.node();
        if targets.contains(&node.kind()) {
            if let Some(chunk) = definition_chunk(node, file_path, content, lang) {
                chunks.push(chunk);
            }
        }

        if cursor.goto_first_child() {
            continue;
        }
        while !cursor.goto_next_sibling() {
            if !cursor.goto_parent() {
                break 'walk;
            }
        }
    }

    if chunks.is_empty() {
        return Err(StructuralError::NoDefinitions);
    }
    Ok(chunks)
}

fn definition_chunk(node: Node, file_path: &str, content: &str, lang: Lang) -> Option<Chunk> {
    let text = content.get(node.byte_range())?;
    if text.is_empty() {
        return None;
    }

    let start_line = node.start_position().row + 1;
    let end = node.end_position();
    // A node ending at column 0 stops at the newline of the previous row.
    let end_line = if end.column == 0 && end.row + 1 > start_line {
        end.row
    } else {
        end.row + 1
    };

    Some(Chunk {
        content: text.to_string(),
        file_path: file_path.to_string(),
        start_line,
        end_line,
        language: lang.id().to_string(),
        chunk_type: node.kind().to_string(),
        metadata: ChunkMetadata {
            name: Some(node_name(node, content)),
            lines: end_line - start_line + 1,
            ..Default::default()
        },
    })
}

/// First identifier-like direct child, or `"anonymous"`.
fn node_name(node: Node, content: &str) -> String {
    let mut walker = node.walk();
    node.children(&mut walker)
        .find(|child| is_identifier_kind(child.kind()))
        .and_then(|child| content.get(child.byte_range()))
        .map_or_else(|| ANONYMOUS.to_string(), str::to_string)
}

fn is_identifier_kind(kind: &str) -> bool {
    matches!(
        kind,
        "identifier"
            | "name"
            | "constant"
            | "type_identifier"
            | "field_identifier"
            | "property_identifier"
    )
}
