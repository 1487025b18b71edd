use std::fmt;
use std::path::Path;

use serde::{Deserialize, Serialize};
use tree_sitter::Language;

/// Source language recognised by the chunker.
///
/// Every variant has a fixed set of structural node kinds. Only some have a
/// compiled-in grammar; the rest always take the line-block fallback.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Lang {
    Python,
    JavaScript,
    TypeScript,
    /// TypeScript with JSX. Stored under the `typescript` tag.
    Tsx,
    Java,
    Cpp,
    C,
    Go,
    Rust,
    Ruby,
}

impl Lang {
    pub const ALL: [Lang; 10] = [
        Lang::Python,
        Lang::JavaScript,
        Lang::TypeScript,
        Lang::Tsx,
        Lang::Java,
        Lang::Cpp,
        Lang::C,
        Lang::Go,
        Lang::Rust,
        Lang::Ruby,
    ];

    /// Tag persisted in chunk metadata.
    #[must_use]
    pub fn id(self) -> &'static str {
        match self {
            Self::Python => "python",
            Self::JavaScript => "javascript",
            Self::TypeScript | Self::Tsx => "typescript",
            Self::Java => "java",
            Self::Cpp => "cpp",
            Self::C => "c",
            Self::Go => "go",
            Self::Rust => "rust",
            Self::Ruby => "ruby",
        }
    }

    /// Extensions (lowercase, without the dot) mapped to this language.
    #[must_use]
    pub fn extensions(self) -> &'static [&'static str] {
        match self {
            Self::Python => &["py"],
            Self::JavaScript => &["js", "jsx"],
            Self::TypeScript => &["ts"],
            Self::Tsx => &["tsx"],
            Self::Java => &["java"],
            Self::Cpp => &["cpp"],
            Self::C => &["c"],
            Self::Go => &["go"],
            Self::Rust => &["rs"],
            Self::Ruby => &["rb"],
        }
    }

    /// Tree-sitter grammar, or `None` when no grammar is compiled in.
    #[must_use]
    pub fn grammar(self) -> Option<Language> {
        match self {
            Self::Python => Some(tree_sitter_python::LANGUAGE.into()),
            Self::JavaScript => Some(tree_sitter_javascript::LANGUAGE.into()),
            Self::TypeScript => Some(tree_sitter_typescript::LANGUAGE_TYPESCRIPT.into()),
            Self::Tsx => Some(tree_sitter_typescript::LANGUAGE_TSX.into()),
            Self::Go => Some(tree_sitter_go::LANGUAGE.into()),
            Self::Rust => Some(tree_sitter_rust::LANGUAGE.into()),
            Self::Java | Self::Cpp | Self::C | Self::Ruby => None,
        }
    }

    /// Node kinds that become one chunk each during structural extraction.
    #[must_use]
    pub fn target_node_kinds(self) -> &'static [&'static str] {
        match self {
            Self::Python => &["function_definition", "class_definition"],
            Self::JavaScript | Self::TypeScript | Self::Tsx => &[
                "function_declaration",
                "class_declaration",
                "method_definition",
            ],
            Self::Java => &[
                "class_declaration",
                "interface_declaration",
                "method_declaration",
            ],
            Self::Go => &["function_declaration", "method_declaration"],
            Self::Rust => &[
                "function_item",
                "struct_item",
                "enum_item",
                "trait_item",
                "impl_item",
            ],
            Self::Cpp | Self::C => &[
                "function_definition",
                "class_specifier",
                "struct_specifier",
            ],
            Self::Ruby => &["method", "class", "module"],
        }
    }

    #[must_use]
    pub fn from_extension(ext: &str) -> Option<Lang> {
        let ext = ext.trim_start_matches('.').to_ascii_lowercase();
        Self::ALL
            .into_iter()
            .find(|lang| lang.extensions().contains(&ext.as_str()))
    }

    #[must_use]
    pub fn from_path(path: &Path) -> Option<Lang> {
        path.extension()
            .and_then(|e| e.to_str())
            .and_then(Self::from_extension)
    }
}

impl fmt::Display for Lang {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.id())
    }
}
