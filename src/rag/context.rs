//! Prompt text: retrieved snippets rendered for the model.
use crate::db::SearchHit;

pub const NO_CONTEXT: &str = "No relevant code found in the repository.";

pub const SYSTEM_PROMPT: &str = "You are an expert code assistant.";

const CONTEXT_HEADER: &str = "Here are the most relevant code snippets from the repository:\n";

/// One numbered section per hit, in the given order, or [`NO_CONTEXT`].
pub fn format_context(hits: &[SearchHit]) -> String {
    if hits.is_empty() {
        return NO_CONTEXT.to_string();
    }

    let mut parts = vec![CONTEXT_HEADER.to_string()];
    for (i, hit) in hits.iter().enumerate() {
        let meta = &hit.metadata;
        parts.push(format!(
            "\n--- Snippet {} (Relevance: {:.2}%) ---",
            i + 1,
            hit.similarity * 100.0
        ));
        parts.push(format!("File: {}", meta.file_path));
        parts.push(format!("Lines: {}", meta.line_range()));
        parts.push(format!("Language: {}", meta.language));
        parts.push(format!("\n```{}", meta.language));
        parts.push(hit.content.clone());
        parts.push("```\n".to_string());
    }
    parts.join("\n")
}

/// Single-turn prompt around the formatted context.
pub fn build_prompt(question: &str, context: &str) -> String {
    format!(
        "You are an expert code assistant helping developers understand their codebase.
You have access to code from their repository.

CONTEXT FROM REPOSITORY:
{context}

USER QUESTION:
{question}

Please provide a clear, helpful answer based on the code provided above.

Guidelines:
- Reference specific files and line numbers when relevant
- Explain the code logic clearly
- If the context doesn't contain enough information, say so
- Suggest related files or areas to explore if helpful
- Use code examples from the context when explaining
- Be concise but thorough

Answer:"
    )
}

/// System message that carries the context in multi-turn chat.
pub fn chat_system_message(context: &str) -> String {
    format!(
        "You are an expert code assistant. You have access to the user's codebase.

CURRENT CODEBASE CONTEXT:
{context}

Use this context to answer the user's questions about their code."
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::RecordMetadata;
    use crate::indexer::chunk::ChunkMetadata;

    fn hit(file: &str, similarity: f64) -> SearchHit {
        SearchHit {
            id: format!("{file}:1-2#abc"),
            content: "def f():\n    pass".to_string(),
            metadata: RecordMetadata {
                file_path: file.to_string(),
                start_line: 1,
                end_line: 2,
                language: "python".to_string(),
                chunk_type: "function_definition".to_string(),
                chunk: ChunkMetadata::default(),
            },
            similarity,
        }
    }

    #[test]
    fn test_empty_context_is_sentinel() {
        assert_eq!(format_context(&[]), NO_CONTEXT);
    }

    #[test]
    fn test_format_context_sections() {
        let context = format_context(&[hit("a.py", 0.8765), hit("b.py", 0.5)]);
        assert!(context.starts_with(CONTEXT_HEADER));
        assert!(context.contains("--- Snippet 1 (Relevance: 87.65%) ---\nFile: a.py\nLines: 1-2\nLanguage: python\n\n```python\ndef f():\n    pass\n```\n"));
        assert!(context.contains("--- Snippet 2 (Relevance: 50.00%) ---\nFile: b.py"));

        let first = context.find("a.py").unwrap();
        let second = context.find("b.py").unwrap();
        assert!(first < second);
    }

    #[test]
    fn test_prompt_embeds_context_and_question() {
        let prompt = build_prompt("Where is main?", "CTX");
        assert!(prompt.contains("CONTEXT FROM REPOSITORY:\nCTX\n"));
        assert!(prompt.contains("USER QUESTION:\nWhere is main?\n"));
        assert!(prompt.contains("Reference specific files and line numbers"));
        assert!(prompt.ends_with("Answer:"));
    }

    #[test]
    fn test_chat_system_message() {
        let msg = chat_system_message(NO_CONTEXT);
        assert!(msg.contains("CURRENT CODEBASE CONTEXT:\nNo relevant code found in the repository.\n"));
    }
}
