//! Bounded rendering of retrieved chunks into prompt context

use kbqa_core::Chunk;

/// Character limits applied when chunks are rendered for the model
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ContextBudget {
    /// Per-chunk snippet limit
    pub snippet_chars: usize,
    /// Limit for the whole rendered context
    pub max_chars: usize,
}

impl Default for ContextBudget {
    fn default() -> Self {
        Self {
            snippet_chars: 1200,
            max_chars: 6000,
        }
    }
}

/// First `limit` characters of `text`
pub fn truncate_chars(text: &str, limit: usize) -> &str {
    match text.char_indices().nth(limit) {
        Some((byte_index, _)) => &text[..byte_index],
        None => text,
    }
}

/// `[i] source=<source> page=<page>` blocks with capped snippets, joined by blank lines
pub fn render_context(chunks: &[Chunk], budget: &ContextBudget) -> String {
    let parts: Vec<String> = chunks
        .iter()
        .enumerate()
        .map(|(i, chunk)| {
            format!(
                "[{}] source={} page={}\n{}",
                i + 1,
                chunk.source,
                chunk.page_label(),
                truncate_chars(&chunk.content, budget.snippet_chars)
            )
        })
        .collect();

    truncate_chars(&parts.join("\n\n"), budget.max_chars).to_string()
}

/// Same layout with full (trimmed) chunk contents, bounded only by `max_chars`
pub fn render_citations(chunks: &[Chunk], max_chars: usize) -> String {
    let parts: Vec<String> = chunks
        .iter()
        .enumerate()
        .map(|(i, chunk)| {
            format!(
                "[{}] source={} page={}\n{}",
                i + 1,
                chunk.source,
                chunk.page_label(),
                chunk.content.trim()
            )
        })
        .collect();

    truncate_chars(&parts.join("\n\n"), max_chars).to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_truncate_counts_characters() {
        assert_eq!(truncate_chars("混淆电路", 2), "混淆");
        assert_eq!(truncate_chars("abc", 10), "abc");
        assert_eq!(truncate_chars("abc", 0), "");
    }

    #[test]
    fn test_render_layout() {
        let chunks = vec![
            Chunk::new("Garbled circuits enable secure two-party computation.", "gc.pdf").with_page(3),
            Chunk::new("Plain notes", "notes.txt"),
        ];
        insta::assert_snapshot!(render_context(&chunks, &ContextBudget::default()), @r###"
        [1] source=gc.pdf page=3
        Garbled circuits enable secure two-party computation.

        [2] source=notes.txt page=
        Plain notes
        "###);
    }

    #[test]
    fn test_snippet_and_total_caps() {
        let chunks = vec![
            Chunk::new("x".repeat(50), "a.txt"),
            Chunk::new("y".repeat(50), "b.txt"),
        ];
        let budget = ContextBudget {
            snippet_chars: 10,
            max_chars: 40,
        };
        let rendered = render_context(&chunks, &budget);
        assert!(rendered.starts_with("[1] source=a.txt page=\nxxxxxxxxxx\n\n"));
        assert_eq!(rendered.chars().count(), 40);
    }

    #[test]
    fn test_empty_chunks_render_empty() {
        assert_eq!(render_context(&[], &ContextBudget::default()), "");
    }

    #[test]
    fn test_citations_keep_full_content() {
        let chunks = vec![Chunk::new(format!("  {}  ", "z".repeat(1500)), "long.txt")];
        let rendered = render_citations(&chunks, 7000);
        assert!(rendered.ends_with(&"z".repeat(1500)));
    }
}
