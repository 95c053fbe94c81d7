//! Document loading, cleaning, chunking and noise filtering

use async_trait::async_trait;
use pulldown_cmark::{Event, Parser, TagEnd};
use regex::Regex;
use scraper::Html;
use std::collections::VecDeque;
use std::path::{Path, PathBuf};
use tokio::process::Command;

use kbqa_core::{Chunk, Error, IngestConfig, Ingestor, Result};

const SEPARATORS: [&str; 6] = ["\n\n", "\n", "。", ". ", " ", ""];
const SUPPORTED_EXTENSIONS: [&str; 6] = ["pdf", "txt", "md", "markdown", "html", "htm"];

fn char_len(text: &str) -> usize {
    text.chars().count()
}

/// Recursive-separator splitter over character lengths
#[derive(Debug, Clone)]
pub struct TextSplitter {
    chunk_size: usize,
    chunk_overlap: usize,
}

impl TextSplitter {
    pub fn new(chunk_size: usize, chunk_overlap: usize) -> Result<Self> {
        if chunk_size == 0 {
            return Err(Error::Configuration("chunk_size must be positive".to_string()));
        }
        if chunk_overlap >= chunk_size {
            return Err(Error::Configuration(format!(
                "chunk_overlap ({}) must be smaller than chunk_size ({})",
                chunk_overlap, chunk_size
            )));
        }
        Ok(Self {
            chunk_size,
            chunk_overlap,
        })
    }

    /// Chunks with their character offset in `text`, when it can be located
    pub fn split(&self, text: &str) -> Vec<(Option<usize>, String)> {
        let mut search_from = 0usize;
        let mut out = Vec::new();

        for chunk in self.split_recursive(text, &SEPARATORS) {
            let found = text[search_from..]
                .find(chunk.as_str())
                .map(|i| i + search_from)
                .or_else(|| text.find(chunk.as_str()));
            let start = found.map(|byte| {
                search_from = byte + text[byte..].chars().next().map_or(0, char::len_utf8);
                char_len(&text[..byte])
            });
            out.push((start, chunk));
        }
        out
    }

    fn split_recursive(&self, text: &str, separators: &[&str]) -> Vec<String> {
        let (separator, rest) = match separators
            .iter()
            .position(|s| s.is_empty() || text.contains(s))
        {
            Some(i) => (separators[i], &separators[i + 1..]),
            None => ("", &separators[separators.len()..]),
        };

        let pieces: Vec<String> = if separator.is_empty() {
            text.chars().map(String::from).collect()
        } else {
            text.split(separator)
                .filter(|p| !p.is_empty())
                .map(str::to_string)
                .collect()
        };

        let mut chunks = Vec::new();
        let mut pending: Vec<String> = Vec::new();
        for piece in pieces {
            if char_len(&piece) <= self.chunk_size {
                pending.push(piece);
                continue;
            }
            if !pending.is_empty() {
                chunks.extend(self.merge(&pending, separator));
                pending.clear();
            }
            if rest.is_empty() {
                chunks.push(piece);
            } else {
                chunks.extend(self.split_recursive(&piece, rest));
            }
        }
        if !pending.is_empty() {
            chunks.extend(self.merge(&pending, separator));
        }
        chunks
    }

    /// Greedily pack pieces up to `chunk_size`, carrying up to `chunk_overlap` into the next chunk
    fn merge(&self, pieces: &[String], separator: &str) -> Vec<String> {
        let sep_len = char_len(separator);
        let mut docs = Vec::new();
        let mut current: VecDeque<&str> = VecDeque::new();
        let mut total = 0usize;

        for piece in pieces {
            let len = char_len(piece);
            let joined = |current: &VecDeque<&str>| if current.is_empty() { 0 } else { sep_len };

            if total + len + joined(&current) > self.chunk_size && !current.is_empty() {
                push_joined(&mut docs, &current, separator);
                while let Some(first) = current.front() {
                    let over_overlap = total > self.chunk_overlap;
                    let still_too_big = total + len + joined(&current) > self.chunk_size;
                    if !(over_overlap || still_too_big) {
                        break;
                    }
                    total -= char_len(first) + if current.len() > 1 { sep_len } else { 0 };
                    current.pop_front();
                }
            }

            current.push_back(piece.as_str());
            total += len + if current.len() > 1 { sep_len } else { 0 };
        }

        push_joined(&mut docs, &current, separator);
        docs
    }
}

fn push_joined(docs: &mut Vec<String>, current: &VecDeque<&str>, separator: &str) {
    let joined = current.iter().copied().collect::<Vec<_>>().join(separator);
    let trimmed = joined.trim();
    if !trimmed.is_empty() {
        docs.push(trimmed.to_string());
    }
}

/// One page (or whole text file) before splitting
#[derive(Debug, Clone)]
struct Page {
    text: String,
    source: String,
    page: Option<u32>,
}

/// Loads `.pdf`, `.txt`, `.md` and `.html` sources into filtered chunks
pub struct DocumentIngestor {
    config: IngestConfig,
    splitter: TextSplitter,
    hyphen_break: Regex,
    blanks: Regex,
    dotted_leader: Regex,
    dot_run: Regex,
    trailing_page_number: Regex,
}

impl DocumentIngestor {
    pub fn new(config: IngestConfig) -> Result<Self> {
        let splitter = TextSplitter::new(config.chunk_size, config.chunk_overlap)?;
        let compile = |pattern: &str| {
            Regex::new(pattern)
                .map_err(|e| Error::Configuration(format!("Invalid pattern {}: {}", pattern, e)))
        };

        Ok(Self {
            config,
            splitter,
            hyphen_break: compile(r"-\s*\n\s*")?,
            blanks: compile(r"[ \t]+")?,
            dotted_leader: compile(r"(\.\s*){20,}")?,
            dot_run: compile(r"\.{8,}")?,
            trailing_page_number: compile(r"\s\d{1,4}\s*$")?,
        })
    }

    pub fn config(&self) -> &IngestConfig {
        &self.config
    }

    /// Normalize extracted page text into a single line
    pub fn clean_page(&self, raw: &str) -> String {
        let text = raw.replace(['\u{a0}', '\u{200b}'], " ").replace('\r', "");
        let text = self.hyphen_break.replace_all(&text, "");
        let text = text.replace('\n', " ");
        self.blanks.replace_all(&text, " ").trim().to_string()
    }

    /// Table-of-contents leaders, title pages and similar low-information text
    pub fn is_noise(&self, content: &str) -> bool {
        let text = content.trim();
        if text.is_empty() {
            return true;
        }
        if self.dotted_leader.is_match(text) || self.dot_run.is_match(text) {
            return true;
        }

        let upper = text.to_uppercase();
        let len = char_len(text);
        if (text.contains("目录") || upper.contains("CONTENTS")) && len < 1500 {
            return true;
        }
        if upper.contains("CHAPTER") && len < 400 {
            return true;
        }

        let dot_ratio = text.matches('.').count() as f32 / len.max(1) as f32;
        dot_ratio > 0.18 && self.trailing_page_number.is_match(text)
    }

    fn split_page(&self, page: &Page) -> Vec<Chunk> {
        self.splitter
            .split(&page.text)
            .into_iter()
            .filter_map(|(start, content)| {
                let content = content.trim();
                if char_len(content) < self.config.min_chunk_chars || self.is_noise(content) {
                    return None;
                }
                let mut chunk = Chunk::new(content, page.source.clone());
                if let Some(number) = page.page {
                    chunk = chunk.with_page(number);
                }
                if let Some(start) = start {
                    chunk = chunk.with_start_index(start);
                }
                Some(chunk)
            })
            .collect()
    }

    async fn load_file(&self, path: &Path) -> Result<Vec<Page>> {
        let source = path.display().to_string();
        let raw_pages: Vec<(Option<u32>, String)> = match extension(path).as_deref() {
            Some("pdf") => extract_pdf_pages(path)
                .await?
                .into_iter()
                .enumerate()
                .map(|(i, text)| (Some(i as u32 + 1), text))
                .collect(),
            Some("md") | Some("markdown") => {
                let content = tokio::fs::read_to_string(path).await?;
                vec![(None, markdown_to_text(&content))]
            }
            Some("html") | Some("htm") => {
                let content = tokio::fs::read_to_string(path).await?;
                vec![(None, html_to_text(&content))]
            }
            _ => vec![(None, tokio::fs::read_to_string(path).await?)],
        };

        Ok(raw_pages
            .into_iter()
            .map(|(page, raw)| Page {
                text: self.clean_page(&raw),
                source: source.clone(),
                page,
            })
            .filter(|page| char_len(&page.text) >= self.config.min_page_chars)
            .collect())
    }
}

fn extension(path: &Path) -> Option<String> {
    path.extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_lowercase())
}

fn is_supported(path: &Path) -> bool {
    extension(path).is_some_and(|ext| SUPPORTED_EXTENSIONS.contains(&ext.as_str()))
}

/// Files named directly plus the supported files directly inside named directories
fn collect_files(paths: &[PathBuf]) -> Vec<PathBuf> {
    let mut files = Vec::new();
    for path in paths {
        if path.is_dir() {
            let mut entries: Vec<PathBuf> = match std::fs::read_dir(path) {
                Ok(entries) => entries
                    .filter_map(|entry| entry.ok().map(|e| e.path()))
                    .filter(|p| p.is_file() && is_supported(p))
                    .collect(),
                Err(e) => {
                    tracing::warn!(path = %path.display(), error = %e, "cannot read directory");
                    continue;
                }
            };
            entries.sort();
            files.extend(entries);
        } else if path.is_file() && is_supported(path) {
            files.push(path.clone());
        } else {
            tracing::warn!(path = %path.display(), "skipping unsupported path");
        }
    }
    files
}

/// Page texts from the `pdftotext` tool (poppler), split on form feeds
async fn extract_pdf_pages(path: &Path) -> Result<Vec<String>> {
    let output = Command::new("pdftotext")
        .arg("-enc")
        .arg("UTF-8")
        .arg(path)
        .arg("-")
        .output()
        .await
        .map_err(|e| {
            Error::Ingest(format!("pdftotext could not run: {} (is poppler installed?)", e))
        })?;

    if !output.status.success() {
        return Err(Error::Ingest(format!(
            "pdftotext failed for {}: {}",
            path.display(),
            String::from_utf8_lossy(&output.stderr).trim()
        )));
    }

    let text = String::from_utf8_lossy(&output.stdout);
    Ok(text.split('\u{c}').map(str::to_string).collect())
}

/// Plain text of a Markdown document, one line per block
pub fn markdown_to_text(markdown: &str) -> String {
    let mut text = String::new();
    for event in Parser::new(markdown) {
        match event {
            Event::Text(t) | Event::Code(t) => text.push_str(&t),
            Event::SoftBreak => text.push(' '),
            Event::HardBreak
            | Event::End(TagEnd::Paragraph)
            | Event::End(TagEnd::Heading(_))
            | Event::End(TagEnd::Item)
            | Event::End(TagEnd::CodeBlock) => text.push('\n'),
            _ => {}
        }
    }
    text
}

/// Visible text of an HTML document, skipping `head`, `script` and `style`
pub fn html_to_text(html: &str) -> String {
    let document = Html::parse_document(html);
    let mut parts = Vec::new();
    for node in document.tree.nodes() {
        let Some(text) = node.value().as_text() else {
            continue;
        };
        let hidden = node.ancestors().any(|ancestor| {
            ancestor
                .value()
                .as_element()
                .is_some_and(|e| matches!(e.name(), "head" | "script" | "style"))
        });
        let trimmed = text.trim();
        if !hidden && !trimmed.is_empty() {
            parts.push(trimmed.to_string());
        }
    }
    parts.join("\n")
}

#[async_trait]
impl Ingestor for DocumentIngestor {
    async fn ingest(&self, paths: &[PathBuf]) -> Result<Vec<Chunk>> {
        let files = collect_files(paths);
        tracing::info!(files = files.len(), "loading documents");

        let mut pages = Vec::new();
        for file in &files {
            match self.load_file(file).await {
                Ok(loaded) => pages.extend(loaded),
                Err(e) => tracing::warn!(path = %file.display(), error = %e, "skipping document"),
            }
        }
        if pages.is_empty() {
            tracing::info!("no document pages loaded");
            return Ok(Vec::new());
        }

        let chunks: Vec<Chunk> = pages.iter().flat_map(|page| self.split_page(page)).collect();
        tracing::info!(pages = pages.len(), chunks = chunks.len(), "split documents");
        Ok(chunks)
    }
}
