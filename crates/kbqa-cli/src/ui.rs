//! UI utilities for the CLI

use colored::*;
use crossterm::{
    cursor::{MoveToColumn, RestorePosition, SavePosition},
    event::{self, Event, KeyCode, KeyEvent, KeyEventKind, KeyModifiers},
    queue,
    style::Print,
    terminal::{disable_raw_mode, enable_raw_mode, size, Clear, ClearType},
};
use std::io::{self, IsTerminal, Write};

use kbqa_core::{Result, SearchHit};
use kbqa_rag::{truncate_chars, AnswerTrace, IndexReport, Outcome};

const PROMPT: &str = "kbqa>";

/// Display startup banner
pub fn display_banner(model: &str, records: usize) {
    let terminal_width = size().map(|(w, _)| w as usize).unwrap_or(80);
    let banner_width = std::cmp::min(67, terminal_width.saturating_sub(4)).max(40);

    let top_border = format!("┌{}┐", "─".repeat(banner_width - 2));
    let bottom_border = format!("└{}┘", "─".repeat(banner_width - 2));
    let empty_line = format!("│{}│", " ".repeat(banner_width - 2));

    println!();
    println!("{}", top_border.blue());
    println!("{}", empty_line.blue());

    let title = "KBQA - Knowledge Base Question Answering";
    println!(
        "│  {}{}│",
        title.blue().bold(),
        " ".repeat(banner_width.saturating_sub(title.len() + 4))
    );
    println!("{}", empty_line.blue());

    let model_line = format!("Model: {}", model);
    let records_line = format!("Indexed chunks: {}", records);
    let feature_lines = [
        "Adaptive multi-round retrieval",
        "Synonym-aware search (CN/EN)",
        "Command history (Up/Down arrows)",
        "",
        model_line.as_str(),
        records_line.as_str(),
    ];

    for line in feature_lines {
        if line.is_empty() {
            println!("{}", empty_line.blue());
            continue;
        }
        let width = line.chars().count();
        let content = format!(
            "│  {}{}│",
            line,
            " ".repeat(banner_width.saturating_sub(width + 4))
        );
        println!("{}", content.blue());
    }

    println!("{}", empty_line.blue());
    println!("{}", bottom_border.blue());
    println!();
    println!("{}", "Tip: ask a question about your documents, or 'help' for commands".dimmed());
    println!();
}

/// Line buffer with a character cursor and history browsing
#[derive(Debug, Default)]
pub struct LineEditor {
    chars: Vec<char>,
    cursor: usize,
    history_index: Option<usize>,
}

impl LineEditor {
    pub fn text(&self) -> String {
        self.chars.iter().collect()
    }

    pub fn insert(&mut self, c: char) {
        self.chars.insert(self.cursor, c);
        self.cursor += 1;
    }

    pub fn backspace(&mut self) -> bool {
        if self.cursor == 0 {
            return false;
        }
        self.cursor -= 1;
        self.chars.remove(self.cursor);
        true
    }

    pub fn left(&mut self) {
        self.cursor = self.cursor.saturating_sub(1);
    }

    pub fn right(&mut self) {
        self.cursor = (self.cursor + 1).min(self.chars.len());
    }

    /// Text left of the cursor
    pub fn head(&self) -> String {
        self.chars[..self.cursor].iter().collect()
    }

    /// Text right of the cursor
    pub fn tail(&self) -> String {
        self.chars[self.cursor..].iter().collect()
    }

    fn replace(&mut self, text: &str) {
        self.chars = text.chars().collect();
        self.cursor = self.chars.len();
    }

    /// Step to an older entry; stays on the oldest
    pub fn history_up(&mut self, history: &[String]) -> bool {
        if history.is_empty() {
            return false;
        }
        let index = match self.history_index {
            None => history.len() - 1,
            Some(idx) => idx.saturating_sub(1),
        };
        self.history_index = Some(index);
        self.replace(&history[index]);
        true
    }

    /// Step to a newer entry; past the newest the line is cleared
    pub fn history_down(&mut self, history: &[String]) -> bool {
        let Some(idx) = self.history_index else {
            return false;
        };
        if idx + 1 < history.len() {
            self.history_index = Some(idx + 1);
            self.replace(&history[idx + 1]);
        } else {
            self.history_index = None;
            self.replace("");
        }
        true
    }
}

/// What a key press does to the line being edited
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyAction {
    Submit,
    Cancel,
    Quit,
    Insert(char),
    Backspace,
    Left,
    Right,
    HistoryUp,
    HistoryDown,
    Ignore,
}

pub fn key_action(key: &KeyEvent) -> KeyAction {
    if key.kind != KeyEventKind::Press {
        return KeyAction::Ignore;
    }
    match key.code {
        KeyCode::Char('c' | 'd') if key.modifiers.contains(KeyModifiers::CONTROL) => {
            KeyAction::Quit
        }
        KeyCode::Char(_) if key.modifiers.contains(KeyModifiers::CONTROL) => KeyAction::Ignore,
        KeyCode::Char(c) => KeyAction::Insert(c),
        KeyCode::Enter => KeyAction::Submit,
        KeyCode::Esc => KeyAction::Cancel,
        KeyCode::Backspace => KeyAction::Backspace,
        KeyCode::Left => KeyAction::Left,
        KeyCode::Right => KeyAction::Right,
        KeyCode::Up => KeyAction::HistoryUp,
        KeyCode::Down => KeyAction::HistoryDown,
        _ => KeyAction::Ignore,
    }
}

// The terminal places the cursor after the head itself, so wide CJK glyphs land right
fn redraw(editor: &LineEditor) -> io::Result<()> {
    let mut stdout = io::stdout();
    queue!(
        stdout,
        MoveToColumn(0),
        Clear(ClearType::CurrentLine),
        Print(format!("{} {}", PROMPT.green().bold(), editor.head())),
        SavePosition,
        Print(editor.tail()),
        RestorePosition
    )?;
    stdout.flush()
}

/// Read one line, with ↑/↓ history when stdin is a terminal
pub async fn handle_input_with_history(history: &mut Vec<String>) -> Result<String> {
    if !io::stdin().is_terminal() {
        let mut input = String::new();
        if io::stdin().read_line(&mut input)? == 0 {
            // EOF
            return Ok("exit".to_string());
        }
        let input = input.trim().to_string();
        if !input.is_empty() {
            history.push(input.clone());
        }
        return Ok(input);
    }

    enable_raw_mode()?;
    let result = read_line_raw(history);
    disable_raw_mode()?;
    println!();

    // Ctrl+C / Ctrl+D
    let Some(line) = result? else {
        return Ok("exit".to_string());
    };
    let input = line.trim().to_string();
    if !input.is_empty() {
        history.push(input.clone());
    }
    Ok(input)
}

fn read_line_raw(history: &[String]) -> io::Result<Option<String>> {
    let mut editor = LineEditor::default();
    redraw(&editor)?;

    loop {
        let Event::Key(key_event) = event::read()? else {
            continue;
        };
        match key_action(&key_event) {
            KeyAction::Submit => return Ok(Some(editor.text())),
            KeyAction::Cancel => return Ok(Some(String::new())),
            KeyAction::Quit => return Ok(None),
            KeyAction::Insert(c) => editor.insert(c),
            KeyAction::Backspace => {
                editor.backspace();
            }
            KeyAction::Left => editor.left(),
            KeyAction::Right => editor.right(),
            KeyAction::HistoryUp => {
                editor.history_up(history);
            }
            KeyAction::HistoryDown => {
                editor.history_down(history);
            }
            KeyAction::Ignore => continue,
        }
        redraw(&editor)?;
    }
}

/// What the user typed at the chat prompt
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChatInput {
    Empty,
    Help,
    Exit,
    Question(String),
}

pub fn parse_chat_input(input: &str) -> ChatInput {
    let trimmed = input.trim();
    match trimmed.to_lowercase().as_str() {
        "" => ChatInput::Empty,
        "help" | "?" => ChatInput::Help,
        "exit" | "quit" => ChatInput::Exit,
        _ => ChatInput::Question(trimmed.to_string()),
    }
}

/// Display help message
pub fn print_help() {
    println!("{}", "Available commands:".bold());
    println!("  {} - Ask a question about the indexed documents", "<question>".green());
    println!("  {} - Show this help message", "help".green());
    println!("  {} - Exit the application", "exit/quit".green());
    println!();
    println!("{}", "Examples:".bold());
    println!("  什么是混淆电路？");
    println!("  How does oblivious transfer work?");
}

/// One line per retrieval round, plus the outcome
pub fn format_trace(trace: &AnswerTrace) -> String {
    let outcome = match trace.outcome {
        Outcome::Final => "answered",
        Outcome::Exhausted => "best effort",
        Outcome::Fallback => "fallback",
    };
    let mut lines: Vec<String> = trace
        .queries
        .iter()
        .enumerate()
        .map(|(i, query)| format!("round {}: {}", i + 1, query))
        .collect();
    lines.push(format!(
        "{} after {} round(s), {} chunk(s), {} model call(s)",
        outcome, trace.rounds, trace.chunks, trace.completion_calls
    ));
    lines.join("\n")
}

pub fn print_answer(answer: &str, trace: Option<&AnswerTrace>) {
    println!();
    println!("{}", answer);
    if let Some(trace) = trace {
        println!();
        println!("{}", format_trace(trace).dimmed());
    }
    println!();
}

/// Ranked search hits with a short preview of each
pub fn format_hits(hits: &[SearchHit], preview_chars: usize) -> String {
    if hits.is_empty() {
        return "No matching chunks.".to_string();
    }
    hits.iter()
        .enumerate()
        .map(|(i, hit)| {
            let location = match hit.chunk.page {
                Some(page) => format!("{} p.{}", hit.chunk.source, page),
                None => hit.chunk.source.clone(),
            };
            let preview = truncate_chars(&hit.chunk.content, preview_chars);
            let ellipsis = if preview.len() < hit.chunk.content.len() { "..." } else { "" };
            format!("{}. [{:.3}] {}\n   {}{}", i + 1, hit.score, location, preview, ellipsis)
        })
        .collect::<Vec<_>>()
        .join("\n")
}

pub fn format_index_report(report: &IndexReport) -> String {
    match report {
        IndexReport::Skipped { existing } => format!(
            "Index already holds {} chunk(s); skipped. \
             Use --force to re-index or --reset to rebuild.",
            existing
        ),
        IndexReport::NothingToIndex => "No indexable documents found.".to_string(),
        IndexReport::Indexed { written } => format!("Indexed {} chunk(s).", written),
    }
}
