//! Terminal front end helpers for KBQA

mod ui;

pub use ui::{
    display_banner, format_hits, format_index_report, format_trace, handle_input_with_history,
    key_action, parse_chat_input, print_answer, print_help, ChatInput, KeyAction, LineEditor,
};

// Re-export core types
pub use kbqa_core::{Error, Result};
