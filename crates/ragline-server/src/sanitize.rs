//! Cleaning of streamed model output before it goes on the wire

use lazy_static::lazy_static;
use ragline_core::{Content, ContentBlock};
use regex::Regex;

/// Control markup some models leak into their output
const SENTINEL_TOKENS: [&str; 4] = [
    "<|start_header_id|>",
    "<|end_header_id|>",
    "<|start|>",
    "<|end|>",
];

lazy_static! {
    static ref ANSI_ESCAPE: Regex = Regex::new(r"\x1B(?:[@-Z\\-_]|\[[0-?]*[ -/]*[@-~])").unwrap();
}

/// A content block that cannot be turned into display text
#[derive(Debug, thiserror::Error)]
pub enum FragmentError {
    #[error("text block without string text: {0}")]
    MalformedText(serde_json::Value),
}

/// Text pieces of one streamed fragment
///
/// Text blocks contribute their text, other blocks their JSON. A block typed
/// `text` that failed to parse as one yields an `Err` for that piece only.
pub fn fragment_texts(content: &Content) -> Vec<Result<String, FragmentError>> {
    match content {
        Content::Text(text) => vec![Ok(text.clone())],
        Content::Blocks(blocks) => blocks
            .iter()
            .map(|block| match block {
                ContentBlock::Text { text } => Ok(text.clone()),
                ContentBlock::Other(value) if value.get("type").and_then(|t| t.as_str()) == Some("text") => {
                    Err(FragmentError::MalformedText(value.clone()))
                }
                ContentBlock::Other(value) => Ok(value.to_string()),
            })
            .collect(),
    }
}

/// Strip sentinel tokens and terminal escapes; carriage returns become newlines
///
/// Removal repeats until nothing changes, since cutting one token or escape
/// can join its neighbours into another sentinel.
pub fn clean_fragment(raw: &str) -> String {
    let mut content = raw.replace("\r\n", "\n").replace('\r', "\n");
    loop {
        let mut cleaned = ANSI_ESCAPE.replace_all(&content, "").into_owned();
        for token in SENTINEL_TOKENS {
            cleaned = cleaned.replace(token, "");
        }
        if cleaned == content {
            return cleaned;
        }
        content = cleaned;
    }
}
