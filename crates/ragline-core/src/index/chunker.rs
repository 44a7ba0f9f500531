//! Document splitting into overlapping windows

/// Default window size in bytes
pub const CHUNK_SIZE_CHARS: usize = 500;
/// Default overlap between consecutive windows in bytes
pub const CHUNK_OVERLAP_CHARS: usize = 100;

/// Break points tried in order, searched in the tail of each window
const SEPARATORS: [&str; 4] = ["\n\n", "\n", ". ", " "];

/// One window of a document
#[derive(Debug, Clone, PartialEq)]
pub struct TextWindow {
    pub text: String,
    /// Byte offset of the window within the document
    pub start: usize,
}

/// Find a valid char boundary at or before the given byte index
fn floor_char_boundary(s: &str, index: usize) -> usize {
    if index >= s.len() {
        return s.len();
    }
    let mut i = index;
    while i > 0 && !s.is_char_boundary(i) {
        i -= 1;
    }
    i
}

/// Find a valid char boundary at or after the given byte index
fn ceil_char_boundary(s: &str, index: usize) -> usize {
    if index >= s.len() {
        return s.len();
    }
    let mut i = index;
    while i < s.len() && !s.is_char_boundary(i) {
        i += 1;
    }
    i
}

/// Split `content` into windows of at most `chunk_size` bytes overlapping by `overlap`
///
/// Windows end on a natural break (paragraph, line, sentence, word) when one
/// exists in the last 30% of the window. Whitespace-only windows are dropped.
/// `overlap` must be smaller than `chunk_size`; the window start always
/// advances, so degenerate settings cannot loop forever.
pub fn split_text(content: &str, chunk_size: usize, overlap: usize) -> Vec<TextWindow> {
    if content.trim().is_empty() || chunk_size == 0 {
        return Vec::new();
    }

    if content.len() <= chunk_size {
        return vec![TextWindow {
            text: content.to_string(),
            start: 0,
        }];
    }

    let mut windows = Vec::new();
    let mut start = 0;

    while start < content.len() {
        let raw_end = (start + chunk_size).min(content.len());
        let end = floor_char_boundary(content, raw_end);
        let mut chunk_end = end;

        // Find natural break point in last 30%
        if end < content.len() {
            let search_start = ceil_char_boundary(content, start + (chunk_size * 70 / 100));

            if search_start < end {
                let search_region = &content[search_start..end];
                for sep in SEPARATORS {
                    if let Some(pos) = search_region.rfind(sep) {
                        chunk_end = search_start + pos + sep.len();
                        break;
                    }
                }
            }
        }

        // A single char wider than the window still has to make progress
        if chunk_end <= start {
            chunk_end = ceil_char_boundary(content, start + 1);
        }

        let text = &content[start..chunk_end];
        if !text.trim().is_empty() {
            windows.push(TextWindow {
                text: text.to_string(),
                start,
            });
        }

        if chunk_end >= content.len() {
            break;
        }

        let next_start = ceil_char_boundary(content, chunk_end.saturating_sub(overlap));
        start = if next_start > start {
            next_start
        } else {
            chunk_end
        };
    }

    windows
}
