/// Notion rejects rich text runs longer than this many characters.
pub const MAX_TEXT_LENGTH: usize = 2000;

const NEWLINE_LOOKBACK: usize = 100;

/// Splits `content` into pieces of at most `max_length` characters, preferring
/// to cut right after a newline found in the last 100 characters of a piece.
pub fn split_into_chunks(content: &str, max_length: usize) -> Vec<String> {
    let chars: Vec<char> = content.chars().collect();
    if chars.len() <= max_length || max_length == 0 {
        return vec![content.to_string()];
    }

    let mut chunks = Vec::new();
    let mut position = 0usize;
    while position < chars.len() {
        let mut end = position + max_length;
        if end < chars.len() {
            let search_start = position.max(end.saturating_sub(NEWLINE_LOOKBACK));
            if let Some(offset) = chars[search_start..end].iter().rposition(|c| *c == '\n') {
                let newline = search_start + offset;
                if newline > position {
                    end = newline + 1;
                }
            }
        } else {
            end = chars.len();
        }

        chunks.push(chars[position..end].iter().collect());
        position = end;
    }
    chunks
}
