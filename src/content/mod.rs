//! Turns a pasted transcript into a page title, a date and Notion blocks.

pub mod blocks;
pub mod chat;
pub mod chunks;

pub use blocks::content_to_blocks;
pub use chat::{parse_chat, parse_iso_date, ParsedChat};
pub use chunks::{split_into_chunks, MAX_TEXT_LENGTH};
