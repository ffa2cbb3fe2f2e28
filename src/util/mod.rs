//! Utility functions.

pub mod hash;
pub mod text;
pub mod time;

pub use hash::{sha256_hex, short_digest};
pub use text::word_count;
pub use time::{format_countdown, format_wait};
