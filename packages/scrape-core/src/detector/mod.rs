pub mod antibot;

pub use antibot::{detect_blocked_response, detect_empty_parse};
