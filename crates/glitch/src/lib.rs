//! GLITCH core library: twisted house rules, dealt one card at a time.

pub mod capture;
pub mod client;
pub mod messages;
pub mod parse;
pub mod prompt;
pub mod supplier;
pub mod types;

pub use capture::{is_supported_format, PhotoPayload};
pub use client::{
    choose_model, ClientConfig, GenerationClient, RuleSource, DEFAULT_BASE_URL, DEFAULT_MODEL,
};
pub use messages::{Locale, Messages};
pub use parse::{parse_batch, sanitize_rule, BatchOutcome, UNKNOWN_GAME_SENTINEL};
pub use prompt::build_prompt;
pub use supplier::{RuleSupplier, SupplierTiming};
pub use types::*;
