//! Mod domain: the language-keyed affix dictionary, target-rule parsing,
//! recognized-text observation extraction, and per-session statistics.

mod dictionary;
pub use dictionary::*;
mod parser;
pub use parser::*;
mod stats;
pub use stats::*;
