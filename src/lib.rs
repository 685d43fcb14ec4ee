#![allow(
    clippy::upper_case_acronyms,
    non_camel_case_types,
    clippy::missing_panics_doc,
    clippy::missing_errors_doc,
    clippy::cast_precision_loss,
    clippy::cast_possible_truncation
)]

pub mod cache;
pub mod config;
pub mod sim;
pub mod tag_array;
pub mod trace;
pub mod variable;

#[cfg(test)]
pub mod testing;

pub use config::Config;
pub use sim::{LevelOutcome, Outcome, Simulator};
pub use stats;

pub type address = u64;
