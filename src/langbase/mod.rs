//! Langbase Pipes client, the default inference backend.

mod client;
mod types;

#[cfg(test)]
#[path = "types_tests.rs"]
mod types_tests;

pub use client::LangbaseClient;
pub use types::*;
