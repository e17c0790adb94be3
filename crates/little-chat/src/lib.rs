//! A terminal chat client built on top of `little-chat-core`.
//!
//! The crate includes a CLI tool for chatting in the terminal against a
//! canned reply source. The pieces the CLI is made of (the canned source,
//! input parsing, rendering and settings) are exposed as a library too.

#![deny(missing_docs)]

#[macro_use]
extern crate tracing;

mod canned;
pub mod command;
pub mod render;
mod settings;

pub use canned::{CannedReplySource, SimulatedFailure};
pub use settings::Settings;

/// Re-exports of [`little_chat_core`] crate.
pub mod core {
    pub use little_chat_core::*;
}
