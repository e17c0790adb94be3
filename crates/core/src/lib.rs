//! Core logic of the chat client: the transcript, the streaming reveal of
//! assistant replies, persistence, and the controller that drives turns.

#![deny(missing_docs)]
#![deny(clippy::missing_safety_doc)]

#[macro_use]
extern crate tracing;

mod config;
mod controller;
pub mod emitter;
mod id;
pub mod message;
pub mod persistence;
mod reply_client;
pub mod store;

pub use config::{ChatConfig, ChatConfigBuilder, DEFAULT_FAILURE_MESSAGE};
pub use controller::{
    ChatSnapshot, ClearRequest, Controller, ControllerBuilder,
    ControllerGone, Notice, Phase, Rejection,
};
pub use id::{IdGenerator, SequentialGenerator, UuidGenerator};
pub use message::{Message, MessageId, MessageView, Role};
