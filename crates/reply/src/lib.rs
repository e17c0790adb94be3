//! The boundary between the conversation core and whatever produces
//! assistant replies.
//!
//! A reply source receives a prompt and eventually resolves to one
//! complete reply string, or fails. How the string is produced (a canned
//! table, a scripted fixture, a remote model) is entirely up to the
//! implementor; the core only relies on eventual resolution.
//!
//! Types in this crate don't define any behavior, instead they are the
//! constraints that the implementors should adhere to.

#![deny(missing_docs)]

mod error;
mod source;

pub use error::*;
pub use source::*;
