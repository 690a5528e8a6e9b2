//! Core chat logic shared by the TUI, CLI, and HTTP surfaces.
//!
//! Everything here is independent of how it is displayed: message
//! reconciliation, interrupt handling, config diffs, and the optimizer.

pub mod debounce;
pub mod diff;
mod error;
pub mod interrupt;
pub mod keychain;
pub mod message;
pub mod optimizer;
pub mod reconcile;
pub mod state;
pub mod threads;

pub use error::{Error, Result};
