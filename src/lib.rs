//! Deep agent chat - terminal client for deep agents on a graph deployment.
//!
//! This library provides:
//! - a typed client for the remote graph-execution API
//! - chat session state (streaming, optimistic messages, interrupts)
//! - the terminal user interface (TUI) and CLI commands
//! - an HTTP API serving the derived views
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────┐  ┌─────────────┐  ┌─────────────┐
//! │     CLI     │  │     TUI     │  │   HTTP API  │
//! └──────┬──────┘  └──────┬──────┘  └──────┬──────┘
//!        │                │                │
//!        └────────┬───────┴────────────────┘
//!                 │
//!          ┌──────┴──────┐     ┌─────────────┐
//!          │ Chat + Core │────▶│   Client    │───▶ graph deployment
//!          └─────────────┘     └─────────────┘
//! ```

pub mod api;
pub mod chat;
pub mod cli;
pub mod client;
pub mod config;
pub mod core;
pub mod tui;

pub use config::Config;
