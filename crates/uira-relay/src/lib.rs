//! Uira Relay - OpenAI-compatible chat completions relay.
//!
//! Clients speak the OpenAI `/v1/chat/completions` API. This crate exposes the
//! same surface and forwards each request to another provider's
//! OpenAI-compatible endpoint (NVIDIA NIM by default).
//!
//! Design goals:
//! - Remap well-known model names onto upstream model ids.
//! - Remove provider reasoning fields (`reasoning`, `reasoning_content`) from
//!   responses, optionally folding them into visible content instead.
//! - Optionally strip inline `<think>` sections and leading narrative from
//!   the visible content.
//! - Re-frame upstream SSE streams line by line without reordering events.

pub mod config;
pub mod error;
pub mod filter;
pub mod models;
pub mod server;
pub mod streaming;
pub mod translation;
pub mod types;

pub use config::RelayConfig;
pub use error::RelayError;
pub use server::serve;
pub use streaming::Reframer;
