//! Streaming chat relay for retrieval-augmented chat APIs.
//!
//! The relay proxies an upstream SSE answer stream to the client, persists
//! exactly one assistant reply per turn, and keeps each conversation's
//! citations in a size-bounded cache.

pub mod api;
pub mod citations;
pub mod config;
pub mod db;
pub mod error;
pub mod models;
pub mod relay;
pub mod services;
pub mod upstream;
