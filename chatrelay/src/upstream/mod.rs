//! Client for the retrieval-augmented chat API the relay streams from.

mod client;

pub use client::{ByteStream, ChatUpstream, HttpChatUpstream, UpstreamRequest};
