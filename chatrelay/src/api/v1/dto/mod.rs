//! v1 API wire types, kept apart from the domain models in `src/models/`.

pub mod chat;
pub mod citations;

pub use chat::*;
pub use citations::*;
