pub mod chat;
pub mod citations;
pub(crate) mod health;

pub use health::health_check;
