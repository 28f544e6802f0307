mod chat;

pub use chat::{ChatTurn, ChatTurnController, ChatTurnRequest};
