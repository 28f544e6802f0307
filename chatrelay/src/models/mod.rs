mod citation;
mod conversation;

pub use citation::*;
pub use conversation::*;
