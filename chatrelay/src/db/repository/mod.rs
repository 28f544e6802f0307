mod conversations;
mod messages;

pub use conversations::ConversationRepository;
pub use messages::MessageRepository;
