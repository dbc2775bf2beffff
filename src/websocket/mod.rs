pub mod handler;
pub mod msg_chat_handler;
pub mod msg_learning_handler;
pub mod msg_presence_handler;
pub mod msg_relay_handler;
pub mod msg_sync_handler;
pub mod msg_typing_handler;
