pub mod callback_handler;
pub mod channel_post_handler;
pub mod command_handler;

pub use callback_handler::CallbackHandler;
pub use channel_post_handler::ChannelPostHandler;
pub use command_handler::CommandHandler;
