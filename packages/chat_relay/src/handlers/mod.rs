pub mod callback;
pub mod health;
pub mod messages;
pub mod websocket;

// Re-export all handlers for easy route registration
pub use callback::message_callback_handler;
pub use health::{health_handler, health_live_handler, health_ready_handler, metrics_handler};
pub use messages::{create_message_handler, get_message_handler};
pub use websocket::chat_websocket_handler;
