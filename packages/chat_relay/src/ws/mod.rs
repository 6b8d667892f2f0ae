pub mod handler;
pub mod protocol;

pub use handler::handle_chat_ws;
pub use protocol::{ClientFrame, ServerEvent, ServerFrame};
