//! Anonymous chats between matched users.

pub mod contact;
pub mod proxy;
pub mod relay;

pub use contact::{request_contact, resolve_contact, ContactCallback};
pub use proxy::relay_message;
pub use relay::{active_chat, block_user, end_chat, my_matches, report, start_chat, ActiveChat};
