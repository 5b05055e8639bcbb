//! Telegram Bot API integration.

mod client;
mod poller;
mod types;

pub use client::TelegramTransport;
pub use poller::{Poller, UpdateSource};
pub use types::{Message, Update, User, Video};
