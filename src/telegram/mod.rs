pub mod client;
pub mod dispatch;
pub mod ingress;
pub mod types;

pub use client::TelegramBot;
pub use dispatch::UpdateDispatcher;
pub use ingress::{PollingIngress, UpdateIngress, WebhookIngress};
pub use types::{InlineKeyboardButton, InlineKeyboardMarkup, Update};
