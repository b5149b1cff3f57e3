pub mod phone;
pub mod telegram_link;
pub mod time;
