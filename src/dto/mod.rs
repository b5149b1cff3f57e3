pub mod access_window_dto;
pub mod telegram_dto;
