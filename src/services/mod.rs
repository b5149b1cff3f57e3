pub mod access_window_service;
pub mod answer_parser;
pub mod audit_service;
pub mod bot_repository;
pub mod bot_service;
pub mod bot_texts;
pub mod debt_service;
pub mod group_access_service;
pub mod scoring_service;
pub mod session_store;
pub mod telegram_service;
