pub mod config;
pub mod database;
pub mod dto;
pub mod error;
pub mod middleware;
pub mod models;
pub mod routes;
pub mod services;
pub mod store;
pub mod utils;

use std::sync::Arc;

use crate::services::{
    access_window_service::AccessWindowService,
    bot_repository::PgBotRepository,
    bot_service::{BotService, BotSettings},
    debt_service::DebtService,
    group_access_service::GroupAccessController,
    session_store::MemorySessionStore,
    telegram_service::TelegramClient,
};
use crate::store::PgWindowStore;
use sqlx::PgPool;

#[derive(Clone)]
pub struct AppState {
    pub pool: PgPool,
    pub telegram: TelegramClient,
    pub window_service: AccessWindowService,
    pub group_access: GroupAccessController,
    pub debt_service: DebtService,
    pub bot_service: BotService,
}

impl AppState {
    pub fn new(pool: PgPool) -> Self {
        let config = crate::config::get_config();

        let telegram = TelegramClient::new(&config.telegram_bot_token);
        let window_service = AccessWindowService::new(
            Arc::new(PgWindowStore::new(pool.clone())),
            config.allow_partial_submissions,
        );
        let group_access = GroupAccessController::new(Arc::new(telegram.clone()));
        let debt_service = DebtService::new(pool.clone());
        let bot_service = BotService::new(
            Arc::new(telegram.clone()),
            Arc::new(MemorySessionStore::new()),
            Arc::new(PgBotRepository::new(pool.clone(), debt_service.clone())),
            window_service.clone(),
            group_access.clone(),
            BotSettings {
                web_base_url: config.web_base_url.clone(),
                admin_contact: config.admin_contact.clone(),
            },
        );

        Self {
            pool,
            telegram,
            window_service,
            group_access,
            debt_service,
            bot_service,
        }
    }
}
