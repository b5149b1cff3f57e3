use edu_center_backend::{
    config::{get_config, init_config},
    database::pool::create_pool,
    routes, AppState,
};
use std::net::SocketAddr;
use std::time::Duration;
use tokio::net::TcpListener;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing::info;
use tracing_subscriber::EnvFilter;

const POLL_TIMEOUT_SECS: u64 = 30;

fn init_tracing(format: &str) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    if format.eq_ignore_ascii_case("json") {
        tracing_subscriber::fmt().with_env_filter(filter).json().init();
    } else {
        tracing_subscriber::fmt().with_env_filter(filter).init();
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_config()?;
    let config = get_config();
    init_tracing(&config.log_format);

    let pool = create_pool().await?;
    sqlx::migrate!("./migrations").run(&pool).await?;

    let app_state = AppState::new(pool);

    match (&config.telegram_webhook_url, &config.telegram_webhook_secret) {
        (Some(url), Some(secret)) => {
            let target = format!("{}/api/telegram/webhook", url.trim_end_matches('/'));
            match app_state.telegram.set_webhook(&target, secret).await {
                Ok(()) => info!(url = %target, "telegram webhook registered"),
                Err(e) => tracing::warn!(error = ?e, "failed to register telegram webhook"),
            }
        }
        _ => {
            if let Err(e) = app_state.telegram.delete_webhook().await {
                tracing::warn!(error = ?e, "failed to delete telegram webhook");
            }
            let state = app_state.clone();
            tokio::spawn(async move {
                info!("telegram long polling started");
                let mut offset: Option<i64> = None;
                loop {
                    match state.telegram.get_updates(offset, POLL_TIMEOUT_SECS).await {
                        Ok(updates) => {
                            for update in updates {
                                offset = Some(update.update_id + 1);
                                let update_id = update.update_id;
                                if let Err(e) = state.bot_service.handle_update(update).await {
                                    tracing::error!(update_id, error = ?e, "failed to handle telegram update");
                                }
                            }
                        }
                        Err(e) => {
                            tracing::error!(error = ?e, "telegram polling error");
                            tokio::time::sleep(Duration::from_secs(2)).await;
                        }
                    }
                }
            });
        }
    }

    let app = routes::app_router(app_state, config.public_rps)
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http());

    let addr: SocketAddr = config.server_address.parse()?;
    info!("Server listening on {}", addr);
    let listener = TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
