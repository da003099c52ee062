use anyhow::Context;
use dotenv::dotenv;
use env_logger::Env;

use chat_relay::app::create_router;
use chat_relay::config::RelayConfig;
use chat_relay::state::AppState;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenv().ok();
    env_logger::init_from_env(Env::default().default_filter_or("info"));

    let config = RelayConfig::from_env().context("failed to read relay configuration")?;
    let addr = config.site_addr;

    log::info!(
        "Relaying chats to {} (auth policy: {:?})",
        config.upstream_url(&config.chat_path),
        config.auth_policy
    );

    let app_state = AppState::new(config).context("failed to build upstream client")?;
    let app = create_router(app_state);

    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("failed to bind {addr}"))?;
    log::info!("listening on http://{}", &addr);
    axum::serve(listener, app).await?;

    Ok(())
}
