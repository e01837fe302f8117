use anyhow::Context;

use ripple_infra::EngineConfig;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    ripple_observability::init();

    let config = EngineConfig::from_env().context("loading RIPPLE_* configuration")?;
    let rules_file = std::env::var("RIPPLE_RULES_FILE").ok();
    let services = ripple_api::app::build_services(&config, rules_file.as_deref())
        .context("wiring automation engine")?;

    let addr = config.bind_addr()?;
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("failed to bind {addr}"))?;
    tracing::info!(addr = %listener.local_addr()?, "listening");

    let engine = services.engine.clone();
    let app = ripple_api::app::build_app(services);
    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
        })
        .await?;

    engine.dispose();
    Ok(())
}
