use busline_api::config::AppConfig;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    busline_observability::init();

    let config = AppConfig::from_env()?;
    let services = busline_api::app::services::build_services(&config).await?;
    let app = busline_api::app::build_app(config.jwt_secret.clone(), services);

    let listener = tokio::net::TcpListener::bind(&config.bind_addr).await?;

    tracing::info!("listening on {}", listener.local_addr()?);

    axum::serve(listener, app).await?;
    Ok(())
}
