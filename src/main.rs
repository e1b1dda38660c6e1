use tokenvault::logger::*;
use tokenvault::server::*;
use tokenvault::settings::*;
use tokio::signal;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let logger = Logger::new_bootstrap();

    let project_settings = parse_settings(cli.settings.as_deref())?;
    info!(?project_settings);
    let logger_config = LogConfig::resolve(&project_settings.log, cli.log_filter.as_deref());
    logger.reload_from_config(&logger_config)?;

    let server = Server::try_new(&project_settings).await?;

    signal::ctrl_c().await?;
    info!("ctrl-c received");

    let shutdown_timeout = std::time::Duration::from_secs(30);
    match tokio::time::timeout(shutdown_timeout, server.shutdown()).await {
        Ok(_) => tracing::info!("server shutdown successfully"),
        Err(_) => tracing::error!("server shutdown timed out"),
    }

    Ok(())
}
