use anyhow::Result;
use feedsync::config::Config;
use feedsync::daemon::Service;
use tracing::info;

pub async fn serve(mut config: Config, listen: Option<String>) -> Result<()> {
    if let Some(listen) = listen {
        config.http.listen_addr = listen;
        config.validate()?;
    }

    info!("Starting feedsync {}", env!("CARGO_PKG_VERSION"));
    let service = Service::start(config).await?;
    service.run().await
}
