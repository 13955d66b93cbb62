use tgmirror::config::Config;
use tracing::info;

fn init_logging() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing::Level::INFO.into()),
        )
        .init();
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_logging();

    let config = Config::load()?;
    info!("tgmirror v{} starting", env!("CARGO_PKG_VERSION"));

    tgmirror::runtime::run(config).await
}
