use std::sync::atomic::{AtomicBool, AtomicI64};
use std::sync::Arc;

use teloxide::Bot;
use tokio::sync::{mpsc, watch};
use tracing::info;

use crate::config::Config;
use crate::db::Database;
use crate::dedup::Deduplicator;
use crate::forwarder::Forwarder;
use crate::pipeline::PipelineRouter;
use crate::settings::Settings;
use crate::telegram::TelegramSink;

/// Liveness flags reported by /health.
#[derive(Default)]
pub struct Health {
    pub ingestion_alive: AtomicBool,
    pub scheduler_alive: AtomicBool,
}

#[derive(Default)]
pub struct Stats {
    pub messages_forwarded: AtomicI64,
}

pub struct AppState {
    pub config: Config,
    pub db: Arc<Database>,
    pub settings: Arc<Settings>,
    pub dedup: Deduplicator,
    pub health: Health,
    pub stats: Stats,
}

pub async fn run(config: Config) -> anyhow::Result<()> {
    let db = Arc::new(Database::new(&config.data_dir)?);
    let settings = Arc::new(Settings::load_or_seed(&db, config.cleanup_seed())?);
    let dedup = Deduplicator::new(db.clone(), settings.clone());

    let state = Arc::new(AppState {
        config,
        db,
        settings,
        dedup,
        health: Health::default(),
        stats: Stats::default(),
    });

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let (cleanup_tx, cleanup_rx) = mpsc::channel(8);

    crate::scheduler::spawn_scheduler(state.clone(), cleanup_rx, shutdown_rx.clone());

    if state.config.web_enabled {
        let web_state = state.clone();
        let web_cleanup_tx = cleanup_tx.clone();
        info!(
            "Starting web server on {}:{}",
            state.config.web_host, state.config.web_port
        );
        tokio::spawn(async move {
            crate::web::start_web_server(web_state, web_cleanup_tx).await;
        });
    }

    let bot = Bot::new(&state.config.telegram_bot_token);
    let sink = Arc::new(TelegramSink::new(bot.clone()));
    let forwarder = Arc::new(Forwarder::new(sink, state.config.dest_chat));
    let router = PipelineRouter::spawn(state.clone(), forwarder, shutdown_rx.clone());

    info!(
        "Mirroring {} source chat(s) into chat {}",
        state.config.source_chats.len(),
        state.config.dest_chat
    );

    // The dispatcher returns on ctrl-c; workers and the scheduler wind down
    // behind it, finishing anything already in flight.
    crate::telegram::run_listener(state.clone(), bot, router).await;

    let _ = shutdown_tx.send(true);
    info!("Shutting down");
    Ok(())
}
