#![forbid(unsafe_code)]
#![warn(clippy::pedantic)]
// easier to use when using the functions as callback of foreign functions
#![allow(clippy::needless_pass_by_value)]
#![allow(clippy::missing_errors_doc)]

use std::sync::Arc;

use anyhow::Result;
use axum::Extension;
use axum::Router;
use tokio::net::TcpListener;
use tokio::sync::mpsc;
use tower_http::trace::TraceLayer;
use tracing_subscriber::prelude::*;

use crate::api::router;
use crate::clock::SystemClock;
use crate::config::Config;
use crate::controller::Controller;
use crate::delivery::Fired;
use crate::delivery::TimerDelivery;
use crate::notifications::CommandNotifier;
use crate::notifications::LogNotifier;
use crate::notifications::Notifier;
use crate::reconcile::Trigger;
use crate::scheduler::Scheduler;
use crate::storage::Memory;
use crate::storage::Sqlite;
use crate::storage::Storage;
use crate::storage::StorageConfig;

mod api;
mod clock;
mod config;
mod controller;
mod delivery;
mod graceful_shutdown;
mod items;
mod notifications;
mod reconcile;
mod recurrence;
mod reminders;
mod scheduler;
mod storage;
#[cfg(test)]
mod tests;
mod utils;

const DEFAULT_RUST_LOG: &str = "pillbox=debug,tower_http=debug";

#[tokio::main]
async fn main() -> Result<()> {
    setup_environment();
    setup_tracing();

    let config = Config::from_env()?;

    match &config.storage {
        StorageConfig::Memory => run(Memory::new(), &config).await,
        StorageConfig::Sqlite(sqlite) => {
            let storage = Sqlite::from_config(sqlite.clone()).await?;

            run(storage, &config).await
        }
    }
}

/// Arm all reminders and serve the API until shutdown
async fn run<S: Storage>(storage: S, config: &Config) -> Result<()> {
    let (delivery, fired) = TimerDelivery::new(config.alarms.clone());

    let scheduler = Scheduler::new(
        storage.clone(),
        Arc::new(delivery),
        setup_notifier(config),
        Arc::new(SystemClock),
    );

    tokio::spawn(handle_fired(scheduler.clone(), fired));

    // failures are logged by the pass itself, the API can still be used to fix them
    let _ = reconcile::run(&scheduler, Trigger::Startup).await;

    tokio::spawn(reconcile::on_reload_signal(scheduler.clone()));

    let app = create_router(Controller::new(storage, scheduler));

    let listener = TcpListener::bind(config.address).await?;
    tracing::info!("Listening on {}", config.address);

    axum::serve(listener, app)
        .with_graceful_shutdown(graceful_shutdown::handler())
        .await?;

    Ok(())
}

/// Handle every fired alarm, each on its own task
async fn handle_fired<S: Storage>(scheduler: Scheduler<S>, mut fired: mpsc::UnboundedReceiver<Fired>) {
    while let Some(alarm) = fired.recv().await {
        let scheduler = scheduler.clone();

        tokio::spawn(async move {
            let outcome = scheduler.on_fire(alarm.reminder_id, alarm.at).await;

            tracing::debug!(
                r#"Alarm for reminder {} ("{}") handled: {outcome:?}"#,
                alarm.reminder_id,
                alarm.payload.item_name
            );
        });
    }
}

/// Create the router for Pillbox
fn create_router<S: Storage>(controller: Controller<S>) -> Router {
    Router::new()
        .nest("/api", router::<S>())
        .fallback(api::not_found)
        .layer(TraceLayer::new_for_http())
        .layer(Extension(controller))
}

fn setup_notifier(config: &Config) -> Arc<dyn Notifier> {
    match &config.notify_command {
        Some(program) => Arc::new(CommandNotifier::new(program.as_str())),
        None => Arc::new(LogNotifier),
    }
}

fn setup_environment() {
    dotenvy::dotenv().ok();
}

fn setup_tracing() {
    use tracing_subscriber::EnvFilter;
    use tracing_subscriber::fmt;
    use tracing_subscriber::registry;

    registry()
        .with(EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| DEFAULT_RUST_LOG.into()),
        ))
        .with(fmt::layer())
        .init();
}
