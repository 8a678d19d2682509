//! Console host for rapid framework plugins.
//!
//! Runs the main tick, the offer desk plugin and an operator console until
//! `stop` is typed or a termination signal arrives.

mod cli;
mod config;
mod console;
mod desk;
mod logging;
mod outcomes;
mod signals;

use anyhow::Context;
use cli::CliArgs;
use config::AppConfig;
use desk::OfferDesk;
use rapid_framework::{OfferScheduler, PluginLifecycle, SyncContext, TokioTaskSupervisor};
use std::sync::Arc;
use tokio::sync::oneshot;
use tracing::{error, info, warn};

// ============================================================================
// Application
// ============================================================================

pub struct Application {
    config: AppConfig,
}

impl Application {
    pub async fn new(args: CliArgs) -> anyhow::Result<Self> {
        let mut config = AppConfig::load_from_file(&args.config_path)
            .await
            .with_context(|| format!("loading {}", args.config_path.display()))?;

        if let Some(log_level) = args.log_level {
            config.logging.level = log_level;
        }
        if args.json_logs {
            config.logging.json_format = true;
        }
        if let Some(database) = args.database {
            config.storage.database_url = Some(database);
        }

        config
            .validate()
            .map_err(|e| anyhow::anyhow!("Configuration validation failed: {}", e))?;

        logging::setup_logging(&config.logging)?;
        info!(
            "🚀 Rapid Host v{} | Config: {}",
            env!("CARGO_PKG_VERSION"),
            args.config_path.display()
        );

        Ok(Self { config })
    }

    pub async fn run(self) -> anyhow::Result<()> {
        info!("📋 Configuration Summary:");
        info!("  ⏱️ Tick interval: {}ms", self.config.server.tick_interval_ms);
        info!("  📨 Offer window: {}ms", self.config.offers.waiting_window_ms);
        info!(
            "  💾 Outcome database: {}",
            self.config.storage.database_url.as_deref().unwrap_or("disabled")
        );

        let (context, sync) = SyncContext::new(self.config.tick_interval());
        let (stop_ticks, ticks_stopped) = oneshot::channel::<()>();
        let tick_loop = tokio::spawn(context.run(async {
            let _ = ticks_stopped.await;
        }));

        let supervisor = Arc::new(TokioTaskSupervisor::current(sync.clone())?);
        let offers = Arc::new(OfferScheduler::with_config(supervisor, self.config.offer_config()));

        let mut desk = PluginLifecycle::new(OfferDesk::new(
            offers,
            self.config.thresholds(),
            self.config.storage.session_builder(),
        ));
        desk.start().await?;
        let registry = desk
            .plugin()
            .registry()
            .context("offer desk started without commands")?;

        info!("✅ Rapid Host is now running!");
        info!("🛑 Type 'stop' or press Ctrl+C to shut down");

        tokio::select! {
            result = console::run(registry) => {
                if let Err(e) = result {
                    warn!("⚠️ Console closed: {}", e);
                }
            }
            result = signals::wait_for_shutdown() => {
                result?;
            }
        }

        info!("🛑 Shutting down...");
        if let Err(e) = desk.stop().await {
            error!("❌ Offer desk did not stop cleanly: {}", e);
        }

        let _ = stop_ticks.send(());
        tick_loop.await?;
        info!("✅ Rapid Host stopped after {} ticks", sync.tick_count());
        Ok(())
    }
}

// ============================================================================
// Entry Point
// ============================================================================

#[tokio::main(flavor = "multi_thread")]
async fn main() {
    let args = CliArgs::parse();

    match Application::new(args).await {
        Ok(app) => {
            if let Err(e) = app.run().await {
                error!("❌ Application error: {:?}", e);
                std::process::exit(1);
            }
        }
        Err(e) => {
            eprintln!("❌ Failed to start application: {:?}", e);
            std::process::exit(1);
        }
    }

    // a pending stdin read would hold up runtime shutdown
    std::process::exit(0)
}
