//! The offer desk: a console plugin for sending and answering offers.

use crate::outcomes::{OfferOutcome, OfferRecord, OutcomeLog, OutcomeStore};
use async_trait::async_trait;
use dashmap::DashMap;
use rapid_framework::{
    ArgumentMapper, CommandError, CommandRegistry, OfferScheduler, PlayerId, PluginError, PluginResult,
    PluginRuntime, SubCommand, Thresholds,
};
use rapid_sql::SqlSessionBuilder;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

pub const ADMIN_PERMISSION: &str = "rapid";

struct Tracked {
    name: String,
    window_ms: u64,
}

/// Names of pending subjects and the sink for finished offers.
#[derive(Default)]
struct Ledger {
    pending: DashMap<PlayerId, Tracked>,
    outcomes: Mutex<Option<OutcomeLog>>,
}

impl Ledger {
    fn name_of(&self, subject: PlayerId) -> String {
        self.pending
            .get(&subject)
            .map(|tracked| tracked.name.clone())
            .unwrap_or_else(|| subject.to_string())
    }

    fn finish(&self, subject: PlayerId, outcome: OfferOutcome) {
        let Some((_, tracked)) = self.pending.remove(&subject) else {
            debug!("No ledger entry for {}", subject);
            return;
        };

        let outcomes = self.outcomes.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        if let Some(log) = outcomes.as_ref() {
            log.record(OfferRecord::now(subject, &tracked.name, outcome, tracked.window_ms));
        }
    }

    fn close(&self) -> Option<OutcomeLog> {
        self.outcomes
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .take()
    }
}

pub struct OfferDesk {
    offers: Arc<OfferScheduler>,
    thresholds: Thresholds,
    storage: Option<SqlSessionBuilder>,
    ledger: Arc<Ledger>,
    writer: Option<JoinHandle<()>>,
    registry: Option<Arc<CommandRegistry>>,
}

impl OfferDesk {
    pub fn new(offers: Arc<OfferScheduler>, thresholds: Thresholds, storage: Option<SqlSessionBuilder>) -> Self {
        Self {
            offers,
            thresholds,
            storage,
            ledger: Arc::new(Ledger::default()),
            writer: None,
            registry: None,
        }
    }

    /// Commands of the desk, available once the plugin is enabled.
    pub fn registry(&self) -> Option<Arc<CommandRegistry>> {
        self.registry.clone()
    }

    fn build_registry(&self) -> Result<CommandRegistry, CommandError> {
        let mut registry = CommandRegistry::new("desk");
        registry.register(self.offer_command()?)?;
        registry.register(self.answer_command("accept", &[], "Accept the pending offer of a player", true)?)?;
        registry.register(self.answer_command("decline", &["deny"], "Decline the pending offer of a player", false)?)?;
        registry.register(self.pending_command()?)?;
        Ok(registry)
    }

    fn offer_command(&self) -> Result<SubCommand, CommandError> {
        let offers = self.offers.clone();
        let ledger = self.ledger.clone();
        let thresholds = self.thresholds.clone();
        let default_window_ms = offers.config().waiting_window.as_millis() as i64;

        SubCommand::builder("offer", ADMIN_PERMISSION)
            .description("Send an offer to a player")
            .usage("offer <player> [window_ms]")
            .mapper(0, ArgumentMapper::player())
            .mapper(1, ArgumentMapper::non_negative_integer())
            .action(move |sender, args| {
                let Some(name) = args.raw(0) else {
                    return false;
                };
                if args.len() > 2 {
                    return false;
                }
                let Some(subject) = args.get(0, PlayerId::default()) else {
                    return true;
                };
                let Some(window_ms) = args.get(1, default_window_ms) else {
                    return true;
                };
                if window_ms == 0 {
                    sender.send_message("The waiting window must be at least 1ms.");
                    return true;
                }
                let window_ms = window_ms as u64;

                let progress_name = name.to_string();
                let accepted = ledger.clone();
                let timed_out = ledger.clone();
                let sent = offers.send_with_window(
                    subject,
                    Duration::from_millis(window_ms),
                    move |left| {
                        info!("⏳ {} has {}s left to answer", progress_name, left / 1000);
                        Ok(())
                    },
                    move || {
                        info!("🤝 {} accepted the offer", accepted.name_of(subject));
                        accepted.finish(subject, OfferOutcome::Accepted);
                        Ok(())
                    },
                    move || {
                        info!("⌛ Offer to {} expired", timed_out.name_of(subject));
                        timed_out.finish(subject, OfferOutcome::TimedOut);
                        Ok(())
                    },
                    thresholds.clone(),
                );

                if sent {
                    // Callbacks run on a later tick, after this entry exists
                    ledger.pending.insert(
                        subject,
                        Tracked {
                            name: name.to_string(),
                            window_ms,
                        },
                    );
                    sender.send_message(&format!("Offer sent to {} ({}ms to answer).", name, window_ms));
                } else {
                    sender.send_message(&format!("{} already has a pending offer.", name));
                }
                true
            })
            .build()
    }

    fn answer_command(
        &self,
        name: &str,
        aliases: &[&str],
        description: &str,
        accept: bool,
    ) -> Result<SubCommand, CommandError> {
        let offers = self.offers.clone();
        let ledger = self.ledger.clone();

        SubCommand::builder(name, ADMIN_PERMISSION)
            .aliases(aliases.iter().copied())
            .description(description)
            .usage(format!("{} <player>", name))
            .arguments(1)
            .mapper(0, ArgumentMapper::player())
            .action(move |sender, args| {
                let Some(subject) = args.get(0, PlayerId::default()) else {
                    return true;
                };
                let name = args.raw(0).unwrap_or_default();

                if accept {
                    if offers.accept(subject) {
                        sender.send_message(&format!("Accepted the offer for {}.", name));
                    } else {
                        sender.send_message(&format!("{} has no pending offer.", name));
                    }
                } else if offers.decline(subject) {
                    ledger.finish(subject, OfferOutcome::Declined);
                    sender.send_message(&format!("Declined the offer for {}.", name));
                } else {
                    sender.send_message(&format!("{} has no pending offer.", name));
                }
                true
            })
            .build()
    }

    fn pending_command(&self) -> Result<SubCommand, CommandError> {
        let offers = self.offers.clone();
        let ledger = self.ledger.clone();

        SubCommand::builder("pending", ADMIN_PERMISSION)
            .description("List offers waiting for an answer")
            .usage("pending")
            .arguments(0)
            .action(move |sender, _| {
                let mut lines: Vec<String> = offers
                    .pending_subjects()
                    .into_iter()
                    .filter_map(|subject| {
                        let left = offers.time_left(subject)?;
                        Some(format!("{}: {}ms left", ledger.name_of(subject), left.as_millis()))
                    })
                    .collect();

                if lines.is_empty() {
                    sender.send_message("No pending offers.");
                    return true;
                }
                lines.sort();
                for line in lines {
                    sender.send_message(&line);
                }
                true
            })
            .build()
    }
}

#[async_trait]
impl PluginRuntime for OfferDesk {
    fn name(&self) -> &str {
        "offer_desk"
    }

    async fn enable(&mut self) -> PluginResult<()> {
        if let Some(builder) = self.storage.take() {
            let store = OutcomeStore::open(builder)
                .await
                .map_err(|e| PluginError::InitializationFailed(format!("outcome database: {}", e)))?;
            let (log, writer) = OutcomeLog::spawn(store);
            *self.ledger.outcomes.lock().unwrap_or_else(|poisoned| poisoned.into_inner()) = Some(log);
            self.writer = Some(writer);
        }

        let registry = self
            .build_registry()
            .map_err(|e| PluginError::InitializationFailed(e.to_string()))?;
        self.registry = Some(Arc::new(registry));
        Ok(())
    }

    async fn load(&mut self) -> PluginResult<()> {
        info!(
            "📋 Offers wait {}ms, reminders at {:?}ms, recording: {}",
            self.offers.config().waiting_window.as_millis(),
            self.thresholds.as_slice(),
            self.writer.is_some()
        );
        Ok(())
    }

    async fn disable(&mut self) -> PluginResult<()> {
        let mut cancelled = 0;
        for subject in self.offers.pending_subjects() {
            if self.offers.decline(subject) {
                self.ledger.finish(subject, OfferOutcome::Cancelled);
                cancelled += 1;
            }
        }
        if cancelled > 0 {
            info!("🧹 Cancelled {} pending offers", cancelled);
        }

        self.registry = None;
        drop(self.ledger.close());
        if let Some(writer) = self.writer.take() {
            if let Err(e) = writer.await {
                warn!("⚠️ Outcome writer ended abnormally: {}", e);
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rapid_framework::{CommandSender, OfferConfig, PluginLifecycle, SyncContext, TokioTaskSupervisor};

    #[derive(Default)]
    struct Operator {
        messages: Mutex<Vec<String>>,
    }

    impl Operator {
        fn take(&self) -> Vec<String> {
            std::mem::take(&mut *self.messages.lock().unwrap())
        }
    }

    impl CommandSender for Operator {
        fn display_name(&self) -> String {
            "operator".to_string()
        }

        fn send_message(&self, message: &str) {
            self.messages.lock().unwrap().push(message.to_string());
        }

        fn has_permission(&self, _: &[&str]) -> bool {
            true
        }
    }

    fn scheduler() -> Arc<OfferScheduler> {
        let (context, sync) = SyncContext::new(Duration::from_millis(10));
        tokio::spawn(context.run(std::future::pending::<()>()));
        Arc::new(OfferScheduler::with_config(
            Arc::new(TokioTaskSupervisor::current(sync).unwrap()),
            OfferConfig {
                waiting_window: Duration::from_millis(5_000),
                ..OfferConfig::default()
            },
        ))
    }

    #[tokio::test(start_paused = true)]
    async fn test_offer_accept_and_pending() {
        let offers = scheduler();
        let mut desk = PluginLifecycle::new(OfferDesk::new(offers.clone(), Thresholds::none(), None));
        desk.start().await.unwrap();
        let registry = desk.plugin().registry().unwrap();
        let operator = Operator::default();

        assert!(registry.dispatch(&operator, "pending").unwrap());
        assert_eq!(operator.take(), vec!["No pending offers."]);

        assert!(registry.dispatch(&operator, "offer Steve").unwrap());
        assert!(registry.dispatch(&operator, "offer Steve").unwrap());
        assert_eq!(
            operator.take(),
            vec!["Offer sent to Steve (5000ms to answer).", "Steve already has a pending offer."]
        );

        assert!(registry.dispatch(&operator, "offer Steve 200").unwrap());
        assert_eq!(operator.take(), vec!["Steve already has a pending offer."]);
        let steve = PlayerId::from_name("Steve");
        assert_eq!(desk.plugin().ledger.pending.get(&steve).unwrap().window_ms, 5_000);

        assert!(registry.dispatch(&operator, "pending").unwrap());
        let lines = operator.take();
        assert_eq!(lines.len(), 1);
        assert!(lines[0].starts_with("Steve: "));

        assert!(registry.dispatch(&operator, "accept Steve").unwrap());
        assert!(registry.dispatch(&operator, "accept Steve").unwrap());
        assert_eq!(
            operator.take(),
            vec!["Accepted the offer for Steve.", "Steve has no pending offer."]
        );
        assert_eq!(offers.pending_count(), 0);

        desk.stop().await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn test_custom_window_and_decline_alias() {
        let offers = scheduler();
        let mut desk = PluginLifecycle::new(OfferDesk::new(offers.clone(), Thresholds::none(), None));
        desk.start().await.unwrap();
        let registry = desk.plugin().registry().unwrap();
        let operator = Operator::default();

        assert!(registry.dispatch(&operator, "offer Alex 200").unwrap());
        tokio::time::sleep(Duration::from_millis(500)).await;
        assert!(!offers.is_pending(PlayerId::from_name("Alex")));

        assert!(registry.dispatch(&operator, "offer Alex").unwrap());
        assert!(registry.dispatch(&operator, "deny Alex").unwrap());
        assert!(!offers.is_pending(PlayerId::from_name("Alex")));
        assert_eq!(
            operator.take(),
            vec![
                "Offer sent to Alex (200ms to answer).",
                "Offer sent to Alex (5000ms to answer).",
                "Declined the offer for Alex.",
            ]
        );

        desk.stop().await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn test_bad_arguments() {
        let mut desk = PluginLifecycle::new(OfferDesk::new(scheduler(), Thresholds::none(), None));
        desk.start().await.unwrap();
        let registry = desk.plugin().registry().unwrap();
        let operator = Operator::default();

        assert!(!registry.dispatch(&operator, "offer").unwrap());
        assert_eq!(operator.take(), vec!["offer <player> [window_ms]"]);

        assert!(registry.dispatch(&operator, "offer Steve -5").unwrap());
        assert_eq!(operator.take(), vec!["'-5': must not be negative"]);

        assert!(registry.dispatch(&operator, "offer Steve 0").unwrap());
        assert_eq!(operator.take(), vec!["The waiting window must be at least 1ms."]);

        assert!(registry.dispatch(&operator, "offer a!b").unwrap());
        assert_eq!(operator.take(), vec!["'a!b': not a player name or id"]);

        assert!(registry.dispatch(&operator, "bogus").is_err());
        desk.stop().await.unwrap();
    }

    #[tokio::test]
    async fn test_outcomes_are_recorded() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("desk.db");

        let offers = scheduler();
        let mut desk = PluginLifecycle::new(OfferDesk::new(
            offers.clone(),
            Thresholds::none(),
            Some(SqlSessionBuilder::sqlite(&path)),
        ));
        desk.start().await.unwrap();
        let registry = desk.plugin().registry().unwrap();
        let operator = Operator::default();

        registry.dispatch(&operator, "offer Steve").unwrap();
        registry.dispatch(&operator, "decline Steve").unwrap();
        registry.dispatch(&operator, "offer Alex 60000").unwrap();
        desk.stop().await.unwrap();
        assert_eq!(offers.pending_count(), 0);

        let store = OutcomeStore::open(SqlSessionBuilder::sqlite(&path)).await.unwrap();
        let steve = store.history(PlayerId::from_name("Steve"), 5).await.unwrap();
        let alex = store.history(PlayerId::from_name("Alex"), 5).await.unwrap();
        assert_eq!(steve.len(), 1);
        assert_eq!(steve[0].outcome, OfferOutcome::Declined);
        assert_eq!(steve[0].window_ms, 5_000);
        assert_eq!(alex[0].outcome, OfferOutcome::Cancelled);
        assert_eq!(alex[0].name, "Alex");
    }
}
