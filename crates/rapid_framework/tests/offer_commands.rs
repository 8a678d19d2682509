//! Integration tests for offers driven through the command framework
//!
//! A party-invite plugin in miniature: `/party invite <player>` sends an
//! offer, `/party accept` and `/party deny` answer it.

use rapid_framework::{
    ArgumentMapper, CommandRegistry, CommandSender, OfferConfig, OfferScheduler, PlayerId,
    SubCommand, SyncContext, Thresholds, TokioTaskSupervisor,
};
use std::sync::{Arc, Mutex};
use tokio::time::Duration;

#[derive(Clone)]
struct Player {
    name: String,
    inbox: Arc<Mutex<Vec<String>>>,
}

impl Player {
    fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            inbox: Arc::new(Mutex::new(Vec::new())),
        }
    }

    fn inbox(&self) -> Vec<String> {
        self.inbox.lock().unwrap().clone()
    }
}

impl CommandSender for Player {
    fn display_name(&self) -> String {
        self.name.clone()
    }

    fn send_message(&self, message: &str) {
        self.inbox.lock().unwrap().push(message.to_string());
    }

    fn has_permission(&self, permissions: &[&str]) -> bool {
        permissions.iter().all(|p| p.starts_with("party."))
    }

    fn player_id(&self) -> Option<PlayerId> {
        Some(PlayerId::from_name(&self.name))
    }
}

fn party_commands(offers: Arc<OfferScheduler>, members: Arc<Mutex<Vec<PlayerId>>>) -> CommandRegistry {
    let mut registry = CommandRegistry::new("party");

    let invite_offers = offers.clone();
    registry
        .register(
            SubCommand::builder("invite", "party")
                .usage("/${command} invite <player>")
                .arguments(1)
                .mapper(0, ArgumentMapper::player())
                .action(move |sender, args| {
                    let Some(target) = args.get(0, PlayerId::default()) else {
                        return true;
                    };
                    let members = members.clone();
                    let sent = invite_offers.send(
                        target,
                        |_| Ok(()),
                        move || {
                            members.lock().unwrap().push(target);
                            Ok(())
                        },
                        || Ok(()),
                        Thresholds::none(),
                    );
                    if !sent {
                        sender.send_message("That player already has a pending invite.");
                    }
                    true
                })
                .build()
                .unwrap(),
        )
        .unwrap();

    let accept_offers = offers.clone();
    registry
        .register(
            SubCommand::builder("accept", "party")
                .arguments(0)
                .action(move |sender, _| {
                    if let Some(id) = sender.player_id() {
                        if !accept_offers.accept(id) {
                            sender.send_message("You have no pending invite.");
                        }
                    }
                    true
                })
                .build()
                .unwrap(),
        )
        .unwrap();

    registry
        .register(
            SubCommand::builder("deny", "party")
                .aliases(["decline"])
                .arguments(0)
                .action(move |sender, _| {
                    if let Some(id) = sender.player_id() {
                        if !offers.decline(id) {
                            sender.send_message("You have no pending invite.");
                        }
                    }
                    true
                })
                .build()
                .unwrap(),
        )
        .unwrap();

    registry
}

fn offer_scheduler(window_ms: u64) -> Arc<OfferScheduler> {
    let (context, sync) = SyncContext::new(Duration::from_millis(10));
    tokio::spawn(context.run(std::future::pending::<()>()));

    Arc::new(OfferScheduler::with_config(
        Arc::new(TokioTaskSupervisor::current(sync).expect("inside a runtime")),
        OfferConfig {
            waiting_window: Duration::from_millis(window_ms),
            ..OfferConfig::default()
        },
    ))
}

#[tokio::test(start_paused = true)]
async fn test_invite_accept_flow() {
    let offers = offer_scheduler(5_000);
    let members = Arc::new(Mutex::new(Vec::new()));
    let registry = party_commands(offers.clone(), members.clone());

    let leader = Player::new("Leader");
    let steve = Player::new("Steve");

    assert!(registry.dispatch(&leader, "invite Steve").unwrap());
    assert!(registry.dispatch(&leader, "invite Steve").unwrap());
    assert_eq!(leader.inbox(), vec!["That player already has a pending invite."]);

    assert!(registry.dispatch(&steve, "accept").unwrap());
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert_eq!(*members.lock().unwrap(), vec![PlayerId::from_name("Steve")]);
    assert!(steve.inbox().is_empty());

    assert!(registry.dispatch(&steve, "accept").unwrap());
    assert_eq!(steve.inbox(), vec!["You have no pending invite."]);
}

#[tokio::test(start_paused = true)]
async fn test_decline_alias_and_expiry() {
    let offers = offer_scheduler(1_000);
    let members = Arc::new(Mutex::new(Vec::new()));
    let registry = party_commands(offers.clone(), members.clone());

    let leader = Player::new("Leader");
    let alex = Player::new("Alex");

    assert!(registry.dispatch(&leader, "invite Alex").unwrap());
    assert!(registry.dispatch(&alex, "decline").unwrap());
    assert!(!offers.is_pending(PlayerId::from_name("Alex")));

    assert!(registry.dispatch(&leader, "invite Alex").unwrap());
    tokio::time::sleep(Duration::from_millis(1_500)).await;
    assert!(!offers.is_pending(PlayerId::from_name("Alex")));

    assert!(registry.dispatch(&alex, "accept").unwrap());
    assert_eq!(alex.inbox(), vec!["You have no pending invite."]);
    assert!(members.lock().unwrap().is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_invite_without_target_prints_usage() {
    let offers = offer_scheduler(1_000);
    let registry = party_commands(offers, Arc::new(Mutex::new(Vec::new())));

    let leader = Player::new("Leader");
    assert!(!registry.dispatch(&leader, "invite").unwrap());
    assert_eq!(leader.inbox(), vec!["/party invite <player>"]);
}
