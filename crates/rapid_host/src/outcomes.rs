//! Persistence of finished offers.
//!
//! Offer callbacks run on the main tick and must not block, so they hand
//! records to an [`OutcomeLog`]; a background task writes them through
//! [`OutcomeStore`].

use rapid_framework::{CustomAdapter, DefaultSerializer, PlayerId};
use rapid_sql::{Attribute, SqlResult, SqlSession, SqlSessionBuilder};
use serde::{Deserialize, Serialize};
use std::time::{SystemTime, UNIX_EPOCH};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OfferOutcome {
    Accepted,
    Declined,
    TimedOut,
    /// Still pending when the host shut down.
    Cancelled,
}

impl OfferOutcome {
    pub fn as_str(self) -> &'static str {
        match self {
            OfferOutcome::Accepted => "accepted",
            OfferOutcome::Declined => "declined",
            OfferOutcome::TimedOut => "timed_out",
            OfferOutcome::Cancelled => "cancelled",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OfferRecord {
    pub subject: PlayerId,
    pub name: String,
    pub outcome: OfferOutcome,
    pub window_ms: u64,
    pub finished_at_ms: u64,
}

impl OfferRecord {
    pub fn now(subject: PlayerId, name: &str, outcome: OfferOutcome, window_ms: u64) -> Self {
        let finished_at_ms = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_millis() as u64)
            .unwrap_or_default();
        Self {
            subject,
            name: name.to_string(),
            outcome,
            window_ms,
            finished_at_ms,
        }
    }
}

/// Table of offer outcomes. Each row keeps the full record as JSON.
pub struct OutcomeStore {
    session: SqlSession,
    serializer: DefaultSerializer<OfferRecord>,
}

impl OutcomeStore {
    pub async fn open(builder: SqlSessionBuilder) -> SqlResult<Self> {
        let session = builder
            .auto_commit()
            .create_table("offer_outcomes", |t| {
                t.if_not_exists()
                    .field("id", "INTEGER", &[Attribute::PrimaryKey, Attribute::AutoIncrement])
                    .field("subject", "VARCHAR(36)", &[Attribute::NotNull])
                    .field("outcome", "VARCHAR(16)", &[Attribute::NotNull])
                    .field("record", "TEXT", &[Attribute::NotNull]);
            })
            .build()
            .await?;

        Ok(Self {
            session,
            serializer: DefaultSerializer::new(),
        })
    }

    /// Stores a record and returns its row id.
    pub async fn insert(&self, record: &OfferRecord) -> anyhow::Result<i64> {
        let json = self.serializer.to_string(record)?;
        let id = self
            .session
            .execute(
                "INSERT INTO offer_outcomes (subject, outcome, record) VALUES (?, ?, ?)",
                &[
                    record.subject.to_string().into(),
                    record.outcome.as_str().into(),
                    json.into(),
                ],
            )
            .await?;
        Ok(id)
    }

    /// The latest `limit` records of `subject`, newest first.
    #[cfg(test)]
    pub async fn history(&self, subject: PlayerId, limit: i64) -> anyhow::Result<Vec<OfferRecord>> {
        use rapid_sql::Row;

        let rows = self
            .session
            .query(
                "SELECT record FROM offer_outcomes WHERE subject = ? ORDER BY id DESC LIMIT ?",
                &[subject.to_string().into(), limit.into()],
            )
            .await?;

        let mut records = Vec::with_capacity(rows.len());
        for row in rows {
            let json: String = row.try_get("record")?;
            records.push(self.serializer.from_str(&json)?);
        }
        Ok(records)
    }

    pub async fn close(self) -> SqlResult<()> {
        self.session.close().await
    }
}

/// Non-blocking handle that queues records for the writer task.
#[derive(Debug, Clone)]
pub struct OutcomeLog {
    queue: mpsc::UnboundedSender<OfferRecord>,
}

impl OutcomeLog {
    /// Spawns the writer task. It exits, closing the store, once every
    /// `OutcomeLog` clone is dropped.
    pub fn spawn(store: OutcomeStore) -> (Self, JoinHandle<()>) {
        let (queue, mut records) = mpsc::unbounded_channel::<OfferRecord>();

        let writer = tokio::spawn(async move {
            while let Some(record) = records.recv().await {
                match store.insert(&record).await {
                    Ok(id) => debug!("💾 Recorded offer #{} for {} as {}", id, record.name, record.outcome.as_str()),
                    Err(e) => error!("❌ Failed to record offer outcome for {}: {}", record.name, e),
                }
            }
            if let Err(e) = store.close().await {
                warn!("⚠️ Outcome database did not close cleanly: {}", e);
            }
            info!("💾 Outcome writer stopped");
        });

        (Self { queue }, writer)
    }

    pub fn record(&self, record: OfferRecord) {
        if self.queue.send(record).is_err() {
            warn!("⚠️ Outcome writer is gone, dropping record");
        }
    }
}
