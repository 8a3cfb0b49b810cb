//! Harvest orchestration
//!
//! Drives repeated ingestion across the trending-topic worklist: for each
//! topic, invoke the search workflow, decode, reconcile, then expand the
//! freshest notes into comment fetches. Every unit is throttled (a fixed
//! delay between topics, a wider randomized delay band before each comment
//! fetch) and a failure in one unit never halts the loop.
//!
//! Processing is strictly sequential: one unit at a time, fully committed
//! before the next begins.

use anyhow::Result;
use chrono::{DateTime, Utc};
use rand::Rng;
use serde::Serialize;
use serde_json::{Map, Value};
use sqlx::SqlitePool;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use crate::db::topics::load_trending_topics;
use crate::models::{CommentsData, NoteSnapshot, RequestContext};
use crate::services::envelope::decode_envelope;
use crate::services::reconciler::Reconciler;
use crate::services::workflow_client::{WorkflowClient, WorkflowKind};

/// Worklist selection and throttling parameters for one cycle
#[derive(Debug, Clone, Serialize)]
pub struct HarvestParams {
    pub min_view_count: i64,
    pub topic_limit: i64,
    pub notes_per_topic: i64,
    pub comments_per_topic: usize,
    pub topic_delay: Duration,
    pub comment_delay_min: Duration,
    pub comment_delay_max: Duration,
}

impl Default for HarvestParams {
    fn default() -> Self {
        Self {
            min_view_count: 10_000,
            topic_limit: 20,
            notes_per_topic: 200,
            comments_per_topic: 5,
            topic_delay: Duration::from_secs(60),
            comment_delay_min: Duration::from_secs(90),
            comment_delay_max: Duration::from_secs(180),
        }
    }
}

/// Outcome of one harvest cycle
#[derive(Debug, Clone, Serialize)]
pub struct CycleSummary {
    pub topics_processed: usize,
    pub notes_stored: usize,
    pub comment_batches: usize,
    pub unit_failures: usize,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
}

/// Throttled orchestration over Client -> Decoder -> Engine
pub struct Harvester {
    db: SqlitePool,
    client: Arc<WorkflowClient>,
}

impl Harvester {
    pub fn new(db: SqlitePool, client: Arc<WorkflowClient>) -> Self {
        Self { db, client }
    }

    /// Run one full harvest cycle over the trending-topic worklist.
    ///
    /// Returns an error only when the worklist itself cannot be selected;
    /// per-topic failures are logged and counted, and the loop moves on.
    pub async fn run_cycle(&self, params: &HarvestParams) -> Result<CycleSummary> {
        let started_at = Utc::now();

        let topics =
            load_trending_topics(&self.db, params.min_view_count, params.topic_limit).await?;

        tracing::info!(
            topics = topics.len(),
            min_view_count = params.min_view_count,
            "Harvest cycle starting"
        );

        let mut notes_stored = 0usize;
        let mut comment_batches = 0usize;
        let mut unit_failures = 0usize;

        for (index, topic) in topics.iter().enumerate() {
            match self.harvest_topic(&topic.topic_name, params).await {
                Ok((stored, fetched)) => {
                    notes_stored += stored;
                    comment_batches += fetched;
                    tracing::info!(
                        topic = %topic.topic_name,
                        views = topic.view_count,
                        stored,
                        "Topic harvested"
                    );
                }
                Err(e) => {
                    unit_failures += 1;
                    tracing::error!(
                        topic = %topic.topic_name,
                        error = %e,
                        "Topic harvest failed, continuing with next unit"
                    );
                }
            }

            if index + 1 < topics.len() {
                tracing::debug!(delay = ?params.topic_delay, "Waiting before next topic");
                tokio::time::sleep(params.topic_delay).await;
            }
        }

        let summary = CycleSummary {
            topics_processed: topics.len(),
            notes_stored,
            comment_batches,
            unit_failures,
            started_at,
            finished_at: Utc::now(),
        };

        tracing::info!(
            topics = summary.topics_processed,
            notes = summary.notes_stored,
            comment_batches = summary.comment_batches,
            failures = summary.unit_failures,
            "Harvest cycle finished"
        );

        Ok(summary)
    }

    /// One unit: search the topic, reconcile its notes, expand comments
    async fn harvest_topic(
        &self,
        topic_name: &str,
        params: &HarvestParams,
    ) -> Result<(usize, usize)> {
        let mut call_params = Map::new();
        call_params.insert(
            "search_tag".to_string(),
            Value::String(topic_name.to_string()),
        );
        call_params.insert(
            "search_num".to_string(),
            Value::Number(params.notes_per_topic.into()),
        );

        let envelope = self
            .client
            .invoke(WorkflowKind::SearchNotes, call_params)
            .await?;

        let Some(decoded) = decode_envelope::<Vec<NoteSnapshot>>(&envelope) else {
            // no data, already logged
            return Ok((0, 0));
        };

        let mut req = RequestContext::new();
        req.insert(
            "keywords".to_string(),
            Value::String(topic_name.to_string()),
        );
        req.insert(
            "search_num".to_string(),
            Value::Number(params.notes_per_topic.into()),
        );

        let note_urls: HashMap<String, String> = decoded
            .resp_data
            .iter()
            .filter_map(|n| Some((n.note_id.clone(), n.note_url.clone()?)))
            .collect();

        let reconciler = Reconciler::new(self.db.clone());
        let outcome = reconciler.reconcile_search(&req, &decoded.resp_data).await?;

        let mut comment_batches = 0usize;
        for note_id in outcome.persisted.iter().take(params.comments_per_topic) {
            let Some(note_url) = note_urls.get(note_id) else {
                continue;
            };

            // comment fetching has the tightest rate-limit profile;
            // draw the delay from a randomized band
            let delay = random_delay(params.comment_delay_min, params.comment_delay_max);
            tracing::debug!(note_id = %note_id, delay = ?delay, "Waiting before comment fetch");
            tokio::time::sleep(delay).await;

            match self.harvest_comments(note_id, note_url).await {
                Ok(true) => comment_batches += 1,
                Ok(false) => {}
                Err(e) => {
                    tracing::error!(
                        note_id = %note_id,
                        error = %e,
                        "Comment harvest failed, continuing with next note"
                    );
                }
            }
        }

        Ok((outcome.persisted.len(), comment_batches))
    }

    /// Fetch and reconcile the comment tree of one note
    async fn harvest_comments(&self, note_id: &str, note_url: &str) -> Result<bool> {
        let mut call_params = Map::new();
        call_params.insert("note_url".to_string(), Value::String(note_url.to_string()));

        let envelope = self.client.invoke(WorkflowKind::Comments, call_params).await?;

        let Some(decoded) = decode_envelope::<CommentsData>(&envelope) else {
            return Ok(false);
        };

        let mut req = RequestContext::new();
        req.insert("noteUrl".to_string(), Value::String(note_url.to_string()));
        req.insert("noteId".to_string(), Value::String(note_id.to_string()));

        let reconciler = Reconciler::new(self.db.clone());
        let outcome = reconciler.reconcile_comments(&req, &decoded.resp_data).await?;

        tracing::info!(
            note_id = %note_id,
            stored = outcome.persisted.len(),
            "Comments harvested"
        );

        Ok(true)
    }
}

fn random_delay(min: Duration, max: Duration) -> Duration {
    if max <= min {
        return min;
    }
    let spread_ms = (max - min).as_millis() as u64;
    let jitter_ms = rand::thread_rng().gen_range(0..=spread_ms);
    min + Duration::from_millis(jitter_ms)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn random_delay_stays_in_band() {
        let min = Duration::from_millis(100);
        let max = Duration::from_millis(300);
        for _ in 0..50 {
            let delay = random_delay(min, max);
            assert!(delay >= min && delay <= max);
        }
    }

    #[test]
    fn random_delay_degenerate_band() {
        let only = Duration::from_millis(100);
        assert_eq!(random_delay(only, only), only);
        assert_eq!(random_delay(only, Duration::from_millis(50)), only);
    }

    #[test]
    fn default_params_match_throttle_profile() {
        let params = HarvestParams::default();
        assert!(params.comment_delay_min > params.topic_delay);
        assert!(params.comment_delay_max > params.comment_delay_min);
    }
}
