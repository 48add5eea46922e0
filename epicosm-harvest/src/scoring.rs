//! Apply a text-scoring algorithm to every document of a collection.
//!
//! The result lands on the document under [`Scorer::key`]; scoring the same
//! collection again overwrites it.
use crate::error::HarvestError;
use crate::store::{Collection, DedupStore};
use epicosm_social::twitter::extract::approx_word_count;
use serde_json::Value;
use tracing::{info, warn};

pub trait Scorer: Send + Sync {
    /// Document key the score is written under.
    fn key(&self) -> &str;
    fn score(&self, text: &str) -> Value;
}

pub struct WordCount;

impl Scorer for WordCount {
    fn key(&self) -> &str {
        "word_count"
    }

    fn score(&self, text: &str) -> Value {
        Value::from(approx_word_count(text))
    }
}

/// Only posts and pseudofeeds carry text.
pub fn check_scorable(collection: Collection) -> Result<(), HarvestError> {
    match collection {
        Collection::Posts | Collection::Pseudofeed => Ok(()),
        Collection::Follows => Err(HarvestError::NotScorable(collection.to_string())),
    }
}

/// Built-in algorithm by name.
pub fn select(name: &str) -> Result<Box<dyn Scorer>, HarvestError> {
    match name {
        "word_count" => Ok(Box::new(WordCount)),
        other => Err(HarvestError::UnknownAlgorithm(other.to_string())),
    }
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct ScoreReport {
    pub scored: usize,
    /// Documents without a string `text`.
    pub skipped: usize,
}

pub async fn score_collection(
    store: &DedupStore,
    collection: Collection,
    total: i64,
    scorer: &dyn Scorer,
) -> Result<ScoreReport, HarvestError> {
    check_scorable(collection)?;
    if total == 0 {
        warn!(%collection, "score.empty_collection");
        return Ok(ScoreReport::default());
    }

    let mut report = ScoreReport::default();
    for stored in store.documents(collection).await? {
        let Some(text) = stored.doc.get("text").and_then(Value::as_str) else {
            report.skipped += 1;
            continue;
        };
        let score = scorer.score(text);
        store
            .annotate(collection, stored.rowid, scorer.key(), score)
            .await?;
        report.scored += 1;
    }
    info!(
        %collection,
        algorithm = scorer.key(),
        total,
        scored = report.scored,
        skipped = report.skipped,
        "score.done"
    );
    Ok(report)
}
