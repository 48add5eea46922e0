//! Pseudofeed aggregation.
//!
//! For a seed with stored follow edges, one bounded recent-search per followed
//! account; every returned text is appended to a single buffer with no
//! separator, and the buffer is written as one record per seed per run. The
//! buffer has no size cap, so a seed following many prolific accounts costs
//! memory in proportion.
use crate::error::HarvestError;
use crate::seeds::SeedUser;
use crate::store::{DedupStore, PseudofeedRecord};
use chrono::{SecondsFormat, Utc};
use epicosm_social::twitter::extract::{append_texts, approx_word_count};
use epicosm_social::twitter::{PageOutcome, TwitterApi};
use tracing::{debug, error, info, warn};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SeedFeed {
    /// No follow edges stored for this seed; nothing was requested or written.
    Skipped,
    Written(FeedStats),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FeedStats {
    pub accounts: usize,
    /// Accounts that returned at least one page.
    pub contributing: usize,
    pub posts: usize,
    pub chars: usize,
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct PseudofeedSummary {
    pub written: usize,
    pub skipped: usize,
    pub failed: usize,
}

pub struct PseudofeedAggregator<'a> {
    api: &'a TwitterApi,
    store: &'a DedupStore,
    max_results: u32,
    lookback: time::Duration,
}

impl<'a> PseudofeedAggregator<'a> {
    pub fn new(
        api: &'a TwitterApi,
        store: &'a DedupStore,
        max_results: u32,
        lookback_days: u32,
    ) -> Self {
        Self {
            api,
            store,
            max_results,
            lookback: time::Duration::days(i64::from(lookback_days)),
        }
    }

    pub async fn aggregate_seed(&self, seed: &SeedUser) -> Result<SeedFeed, HarvestError> {
        let followed = self.store.followed_ids_for(seed.id).await?;
        if followed.is_empty() {
            info!(seed = %seed.label(), "pseudofeed.skipped.no_follows");
            return Ok(SeedFeed::Skipped);
        }

        let mut text = String::new();
        let mut contributing = 0;
        let mut posts = 0;
        for account in &followed {
            match self
                .api
                .recent_from(account, self.max_results, self.lookback)
                .await?
            {
                PageOutcome::Page(page) => {
                    posts += append_texts(&page.data, &mut text);
                    contributing += 1;
                }
                PageOutcome::EndOfStream => {
                    debug!(seed = seed.id, account = %account, "pseudofeed.account.empty");
                }
                PageOutcome::SoftError(detail) => {
                    warn!(seed = seed.id, account = %account, detail = %detail, "pseudofeed.account.skipped");
                }
            }
        }

        let stats = FeedStats {
            accounts: followed.len(),
            contributing,
            posts,
            chars: text.chars().count(),
        };
        let words = approx_word_count(&text);
        let record = PseudofeedRecord {
            user: seed.id,
            timestamp: Utc::now().to_rfc3339_opts(SecondsFormat::Secs, true),
            text,
        };
        self.store.insert_pseudofeed(&record).await?;
        info!(
            seed = %seed.label(),
            accounts = stats.accounts,
            contributing = stats.contributing,
            posts = stats.posts,
            chars = stats.chars,
            words,
            "pseudofeed.written"
        );
        Ok(SeedFeed::Written(stats))
    }

    pub async fn aggregate_all(&self, seeds: &[SeedUser]) -> Result<PseudofeedSummary, HarvestError> {
        let mut summary = PseudofeedSummary::default();
        for seed in seeds {
            match self.aggregate_seed(seed).await {
                Ok(SeedFeed::Written(_)) => summary.written += 1,
                Ok(SeedFeed::Skipped) => summary.skipped += 1,
                Err(err) if err.is_fatal() => return Err(err),
                Err(err) => {
                    summary.failed += 1;
                    error!(seed = %seed.label(), error = %err, "pseudofeed.seed.failed");
                }
            }
        }
        info!(
            written = summary.written,
            skipped = summary.skipped,
            failed = summary.failed,
            "pseudofeed.summary"
        );
        Ok(summary)
    }
}
