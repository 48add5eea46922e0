//! Posts harvest: each seed's own timeline into the `posts` collection.
use crate::error::HarvestError;
use crate::seeds::SeedUser;
use crate::store::DedupStore;
use epicosm_social::twitter::TwitterApi;
use futures::StreamExt;
use tracing::{error, info};

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct TimelineSummary {
    pub seeds_done: usize,
    pub seeds_failed: usize,
    pub inserted: usize,
    pub duplicates: usize,
}

pub struct TimelineHarvester<'a> {
    api: &'a TwitterApi,
    store: &'a DedupStore,
    page_size: u32,
}

impl<'a> TimelineHarvester<'a> {
    pub fn new(api: &'a TwitterApi, store: &'a DedupStore, page_size: u32) -> Self {
        Self {
            api,
            store,
            page_size,
        }
    }

    /// Returns `(inserted, duplicates)` for this seed.
    pub async fn harvest_seed(&self, seed: &SeedUser) -> Result<(usize, usize), HarvestError> {
        let seed_key = seed.id.to_string();
        let pages = self.api.timeline(&seed_key, self.page_size).pages();
        tokio::pin!(pages);

        let (mut inserted, mut duplicates) = (0, 0);
        while let Some(page) = pages.next().await {
            let page = page?;
            let report = self.store.insert_posts(&page.data).await;
            inserted += report.inserted;
            duplicates += report.duplicates;
            info!(
                seed = %seed.label(),
                received = page.data.len(),
                inserted = report.inserted,
                "timeline.page.stored"
            );
        }
        Ok((inserted, duplicates))
    }

    pub async fn harvest_all(&self, seeds: &[SeedUser]) -> Result<TimelineSummary, HarvestError> {
        let mut summary = TimelineSummary::default();
        for seed in seeds {
            match self.harvest_seed(seed).await {
                Ok((inserted, duplicates)) => {
                    summary.seeds_done += 1;
                    summary.inserted += inserted;
                    summary.duplicates += duplicates;
                }
                Err(err) if err.is_fatal() => return Err(err),
                Err(err) => {
                    summary.seeds_failed += 1;
                    error!(seed = %seed.label(), error = %err, "timeline.seed.failed");
                }
            }
        }
        info!(
            seeds = seeds.len(),
            inserted = summary.inserted,
            duplicates = summary.duplicates,
            "timeline.summary"
        );
        Ok(summary)
    }
}
