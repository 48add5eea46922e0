//! Follow-graph harvest: every account each seed follows, stored as edges.
use crate::error::HarvestError;
use crate::seeds::SeedUser;
use crate::store::DedupStore;
use epicosm_social::twitter::TwitterApi;
use futures::StreamExt;
use tracing::{error, info, warn};

/// Per-seed tallies.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct SeedFollows {
    pub pages: usize,
    pub inserted: usize,
    pub duplicates: usize,
    pub failed: usize,
    /// Edges stored for this seed after the last page.
    pub edges: i64,
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct FollowsSummary {
    pub seeds_done: usize,
    pub seeds_failed: usize,
    pub total_edges: i64,
    pub distinct_followers: i64,
}

pub struct FollowGraphHarvester<'a> {
    api: &'a TwitterApi,
    store: &'a DedupStore,
    page_size: u32,
}

impl<'a> FollowGraphHarvester<'a> {
    pub fn new(api: &'a TwitterApi, store: &'a DedupStore, page_size: u32) -> Self {
        Self {
            api,
            store,
            page_size,
        }
    }

    /// Walk one seed's follow list to the end, storing each page as it arrives.
    pub async fn harvest_seed(&self, seed: &SeedUser) -> Result<SeedFollows, HarvestError> {
        let seed_key = seed.id.to_string();
        let pages = self.api.following(&seed_key, self.page_size).pages();
        tokio::pin!(pages);

        let mut tally = SeedFollows::default();
        while let Some(page) = pages.next().await {
            let page = page?;
            let report = self.store.insert_follows(seed.id, &page.data).await;
            tally.pages += 1;
            tally.inserted += report.inserted;
            tally.duplicates += report.duplicates;
            tally.failed += report.failures.len();
            tally.edges = self.store.count_follows_for(seed.id).await?;
            info!(
                seed = %seed.label(),
                page = tally.pages,
                received = page.data.len(),
                inserted = report.inserted,
                duplicates = report.duplicates,
                edges = tally.edges,
                "follows.page.stored"
            );
        }
        if tally.pages == 0 {
            warn!(seed = %seed.label(), "follows.seed.no_pages");
        }
        Ok(tally)
    }

    /// Harvest every seed in list order. A failing seed is logged and skipped;
    /// only a rejected credential ends the run early.
    pub async fn harvest_all(&self, seeds: &[SeedUser]) -> Result<FollowsSummary, HarvestError> {
        let mut summary = FollowsSummary::default();
        for seed in seeds {
            match self.harvest_seed(seed).await {
                Ok(tally) => {
                    summary.seeds_done += 1;
                    info!(
                        seed = %seed.label(),
                        pages = tally.pages,
                        edges = tally.edges,
                        failed = tally.failed,
                        "follows.seed.done"
                    );
                }
                Err(err) if err.is_fatal() => return Err(err),
                Err(err) => {
                    summary.seeds_failed += 1;
                    error!(seed = %seed.label(), error = %err, "follows.seed.failed");
                }
            }
        }

        let (edges, followers) = self.store.follow_totals().await?;
        summary.total_edges = edges;
        summary.distinct_followers = followers;
        info!(
            seeds = seeds.len(),
            failed = summary.seeds_failed,
            total_edges = edges,
            distinct_followers = followers,
            "follows.summary"
        );
        Ok(summary)
    }
}
