use crate::cli::HarvestArgs;
use anyhow::{Context, Result};
use epicosm_config::{EpicosmConfig, HarvestConfig};
use epicosm_harvest::{
    Collection, DedupStore, FollowGraphHarvester, HarvestError, PseudofeedAggregator, SeedUser,
    TimelineHarvester, load_seeds, refresh_seeds, scoring,
};
use epicosm_http::{BackoffPolicy, BearerToken, HttpClient};
use epicosm_social::twitter::TwitterApi;
use std::time::Duration;
use tokio::time::{Interval, MissedTickBehavior};
use tracing::{error, info};

const SECONDS_PER_DAY: u64 = 24 * 60 * 60;

/// Wires configuration into the API client and the store, then runs jobs.
pub struct Runner {
    api: TwitterApi,
    store: DedupStore,
    harvest: HarvestConfig,
}

impl Runner {
    pub async fn from_config(cfg: &EpicosmConfig) -> Result<Self> {
        let backoff = BackoffPolicy {
            initial: cfg.backoff.initial,
            factor: cfg.backoff.factor,
            cap: cfg.backoff.cap,
            unit: Duration::from_millis(cfg.backoff.unit_ms),
        };
        let token = BearerToken::new(&cfg.twitter.bearer_token).context("twitter.bearer_token")?;
        let http = HttpClient::with_user_agent(&cfg.twitter.base_url, token, backoff, &cfg.twitter.user_agent)
            .context("building HTTP client")?;
        let store = DedupStore::connect(&cfg.database.url)
            .await
            .with_context(|| format!("opening database {}", cfg.database.url))?;

        Ok(Self {
            api: TwitterApi::new(http),
            store,
            harvest: cfg.harvest.clone(),
        })
    }

    async fn seeds(&self, refresh: bool) -> Result<Vec<SeedUser>, HarvestError> {
        if refresh || !self.harvest.seeds_file.exists() {
            info!(
                user_list = %self.harvest.user_list.display(),
                forced = refresh,
                "runner.seeds.refresh"
            );
            return refresh_seeds(&self.api, &self.harvest.user_list, &self.harvest.seeds_file).await;
        }
        Ok(load_seeds(&self.harvest.seeds_file)?)
    }

    /// One pass of every selected job, in the order timelines, follows, pseudofeed.
    pub async fn harvest_once(&self, args: &HarvestArgs) -> Result<(), HarvestError> {
        let seeds = self.seeds(args.refresh).await?;
        if seeds.is_empty() {
            info!("runner.no_seeds");
            return Ok(());
        }

        if args.timelines_selected() {
            TimelineHarvester::new(&self.api, &self.store, self.harvest.timeline_page_size)
                .harvest_all(&seeds)
                .await?;
        }
        if args.get_follows {
            FollowGraphHarvester::new(&self.api, &self.store, self.harvest.follows_page_size)
                .harvest_all(&seeds)
                .await?;
        }
        if args.pseudofeed {
            PseudofeedAggregator::new(
                &self.api,
                &self.store,
                self.harvest.recent_max_results,
                self.harvest.lookback_days,
            )
            .aggregate_all(&seeds)
            .await?;
        }
        Ok(())
    }

    /// Run once, or every `repeat` days. A failed pass is logged and the
    /// schedule continues; a rejected credential ends it.
    pub async fn harvest(&self, args: &HarvestArgs) -> Result<(), HarvestError> {
        let Some(days) = args.repeat else {
            return self.harvest_once(args).await;
        };

        let mut ticker = repeat_ticker(days);
        let mut pass = 0u64;
        // Refresh only applies to the first pass.
        let mut args = args.clone();
        loop {
            ticker.tick().await;
            pass += 1;
            info!(pass, every_days = days, "runner.pass.start");
            match self.harvest_once(&args).await {
                Ok(()) => info!(pass, "runner.pass.done"),
                Err(err) if err.is_fatal() => return Err(err),
                Err(err) => error!(pass, error = %err, "runner.pass.failed"),
            }
            args.refresh = false;
        }
    }

    pub async fn score(&self, collection: Collection, algorithm: &str) -> Result<(), HarvestError> {
        scoring::check_scorable(collection)?;
        let scorer = scoring::select(algorithm)?;
        let total = self.store.count(collection).await?;
        scoring::score_collection(&self.store, collection, total, scorer.as_ref()).await?;
        Ok(())
    }
}

/// A pass that overruns the period pushes the next one back instead of
/// firing a catch-up pass straight away.
fn repeat_ticker(days: u32) -> Interval {
    let mut ticker = tokio::time::interval(Duration::from_secs(u64::from(days) * SECONDS_PER_DAY));
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    ticker
}
