//! Harvesting engine: the deduplicating store and the jobs that fill it.
//!
//! - [`store`]: SQLite collections for follow edges, posts and pseudofeeds
//! - [`follows`]: per-seed follow-graph harvest
//! - [`pseudofeed`]: per-seed aggregation of followed accounts' recent posts
//! - [`timeline`]: per-seed posts harvest
//! - [`seeds`]: seed list loading and refresh
//! - [`scoring`]: apply a scoring algorithm across a collection
//!
//! Every job runs its targets one after another, awaiting each request before
//! issuing the next.
pub mod error;
pub mod follows;
pub mod pseudofeed;
pub mod scoring;
pub mod seeds;
pub mod store;
pub mod timeline;

pub use error::HarvestError;
pub use follows::{FollowGraphHarvester, FollowsSummary, SeedFollows};
pub use pseudofeed::{PseudofeedAggregator, PseudofeedSummary, SeedFeed};
pub use scoring::{score_collection, Scorer, WordCount};
pub use seeds::{load_seeds, refresh_seeds, SeedUser};
pub use store::{Collection, DedupStore, InsertReport, PseudofeedRecord};
pub use timeline::{TimelineHarvester, TimelineSummary};
