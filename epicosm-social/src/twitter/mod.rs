//! Twitter/X API v2 integration surface.
//!
//! `client` shapes requests for the follow-list, user-timeline, recent-search and
//! user-lookup endpoints. `pager` turns the `meta.next_token` chain into a lazy
//! stream of pages and collapses every terminal answer into end-of-stream.
//! `types` models the response envelope; `extract` holds the small document
//! helpers the harvesters apply to returned items.
pub mod client;
pub mod extract;
pub mod pager;
pub mod types;

pub use client::{Lookup, TwitterApi};
pub use pager::{Page, PageOutcome, Paginator};
