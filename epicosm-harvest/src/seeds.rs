//! Seed-user list: reading it, and rebuilding it from a file of handles.
use crate::error::HarvestError;
use epicosm_common::EpicosmError;
use epicosm_social::twitter::client::LOOKUP_CHUNK;
use epicosm_social::twitter::TwitterApi;
use serde::{Deserialize, Deserializer, Serialize};
use std::path::Path;
use tracing::{info, warn};

/// An operator-supplied account whose graph gets harvested.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SeedUser {
    #[serde(deserialize_with = "numeric_id")]
    pub id: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,
}

impl SeedUser {
    pub fn label(&self) -> String {
        match &self.username {
            Some(name) => format!("{} (@{name})", self.id),
            None => self.id.to_string(),
        }
    }
}

// The lookup endpoint hands ids back as strings; hand-written files often use numbers.
fn numeric_id<'de, D: Deserializer<'de>>(de: D) -> Result<u64, D::Error> {
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Raw {
        Num(u64),
        Str(String),
    }
    match Raw::deserialize(de)? {
        Raw::Num(n) => Ok(n),
        Raw::Str(s) => s
            .trim()
            .parse()
            .map_err(|_| serde::de::Error::custom(format!("seed id `{s}` is not numeric"))),
    }
}

/// Read the JSON array of seed users at `path`.
pub fn load_seeds(path: &Path) -> Result<Vec<SeedUser>, EpicosmError> {
    let raw = std::fs::read_to_string(path)
        .map_err(|e| EpicosmError::Seeds(format!("{}: {e}", path.display())))?;
    let seeds: Vec<SeedUser> = serde_json::from_str(&raw)
        .map_err(|e| EpicosmError::Seeds(format!("{}: {e}", path.display())))?;
    info!(path = %path.display(), seeds = seeds.len(), "seeds.loaded");
    Ok(seeds)
}

/// One handle per line; a leading `@` and surrounding blanks are dropped.
pub fn read_handles(path: &Path) -> Result<Vec<String>, EpicosmError> {
    let raw = std::fs::read_to_string(path)
        .map_err(|e| EpicosmError::Seeds(format!("{}: {e}", path.display())))?;
    Ok(raw
        .lines()
        .map(|l| l.trim().trim_start_matches('@').trim())
        .filter(|l| !l.is_empty())
        .map(str::to_string)
        .collect())
}

/// Resolve every handle in `user_list` and rewrite `seeds_file` with the result.
///
/// Handles go out in chunks of [`LOOKUP_CHUNK`]; a chunk the API answers with
/// nothing usable is skipped. The file is left untouched when no handle
/// resolved.
pub async fn refresh_seeds(
    api: &TwitterApi,
    user_list: &Path,
    seeds_file: &Path,
) -> Result<Vec<SeedUser>, HarvestError> {
    let handles = read_handles(user_list)?;
    let mut seeds = Vec::with_capacity(handles.len());

    for (n, chunk) in handles.chunks(LOOKUP_CHUNK).enumerate() {
        let Some(lookup) = api.lookup_usernames(chunk).await? else {
            warn!(chunk = n, handles = chunk.len(), "seeds.lookup.chunk_skipped");
            continue;
        };
        for miss in &lookup.missing {
            warn!(chunk = n, detail = %miss, "seeds.lookup.unresolved");
        }
        for user in lookup.users {
            match user.id.parse::<u64>() {
                Ok(id) => seeds.push(SeedUser {
                    id,
                    username: Some(user.username),
                }),
                Err(_) => warn!(id = %user.id, "seeds.lookup.non_numeric_id"),
            }
        }
    }

    if seeds.is_empty() && !handles.is_empty() {
        warn!(
            requested = handles.len(),
            path = %seeds_file.display(),
            "seeds.refresh.kept_previous"
        );
        return Err(EpicosmError::Seeds(format!(
            "none of {} handles in {} resolved; {} left unchanged",
            handles.len(),
            user_list.display(),
            seeds_file.display()
        ))
        .into());
    }

    std::fs::write(seeds_file, serde_json::to_vec_pretty(&seeds)?).map_err(EpicosmError::from)?;
    info!(
        requested = handles.len(),
        resolved = seeds.len(),
        path = %seeds_file.display(),
        "seeds.refreshed"
    );
    Ok(seeds)
}
