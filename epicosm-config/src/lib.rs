//! Loader for harvester configuration with YAML + environment overlays.
//!
//! Sources are merged in order: an optional YAML file (or inline snippet), then
//! `EPICOSM__`-prefixed environment variables (`__` separates nesting, so
//! `EPICOSM__TWITTER__BEARER_TOKEN` sets `twitter.bearer_token`). Every string
//! value then goes through `${VAR}` expansion before the typed structs are built
//! and validated.
use config::{Config, ConfigError, Environment, File};
use serde::Deserialize;
use serde_json::Value;
use std::path::{Path, PathBuf};

const MAXIMUM_ENV_EXPANSION_DEPTH: usize = 8;

/// Upper bound the follow-list endpoint accepts for `max_results`.
pub const FOLLOWS_PAGE_CEILING: u32 = 1000;
/// Bounds the recent-search endpoint accepts for `max_results`.
pub const RECENT_MIN_RESULTS: u32 = 10;
pub const RECENT_MAX_RESULTS: u32 = 100;
/// Bounds the user-timeline endpoint accepts for `max_results`.
pub const TIMELINE_MIN_RESULTS: u32 = 5;
pub const TIMELINE_MAX_RESULTS: u32 = 100;
/// The recent-search endpoint never returns anything older than this.
pub const RECENT_WINDOW_DAYS: u32 = 7;

#[derive(Debug, Clone, Deserialize)]
pub struct EpicosmConfig {
    pub twitter: TwitterConfig,
    #[serde(default)]
    pub backoff: BackoffConfig,
    #[serde(default)]
    pub database: DatabaseConfig,
    #[serde(default)]
    pub harvest: HarvestConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct TwitterConfig {
    pub bearer_token: String,
    #[serde(default = "default_base_url")]
    pub base_url: String,
    #[serde(default = "default_user_agent")]
    pub user_agent: String,
}

/// Retry schedule for rate-limited or unavailable responses, in abstract time units.
#[derive(Debug, Clone, Deserialize)]
pub struct BackoffConfig {
    #[serde(default = "default_backoff_initial")]
    pub initial: u64,
    #[serde(default = "default_backoff_factor")]
    pub factor: u64,
    #[serde(default = "default_backoff_cap")]
    pub cap: u64,
    /// Length of one time unit in milliseconds.
    #[serde(default = "default_backoff_unit_ms")]
    pub unit_ms: u64,
}

impl Default for BackoffConfig {
    fn default() -> Self {
        Self {
            initial: default_backoff_initial(),
            factor: default_backoff_factor(),
            cap: default_backoff_cap(),
            unit_ms: default_backoff_unit_ms(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct DatabaseConfig {
    #[serde(default = "default_database_url")]
    pub url: String,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            url: default_database_url(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct HarvestConfig {
    /// JSON array of seed users (`[{"id": ..., "username": ...}]`).
    #[serde(default = "default_seeds_file")]
    pub seeds_file: PathBuf,
    /// Plain-text handle list used to rebuild `seeds_file`.
    #[serde(default = "default_user_list")]
    pub user_list: PathBuf,
    #[serde(default = "default_follows_page_size")]
    pub follows_page_size: u32,
    #[serde(default = "default_timeline_page_size")]
    pub timeline_page_size: u32,
    #[serde(default = "default_recent_max_results")]
    pub recent_max_results: u32,
    #[serde(default = "default_lookback_days")]
    pub lookback_days: u32,
}

impl Default for HarvestConfig {
    fn default() -> Self {
        Self {
            seeds_file: default_seeds_file(),
            user_list: default_user_list(),
            follows_page_size: default_follows_page_size(),
            timeline_page_size: default_timeline_page_size(),
            recent_max_results: default_recent_max_results(),
            lookback_days: default_lookback_days(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    #[serde(default)]
    pub dir: Option<PathBuf>,
    #[serde(default = "default_log_format")]
    pub format: String,
    #[serde(default = "default_true")]
    pub stderr: bool,
    #[serde(default = "default_log_filter")]
    pub filter: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            dir: None,
            format: default_log_format(),
            stderr: true,
            filter: default_log_filter(),
        }
    }
}

fn default_base_url() -> String {
    "https://api.twitter.com".into()
}
fn default_user_agent() -> String {
    "v2FullArchiveSearchPython".into()
}
fn default_backoff_initial() -> u64 {
    1
}
fn default_backoff_factor() -> u64 {
    5
}
fn default_backoff_cap() -> u64 {
    900
}
fn default_backoff_unit_ms() -> u64 {
    1000
}
fn default_database_url() -> String {
    "sqlite://epicosm.db".into()
}
fn default_seeds_file() -> PathBuf {
    PathBuf::from("user_details.json")
}
fn default_user_list() -> PathBuf {
    PathBuf::from("user_list")
}
fn default_follows_page_size() -> u32 {
    FOLLOWS_PAGE_CEILING
}
fn default_timeline_page_size() -> u32 {
    TIMELINE_MAX_RESULTS
}
fn default_recent_max_results() -> u32 {
    RECENT_MIN_RESULTS
}
fn default_lookback_days() -> u32 {
    RECENT_WINDOW_DAYS
}
fn default_log_format() -> String {
    "text".into()
}
fn default_log_filter() -> String {
    "info".into()
}
fn default_true() -> bool {
    true
}

impl EpicosmConfig {
    /// Reject values the upstream API or the retry loop cannot work with.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let fail = |msg: String| Err(ConfigError::Message(msg));

        if self.twitter.bearer_token.trim().is_empty() || self.twitter.bearer_token.contains("${")
        {
            return fail("twitter.bearer_token is empty or unresolved".into());
        }
        if self.backoff.initial == 0 {
            return fail("backoff.initial must be at least 1".into());
        }
        if self.backoff.factor < 1 {
            return fail("backoff.factor must be at least 1".into());
        }
        if self.backoff.cap < self.backoff.initial {
            return fail(format!(
                "backoff.cap ({}) is below backoff.initial ({})",
                self.backoff.cap, self.backoff.initial
            ));
        }
        let h = &self.harvest;
        if h.follows_page_size == 0 || h.follows_page_size > FOLLOWS_PAGE_CEILING {
            return fail(format!(
                "harvest.follows_page_size must be within 1..={FOLLOWS_PAGE_CEILING}"
            ));
        }
        if !(RECENT_MIN_RESULTS..=RECENT_MAX_RESULTS).contains(&h.recent_max_results) {
            return fail(format!(
                "harvest.recent_max_results must be within {RECENT_MIN_RESULTS}..={RECENT_MAX_RESULTS}"
            ));
        }
        if !(TIMELINE_MIN_RESULTS..=TIMELINE_MAX_RESULTS).contains(&h.timeline_page_size) {
            return fail(format!(
                "harvest.timeline_page_size must be within {TIMELINE_MIN_RESULTS}..={TIMELINE_MAX_RESULTS}"
            ));
        }
        if h.lookback_days == 0 || h.lookback_days > RECENT_WINDOW_DAYS {
            return fail(format!(
                "harvest.lookback_days must be within 1..={RECENT_WINDOW_DAYS}"
            ));
        }
        if !matches!(
            self.logging.format.to_ascii_lowercase().as_str(),
            "text" | "json"
        ) {
            return fail(format!("logging.format '{}' is not text|json", self.logging.format));
        }
        Ok(())
    }
}

fn expand_env_in_value(v: &mut Value) {
    match v {
        Value::String(s) => {
            if s.contains('$') {
                let mut cur = std::mem::take(s);
                for _ in 0..MAXIMUM_ENV_EXPANSION_DEPTH {
                    let expanded = match shellexpand::env(&cur) {
                        Ok(cow) => cow.into_owned(),
                        Err(_) => cur.clone(),
                    };
                    if expanded == cur {
                        break;
                    }
                    cur = expanded;
                }
                *s = cur;
            }
        }
        Value::Array(arr) => arr.iter_mut().for_each(expand_env_in_value),
        Value::Object(obj) => obj.values_mut().for_each(expand_env_in_value),
        _ => {}
    }
}

/// Builder hides the `config` crate wiring (YAML + env overrides).
pub struct EpicosmConfigLoader {
    builder: config::ConfigBuilder<config::builder::DefaultState>,
    // Environment overrides are added last so they win over every file source.
    env_prefix: &'static str,
}

impl Default for EpicosmConfigLoader {
    fn default() -> Self {
        Self::new()
    }
}

impl EpicosmConfigLoader {
    /// Start empty; `EPICOSM__` environment overrides are applied at [`load`](Self::load).
    ///
    /// ```
    /// use epicosm_config::EpicosmConfigLoader;
    ///
    /// let config = EpicosmConfigLoader::new()
    ///     .with_yaml_str("twitter:\n  bearer_token: abc")
    ///     .load()
    ///     .expect("valid config");
    ///
    /// assert_eq!(config.twitter.base_url, "https://api.twitter.com");
    /// assert_eq!(config.backoff.factor, 5);
    /// assert_eq!(config.harvest.follows_page_size, 1000);
    /// ```
    pub fn new() -> Self {
        Self {
            builder: Config::builder(),
            env_prefix: "EPICOSM",
        }
    }

    /// Attach a YAML/TOML/JSON file; the `config` crate infers format by suffix.
    pub fn with_file<P: AsRef<Path>>(mut self, path: P) -> Self {
        self.builder = self
            .builder
            .add_source(File::from(path.as_ref()).required(true));
        self
    }

    /// Attach a file that may be absent, so deployments can rely purely on environment variables.
    pub fn with_optional_file<P: AsRef<Path>>(mut self, path: P) -> Self {
        self.builder = self
            .builder
            .add_source(File::from(path.as_ref()).required(false));
        self
    }

    /// Allow tests/CLI to merge inline YAML snippets.
    pub fn with_yaml_str(mut self, yaml: &str) -> Self {
        self.builder = self
            .builder
            .add_source(File::from_str(yaml, config::FileFormat::Yaml));
        self
    }

    /// Consume the builder, expand `${VAR}` placeholders and validate.
    ///
    /// ```
    /// use epicosm_config::EpicosmConfigLoader;
    ///
    /// unsafe { std::env::set_var("DOCTEST_BEARER", "from-env"); }
    ///
    /// let config = EpicosmConfigLoader::new()
    ///     .with_yaml_str(r#"
    /// twitter:
    ///   bearer_token: "${DOCTEST_BEARER}"
    /// backoff:
    ///   unit_ms: 10
    /// "#)
    ///     .load()
    ///     .expect("valid configuration");
    ///
    /// assert_eq!(config.twitter.bearer_token, "from-env");
    /// assert_eq!(config.backoff.unit_ms, 10);
    /// assert_eq!(config.backoff.cap, 900);
    ///
    /// unsafe { std::env::remove_var("DOCTEST_BEARER"); }
    /// ```
    pub fn load(self) -> Result<EpicosmConfig, ConfigError> {
        let cfg = self
            .builder
            .add_source(
                Environment::with_prefix(self.env_prefix)
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        let mut v: Value = cfg.try_deserialize()?;
        expand_env_in_value(&mut v);

        let typed: EpicosmConfig =
            serde_json::from_value(v).map_err(|e| ConfigError::Message(e.to_string()))?;
        typed.validate()?;

        Ok(typed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn minimal() -> EpicosmConfig {
        EpicosmConfigLoader::new()
            .with_yaml_str("twitter:\n  bearer_token: token")
            .load()
            .unwrap()
    }

    #[test]
    fn expands_simple_string() {
        temp_env::with_var("FOO", Some("bar"), || {
            let mut v = json!("prefix-${FOO}-suffix");
            expand_env_in_value(&mut v);
            assert_eq!(v, json!("prefix-bar-suffix"));
        });
    }

    #[test]
    fn expands_in_array_and_object() {
        temp_env::with_vars([("CITY", Some("Bristol")), ("REGION", Some("SW"))], || {
            let mut v = json!(["hello-$CITY", { "loc": "${CITY}-${REGION}" }, 42, true, null]);
            expand_env_in_value(&mut v);
            assert_eq!(v, json!(["hello-Bristol", { "loc": "Bristol-SW" }, 42, true, null]));
        });
    }

    #[test]
    fn stops_on_cycles() {
        temp_env::with_vars([("A", Some("${B}")), ("B", Some("${A}"))], || {
            let mut v = json!("x=${A}-y");
            expand_env_in_value(&mut v);
            let s = v.as_str().unwrap();
            assert!(s.starts_with("x=") && s.ends_with("-y"));
            assert!(s.contains("${"));
        });
    }

    #[test]
    fn defaults_match_upstream_limits() {
        let cfg = minimal();
        assert_eq!(cfg.backoff.initial, 1);
        assert_eq!(cfg.backoff.factor, 5);
        assert_eq!(cfg.backoff.cap, 900);
        assert_eq!(cfg.harvest.follows_page_size, 1000);
        assert_eq!(cfg.harvest.recent_max_results, 10);
        assert_eq!(cfg.harvest.lookback_days, 7);
        assert_eq!(cfg.database.url, "sqlite://epicosm.db");
        assert_eq!(cfg.harvest.seeds_file, PathBuf::from("user_details.json"));
    }

    #[test]
    fn rejects_unresolved_token() {
        let err = EpicosmConfigLoader::new()
            .with_yaml_str("twitter:\n  bearer_token: \"${NOT_SET_ANYWHERE_XYZ}\"")
            .load()
            .unwrap_err();
        assert!(err.to_string().contains("bearer_token"));
    }

    #[test]
    fn rejects_oversized_follow_pages() {
        let err = EpicosmConfigLoader::new()
            .with_yaml_str("twitter:\n  bearer_token: t\nharvest:\n  follows_page_size: 5000")
            .load()
            .unwrap_err();
        assert!(err.to_string().contains("follows_page_size"));
    }

    #[test]
    fn rejects_cap_below_initial() {
        let mut cfg = minimal();
        cfg.backoff.initial = 10;
        cfg.backoff.cap = 5;
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn rejects_unknown_log_format() {
        let mut cfg = minimal();
        cfg.logging.format = "yaml".into();
        assert!(cfg.validate().is_err());
    }
}
