use clap::{Args, Parser, Subcommand};
use epicosm_harvest::Collection;
use std::path::PathBuf;

#[derive(Debug, Parser)]
#[command(name = "epicosm", version, about = "Harvest follow graphs, timelines and pseudofeeds from Twitter v2")]
pub struct Cli {
    /// YAML configuration file; `EPICOSM__*` environment variables override it.
    #[arg(long, short, default_value = "epicosm.yaml", env = "EPICOSM_CONFIG")]
    pub config: PathBuf,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Run one or more harvest jobs over the seed list.
    Harvest(HarvestArgs),
    /// Apply a scoring algorithm to every document of a collection.
    Score {
        #[arg(long)]
        collection: Collection,
        #[arg(long, default_value = "word_count")]
        algorithm: String,
    },
}

#[derive(Debug, Clone, Args)]
pub struct HarvestArgs {
    /// Harvest each seed's own timeline into `posts`.
    #[arg(long)]
    pub timelines: bool,
    /// Harvest the accounts each seed follows.
    #[arg(long = "get-follows")]
    pub get_follows: bool,
    /// Build one pseudofeed per seed from stored follow edges.
    #[arg(long)]
    pub pseudofeed: bool,
    /// Resolve the handle list again and rewrite the seed file first.
    #[arg(long)]
    pub refresh: bool,
    /// Re-run every DAYS days until interrupted.
    #[arg(long, value_name = "DAYS", value_parser = clap::value_parser!(u32).range(1..))]
    pub repeat: Option<u32>,
}

impl HarvestArgs {
    /// With no job selected, harvest timelines.
    pub fn timelines_selected(&self) -> bool {
        self.timelines || !(self.get_follows || self.pseudofeed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_harvest_flags() {
        let cli = Cli::try_parse_from(["epicosm", "harvest", "--get-follows", "--pseudofeed", "--repeat", "3"])
            .unwrap();
        let Command::Harvest(args) = cli.command else {
            panic!("expected harvest");
        };
        assert!(args.get_follows && args.pseudofeed);
        assert!(!args.timelines_selected());
        assert_eq!(args.repeat, Some(3));
        assert_eq!(cli.config, PathBuf::from("epicosm.yaml"));
    }

    #[test]
    fn bare_harvest_means_timelines() {
        let cli = Cli::try_parse_from(["epicosm", "harvest"]).unwrap();
        let Command::Harvest(args) = cli.command else {
            panic!("expected harvest");
        };
        assert!(args.timelines_selected());
    }

    #[test]
    fn score_needs_a_known_collection() {
        let cli = Cli::try_parse_from(["epicosm", "score", "--collection", "pseudofeed"]).unwrap();
        match cli.command {
            Command::Score { collection, algorithm } => {
                assert_eq!(collection, Collection::Pseudofeed);
                assert_eq!(algorithm, "word_count");
            }
            other => panic!("unexpected {other:?}"),
        }
        assert!(Cli::try_parse_from(["epicosm", "score", "--collection", "users"]).is_err());
        assert!(Cli::try_parse_from(["epicosm", "harvest", "--repeat", "0"]).is_err());
    }
}
