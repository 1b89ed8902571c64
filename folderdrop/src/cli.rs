//! Command line definition. Global options are parsed by clap; everything from
//! the first mount option on is handed to [`crate::config::parse_mount_args`].

use std::path::PathBuf;

use clap::{ArgAction, Parser};

use crate::config::{BASE_URL_ENV, is_mount_option};
use crate::sync::cache::DEFAULT_PAGE_SIZE;

const MOUNT_HELP: &str = "\
Mounts (after the options above, repeatable):
  -m, --mount <NAME>          Start a mount definition
  -p, --path <DIR>            Local directory to bookmark
  -P, --patterns <REGEX,..>   File name patterns, full match [default: .*]
  -t, --tags <TAG,..>         Tags added to every bookmark
  -c, --collection <TITLE>    Target collection
  -l, --link-prefix <URL>     URL the file names are appended to

Environment:
  RD_TOKEN    Raindrop.io access token (required)
  RD_VERBOSE  Debug logging when set to 1/true/yes/on
  RD_BASE_URL API base URL override";

/// Bookmark the files of local directories into Raindrop.io collections.
///
/// Every matching file gets exactly one bookmark; files already bookmarked
/// are skipped.
#[derive(Parser, Debug)]
#[command(name = "folderdrop")]
#[command(version, about, long_about = None, after_help = MOUNT_HELP)]
pub struct Cli {
    /// Increase verbosity (-v info, -vv debug)
    #[arg(short, long, action = ArgAction::Count)]
    pub verbose: u8,

    /// Mount definitions file [default: <config dir>/folderdrop/mounts.toml]
    #[arg(short = 'C', long = "config-file", value_name = "FILE")]
    pub config_file: Option<PathBuf>,

    /// Look everything up but create nothing
    #[arg(short, long)]
    pub dry_run: bool,

    /// Bookmarks requested per listing page
    #[arg(long, value_name = "N", default_value_t = DEFAULT_PAGE_SIZE,
          value_parser = clap::value_parser!(u32).range(1..=50))]
    pub page_size: u32,

    /// Attempts per remote call before giving up
    #[arg(long, value_name = "N", default_value_t = 3,
          value_parser = clap::value_parser!(u32).range(1..))]
    pub max_attempts: u32,

    /// Write the lookup cache contents to this file after the run
    #[arg(long, value_name = "PATH")]
    pub cache_report: Option<PathBuf>,

    /// Stop at the first mount that fails
    #[arg(long)]
    pub fail_fast: bool,

    /// Raindrop.io API base URL
    #[arg(long, value_name = "URL", env = BASE_URL_ENV, hide_env_values = true)]
    pub base_url: Option<String>,
}

/// Splits raw arguments (program name included) into the part clap parses
/// and the trailing mount definitions.
pub fn split_mount_args(args: Vec<String>) -> (Vec<String>, Vec<String>) {
    let start = args
        .iter()
        .skip(1)
        .position(|arg| is_mount_option(arg))
        .map_or(args.len(), |index| index + 1);
    let mut global = args;
    let mounts = global.split_off(start);
    (global, mounts)
}
