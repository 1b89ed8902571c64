use std::error::Error;
use std::process::ExitCode;

use clap::Parser;
use folderdrop::cli::{Cli, split_mount_args};
use folderdrop::config::{ConfigError, VERBOSE_ENV, read_bool_env};
use raindrop_core::{ApiErrorClass, RaindropError};
use tracing_subscriber::EnvFilter;

const AUTH_HINT: &str = "set RD_TOKEN to a valid Raindrop.io access token";

#[tokio::main(flavor = "current_thread")]
async fn main() -> ExitCode {
    dotenvy::dotenv().ok();
    let (global, mount_args) = split_mount_args(std::env::args().collect());
    let cli = match Cli::try_parse_from(global) {
        Ok(cli) => cli,
        Err(err) => err.exit(),
    };

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::new(log_filter(
            cli.verbose,
            read_bool_env(VERBOSE_ENV, false),
        )))
        .with_writer(std::io::stderr)
        .with_target(false)
        .without_time()
        .init();

    match folderdrop::app::run(cli, mount_args).await {
        Ok(summary) if summary.is_success() => ExitCode::SUCCESS,
        Ok(summary) => {
            if summary
                .failures
                .iter()
                .any(|failure| is_auth_failure(&failure.error))
            {
                eprintln!("Hint: {AUTH_HINT}");
            }
            ExitCode::FAILURE
        }
        Err(err) => {
            eprintln!("Error: {err}");
            if err.chain().any(is_auth_failure) {
                eprintln!("Hint: {AUTH_HINT}");
            }
            ExitCode::FAILURE
        }
    }
}

// 0 = warn, 1 = info, 2+ (or RD_VERBOSE) = debug
fn log_filter(verbose: u8, env_verbose: bool) -> &'static str {
    let level = if env_verbose { verbose.max(2) } else { verbose };
    match level {
        0 => "folderdrop=warn",
        1 => "folderdrop=info",
        _ => "folderdrop=debug",
    }
}

fn is_auth_failure(err: &(dyn Error + 'static)) -> bool {
    std::iter::successors(Some(err), |err| (*err).source()).any(|err| {
        matches!(
            err.downcast_ref::<ConfigError>(),
            Some(ConfigError::MissingToken)
        ) || err
            .downcast_ref::<RaindropError>()
            .and_then(RaindropError::classification)
            == Some(ApiErrorClass::Auth)
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn log_filter_follows_verbosity() {
        assert_eq!(log_filter(0, false), "folderdrop=warn");
        assert_eq!(log_filter(1, false), "folderdrop=info");
        assert_eq!(log_filter(3, false), "folderdrop=debug");
        assert_eq!(log_filter(0, true), "folderdrop=debug");
    }

    #[test]
    fn auth_failures_are_recognized_through_sources() {
        assert!(is_auth_failure(&ConfigError::MissingToken));
        assert!(!is_auth_failure(&ConfigError::NoMounts));

        let lookup = ConfigError::CollectionLookup {
            mount: "docs".into(),
            collection: "Docs".into(),
            source: RaindropError::Api {
                status: raindrop_core::StatusCode::UNAUTHORIZED,
                body: String::new(),
                retry_after: None,
            },
        };
        assert!(is_auth_failure(&lookup));

        let wrapped = anyhow::Error::from(lookup).context("while resolving mounts");
        assert!(wrapped.chain().any(is_auth_failure));
    }
}
