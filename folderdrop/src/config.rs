use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::path::{Path, PathBuf};

use raindrop_core::{RaindropClient, RaindropError};
use serde::Deserialize;
use thiserror::Error;
use tracing::debug;
use url::Url;

use crate::sync::matcher::PatternMatcher;
use crate::sync::{MountSpec, Mounts};

pub const TOKEN_ENV: &str = "RD_TOKEN";
pub const VERBOSE_ENV: &str = "RD_VERBOSE";
pub const BASE_URL_ENV: &str = "RD_BASE_URL";

const CONFIG_DIR_NAME: &str = "folderdrop";
const CONFIG_FILE_NAME: &str = "mounts.toml";
const MATCH_ALL: &str = ".*";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("missing value for {option}")]
    MissingValue { option: String },
    #[error("{0} needs a mount; define one with -m/--mount first")]
    OptionMissingMount(String),
    #[error("mount {0} is defined twice")]
    DuplicateMount(String),
    #[error("unknown option: {0}")]
    UnknownOption(String),
    #[error("failed to read config file {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse config file {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },
    #[error("invalid mount configuration:\n{}", format_problems(.0))]
    InvalidMounts(Vec<MountProblem>),
    #[error("failed to look up collection {collection:?} for mount {mount}: {source}")]
    CollectionLookup {
        mount: String,
        collection: String,
        #[source]
        source: RaindropError,
    },
    #[error("missing account token; set RD_TOKEN")]
    MissingToken,
    #[error("no mounts configured; use -m/--mount or a config file")]
    NoMounts,
}

/// One thing wrong with one mount definition.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MountProblem {
    pub mount: String,
    pub problem: String,
}

impl fmt::Display for MountProblem {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "mount {}: {}", self.mount, self.problem)
    }
}

fn format_problems(problems: &[MountProblem]) -> String {
    problems
        .iter()
        .map(|p| format!("  - {p}"))
        .collect::<Vec<_>>()
        .join("\n")
}

/// Mount settings as written by the user, before validation. Every field is
/// optional so file and command line definitions can be layered.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct MountDefinition {
    pub path: Option<String>,
    pub patterns: Option<Vec<String>>,
    pub tags: Option<Vec<String>>,
    pub collection: Option<String>,
    pub link_prefix: Option<String>,
}

impl MountDefinition {
    /// Overrides the fields `other` sets and keeps the rest.
    pub fn merge(&mut self, other: MountDefinition) {
        if other.path.is_some() {
            self.path = other.path;
        }
        if other.patterns.is_some() {
            self.patterns = other.patterns;
        }
        if other.tags.is_some() {
            self.tags = other.tags;
        }
        if other.collection.is_some() {
            self.collection = other.collection;
        }
        if other.link_prefix.is_some() {
            self.link_prefix = other.link_prefix;
        }
    }
}

pub type MountDefinitions = BTreeMap<String, MountDefinition>;

#[derive(Debug, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
struct ConfigFile {
    mounts: MountDefinitions,
}

/// Splits a comma separated value, trimming items and dropping empty ones.
pub fn parse_list(value: &str) -> Vec<String> {
    value
        .split(',')
        .map(str::trim)
        .filter(|item| !item.is_empty())
        .map(str::to_string)
        .collect()
}

/// Parses the mount definitions trailing the global options, e.g.
/// `-m docs -p ~/Documents -c Docs -l https://files.example/docs`.
/// Long options also accept the `--name=value` form.
pub fn parse_mount_args<I>(args: I) -> Result<MountDefinitions, ConfigError>
where
    I: IntoIterator<Item = String>,
{
    let mut mounts = MountDefinitions::new();
    let mut current: Option<String> = None;
    let mut args = args.into_iter();

    while let Some(arg) = args.next() {
        let (option, inline) = match arg.split_once('=') {
            Some((name, value)) if name.starts_with("--") => {
                (name.to_string(), Some(value.to_string()))
            }
            _ => (arg, None),
        };
        if !is_mount_option(&option) {
            return Err(ConfigError::UnknownOption(option));
        }
        let value = match inline {
            Some(value) => value,
            None => args.next().ok_or_else(|| ConfigError::MissingValue {
                option: option.clone(),
            })?,
        };

        if matches!(option.as_str(), "-m" | "--mount") {
            if mounts.contains_key(&value) {
                return Err(ConfigError::DuplicateMount(value));
            }
            mounts.insert(value.clone(), MountDefinition::default());
            current = Some(value);
            continue;
        }

        let Some(mount) = current.as_ref().and_then(|name| mounts.get_mut(name)) else {
            return Err(ConfigError::OptionMissingMount(option));
        };
        match option.as_str() {
            "-p" | "--path" => mount.path = Some(value),
            "-P" | "--patterns" => mount.patterns = Some(parse_list(&value)),
            "-t" | "--tags" => mount.tags = Some(parse_list(&value)),
            "-c" | "--collection" => mount.collection = Some(value),
            "-l" | "--link-prefix" => mount.link_prefix = Some(value),
            _ => return Err(ConfigError::UnknownOption(option)),
        }
    }
    Ok(mounts)
}

pub fn is_mount_option(arg: &str) -> bool {
    // Only long options take an inline `=value`.
    let name = match arg.split_once('=') {
        Some((name, _)) if name.starts_with("--") => name,
        _ => arg,
    };
    matches!(
        name,
        "-m" | "--mount"
            | "-p"
            | "--path"
            | "-P"
            | "--patterns"
            | "-t"
            | "--tags"
            | "-c"
            | "--collection"
            | "-l"
            | "--link-prefix"
    )
}

pub fn parse_config_str(text: &str, path: &Path) -> Result<MountDefinitions, ConfigError> {
    let file: ConfigFile = toml::from_str(text).map_err(|source| ConfigError::Parse {
        path: path.to_path_buf(),
        source,
    })?;
    Ok(file.mounts)
}

pub async fn load_config_file(path: &Path) -> Result<MountDefinitions, ConfigError> {
    let text = tokio::fs::read_to_string(path)
        .await
        .map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
    let mounts = parse_config_str(&text, path)?;
    debug!(path = %path.display(), mounts = mounts.len(), "loaded config file");
    Ok(mounts)
}

pub fn default_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|dir| dir.join(CONFIG_DIR_NAME).join(CONFIG_FILE_NAME))
}

/// File mounts first; a command line mount with the same name overrides only
/// the fields it sets.
pub fn merge_mounts(file: MountDefinitions, cli: MountDefinitions) -> MountDefinitions {
    let mut merged = file;
    for (name, definition) in cli {
        merged.entry(name).or_default().merge(definition);
    }
    merged
}

pub fn expand_with_home(value: &str, home: Option<&Path>) -> PathBuf {
    let Some(home) = home else {
        return PathBuf::from(value);
    };
    if value == "~" {
        return home.to_path_buf();
    }
    if let Some(rest) = value.strip_prefix("~/") {
        return home.join(rest);
    }
    PathBuf::from(value)
}

pub fn read_bool_env(name: &str, default: bool) -> bool {
    std::env::var(name)
        .ok()
        .map(|value| {
            matches!(
                value.trim().to_ascii_lowercase().as_str(),
                "1" | "true" | "yes" | "on"
            )
        })
        .unwrap_or(default)
}

pub fn read_token_env() -> Result<String, ConfigError> {
    std::env::var(TOKEN_ENV)
        .ok()
        .map(|token| token.trim().to_string())
        .filter(|token| !token.is_empty())
        .ok_or(ConfigError::MissingToken)
}

/// Validates every definition and resolves collection names to ids. All
/// problems of all mounts are collected before failing.
pub async fn resolve_mounts(
    client: &RaindropClient,
    definitions: MountDefinitions,
) -> Result<Mounts, ConfigError> {
    if definitions.is_empty() {
        return Err(ConfigError::NoMounts);
    }
    let home = dirs::home_dir();
    let mut collection_ids: HashMap<String, Option<i64>> = HashMap::new();
    let mut problems = Vec::new();
    let mut mounts = Mounts::new();

    for (name, definition) in definitions {
        debug!(mount = %name, ?definition, "checking mount");
        let mut report = |problem: String| {
            problems.push(MountProblem {
                mount: name.clone(),
                problem,
            })
        };

        let local_path = match &definition.path {
            None => {
                report("missing path".to_string());
                None
            }
            Some(raw) => {
                let path = expand_with_home(raw, home.as_deref());
                match tokio::fs::metadata(&path).await {
                    Ok(metadata) if metadata.is_dir() => Some(path),
                    Ok(_) => {
                        report(format!("{} is not a directory", path.display()));
                        None
                    }
                    Err(err) => {
                        report(format!("cannot access {}: {err}", path.display()));
                        None
                    }
                }
            }
        };

        let link_prefix = match &definition.link_prefix {
            None => {
                report("missing link prefix".to_string());
                None
            }
            Some(raw) => match Url::parse(raw) {
                Ok(url) if url.cannot_be_a_base() => {
                    report(format!("link prefix {raw:?} cannot take a path"));
                    None
                }
                Ok(url) => Some(url),
                Err(err) => {
                    report(format!("link prefix {raw:?} is not a valid URL: {err}"));
                    None
                }
            },
        };

        let patterns = match definition.patterns.as_deref() {
            None | Some([]) => PatternMatcher::compile([MATCH_ALL]),
            Some(patterns) => PatternMatcher::compile(patterns),
        };
        let patterns = match patterns {
            Ok(patterns) => Some(patterns),
            Err(err) => {
                report(err.to_string());
                None
            }
        };

        let collection_id = match &definition.collection {
            None => {
                report("missing collection".to_string());
                None
            }
            Some(title) => {
                let id = match collection_ids.get(title) {
                    Some(id) => *id,
                    None => {
                        let found = client.find_collection(title).await.map_err(|source| {
                            ConfigError::CollectionLookup {
                                mount: name.clone(),
                                collection: title.clone(),
                                source,
                            }
                        })?;
                        let id = found.map(|collection| collection.id);
                        collection_ids.insert(title.clone(), id);
                        id
                    }
                };
                if id.is_none() {
                    report(format!("no such collection: {title}"));
                }
                id
            }
        };

        if let (Some(local_path), Some(link_prefix), Some(patterns), Some(collection_id)) =
            (local_path, link_prefix, patterns, collection_id)
        {
            mounts.insert(
                name,
                MountSpec {
                    collection_id,
                    link_prefix,
                    local_path,
                    tags: definition.tags.unwrap_or_default(),
                    patterns,
                },
            );
        }
    }

    if !problems.is_empty() {
        return Err(ConfigError::InvalidMounts(problems));
    }
    Ok(mounts)
}

#[cfg(test)]
#[path = "config_tests.rs"]
mod tests;
