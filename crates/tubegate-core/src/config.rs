//! Runtime configuration.
//!
//! Loaded from YAML (missing file means defaults), then overridden from
//! `TUBEGATE_*` environment variables. Durations are humantime strings.

use crate::artifact::FileArtifact;
use crate::engine::Reconciler;
use crate::error::{ConfigError, StorageError};
use crate::lock::CycleLock;
use crate::reload::{AnyReload, CommandReload, NoReload};
use crate::store::SqliteStore;
use serde::{Deserialize, Deserializer};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

pub const DEFAULT_CONFIG_PATH: &str = "tubegate.yaml";
pub const DEFAULT_ARTIFACT_PATH: &str = "/var/lib/youtube-proxy/youtube_whitelist.txt";

#[derive(Clone, Debug, Deserialize, PartialEq)]
#[serde(default, deny_unknown_fields)]
pub struct Config {
    /// SQLite database holding approvals.
    pub database: PathBuf,

    /// Allow-list file read by the proxy.
    pub artifact: PathBuf,

    pub reload: ReloadConfig,

    /// Lifetime of an approval when the caller gives none.
    #[serde(deserialize_with = "de_duration")]
    pub default_ttl: Duration,

    pub default_label: String,

    /// Attribution for unauthenticated submissions.
    pub default_requester: String,

    /// How often `serve` purges expired approvals and reconciles.
    #[serde(deserialize_with = "de_duration")]
    pub sweep_interval: Duration,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            database: PathBuf::from("tubegate.db"),
            artifact: PathBuf::from(DEFAULT_ARTIFACT_PATH),
            reload: ReloadConfig::default(),
            default_ttl: Duration::from_secs(24 * 60 * 60),
            default_label: "Untitled".to_string(),
            default_requester: "guest".to_string(),
            sweep_interval: Duration::from_secs(60),
        }
    }
}

/// How the enforcement point is told to reread the artifact.
#[derive(Clone, Debug, Deserialize, PartialEq)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum ReloadConfig {
    Command {
        program: String,
        #[serde(default)]
        args: Vec<String>,
        #[serde(default, deserialize_with = "de_opt_duration")]
        timeout: Option<Duration>,
    },
    /// The proxy picks up the file on its own.
    None,
}

impl Default for ReloadConfig {
    fn default() -> Self {
        ReloadConfig::Command {
            program: "systemctl".to_string(),
            args: vec!["reload".to_string(), "squid".to_string()],
            timeout: None,
        }
    }
}

impl ReloadConfig {
    pub fn trigger(&self) -> AnyReload {
        match self {
            ReloadConfig::Command {
                program,
                args,
                timeout,
            } => {
                let cmd = CommandReload::new(program.clone(), args.iter().cloned());
                AnyReload::Command(match timeout {
                    Some(t) => cmd.with_timeout(*t),
                    None => cmd,
                })
            }
            ReloadConfig::None => AnyReload::None(NoReload),
        }
    }
}

impl Config {
    /// Load from `path`. A missing file yields defaults.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        match std::fs::read_to_string(path) {
            Ok(content) => Self::from_yaml(&content, path),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::debug!(path = %path.display(), "config file not found, using defaults");
                Ok(Self::default())
            }
            Err(error) => Err(ConfigError::Read {
                path: path.to_path_buf(),
                error,
            }),
        }
    }

    pub fn from_yaml(content: &str, path: &Path) -> Result<Self, ConfigError> {
        // An empty document deserializes as unit, not as an empty mapping.
        if content.trim().is_empty() {
            return Ok(Self::default());
        }
        let cfg: Config = serde_yaml::from_str(content).map_err(|e| ConfigError::Parse {
            path: path.to_path_buf(),
            message: e.to_string(),
        })?;
        cfg.validate()?;
        Ok(cfg)
    }

    /// Apply `TUBEGATE_*` overrides from the process environment.
    pub fn apply_env(&mut self) -> Result<(), ConfigError> {
        self.apply_env_from(|key| std::env::var(key).ok())
    }

    pub fn apply_env_from<F>(&mut self, lookup: F) -> Result<(), ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(v) = lookup("TUBEGATE_DATABASE") {
            self.database = PathBuf::from(v);
        }

        if let Some(v) = lookup("TUBEGATE_ARTIFACT") {
            self.artifact = PathBuf::from(v);
        }

        if let Some(v) = lookup("TUBEGATE_RELOAD_PROGRAM") {
            self.reload = match (v.as_str(), &self.reload) {
                ("none", _) => ReloadConfig::None,
                (_, ReloadConfig::Command { args, timeout, .. }) => ReloadConfig::Command {
                    program: v.clone(),
                    args: args.clone(),
                    timeout: *timeout,
                },
                (_, ReloadConfig::None) => ReloadConfig::Command {
                    program: v.clone(),
                    args: Vec::new(),
                    timeout: None,
                },
            };
        }

        if let Some(v) = lookup("TUBEGATE_DEFAULT_TTL") {
            self.default_ttl =
                humantime::parse_duration(&v).map_err(|e| ConfigError::Invalid {
                    key: "TUBEGATE_DEFAULT_TTL".to_string(),
                    message: e.to_string(),
                })?;
        }

        self.validate()
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.default_ttl.is_zero() {
            return Err(ConfigError::Invalid {
                key: "default_ttl".to_string(),
                message: "must be greater than zero".to_string(),
            });
        }
        if self.sweep_interval.is_zero() {
            return Err(ConfigError::Invalid {
                key: "sweep_interval".to_string(),
                message: "must be greater than zero".to_string(),
            });
        }
        if let ReloadConfig::Command { program, .. } = &self.reload {
            if program.trim().is_empty() {
                return Err(ConfigError::Invalid {
                    key: "reload.program".to_string(),
                    message: "must not be empty".to_string(),
                });
            }
        }
        Ok(())
    }

    /// Open the store and wire up an engine for this configuration.
    pub fn build_engine(&self) -> Result<Reconciler, StorageError> {
        let store = SqliteStore::open(&self.database)?;
        Ok(Reconciler::new(
            Arc::new(store),
            FileArtifact::new(&self.artifact),
            self.reload.trigger(),
        )
        .with_cycle_lock(CycleLock::beside(&self.artifact)))
    }
}

fn de_duration<'de, D>(d: D) -> Result<Duration, D::Error>
where
    D: Deserializer<'de>,
{
    let s = String::deserialize(d)?;
    humantime::parse_duration(&s).map_err(serde::de::Error::custom)
}

fn de_opt_duration<'de, D>(d: D) -> Result<Option<Duration>, D::Error>
where
    D: Deserializer<'de>,
{
    let s: Option<String> = Option::deserialize(d)?;
    s.map(|s| humantime::parse_duration(&s).map_err(serde::de::Error::custom))
        .transpose()
}
