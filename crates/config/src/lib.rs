//! Manages server configuration by loading settings from standard locations.
//!
//! This crate provides a unified configuration object ([`Config`]) that
//! aggregates settings from an embedded defaults file, the user's platform
//! configuration directory, an optional explicit file, and environment
//! variables, in that order of precedence.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use etcetera::BaseStrategy;
use figment::providers::{Env, Format, Toml};
use figment::{Figment, Metadata, Provider};
use serde::{Deserialize, Serialize};

/// The default configuration values
const DEFAULT_TOML_CONFIG: &str = include_str!("./localhub.default.toml");

//================================================================================================
// Types
//================================================================================================

/// Represents the server's primary configuration structure.
#[derive(Deserialize, Serialize, Default, Debug, Clone)]
pub struct Config {
    /// Title reported by the stubbed HTML surface.
    #[serde(default)]
    pub app_title: String,
    /// The directory under which `owner/repo` directories are resolved.
    #[serde(default)]
    pub repo_root: PathBuf,
    /// Logical `owner/repo` mounts pointing at arbitrary filesystem paths.
    ///
    /// Paths configured here are trusted verbatim and bypass the sanitized
    /// `repo_root` join.
    #[serde(default)]
    pub virtual_repos: VirtualRepos,
    /// Listener settings.
    #[serde(default)]
    pub listen: Listen,
    /// Subdomain-to-path-prefix mapping settings.
    #[serde(default)]
    pub subdomain_mapping: SubdomainMapping,
    /// Log output settings.
    #[serde(default)]
    pub logs: Logs,
}

/// A map of `owner -> repo -> mount`.
pub type VirtualRepos = HashMap<String, HashMap<String, VirtualRepo>>;

/// A single virtual repository mount.
#[derive(Deserialize, Serialize, Debug, Clone)]
pub struct VirtualRepo {
    /// Absolute filesystem path of the repository, used verbatim.
    pub path: PathBuf,
}

/// Listener configuration for the plain and TLS endpoints.
#[derive(Deserialize, Serialize, Default, Debug, Clone)]
pub struct Listen {
    /// The plain HTTP listener, always present.
    #[serde(default)]
    pub http: HttpListen,
    /// The optional TLS listener.
    #[serde(default)]
    pub https: Option<HttpsListen>,
}

/// Bind address for the plain HTTP listener.
#[derive(Deserialize, Serialize, Debug, Clone)]
pub struct HttpListen {
    /// Port to bind; `0` binds an ephemeral port.
    #[serde(default = "default_http_port")]
    pub port: u16,
    /// Host/interface to bind.
    #[serde(default = "default_host")]
    pub host: String,
}

/// Bind address and key material for the TLS listener.
///
/// When `key`/`cert` are absent a self-signed pair is generated at startup.
#[derive(Deserialize, Serialize, Debug, Clone)]
pub struct HttpsListen {
    /// Port to bind; `0` binds an ephemeral port.
    #[serde(default = "default_https_port")]
    pub port: u16,
    /// Host/interface to bind.
    #[serde(default = "default_host")]
    pub host: String,
    /// PEM-encoded private key file.
    #[serde(default)]
    pub key: Option<PathBuf>,
    /// PEM-encoded certificate chain file.
    #[serde(default)]
    pub cert: Option<PathBuf>,
}

/// Settings for mapping `Host` subdomains onto path prefixes.
#[derive(Deserialize, Serialize, Default, Debug, Clone)]
pub struct SubdomainMapping {
    /// Whether the rewrite is active.
    #[serde(default)]
    pub enable: bool,
    /// Base domains whose subdomain portion is turned into path segments.
    #[serde(default)]
    pub base_domains: Vec<String>,
}

/// Log output settings.
#[derive(Deserialize, Serialize, Debug, Clone)]
pub struct Logs {
    /// Default level directive, overridden by `RUST_LOG` and CLI flags.
    #[serde(default = "default_log_level")]
    pub level: String,
    /// When set, JSON logs are additionally written to this directory.
    #[serde(default)]
    pub logs_dir: Option<PathBuf>,
    /// Request-log flavor; currently `"dev"` or `"none"`.
    #[serde(default = "default_req_log_format")]
    pub req_log_format: String,
}

//================================================================================================
// Impls
//================================================================================================

impl Default for HttpListen {
    fn default() -> Self {
        Self {
            port: default_http_port(),
            host: default_host(),
        }
    }
}

impl Default for Logs {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            logs_dir: None,
            req_log_format: default_req_log_format(),
        }
    }
}

impl Config {
    /// Looks up a virtual repository mount, if one is configured.
    pub fn virtual_repo(&self, owner: &str, repo: &str) -> Option<&VirtualRepo> {
        self.virtual_repos.get(owner).and_then(|m| m.get(repo))
    }

    /// Constructs a `Figment` instance for configuration loading.
    ///
    /// This method builds a configuration provider by layering default
    /// settings, the user configuration file, an optional explicit file,
    /// and environment variables.
    pub fn figment(explicit: Option<&Path>) -> Figment {
        let mut fig = Figment::from(Config::default()).merge(Toml::string(DEFAULT_TOML_CONFIG));

        if let Ok(c) = etcetera::choose_base_strategy() {
            let config = c.config_dir().join("localhub.toml");
            fig = fig.admerge(Toml::file(config));
        }

        if let Some(path) = explicit {
            fig = fig.admerge(Toml::file(path));
        }

        fig.admerge(Env::prefixed("LOCALHUB_").split("__"))
    }

    /// Loads the configuration, falling back to defaults on error.
    pub fn load(explicit: Option<&Path>) -> Config {
        Self::figment(explicit).extract().unwrap_or_else(|e| {
            tracing::error!(
                error = %e,
                "problem loading config from default sources, falling back to defaults"
            );
            Config::from(Toml::string(DEFAULT_TOML_CONFIG)).unwrap_or_default()
        })
    }

    /// Creates a `Config` instance from a given provider.
    pub fn from<T: Provider>(provider: T) -> Result<Config, Box<figment::Error>> {
        Figment::from(provider).extract().map_err(Box::new)
    }
}

impl Provider for Config {
    fn metadata(&self) -> figment::Metadata {
        Metadata::named("Localhub Config")
    }

    fn data(
        &self,
    ) -> Result<figment::value::Map<figment::Profile, figment::value::Dict>, figment::Error> {
        figment::providers::Serialized::defaults(self).data()
    }
}

//================================================================================================
// Functions
//================================================================================================

fn default_http_port() -> u16 {
    5000
}

fn default_https_port() -> u16 {
    5443
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_req_log_format() -> String {
    "dev".to_string()
}
