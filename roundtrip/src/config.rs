//! Verifier configuration.

use std::{path::PathBuf, time::Duration};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::{
    array::chunk_grid::DEFAULT_CHUNK_TARGET_ELEMENTS,
    group::WriteMode,
    store_handle::{redact_uri, with_credentials},
};

/// The default fixture URL.
pub const DEFAULT_FIXTURE_URL: &str =
    "http://download.ecmwf.int/test-data/cfgrib/era5-levels-members.grib";

/// The prefix of the environment variables read by [`VerifierConfig::from_env`].
pub const ENV_PREFIX: &str = "ROUNDTRIP_";

/// A configuration error.
#[derive(Clone, Debug, Error)]
pub enum ConfigError {
    /// A required environment variable is not set.
    #[error("environment variable {0} is not set")]
    MissingVariable(String),
    /// An environment variable has an invalid value.
    #[error("environment variable {name}={value:?} is invalid: {reason}")]
    InvalidVariable {
        /// The variable name.
        name: String,
        /// The variable value.
        value: String,
        /// Why the value is invalid.
        reason: String,
    },
}

/// The configuration of a [`RoundTripVerifier`](crate::verify::RoundTripVerifier).
///
/// Build it programmatically with [`VerifierConfig::new`], from JSON with [`serde`], or from the environment with [`VerifierConfig::from_env`].
/// Only the store URI is required.
///
/// ## Store URI
/// > environment: `ROUNDTRIP_STORE_URI`, required
///
/// The URI of the backing store, see [`StoreHandle::open`](crate::store_handle::StoreHandle::open).
/// Credentials belong in the environment, never in code.
///
/// ## Store Username and Password
/// > environment: `ROUNDTRIP_STORE_USERNAME` and `ROUNDTRIP_STORE_PASSWORD`, default: none
///
/// Added to the store URI by [`VerifierConfig::store_uri_with_credentials`] if it has no username.
/// The password is never serialized.
///
/// ## Group Name
/// > environment: `ROUNDTRIP_GROUP_NAME`, default: `grib_test`
///
/// ## Fixture URL
/// > environment: `ROUNDTRIP_FIXTURE_URL`, default: [`DEFAULT_FIXTURE_URL`]
///
/// ## Cache Path
/// > environment: `ROUNDTRIP_CACHE_PATH`, default: `era5-levels-members.grib` in the `roundtrip` package directory
///
/// The local copy of the fixture. It is only downloaded if it does not exist.
///
/// ## Append Dimension
/// > environment: `ROUNDTRIP_APPEND_DIMENSION`, default: `time`
///
/// ## Fetch Timeout
/// > environment: `ROUNDTRIP_FETCH_TIMEOUT_SECS`, default: `30`
///
/// ## Write Mode
/// > environment: `ROUNDTRIP_WRITE_MODE` (`create` or `overwrite`), default: `create`
///
/// Whether the initial write fails or erases the group if it already holds data.
///
/// ## Chunk Target Elements
/// > environment: `ROUNDTRIP_CHUNK_TARGET_ELEMENTS`, default: [`DEFAULT_CHUNK_TARGET_ELEMENTS`]
///
/// The target number of elements of the chunks of written arrays.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct VerifierConfig {
    store_uri: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    store_username: Option<String>,
    #[serde(default, skip_serializing)]
    store_password: Option<String>,
    #[serde(default = "default_group_name")]
    group_name: String,
    #[serde(default = "default_fixture_url")]
    fixture_url: String,
    #[serde(default = "default_cache_path")]
    cache_path: PathBuf,
    #[serde(default = "default_append_dimension")]
    append_dimension: String,
    #[serde(default = "default_fetch_timeout_secs")]
    fetch_timeout_secs: u64,
    #[serde(default)]
    write_mode: WriteMode,
    #[serde(default = "default_chunk_target_elements")]
    chunk_target_elements: u64,
}

fn default_group_name() -> String {
    "grib_test".to_string()
}

fn default_fixture_url() -> String {
    DEFAULT_FIXTURE_URL.to_string()
}

fn default_cache_path() -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("era5-levels-members.grib")
}

fn default_append_dimension() -> String {
    "time".to_string()
}

const fn default_fetch_timeout_secs() -> u64 {
    30
}

const fn default_chunk_target_elements() -> u64 {
    DEFAULT_CHUNK_TARGET_ELEMENTS
}

fn env_var(name: &str) -> Option<String> {
    std::env::var(format!("{ENV_PREFIX}{name}")).ok()
}

fn parse_env<T: std::str::FromStr>(name: &str, value: String) -> Result<T, ConfigError>
where
    T::Err: std::fmt::Display,
{
    value.parse().map_err(|err: T::Err| ConfigError::InvalidVariable {
        name: format!("{ENV_PREFIX}{name}"),
        value,
        reason: err.to_string(),
    })
}

impl std::fmt::Debug for VerifierConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("VerifierConfig")
            .field("store_uri", &redact_uri(&self.store_uri))
            .field("store_username", &self.store_username)
            .field("store_password", &self.store_password.as_ref().map(|_| "***"))
            .field("group_name", &self.group_name)
            .field("fixture_url", &self.fixture_url)
            .field("cache_path", &self.cache_path)
            .field("append_dimension", &self.append_dimension)
            .field("fetch_timeout_secs", &self.fetch_timeout_secs)
            .field("write_mode", &self.write_mode)
            .field("chunk_target_elements", &self.chunk_target_elements)
            .finish()
    }
}

impl VerifierConfig {
    /// Create a configuration for the store at `store_uri` with default options.
    #[must_use]
    pub fn new(store_uri: impl Into<String>) -> Self {
        Self {
            store_uri: store_uri.into(),
            store_username: None,
            store_password: None,
            group_name: default_group_name(),
            fixture_url: default_fixture_url(),
            cache_path: default_cache_path(),
            append_dimension: default_append_dimension(),
            fetch_timeout_secs: default_fetch_timeout_secs(),
            write_mode: WriteMode::default(),
            chunk_target_elements: default_chunk_target_elements(),
        }
    }

    /// Create a configuration from the `ROUNDTRIP_*` environment variables.
    ///
    /// # Errors
    /// Returns [`ConfigError::MissingVariable`] if `ROUNDTRIP_STORE_URI` is not set,
    /// or [`ConfigError::InvalidVariable`] if a variable cannot be parsed.
    pub fn from_env() -> Result<Self, ConfigError> {
        let store_uri = env_var("STORE_URI")
            .ok_or_else(|| ConfigError::MissingVariable(format!("{ENV_PREFIX}STORE_URI")))?;
        let mut config = Self::new(store_uri);
        config.store_username = env_var("STORE_USERNAME");
        config.store_password = env_var("STORE_PASSWORD");
        if let Some(group_name) = env_var("GROUP_NAME") {
            config.group_name = group_name;
        }
        if let Some(fixture_url) = env_var("FIXTURE_URL") {
            config.fixture_url = fixture_url;
        }
        if let Some(cache_path) = env_var("CACHE_PATH") {
            config.cache_path = cache_path.into();
        }
        if let Some(append_dimension) = env_var("APPEND_DIMENSION") {
            config.append_dimension = append_dimension;
        }
        if let Some(value) = env_var("FETCH_TIMEOUT_SECS") {
            config.fetch_timeout_secs = parse_env("FETCH_TIMEOUT_SECS", value)?;
        }
        if let Some(value) = env_var("WRITE_MODE") {
            config.write_mode = match value.to_lowercase().as_str() {
                "create" => WriteMode::Create,
                "overwrite" => WriteMode::Overwrite,
                _ => {
                    return Err(ConfigError::InvalidVariable {
                        name: format!("{ENV_PREFIX}WRITE_MODE"),
                        value,
                        reason: "expected create or overwrite".to_string(),
                    })
                }
            };
        }
        if let Some(value) = env_var("CHUNK_TARGET_ELEMENTS") {
            config.chunk_target_elements = parse_env("CHUNK_TARGET_ELEMENTS", value)?;
        }
        Ok(config)
    }

    /// Get the [store URI](#store-uri).
    #[must_use]
    pub fn store_uri(&self) -> &str {
        &self.store_uri
    }

    /// Set the [store username and password](#store-username-and-password).
    pub fn set_store_credentials(
        &mut self,
        username: impl Into<String>,
        password: Option<String>,
    ) -> &mut Self {
        self.store_username = Some(username.into());
        self.store_password = password;
        self
    }

    /// Get the [store URI](#store-uri) with the [store username and password](#store-username-and-password) added.
    #[must_use]
    pub fn store_uri_with_credentials(&self) -> String {
        match &self.store_username {
            Some(username) => {
                with_credentials(&self.store_uri, username, self.store_password.as_deref())
            }
            None => self.store_uri.clone(),
        }
    }

    /// Get the [group name](#group-name).
    #[must_use]
    pub fn group_name(&self) -> &str {
        &self.group_name
    }

    /// Set the [group name](#group-name).
    pub fn set_group_name(&mut self, group_name: impl Into<String>) -> &mut Self {
        self.group_name = group_name.into();
        self
    }

    /// Get the [fixture URL](#fixture-url).
    #[must_use]
    pub fn fixture_url(&self) -> &str {
        &self.fixture_url
    }

    /// Set the [fixture URL](#fixture-url).
    pub fn set_fixture_url(&mut self, fixture_url: impl Into<String>) -> &mut Self {
        self.fixture_url = fixture_url.into();
        self
    }

    /// Get the [cache path](#cache-path).
    #[must_use]
    pub fn cache_path(&self) -> &std::path::Path {
        &self.cache_path
    }

    /// Set the [cache path](#cache-path).
    pub fn set_cache_path(&mut self, cache_path: impl Into<PathBuf>) -> &mut Self {
        self.cache_path = cache_path.into();
        self
    }

    /// Get the [append dimension](#append-dimension).
    #[must_use]
    pub fn append_dimension(&self) -> &str {
        &self.append_dimension
    }

    /// Set the [append dimension](#append-dimension).
    pub fn set_append_dimension(&mut self, append_dimension: impl Into<String>) -> &mut Self {
        self.append_dimension = append_dimension.into();
        self
    }

    /// Get the [fetch timeout](#fetch-timeout).
    #[must_use]
    pub const fn fetch_timeout(&self) -> Duration {
        Duration::from_secs(self.fetch_timeout_secs)
    }

    /// Set the [fetch timeout](#fetch-timeout) in seconds.
    pub fn set_fetch_timeout_secs(&mut self, fetch_timeout_secs: u64) -> &mut Self {
        self.fetch_timeout_secs = fetch_timeout_secs;
        self
    }

    /// Get the [write mode](#write-mode).
    #[must_use]
    pub const fn write_mode(&self) -> WriteMode {
        self.write_mode
    }

    /// Set the [write mode](#write-mode).
    pub fn set_write_mode(&mut self, write_mode: WriteMode) -> &mut Self {
        self.write_mode = write_mode;
        self
    }

    /// Get the [chunk target elements](#chunk-target-elements).
    #[must_use]
    pub const fn chunk_target_elements(&self) -> u64 {
        self.chunk_target_elements
    }

    /// Set the [chunk target elements](#chunk-target-elements).
    pub fn set_chunk_target_elements(&mut self, chunk_target_elements: u64) -> &mut Self {
        self.chunk_target_elements = chunk_target_elements;
        self
    }
}
