//! Backing stores opened from a URI.
//!
//! | URI                          | Store                                               |
//! |------------------------------|-----------------------------------------------------|
//! | `memory:` or `memory://`     | [`MemoryStore`]                                     |
//! | `file:///path` or a path     | `FilesystemStore` (requires the `filesystem` feature) |
//! | `mongodb://` or `mongodb+srv://` | `MongoDbStore` (requires the `mongodb` feature)  |
//!
//! Any other scheme is a [`StoreUnavailableError`].

use std::sync::Arc;

use roundtrip_storage::{store::MemoryStore, ReadableWritableListableStorage};
use thiserror::Error;
use url::Url;

/// The backing store could not be opened.
#[derive(Clone, Debug, Error)]
#[error("store {uri} is unavailable: {reason}")]
pub struct StoreUnavailableError {
    uri: String,
    reason: String,
}

impl StoreUnavailableError {
    fn new(uri: String, reason: impl Into<String>) -> Self {
        Self {
            uri,
            reason: reason.into(),
        }
    }

    /// The store URI, with any password redacted.
    #[must_use]
    pub fn uri(&self) -> &str {
        &self.uri
    }
}

/// Returns `uri` with any password replaced by `***`.
#[must_use]
pub fn redact_uri(uri: &str) -> String {
    match Url::parse(uri) {
        Ok(mut url) if url.password().is_some() => {
            // only fails for URLs that cannot have a password
            let _ = url.set_password(Some("***"));
            url.to_string()
        }
        _ => uri.to_string(),
    }
}

/// Returns `uri` with `username` and `password` added, unless it already has a username or cannot hold credentials.
#[must_use]
pub fn with_credentials(uri: &str, username: &str, password: Option<&str>) -> String {
    match Url::parse(uri) {
        Ok(mut url) if url.username().is_empty() && url.has_host() => {
            if url.set_username(username).is_err() || url.set_password(password).is_err() {
                return uri.to_string();
            }
            url.to_string()
        }
        _ => uri.to_string(),
    }
}

/// An open backing store.
///
/// The store is acquired once with [`StoreHandle::open`], shared by every group operation through [`StoreHandle::storage`],
/// and released with [`StoreHandle::close`].
pub struct StoreHandle {
    uri: String,
    storage: ReadableWritableListableStorage,
}

impl std::fmt::Debug for StoreHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StoreHandle")
            .field("uri", &self.uri)
            .finish_non_exhaustive()
    }
}

impl StoreHandle {
    /// Open the backing store at `uri`.
    ///
    /// # Errors
    /// Returns [`StoreUnavailableError`] if the scheme is not supported or the store cannot be opened.
    pub fn open(uri: &str) -> Result<Self, StoreUnavailableError> {
        let redacted = redact_uri(uri);
        let storage: ReadableWritableListableStorage = match Url::parse(uri) {
            Ok(url) if url.scheme() == "memory" => Arc::new(MemoryStore::new()),
            Ok(url) if url.scheme() == "file" => {
                let path = url.to_file_path().map_err(|()| {
                    StoreUnavailableError::new(redacted.clone(), "not a local file path")
                })?;
                Self::open_filesystem(&redacted, &path)?
            }
            Ok(url) if matches!(url.scheme(), "mongodb" | "mongodb+srv") => {
                Self::open_mongodb(&redacted, uri, url.password())?
            }
            // a windows drive letter is not a scheme
            Ok(url) if url.scheme().len() == 1 => Self::open_filesystem(&redacted, uri.as_ref())?,
            Ok(url) => {
                return Err(StoreUnavailableError::new(
                    redacted,
                    format!("unsupported scheme {}", url.scheme()),
                ))
            }
            Err(url::ParseError::RelativeUrlWithoutBase) => {
                Self::open_filesystem(&redacted, uri.as_ref())?
            }
            Err(err) => return Err(StoreUnavailableError::new(redacted, err.to_string())),
        };
        log::info!("opened store {redacted}");
        Ok(Self {
            uri: redacted,
            storage,
        })
    }

    #[cfg(feature = "filesystem")]
    fn open_filesystem(
        redacted: &str,
        path: &std::path::Path,
    ) -> Result<ReadableWritableListableStorage, StoreUnavailableError> {
        let store = roundtrip_filesystem::FilesystemStore::new(path)
            .map_err(|err| StoreUnavailableError::new(redacted.to_string(), err.to_string()))?;
        Ok(Arc::new(store))
    }

    #[cfg(not(feature = "filesystem"))]
    fn open_filesystem(
        redacted: &str,
        _path: &std::path::Path,
    ) -> Result<ReadableWritableListableStorage, StoreUnavailableError> {
        Err(StoreUnavailableError::new(
            redacted.to_string(),
            "filesystem stores require the filesystem feature",
        ))
    }

    #[cfg(feature = "mongodb")]
    fn open_mongodb(
        redacted: &str,
        uri: &str,
        password: Option<&str>,
    ) -> Result<ReadableWritableListableStorage, StoreUnavailableError> {
        let store = roundtrip_mongodb::MongoDbStore::new(uri).map_err(|err| {
            let reason = err.to_string();
            let reason = match password {
                Some(password) if !password.is_empty() => reason.replace(password, "***"),
                _ => reason,
            };
            StoreUnavailableError::new(redacted.to_string(), reason)
        })?;
        Ok(Arc::new(store))
    }

    #[cfg(not(feature = "mongodb"))]
    fn open_mongodb(
        redacted: &str,
        _uri: &str,
        _password: Option<&str>,
    ) -> Result<ReadableWritableListableStorage, StoreUnavailableError> {
        Err(StoreUnavailableError::new(
            redacted.to_string(),
            "mongodb stores require the mongodb feature",
        ))
    }

    /// The store URI, with any password redacted.
    #[must_use]
    pub fn uri(&self) -> &str {
        &self.uri
    }

    /// The store.
    #[must_use]
    pub fn storage(&self) -> ReadableWritableListableStorage {
        self.storage.clone()
    }

    /// Release the store.
    pub fn close(self) {
        log::info!("closed store {}", self.uri);
    }
}
