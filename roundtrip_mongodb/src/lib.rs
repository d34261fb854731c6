//! A [MongoDB](https://www.mongodb.com/) document store for the [`roundtrip`](../roundtrip/index.html) dataset verifier.
//!
//! Each store key is one document of a collection, with the key as its `_id` and the value as a generic binary `data` field.
//! Prefixes are `_id` ranges, so listing and erasing a prefix use the `_id` index.
//!
//! ```rust,no_run
//! use roundtrip_mongodb::MongoDbStore;
//! use roundtrip_storage::{ReadableStorageTraits, StoreKey, WritableStorageTraits};
//!
//! let store = MongoDbStore::new("mongodb://localhost:27017/test")?;
//! let key = StoreKey::new("grib_test/zarr.json")?;
//! store.set(&key, b"{}".to_vec().into())?;
//! assert!(store.get(&key)?.is_some());
//! # Ok::<_, Box<dyn std::error::Error>>(())
//! ```
//!
//! ## Licence
//! `roundtrip_mongodb` is licensed under either of
//! - the Apache License, Version 2.0 <http://www.apache.org/licenses/LICENSE-2.0> or
//! - the MIT license <http://opensource.org/licenses/MIT>, at your option.

use std::collections::BTreeSet;

use mongodb::{
    bson::{doc, spec::BinarySubtype, Binary, Document},
    sync::{Client, Collection},
};
use roundtrip_storage::{
    Bytes, ListableStorageTraits, MaybeBytes, ReadableStorageTraits, StorageError, StoreKey,
    StoreKeys, StoreKeysPrefixes, StorePrefix, WritableStorageTraits,
};
use thiserror::Error;

/// The database used when the URI does not name one.
pub const DEFAULT_DATABASE: &str = "test";

/// The default collection.
pub const DEFAULT_COLLECTION: &str = "zarr_collection";

const DATA_FIELD: &str = "data";

fn handle_result<T>(result: mongodb::error::Result<T>) -> Result<T, StorageError> {
    result.map_err(|err| StorageError::Other(err.to_string()))
}

/// The `_id` filter matching every key under `prefix`.
///
/// A prefix is empty or ends with `/`, so its keys sort from the prefix up to the prefix with `/` replaced by `0`.
fn prefix_filter(prefix: &StorePrefix) -> Document {
    match prefix.as_str().strip_suffix('/') {
        Some(stem) => doc! {
            "_id": { "$gte": prefix.as_str(), "$lt": format!("{stem}0") }
        },
        None => doc! {},
    }
}

/// A store backed by a MongoDB collection.
pub struct MongoDbStore {
    client: Client,
    database: String,
    collection: Collection<Document>,
}

impl std::fmt::Debug for MongoDbStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MongoDbStore")
            .field("database", &self.database)
            .field("collection", &self.collection.name())
            .finish_non_exhaustive()
    }
}

impl MongoDbStore {
    /// Connect to the deployment at `uri` and use [`DEFAULT_COLLECTION`] of the database named by the URI, or [`DEFAULT_DATABASE`].
    ///
    /// # Errors
    /// Returns a [`MongoDbStoreCreateError`] if the URI is invalid or the deployment does not respond to a ping.
    pub fn new(uri: &str) -> Result<Self, MongoDbStoreCreateError> {
        let client = Client::with_uri_str(uri)?;
        let database = client
            .default_database()
            .unwrap_or_else(|| client.database(DEFAULT_DATABASE));
        database.run_command(doc! { "ping": 1 }).run()?;
        log::debug!("connected to database {}", database.name());
        Ok(Self {
            collection: database.collection(DEFAULT_COLLECTION),
            database: database.name().to_string(),
            client,
        })
    }

    /// Use the collection `name` instead of [`DEFAULT_COLLECTION`].
    #[must_use]
    pub fn with_collection(mut self, name: &str) -> Self {
        self.collection = self.client.database(&self.database).collection(name);
        self
    }

    /// The database name.
    #[must_use]
    pub fn database(&self) -> &str {
        &self.database
    }

    /// The collection name.
    #[must_use]
    pub fn collection(&self) -> &str {
        self.collection.name()
    }

    fn ids(&self, filter: Document) -> Result<StoreKeys, StorageError> {
        let cursor = handle_result(
            self.collection
                .find(filter)
                .projection(doc! { "_id": 1 })
                .sort(doc! { "_id": 1 })
                .run(),
        )?;
        let mut keys = StoreKeys::new();
        for document in cursor {
            let document = handle_result(document)?;
            let id = document
                .get_str("_id")
                .map_err(|err| StorageError::Other(format!("invalid document id: {err}")))?;
            keys.push(StoreKey::new(id)?);
        }
        Ok(keys)
    }
}

impl ReadableStorageTraits for MongoDbStore {
    fn get(&self, key: &StoreKey) -> Result<MaybeBytes, StorageError> {
        let Some(document) =
            handle_result(self.collection.find_one(doc! { "_id": key.as_str() }).run())?
        else {
            return Ok(None);
        };
        let data = document
            .get_binary_generic(DATA_FIELD)
            .map_err(|err| StorageError::InvalidMetadata(key.clone(), err.to_string()))?;
        Ok(Some(Bytes::from(data.clone())))
    }
}

impl WritableStorageTraits for MongoDbStore {
    fn set(&self, key: &StoreKey, value: Bytes) -> Result<(), StorageError> {
        let document = doc! {
            "_id": key.as_str(),
            DATA_FIELD: Binary { subtype: BinarySubtype::Generic, bytes: value.to_vec() },
        };
        handle_result(
            self.collection
                .replace_one(doc! { "_id": key.as_str() }, document)
                .upsert(true)
                .run(),
        )?;
        Ok(())
    }

    fn erase(&self, key: &StoreKey) -> Result<(), StorageError> {
        handle_result(self.collection.delete_one(doc! { "_id": key.as_str() }).run())?;
        Ok(())
    }

    fn erase_prefix(&self, prefix: &StorePrefix) -> Result<(), StorageError> {
        let result = handle_result(self.collection.delete_many(prefix_filter(prefix)).run())?;
        log::debug!("erased {} keys under {prefix}", result.deleted_count);
        Ok(())
    }
}

impl ListableStorageTraits for MongoDbStore {
    fn list(&self) -> Result<StoreKeys, StorageError> {
        self.ids(doc! {})
    }

    fn list_prefix(&self, prefix: &StorePrefix) -> Result<StoreKeys, StorageError> {
        self.ids(prefix_filter(prefix))
    }

    fn list_dir(&self, prefix: &StorePrefix) -> Result<StoreKeysPrefixes, StorageError> {
        let mut keys = StoreKeys::new();
        let mut prefixes = BTreeSet::new();
        for key in self.list_prefix(prefix)? {
            let Some(child) = key.as_str().strip_prefix(prefix.as_str()) else {
                continue;
            };
            match child.split_once('/') {
                Some((child, _)) => {
                    prefixes.insert(prefix.child(child)?);
                }
                None => keys.push(key),
            }
        }
        Ok(StoreKeysPrefixes::new(keys, prefixes.into_iter().collect()))
    }
}

/// A MongoDB store creation error.
#[derive(Clone, Debug, Error)]
pub enum MongoDbStoreCreateError {
    /// The URI is invalid or the deployment is unreachable.
    #[error(transparent)]
    MongoDb(#[from] mongodb::error::Error),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mongodb_prefix_filter() {
        assert_eq!(prefix_filter(&StorePrefix::root()), doc! {});
        assert_eq!(
            prefix_filter(&StorePrefix::new("grib_test/t/").unwrap()),
            doc! { "_id": { "$gte": "grib_test/t/", "$lt": "grib_test/t0" } }
        );
    }

    #[test]
    fn mongodb_prefix_filter_bounds() {
        // keys under the prefix sort inside the range, siblings outside it
        let prefix = "a/";
        let upper = "a0";
        for key in ["a/b", "a/zarr.json", "a/d/e", "a/\u{10FFFF}"] {
            assert!(key >= prefix && key < upper, "{key}");
        }
        for key in ["a", "a.b", "a0", "ab/c", "b/c"] {
            assert!(!(key >= prefix && key < upper), "{key}");
        }
    }

    #[test]
    fn mongodb_invalid_uri() {
        assert!(MongoDbStore::new("not a uri").is_err());
    }
}
