//! `roundtrip` verifies that a labelled multidimensional dataset survives a round trip through a chunked-array store.
//!
//! A sample weather dataset (the ERA5 pressure level ensemble members GRIB file used by `cfgrib`) is fetched and decoded,
//! written to a [Zarr V3](https://zarr-specs.readthedocs.io/en/latest/v3/core/index.html) group, reloaded,
//! overwritten in place over a region, and extended by appending a slice along its `time` dimension.
//! The reloaded dataset is compared with what was written after every mutation.
//!
//! ## Components
//! - [`fixture`]: fetches the GRIB file to a local cache and decodes it into a [`Dataset`](dataset::Dataset).
//! - [`dataset`]: named dimensions, coordinates, data variables and attributes over [`ndarray`] data.
//! - [`group`]: the [`DatasetStore`](group::DatasetStore) operations (write, read, region overwrite, append) over a Zarr V3 group.
//! - [`array`]: the Zarr V3 arrays backing each variable.
//! - [`store_handle`]: opens the backing store from a URI.
//! - [`verify`]: the [`RoundTripVerifier`](verify::RoundTripVerifier) state machine.
//! - [`config`]: the [`VerifierConfig`](config::VerifierConfig).
//!
//! ## Example
//! ```rust
//! # use std::sync::Arc;
//! use roundtrip::{
//!     dataset::{Dataset, Variable, VariableData},
//!     group::DatasetGroup,
//!     storage::store::MemoryStore,
//!     verify::{RoundTripVerifier, VerifierState},
//! };
//!
//! let time = ndarray::array![0i64, 3_600_000_000_000].into_dyn();
//! let temperature = ndarray::array![[270.0f32, 271.0], [272.0, 273.0]].into_dyn();
//! let mut dataset = Dataset::new();
//! dataset.add_coord("time", Variable::new(["time"], VariableData::DateTime64(time))?)?;
//! dataset.add_data_var("t", Variable::new(["time", "x"], VariableData::Float32(temperature))?)?;
//!
//! let group = DatasetGroup::new(Arc::new(MemoryStore::new()), "grib_test")?;
//! let mut verifier = RoundTripVerifier::new(group, "time");
//! verifier.verify(&dataset)?;
//! assert_eq!(verifier.state(), VerifierState::Done);
//! # Ok::<_, Box<dyn std::error::Error>>(())
//! ```
//!
//! ## Crate Features
//! - `filesystem` (default): open `file://` store URIs and plain paths.
//! - `gzip` (default): the `gzip` codec.
//! - `mongodb`: open `mongodb://` and `mongodb+srv://` store URIs.
//!
//! ## Licence
//! `roundtrip` is licensed under either of
//!  - the Apache License, Version 2.0 <http://www.apache.org/licenses/LICENSE-2.0> or
//!  - the MIT license <http://opensource.org/licenses/MIT>, at your option.
//!
//! Unless you explicitly state otherwise, any contribution intentionally submitted for inclusion in the work by you, as defined in the Apache-2.0 license, shall be dual licensed as above, without any additional terms or conditions.
#![cfg_attr(docsrs, feature(doc_auto_cfg))]

pub mod array;
pub mod array_subset;
pub mod config;
pub mod dataset;
pub mod fixture;
pub mod group;
pub mod metadata;
pub mod store_handle;
pub mod verify;

pub use roundtrip_storage as storage;

#[cfg(feature = "filesystem")]
pub use roundtrip_filesystem as filesystem;

#[cfg(feature = "mongodb")]
pub use roundtrip_mongodb as mongodb;
