//! The sample dataset the verifier round-trips.
//!
//! [`ensure_local_copy`] caches the remote GRIB file locally and [`decode`] turns it into a [`Dataset`](crate::dataset::Dataset).

mod download;
mod grib1;

pub use download::{ensure_local_copy, FetchError};
pub use grib1::{decode, decode_bytes, DecodeError};

#[cfg(test)]
pub(crate) use grib1::tests::era5_like;
