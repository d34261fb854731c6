use std::io::{Cursor, Read};

use flate2::bufread::{GzDecoder, GzEncoder};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::{BytesToBytesCodecTraits, CodecError};
use crate::metadata::MetadataV3;

/// Configuration parameters for the `gzip` codec.
#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct GzipCodecConfiguration {
    /// The compression level, 0-9.
    pub level: u32,
}

/// An invalid `gzip` compression level.
#[derive(Copy, Clone, Debug, Error)]
#[error("invalid gzip compression level {0}, must be 0-9")]
pub struct GzipCompressionLevelError(u32);

/// A `gzip` codec implementation.
#[derive(Clone, Debug)]
pub struct GzipCodec {
    compression_level: u32,
}

impl Default for GzipCodec {
    fn default() -> Self {
        Self {
            compression_level: 5,
        }
    }
}

impl GzipCodec {
    pub(super) const NAME: &'static str = "gzip";

    /// Create a new `gzip` codec.
    ///
    /// # Errors
    /// Returns [`GzipCompressionLevelError`] if `compression_level` is not valid.
    pub fn new(compression_level: u32) -> Result<Self, GzipCompressionLevelError> {
        if compression_level > 9 {
            Err(GzipCompressionLevelError(compression_level))
        } else {
            Ok(Self { compression_level })
        }
    }
}

impl BytesToBytesCodecTraits for GzipCodec {
    fn create_metadata(&self) -> MetadataV3 {
        let configuration = GzipCodecConfiguration {
            level: self.compression_level,
        };
        MetadataV3::new_with_serializable_configuration(Self::NAME, &configuration)
            .unwrap_or_else(|_| MetadataV3::new(Self::NAME))
    }

    fn encode(&self, decoded_value: Vec<u8>) -> Result<Vec<u8>, CodecError> {
        let mut encoder = GzEncoder::new(
            Cursor::new(decoded_value),
            flate2::Compression::new(self.compression_level),
        );
        let mut out: Vec<u8> = Vec::new();
        encoder.read_to_end(&mut out)?;
        Ok(out)
    }

    fn decode(&self, encoded_value: Vec<u8>) -> Result<Vec<u8>, CodecError> {
        let mut decoder = GzDecoder::new(Cursor::new(encoded_value));
        let mut out: Vec<u8> = Vec::new();
        decoder.read_to_end(&mut out)?;
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const BYTES: &[u8] = &[0, 1, 2, 3, 4, 5, 6, 7, 8, 9, 10, 11, 12, 13, 14, 15];

    #[test]
    fn codec_gzip_round_trip() {
        let codec = GzipCodec::new(9).unwrap();
        let encoded = codec.encode(BYTES.to_vec()).unwrap();
        assert_ne!(encoded, BYTES);
        assert_eq!(codec.decode(encoded).unwrap(), BYTES);
    }

    #[test]
    fn codec_gzip_configuration_invalid() {
        assert!(GzipCodec::new(10).is_err());
        assert!(serde_json::from_str::<GzipCodecConfiguration>(r#"{"level":1,"x":2}"#).is_err());
    }

    #[test]
    fn codec_gzip_decode_invalid() {
        assert!(GzipCodec::default().decode(BYTES.to_vec()).is_err());
    }
}
