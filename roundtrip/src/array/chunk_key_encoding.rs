//! The `default` chunk key encoding.
//!
//! See <https://zarr-specs.readthedocs.io/en/latest/v3/chunk-key-encodings/default/index.html>.

use itertools::Itertools;
use serde::{Deserialize, Serialize};

use super::ArrayCreateError;
use crate::metadata::MetadataV3;

const DEFAULT: &str = "default";

/// A chunk key separator.
#[derive(Serialize, Deserialize, Copy, Clone, Debug, PartialEq, Eq, Default)]
pub enum ChunkKeySeparator {
    /// The slash '/' character.
    #[default]
    #[serde(rename = "/")]
    Slash,
    /// The dot '.' character.
    #[serde(rename = ".")]
    Dot,
}

impl From<ChunkKeySeparator> for char {
    fn from(separator: ChunkKeySeparator) -> Self {
        match separator {
            ChunkKeySeparator::Slash => '/',
            ChunkKeySeparator::Dot => '.',
        }
    }
}

/// Configuration parameters for the `default` chunk key encoding.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq, Default)]
#[serde(deny_unknown_fields)]
pub struct DefaultChunkKeyEncodingConfiguration {
    /// The chunk key separator.
    #[serde(default)]
    pub separator: ChunkKeySeparator,
}

/// A `default` chunk key encoding.
///
/// The key for a chunk with grid index (k, j, i, ...) is formed by taking the initial prefix `c`, and appending for each dimension:
/// - the separator character, followed by,
/// - the ASCII decimal string representation of the chunk index within that dimension.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DefaultChunkKeyEncoding {
    separator: ChunkKeySeparator,
}

impl DefaultChunkKeyEncoding {
    /// Create a new `default` chunk key encoding with separator `separator`.
    #[must_use]
    pub const fn new(separator: ChunkKeySeparator) -> Self {
        Self { separator }
    }

    /// Create a `default` chunk key encoding from metadata.
    ///
    /// # Errors
    /// Returns [`ArrayCreateError::UnsupportedChunkKeyEncoding`] if the metadata is not a `default` chunk key encoding.
    pub fn from_metadata(metadata: &MetadataV3) -> Result<Self, ArrayCreateError> {
        if metadata.name() != DEFAULT {
            return Err(ArrayCreateError::UnsupportedChunkKeyEncoding(
                metadata.to_string(),
            ));
        }
        let configuration: DefaultChunkKeyEncodingConfiguration =
            metadata.to_configuration().map_err(|_| {
                ArrayCreateError::UnsupportedChunkKeyEncoding(metadata.to_string())
            })?;
        Ok(Self::new(configuration.separator))
    }

    /// Create the metadata of the chunk key encoding.
    #[must_use]
    pub fn create_metadata(&self) -> MetadataV3 {
        let configuration = DefaultChunkKeyEncodingConfiguration {
            separator: self.separator,
        };
        MetadataV3::new_with_serializable_configuration(DEFAULT, &configuration)
            .unwrap_or_else(|_| MetadataV3::new(DEFAULT))
    }

    /// Encode chunk grid indices into a key relative to the array prefix.
    #[must_use]
    #[allow(clippy::let_and_return)]
    pub fn encode(&self, chunk_grid_indices: &[u64]) -> String {
        const PREFIX: &str = "c";

        if chunk_grid_indices.is_empty() {
            return PREFIX.to_string();
        }
        let separator: char = self.separator.into();
        let mut buffers = vec![itoa::Buffer::new(); chunk_grid_indices.len()];
        let indices = chunk_grid_indices
            .iter()
            .zip(&mut buffers)
            .map(|(&n, buffer)| buffer.format(n));
        let key = [PREFIX]
            .into_iter()
            .chain(indices)
            .join(separator.encode_utf8(&mut [0; 4]));
        key
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn slash_nd() {
        let chunk_key_encoding = DefaultChunkKeyEncoding::default();
        assert_eq!(chunk_key_encoding.encode(&[1, 23, 45]), "c/1/23/45");
    }

    #[test]
    fn dot_nd() {
        let chunk_key_encoding = DefaultChunkKeyEncoding::new(ChunkKeySeparator::Dot);
        assert_eq!(chunk_key_encoding.encode(&[1, 23, 45]), "c.1.23.45");
    }

    #[test]
    fn scalar() {
        assert_eq!(DefaultChunkKeyEncoding::default().encode(&[]), "c");
    }

    #[test]
    fn metadata() {
        let chunk_key_encoding = DefaultChunkKeyEncoding::default();
        let metadata = chunk_key_encoding.create_metadata();
        assert_eq!(
            serde_json::to_string(&metadata).unwrap(),
            r#"{"name":"default","configuration":{"separator":"/"}}"#
        );
        assert_eq!(
            DefaultChunkKeyEncoding::from_metadata(&metadata).unwrap(),
            chunk_key_encoding
        );
        assert!(DefaultChunkKeyEncoding::from_metadata(&MetadataV3::new("v2")).is_err());
        assert_eq!(
            DefaultChunkKeyEncoding::from_metadata(&MetadataV3::new("default")).unwrap(),
            chunk_key_encoding
        );
    }
}
