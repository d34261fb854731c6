//! Zarr V3 group and array metadata.
//!
//! Every node of a group in the store has a `zarr.json` document.
//! Groups carry only attributes, arrays carry everything needed to locate and decode their chunks.

use derive_more::Display;
use serde::{de::DeserializeOwned, ser::SerializeMap, Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

use crate::array::ArrayShape;

/// The metadata key of a node.
pub const ZARR_JSON: &str = "zarr.json";

/// Configuration metadata.
pub type MetadataConfiguration = serde_json::Map<String, Value>;

/// Metadata with a name and optional configuration.
///
/// Serialised as a JSON string when there is no configuration, for example `"float32"`,
/// otherwise as a map such as `{"name": "bytes", "configuration": {"endian": "little"}}`.
#[derive(Clone, Eq, PartialEq, Debug)]
pub struct MetadataV3 {
    name: String,
    configuration: Option<MetadataConfiguration>,
}

impl core::fmt::Display for MetadataV3 {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        if let Some(configuration) = &self.configuration {
            write!(
                f,
                "{} {}",
                self.name,
                serde_json::to_string(configuration).unwrap_or_default()
            )
        } else {
            write!(f, "{}", self.name)
        }
    }
}

impl Serialize for MetadataV3 {
    fn serialize<S: serde::Serializer>(&self, s: S) -> Result<S::Ok, S::Error> {
        match &self.configuration {
            Some(configuration) if !configuration.is_empty() => {
                let mut s = s.serialize_map(Some(2))?;
                s.serialize_entry("name", &self.name)?;
                s.serialize_entry("configuration", configuration)?;
                s.end()
            }
            _ => s.serialize_str(self.name.as_str()),
        }
    }
}

impl<'de> Deserialize<'de> for MetadataV3 {
    fn deserialize<D: serde::Deserializer<'de>>(d: D) -> Result<Self, D::Error> {
        #[derive(Deserialize)]
        #[serde(deny_unknown_fields)]
        struct MetadataNameConfiguration {
            name: String,
            #[serde(default)]
            configuration: Option<MetadataConfiguration>,
        }

        #[derive(Deserialize)]
        #[serde(untagged)]
        enum MetadataIntermediate {
            Name(String),
            NameConfiguration(MetadataNameConfiguration),
        }

        let metadata = MetadataIntermediate::deserialize(d).map_err(|_| {
            serde::de::Error::custom(
                r#"expected metadata "<name>" or {"name":"<name>","configuration":{}}"#,
            )
        })?;
        Ok(match metadata {
            MetadataIntermediate::Name(name) => Self {
                name,
                configuration: None,
            },
            MetadataIntermediate::NameConfiguration(metadata) => Self {
                name: metadata.name,
                configuration: metadata.configuration,
            },
        })
    }
}

impl MetadataV3 {
    /// Create metadata from `name`.
    #[must_use]
    pub fn new(name: &str) -> Self {
        Self {
            name: name.into(),
            configuration: None,
        }
    }

    /// Convert a serializable configuration to [`MetadataV3`].
    ///
    /// # Errors
    /// Returns [`serde_json::Error`] if `configuration` does not serialise to a JSON object.
    pub fn new_with_serializable_configuration<TConfiguration: Serialize>(
        name: &str,
        configuration: &TConfiguration,
    ) -> Result<Self, serde_json::Error> {
        match serde_json::to_value(configuration)? {
            Value::Object(configuration) => Ok(Self {
                name: name.into(),
                configuration: Some(configuration),
            }),
            _ => Err(serde::ser::Error::custom(
                "the configuration cannot be serialized to a JSON struct",
            )),
        }
    }

    /// Try and convert the configuration to `TConfiguration`.
    ///
    /// # Errors
    /// Returns a [`ConfigurationInvalidError`] if the configuration does not deserialise.
    pub fn to_configuration<TConfiguration: DeserializeOwned>(
        &self,
    ) -> Result<TConfiguration, ConfigurationInvalidError> {
        let configuration = self.configuration.clone().unwrap_or_default();
        serde_json::from_value(Value::Object(configuration))
            .map_err(|_| ConfigurationInvalidError::new(self.to_string()))
    }

    /// Returns the metadata name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Returns the metadata configuration.
    #[must_use]
    pub const fn configuration(&self) -> Option<&MetadataConfiguration> {
        self.configuration.as_ref()
    }
}

/// An invalid configuration error.
#[derive(Clone, Debug, Error)]
#[error("unsupported configuration {0}")]
pub struct ConfigurationInvalidError(String);

impl ConfigurationInvalidError {
    /// Create a new invalid configuration error.
    #[must_use]
    pub fn new(metadata: String) -> Self {
        Self(metadata)
    }
}

/// Zarr V3 array metadata.
///
/// An example document, as written for a `float32` variable over `(time, latitude, longitude)`:
/// ```json
/// {
///     "zarr_format": 3,
///     "node_type": "array",
///     "shape": [4, 61, 120],
///     "data_type": "float32",
///     "chunk_grid": {"name": "regular", "configuration": {"chunk_shape": [4, 61, 120]}},
///     "chunk_key_encoding": {"name": "default", "configuration": {"separator": "/"}},
///     "fill_value": "NaN",
///     "codecs": [{"name": "bytes", "configuration": {"endian": "little"}}],
///     "attributes": {"units": "K"},
///     "dimension_names": ["time", "latitude", "longitude"]
/// }
/// ```
#[derive(Serialize, Deserialize, Clone, PartialEq, Debug, Display)]
#[display("{}", serde_json::to_string(self).unwrap_or_default())]
pub struct ArrayMetadataV3 {
    /// Must be `3`.
    pub zarr_format: monostate::MustBe!(3u64),
    /// Must be `array`.
    pub node_type: monostate::MustBe!("array"),
    /// The length of each dimension.
    pub shape: ArrayShape,
    /// The data type.
    pub data_type: MetadataV3,
    /// The chunk grid.
    pub chunk_grid: MetadataV3,
    /// The mapping from chunk grid indices to store keys.
    pub chunk_key_encoding: MetadataV3,
    /// The value of elements in chunks that have not been written.
    pub fill_value: Value,
    /// The codecs applied to encode and decode chunks.
    pub codecs: Vec<MetadataV3>,
    /// User defined attributes.
    #[serde(default, skip_serializing_if = "serde_json::Map::is_empty")]
    pub attributes: serde_json::Map<String, Value>,
    /// The dimension names.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dimension_names: Option<Vec<Option<String>>>,
}

/// Zarr V3 group metadata.
#[derive(Serialize, Deserialize, Clone, PartialEq, Debug, Display)]
#[display("{}", serde_json::to_string(self).unwrap_or_default())]
pub struct GroupMetadataV3 {
    /// Must be `3`.
    pub zarr_format: monostate::MustBe!(3u64),
    /// Must be `group`.
    pub node_type: monostate::MustBe!("group"),
    /// User defined attributes.
    #[serde(default, skip_serializing_if = "serde_json::Map::is_empty")]
    pub attributes: serde_json::Map<String, Value>,
}

impl Default for GroupMetadataV3 {
    fn default() -> Self {
        Self::new(serde_json::Map::new())
    }
}

impl GroupMetadataV3 {
    /// Create group metadata with `attributes`.
    #[must_use]
    pub fn new(attributes: serde_json::Map<String, Value>) -> Self {
        Self {
            zarr_format: monostate::MustBe!(3u64),
            node_type: monostate::MustBe!("group"),
            attributes,
        }
    }
}
