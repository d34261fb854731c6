//! Array data types.
//!
//! The core `float32`, `float64` and `int64` types, and the `numpy.datetime64` and `numpy.timedelta64` extension types with a nanosecond unit.
//! See <https://github.com/zarr-developers/zarr-extensions/tree/main/data-types>.

use derive_more::Display;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::{ArrayCreateError, FillValue};
use crate::metadata::MetadataV3;

/// The representation of NaT (not a time) for numpy time data types.
pub const NAT: i64 = i64::MIN;

/// A data type.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, Display)]
pub enum DataType {
    /// `float32` IEEE 754 single-precision floating point.
    #[display("float32")]
    Float32,
    /// `float64` IEEE 754 double-precision floating point.
    #[display("float64")]
    Float64,
    /// `int64` Integer in `[-2^63, 2^63-1]`.
    #[display("int64")]
    Int64,
    /// `numpy.datetime64` with unit `ns`, nanoseconds since the Unix epoch stored as `int64`.
    #[display("numpy.datetime64")]
    NumpyDateTime64,
    /// `numpy.timedelta64` with unit `ns`, a nanosecond duration stored as `int64`.
    #[display("numpy.timedelta64")]
    NumpyTimeDelta64,
}

/// The configuration of the numpy time data types.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
struct NumpyTimeConfiguration {
    unit: String,
    scale_factor: u32,
}

impl NumpyTimeConfiguration {
    fn nanoseconds() -> Self {
        Self {
            unit: "ns".to_string(),
            scale_factor: 1,
        }
    }
}

impl DataType {
    /// The size of an element in bytes.
    #[must_use]
    pub const fn size(&self) -> usize {
        match self {
            Self::Float32 => 4,
            Self::Float64 | Self::Int64 | Self::NumpyDateTime64 | Self::NumpyTimeDelta64 => 8,
        }
    }

    /// Returns true for the numpy time data types.
    #[must_use]
    pub const fn is_time(&self) -> bool {
        matches!(self, Self::NumpyDateTime64 | Self::NumpyTimeDelta64)
    }

    /// Returns the metadata of the data type.
    #[must_use]
    pub fn metadata(&self) -> MetadataV3 {
        if self.is_time() {
            MetadataV3::new_with_serializable_configuration(
                &self.to_string(),
                &NumpyTimeConfiguration::nanoseconds(),
            )
            .unwrap_or_else(|_| MetadataV3::new(&self.to_string()))
        } else {
            MetadataV3::new(&self.to_string())
        }
    }

    /// Create a data type from metadata.
    ///
    /// # Errors
    /// Returns [`ArrayCreateError::UnsupportedDataType`] if the data type or its configuration is not supported.
    pub fn from_metadata(metadata: &MetadataV3) -> Result<Self, ArrayCreateError> {
        let unsupported = || ArrayCreateError::UnsupportedDataType(metadata.to_string());
        let data_type = match metadata.name() {
            "float32" => Self::Float32,
            "float64" => Self::Float64,
            "int64" => Self::Int64,
            "numpy.datetime64" => Self::NumpyDateTime64,
            "numpy.timedelta64" => Self::NumpyTimeDelta64,
            _ => return Err(unsupported()),
        };
        if data_type.is_time() {
            let configuration: NumpyTimeConfiguration = metadata
                .to_configuration()
                .map_err(|_| unsupported())?;
            if configuration != NumpyTimeConfiguration::nanoseconds() {
                return Err(unsupported());
            }
        } else if metadata.configuration().is_some_and(|c| !c.is_empty()) {
            return Err(unsupported());
        }
        Ok(data_type)
    }

    /// The fill value metadata written for new arrays of this data type.
    ///
    /// `"NaN"` for floating point, `0` for integers and `"NaT"` for times.
    #[must_use]
    pub fn default_fill_value_metadata(&self) -> Value {
        match self {
            Self::Float32 | Self::Float64 => Value::from("NaN"),
            Self::Int64 => Value::from(0),
            Self::NumpyDateTime64 | Self::NumpyTimeDelta64 => Value::from("NaT"),
        }
    }

    /// Create a fill value from fill value metadata.
    ///
    /// # Errors
    /// Returns [`ArrayCreateError::InvalidFillValueMetadata`] if `fill_value` is not valid for the data type.
    pub fn fill_value_from_metadata(&self, fill_value: &Value) -> Result<FillValue, ArrayCreateError> {
        let invalid = || ArrayCreateError::InvalidFillValueMetadata {
            data_type_name: self.to_string(),
            fill_value_metadata: fill_value.clone(),
        };
        let float = |value: &Value| -> Option<f64> {
            match value {
                Value::String(s) => match s.as_str() {
                    "NaN" => Some(f64::NAN),
                    "Infinity" => Some(f64::INFINITY),
                    "-Infinity" => Some(f64::NEG_INFINITY),
                    _ => None,
                },
                Value::Number(n) => n.as_f64(),
                _ => None,
            }
        };
        let bytes = match self {
            #[allow(clippy::cast_possible_truncation)]
            Self::Float32 => (float(fill_value).ok_or_else(invalid)? as f32)
                .to_le_bytes()
                .to_vec(),
            Self::Float64 => float(fill_value).ok_or_else(invalid)?.to_le_bytes().to_vec(),
            Self::Int64 => fill_value
                .as_i64()
                .ok_or_else(invalid)?
                .to_le_bytes()
                .to_vec(),
            Self::NumpyDateTime64 | Self::NumpyTimeDelta64 => match fill_value {
                Value::String(s) if s == "NaT" => NAT.to_le_bytes().to_vec(),
                value => value.as_i64().ok_or_else(invalid)?.to_le_bytes().to_vec(),
            },
        };
        Ok(FillValue::new(bytes))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn data_type_metadata() {
        for data_type in [
            DataType::Float32,
            DataType::Float64,
            DataType::Int64,
            DataType::NumpyDateTime64,
            DataType::NumpyTimeDelta64,
        ] {
            let metadata = data_type.metadata();
            assert_eq!(DataType::from_metadata(&metadata).unwrap(), data_type);
        }
        assert_eq!(
            serde_json::to_string(&DataType::NumpyDateTime64.metadata()).unwrap(),
            r#"{"name":"numpy.datetime64","configuration":{"unit":"ns","scale_factor":1}}"#
        );
        assert_eq!(
            serde_json::to_string(&DataType::Float32.metadata()).unwrap(),
            r#""float32""#
        );
    }

    #[test]
    fn data_type_unsupported() {
        assert!(DataType::from_metadata(&MetadataV3::new("uint8")).is_err());
        let seconds: MetadataV3 = serde_json::from_str(
            r#"{"name":"numpy.datetime64","configuration":{"unit":"s","scale_factor":1}}"#,
        )
        .unwrap();
        assert!(DataType::from_metadata(&seconds).is_err());
    }

    #[test]
    fn data_type_fill_value() {
        let fill_value = DataType::Float32
            .fill_value_from_metadata(&Value::from("NaN"))
            .unwrap();
        assert!(f32::from_le_bytes(fill_value.as_le_bytes().try_into().unwrap()).is_nan());
        let fill_value = DataType::Float64
            .fill_value_from_metadata(&Value::from(1.5))
            .unwrap();
        assert_eq!(fill_value.as_le_bytes(), 1.5f64.to_le_bytes());
        let fill_value = DataType::NumpyDateTime64
            .fill_value_from_metadata(&Value::from("NaT"))
            .unwrap();
        assert_eq!(fill_value.as_le_bytes(), NAT.to_le_bytes());
        assert!(DataType::Int64
            .fill_value_from_metadata(&Value::from("NaN"))
            .is_err());
    }
}
