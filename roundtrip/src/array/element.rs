use super::{ArrayError, DataType};

/// A trait representing an array element type.
///
/// Elements convert to and from the little-endian decoded representation of a chunk.
pub trait Element: Sized + Copy + Send + Sync + 'static {
    /// Validate the data type.
    ///
    /// # Errors
    /// Returns [`ArrayError::IncompatibleElementType`] if the data type is incompatible with [`Element`].
    fn validate_data_type(data_type: &DataType) -> Result<(), ArrayError>;

    /// Convert a slice of elements into little-endian bytes.
    ///
    /// # Errors
    /// Returns [`ArrayError::IncompatibleElementType`] if the data type is incompatible with [`Element`].
    fn to_array_bytes(data_type: &DataType, elements: &[Self]) -> Result<Vec<u8>, ArrayError>;

    /// Convert little-endian bytes into a [`Vec<Element>`].
    ///
    /// # Errors
    /// Returns an [`ArrayError`] if the data type is incompatible with [`Element`] or `bytes` is not a whole number of elements.
    fn from_array_bytes(data_type: &DataType, bytes: &[u8]) -> Result<Vec<Self>, ArrayError>;
}

macro_rules! impl_element_pod {
    ($raw_type:ty, $($data_type:ident),+) => {
        impl Element for $raw_type {
            fn validate_data_type(data_type: &DataType) -> Result<(), ArrayError> {
                match data_type {
                    $(DataType::$data_type)|+ => Ok(()),
                    _ => Err(ArrayError::IncompatibleElementType),
                }
            }

            fn to_array_bytes(data_type: &DataType, elements: &[Self]) -> Result<Vec<u8>, ArrayError> {
                Self::validate_data_type(data_type)?;
                Ok(elements.iter().flat_map(|e| e.to_le_bytes()).collect())
            }

            fn from_array_bytes(data_type: &DataType, bytes: &[u8]) -> Result<Vec<Self>, ArrayError> {
                const SIZE: usize = std::mem::size_of::<$raw_type>();
                Self::validate_data_type(data_type)?;
                if bytes.len() % SIZE != 0 {
                    return Err(ArrayError::InvalidBytesInputSize(bytes.len(), SIZE as u64));
                }
                Ok(bytes
                    .chunks_exact(SIZE)
                    .map(|chunk| {
                        let mut buf = [0u8; SIZE];
                        buf.copy_from_slice(chunk);
                        <$raw_type>::from_le_bytes(buf)
                    })
                    .collect())
            }
        }
    };
}

impl_element_pod!(f32, Float32);
impl_element_pod!(f64, Float64);
impl_element_pod!(i64, Int64, NumpyDateTime64, NumpyTimeDelta64);
