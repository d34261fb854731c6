use std::ops::Range;

use ndarray::{ArrayD, Axis, Dimension, Slice};
use serde_json::Value;

use super::DatasetError;
use crate::array::DataType;

/// Element equality where NaN is equal to NaN.
trait ValueEq {
    fn value_eq(&self, other: &Self) -> bool;
}

impl ValueEq for f32 {
    fn value_eq(&self, other: &Self) -> bool {
        self == other || (self.is_nan() && other.is_nan())
    }
}

impl ValueEq for f64 {
    fn value_eq(&self, other: &Self) -> bool {
        self == other || (self.is_nan() && other.is_nan())
    }
}

impl ValueEq for i64 {
    fn value_eq(&self, other: &Self) -> bool {
        self == other
    }
}

fn first_difference<T: ValueEq>(a: &ArrayD<T>, b: &ArrayD<T>) -> Option<Vec<usize>> {
    a.indexed_iter()
        .zip(b.iter())
        .find(|((_, a), b)| !(*a).value_eq(*b))
        .map(|((index, _), _)| index.slice().to_vec())
}

/// A coordinate element that can be stepped past the end of a coordinate.
trait StepValue: Copy + PartialOrd {
    const ONE: Self;

    /// `self - other` if it is positive and representable.
    fn positive_difference(self, other: Self) -> Option<Self>;

    /// `self + step` if it is representable and greater than `self`.
    fn checked_step(self, step: Self) -> Option<Self>;
}

macro_rules! impl_step_value_float {
    ($t:ty) => {
        impl StepValue for $t {
            const ONE: Self = 1.0;

            fn positive_difference(self, other: Self) -> Option<Self> {
                let difference = self - other;
                (difference.is_finite() && difference > 0.0).then_some(difference)
            }

            fn checked_step(self, step: Self) -> Option<Self> {
                let next = self + step;
                (next.is_finite() && next > self).then_some(next)
            }
        }
    };
}

impl_step_value_float!(f32);
impl_step_value_float!(f64);

impl StepValue for i64 {
    const ONE: Self = 1;

    fn positive_difference(self, other: Self) -> Option<Self> {
        self.checked_sub(other).filter(|&difference| difference > 0)
    }

    fn checked_step(self, step: Self) -> Option<Self> {
        self.checked_add(step)
    }
}

/// The maximum of `values`, skipping NaN.
fn maximum<T: PartialOrd + Copy>(values: impl Iterator<Item = T>) -> Option<T> {
    values
        .filter(|value| value.partial_cmp(value).is_some())
        .fold(None, |max, value| match max {
            Some(max) if max >= value => Some(max),
            _ => Some(value),
        })
}

/// The value one step past the maximum of `values`.
///
/// The step is the gap between the two largest distinct values, or one.
fn next_after_maximum<T: StepValue>(values: &ArrayD<T>) -> Option<T> {
    let max = maximum(values.iter().copied())?;
    let step = maximum(values.iter().copied().filter(|&value| value < max))
        .and_then(|second| max.positive_difference(second))
        .unwrap_or(T::ONE);
    max.checked_step(step)
}

fn strictly_increasing<T: PartialOrd + Copy>(values: &ArrayD<T>, after: Option<T>) -> bool {
    after
        .into_iter()
        .chain(values.iter().copied())
        .collect::<Vec<_>>()
        .windows(2)
        .all(|w| w[0] < w[1])
}

/// Apply `$body` to the array held by any variant of a [`VariableData`], rewrapping the result in the same variant.
macro_rules! map_variable_data {
    ($data:expr, $array:ident => $body:expr) => {
        match $data {
            VariableData::Float32($array) => VariableData::Float32($body),
            VariableData::Float64($array) => VariableData::Float64($body),
            VariableData::Int64($array) => VariableData::Int64($body),
            VariableData::DateTime64($array) => VariableData::DateTime64($body),
            VariableData::TimeDelta64($array) => VariableData::TimeDelta64($body),
        }
    };
}

/// Apply `$body` to the arrays held by two [`VariableData`] of the same variant.
///
/// Evaluates to `None` if the variants differ.
macro_rules! zip_variable_data {
    ($a:expr, $b:expr, ($x:ident, $y:ident) => $body:expr) => {
        match ($a, $b) {
            (VariableData::Float32($x), VariableData::Float32($y)) => Some($body),
            (VariableData::Float64($x), VariableData::Float64($y)) => Some($body),
            (VariableData::Int64($x), VariableData::Int64($y))
            | (VariableData::DateTime64($x), VariableData::DateTime64($y))
            | (VariableData::TimeDelta64($x), VariableData::TimeDelta64($y)) => Some($body),
            _ => None,
        }
    };
}

/// The typed n-dimensional data of a variable.
///
/// Times are held as [`i64`] nanoseconds, since the Unix epoch for [`VariableData::DateTime64`].
#[derive(Clone, Debug, PartialEq)]
pub enum VariableData {
    /// `float32` data.
    Float32(ArrayD<f32>),
    /// `float64` data.
    Float64(ArrayD<f64>),
    /// `int64` data.
    Int64(ArrayD<i64>),
    /// `datetime64[ns]` data.
    DateTime64(ArrayD<i64>),
    /// `timedelta64[ns]` data.
    TimeDelta64(ArrayD<i64>),
}

impl VariableData {
    /// The array data type of the data.
    #[must_use]
    pub const fn data_type(&self) -> DataType {
        match self {
            Self::Float32(_) => DataType::Float32,
            Self::Float64(_) => DataType::Float64,
            Self::Int64(_) => DataType::Int64,
            Self::DateTime64(_) => DataType::NumpyDateTime64,
            Self::TimeDelta64(_) => DataType::NumpyTimeDelta64,
        }
    }

    /// The shape of the data.
    #[must_use]
    pub fn shape(&self) -> &[usize] {
        match self {
            Self::Float32(a) => a.shape(),
            Self::Float64(a) => a.shape(),
            Self::Int64(a) | Self::DateTime64(a) | Self::TimeDelta64(a) => a.shape(),
        }
    }

    /// The number of dimensions of the data.
    #[must_use]
    pub fn ndim(&self) -> usize {
        self.shape().len()
    }

    /// Slice `range` of `axis`.
    #[must_use]
    pub fn slice_axis(&self, axis: usize, range: Range<usize>) -> Self {
        let slice = Slice::from(range);
        map_variable_data!(self, a => a.slice_axis(Axis(axis), slice).to_owned())
    }

    /// Concatenate `other` to the end of `axis`.
    ///
    /// # Errors
    /// Returns [`DatasetError::IncompatibleData`] if the data types differ or the shapes are incompatible.
    pub fn concatenate(&self, axis: usize, other: &Self) -> Result<Self, DatasetError> {
        let incompatible = || DatasetError::IncompatibleData(format!(
            "cannot concatenate {} {:?} with {} {:?} along axis {axis}",
            self.data_type(),
            self.shape(),
            other.data_type(),
            other.shape()
        ));
        let concatenated = match (self, other) {
            (Self::Float32(a), Self::Float32(b)) => {
                ndarray::concatenate(Axis(axis), &[a.view(), b.view()]).map(Self::Float32)
            }
            (Self::Float64(a), Self::Float64(b)) => {
                ndarray::concatenate(Axis(axis), &[a.view(), b.view()]).map(Self::Float64)
            }
            (Self::Int64(a), Self::Int64(b)) => {
                ndarray::concatenate(Axis(axis), &[a.view(), b.view()]).map(Self::Int64)
            }
            (Self::DateTime64(a), Self::DateTime64(b)) => {
                ndarray::concatenate(Axis(axis), &[a.view(), b.view()]).map(Self::DateTime64)
            }
            (Self::TimeDelta64(a), Self::TimeDelta64(b)) => {
                ndarray::concatenate(Axis(axis), &[a.view(), b.view()]).map(Self::TimeDelta64)
            }
            _ => return Err(incompatible()),
        };
        concatenated.map_err(|_| incompatible())
    }

    /// Returns the index of the first element that differs from `other`, treating NaN as equal to NaN.
    ///
    /// Returns [`None`] if the data is equal. The data type and shape must be checked separately.
    #[must_use]
    pub fn first_difference(&self, other: &Self) -> Option<Vec<usize>> {
        zip_variable_data!(self, other, (a, b) => first_difference(a, b)).flatten()
    }

    /// Returns true if the elements of this 1-D data are strictly increasing and strictly greater than every element of `after`.
    ///
    /// Data of a different type to `after` is never increasing.
    #[must_use]
    pub fn is_strictly_increasing_after(&self, after: Option<&Self>) -> bool {
        let Some(after) = after else {
            return match self {
                Self::Float32(a) => strictly_increasing(a, None),
                Self::Float64(a) => strictly_increasing(a, None),
                Self::Int64(a) | Self::DateTime64(a) | Self::TimeDelta64(a) => {
                    strictly_increasing(a, None)
                }
            };
        };
        zip_variable_data!(self, after, (a, after) => {
            strictly_increasing(a, maximum(after.iter().copied()))
        })
        .unwrap_or(false)
    }

    /// Returns a 1-D value one step past the maximum of this data.
    ///
    /// The step is the gap between the two largest distinct values, or one if there is a single distinct value.
    /// Returns [`None`] if the data holds no comparable value or the next value is not representable.
    #[must_use]
    pub fn next_value(&self) -> Option<Self> {
        Some(map_variable_data!(self, a => {
            ArrayD::from_elem(ndarray::IxDyn(&[1]), next_after_maximum(a)?)
        }))
    }
}

/// A named-dimension variable: dimension names, typed data and attributes.
#[derive(Clone, Debug, PartialEq)]
pub struct Variable {
    dims: Vec<String>,
    data: VariableData,
    attrs: serde_json::Map<String, Value>,
}

impl Variable {
    /// Create a new variable with dimensions `dims` and `data`.
    ///
    /// # Errors
    /// Returns [`DatasetError::DimensionCountMismatch`] if the number of dimensions does not match the data,
    /// or [`DatasetError::DuplicateDimension`] if a dimension is repeated.
    pub fn new<D: Into<String>>(
        dims: impl IntoIterator<Item = D>,
        data: VariableData,
    ) -> Result<Self, DatasetError> {
        let dims: Vec<String> = dims.into_iter().map(Into::into).collect();
        if dims.len() != data.ndim() {
            return Err(DatasetError::DimensionCountMismatch {
                dims,
                ndim: data.ndim(),
            });
        }
        for (i, dim) in dims.iter().enumerate() {
            if dims[..i].contains(dim) {
                return Err(DatasetError::DuplicateDimension(dim.clone()));
            }
        }
        Ok(Self {
            dims,
            data,
            attrs: serde_json::Map::new(),
        })
    }

    /// Set the attributes.
    #[must_use]
    pub fn with_attrs(mut self, attrs: serde_json::Map<String, Value>) -> Self {
        self.attrs = attrs;
        self
    }

    /// The dimension names.
    #[must_use]
    pub fn dims(&self) -> &[String] {
        &self.dims
    }

    /// The data.
    #[must_use]
    pub const fn data(&self) -> &VariableData {
        &self.data
    }

    /// The attributes.
    #[must_use]
    pub const fn attrs(&self) -> &serde_json::Map<String, Value> {
        &self.attrs
    }

    /// The shape of the data.
    #[must_use]
    pub fn shape(&self) -> &[usize] {
        self.data.shape()
    }

    /// The axis of dimension `dim`, if the variable varies along it.
    #[must_use]
    pub fn axis(&self, dim: &str) -> Option<usize> {
        self.dims.iter().position(|d| d == dim)
    }

    /// Returns true if the variable varies along `dim`.
    #[must_use]
    pub fn has_dim(&self, dim: &str) -> bool {
        self.axis(dim).is_some()
    }

    /// Select `range` of dimension `dim`. A variable without `dim` is returned unchanged.
    #[must_use]
    pub fn isel(&self, dim: &str, range: Range<usize>) -> Self {
        match self.axis(dim) {
            Some(axis) => Self {
                dims: self.dims.clone(),
                data: self.data.slice_axis(axis, range),
                attrs: self.attrs.clone(),
            },
            None => self.clone(),
        }
    }
}
