//! Labelled multidimensional datasets.
//!
//! A [`Dataset`] is an ordered set of named dimensions and a collection of [`Variable`]s over them,
//! split into coordinate variables and data variables.
//! Every variable references declared dimensions with matching sizes.

mod variable;

use std::{collections::BTreeMap, fmt::Display, ops::Range};

use serde_json::Value;
use thiserror::Error;

pub use variable::{Variable, VariableData};

use crate::array::DataType;

/// A dataset error.
#[derive(Clone, Debug, Error)]
pub enum DatasetError {
    /// A variable declares a dimension with a size that differs from the dataset.
    #[error("dimension {dim} has size {expected}, got size {got} in variable {variable}")]
    DimensionSizeConflict {
        /// The dimension name.
        dim: String,
        /// The declared size.
        expected: usize,
        /// The conflicting size.
        got: usize,
        /// The variable name.
        variable: String,
    },
    /// The number of dimension names does not match the dimensionality of the data.
    #[error("dimensions {dims:?} do not match data with {ndim} dimensions")]
    DimensionCountMismatch {
        /// The dimension names.
        dims: Vec<String>,
        /// The dimensionality of the data.
        ndim: usize,
    },
    /// A dimension is repeated in a variable.
    #[error("dimension {0} is repeated")]
    DuplicateDimension(String),
    /// A variable name is already in use.
    #[error("variable {0} already exists")]
    DuplicateVariable(String),
    /// A dimension is not declared.
    #[error("dimension {0} does not exist")]
    UnknownDimension(String),
    /// A selection exceeds the size of a dimension.
    #[error("selection {range:?} exceeds dimension {dim} of size {size}")]
    IndexOutOfBounds {
        /// The dimension name.
        dim: String,
        /// The selected range.
        range: Range<usize>,
        /// The dimension size.
        size: usize,
    },
    /// An invalid variable name.
    #[error("invalid variable name {0:?}")]
    InvalidName(String),
    /// Incompatible variable data.
    #[error("{0}")]
    IncompatibleData(String),
}

/// A difference between two datasets found by [`Dataset::compare`].
#[derive(Clone, Debug, Error, PartialEq)]
pub enum DatasetMismatch {
    /// A variable is missing.
    #[error("variable {0} is missing")]
    MissingVariable(String),
    /// A variable has different dimensions.
    #[error("variable {name} has dimensions {got:?}, expected {expected:?}")]
    Dimensions {
        /// The variable name.
        name: String,
        /// The expected dimensions.
        expected: Vec<String>,
        /// The dimensions found.
        got: Vec<String>,
    },
    /// A variable has a different data type.
    #[error("variable {name} has data type {got}, expected {expected}")]
    DataType {
        /// The variable name.
        name: String,
        /// The expected data type.
        expected: DataType,
        /// The data type found.
        got: DataType,
    },
    /// A variable has a different shape.
    #[error("variable {name} has shape {got:?}, expected {expected:?}")]
    Shape {
        /// The variable name.
        name: String,
        /// The expected shape.
        expected: Vec<usize>,
        /// The shape found.
        got: Vec<usize>,
    },
    /// A variable has different values.
    #[error("variable {name} differs at index {index:?}")]
    Values {
        /// The variable name.
        name: String,
        /// The first differing index.
        index: Vec<usize>,
    },
}

/// Returns true if `name` can name a group or variable in a store.
///
/// Names are not empty, do not contain `/`, do not start with the reserved `__` prefix and are not `zarr.json`.
#[must_use]
pub fn is_valid_node_name(name: &str) -> bool {
    !name.is_empty()
        && !name.contains('/')
        && !name.starts_with("__")
        && name != crate::metadata::ZARR_JSON
        && name != "."
        && name != ".."
}

/// A labelled multidimensional dataset.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Dataset {
    dims: Vec<(String, usize)>,
    coords: BTreeMap<String, Variable>,
    data_vars: BTreeMap<String, Variable>,
    attrs: serde_json::Map<String, Value>,
}

impl Display for Dataset {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let dims: Vec<String> = self
            .dims
            .iter()
            .map(|(name, size)| format!("{name}: {size}"))
            .collect();
        write!(
            f,
            "Dataset ({}) with coordinates {:?} and data variables {:?}",
            dims.join(", "),
            self.coords.keys().collect::<Vec<_>>(),
            self.data_vars.keys().collect::<Vec<_>>()
        )
    }
}

impl Dataset {
    /// Create an empty dataset.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the dataset attributes.
    #[must_use]
    pub fn with_attrs(mut self, attrs: serde_json::Map<String, Value>) -> Self {
        self.attrs = attrs;
        self
    }

    /// Declare dimension `dim` of `size`, without adding a variable.
    ///
    /// # Errors
    /// Returns [`DatasetError::DimensionSizeConflict`] if `dim` is declared with another size.
    pub fn add_dim(&mut self, dim: &str, size: usize) -> Result<(), DatasetError> {
        match self.dim_size(dim) {
            Some(expected) if expected != size => Err(DatasetError::DimensionSizeConflict {
                dim: dim.to_string(),
                expected,
                got: size,
                variable: String::new(),
            }),
            Some(_) => Ok(()),
            None => {
                self.dims.push((dim.to_string(), size));
                Ok(())
            }
        }
    }

    /// Add a coordinate variable.
    ///
    /// # Errors
    /// Returns a [`DatasetError`] if the name is invalid or in use, or the variable dimensions conflict with the dataset.
    pub fn add_coord(&mut self, name: &str, variable: Variable) -> Result<(), DatasetError> {
        self.declare(name, &variable)?;
        self.coords.insert(name.to_string(), variable);
        Ok(())
    }

    /// Add a data variable.
    ///
    /// # Errors
    /// Returns a [`DatasetError`] if the name is invalid or in use, or the variable dimensions conflict with the dataset.
    pub fn add_data_var(&mut self, name: &str, variable: Variable) -> Result<(), DatasetError> {
        self.declare(name, &variable)?;
        self.data_vars.insert(name.to_string(), variable);
        Ok(())
    }

    fn declare(&mut self, name: &str, variable: &Variable) -> Result<(), DatasetError> {
        if !is_valid_node_name(name) {
            return Err(DatasetError::InvalidName(name.to_string()));
        }
        if self.variable(name).is_some() {
            return Err(DatasetError::DuplicateVariable(name.to_string()));
        }
        // check every dimension before declaring any
        for (dim, &size) in std::iter::zip(variable.dims(), variable.shape()) {
            if let Some(expected) = self.dim_size(dim) {
                if expected != size {
                    return Err(DatasetError::DimensionSizeConflict {
                        dim: dim.clone(),
                        expected,
                        got: size,
                        variable: name.to_string(),
                    });
                }
            }
        }
        for (dim, &size) in std::iter::zip(variable.dims(), variable.shape()) {
            if self.dim_size(dim).is_none() {
                self.dims.push((dim.clone(), size));
            }
        }
        Ok(())
    }

    /// The dimensions and their sizes, in declaration order.
    pub fn dims(&self) -> impl Iterator<Item = (&str, usize)> {
        self.dims.iter().map(|(name, size)| (name.as_str(), *size))
    }

    /// The size of dimension `dim`.
    #[must_use]
    pub fn dim_size(&self, dim: &str) -> Option<usize> {
        self.dims
            .iter()
            .find_map(|(name, size)| (name == dim).then_some(*size))
    }

    /// The coordinate variables.
    #[must_use]
    pub const fn coords(&self) -> &BTreeMap<String, Variable> {
        &self.coords
    }

    /// The data variables.
    #[must_use]
    pub const fn data_vars(&self) -> &BTreeMap<String, Variable> {
        &self.data_vars
    }

    /// All variables, coordinates first.
    pub fn variables(&self) -> impl Iterator<Item = (&String, &Variable)> {
        self.coords.iter().chain(self.data_vars.iter())
    }

    /// The variable named `name`, a coordinate or data variable.
    #[must_use]
    pub fn variable(&self, name: &str) -> Option<&Variable> {
        self.coords.get(name).or_else(|| self.data_vars.get(name))
    }

    /// Returns true if `name` is a coordinate variable.
    #[must_use]
    pub fn is_coord(&self, name: &str) -> bool {
        self.coords.contains_key(name)
    }

    /// The dataset attributes.
    #[must_use]
    pub const fn attrs(&self) -> &serde_json::Map<String, Value> {
        &self.attrs
    }

    /// Select `range` of dimension `dim` in every variable that varies along it.
    ///
    /// # Errors
    /// Returns a [`DatasetError`] if `dim` is not a dimension or `range` exceeds its size.
    pub fn isel(&self, dim: &str, range: Range<usize>) -> Result<Self, DatasetError> {
        let size = self
            .dim_size(dim)
            .ok_or_else(|| DatasetError::UnknownDimension(dim.to_string()))?;
        if range.start > range.end || range.end > size {
            return Err(DatasetError::IndexOutOfBounds {
                dim: dim.to_string(),
                range,
                size,
            });
        }
        let select = |variables: &BTreeMap<String, Variable>| {
            variables
                .iter()
                .map(|(name, variable)| (name.clone(), variable.isel(dim, range.clone())))
                .collect()
        };
        Ok(Self {
            dims: self
                .dims
                .iter()
                .map(|(name, size)| {
                    let size = if name == dim { range.len() } else { *size };
                    (name.clone(), size)
                })
                .collect(),
            coords: select(&self.coords),
            data_vars: select(&self.data_vars),
            attrs: self.attrs.clone(),
        })
    }

    /// Returns the dataset with every coordinate variable dropped.
    ///
    /// Dimensions that no remaining variable references are dropped too.
    #[must_use]
    pub fn drop_coords(&self) -> Self {
        let dims = self
            .dims
            .iter()
            .filter(|(dim, _)| self.data_vars.values().any(|v| v.has_dim(dim)))
            .cloned()
            .collect();
        Self {
            dims,
            coords: BTreeMap::new(),
            data_vars: self.data_vars.clone(),
            attrs: self.attrs.clone(),
        }
    }

    /// Check that every variable of this dataset is present and equal in `other`.
    ///
    /// Elements are compared with NaN equal to NaN.
    /// Variables only present in `other` are ignored.
    ///
    /// # Errors
    /// Returns the first [`DatasetMismatch`] found, in variable name order with coordinates first.
    pub fn compare(&self, other: &Self) -> Result<(), DatasetMismatch> {
        for (name, expected) in self.variables() {
            let Some(got) = other.variable(name) else {
                return Err(DatasetMismatch::MissingVariable(name.clone()));
            };
            if expected.dims() != got.dims() {
                return Err(DatasetMismatch::Dimensions {
                    name: name.clone(),
                    expected: expected.dims().to_vec(),
                    got: got.dims().to_vec(),
                });
            }
            if expected.data().data_type() != got.data().data_type() {
                return Err(DatasetMismatch::DataType {
                    name: name.clone(),
                    expected: expected.data().data_type(),
                    got: got.data().data_type(),
                });
            }
            if expected.shape() != got.shape() {
                return Err(DatasetMismatch::Shape {
                    name: name.clone(),
                    expected: expected.shape().to_vec(),
                    got: got.shape().to_vec(),
                });
            }
            if let Some(index) = expected.data().first_difference(got.data()) {
                return Err(DatasetMismatch::Values {
                    name: name.clone(),
                    index,
                });
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use ndarray::{array, ArrayD};

    use super::*;

    fn dataset() -> Dataset {
        let mut ds = Dataset::new();
        ds.add_coord(
            "time",
            Variable::new(["time"], VariableData::DateTime64(array![0i64, 10, 20].into_dyn()))
                .unwrap(),
        )
        .unwrap();
        ds.add_coord(
            "step",
            Variable::new(
                Vec::<String>::new(),
                VariableData::TimeDelta64(ArrayD::from_elem(vec![], 0)),
            )
            .unwrap(),
        )
        .unwrap();
        ds.add_data_var(
            "t",
            Variable::new(
                ["time", "x"],
                VariableData::Float32(array![[1.0f32, 2.0], [3.0, 4.0], [5.0, f32::NAN]].into_dyn()),
            )
            .unwrap(),
        )
        .unwrap();
        ds
    }

    #[test]
    fn dataset_dims() {
        let ds = dataset();
        assert_eq!(ds.dims().collect::<Vec<_>>(), vec![("time", 3), ("x", 2)]);
        assert_eq!(ds.dim_size("x"), Some(2));
        assert!(ds.is_coord("time"));
        assert!(!ds.is_coord("t"));
        assert_eq!(ds.variables().count(), 3);
        assert_eq!(
            ds.to_string(),
            r#"Dataset (time: 3, x: 2) with coordinates ["step", "time"] and data variables ["t"]"#
        );
    }

    #[test]
    fn dataset_dimension_size_conflict() {
        let mut ds = dataset();
        let conflicting =
            Variable::new(["time"], VariableData::Int64(array![1i64, 2].into_dyn())).unwrap();
        assert!(matches!(
            ds.add_data_var("u", conflicting),
            Err(DatasetError::DimensionSizeConflict { expected: 3, got: 2, .. })
        ));
        assert!(ds.variable("u").is_none());
        assert!(matches!(
            ds.add_dim("x", 3),
            Err(DatasetError::DimensionSizeConflict { .. })
        ));
    }

    #[test]
    fn dataset_invalid_names() {
        let mut ds = dataset();
        let variable =
            Variable::new(["x"], VariableData::Int64(array![1i64, 2].into_dyn())).unwrap();
        for name in ["", "a/b", "__a", "zarr.json"] {
            assert!(matches!(
                ds.add_data_var(name, variable.clone()),
                Err(DatasetError::InvalidName(_))
            ));
        }
        assert!(matches!(
            ds.add_coord("t", variable),
            Err(DatasetError::DuplicateVariable(_))
        ));
    }

    #[test]
    fn dataset_isel() {
        let ds = dataset();
        let sliced = ds.isel("time", 2..3).unwrap();
        assert_eq!(sliced.dim_size("time"), Some(1));
        assert_eq!(sliced.coords()["step"], ds.coords()["step"]);
        assert_eq!(sliced.data_vars()["t"].shape(), &[1, 2]);
        assert!(ds.isel("time", 2..4).is_err());
        assert!(ds.isel("level", 0..1).is_err());
    }

    #[test]
    fn dataset_drop_coords() {
        let ds = dataset();
        let dropped = ds.drop_coords();
        assert!(dropped.coords().is_empty());
        assert_eq!(dropped.data_vars().len(), 1);
        assert_eq!(dropped.dims().count(), 2);
    }

    #[test]
    fn dataset_compare() {
        let ds = dataset();
        assert_eq!(ds.compare(&ds), Ok(()));

        let mut other = Dataset::new();
        other
            .add_coord("step", ds.coords()["step"].clone())
            .unwrap();
        assert_eq!(
            ds.compare(&other),
            Err(DatasetMismatch::MissingVariable("time".to_string()))
        );

        let mut other = ds.drop_coords();
        other.add_coord("step", ds.coords()["step"].clone()).unwrap();
        other
            .add_coord(
                "time",
                Variable::new(["time"], VariableData::DateTime64(array![0i64, 10, 30].into_dyn()))
                    .unwrap(),
            )
            .unwrap();
        assert_eq!(
            ds.compare(&other),
            Err(DatasetMismatch::Values {
                name: "time".to_string(),
                index: vec![2]
            })
        );
        // extra variables in the other dataset are ignored
        assert_eq!(ds.drop_coords().compare(&ds), Ok(()));
    }
}
