//! Dataset groups.
//!
//! A [`DatasetGroup`] persists a [`Dataset`] to a named group of a store, with one [`Array`] per variable.
//!
//! The group metadata at `<group>/zarr.json` holds the dataset attributes and two reserved attributes:
//! - `_dimensions`: the ordered dimension names, and
//! - `_coordinates`: the names of the coordinate variables.
//!
//! Every array has `dimension_names`, so the dimensions of a group are recovered from its arrays.
//!
//! Region overwrites and appends validate the whole request against the stored arrays before any chunk is written,
//! so a rejected request leaves the store unchanged.

use std::{collections::BTreeMap, ops::Range, sync::Arc};

use roundtrip_storage::{
    discover_children, ReadableWritableListableStorageTraits, StorageError, StorePrefix,
};
use serde_json::Value;
use thiserror::Error;

use crate::{
    array::{
        usize_from, Array, ArrayBuilder, ArrayCreateError, ArrayError, CodecChain, DataType,
        chunk_grid::DEFAULT_CHUNK_TARGET_ELEMENTS,
    },
    dataset::{is_valid_node_name, Dataset, DatasetError, Variable, VariableData},
    metadata::{GroupMetadataV3, ZARR_JSON},
};

/// The group attribute holding the ordered dimension names.
pub const DIMENSIONS_ATTRIBUTE: &str = "_dimensions";

/// The group attribute holding the coordinate variable names.
pub const COORDINATES_ATTRIBUTE: &str = "_coordinates";

/// A group error.
#[derive(Clone, Debug, Error)]
pub enum GroupError {
    /// An invalid group name.
    #[error("invalid group name {0:?}")]
    InvalidName(String),
    /// The group does not exist.
    #[error("group {0} does not exist")]
    GroupNotFound(String),
    /// The group already holds data.
    #[error("group {0} already holds data")]
    GroupExistsConflict(String),
    /// A region overwrite targets a variable it cannot write.
    #[error("region scope error: {0}")]
    RegionScope(String),
    /// Dimensions are incompatible with the stored arrays.
    #[error("dimension mismatch: {0}")]
    DimensionMismatch(String),
    /// Appended coordinate values are not strictly increasing past the stored values.
    #[error("values appended to coordinate {0} are not strictly increasing after the stored values")]
    OutOfOrderAppend(String),
    /// A variable has a different data type to its stored array.
    #[error("variable {variable} has data type {got}, the stored array has {expected}")]
    DataTypeMismatch {
        /// The variable name.
        variable: String,
        /// The data type of the stored array.
        expected: DataType,
        /// The data type of the variable.
        got: DataType,
    },
    /// A variable is not held by the group.
    #[error("variable {0} does not exist in the group")]
    VariableNotFound(String),
    /// Invalid group or array metadata.
    #[error("invalid metadata: {0}")]
    Metadata(String),
    /// A storage error.
    #[error(transparent)]
    Storage(#[from] StorageError),
    /// An array creation error.
    #[error(transparent)]
    ArrayCreate(#[from] ArrayCreateError),
    /// An array error.
    #[error(transparent)]
    Array(#[from] ArrayError),
    /// A dataset error.
    #[error(transparent)]
    Dataset(#[from] DatasetError),
}

/// The behaviour of [`DatasetStore::write`] when the group already holds data.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WriteMode {
    /// Fail with [`GroupError::GroupExistsConflict`].
    #[default]
    Create,
    /// Erase the group before writing.
    Overwrite,
}

/// A region of a dataset: index ranges of one or more dimensions.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Region(BTreeMap<String, Range<usize>>);

impl Region {
    /// Create an empty region.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Add `range` of dimension `dim` to the region.
    #[must_use]
    pub fn with_range(mut self, dim: impl Into<String>, range: Range<usize>) -> Self {
        self.0.insert(dim.into(), range);
        self
    }

    /// The range of dimension `dim`.
    #[must_use]
    pub fn get(&self, dim: &str) -> Option<&Range<usize>> {
        self.0.get(dim)
    }

    /// Iterate over the dimensions and ranges of the region.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &Range<usize>)> {
        self.0.iter().map(|(dim, range)| (dim.as_str(), range))
    }

    /// Returns true if the region has no dimensions.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl<S: Into<String>> FromIterator<(S, Range<usize>)> for Region {
    fn from_iter<T: IntoIterator<Item = (S, Range<usize>)>>(iter: T) -> Self {
        Self(iter.into_iter().map(|(dim, range)| (dim.into(), range)).collect())
    }
}

/// Dataset persistence operations on a group of a store.
pub trait DatasetStore {
    /// Persist `dataset` to the group, creating it if absent.
    ///
    /// # Errors
    /// Returns [`GroupError::GroupExistsConflict`] if `mode` is [`WriteMode::Create`] and the group already holds data,
    /// or another [`GroupError`] on failure to write.
    fn write(&self, dataset: &Dataset, mode: WriteMode) -> Result<(), GroupError>;

    /// Read the dataset persisted in the group.
    ///
    /// # Errors
    /// Returns [`GroupError::GroupNotFound`] if the group does not exist, or another [`GroupError`] on failure to read.
    fn read(&self) -> Result<Dataset, GroupError>;

    /// Overwrite `region` of the stored variables with the variables of `dataset`.
    ///
    /// Every variable of `dataset` must be a stored data variable that varies along every dimension of `region`,
    /// and its extent must match the region along region dimensions and the stored array elsewhere.
    ///
    /// # Errors
    /// Returns [`GroupError::RegionScope`], [`GroupError::DimensionMismatch`] or [`GroupError::DataTypeMismatch`]
    /// if the request is invalid, or another [`GroupError`] on failure to write.
    fn overwrite_region(&self, dataset: &Dataset, region: &Region) -> Result<(), GroupError>;

    /// Append the variables of `dataset` to the stored variables along `dim`.
    ///
    /// Variables of `dataset` without `dim` overwrite their stored arrays.
    ///
    /// # Errors
    /// Returns [`GroupError::DimensionMismatch`], [`GroupError::DataTypeMismatch`], [`GroupError::VariableNotFound`]
    /// or [`GroupError::OutOfOrderAppend`] if the request is invalid, or another [`GroupError`] on failure to write.
    fn append(&self, dataset: &Dataset, dim: &str) -> Result<(), GroupError>;
}

/// A stored variable: its array and dimension names.
struct StoredVariable<TStorage: ?Sized> {
    dims: Vec<String>,
    array: Array<TStorage>,
}

/// The stored metadata of a group and its arrays.
struct GroupNode<TStorage: ?Sized> {
    attributes: serde_json::Map<String, Value>,
    dimensions: Vec<String>,
    coordinates: Vec<String>,
    variables: BTreeMap<String, StoredVariable<TStorage>>,
}

impl<TStorage: ?Sized> GroupNode<TStorage> {
    fn dim_size(&self, dim: &str) -> Option<u64> {
        self.variables.values().find_map(|variable| {
            let axis = variable.dims.iter().position(|d| d == dim)?;
            Some(variable.array.shape()[axis])
        })
    }

    fn is_coord(&self, name: &str) -> bool {
        self.coordinates.iter().any(|coord| coord == name)
    }
}

/// A [`Dataset`] group in a store.
pub struct DatasetGroup<TStorage: ?Sized> {
    storage: Arc<TStorage>,
    name: String,
    path: StorePrefix,
    chunk_target_elements: u64,
    codecs: CodecChain,
}

impl<TStorage: ?Sized> std::fmt::Debug for DatasetGroup<TStorage> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DatasetGroup")
            .field("path", &self.path)
            .field("chunk_target_elements", &self.chunk_target_elements)
            .finish_non_exhaustive()
    }
}

impl<TStorage: ?Sized> DatasetGroup<TStorage> {
    /// Create a handle to the group `name` at the root of `storage`.
    ///
    /// The group is not created until it is written.
    ///
    /// # Errors
    /// Returns [`GroupError::InvalidName`] if `name` is not a valid node name.
    pub fn new(storage: Arc<TStorage>, name: &str) -> Result<Self, GroupError> {
        if !is_valid_node_name(name) {
            return Err(GroupError::InvalidName(name.to_string()));
        }
        let path = StorePrefix::root()
            .child(name)
            .map_err(|_| GroupError::InvalidName(name.to_string()))?;
        Ok(Self {
            storage,
            name: name.to_string(),
            path,
            chunk_target_elements: DEFAULT_CHUNK_TARGET_ELEMENTS,
            codecs: CodecChain::default_codecs(),
        })
    }

    /// Set the target number of elements of the chunks of written arrays.
    #[must_use]
    pub fn with_chunk_target_elements(mut self, chunk_target_elements: u64) -> Self {
        self.chunk_target_elements = chunk_target_elements;
        self
    }

    /// Set the codecs of written arrays.
    #[must_use]
    pub fn with_codecs(mut self, codecs: CodecChain) -> Self {
        self.codecs = codecs;
        self
    }

    /// The group name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The group path.
    #[must_use]
    pub const fn path(&self) -> &StorePrefix {
        &self.path
    }
}

impl<TStorage: ?Sized + ReadableWritableListableStorageTraits> DatasetGroup<TStorage> {
    /// Returns true if the group holds any data.
    ///
    /// # Errors
    /// Returns a [`StorageError`] if there is an underlying store error.
    pub fn exists(&self) -> Result<bool, StorageError> {
        Ok(!self.storage.list_prefix(&self.path)?.is_empty())
    }

    fn open_node(&self) -> Result<GroupNode<TStorage>, GroupError> {
        let key = self.path.key(ZARR_JSON).map_err(StorageError::from)?;
        let metadata = self
            .storage
            .get(&key)?
            .ok_or_else(|| GroupError::GroupNotFound(self.name.clone()))?;
        let GroupMetadataV3 { mut attributes, .. } = serde_json::from_slice(&metadata)
            .map_err(|err| GroupError::Metadata(format!("group {}: {err}", self.name)))?;
        let mut reserved = |attribute: &str| -> Result<Vec<String>, GroupError> {
            attributes.remove(attribute).map_or(Ok(Vec::new()), |value| {
                serde_json::from_value(value)
                    .map_err(|err| GroupError::Metadata(format!("attribute {attribute}: {err}")))
            })
        };
        let dimensions = reserved(DIMENSIONS_ATTRIBUTE)?;
        let coordinates = reserved(COORDINATES_ATTRIBUTE)?;

        let mut variables = BTreeMap::new();
        for child in discover_children(&self.storage, &self.path)? {
            let name = child
                .as_str()
                .strip_prefix(self.path.as_str())
                .and_then(|name| name.strip_suffix('/'))
                .unwrap_or_default()
                .to_string();
            let array = Array::open(self.storage.clone(), child)?;
            let dims = array
                .dimension_names()
                .unwrap_or_default()
                .iter()
                .cloned()
                .collect::<Option<Vec<String>>>()
                .filter(|dims| dims.len() == array.dimensionality())
                .ok_or_else(|| {
                    GroupError::Metadata(format!("array {name} does not name every dimension"))
                })?;
            variables.insert(name, StoredVariable { dims, array });
        }
        Ok(GroupNode {
            attributes,
            dimensions,
            coordinates,
            variables,
        })
    }

    fn write_variable(&self, name: &str, variable: &Variable) -> Result<(), GroupError> {
        let shape = variable.shape().iter().map(|&s| s as u64).collect();
        let array = ArrayBuilder::new(shape, variable.data().data_type())
            .chunk_target_elements(self.chunk_target_elements)
            .codecs(self.codecs.clone())
            .attributes(variable.attrs().clone())
            .dimension_names(variable.dims().iter().cloned())
            .build(self.storage.clone(), self.path.child(name).map_err(StorageError::from)?)?;
        array.store_metadata()?;
        store_variable_data(&array, &vec![0; variable.dims().len()], variable.data())?;
        log::trace!("wrote variable {name} {:?} to group {}", variable.shape(), self.name);
        Ok(())
    }
}

/// Store `data` in `array` starting at `start`.
fn store_variable_data<TStorage>(
    array: &Array<TStorage>,
    start: &[u64],
    data: &VariableData,
) -> Result<(), ArrayError>
where
    TStorage: ?Sized + ReadableWritableListableStorageTraits,
{
    match data {
        VariableData::Float32(a) => array.store_array_subset_ndarray(start, a.view()),
        VariableData::Float64(a) => array.store_array_subset_ndarray(start, a.view()),
        VariableData::Int64(a) | VariableData::DateTime64(a) | VariableData::TimeDelta64(a) => {
            array.store_array_subset_ndarray(start, a.view())
        }
    }
}

/// Retrieve the whole of `array`.
fn retrieve_variable_data<TStorage>(array: &Array<TStorage>) -> Result<VariableData, ArrayError>
where
    TStorage: ?Sized + ReadableWritableListableStorageTraits,
{
    let subset = array.subset_all();
    Ok(match array.data_type() {
        DataType::Float32 => VariableData::Float32(array.retrieve_array_subset_ndarray(&subset)?),
        DataType::Float64 => VariableData::Float64(array.retrieve_array_subset_ndarray(&subset)?),
        DataType::Int64 => VariableData::Int64(array.retrieve_array_subset_ndarray(&subset)?),
        DataType::NumpyDateTime64 => {
            VariableData::DateTime64(array.retrieve_array_subset_ndarray(&subset)?)
        }
        DataType::NumpyTimeDelta64 => {
            VariableData::TimeDelta64(array.retrieve_array_subset_ndarray(&subset)?)
        }
    })
}

/// Check that `variable` has the dimensions and data type of `stored`.
fn check_compatible<TStorage: ?Sized>(
    name: &str,
    variable: &Variable,
    stored: &StoredVariable<TStorage>,
) -> Result<(), GroupError> {
    if variable.dims() != stored.dims.as_slice() {
        return Err(GroupError::DimensionMismatch(format!(
            "variable {name} has dimensions {:?}, the stored array has {:?}",
            variable.dims(),
            stored.dims
        )));
    }
    let data_type = variable.data().data_type();
    if data_type != *stored.array.data_type() {
        return Err(GroupError::DataTypeMismatch {
            variable: name.to_string(),
            expected: *stored.array.data_type(),
            got: data_type,
        });
    }
    Ok(())
}

impl<TStorage> DatasetStore for DatasetGroup<TStorage>
where
    TStorage: ?Sized + ReadableWritableListableStorageTraits,
{
    fn write(&self, dataset: &Dataset, mode: WriteMode) -> Result<(), GroupError> {
        if let Some(reserved) = [DIMENSIONS_ATTRIBUTE, COORDINATES_ATTRIBUTE]
            .into_iter()
            .find(|name| dataset.attrs().contains_key(*name))
        {
            return Err(GroupError::Metadata(format!(
                "dataset attribute {reserved} is reserved"
            )));
        }
        if self.exists()? {
            match mode {
                WriteMode::Create => {
                    return Err(GroupError::GroupExistsConflict(self.name.clone()));
                }
                WriteMode::Overwrite => {
                    log::debug!("erasing group {}", self.name);
                    self.storage.erase_prefix(&self.path)?;
                }
            }
        }

        let mut attributes = dataset.attrs().clone();
        attributes.insert(
            DIMENSIONS_ATTRIBUTE.to_string(),
            dataset.dims().map(|(dim, _)| dim).collect::<Vec<_>>().into(),
        );
        attributes.insert(
            COORDINATES_ATTRIBUTE.to_string(),
            dataset.coords().keys().cloned().collect::<Vec<_>>().into(),
        );
        let metadata = serde_json::to_vec_pretty(&GroupMetadataV3::new(attributes))
            .map_err(|err| GroupError::Metadata(err.to_string()))?;
        let key = self.path.key(ZARR_JSON).map_err(StorageError::from)?;
        self.storage.set(&key, metadata.into())?;

        for (name, variable) in dataset.variables() {
            self.write_variable(name, variable)?;
        }
        log::debug!("wrote {dataset} to group {}", self.name);
        Ok(())
    }

    fn read(&self) -> Result<Dataset, GroupError> {
        let node = self.open_node()?;
        let mut dataset = Dataset::new().with_attrs(node.attributes.clone());
        for dim in &node.dimensions {
            if let Some(size) = node.dim_size(dim) {
                dataset.add_dim(dim, usize_from(size))?;
            }
        }
        // coordinates first, matching the order they were written
        let (coords, data_vars): (Vec<_>, Vec<_>) = node
            .variables
            .iter()
            .partition(|(name, _)| node.is_coord(name));
        for (name, stored) in coords.into_iter().chain(data_vars) {
            let data = retrieve_variable_data(&stored.array)?;
            let variable = Variable::new(stored.dims.iter().cloned(), data)?
                .with_attrs(stored.array.attributes().clone());
            if node.is_coord(name) {
                dataset.add_coord(name, variable)?;
            } else {
                dataset.add_data_var(name, variable)?;
            }
        }
        log::debug!("read {dataset} from group {}", self.name);
        Ok(dataset)
    }

    fn overwrite_region(&self, dataset: &Dataset, region: &Region) -> Result<(), GroupError> {
        let node = self.open_node()?;
        if region.is_empty() {
            return Err(GroupError::RegionScope("the region is empty".to_string()));
        }
        for (dim, range) in region.iter() {
            let size = node.dim_size(dim).ok_or_else(|| {
                GroupError::DimensionMismatch(format!(
                    "dimension {dim} does not exist in group {}",
                    self.name
                ))
            })?;
            if range.start > range.end || range.end as u64 > size {
                return Err(GroupError::DimensionMismatch(format!(
                    "region {dim}={range:?} exceeds the stored extent {size}"
                )));
            }
        }

        let mut writes = Vec::new();
        for (name, variable) in dataset.variables() {
            if dataset.is_coord(name) || node.is_coord(name) {
                return Err(GroupError::RegionScope(format!(
                    "{name} is a coordinate variable"
                )));
            }
            let stored = node.variables.get(name).ok_or_else(|| {
                GroupError::RegionScope(format!("variable {name} does not exist in group {}", self.name))
            })?;
            if let Some((dim, _)) = region.iter().find(|(dim, _)| !variable.has_dim(dim)) {
                return Err(GroupError::RegionScope(format!(
                    "variable {name} does not vary along region dimension {dim}"
                )));
            }
            check_compatible(name, variable, stored)?;

            let mut start = Vec::with_capacity(variable.dims().len());
            for ((dim, &extent), &stored_extent) in variable
                .dims()
                .iter()
                .zip(variable.shape())
                .zip(stored.array.shape())
            {
                let (offset, expected) = match region.get(dim) {
                    Some(range) => (range.start as u64, range.len() as u64),
                    None => (0, stored_extent),
                };
                if extent as u64 != expected {
                    return Err(GroupError::DimensionMismatch(format!(
                        "variable {name} has extent {extent} along {dim}, expected {expected}"
                    )));
                }
                start.push(offset);
            }
            writes.push((stored, start, variable));
        }

        for (stored, start, variable) in writes {
            store_variable_data(&stored.array, &start, variable.data())?;
        }
        log::debug!(
            "overwrote region {:?} of group {}",
            region.iter().collect::<Vec<_>>(),
            self.name
        );
        Ok(())
    }

    fn append(&self, dataset: &Dataset, dim: &str) -> Result<(), GroupError> {
        let mut node = self.open_node()?;
        let stored_size = node.dim_size(dim).ok_or_else(|| {
            GroupError::DimensionMismatch(format!(
                "dimension {dim} does not exist in group {}",
                self.name
            ))
        })?;
        let extent = dataset.dim_size(dim).ok_or_else(|| {
            GroupError::DimensionMismatch(format!("the appended dataset has no dimension {dim}"))
        })?;
        for (other, size) in dataset.dims().filter(|(other, _)| *other != dim) {
            if let Some(stored) = node.dim_size(other) {
                if stored != size as u64 {
                    return Err(GroupError::DimensionMismatch(format!(
                        "dimension {other} has size {size}, the stored size is {stored}"
                    )));
                }
            }
        }
        if let Some(name) = node
            .variables
            .iter()
            .find(|(name, stored)| stored.dims.iter().any(|d| d == dim) && dataset.variable(name).is_none())
            .map(|(name, _)| name)
        {
            return Err(GroupError::DimensionMismatch(format!(
                "variable {name} varies along {dim} but is missing from the appended dataset"
            )));
        }
        for (name, variable) in dataset.variables() {
            let stored = node
                .variables
                .get(name)
                .ok_or_else(|| GroupError::VariableNotFound(name.clone()))?;
            check_compatible(name, variable, stored)?;
            for ((d, &extent), &stored_extent) in variable
                .dims()
                .iter()
                .zip(variable.shape())
                .zip(stored.array.shape())
            {
                if d != dim && extent as u64 != stored_extent {
                    return Err(GroupError::DimensionMismatch(format!(
                        "variable {name} has extent {extent} along {d}, the stored extent is {stored_extent}"
                    )));
                }
            }
        }
        if node.is_coord(dim) {
            if let (Some(stored), Some(appended)) = (node.variables.get(dim), dataset.variable(dim)) {
                if stored.dims.len() == 1 {
                    let stored_values = retrieve_variable_data(&stored.array)?;
                    if !appended.data().is_strictly_increasing_after(Some(&stored_values)) {
                        return Err(GroupError::OutOfOrderAppend(dim.to_string()));
                    }
                }
            }
        }

        for (name, variable) in dataset.variables() {
            let Some(stored) = node.variables.get_mut(name) else {
                continue;
            };
            let mut start = vec![0; variable.dims().len()];
            if let Some(axis) = variable.axis(dim) {
                let mut shape = stored.array.shape().to_vec();
                start[axis] = shape[axis];
                shape[axis] += extent as u64;
                stored.array.set_shape(shape).map_err(ArrayError::from)?;
            }
            // chunks before metadata, so the stored shape never covers unwritten data
            store_variable_data(&stored.array, &start, variable.data())?;
            stored.array.store_metadata()?;
        }
        log::debug!(
            "appended {extent} to dimension {dim} of group {} ({stored_size} -> {})",
            self.name,
            stored_size + extent as u64
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use ndarray::{array, ArrayD, IxDyn};
    use roundtrip_storage::{
        storage_adapter::performance_metrics::PerformanceMetricsStorageAdapter, store::MemoryStore,
        ListableStorageTraits, ReadableStorageTraits, StoreKey,
    };

    use super::*;

    const HOUR: i64 = 3_600_000_000_000;

    fn time(values: &[i64]) -> Variable {
        Variable::new(
            ["time"],
            VariableData::DateTime64(ArrayD::from_shape_vec(IxDyn(&[values.len()]), values.to_vec()).unwrap()),
        )
        .unwrap()
    }

    fn temperature(num_times: usize, offset: f32) -> Variable {
        let data = ArrayD::from_shape_fn(IxDyn(&[num_times, 3, 4]), |idx| {
            offset + (idx[0] * 100 + idx[1] * 10 + idx[2]) as f32
        });
        Variable::new(["time", "latitude", "longitude"], VariableData::Float32(data)).unwrap()
    }

    fn dataset() -> Dataset {
        let mut ds = Dataset::new();
        ds.add_coord("time", time(&[0, 6 * HOUR, 12 * HOUR, 18 * HOUR])).unwrap();
        ds.add_coord(
            "latitude",
            Variable::new(["latitude"], VariableData::Float64(array![90.0, 89.5, 89.0].into_dyn()))
                .unwrap(),
        )
        .unwrap();
        ds.add_coord(
            "step",
            Variable::new(Vec::<String>::new(), VariableData::TimeDelta64(ArrayD::from_elem(IxDyn(&[]), 0)))
                .unwrap(),
        )
        .unwrap();
        let mut attrs = serde_json::Map::new();
        attrs.insert("units".to_string(), "K".into());
        ds.add_data_var("t", temperature(4, 200.0).with_attrs(attrs)).unwrap();
        ds
    }

    fn group<TStorage: ?Sized>(storage: Arc<TStorage>) -> DatasetGroup<TStorage> {
        DatasetGroup::new(storage, "grib_test")
            .unwrap()
            .with_chunk_target_elements(12)
    }

    fn store_snapshot(store: &MemoryStore) -> Vec<(StoreKey, Vec<u8>)> {
        store
            .list()
            .unwrap()
            .into_iter()
            .map(|key| {
                let value = store.get(&key).unwrap().unwrap().to_vec();
                (key, value)
            })
            .collect()
    }

    #[test]
    fn group_invalid_name() {
        let store = Arc::new(MemoryStore::new());
        for name in ["", "a/b", "__a"] {
            assert!(matches!(
                DatasetGroup::new(store.clone(), name),
                Err(GroupError::InvalidName(_))
            ));
        }
    }

    #[test]
    fn group_write_read() {
        let store = Arc::new(MemoryStore::new());
        let group = group(store.clone());
        assert!(matches!(group.read(), Err(GroupError::GroupNotFound(_))));

        let ds = dataset();
        group.write(&ds, WriteMode::Create).unwrap();
        let loaded = group.read().unwrap();
        assert_eq!(loaded.compare(&ds), Ok(()));
        assert_eq!(ds.compare(&loaded), Ok(()));
        assert_eq!(loaded.dims().collect::<Vec<_>>(), ds.dims().collect::<Vec<_>>());
        assert!(loaded.is_coord("step"));
        assert_eq!(loaded.data_vars()["t"].attrs()["units"], "K");

        let metadata: serde_json::Value = serde_json::from_slice(
            &store.get(&"grib_test/zarr.json".try_into().unwrap()).unwrap().unwrap(),
        )
        .unwrap();
        assert_eq!(
            metadata["attributes"][DIMENSIONS_ATTRIBUTE],
            serde_json::json!(["time", "latitude", "longitude"])
        );
        assert!(store.get(&"grib_test/step/c".try_into().unwrap()).unwrap().is_some());
    }

    #[test]
    fn group_write_modes() {
        let store = Arc::new(MemoryStore::new());
        let group = group(store);
        let ds = dataset();
        group.write(&ds, WriteMode::Create).unwrap();
        assert!(matches!(
            group.write(&ds, WriteMode::Create),
            Err(GroupError::GroupExistsConflict(_))
        ));

        let smaller = ds.isel("time", 0..2).unwrap();
        group.write(&smaller, WriteMode::Overwrite).unwrap();
        assert_eq!(group.read().unwrap().dim_size("time"), Some(2));
    }

    #[test]
    fn group_write_reserved_attributes() {
        let store = Arc::new(MemoryStore::new());
        let group = group(store.clone());
        group.write(&dataset(), WriteMode::Create).unwrap();
        let before = store_snapshot(&store);
        for reserved in [DIMENSIONS_ATTRIBUTE, COORDINATES_ATTRIBUTE] {
            let mut attrs = serde_json::Map::new();
            attrs.insert(reserved.to_string(), serde_json::json!(["x"]));
            let ds = dataset().with_attrs(attrs);
            assert!(matches!(
                group.write(&ds, WriteMode::Overwrite),
                Err(GroupError::Metadata(_))
            ));
        }
        assert_eq!(store_snapshot(&store), before);
    }

    #[test]
    fn group_overwrite_region_noop() {
        let store = Arc::new(MemoryStore::new());
        let group = group(store.clone());
        let ds = dataset();
        group.write(&ds, WriteMode::Create).unwrap();
        let before = store_snapshot(&store);
        group
            .overwrite_region(&ds.drop_coords(), &Region::new().with_range("time", 0..4))
            .unwrap();
        assert_eq!(store_snapshot(&store), before);
        assert_eq!(group.read().unwrap().compare(&ds), Ok(()));
    }

    #[test]
    fn group_overwrite_region_scope() {
        let store = Arc::new(PerformanceMetricsStorageAdapter::new(Arc::new(MemoryStore::new())));
        // chunks of time 2, latitude 3, longitude 2
        let group = group(store.clone());
        let ds = dataset();
        group.write(&ds, WriteMode::Create).unwrap();
        store.reset();

        let mut changed = Dataset::new();
        changed.add_data_var("t", temperature(1, -1.0)).unwrap();
        group
            .overwrite_region(&changed, &Region::new().with_range("time", 1..2))
            .unwrap();
        let mut written: Vec<String> = store.written_keys().iter().map(ToString::to_string).collect();
        written.sort();
        assert_eq!(written, vec!["grib_test/t/c/0/0/0", "grib_test/t/c/0/0/1"]);

        let loaded = group.read().unwrap();
        assert_eq!(
            loaded.isel("time", 1..2).unwrap().data_vars()["t"].data(),
            changed.data_vars()["t"].data()
        );
        for outside in [0..1, 2..4] {
            assert_eq!(
                loaded.isel("time", outside.clone()).unwrap().data_vars()["t"],
                ds.isel("time", outside).unwrap().data_vars()["t"]
            );
        }
    }

    #[test]
    fn group_overwrite_region_invalid() {
        let store = Arc::new(MemoryStore::new());
        let group = group(store.clone());
        let ds = dataset();
        group.write(&ds, WriteMode::Create).unwrap();
        let before = store_snapshot(&store);
        let region = Region::new().with_range("time", 0..4);

        // coordinates
        assert!(matches!(
            group.overwrite_region(&ds, &region),
            Err(GroupError::RegionScope(_))
        ));
        // region beyond the stored extent
        assert!(matches!(
            group.overwrite_region(&ds.drop_coords(), &Region::new().with_range("time", 2..6)),
            Err(GroupError::DimensionMismatch(_))
        ));
        // slice extent differs from the range
        assert!(matches!(
            group.overwrite_region(&ds.drop_coords(), &Region::new().with_range("time", 0..3)),
            Err(GroupError::DimensionMismatch(_))
        ));
        // unknown variable
        let mut unknown = Dataset::new();
        unknown.add_data_var("u", temperature(4, 0.0)).unwrap();
        assert!(matches!(
            group.overwrite_region(&unknown, &region),
            Err(GroupError::RegionScope(_))
        ));
        // data type
        let mut float64 = Dataset::new();
        float64
            .add_data_var(
                "t",
                Variable::new(
                    ["time", "latitude", "longitude"],
                    VariableData::Float64(ArrayD::zeros(IxDyn(&[4, 3, 4]))),
                )
                .unwrap(),
            )
            .unwrap();
        assert!(matches!(
            group.overwrite_region(&float64, &region),
            Err(GroupError::DataTypeMismatch { .. })
        ));
        assert!(matches!(
            group.overwrite_region(&ds.drop_coords(), &Region::new()),
            Err(GroupError::RegionScope(_))
        ));
        assert_eq!(store_snapshot(&store), before);
    }

    fn appended(times: &[i64], num_latitudes: usize) -> Dataset {
        let mut ds = Dataset::new();
        ds.add_coord("time", time(times)).unwrap();
        let data = ArrayD::from_elem(IxDyn(&[times.len(), num_latitudes, 4]), 1.0f32);
        ds.add_data_var(
            "t",
            Variable::new(["time", "latitude", "longitude"], VariableData::Float32(data)).unwrap(),
        )
        .unwrap();
        ds
    }

    #[test]
    fn group_append() {
        let store = Arc::new(MemoryStore::new());
        let group = group(store);
        let ds = dataset();
        group.write(&ds, WriteMode::Create).unwrap();

        group.append(&appended(&[24 * HOUR], 3), "time").unwrap();
        let loaded = group.read().unwrap();
        assert_eq!(loaded.dim_size("time"), Some(5));
        assert_eq!(
            loaded.coords()["time"],
            time(&[0, 6 * HOUR, 12 * HOUR, 18 * HOUR, 24 * HOUR])
        );
        assert_eq!(ds.compare(&loaded.isel("time", 0..4).unwrap()), Ok(()));
        assert_eq!(
            loaded.isel("time", 4..5).unwrap().data_vars()["t"].data(),
            &VariableData::Float32(ArrayD::from_elem(IxDyn(&[1, 3, 4]), 1.0))
        );
    }

    #[test]
    fn group_append_invalid() {
        let store = Arc::new(MemoryStore::new());
        let group = group(store.clone());
        group.write(&dataset(), WriteMode::Create).unwrap();
        let before = store_snapshot(&store);

        assert!(matches!(
            group.append(&appended(&[24 * HOUR], 2), "time"),
            Err(GroupError::DimensionMismatch(_))
        ));
        assert!(matches!(
            group.append(&appended(&[18 * HOUR], 3), "time"),
            Err(GroupError::OutOfOrderAppend(_))
        ));
        assert!(matches!(
            group.append(&appended(&[30 * HOUR, 24 * HOUR], 3), "time"),
            Err(GroupError::OutOfOrderAppend(_))
        ));
        assert!(matches!(
            group.append(&appended(&[24 * HOUR], 3), "level"),
            Err(GroupError::DimensionMismatch(_))
        ));
        // missing a variable along the appended dimension
        let mut coord_only = Dataset::new();
        coord_only.add_coord("time", time(&[24 * HOUR])).unwrap();
        assert!(matches!(
            group.append(&coord_only, "time"),
            Err(GroupError::DimensionMismatch(_))
        ));
        assert_eq!(store_snapshot(&store), before);
    }
}
