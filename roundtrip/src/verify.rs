//! The round-trip verifier.
//!
//! [`RoundTripVerifier`] drives a [`Dataset`] through write, reload, region overwrite and append against a [`DatasetStore`],
//! comparing the reloaded dataset after every mutation.
//!
//! ```text
//! Init -> Written -> Reloaded1 -> Overwritten -> Reloaded2 -> Appended -> Reloaded3 -> Done
//! ```
//!
//! Any failed step moves the verifier to [`VerifierState::Failed`].

use std::time::{Duration, Instant};

use derive_more::Display;
use thiserror::Error;

use crate::{
    config::VerifierConfig,
    dataset::{Dataset, DatasetError, DatasetMismatch, Variable},
    fixture::{self, DecodeError, FetchError},
    group::{DatasetGroup, DatasetStore, GroupError, Region, WriteMode},
    store_handle::{StoreHandle, StoreUnavailableError},
};

/// The state of a [`RoundTripVerifier`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, Display)]
pub enum VerifierState {
    /// Nothing has been done.
    #[display("init")]
    Init,
    /// The dataset has been written.
    #[display("written")]
    Written,
    /// The written dataset has been reloaded and compared.
    #[display("reloaded after write")]
    Reloaded1,
    /// The data variables have been overwritten in place.
    #[display("overwritten")]
    Overwritten,
    /// The overwritten dataset has been reloaded and compared.
    #[display("reloaded after overwrite")]
    Reloaded2,
    /// A slice has been appended.
    #[display("appended")]
    Appended,
    /// The appended dataset has been reloaded.
    #[display("reloaded after append")]
    Reloaded3,
    /// Every step succeeded.
    #[display("done")]
    Done,
    /// A step failed.
    #[display("failed")]
    Failed,
}

/// A transition of a [`RoundTripVerifier`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, Display)]
pub enum VerifierStep {
    /// Fetch the fixture and write it.
    #[display("write")]
    Write,
    /// Reload and compare with the written dataset.
    #[display("reload")]
    Reload,
    /// Overwrite the data variables over the full extent of the append dimension.
    #[display("overwrite region")]
    OverwriteRegion,
    /// Reload and compare with the written dataset.
    #[display("reload after overwrite")]
    ReloadOverwritten,
    /// Append a slice along the append dimension.
    #[display("append")]
    Append,
    /// Reload and check the append postconditions.
    #[display("reload after append")]
    ReloadAppended,
}

impl VerifierStep {
    /// The state reached when the step succeeds.
    #[must_use]
    pub const fn target(self) -> VerifierState {
        match self {
            Self::Write => VerifierState::Written,
            Self::Reload => VerifierState::Reloaded1,
            Self::OverwriteRegion => VerifierState::Overwritten,
            Self::ReloadOverwritten => VerifierState::Reloaded2,
            Self::Append => VerifierState::Appended,
            Self::ReloadAppended => VerifierState::Reloaded3,
        }
    }
}

/// The cause of a [`VerifyError`].
#[derive(Clone, Debug, Error)]
pub enum VerifyErrorKind {
    /// The fixture could not be fetched.
    #[error(transparent)]
    Fetch(#[from] FetchError),
    /// The fixture could not be decoded.
    #[error(transparent)]
    Decode(#[from] DecodeError),
    /// The backing store could not be opened.
    #[error(transparent)]
    StoreUnavailable(#[from] StoreUnavailableError),
    /// A group operation failed.
    #[error(transparent)]
    Group(#[from] GroupError),
    /// A dataset could not be built.
    #[error(transparent)]
    Dataset(#[from] DatasetError),
    /// A reloaded dataset differs from what was written, or a postcondition does not hold.
    #[error("verification failure: {0}")]
    VerificationFailure(String),
}

impl From<DatasetMismatch> for VerifyErrorKind {
    fn from(mismatch: DatasetMismatch) -> Self {
        Self::VerificationFailure(mismatch.to_string())
    }
}

/// A verification error: the failed step and its cause.
#[derive(Clone, Debug, Error)]
#[error("{step} failed: {kind}")]
pub struct VerifyError {
    step: VerifierStep,
    kind: VerifyErrorKind,
}

impl VerifyError {
    /// Create a new verification error.
    #[must_use]
    pub fn new(step: VerifierStep, kind: impl Into<VerifyErrorKind>) -> Self {
        Self {
            step,
            kind: kind.into(),
        }
    }

    /// The failed step.
    #[must_use]
    pub const fn step(&self) -> VerifierStep {
        self.step
    }

    /// The cause.
    #[must_use]
    pub const fn kind(&self) -> &VerifyErrorKind {
        &self.kind
    }
}

/// The outcome of a successful step.
#[derive(Clone, Debug, PartialEq)]
pub struct StepOutcome {
    /// The step.
    pub step: VerifierStep,
    /// How long the step took.
    pub duration: Duration,
}

/// The steps completed by a [`RoundTripVerifier`].
#[derive(Clone, Debug, Default, PartialEq)]
pub struct VerificationReport {
    steps: Vec<StepOutcome>,
}

impl VerificationReport {
    /// The completed steps, in order.
    #[must_use]
    pub fn steps(&self) -> &[StepOutcome] {
        &self.steps
    }

    /// The total duration of the completed steps.
    #[must_use]
    pub fn total_duration(&self) -> Duration {
        self.steps.iter().map(|outcome| outcome.duration).sum()
    }
}

impl std::fmt::Display for VerificationReport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        for outcome in &self.steps {
            writeln!(f, "{:<24}{:>12.3?}", outcome.step.to_string(), outcome.duration)?;
        }
        write!(f, "{:<24}{:>12.3?}", "total", self.total_duration())
    }
}

/// Drives a dataset through write, region overwrite and append against a [`DatasetStore`].
#[derive(Debug)]
pub struct RoundTripVerifier<TStore> {
    store: TStore,
    append_dimension: String,
    write_mode: WriteMode,
    state: VerifierState,
    report: VerificationReport,
}

impl<TStore: DatasetStore> RoundTripVerifier<TStore> {
    /// Create a new verifier appending along `append_dimension`.
    #[must_use]
    pub fn new(store: TStore, append_dimension: impl Into<String>) -> Self {
        Self {
            store,
            append_dimension: append_dimension.into(),
            write_mode: WriteMode::default(),
            state: VerifierState::Init,
            report: VerificationReport::default(),
        }
    }

    /// Set the write mode of the initial write. Defaults to [`WriteMode::Create`].
    #[must_use]
    pub fn with_write_mode(mut self, write_mode: WriteMode) -> Self {
        self.write_mode = write_mode;
        self
    }

    /// The current state.
    #[must_use]
    pub const fn state(&self) -> VerifierState {
        self.state
    }

    /// The completed steps.
    #[must_use]
    pub const fn report(&self) -> &VerificationReport {
        &self.report
    }

    /// The store.
    #[must_use]
    pub const fn store(&self) -> &TStore {
        &self.store
    }

    /// Run `step`, recording its outcome, or moving to [`VerifierState::Failed`] on error.
    fn step<T>(
        &mut self,
        step: VerifierStep,
        f: impl FnOnce(&Self) -> Result<T, VerifyErrorKind>,
    ) -> Result<T, VerifyError> {
        let start = Instant::now();
        match f(self) {
            Ok(value) => {
                let duration = start.elapsed();
                self.state = step.target();
                self.report.steps.push(StepOutcome { step, duration });
                log::info!("{step} completed in {duration:.3?}, now {}", self.state);
                Ok(value)
            }
            Err(kind) => {
                self.state = VerifierState::Failed;
                let err = VerifyError::new(step, kind);
                log::error!("{err}");
                Err(err)
            }
        }
    }

    /// Mark the verifier failed at `step`.
    fn fail(&mut self, step: VerifierStep, kind: impl Into<VerifyErrorKind>) -> VerifyError {
        self.state = VerifierState::Failed;
        let err = VerifyError::new(step, kind);
        log::error!("{err}");
        err
    }

    /// Verify `dataset`, running every step from [`VerifierState::Init`].
    ///
    /// # Errors
    /// Returns a [`VerifyError`] naming the first failed step.
    pub fn verify(&mut self, dataset: &Dataset) -> Result<&VerificationReport, VerifyError> {
        if self.state != VerifierState::Init {
            return Err(VerifyError::new(
                VerifierStep::Write,
                VerifyErrorKind::VerificationFailure(format!(
                    "the verifier has already run and is {}",
                    self.state
                )),
            ));
        }
        let dim = self.append_dimension.clone();
        let Some(size) = dataset.dim_size(&dim) else {
            return Err(self.fail(
                VerifierStep::Write,
                DatasetError::UnknownDimension(dim.clone()),
            ));
        };
        log::info!("verifying {dataset}");

        self.step(VerifierStep::Write, |verifier| {
            Ok(verifier.store.write(dataset, verifier.write_mode)?)
        })?;

        self.step(VerifierStep::Reload, |verifier| {
            let loaded = verifier.store.read()?;
            Ok(dataset.compare(&loaded)?)
        })?;

        self.step(VerifierStep::OverwriteRegion, |verifier| {
            let write_dataset = dataset.drop_coords();
            let region = Region::new().with_range(dim.clone(), 0..size);
            Ok(verifier.store.overwrite_region(&write_dataset, &region)?)
        })?;

        self.step(VerifierStep::ReloadOverwritten, |verifier| {
            let loaded = verifier.store.read()?;
            Ok(dataset.compare(&loaded)?)
        })?;

        let slice = self.step(VerifierStep::Append, |verifier| {
            let slice = next_slice(dataset, &dim, size)?;
            verifier.store.append(&slice, &dim)?;
            Ok(slice)
        })?;

        self.step(VerifierStep::ReloadAppended, |verifier| {
            let loaded = verifier.store.read()?;
            check_appended(dataset, &slice, &loaded, &dim, size)
        })?;

        self.state = VerifierState::Done;
        log::info!("verification done in {:.3?}", self.report.total_duration());
        Ok(&self.report)
    }
}

/// A one step slice to append along `dim`: the variables varying along `dim` at its last index, with a new coordinate value.
fn next_slice(dataset: &Dataset, dim: &str, size: usize) -> Result<Dataset, VerifyErrorKind> {
    if size == 0 {
        return Err(VerifyErrorKind::VerificationFailure(format!(
            "cannot append along empty dimension {dim}"
        )));
    }
    let last = dataset.isel(dim, size - 1..size)?;
    let coordinate = dataset.coords().get(dim).ok_or_else(|| {
        VerifyErrorKind::VerificationFailure(format!("dimension {dim} has no coordinate"))
    })?;
    let next_value = coordinate.data().next_value().ok_or_else(|| {
        VerifyErrorKind::VerificationFailure(format!(
            "coordinate {dim} has no representable value past its maximum"
        ))
    })?;

    let mut slice = Dataset::new().with_attrs(dataset.attrs().clone());
    slice.add_coord(
        dim,
        Variable::new([dim], next_value)?.with_attrs(coordinate.attrs().clone()),
    )?;
    for (name, variable) in last.variables() {
        if name == dim || !variable.has_dim(dim) {
            continue;
        }
        if last.is_coord(name) {
            slice.add_coord(name, variable.clone())?;
        } else {
            slice.add_data_var(name, variable.clone())?;
        }
    }
    log::debug!("appending {slice}");
    Ok(slice)
}

/// Check the postconditions of an append of `slice` to `dataset` of `size` along `dim`.
fn check_appended(
    dataset: &Dataset,
    slice: &Dataset,
    loaded: &Dataset,
    dim: &str,
    size: usize,
) -> Result<(), VerifyErrorKind> {
    let expected_size = size + 1;
    match loaded.dim_size(dim) {
        Some(loaded_size) if loaded_size == expected_size => {}
        loaded_size => {
            return Err(VerifyErrorKind::VerificationFailure(format!(
                "dimension {dim} has size {loaded_size:?} after append, expected {expected_size}"
            )))
        }
    }

    let missing = || DatasetMismatch::MissingVariable(dim.to_string());
    let original = dataset.coords().get(dim).ok_or_else(missing)?;
    let appended = slice.coords().get(dim).ok_or_else(missing)?;
    let expected = original.data().concatenate(0, appended.data())?;
    let coordinate = loaded.coords().get(dim).ok_or_else(missing)?;
    if coordinate.data().data_type() != expected.data_type()
        || coordinate.shape() != expected.shape()
    {
        return Err(VerifyErrorKind::VerificationFailure(format!(
            "coordinate {dim} is {} {:?} after append, expected {} {:?}",
            coordinate.data().data_type(),
            coordinate.shape(),
            expected.data_type(),
            expected.shape()
        )));
    }
    if let Some(index) = coordinate.data().first_difference(&expected) {
        return Err(VerifyErrorKind::VerificationFailure(format!(
            "coordinate {dim} after append differs from the original values followed by the appended value at index {index:?}"
        )));
    }

    dataset.compare(&loaded.isel(dim, 0..size)?)?;
    Ok(())
}

/// Fetch, decode and verify the fixture described by `config`.
///
/// The store is opened once and closed whether or not verification succeeds.
///
/// # Errors
/// Returns a [`VerifyError`] naming the first failed step.
pub fn run_from_config(config: &VerifierConfig) -> Result<VerificationReport, VerifyError> {
    let write_error = |kind: VerifyErrorKind| {
        let err = VerifyError::new(VerifierStep::Write, kind);
        log::error!("{err}");
        err
    };
    let path = fixture::ensure_local_copy(
        config.fixture_url(),
        config.cache_path(),
        config.fetch_timeout(),
    )
    .map_err(|err| write_error(err.into()))?;
    let dataset = fixture::decode(&path).map_err(|err| write_error(err.into()))?;

    let handle = StoreHandle::open(&config.store_uri_with_credentials()).map_err(|err| write_error(err.into()))?;
    let result = DatasetGroup::new(handle.storage(), config.group_name())
        .map_err(|err| write_error(err.into()))
        .and_then(|group| {
            let group = group.with_chunk_target_elements(config.chunk_target_elements());
            let mut verifier = RoundTripVerifier::new(group, config.append_dimension())
                .with_write_mode(config.write_mode());
            verifier.verify(&dataset).cloned()
        });
    handle.close();
    result
}
