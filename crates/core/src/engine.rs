use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc,
};
use std::thread::{self, JoinHandle};
use std::time::Instant;

use chrono::{SecondsFormat, Utc};
use rand::{rngs::StdRng, seq::SliceRandom, SeedableRng};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::combinations::{combination_count, CombinationIndices};
use crate::error::EngineError;
use crate::estimate::{combination_bytes, estimate, format_size, SizeEstimate};
use crate::inventory::list_input_files;
use crate::model::{CopyErrorPolicy, CopyFailure, RunEvent, RunOutcome, RunPhase, RunStatus};

/// Cooperative stop signal shared between a run's worker and its controller.
///
/// The worker only looks at it before starting a combination, so a stop never
/// interrupts the copy of a combination already in progress.
#[derive(Debug, Clone, Default)]
pub struct CancellationToken {
    flag: Arc<AtomicBool>,
}

impl CancellationToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.flag.store(true, Ordering::Relaxed);
    }

    pub fn is_cancelled(&self) -> bool {
        self.flag.load(Ordering::Relaxed)
    }
}

#[derive(Debug, Clone)]
pub struct RunConfig {
    pub run_id: Option<String>,
    pub input_dir: PathBuf,
    pub output_dir: PathBuf,
    pub subset_size: usize,
    pub error_policy: CopyErrorPolicy,
    /// Fixed shuffle seed; `None` draws one from the OS.
    pub seed: Option<u64>,
}

impl RunConfig {
    pub fn new(
        input_dir: impl Into<PathBuf>,
        output_dir: impl Into<PathBuf>,
        subset_size: usize,
    ) -> Self {
        Self {
            run_id: None,
            input_dir: input_dir.into(),
            output_dir: output_dir.into(),
            subset_size,
            error_policy: CopyErrorPolicy::default(),
            seed: None,
        }
    }
}

/// A validated run: inputs listed, output base created, file order shuffled.
#[derive(Debug, Clone)]
pub struct PreparedRun {
    run_id: String,
    output_dir: PathBuf,
    subset_size: usize,
    error_policy: CopyErrorPolicy,
    files: Vec<PathBuf>,
    total_combinations: u128,
}

impl PreparedRun {
    pub fn run_id(&self) -> &str {
        &self.run_id
    }

    /// Input files in the shuffled order combinations are drawn from.
    pub fn files(&self) -> &[PathBuf] {
        &self.files
    }

    pub fn total_combinations(&self) -> u128 {
        self.total_combinations
    }

    pub fn size_estimate(&self) -> SizeEstimate {
        estimate(&self.files, self.subset_size)
    }
}

pub fn prepare_run(config: &RunConfig) -> Result<PreparedRun, EngineError> {
    if config.subset_size == 0 {
        return Err(EngineError::InvalidSubsetSize);
    }

    let mut files = list_input_files(&config.input_dir)?;
    if files.len() < config.subset_size {
        return Err(EngineError::InsufficientFiles {
            found: files.len(),
            required: config.subset_size,
        });
    }

    fs::create_dir_all(&config.output_dir).map_err(|source| EngineError::CreateOutputDir {
        path: config.output_dir.clone(),
        source,
    })?;

    let mut rng = match config.seed {
        Some(seed) => StdRng::seed_from_u64(seed),
        None => StdRng::from_entropy(),
    };
    files.shuffle(&mut rng);

    Ok(PreparedRun {
        run_id: config
            .run_id
            .clone()
            .unwrap_or_else(|| Uuid::new_v4().to_string()),
        output_dir: config.output_dir.clone(),
        subset_size: config.subset_size,
        error_policy: config.error_policy,
        total_combinations: combination_count(files.len(), config.subset_size),
        files,
    })
}

/// Prepares and executes a run on the calling thread.
pub fn run_combinations<F>(
    config: &RunConfig,
    token: &CancellationToken,
    on_event: F,
) -> Result<RunOutcome, EngineError>
where
    F: FnMut(RunEvent),
{
    let prepared = prepare_run(config)?;
    execute_run(prepared, token, on_event)
}

/// Materializes every combination of a prepared run, in lexicographic order
/// over the shuffled file list, until exhaustion or a stop request.
pub fn execute_run<F>(
    prepared: PreparedRun,
    token: &CancellationToken,
    mut on_event: F,
) -> Result<RunOutcome, EngineError>
where
    F: FnMut(RunEvent),
{
    let started = Instant::now();
    let mut events = EventSequence {
        run_id: prepared.run_id.clone(),
        total_combinations: prepared.total_combinations,
        seq: 0,
    };
    let mut outcome = RunOutcome {
        run_id: prepared.run_id.clone(),
        status: RunStatus::Running,
        total_combinations: prepared.total_combinations,
        materialized: 0,
        output_units: Vec::new(),
        failures: Vec::new(),
        bytes_copied: 0,
        elapsed_ms: 0,
    };

    info!(
        "run {}: {} file(s), {} per combination, {} combination(s) into {}",
        prepared.run_id,
        prepared.files.len(),
        prepared.subset_size,
        prepared.total_combinations,
        prepared.output_dir.display()
    );
    events.emit(&mut on_event, RunPhase::Started, 0, None, 0, None);

    let indices = CombinationIndices::new(prepared.files.len(), prepared.subset_size);
    for (position, tuple) in indices.enumerate() {
        let combination_index = position as u64 + 1;
        if token.is_cancelled() {
            info!(
                "run {}: stop requested, {} combination(s) materialized",
                prepared.run_id, outcome.materialized
            );
            outcome.status = RunStatus::Cancelled;
            outcome.elapsed_ms = elapsed_ms(started);
            events.emit(
                &mut on_event,
                RunPhase::Cancelled,
                outcome.materialized,
                None,
                0,
                None,
            );
            return Ok(outcome);
        }

        let combination: Vec<&Path> = tuple
            .iter()
            .map(|&index| prepared.files[index].as_path())
            .collect();
        let bytes = combination_bytes(&combination);

        match materialize(&prepared.output_dir, &combination, combination_index) {
            Ok(unit) => {
                debug!(
                    "run {}: combination {} copied to {}",
                    prepared.run_id,
                    combination_index,
                    unit.display()
                );
                outcome.materialized += 1;
                outcome.bytes_copied = outcome.bytes_copied.saturating_add(bytes);
                events.emit(
                    &mut on_event,
                    RunPhase::Materialized,
                    combination_index,
                    Some(unit.clone()),
                    bytes,
                    None,
                );
                outcome.output_units.push(unit);
            }
            Err(err) => {
                warn!("run {}: {}", prepared.run_id, err);
                events.emit(
                    &mut on_event,
                    RunPhase::CopyFailed,
                    combination_index,
                    None,
                    bytes,
                    Some(err.to_string()),
                );
                match prepared.error_policy {
                    CopyErrorPolicy::Abort => {
                        events.emit(
                            &mut on_event,
                            RunPhase::Failed,
                            combination_index,
                            None,
                            0,
                            Some(err.to_string()),
                        );
                        return Err(err);
                    }
                    CopyErrorPolicy::Skip => outcome.failures.push(copy_failure(&err)),
                }
            }
        }
    }

    outcome.status = RunStatus::Completed;
    outcome.elapsed_ms = elapsed_ms(started);
    info!(
        "run {}: completed, {} combination(s) materialized, {} failure(s), {} copied",
        prepared.run_id,
        outcome.materialized,
        outcome.failures.len(),
        format_size(outcome.bytes_copied as u128)
    );
    events.emit(
        &mut on_event,
        RunPhase::Completed,
        outcome.materialized,
        None,
        0,
        None,
    );
    Ok(outcome)
}

/// Creates a fresh output unit and copies the combination into it.
///
/// A unit whose copy fails is removed again so only fully populated units remain.
fn materialize(
    output_dir: &Path,
    files: &[&Path],
    combination_index: u64,
) -> Result<PathBuf, EngineError> {
    let unit = output_dir.join(Uuid::new_v4().to_string());
    fs::create_dir(&unit).map_err(|source| EngineError::CreateOutputUnit {
        combination_index,
        path: unit.clone(),
        source,
    })?;

    for file in files {
        let destination = unit.join(file.file_name().unwrap_or(file.as_os_str()));
        if let Err(source) = fs::copy(file, &destination) {
            discard_unit(&unit);
            return Err(EngineError::FileCopy {
                combination_index,
                file: file.to_path_buf(),
                destination,
                source,
            });
        }
    }
    Ok(unit)
}

fn discard_unit(unit: &Path) {
    if let Err(err) = fs::remove_dir_all(unit) {
        warn!(
            "failed to remove incomplete output unit {}: {}",
            unit.display(),
            err
        );
    }
}

fn copy_failure(err: &EngineError) -> CopyFailure {
    let (combination_index, file) = match err {
        EngineError::FileCopy {
            combination_index,
            file,
            ..
        } => (*combination_index, file.clone()),
        EngineError::CreateOutputUnit {
            combination_index,
            path,
            ..
        } => (*combination_index, path.clone()),
        _ => (0, PathBuf::new()),
    };
    CopyFailure {
        combination_index,
        file,
        message: err.to_string(),
    }
}

fn elapsed_ms(started: Instant) -> u64 {
    started.elapsed().as_millis().try_into().unwrap_or(u64::MAX)
}

struct EventSequence {
    run_id: String,
    total_combinations: u128,
    seq: u64,
}

impl EventSequence {
    fn emit<F>(
        &mut self,
        on_event: &mut F,
        phase: RunPhase,
        combination_index: u64,
        output_unit: Option<PathBuf>,
        combination_bytes: u64,
        message: Option<String>,
    ) where
        F: FnMut(RunEvent),
    {
        self.seq = self.seq.saturating_add(1);
        on_event(RunEvent {
            seq: self.seq,
            run_id: self.run_id.clone(),
            phase,
            combination_index,
            total_combinations: self.total_combinations,
            output_unit,
            combination_bytes,
            formatted_size: format_size(combination_bytes as u128),
            message,
            timestamp: Utc::now().to_rfc3339_opts(SecondsFormat::Secs, true),
        });
    }
}

/// Owner of the single run slot: at most one run is active per engine.
#[derive(Debug, Clone, Default)]
pub struct Engine {
    active: Arc<AtomicBool>,
}

impl Engine {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_running(&self) -> bool {
        self.active.load(Ordering::Acquire)
    }

    /// Validates the run on the calling thread, then hands enumeration and
    /// copying to a background worker.
    ///
    /// Fails with [`EngineError::RunInProgress`] while another run holds the
    /// slot; input validation errors are returned before any worker starts.
    pub fn start_run<F>(
        &self,
        config: RunConfig,
        token: CancellationToken,
        on_event: F,
    ) -> Result<RunHandle, EngineError>
    where
        F: FnMut(RunEvent) + Send + 'static,
    {
        if self
            .active
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            return Err(EngineError::RunInProgress);
        }
        let slot = SlotGuard {
            active: Arc::clone(&self.active),
        };

        let prepared = prepare_run(&config)?;
        let run_id = prepared.run_id.clone();
        let worker_token = token.clone();
        let worker = thread::spawn(move || {
            let _slot = slot;
            execute_run(prepared, &worker_token, on_event)
        });

        Ok(RunHandle {
            run_id,
            token,
            worker,
        })
    }
}

struct SlotGuard {
    active: Arc<AtomicBool>,
}

impl Drop for SlotGuard {
    fn drop(&mut self) {
        self.active.store(false, Ordering::Release);
    }
}

#[derive(Debug)]
pub struct RunHandle {
    run_id: String,
    token: CancellationToken,
    worker: JoinHandle<Result<RunOutcome, EngineError>>,
}

impl RunHandle {
    pub fn run_id(&self) -> &str {
        &self.run_id
    }

    pub fn token(&self) -> CancellationToken {
        self.token.clone()
    }

    pub fn request_stop(&self) {
        self.token.cancel();
    }

    pub fn is_finished(&self) -> bool {
        self.worker.is_finished()
    }

    pub fn join(self) -> Result<RunOutcome, EngineError> {
        self.worker
            .join()
            .map_err(|_| EngineError::WorkerPanicked)?
    }
}
