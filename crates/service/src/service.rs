use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use std::thread;

use anyhow::{anyhow, bail, Result};
use combination_generator_core::{
    estimate, list_input_files, CancellationToken, CopyErrorPolicy, CopyFailure, Engine,
    EngineError, RunConfig, RunEvent, RunOutcome, RunPhase, RunStatus, SizeEstimate,
};
use once_cell::sync::Lazy;
use serde::{Deserialize, Serialize};
use tracing::warn;
use uuid::Uuid;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunRequest {
    #[serde(default)]
    pub run_id: Option<String>,
    pub input_dir: PathBuf,
    pub output_dir: PathBuf,
    #[serde(default = "default_files_per_combination")]
    pub files_per_combination: usize,
    #[serde(default)]
    pub error_policy: CopyErrorPolicy,
    #[serde(default)]
    pub seed: Option<u64>,
}

fn default_files_per_combination() -> usize {
    2
}

impl Default for RunRequest {
    fn default() -> Self {
        Self {
            run_id: None,
            input_dir: PathBuf::new(),
            output_dir: PathBuf::new(),
            files_per_combination: default_files_per_combination(),
            error_policy: CopyErrorPolicy::Abort,
            seed: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunSessionSnapshot {
    pub run_id: String,
    pub status: RunStatus,
    pub output_dir: PathBuf,
    pub stop_requested: bool,
    pub materialized: u64,
    pub total_combinations: u128,
    pub failures: Vec<CopyFailure>,
    pub error: Option<String>,
    pub total_events: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StopRunResponse {
    pub run_id: String,
    pub status: RunStatus,
    pub stop_requested: bool,
}

#[derive(Debug, Clone)]
struct RunSession {
    status: RunStatus,
    output_dir: PathBuf,
    materialized: u64,
    total_combinations: u128,
    outcome: Option<RunOutcome>,
    error: Option<String>,
    events: Vec<RunEvent>,
    token: CancellationToken,
}

static ENGINE: Lazy<Engine> = Lazy::new(Engine::new);

static SESSIONS: Lazy<Mutex<HashMap<String, RunSession>>> =
    Lazy::new(|| Mutex::new(HashMap::new()));

/// Starts a run on the process-wide engine and returns its id.
///
/// Start failures (`RunInProgress`, `InsufficientFiles`, bad paths) are
/// returned as [`combination_generator_core::EngineError`] inside the
/// `anyhow::Error` and leave no session behind.
pub fn start_run(request: RunRequest) -> Result<String> {
    let run_id = request
        .run_id
        .clone()
        .unwrap_or_else(|| Uuid::new_v4().to_string());
    let token = CancellationToken::new();

    {
        let mut sessions = lock_sessions()?;
        if sessions.contains_key(&run_id) {
            bail!("run session already exists: {run_id}");
        }
        sessions.insert(
            run_id.clone(),
            RunSession {
                status: RunStatus::Running,
                output_dir: request.output_dir.clone(),
                materialized: 0,
                total_combinations: 0,
                outcome: None,
                error: None,
                events: Vec::new(),
                token: token.clone(),
            },
        );
    }

    let config = RunConfig {
        run_id: Some(run_id.clone()),
        input_dir: request.input_dir,
        output_dir: request.output_dir,
        subset_size: request.files_per_combination,
        error_policy: request.error_policy,
        seed: request.seed,
    };

    let event_run_id = run_id.clone();
    let started = ENGINE.start_run(config, token, move |event| {
        if let Ok(mut sessions) = lock_sessions() {
            if let Some(session) = sessions.get_mut(&event_run_id) {
                session.total_combinations = event.total_combinations;
                if event.phase == RunPhase::Materialized {
                    session.materialized += 1;
                }
                session.events.push(event);
            }
        }
    });

    let handle = match started {
        Ok(handle) => handle,
        Err(err) => {
            if let Ok(mut sessions) = lock_sessions() {
                sessions.remove(&run_id);
            }
            return Err(err.into());
        }
    };

    let thread_run_id = run_id.clone();
    thread::spawn(move || {
        let result = handle.join();
        let Ok(mut sessions) = lock_sessions() else {
            warn!("run {thread_run_id}: session registry unavailable for final status");
            return;
        };
        if let Some(session) = sessions.get_mut(&thread_run_id) {
            match result {
                Ok(outcome) => {
                    session.status = outcome.status;
                    session.materialized = outcome.materialized;
                    session.error = None;
                    session.outcome = Some(outcome);
                }
                Err(err) => {
                    session.status = RunStatus::Failed;
                    session.error = Some(err.to_string());
                }
            }
        }
    });

    Ok(run_id)
}

pub fn poll_run_events(run_id: &str, from_seq: u64) -> Result<Vec<RunEvent>> {
    let sessions = lock_sessions()?;
    let session = sessions
        .get(run_id)
        .ok_or_else(|| anyhow!("run session not found: {run_id}"))?;

    Ok(session
        .events
        .iter()
        .filter(|event| event.seq > from_seq)
        .cloned()
        .collect())
}

/// Asks a running run to stop before its next combination.
///
/// The status stays `Running` until the worker observes the request.
pub fn request_stop(run_id: &str) -> Result<StopRunResponse> {
    let sessions = lock_sessions()?;
    let session = sessions
        .get(run_id)
        .ok_or_else(|| anyhow!("run session not found: {run_id}"))?;

    if session.status == RunStatus::Running {
        session.token.cancel();
    }

    Ok(StopRunResponse {
        run_id: run_id.to_string(),
        status: session.status,
        stop_requested: session.token.is_cancelled(),
    })
}

pub fn get_run_session(run_id: &str) -> Result<RunSessionSnapshot> {
    let sessions = lock_sessions()?;
    let session = sessions
        .get(run_id)
        .ok_or_else(|| anyhow!("run session not found: {run_id}"))?;

    Ok(RunSessionSnapshot {
        run_id: run_id.to_string(),
        status: session.status,
        output_dir: session.output_dir.clone(),
        stop_requested: session.token.is_cancelled(),
        materialized: session.materialized,
        total_combinations: session.total_combinations,
        failures: session
            .outcome
            .as_ref()
            .map(|outcome| outcome.failures.clone())
            .unwrap_or_default(),
        error: session.error.clone(),
        total_events: session.events.len() as u64,
    })
}

/// Combination count and output size a run over `input_dir` would produce.
pub fn preview(input_dir: impl AsRef<Path>, files_per_combination: usize) -> Result<SizeEstimate> {
    if files_per_combination == 0 {
        return Err(EngineError::InvalidSubsetSize.into());
    }
    let files = list_input_files(input_dir.as_ref())?;
    Ok(estimate(&files, files_per_combination))
}

fn lock_sessions() -> Result<std::sync::MutexGuard<'static, HashMap<String, RunSession>>> {
    SESSIONS
        .lock()
        .map_err(|_| anyhow!("run session registry lock poisoned"))
}
