pub mod combinations;
pub mod engine;
pub mod error;
pub mod estimate;
pub mod inventory;
pub mod model;

pub use combinations::{binomial, combination_count, CombinationIndices};
pub use engine::{
    execute_run, prepare_run, run_combinations, CancellationToken, Engine, PreparedRun,
    RunConfig, RunHandle,
};
pub use error::EngineError;
pub use estimate::{combination_bytes, estimate, file_size_or_zero, format_size, SizeEstimate};
pub use inventory::list_input_files;
pub use model::{CopyErrorPolicy, CopyFailure, RunEvent, RunOutcome, RunPhase, RunStatus};
