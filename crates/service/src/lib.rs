pub mod service;
pub mod settings;

pub use service::{
    get_run_session, poll_run_events, preview, request_stop, start_run, RunRequest,
    RunSessionSnapshot, StopRunResponse,
};
pub use settings::{load_settings, save_settings, RunSettings, DEFAULT_SETTINGS_FILE};
