//! Process exit codes. Part of the CLI contract; scripts and CI rely on them.

use promptlab_core::{
    ClassifierError, ConfigError, EngineError, PromptError, StoreError, TestSetError,
};

pub const SUCCESS: i32 = 0;
pub const REGRESSION: i32 = 1; // Only with --fail-on-regression
pub const CONFIG_ERROR: i32 = 2; // Bad config, flags or inputs
pub const RUN_FAILED: i32 = 3; // Run ended `failed` or the store broke
pub const NOT_FOUND: i32 = 4; // Unknown run or prompt

/// Exit code for an error returned by a command.
pub fn for_error(err: &anyhow::Error) -> i32 {
    for cause in err.chain() {
        if let Some(e) = cause.downcast_ref::<EngineError>() {
            return for_engine_error(e);
        }
        if cause.downcast_ref::<StoreError>().is_some() {
            return RUN_FAILED;
        }
        if cause.downcast_ref::<ConfigError>().is_some()
            || cause.downcast_ref::<ClassifierError>().is_some()
            || cause.downcast_ref::<TestSetError>().is_some()
            || cause.downcast_ref::<PromptError>().is_some()
        {
            return CONFIG_ERROR;
        }
    }
    CONFIG_ERROR
}

fn for_engine_error(err: &EngineError) -> i32 {
    match err {
        e if e.is_not_found() => NOT_FOUND,
        EngineError::InvalidState { .. }
        | EngineError::PromptMismatch { .. }
        | EngineError::Prompt(_) => CONFIG_ERROR,
        _ => RUN_FAILED,
    }
}
