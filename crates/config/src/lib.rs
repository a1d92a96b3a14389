//! Global environment loading and application-data paths.
//!
//! The global environment is a JSON document at
//! `<data_dir>/sharpclaw/global.json`. It is loaded once per process and
//! cached; sandbox environments, by contrast, are loaded fresh on every
//! shell invocation by the task container.

pub mod global;
pub mod paths;

pub use {
    global::{FreeTextConfig, GlobalEnv, global_env, reset_global_env_for_tests},
    paths::{clear_data_dir, data_dir, set_data_dir},
};
