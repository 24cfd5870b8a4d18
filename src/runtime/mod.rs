//! Runtime abstraction for process-level inputs.
//!
//! Configuration is read through this trait rather than straight from
//! `std::env`, so tests can inject values without touching the real
//! process environment.

mod env;

use std::env as std_env;

#[cfg_attr(test, mockall::automock)]
pub trait Runtime: Send + Sync {
    // Environment
    fn env_var(&self, key: &str) -> Result<String, std_env::VarError>;
}

pub struct RealRuntime;

impl Runtime for RealRuntime {
    fn env_var(&self, key: &str) -> Result<String, std_env::VarError> {
        self.env_var_impl(key)
    }
}
