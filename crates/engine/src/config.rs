//! Engine configuration.
//!
//! Defaults suit interactive use. Embedders either deserialize the struct
//! from their own configuration file or call [`EngineConfig::from_env`].

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::resolve::TemplateMode;

/// Selects how parameter binding treats unresolved templates.
pub const TEMPLATE_MODE_ENV: &str = "PATHFLOW_TEMPLATE_MODE";
/// Maximum nested workflow depth.
pub const MAX_NESTING_DEPTH_ENV: &str = "PATHFLOW_MAX_NESTING_DEPTH";
/// Worker bound for parallel batches that do not set `max_concurrency`.
pub const BATCH_CONCURRENCY_ENV: &str = "PATHFLOW_BATCH_CONCURRENCY";

pub const DEFAULT_MAX_NESTING_DEPTH: usize = 10;
pub const DEFAULT_BATCH_CONCURRENCY: usize = 10;

/// Tunables shared by the compiler and every wrapper it builds.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    pub template_mode: TemplateMode,
    pub max_nesting_depth: usize,
    pub default_batch_concurrency: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            template_mode: TemplateMode::default(),
            max_nesting_depth: DEFAULT_MAX_NESTING_DEPTH,
            default_batch_concurrency: DEFAULT_BATCH_CONCURRENCY,
        }
    }
}

impl EngineConfig {
    /// Defaults overridden by `PATHFLOW_*` environment variables.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Defaults overridden by whatever `lookup` returns for each variable name.
    ///
    /// Unparseable values are ignored with a warning.
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::default();

        if let Some(raw) = lookup(TEMPLATE_MODE_ENV) {
            match raw.parse::<TemplateMode>() {
                Ok(mode) => config.template_mode = mode,
                Err(error) => warn!(variable = TEMPLATE_MODE_ENV, %error, "ignoring invalid template mode"),
            }
        }
        if let Some(depth) = parse_positive(&lookup, MAX_NESTING_DEPTH_ENV) {
            config.max_nesting_depth = depth;
        }
        if let Some(workers) = parse_positive(&lookup, BATCH_CONCURRENCY_ENV) {
            config.default_batch_concurrency = workers;
        }

        config
    }
}

fn parse_positive<F>(lookup: &F, variable: &str) -> Option<usize>
where
    F: Fn(&str) -> Option<String>,
{
    let raw = lookup(variable)?;
    match raw.trim().parse::<usize>() {
        Ok(value) if value > 0 => Some(value),
        _ => {
            warn!(variable, value = %raw, "ignoring non-positive integer override");
            None
        }
    }
}
