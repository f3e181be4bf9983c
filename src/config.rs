//! Container options.
//!
//! Options come from code, from the environment, or (with the `config`
//! feature) from JSON:
//!
//! | variable                         | option               |
//! |----------------------------------|----------------------|
//! | `TESSERA_DI_MAX_DEPTH`           | `max_depth`          |
//! | `TESSERA_DI_WARN_ON_UNDISPOSED`  | `warn_on_undisposed` |

use std::env;
use std::str::FromStr;

#[cfg(feature = "config")]
use serde::{Deserialize, Serialize};

use crate::error::{DiError, DiResult};
use crate::internal::MAX_DEPTH;

const ENV_MAX_DEPTH: &str = "TESSERA_DI_MAX_DEPTH";
const ENV_WARN_ON_UNDISPOSED: &str = "TESSERA_DI_WARN_ON_UNDISPOSED";

/// Tunables of a container.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "config", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "config", serde(default))]
pub struct ContainerOptions {
    /// Longest dependency chain a resolution may walk, nested resolutions
    /// included. Deeper graphs fail with [`DiError::DepthExceeded`].
    pub max_depth: usize,
    /// Log a warning when a scope or provider is dropped while instances
    /// still wait for their release hook.
    pub warn_on_undisposed: bool,
}

impl Default for ContainerOptions {
    fn default() -> Self {
        Self {
            max_depth: MAX_DEPTH,
            warn_on_undisposed: true,
        }
    }
}

impl ContainerOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_max_depth(mut self, max_depth: usize) -> Self {
        self.max_depth = max_depth;
        self
    }

    pub fn with_warn_on_undisposed(mut self, warn: bool) -> Self {
        self.warn_on_undisposed = warn;
        self
    }

    /// Defaults overlaid with whatever `TESSERA_DI_*` variables are set.
    pub fn from_env() -> DiResult<Self> {
        let mut options = Self::default();
        if let Some(depth) = parse_var::<usize>(ENV_MAX_DEPTH)? {
            options.max_depth = depth;
        }
        if let Some(warn) = parse_var::<bool>(ENV_WARN_ON_UNDISPOSED)? {
            options.warn_on_undisposed = warn;
        }
        options.validate()
    }

    /// Options from a JSON object; missing fields keep their defaults.
    #[cfg(feature = "config")]
    pub fn from_json(json: &str) -> DiResult<Self> {
        let options: Self =
            serde_json::from_str(json).map_err(|error| DiError::InvalidOptions(error.to_string()))?;
        options.validate()
    }

    pub fn validate(self) -> DiResult<Self> {
        if self.max_depth == 0 {
            return Err(DiError::InvalidOptions("max_depth must be at least 1".into()));
        }
        Ok(self)
    }
}

fn parse_var<T: FromStr>(name: &str) -> DiResult<Option<T>> {
    match env::var(name) {
        Ok(raw) => raw
            .trim()
            .parse()
            .map(Some)
            .map_err(|_| DiError::InvalidOptions(format!("{name}={raw:?} is not valid"))),
        Err(env::VarError::NotPresent) => Ok(None),
        Err(env::VarError::NotUnicode(_)) => Err(DiError::InvalidOptions(format!("{name} is not unicode"))),
    }
}
