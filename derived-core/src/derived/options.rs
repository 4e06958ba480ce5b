//! Options and Configuration
//!
//! [`DeriveConfig`] is the serializable part of the setup (flattening
//! behavior and the synchronous-value requirement), so it can come from a
//! config file. [`DeriveOptions`] adds what only code can supply: the
//! initial value and the equality function.

use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::error::ParseBehaviorError;

/// How newly submitted sources interact with ones still in flight.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Behavior {
    /// The newest source replaces any source still pending.
    #[default]
    Switch,

    /// Every source runs to completion; results apply as they settle.
    Merge,

    /// Sources run one after another, in submission order.
    Concat,

    /// New sources are dropped while one is in flight.
    Exhaust,
}

impl Behavior {
    pub const ALL: [Behavior; 4] = [
        Behavior::Switch,
        Behavior::Merge,
        Behavior::Concat,
        Behavior::Exhaust,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Behavior::Switch => "switch",
            Behavior::Merge => "merge",
            Behavior::Concat => "concat",
            Behavior::Exhaust => "exhaust",
        }
    }
}

impl fmt::Display for Behavior {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Behavior {
    type Err = ParseBehaviorError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Behavior::ALL
            .into_iter()
            .find(|behavior| behavior.as_str().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| ParseBehaviorError(s.to_string()))
    }
}

/// Serializable setup for a derived value.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DeriveConfig {
    pub behavior: Behavior,

    /// Require a value to be available as soon as setup returns.
    pub require_sync: bool,
}

/// Equality over settled values, `None` standing for "no value".
pub type ValueEqualFn<T> = Arc<dyn Fn(Option<&T>, Option<&T>) -> bool + Send + Sync>;

/// Everything [`derive_async`](super::derive_async) accepts besides the
/// computation.
pub struct DeriveOptions<T> {
    /// Value exposed until the first settlement. Also satisfies
    /// `require_sync` on its own.
    pub initial_value: Option<T>,
    pub require_sync: bool,
    pub behavior: Behavior,
    /// Decides whether a settlement is equal to the current value.
    ///
    /// There is no `PartialEq` fallback: without one, every settlement
    /// notifies dependents, even when it repeats the current value. Use
    /// [`DeriveOptions::distinct`] to compare by `PartialEq`.
    pub equal: Option<ValueEqualFn<T>>,
}

impl<T> DeriveOptions<T> {
    pub fn new() -> Self {
        Self::from(DeriveConfig::default())
    }

    pub fn initial_value(mut self, value: T) -> Self {
        self.initial_value = Some(value);
        self
    }

    pub fn require_sync(mut self, require_sync: bool) -> Self {
        self.require_sync = require_sync;
        self
    }

    pub fn behavior(mut self, behavior: Behavior) -> Self {
        self.behavior = behavior;
        self
    }

    /// Only settlements this calls unequal notify dependents. Errors are
    /// never considered equal to anything.
    pub fn equal<F>(mut self, equal: F) -> Self
    where
        F: Fn(Option<&T>, Option<&T>) -> bool + Send + Sync + 'static,
    {
        self.equal = Some(Arc::new(equal));
        self
    }

    /// The serializable part of these options.
    pub fn config(&self) -> DeriveConfig {
        DeriveConfig {
            behavior: self.behavior,
            require_sync: self.require_sync,
        }
    }
}

impl<T: PartialEq> DeriveOptions<T> {
    /// Suppress notifications for settlements equal to the current value.
    pub fn distinct(self) -> Self {
        self.equal(|a, b| a == b)
    }
}

impl<T> Default for DeriveOptions<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> From<DeriveConfig> for DeriveOptions<T> {
    fn from(config: DeriveConfig) -> Self {
        Self {
            initial_value: None,
            require_sync: config.require_sync,
            behavior: config.behavior,
            equal: None,
        }
    }
}

impl<T: fmt::Debug> fmt::Debug for DeriveOptions<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DeriveOptions")
            .field("initial_value", &self.initial_value)
            .field("require_sync", &self.require_sync)
            .field("behavior", &self.behavior)
            .field("equal", &self.equal.is_some())
            .finish()
    }
}
