//! # Dispatcher Drivers
//!
//! Explicit table of the dispatcher implementations this crate ships. A driver
//! is selected by name from configuration and constructed through a `match`,
//! so the set of available drivers is known at compile time.

use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use thiserror::Error;

use crate::dispatcher::{EventDispatcher, MemoryEventDispatcher};

/// Driver selection errors.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum DriverError {
    /// No driver is registered under this name.
    #[error("Unknown event dispatcher driver: {0}")]
    Unknown(String),
}

/// Available dispatcher drivers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DispatcherDriver {
    /// In-process dispatcher.
    #[default]
    Memory,
}

impl DispatcherDriver {
    /// Every driver, for diagnostics.
    pub const ALL: [Self; 1] = [Self::Memory];

    /// Configuration name of the driver.
    #[must_use]
    pub fn name(self) -> &'static str {
        match self {
            Self::Memory => "memory",
        }
    }

    /// Construct a dispatcher instance.
    #[must_use]
    pub fn create(self) -> Arc<dyn EventDispatcher> {
        match self {
            Self::Memory => Arc::new(MemoryEventDispatcher::new()),
        }
    }
}

impl FromStr for DispatcherDriver {
    type Err = DriverError;

    fn from_str(name: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|driver| driver.name().eq_ignore_ascii_case(name.trim()))
            .ok_or_else(|| DriverError::Unknown(name.to_string()))
    }
}

impl fmt::Display for DispatcherDriver {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}
