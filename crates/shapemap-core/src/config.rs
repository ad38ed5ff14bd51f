//! Engine configuration
//!
//! All settings are plain serde data with defaults, so the same structure can
//! be built in code or embedded in a configuration file.

use crate::error::{Error, Result};
use crate::shape::Visibility;
use serde::{Deserialize, Serialize};

/// Configuration of an [`Engine`](crate::Engine) and every mapper it creates
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MapperConfig {
    /// Invocations after which an upgrade is scheduled (trigger fires when exceeded)
    pub start_compile_after_iterations: u64,

    /// Never leave the interpreted tier
    pub disable_compile: bool,

    /// Cap upgrades at the partially specialized tier
    pub disable_full_compile: bool,

    /// Always use the conservative construction strategy
    pub disable_synthetic_construction: bool,

    /// Zero-value substitution for nulls reaching non-nullable fields
    pub null_policy: NullPolicy,

    /// Wrapper unwrap/wrap attempts in conversion resolution
    pub wrappers: WrapperPolicy,

    /// Which declared visibilities are eligible for field access
    pub visibility: VisibilityPolicy,

    /// Background compile pool
    pub scheduler: SchedulerConfig,
}

/// Per-category toggles for null substitution
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct NullPolicy {
    /// Numbers become `0`
    pub numbers: bool,
    /// Booleans become `false`
    pub booleans: bool,
    /// Strings become `""`
    pub strings: bool,
    /// Chars become `'\0'`
    pub chars: bool,
}

/// Which wrapper rules the resolver may try
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct WrapperPolicy {
    /// Unwrap a wrapper source, then convert
    pub unwrap_source: bool,
    /// Convert, then wrap into a wrapper target
    pub wrap_target: bool,
    /// Unwrap, convert and wrap when both sides are wrappers
    pub unwrap_both: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct VisibilityPolicy {
    pub eligible: Vec<Visibility>,
}

/// Compile worker pool settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SchedulerConfig {
    /// Number of worker threads, started on first use
    pub max_workers: usize,
    /// Pending tasks beyond this are rejected
    pub queue_capacity: usize,
    /// Prefix for worker thread names
    pub thread_name: String,
}

impl Default for MapperConfig {
    fn default() -> Self {
        Self {
            start_compile_after_iterations: 1000,
            disable_compile: false,
            disable_full_compile: false,
            disable_synthetic_construction: false,
            null_policy: NullPolicy::default(),
            wrappers: WrapperPolicy::default(),
            visibility: VisibilityPolicy::default(),
            scheduler: SchedulerConfig::default(),
        }
    }
}

impl Default for NullPolicy {
    fn default() -> Self {
        Self {
            numbers: true,
            booleans: true,
            strings: true,
            chars: true,
        }
    }
}

impl NullPolicy {
    /// Substitute nothing; nulls into non-nullable fields are errors
    pub fn strict() -> Self {
        Self {
            numbers: false,
            booleans: false,
            strings: false,
            chars: false,
        }
    }
}

impl Default for WrapperPolicy {
    fn default() -> Self {
        Self {
            unwrap_source: true,
            wrap_target: true,
            unwrap_both: false,
        }
    }
}

impl Default for VisibilityPolicy {
    fn default() -> Self {
        Self {
            eligible: vec![Visibility::Public, Visibility::Internal],
        }
    }
}

impl VisibilityPolicy {
    pub fn allows(&self, visibility: Visibility) -> bool {
        self.eligible.contains(&visibility)
    }
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            max_workers: 2,
            queue_capacity: 999,
            thread_name: "shapemap-compiler".to_string(),
        }
    }
}

impl MapperConfig {
    /// Configuration that compiles on the first call; handy in tests
    pub fn eager() -> Self {
        Self {
            start_compile_after_iterations: 0,
            ..Self::default()
        }
    }

    /// Configuration that never leaves the interpreted tier
    pub fn interpreted_only() -> Self {
        Self {
            disable_compile: true,
            ..Self::default()
        }
    }

    /// Check settings that would make the engine unusable
    pub fn validate(&self) -> Result<()> {
        if self.scheduler.max_workers == 0 {
            return Err(Error::configuration("scheduler.max_workers must be at least 1"));
        }
        if self.scheduler.queue_capacity == 0 {
            return Err(Error::configuration("scheduler.queue_capacity must be at least 1"));
        }
        if self.scheduler.thread_name.trim().is_empty() {
            return Err(Error::configuration("scheduler.thread_name must not be empty"));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = MapperConfig::default();
        assert_eq!(config.start_compile_after_iterations, 1000);
        assert_eq!(config.scheduler.max_workers, 2);
        assert_eq!(config.scheduler.queue_capacity, 999);
        assert!(config.null_policy.strings);
        assert!(config.visibility.allows(Visibility::Public));
        assert!(!config.visibility.allows(Visibility::Private));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_partial_json_uses_defaults() {
        let config: MapperConfig = serde_json::from_str(
            r#"{"disable_full_compile": true, "null_policy": {"strings": false}}"#,
        )
        .unwrap();
        assert!(config.disable_full_compile);
        assert!(!config.null_policy.strings);
        assert!(config.null_policy.numbers);
        assert_eq!(config.start_compile_after_iterations, 1000);
    }

    #[test]
    fn test_validate_rejects_empty_pool() {
        let mut config = MapperConfig::default();
        config.scheduler.max_workers = 0;
        assert!(matches!(config.validate(), Err(Error::Configuration { .. })));
    }
}
