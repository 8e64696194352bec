//! # Allocator Configuration
//!
//! Loaded once at startup, either built in code or read from TOML:
//!
//! ```toml
//! name = "gl-handles"
//! arena_size_bytes = 4194304
//! disable_use_after_free_check = false
//! disable_heap_handle_tags = false
//! ```

use std::path::Path;

use serde::Deserialize;

use crate::error::{HandleError, HandleResult};
use crate::memory::MAX_ARENA_BYTES;

/// Default arena size: 4 MiB.
pub const DEFAULT_ARENA_SIZE: usize = 4 * 1024 * 1024;

/// Construction-time settings of a handle allocator.
#[derive(Clone, Debug, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct HandleAllocatorConfig {
    /// Label used in diagnostics.
    pub name: String,
    /// Size of the pooled arena in bytes.
    pub arena_size_bytes: usize,
    /// Skip age checks on pool handles (stale handles become undefined
    /// behavior in the caller).
    pub disable_use_after_free_check: bool,
    /// Do not record tags for heap handles.
    pub disable_heap_handle_tags: bool,
}

impl Default for HandleAllocatorConfig {
    fn default() -> Self {
        Self {
            name: "handles".to_owned(),
            arena_size_bytes: DEFAULT_ARENA_SIZE,
            disable_use_after_free_check: false,
            disable_heap_handle_tags: false,
        }
    }
}

impl HandleAllocatorConfig {
    /// Default settings with a name and arena size.
    #[must_use]
    pub fn new(name: impl Into<String>, arena_size_bytes: usize) -> Self {
        Self {
            name: name.into(),
            arena_size_bytes,
            ..Self::default()
        }
    }

    /// Sets whether age checks are skipped.
    #[must_use]
    pub fn with_use_after_free_check_disabled(mut self, disabled: bool) -> Self {
        self.disable_use_after_free_check = disabled;
        self
    }

    /// Sets whether heap handle tags are dropped.
    #[must_use]
    pub fn with_heap_handle_tags_disabled(mut self, disabled: bool) -> Self {
        self.disable_heap_handle_tags = disabled;
        self
    }

    /// Parses a configuration from TOML text. Missing keys keep defaults.
    ///
    /// # Errors
    ///
    /// Returns [`HandleError::InvalidConfig`] on malformed TOML or unknown
    /// keys, and any error from [`validate`](Self::validate).
    pub fn from_toml_str(text: &str) -> HandleResult<Self> {
        let config: Self =
            toml::from_str(text).map_err(|e| HandleError::InvalidConfig(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Reads a configuration from a TOML file.
    ///
    /// # Errors
    ///
    /// Returns [`HandleError::InvalidConfig`] if the file cannot be read or
    /// parsed.
    pub fn from_toml_file(path: impl AsRef<Path>) -> HandleResult<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path)
            .map_err(|e| HandleError::InvalidConfig(format!("{}: {e}", path.display())))?;
        Self::from_toml_str(&text)
    }

    /// Checks the settings.
    ///
    /// # Errors
    ///
    /// Returns [`HandleError::ArenaTooLarge`] if pool handle indices cannot
    /// address the arena, [`HandleError::InvalidConfig`] for an empty name.
    pub fn validate(&self) -> HandleResult<()> {
        if self.name.is_empty() {
            return Err(HandleError::InvalidConfig("allocator name is empty".to_owned()));
        }
        if self.arena_size_bytes > MAX_ARENA_BYTES {
            return Err(HandleError::ArenaTooLarge {
                requested: self.arena_size_bytes,
                max: MAX_ARENA_BYTES,
            });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = HandleAllocatorConfig::default();
        assert_eq!(config.arena_size_bytes, DEFAULT_ARENA_SIZE);
        assert!(!config.disable_use_after_free_check);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_from_toml_partial() {
        let config = HandleAllocatorConfig::from_toml_str(
            "name = \"vk\"\narena_size_bytes = 1048576\ndisable_heap_handle_tags = true\n",
        )
        .unwrap();
        assert_eq!(config.name, "vk");
        assert_eq!(config.arena_size_bytes, 1 << 20);
        assert!(config.disable_heap_handle_tags);
        assert!(!config.disable_use_after_free_check);
    }

    #[test]
    fn test_from_toml_rejects_unknown_keys() {
        let err = HandleAllocatorConfig::from_toml_str("arena_mb = 4").unwrap_err();
        assert!(matches!(err, HandleError::InvalidConfig(_)));
    }

    #[test]
    fn test_arena_too_large() {
        let config = HandleAllocatorConfig::new("big", MAX_ARENA_BYTES + 1);
        assert!(matches!(
            config.validate(),
            Err(HandleError::ArenaTooLarge { .. })
        ));
    }

    #[test]
    fn test_builder_flags() {
        let config = HandleAllocatorConfig::new("gl", 4096)
            .with_use_after_free_check_disabled(true)
            .with_heap_handle_tags_disabled(true);
        assert!(config.disable_use_after_free_check);
        assert!(config.disable_heap_handle_tags);
    }

    #[test]
    fn test_missing_file() {
        let err = HandleAllocatorConfig::from_toml_file("/nonexistent/handles.toml").unwrap_err();
        assert!(matches!(err, HandleError::InvalidConfig(_)));
    }
}
