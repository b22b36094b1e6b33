//! Session configuration.
//!
//! Loaded once at session start from a RON file; every field has a default
//! matching the behavior players expect from single player.
//!
//! # Example RON
//!
//! ```ron
//! SessionConfig(
//!     drop_offset: (0, 1, 0),
//!     notification_lifetime_ms: 2500,
//!     flush_on_send: true,
//! )
//! ```

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{Result, SyncError};
use crate::inventory::DEFAULT_NOTIFICATION_LIFETIME_MS;
use crate::math::Vec3Fixed;
use crate::message::PROTOCOL_VERSION;

/// Tunables of a cooperative session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    /// Offset from the structure's position where overflow refunds are
    /// dropped, in whole world units.
    pub drop_offset: (i32, i32, i32),
    /// Display duration of refund notifications.
    pub notification_lifetime_ms: u32,
    /// Protocol version stamped into outgoing frames and required on
    /// incoming ones.
    pub protocol_version: u32,
    /// Flush right after a handler produced its messages. When `false`,
    /// messages wait for [`Session::tick`](crate::session::Session::tick).
    pub flush_on_send: bool,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            drop_offset: (0, 1, 0),
            notification_lifetime_ms: DEFAULT_NOTIFICATION_LIFETIME_MS,
            protocol_version: PROTOCOL_VERSION,
            flush_on_send: true,
        }
    }
}

impl SessionConfig {
    /// Load a config from a RON file.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let contents = std::fs::read_to_string(path).map_err(|e| SyncError::ConfigError {
            path: path.display().to_string(),
            message: e.to_string(),
        })?;
        ron::from_str(&contents).map_err(|e| SyncError::ConfigError {
            path: path.display().to_string(),
            message: e.to_string(),
        })
    }

    /// Parse a config from a RON string.
    pub fn from_ron_str(ron: &str) -> Result<Self> {
        ron::from_str(ron).map_err(|e| SyncError::ConfigError {
            path: "<inline>".to_string(),
            message: e.to_string(),
        })
    }

    /// Drop offset as a fixed-point vector.
    #[must_use]
    pub fn drop_offset(&self) -> Vec3Fixed {
        let (x, y, z) = self.drop_offset;
        Vec3Fixed::from_ints(x, y, z)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = SessionConfig::default();
        assert_eq!(config.drop_offset(), Vec3Fixed::up());
        assert_eq!(config.notification_lifetime_ms, 2500);
        assert_eq!(config.protocol_version, PROTOCOL_VERSION);
        assert!(config.flush_on_send);
    }

    #[test]
    fn test_partial_ron_keeps_defaults() {
        let config = SessionConfig::from_ron_str("(drop_offset: (0, 2, 0))").unwrap();
        assert_eq!(config.drop_offset(), Vec3Fixed::from_ints(0, 2, 0));
        assert_eq!(config.notification_lifetime_ms, DEFAULT_NOTIFICATION_LIFETIME_MS);
    }

    #[test]
    fn test_invalid_ron() {
        let err = SessionConfig::from_ron_str("(drop_offset: nope)").unwrap_err();
        assert!(matches!(err, SyncError::ConfigError { .. }));
    }

    #[test]
    fn test_load_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("session.ron");
        std::fs::write(
            &path,
            "SessionConfig(notification_lifetime_ms: 1000, flush_on_send: false)",
        )
        .unwrap();

        let config = SessionConfig::load(&path).unwrap();
        assert_eq!(config.notification_lifetime_ms, 1000);
        assert!(!config.flush_on_send);
    }

    #[test]
    fn test_load_missing_file() {
        let err = SessionConfig::load("/definitely/not/here.ron").unwrap_err();
        match err {
            SyncError::ConfigError { path, .. } => assert!(path.ends_with("here.ron")),
            other => panic!("unexpected {other:?}"),
        }
    }
}
