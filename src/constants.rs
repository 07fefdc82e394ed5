//! Default values shared by every store backend.
//!
//! Defaults are passed explicitly into [`Options`](crate::store::Options) and
//! [`StoreConfig`](crate::config::StoreConfig); nothing here is mutable.

use std::time::Duration;

/// Database used when none is configured.
pub const DEFAULT_DATABASE: &str = "micro";

/// Table used when none is configured.
pub const DEFAULT_TABLE: &str = "micro";

/// Environment variable that overrides the file backend's base directory.
pub const DIR_ENV_VAR: &str = "STOWAGE_DIR";

/// Directory components appended to the system temp dir for the file backend.
pub const DEFAULT_DIR_COMPONENTS: [&str; 2] = ["micro", "store"];

/// File extension of per-namespace redb databases.
pub const DB_FILE_EXTENSION: &str = "redb";

/// Sweep interval suggested when a config enables the sweeper without a value.
pub const DEFAULT_SWEEP_INTERVAL: Duration = Duration::from_secs(300);

/// Sweep intervals below this are accepted but flagged by config validation.
pub const MIN_RECOMMENDED_SWEEP_INTERVAL: Duration = Duration::from_secs(1);
