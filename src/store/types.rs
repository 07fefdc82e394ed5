//! Record, namespace and per-call option types.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::time::Duration;

use crate::constants::{DEFAULT_DATABASE, DEFAULT_TABLE};

/// The unit of storage.
///
/// `expiry` is a time-to-live relative to the write. Zero means the record
/// never expires. Records returned by a read carry the time remaining until
/// their deadline instead, so writing a read record elsewhere keeps the same
/// deadline.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Record {
    pub key: String,
    pub value: Vec<u8>,
    #[serde(default)]
    pub expiry: Duration,
    #[serde(default)]
    pub metadata: BTreeMap<String, serde_json::Value>,
}

impl Record {
    /// Creates a record that never expires.
    pub fn new(key: impl Into<String>, value: impl Into<Vec<u8>>) -> Self {
        Self {
            key: key.into(),
            value: value.into(),
            ..Self::default()
        }
    }

    /// Sets the time-to-live.
    #[must_use]
    pub fn with_expiry(mut self, expiry: Duration) -> Self {
        self.expiry = expiry;
        self
    }

    /// Adds one metadata entry.
    #[must_use]
    pub fn with_metadata(
        mut self,
        key: impl Into<String>,
        value: impl Into<serde_json::Value>,
    ) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }
}

/// A (database, table) pair scoping every key.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Namespace {
    pub database: String,
    pub table: String,
}

impl Namespace {
    pub fn new(database: impl Into<String>, table: impl Into<String>) -> Self {
        Self {
            database: database.into(),
            table: table.into(),
        }
    }
}

impl fmt::Display for Namespace {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.database, self.table)
    }
}

/// Namespace a store is bound to.
///
/// Passed whole to [`Store::initialize`](super::Store::initialize), which
/// replaces the bound namespace entirely; unset fields keep their defaults
/// rather than the previously bound values.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Options {
    pub database: String,
    pub table: String,
}

impl Default for Options {
    fn default() -> Self {
        Self {
            database: DEFAULT_DATABASE.to_string(),
            table: DEFAULT_TABLE.to_string(),
        }
    }
}

impl Options {
    #[must_use]
    pub fn database(mut self, database: impl Into<String>) -> Self {
        self.database = database.into();
        self
    }

    #[must_use]
    pub fn table(mut self, table: impl Into<String>) -> Self {
        self.table = table.into();
        self
    }

    /// The bound namespace.
    pub fn namespace(&self) -> Namespace {
        Namespace::new(&self.database, &self.table)
    }

    /// Namespace for a single call, each override falling back to the bound value.
    pub fn resolve(&self, database: Option<&str>, table: Option<&str>) -> Namespace {
        Namespace::new(
            database.unwrap_or(&self.database),
            table.unwrap_or(&self.table),
        )
    }
}

/// Generates the per-call namespace override builders shared by every
/// option struct.
macro_rules! namespace_overrides {
    ($ty:ty) => {
        impl $ty {
            /// Targets `database` for this call only.
            #[must_use]
            pub fn database(mut self, database: impl Into<String>) -> Self {
                self.database = Some(database.into());
                self
            }

            /// Targets `table` for this call only.
            #[must_use]
            pub fn table(mut self, table: impl Into<String>) -> Self {
                self.table = Some(table.into());
                self
            }

            /// Namespace this call applies to given the bound options.
            pub fn target(&self, bound: &Options) -> Namespace {
                bound.resolve(self.database.as_deref(), self.table.as_deref())
            }
        }
    };
}

/// Modifiers for [`Store::read`](super::Store::read).
///
/// With `prefix` and/or `suffix` set, the key passed to `read` is matched
/// against the start and/or end of each candidate key and an empty result is
/// not an error. `limit == 0` means unbounded.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReadOptions {
    pub prefix: bool,
    pub suffix: bool,
    pub limit: usize,
    pub offset: usize,
    pub database: Option<String>,
    pub table: Option<String>,
}

impl ReadOptions {
    #[must_use]
    pub fn prefix(mut self) -> Self {
        self.prefix = true;
        self
    }

    #[must_use]
    pub fn suffix(mut self) -> Self {
        self.suffix = true;
        self
    }

    #[must_use]
    pub fn limit(mut self, limit: usize) -> Self {
        self.limit = limit;
        self
    }

    #[must_use]
    pub fn offset(mut self, offset: usize) -> Self {
        self.offset = offset;
        self
    }

    /// True when the read is an exact-key lookup.
    pub fn is_exact(&self) -> bool {
        !self.prefix && !self.suffix
    }
}

namespace_overrides!(ReadOptions);

/// Modifiers for [`Store::write`](super::Store::write).
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct WriteOptions {
    /// Overrides the record's own expiry for this write.
    pub ttl: Option<Duration>,
    pub database: Option<String>,
    pub table: Option<String>,
}

impl WriteOptions {
    #[must_use]
    pub fn ttl(mut self, ttl: Duration) -> Self {
        self.ttl = Some(ttl);
        self
    }

    /// Expiry that applies to `record` under these options.
    pub fn effective_expiry(&self, record: &Record) -> Duration {
        self.ttl.unwrap_or(record.expiry)
    }
}

namespace_overrides!(WriteOptions);

/// Modifiers for [`Store::delete`](super::Store::delete).
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DeleteOptions {
    pub database: Option<String>,
    pub table: Option<String>,
}

namespace_overrides!(DeleteOptions);

/// Modifiers for [`Store::list`](super::Store::list).
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ListOptions {
    pub prefix: Option<String>,
    pub suffix: Option<String>,
    pub limit: usize,
    pub offset: usize,
    pub database: Option<String>,
    pub table: Option<String>,
}

impl ListOptions {
    #[must_use]
    pub fn prefix(mut self, prefix: impl Into<String>) -> Self {
        self.prefix = Some(prefix.into());
        self
    }

    #[must_use]
    pub fn suffix(mut self, suffix: impl Into<String>) -> Self {
        self.suffix = Some(suffix.into());
        self
    }

    #[must_use]
    pub fn limit(mut self, limit: usize) -> Self {
        self.limit = limit;
        self
    }

    #[must_use]
    pub fn offset(mut self, offset: usize) -> Self {
        self.offset = offset;
        self
    }
}

namespace_overrides!(ListOptions);
