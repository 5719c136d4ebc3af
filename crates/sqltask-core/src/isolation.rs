//! Transaction isolation levels
//!
//! `IsolationLevel` is what callers ask for. `NativeIsolation` is what the
//! engine understands. `IsolationLevel::None` means "run without a
//! transaction" and has no native counterpart; callers must check
//! [`IsolationLevel::requires_transaction`] before mapping.

use serde::{Deserialize, Deserializer, Serialize};

/// Caller-facing isolation level
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize)]
pub enum IsolationLevel {
    /// Leave the session's current level alone
    Unspecified,
    /// Do not open a transaction at all
    None,
    /// The engine's default level
    #[default]
    Default,
    ReadUncommitted,
    ReadCommitted,
    RepeatableRead,
    Serializable,
    Snapshot,
}

impl IsolationLevel {
    /// Whether this level runs inside a transaction
    pub fn requires_transaction(self) -> bool {
        self != IsolationLevel::None
    }

    /// Parse a caller-supplied name.
    ///
    /// Case, underscores, dashes and spaces are ignored, so `ReadCommitted`,
    /// `readCommitted` and `read_committed` are the same level.
    pub fn parse(name: &str) -> Option<Self> {
        let normalized: String = name
            .chars()
            .filter(|c| !matches!(c, '_' | '-' | ' '))
            .flat_map(char::to_lowercase)
            .collect();
        let level = match normalized.as_str() {
            "unspecified" => IsolationLevel::Unspecified,
            "none" => IsolationLevel::None,
            "default" => IsolationLevel::Default,
            "readuncommitted" => IsolationLevel::ReadUncommitted,
            "readcommitted" => IsolationLevel::ReadCommitted,
            "repeatableread" => IsolationLevel::RepeatableRead,
            "serializable" => IsolationLevel::Serializable,
            "snapshot" => IsolationLevel::Snapshot,
            _ => return None,
        };
        Some(level)
    }

    /// Map to the engine-native level.
    ///
    /// `None` is expected to be intercepted before this point; if it gets
    /// here it falls back to read committed like any unrecognized level.
    pub fn to_native(self) -> NativeIsolation {
        match self {
            IsolationLevel::Unspecified => NativeIsolation::Unspecified,
            IsolationLevel::Default => NativeIsolation::ReadCommitted,
            IsolationLevel::ReadUncommitted => NativeIsolation::ReadUncommitted,
            IsolationLevel::ReadCommitted => NativeIsolation::ReadCommitted,
            IsolationLevel::RepeatableRead => NativeIsolation::RepeatableRead,
            IsolationLevel::Serializable => NativeIsolation::Serializable,
            IsolationLevel::Snapshot => NativeIsolation::Snapshot,
            IsolationLevel::None => NativeIsolation::ReadCommitted,
        }
    }
}

impl<'de> Deserialize<'de> for IsolationLevel {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let name = String::deserialize(deserializer)?;
        Ok(IsolationLevel::parse(&name).unwrap_or_else(|| {
            tracing::warn!(level = %name, "unrecognized isolation level, using read committed");
            IsolationLevel::ReadCommitted
        }))
    }
}

impl std::fmt::Display for IsolationLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        std::fmt::Debug::fmt(self, f)
    }
}

/// Engine-native isolation level (SQL Server)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum NativeIsolation {
    /// Keep whatever level the session already has
    Unspecified,
    ReadUncommitted,
    #[default]
    ReadCommitted,
    RepeatableRead,
    Serializable,
    Snapshot,
}

impl NativeIsolation {
    /// The `SET TRANSACTION ISOLATION LEVEL` statement for this level.
    ///
    /// `Unspecified` issues nothing.
    pub fn set_statement(&self) -> Option<&'static str> {
        match self {
            Self::Unspecified => None,
            Self::ReadUncommitted => Some("SET TRANSACTION ISOLATION LEVEL READ UNCOMMITTED"),
            Self::ReadCommitted => Some("SET TRANSACTION ISOLATION LEVEL READ COMMITTED"),
            Self::RepeatableRead => Some("SET TRANSACTION ISOLATION LEVEL REPEATABLE READ"),
            Self::Serializable => Some("SET TRANSACTION ISOLATION LEVEL SERIALIZABLE"),
            Self::Snapshot => Some("SET TRANSACTION ISOLATION LEVEL SNAPSHOT"),
        }
    }
}
