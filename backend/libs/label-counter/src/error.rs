//! Error types for the label counter library

use std::fmt;
use std::time::Duration;
use thiserror::Error;

/// Result type for label store and counter operations
pub type LabelResult<T> = Result<T, LabelError>;

/// PostgreSQL unique violation
const PG_UNIQUE_VIOLATION: &str = "23505";

/// Store call being performed, used for timeouts and fault reporting
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StoreOp {
    Find,
    Insert,
    Update,
    Increment,
    List,
}

impl fmt::Display for StoreOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            StoreOp::Find => "find",
            StoreOp::Insert => "insert",
            StoreOp::Update => "update",
            StoreOp::Increment => "increment",
            StoreOp::List => "list",
        };
        f.write_str(name)
    }
}

/// Errors that can occur while counting label uses
#[derive(Error, Debug)]
pub enum LabelError {
    /// Database operation failed (connection, query execution, etc.)
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// Store could not be reached or rejected the call
    #[error("Label store unavailable: {0}")]
    Unavailable(String),

    /// Insert hit an existing row with the same name
    #[error("Label already exists: {0}")]
    DuplicateKey(String),

    /// Store call exceeded the configured timeout; outcome unknown
    #[error("Label store {op} timed out after {after:?}")]
    Timeout { op: StoreOp, after: Duration },

    /// Concurrent writers kept invalidating our read
    #[error("Gave up on label {name:?} after {attempts} conflicting attempts")]
    Contention { name: String, attempts: u32 },

    /// Store lacks the requested primitive
    #[error("Label store does not support {0}")]
    Unsupported(&'static str),

    /// Generic error with context
    #[error("{0}")]
    Other(#[from] anyhow::Error),
}

impl LabelError {
    /// Map a sqlx error, turning unique violations into `DuplicateKey`
    pub fn from_sqlx(err: sqlx::Error, name: &str) -> Self {
        if is_unique_violation(&err) {
            LabelError::DuplicateKey(name.to_string())
        } else {
            LabelError::Database(err)
        }
    }

    /// Someone else created the label first; retry as an update
    pub fn is_duplicate_key(&self) -> bool {
        match self {
            LabelError::DuplicateKey(_) => true,
            LabelError::Database(err) => is_unique_violation(err),
            _ => false,
        }
    }

    /// Connectivity-type failure the caller may retry later
    pub fn is_transient(&self) -> bool {
        match self {
            LabelError::Unavailable(_) | LabelError::Timeout { .. } => true,
            LabelError::Database(err) => matches!(
                err,
                sqlx::Error::PoolTimedOut | sqlx::Error::PoolClosed | sqlx::Error::Io(_)
            ),
            _ => false,
        }
    }

    /// The call may have been applied even though it reported failure
    pub fn outcome_unknown(&self) -> bool {
        matches!(self, LabelError::Timeout { .. })
    }
}

fn is_unique_violation(err: &sqlx::Error) -> bool {
    err.as_database_error()
        .and_then(|db_err| db_err.code())
        .map(|code| code == PG_UNIQUE_VIOLATION)
        .unwrap_or(false)
}

/// One label whose uses could not be recorded
#[derive(Debug)]
pub struct LabelFailure {
    /// Trimmed label name
    pub name: String,

    /// Number of uses that were not applied
    pub uses: i64,

    /// Cause reported by the store or counter
    pub error: LabelError,
}

/// Partial failure of a batch of label uses
#[derive(Error, Debug)]
#[error("failed to record {} of {} labels: {}", .failures.len(), .attempted, failed_list(.failures))]
pub struct RecordUsesError {
    /// Number of distinct labels in the batch
    pub attempted: usize,

    /// Labels that were not recorded; everything else was
    pub failures: Vec<LabelFailure>,
}

impl RecordUsesError {
    pub fn failed_names(&self) -> Vec<&str> {
        self.failures.iter().map(|f| f.name.as_str()).collect()
    }

    /// Label list that replays exactly the missing uses
    pub fn retry_input(&self) -> Vec<String> {
        self.failures
            .iter()
            .flat_map(|f| std::iter::repeat(f.name.clone()).take(f.uses.max(0) as usize))
            .collect()
    }
}

fn failed_list(failures: &[LabelFailure]) -> String {
    failures
        .iter()
        .map(|f| format!("{} ({})", f.name, f.error))
        .collect::<Vec<_>>()
        .join(", ")
}
