//! Report lifecycle status.
//!
//! The discriminants match the seed order (1-based) of the
//! `report_statuses` lookup table, so `ReportStatus::id()` can be bound
//! directly into SMALLINT columns.

use serde::{Deserialize, Serialize};

/// Status ID type matching SMALLINT/SMALLSERIAL in the database.
pub type StatusId = i16;

pub const STATUS_PENDING: &str = "Pending";
pub const STATUS_GENERATING: &str = "Generating";
pub const STATUS_COMPLETED: &str = "Completed";
pub const STATUS_FAILED: &str = "Failed";

/// Progress reported while a report waits in the queue.
pub const PROGRESS_PENDING: u8 = 0;
/// Progress reported for the whole of a generation run.
pub const PROGRESS_GENERATING: u8 = 50;
/// Progress reported once a report completed.
pub const PROGRESS_COMPLETED: u8 = 100;

/// Report lifecycle status.
///
/// Transitions are one-directional: `Pending -> Generating -> {Completed |
/// Failed}`. The only way back is an explicit reset to `Pending`
/// (regeneration) from a terminal state.
#[repr(i16)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ReportStatus {
    Pending = 1,
    Generating = 2,
    Completed = 3,
    Failed = 4,
}

impl ReportStatus {
    /// Return the database status ID.
    pub fn id(self) -> StatusId {
        self as StatusId
    }

    /// Resolve a database status ID. Unknown IDs yield `None`.
    pub fn from_id(id: StatusId) -> Option<Self> {
        match id {
            1 => Some(Self::Pending),
            2 => Some(Self::Generating),
            3 => Some(Self::Completed),
            4 => Some(Self::Failed),
            _ => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Pending => STATUS_PENDING,
            Self::Generating => STATUS_GENERATING,
            Self::Completed => STATUS_COMPLETED,
            Self::Failed => STATUS_FAILED,
        }
    }

    /// Coarse progress percentage for status queries.
    ///
    /// There is no finer granularity than the status itself; a failed
    /// report reports zero.
    pub fn progress(self) -> u8 {
        match self {
            Self::Pending => PROGRESS_PENDING,
            Self::Generating => PROGRESS_GENERATING,
            Self::Completed => PROGRESS_COMPLETED,
            Self::Failed => PROGRESS_PENDING,
        }
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Failed)
    }

    /// Whether the lifecycle allows moving from `self` to `next`.
    ///
    /// `Completed`/`Failed -> Pending` is the regeneration reset.
    pub fn can_transition_to(self, next: ReportStatus) -> bool {
        matches!(
            (self, next),
            (Self::Pending, Self::Generating)
                | (Self::Generating, Self::Completed)
                | (Self::Generating, Self::Failed)
                | (Self::Completed, Self::Pending)
                | (Self::Failed, Self::Pending)
        )
    }
}

impl std::fmt::Display for ReportStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl From<ReportStatus> for StatusId {
    fn from(value: ReportStatus) -> Self {
        value as StatusId
    }
}
