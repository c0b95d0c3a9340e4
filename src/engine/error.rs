use chrono::NaiveDate;
use ulid::Ulid;

use crate::model::AssignmentStatus;

/// A state precondition that blocked a command. Carries enough to name the blocker.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum Precondition {
    #[error("room {room_id} is not ready for occupation: assignment {assignment_id} is {status}")]
    AssignmentIncomplete {
        room_id: Ulid,
        assignment_id: Ulid,
        status: AssignmentStatus,
    },
    #[error("assignment {assignment_id} cannot pass inspection; unchecked required items: {unchecked:?}")]
    RequiredItemsUnchecked {
        assignment_id: Ulid,
        unchecked: Vec<String>,
    },
    #[error("assignment {assignment_id} is not awaiting inspection")]
    InspectionNotPending { assignment_id: Ulid },
    #[error("assignment {assignment_id} is {status}")]
    AssignmentClosed {
        assignment_id: Ulid,
        status: AssignmentStatus,
    },
    #[error("activity {0} is already completed")]
    ActivityCompleted(Ulid),
    #[error("activity {activity_id} is assigned to {assigned_to}")]
    AssignedToOther { activity_id: Ulid, assigned_to: Ulid },
    #[error("activity {activity_id} has an open session {session_id} held by {staff_id}")]
    ActivityInUse {
        activity_id: Ulid,
        session_id: Ulid,
        staff_id: Ulid,
    },
    #[error("session {0} is not in progress")]
    SessionNotActive(Ulid),
}

#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    #[error("not found: {0}")]
    NotFound(Ulid),
    #[error("already exists: {0}")]
    AlreadyExists(Ulid),
    #[error("room number {0:?} is already taken")]
    DuplicateRoomNumber(String),
    #[error("room {room_id} already has assignment {existing} on {date}")]
    DuplicateAssignment {
        room_id: Ulid,
        date: NaiveDate,
        existing: Ulid,
    },
    #[error("cannot delete room {0}: it has assignments")]
    HasAssignments(Ulid),
    #[error("precondition failed: {0}")]
    PreconditionFailed(#[from] Precondition),
    #[error("validation error: {0}")]
    Validation(String),
    /// A decision point rather than a failure: the caller must confirm before the
    /// open session is force-closed.
    #[error("staff {staff_id} already has session {session_id} in progress in room {room_id}")]
    ConflictRequiresConfirmation {
        staff_id: Ulid,
        session_id: Ulid,
        room_id: Ulid,
    },
    #[error("sequence stopped at {failed} after committing {} item(s): {source}", .committed.len())]
    PartialSequenceFailure {
        committed: Vec<Ulid>,
        failed: Ulid,
        source: Box<EngineError>,
    },
    #[error("limit exceeded: {0}")]
    LimitExceeded(&'static str),
    #[error("WAL error: {0}")]
    WalError(String),
}

impl EngineError {
    /// Short label for metrics.
    pub fn kind(&self) -> &'static str {
        match self {
            EngineError::NotFound(_) => "not_found",
            EngineError::AlreadyExists(_) => "already_exists",
            EngineError::DuplicateRoomNumber(_) => "duplicate_room_number",
            EngineError::DuplicateAssignment { .. } => "duplicate_assignment",
            EngineError::HasAssignments(_) => "has_assignments",
            EngineError::PreconditionFailed(_) => "precondition_failed",
            EngineError::Validation(_) => "validation",
            EngineError::ConflictRequiresConfirmation { .. } => "conflict_requires_confirmation",
            EngineError::PartialSequenceFailure { .. } => "partial_sequence_failure",
            EngineError::LimitExceeded(_) => "limit_exceeded",
            EngineError::WalError(_) => "wal_error",
        }
    }
}
