use ulid::Ulid;

use crate::model::*;

use super::store::ActiveSession;
use super::{EngineError, Precondition};

pub fn now_ms() -> Ms {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_millis() as Ms)
        .unwrap_or(0)
}

/// Trim and bound a required free-text field.
pub(crate) fn required_text(
    field: &str,
    value: &str,
    max_len: usize,
    limit: &'static str,
) -> Result<String, EngineError> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Err(EngineError::Validation(format!("{field} must not be empty")));
    }
    if trimmed.len() > max_len {
        return Err(EngineError::LimitExceeded(limit));
    }
    Ok(trimmed.to_string())
}

/// Whether `staff_id` may open a session on `activity`.
///
/// `holder` is the open session currently indexed on the activity, if any. A session held by
/// the same staff member does not block: it is force-closed by the same command.
pub(crate) fn check_startable(
    assignment: &RoomAssignment,
    activity: &ActivityAssignment,
    staff_id: Ulid,
    holder: Option<ActiveSession>,
) -> Result<(), Precondition> {
    if !assignment.is_open() {
        return Err(Precondition::AssignmentClosed {
            assignment_id: assignment.id,
            status: assignment.status,
        });
    }
    if activity.status == ActivityStatus::Completed {
        return Err(Precondition::ActivityCompleted(activity.id));
    }
    if let Some(assigned_to) = activity.assigned_to
        && assigned_to != staff_id
    {
        return Err(Precondition::AssignedToOther {
            activity_id: activity.id,
            assigned_to,
        });
    }
    if let Some(held) = holder
        && held.staff_id != staff_id
    {
        return Err(Precondition::ActivityInUse {
            activity_id: activity.id,
            session_id: held.session_id,
            staff_id: held.staff_id,
        });
    }
    Ok(())
}
