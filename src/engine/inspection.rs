use std::collections::HashSet;

use serde::{Deserialize, Serialize};
use ulid::Ulid;

use crate::limits::*;
use crate::model::*;
use crate::observability;

use super::assignments::settle_event;
use super::{instrumented, Engine, EngineError, Precondition};

/// What an inspector submits for an assignment awaiting inspection.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InspectionSubmission {
    pub inspector_id: Ulid,
    pub result: InspectionResult,
    pub checklist: Vec<ChecklistItem>,
    pub notes: Option<String>,
}

/// Blank checklist for an assignment: one item per activity, required when mandatory.
pub(super) fn template_for(assignment: &RoomAssignment) -> Vec<ChecklistItem> {
    assignment
        .activities
        .iter()
        .map(|a| ChecklistItem {
            label: a.activity_name.clone(),
            required: a.is_mandatory,
            checked: false,
        })
        .collect()
}

/// Validate a submission against the assignment and build the record to store.
///
/// Items the template marks required stay required whatever the submission says.
pub(super) fn review(
    assignment: &RoomAssignment,
    submission: InspectionSubmission,
    at: Ms,
) -> Result<InspectionRecord, EngineError> {
    if assignment.status != AssignmentStatus::Completed
        || assignment.inspection.state != InspectionState::Pending
    {
        return Err(Precondition::InspectionNotPending {
            assignment_id: assignment.id,
        }
        .into());
    }
    if submission.checklist.len() > MAX_CHECKLIST_ITEMS {
        return Err(EngineError::LimitExceeded("too many checklist items"));
    }
    if submission
        .checklist
        .iter()
        .any(|i| i.label.len() > MAX_CHECKLIST_LABEL_LEN)
    {
        return Err(EngineError::LimitExceeded("checklist label too long"));
    }

    let required: HashSet<String> = template_for(assignment)
        .into_iter()
        .filter(|i| i.required)
        .map(|i| i.label)
        .collect();
    let submitted: HashSet<&str> = submission.checklist.iter().map(|i| i.label.as_str()).collect();
    let mut missing: Vec<&str> = required
        .iter()
        .map(String::as_str)
        .filter(|label| !submitted.contains(label))
        .collect();
    if !missing.is_empty() {
        missing.sort_unstable();
        return Err(EngineError::Validation(format!(
            "checklist is missing required item(s): {}",
            missing.join(", ")
        )));
    }

    let checklist: Vec<ChecklistItem> = submission
        .checklist
        .into_iter()
        .map(|mut item| {
            item.required |= required.contains(&item.label);
            item
        })
        .collect();

    let notes = match submission.notes.as_deref().map(str::trim) {
        Some(n) if n.len() > MAX_NOTES_LEN => {
            return Err(EngineError::LimitExceeded("inspection notes too long"));
        }
        Some(n) if !n.is_empty() => Some(n.to_string()),
        _ => None,
    };

    match submission.result {
        InspectionResult::Passed => {
            let unchecked: Vec<String> = checklist
                .iter()
                .filter(|i| i.required && !i.checked)
                .map(|i| i.label.clone())
                .collect();
            if !unchecked.is_empty() {
                return Err(Precondition::RequiredItemsUnchecked {
                    assignment_id: assignment.id,
                    unchecked,
                }
                .into());
            }
        }
        InspectionResult::Failed => {
            if notes.is_none() {
                return Err(EngineError::Validation(
                    "a failed inspection needs notes".into(),
                ));
            }
        }
    }

    Ok(InspectionRecord {
        inspector_id: submission.inspector_id,
        result: submission.result,
        checklist,
        notes,
        inspected_at: at,
    })
}

impl Engine {
    pub async fn checklist_template(&self, assignment_id: Ulid) -> Result<Vec<ChecklistItem>, EngineError> {
        let rs = self.room_handle_for(&assignment_id)?;
        let guard = rs.read().await;
        let assignment = guard
            .assignment(&assignment_id)
            .ok_or(EngineError::NotFound(assignment_id))?;
        Ok(template_for(assignment))
    }

    /// Record the outcome of inspecting a completed assignment.
    ///
    /// Passing releases the room (through the ready-for-occupation gate). Failing reopens
    /// every activity for rework and keeps the room in cleaning.
    pub async fn record_inspection(
        &self,
        assignment_id: Ulid,
        submission: InspectionSubmission,
    ) -> Result<InspectionRecord, EngineError> {
        instrumented("record_inspection", async {
            let _gate = self.begin().await;
            let rs = self.room_handle_for(&assignment_id)?;
            let mut guard = rs.write().await;
            let assignment = guard
                .assignment(&assignment_id)
                .ok_or(EngineError::NotFound(assignment_id))?;
            let record = review(assignment, submission, self.now())?;
            let room_id = assignment.room_id;

            let mut events = vec![Event::InspectionRecorded {
                assignment_id,
                room_id,
                record: record.clone(),
            }];
            if let Some(status_change) = settle_event(&guard, &events) {
                events.push(status_change);
            }
            self.commit(Some(&mut *guard), None, events).await?;

            metrics::counter!(observability::INSPECTIONS_TOTAL, "result" => record.result.as_str())
                .increment(1);
            tracing::info!(
                "assignment {assignment_id} in room {} inspected: {}",
                guard.room.room_number,
                record.result.as_str()
            );
            Ok(record)
        })
        .await
    }
}
