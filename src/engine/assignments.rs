use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use ulid::Ulid;

use crate::limits::*;
use crate::model::*;

use super::conflict::required_text;
use super::store::apply_room_event;
use super::{instrumented, settle, Engine, EngineError, Precondition};

/// A request to schedule one assignment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewAssignment {
    pub id: Ulid,
    pub room_id: Ulid,
    pub assignment_date: NaiveDate,
    pub assignment_type: AssignmentType,
    /// Every activity starts assigned to this staff member; `None` leaves them claimable.
    pub assigned_to: Option<Ulid>,
}

/// Status change that settling the staged room would produce, if any.
pub(super) fn settle_event(rs: &RoomState, events: &[Event]) -> Option<Event> {
    let mut staged = rs.clone();
    for event in events {
        apply_room_event(&mut staged, event);
    }
    let target = settle(&staged.room, staged.current_assignment());
    (target != staged.room.status).then_some(Event::RoomStatusChanged {
        id: staged.room.id,
        status: target,
    })
}

impl Engine {
    /// Schedule work for a room, fanning the catalog template out into activity rows.
    pub async fn create_assignment(&self, req: NewAssignment) -> Result<RoomAssignment, EngineError> {
        instrumented("create_assignment", self.create_assignment_inner(req)).await
    }

    async fn create_assignment_inner(&self, req: NewAssignment) -> Result<RoomAssignment, EngineError> {
        let _gate = self.begin().await;
        let template = self.catalog.template(req.assignment_type).ok_or_else(|| {
            EngineError::Validation(format!("no catalog template for {}", req.assignment_type))
        })?;
        if self.store.room_for_entity(&req.id).is_some() {
            return Err(EngineError::AlreadyExists(req.id));
        }

        let rs = self.room_handle(&req.room_id)?;
        let mut guard = rs.write().await;
        if let Some(existing) = guard.open_assignment_on(req.assignment_date) {
            return Err(EngineError::DuplicateAssignment {
                room_id: req.room_id,
                date: req.assignment_date,
                existing: existing.id,
            });
        }

        let event = Event::AssignmentCreated {
            id: req.id,
            room_id: req.room_id,
            assignment_date: req.assignment_date,
            assignment_type: req.assignment_type,
            created_at: self.now(),
            requires_inspection: template.requires_inspection,
            activities: template.seeds(req.assigned_to),
        };
        let mut events = vec![event];
        if let Some(status_change) = settle_event(&guard, &events) {
            events.push(status_change);
        }
        self.commit(Some(&mut *guard), None, events).await?;

        guard
            .assignment(&req.id)
            .cloned()
            .ok_or(EngineError::NotFound(req.id))
    }

    /// Create many assignments, one room at a time. Each is atomic on its own; the sequence
    /// as a whole is not. Stops at the first failure.
    pub async fn bulk_assign(&self, requests: Vec<NewAssignment>) -> Result<Vec<Ulid>, EngineError> {
        instrumented("bulk_assign", async {
            if requests.len() > MAX_BULK_ASSIGNMENTS {
                return Err(EngineError::LimitExceeded("too many assignments in one request"));
            }
            let mut committed = Vec::with_capacity(requests.len());
            for req in requests {
                let id = req.id;
                match self.create_assignment_inner(req).await {
                    Ok(_) => committed.push(id),
                    Err(e) if committed.is_empty() => return Err(e),
                    Err(e) => {
                        tracing::warn!(
                            "bulk assignment stopped at {id} after {} commit(s): {e}",
                            committed.len()
                        );
                        return Err(EngineError::PartialSequenceFailure {
                            committed,
                            failed: id,
                            source: Box::new(e),
                        });
                    }
                }
            }
            Ok(committed)
        })
        .await
    }

    /// Cancel an assignment that nobody is working on. Activity rows are left as they are.
    pub async fn cancel_assignment(&self, id: Ulid) -> Result<(), EngineError> {
        instrumented("cancel_assignment", async {
            let _gate = self.begin().await;
            let rs = self.room_handle_for(&id)?;
            let mut guard = rs.write().await;
            let assignment = guard.assignment(&id).ok_or(EngineError::NotFound(id))?;
            if !assignment.is_open() {
                return Err(Precondition::AssignmentClosed {
                    assignment_id: id,
                    status: assignment.status,
                }
                .into());
            }
            for activity in &assignment.activities {
                if let Some(held) = self.store.active_on_activity(&activity.id) {
                    return Err(Precondition::ActivityInUse {
                        activity_id: activity.id,
                        session_id: held.session_id,
                        staff_id: held.staff_id,
                    }
                    .into());
                }
            }

            let mut events = vec![Event::AssignmentCancelled {
                id,
                room_id: assignment.room_id,
            }];
            if let Some(status_change) = settle_event(&guard, &events) {
                events.push(status_change);
            }
            self.commit(Some(&mut *guard), None, events).await
        })
        .await
    }

    /// Hand an unfinished activity to another staff member.
    pub async fn reassign_activity(&self, activity_id: Ulid, staff_id: Ulid) -> Result<(), EngineError> {
        instrumented("reassign_activity", async {
            let _gate = self.begin().await;
            let rs = self.room_handle_for(&activity_id)?;
            let mut guard = rs.write().await;
            let (assignment, activity) = guard
                .find_activity(&activity_id)
                .ok_or(EngineError::NotFound(activity_id))?;
            if !assignment.is_open() {
                return Err(Precondition::AssignmentClosed {
                    assignment_id: assignment.id,
                    status: assignment.status,
                }
                .into());
            }
            if activity.status == ActivityStatus::Completed {
                return Err(Precondition::ActivityCompleted(activity_id).into());
            }
            if let Some(held) = self.store.active_on_activity(&activity_id)
                && held.staff_id != staff_id
            {
                return Err(Precondition::ActivityInUse {
                    activity_id,
                    session_id: held.session_id,
                    staff_id: held.staff_id,
                }
                .into());
            }
            if activity.assigned_to == Some(staff_id) {
                return Ok(());
            }
            let room_id = assignment.room_id;
            self.commit(
                Some(&mut *guard),
                None,
                vec![Event::ActivityReassigned {
                    id: activity_id,
                    room_id,
                    staff_id,
                }],
            )
            .await
        })
        .await
    }

    /// Attach a free-text issue to an activity.
    pub async fn report_issue(&self, activity_id: Ulid, issue: &str) -> Result<(), EngineError> {
        instrumented("report_issue", async {
            let _gate = self.begin().await;
            let issue = required_text("issue", issue, MAX_ISSUE_LEN, "issue too long")?;
            let rs = self.room_handle_for(&activity_id)?;
            let mut guard = rs.write().await;
            let (assignment, activity) = guard
                .find_activity(&activity_id)
                .ok_or(EngineError::NotFound(activity_id))?;
            if assignment.status == AssignmentStatus::Cancelled {
                return Err(Precondition::AssignmentClosed {
                    assignment_id: assignment.id,
                    status: assignment.status,
                }
                .into());
            }
            if activity.issues_reported.len() >= MAX_ISSUES_PER_ACTIVITY {
                return Err(EngineError::LimitExceeded("too many issues on activity"));
            }
            let room_id = assignment.room_id;
            self.commit(
                Some(&mut *guard),
                None,
                vec![Event::IssueReported {
                    id: activity_id,
                    room_id,
                    issue,
                }],
            )
            .await
        })
        .await
    }
}
