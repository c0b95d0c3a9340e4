use serde::{Deserialize, Serialize};
use ulid::Ulid;

use crate::model::*;
use crate::observability;

use super::assignments::settle_event;
use super::conflict::check_startable;
use super::{instrumented, Engine, EngineError, Precondition};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct StartSession {
    pub session_id: Ulid,
    pub staff_id: Ulid,
    pub room_id: Ulid,
    pub activity_id: Ulid,
    /// Force-close the staff member's open session, if any.
    pub confirm: bool,
}

impl Engine {
    /// Open a work session on an activity.
    ///
    /// A staff member has at most one session in progress. If one is open and `confirm` is
    /// false, nothing changes and [`EngineError::ConflictRequiresConfirmation`] names it.
    /// Otherwise the open session is force-closed, the new one opened, the activity started
    /// and the room moved to its working status, all in one commit.
    pub async fn start_session(&self, req: StartSession) -> Result<SessionStarted, EngineError> {
        instrumented("start_session", async {
            let _gate = self.begin().await;
            if self.store.staff_for_session(&req.session_id).is_some() {
                return Err(EngineError::AlreadyExists(req.session_id));
            }
            let owner = self
                .store
                .room_for_entity(&req.activity_id)
                .ok_or(EngineError::NotFound(req.activity_id))?;
            if owner != req.room_id {
                return Err(EngineError::Validation(format!(
                    "activity {} does not belong to room {}",
                    req.activity_id, req.room_id
                )));
            }

            let ss = self.store.staff_entry(req.staff_id);
            let mut staff = ss.write().await;
            let open: Vec<(Ulid, Ulid)> = staff
                .active_sessions()
                .map(|s| (s.id, s.room_id))
                .collect();
            if let Some(&(session_id, room_id)) = open.first()
                && !req.confirm
            {
                metrics::counter!(observability::SESSION_CONFLICTS_TOTAL).increment(1);
                return Err(EngineError::ConflictRequiresConfirmation {
                    staff_id: req.staff_id,
                    session_id,
                    room_id,
                });
            }

            let rs = self.room_handle(&req.room_id)?;
            let mut room = rs.write().await;
            let (assignment, activity) = room
                .find_activity(&req.activity_id)
                .ok_or(EngineError::NotFound(req.activity_id))?;
            check_startable(
                assignment,
                activity,
                req.staff_id,
                self.store.active_on_activity(&req.activity_id),
            )?;
            let working = assignment.assignment_type.working_status();

            let now = self.now();
            let closed: Vec<Ulid> = open.iter().map(|(id, _)| *id).collect();
            let mut events: Vec<Event> = closed
                .iter()
                .map(|id| Event::SessionClosed {
                    id: *id,
                    staff_id: req.staff_id,
                    at: now,
                    forced: true,
                })
                .collect();
            events.push(Event::SessionOpened {
                id: req.session_id,
                staff_id: req.staff_id,
                room_id: req.room_id,
                activity_id: req.activity_id,
                at: now,
            });
            events.push(Event::ActivityStarted {
                id: req.activity_id,
                room_id: req.room_id,
                staff_id: req.staff_id,
                at: now,
            });
            if room.room.status != working && room.room.status != RoomStatus::OutOfOrder {
                events.push(Event::RoomStatusChanged {
                    id: req.room_id,
                    status: working,
                });
            }

            self.commit(Some(&mut *room), Some(&mut *staff), events).await?;

            if !closed.is_empty() {
                metrics::counter!(observability::SESSIONS_FORCE_CLOSED_TOTAL)
                    .increment(closed.len() as u64);
                tracing::info!(
                    "staff {} confirmed switch to room {}; force-closed {closed:?}",
                    req.staff_id,
                    room.room.room_number
                );
            }
            Ok(SessionStarted {
                session_id: req.session_id,
                closed,
            })
        })
        .await
    }

    /// Close a session and complete its activity, then settle the room.
    pub async fn stop_session(&self, session_id: Ulid) -> Result<SessionStopped, EngineError> {
        instrumented("stop_session", async {
            let _gate = self.begin().await;
            let staff_id = self
                .store
                .staff_for_session(&session_id)
                .ok_or(EngineError::NotFound(session_id))?;
            let ss = self
                .store
                .get_staff(&staff_id)
                .ok_or(EngineError::NotFound(staff_id))?;
            let mut staff = ss.write().await;
            let session = staff
                .session(&session_id)
                .cloned()
                .ok_or(EngineError::NotFound(session_id))?;
            if !session.is_active() {
                return Err(Precondition::SessionNotActive(session_id).into());
            }

            let rs = self.room_handle(&session.room_id)?;
            let mut room = rs.write().await;
            let (assignment, activity) = room
                .find_activity(&session.activity_id)
                .ok_or(EngineError::NotFound(session.activity_id))?;
            let completes = assignment.status != AssignmentStatus::Cancelled
                && activity.status != ActivityStatus::Completed;

            let now = self.now();
            let mut events = vec![Event::SessionClosed {
                id: session_id,
                staff_id,
                at: now,
                forced: false,
            }];
            if completes {
                events.push(Event::ActivityCompleted {
                    id: session.activity_id,
                    room_id: session.room_id,
                    at: now,
                });
            }
            if let Some(status_change) = settle_event(&room, &events) {
                events.push(status_change);
            }

            self.commit(Some(&mut *room), Some(&mut *staff), events).await?;

            let (assignment, activity) = room
                .find_activity(&session.activity_id)
                .ok_or(EngineError::NotFound(session.activity_id))?;
            Ok(SessionStopped {
                session_id,
                activity_id: activity.id,
                time_taken_minutes: activity.time_taken_minutes,
                assignment_status: assignment.status,
                completion_percentage: assignment.completion_percentage,
                room_status: room.room.status,
            })
        })
        .await
    }
}
