use std::collections::HashSet;

use chrono::NaiveDate;
use ulid::Ulid;

use crate::model::*;

use super::{resolve, Engine, EngineError};

impl Engine {
    pub async fn get_room(&self, id: Ulid) -> Result<Room, EngineError> {
        let rs = self.room_handle(&id)?;
        let guard = rs.read().await;
        Ok(guard.room.clone())
    }

    pub async fn room_by_number(&self, room_number: &str) -> Option<Room> {
        let id = self.store.room_by_number(room_number.trim())?;
        let rs = self.store.get_room(&id)?;
        let guard = rs.read().await;
        Some(guard.room.clone())
    }

    /// Every room, ordered by floor then room number.
    pub async fn list_rooms(&self) -> Vec<Room> {
        let mut rooms = Vec::new();
        for rs in self.store.room_states() {
            rooms.push(rs.read().await.room.clone());
        }
        rooms.sort_by(|a, b| (a.floor, &a.room_number).cmp(&(b.floor, &b.room_number)));
        rooms
    }

    pub async fn get_assignment(&self, id: Ulid) -> Result<RoomAssignment, EngineError> {
        let rs = self.room_handle_for(&id)?;
        let guard = rs.read().await;
        guard.assignment(&id).cloned().ok_or(EngineError::NotFound(id))
    }

    /// The assignment that currently governs the room, if any.
    pub async fn current_assignment(&self, room_id: Ulid) -> Result<Option<RoomAssignment>, EngineError> {
        let rs = self.room_handle(&room_id)?;
        let guard = rs.read().await;
        Ok(guard.current_assignment().cloned())
    }

    /// Non-cancelled assignments for a room on a date, most recent first.
    pub async fn assignments_for_room(
        &self,
        room_id: Ulid,
        date: NaiveDate,
    ) -> Result<Vec<RoomAssignment>, EngineError> {
        let rs = self.room_handle(&room_id)?;
        let guard = rs.read().await;
        let mut found: Vec<RoomAssignment> = guard
            .assignments
            .iter()
            .filter(|a| a.assignment_date == date && a.status != AssignmentStatus::Cancelled)
            .cloned()
            .collect();
        found.sort_by(|a, b| (b.created_at, b.id).cmp(&(a.created_at, a.id)));
        Ok(found)
    }

    /// Activities of the given assignments, grouped by assignment in sequence order.
    /// Unknown ids are skipped.
    pub async fn activities_for_assignments(&self, ids: &[Ulid]) -> Vec<ActivityAssignment> {
        let mut seen = HashSet::new();
        let mut activities = Vec::new();
        for id in ids {
            if !seen.insert(*id) {
                continue;
            }
            let Some(rs) = self
                .store
                .room_for_entity(id)
                .and_then(|room_id| self.store.get_room(&room_id))
            else {
                continue;
            };
            let guard = rs.read().await;
            if let Some(a) = guard.assignment(id) {
                activities.extend(a.activities.iter().cloned());
            }
        }
        activities
    }

    /// Completed assignments waiting for an inspector, oldest first.
    pub async fn pending_inspections(&self) -> Vec<RoomAssignment> {
        let mut queue = Vec::new();
        for rs in self.store.room_states() {
            let guard = rs.read().await;
            queue.extend(
                guard
                    .assignments
                    .iter()
                    .filter(|a| {
                        a.status == AssignmentStatus::Completed
                            && a.inspection.state == InspectionState::Pending
                    })
                    .cloned(),
            );
        }
        queue.sort_by_key(|a| (a.created_at, a.id));
        queue
    }

    // ── Sessions ─────────────────────────────────────────

    /// The staff member's session in progress, if any.
    pub async fn active_session(&self, staff_id: Ulid) -> Option<WorkSession> {
        let active = self.store.active_for_staff(&staff_id)?;
        let ss = self.store.get_staff(&staff_id)?;
        let guard = ss.read().await;
        guard.session(&active.session_id).cloned()
    }

    /// Every session the staff member still has on record, oldest first.
    pub async fn sessions_for_staff(&self, staff_id: Ulid) -> Vec<WorkSession> {
        let Some(ss) = self.store.get_staff(&staff_id) else {
            return Vec::new();
        };
        let guard = ss.read().await;
        let mut sessions = guard.sessions.clone();
        sessions.sort_by_key(|s| (s.started_at, s.id));
        sessions
    }

    /// All sessions in progress across staff.
    pub async fn active_sessions(&self) -> Vec<WorkSession> {
        let mut sessions = Vec::new();
        for active in self.store.active_sessions() {
            if let Some(s) = self.active_session(active.staff_id).await {
                sessions.push(s);
            }
        }
        sessions.sort_by_key(|s| (s.started_at, s.id));
        sessions
    }

    // ── Board ────────────────────────────────────────────

    /// One entry per room with its current assignment, resolved display status and the
    /// staff working in it. Ordered by floor then room number.
    pub async fn room_board(&self) -> Vec<RoomBoardEntry> {
        let active = self.store.active_sessions();
        let mut board = Vec::new();
        for rs in self.store.room_states() {
            let guard = rs.read().await;
            let current = guard.current_assignment();
            let mut active_staff: Vec<Ulid> = active
                .iter()
                .filter(|a| a.room_id == guard.room.id)
                .map(|a| a.staff_id)
                .collect();
            active_staff.sort();
            board.push(RoomBoardEntry {
                room_id: guard.room.id,
                room_number: guard.room.room_number.clone(),
                floor: guard.room.floor,
                status: guard.room.status,
                occupancy: guard.room.occupancy,
                display: resolve(&guard.room, current),
                assignment_id: current.map(|a| a.id),
                assignment_type: current.map(|a| a.assignment_type),
                completion_percentage: current.map_or(0, |a| a.completion_percentage),
                active_staff,
            });
        }
        board.sort_by(|a, b| (a.floor, &a.room_number).cmp(&(b.floor, &b.room_number)));
        board
    }
}
