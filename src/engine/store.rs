use std::sync::Arc;

use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use tokio::sync::RwLock;
use ulid::Ulid;

use crate::model::*;

use super::progress::refresh_assignment;
use super::{SharedRoomState, SharedStaffState};

/// An open work session, indexed by staff member and by activity.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ActiveSession {
    pub session_id: Ulid,
    pub staff_id: Ulid,
    pub room_id: Ulid,
    pub activity_id: Ulid,
}

impl ActiveSession {
    fn of(session: &WorkSession) -> Self {
        Self {
            session_id: session.id,
            staff_id: session.staff_id,
            room_id: session.room_id,
            activity_id: session.activity_id,
        }
    }
}

/// Room and staff state units plus the lookup indexes over them.
///
/// Indexes are only touched after a commit is durable, while the owning locks are held.
pub struct InMemoryStore {
    rooms: DashMap<Ulid, SharedRoomState>,
    staff: DashMap<Ulid, SharedStaffState>,
    room_numbers: DashMap<String, Ulid>,
    /// Assignment and activity id → room id
    entity_to_room: DashMap<Ulid, Ulid>,
    session_to_staff: DashMap<Ulid, Ulid>,
    /// At most one entry per staff member: the exclusivity index.
    active_by_staff: DashMap<Ulid, ActiveSession>,
    active_by_activity: DashMap<Ulid, ActiveSession>,
}

impl Default for InMemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self {
            rooms: DashMap::new(),
            staff: DashMap::new(),
            room_numbers: DashMap::new(),
            entity_to_room: DashMap::new(),
            session_to_staff: DashMap::new(),
            active_by_staff: DashMap::new(),
            active_by_activity: DashMap::new(),
        }
    }

    // ── Rooms ────────────────────────────────────────────────

    pub fn room_count(&self) -> usize {
        self.rooms.len()
    }

    pub fn contains_room(&self, id: &Ulid) -> bool {
        self.rooms.contains_key(id)
    }

    pub fn get_room(&self, id: &Ulid) -> Option<SharedRoomState> {
        self.rooms.get(id).map(|e| e.value().clone())
    }

    /// Snapshot of every room handle; safe to hold across awaits.
    pub fn room_states(&self) -> Vec<SharedRoomState> {
        self.rooms.iter().map(|e| e.value().clone()).collect()
    }

    pub fn room_by_number(&self, number: &str) -> Option<Ulid> {
        self.room_numbers.get(number).map(|e| *e.value())
    }

    /// Claim a room number before its creation is durable. Fails if taken.
    pub fn reserve_room_number(&self, number: &str, id: Ulid) -> bool {
        match self.room_numbers.entry(number.to_string()) {
            Entry::Occupied(_) => false,
            Entry::Vacant(slot) => {
                slot.insert(id);
                true
            }
        }
    }

    pub fn release_room_number(&self, number: &str, id: &Ulid) {
        self.room_numbers.remove_if(number, |_, owner| owner == id);
    }

    // ── Staff ────────────────────────────────────────────────

    pub fn get_staff(&self, id: &Ulid) -> Option<SharedStaffState> {
        self.staff.get(id).map(|e| e.value().clone())
    }

    /// Staff state for `id`, created empty on first use.
    pub fn staff_entry(&self, id: Ulid) -> SharedStaffState {
        self.staff
            .entry(id)
            .or_insert_with(|| Arc::new(RwLock::new(StaffState::new(id))))
            .value()
            .clone()
    }

    pub fn staff_states(&self) -> Vec<SharedStaffState> {
        self.staff.iter().map(|e| e.value().clone()).collect()
    }

    // ── Lookups ──────────────────────────────────────────────

    pub fn room_for_entity(&self, entity_id: &Ulid) -> Option<Ulid> {
        self.entity_to_room.get(entity_id).map(|e| *e.value())
    }

    pub fn staff_for_session(&self, session_id: &Ulid) -> Option<Ulid> {
        self.session_to_staff.get(session_id).map(|e| *e.value())
    }

    pub fn active_for_staff(&self, staff_id: &Ulid) -> Option<ActiveSession> {
        self.active_by_staff.get(staff_id).map(|e| *e.value())
    }

    pub fn active_on_activity(&self, activity_id: &Ulid) -> Option<ActiveSession> {
        self.active_by_activity.get(activity_id).map(|e| *e.value())
    }

    pub fn active_sessions(&self) -> Vec<ActiveSession> {
        self.active_by_staff.iter().map(|e| *e.value()).collect()
    }

    /// Forget a closed session dropped by compaction.
    pub fn forget_session(&self, session_id: &Ulid) {
        self.session_to_staff.remove(session_id);
    }

    // ── Post-commit bookkeeping ──────────────────────────────

    /// Maintain the room map and indexes for a durable event.
    pub fn index_event(&self, event: &Event) {
        match event {
            Event::RoomCreated {
                id,
                room_number,
                floor,
                status,
                occupancy,
            } => {
                let room = Room {
                    id: *id,
                    room_number: room_number.clone(),
                    floor: *floor,
                    status: *status,
                    occupancy: *occupancy,
                };
                self.room_numbers.insert(room_number.clone(), *id);
                self.rooms
                    .insert(*id, Arc::new(RwLock::new(RoomState::new(room))));
            }
            Event::RoomDeleted { id } => {
                self.rooms.remove(id);
                self.room_numbers.retain(|_, owner| owner != id);
            }
            Event::AssignmentCreated {
                id,
                room_id,
                activities,
                ..
            } => {
                self.entity_to_room.insert(*id, *room_id);
                for seed in activities {
                    self.entity_to_room.insert(seed.id, *room_id);
                }
            }
            Event::AssignmentRestored { assignment } => {
                self.entity_to_room.insert(assignment.id, assignment.room_id);
                for activity in &assignment.activities {
                    self.entity_to_room.insert(activity.id, assignment.room_id);
                }
            }
            Event::SessionOpened {
                id,
                staff_id,
                room_id,
                activity_id,
                ..
            } => {
                let active = ActiveSession {
                    session_id: *id,
                    staff_id: *staff_id,
                    room_id: *room_id,
                    activity_id: *activity_id,
                };
                self.session_to_staff.insert(*id, *staff_id);
                self.active_by_staff.insert(*staff_id, active);
                self.active_by_activity.insert(*activity_id, active);
            }
            Event::SessionRestored { session } => {
                self.session_to_staff.insert(session.id, session.staff_id);
                if session.is_active() {
                    let active = ActiveSession::of(session);
                    self.active_by_staff.insert(session.staff_id, active);
                    self.active_by_activity.insert(session.activity_id, active);
                }
            }
            Event::SessionClosed { id, staff_id, .. } => {
                if let Some((_, active)) = self
                    .active_by_staff
                    .remove_if(staff_id, |_, a| a.session_id == *id)
                {
                    self.active_by_activity
                        .remove_if(&active.activity_id, |_, a| a.session_id == *id);
                }
            }
            Event::RoomStatusChanged { .. }
            | Event::OccupancyChanged { .. }
            | Event::AssignmentCancelled { .. }
            | Event::ActivityStarted { .. }
            | Event::ActivityCompleted { .. }
            | Event::ActivityReassigned { .. }
            | Event::IssueReported { .. }
            | Event::InspectionRecorded { .. } => {}
        }
    }
}

// ── Event application ────────────────────────────────────────────

/// Apply a room-targeted event (no locking — caller holds the lock). Derived assignment
/// fields are recomputed after every child change.
pub fn apply_room_event(rs: &mut RoomState, event: &Event) {
    match event {
        Event::RoomStatusChanged { status, .. } => rs.room.status = *status,
        Event::OccupancyChanged { occupancy, .. } => rs.room.occupancy = *occupancy,
        Event::AssignmentCreated {
            id,
            room_id,
            assignment_date,
            assignment_type,
            created_at,
            requires_inspection,
            activities,
        } => {
            let mut assignment = RoomAssignment {
                id: *id,
                room_id: *room_id,
                assignment_date: *assignment_date,
                assignment_type: *assignment_type,
                status: AssignmentStatus::Pending,
                completion_percentage: 0,
                created_at: *created_at,
                requires_inspection: *requires_inspection,
                inspection: Inspection::new(),
                rework_count: 0,
                activities: activities
                    .iter()
                    .map(|seed| ActivityAssignment {
                        id: seed.id,
                        room_assignment_id: *id,
                        activity_name: seed.name.clone(),
                        assigned_to: seed.assigned_to,
                        sequence_order: seed.sequence_order,
                        estimated_minutes: seed.estimated_minutes,
                        is_mandatory: seed.is_mandatory,
                        status: ActivityStatus::Pending,
                        started_at: None,
                        completed_at: None,
                        time_taken_minutes: None,
                        issues_reported: Vec::new(),
                    })
                    .collect(),
            };
            assignment.activities.sort_by_key(|a| a.sequence_order);
            refresh_assignment(&mut assignment);
            rs.assignments.push(assignment);
        }
        Event::AssignmentRestored { assignment } => {
            rs.assignments.retain(|a| a.id != assignment.id);
            rs.assignments.push(assignment.clone());
        }
        Event::AssignmentCancelled { id, .. } => {
            if let Some(a) = rs.assignment_mut(id) {
                a.status = AssignmentStatus::Cancelled;
            }
        }
        Event::ActivityStarted {
            id, staff_id, at, ..
        } => {
            if let Some(a) = rs.find_activity_mut(id) {
                if let Some(act) = a.activity_mut(id) {
                    act.start(*staff_id, *at);
                }
                refresh_assignment(a);
            }
        }
        Event::ActivityCompleted { id, at, .. } => {
            if let Some(a) = rs.find_activity_mut(id) {
                if let Some(act) = a.activity_mut(id) {
                    act.complete(*at);
                }
                refresh_assignment(a);
            }
        }
        Event::ActivityReassigned { id, staff_id, .. } => {
            if let Some(act) = rs.find_activity_mut(id).and_then(|a| a.activity_mut(id)) {
                act.assigned_to = Some(*staff_id);
            }
        }
        Event::IssueReported { id, issue, .. } => {
            if let Some(act) = rs.find_activity_mut(id).and_then(|a| a.activity_mut(id)) {
                act.issues_reported.push(issue.clone());
            }
        }
        Event::InspectionRecorded {
            assignment_id,
            record,
            ..
        } => {
            if let Some(a) = rs.assignment_mut(assignment_id) {
                match record.result {
                    InspectionResult::Passed => a.inspection.state = InspectionState::Passed,
                    InspectionResult::Failed => {
                        a.inspection.state = InspectionState::Failed;
                        a.rework_count += 1;
                        for act in &mut a.activities {
                            act.reopen();
                        }
                    }
                }
                a.inspection.history.push(record.clone());
                refresh_assignment(a);
            }
        }
        // Room lifecycle is handled at the map level; sessions live in staff state.
        Event::RoomCreated { .. }
        | Event::RoomDeleted { .. }
        | Event::SessionOpened { .. }
        | Event::SessionClosed { .. }
        | Event::SessionRestored { .. } => {}
    }
}

/// Apply a staff-targeted event (no locking — caller holds the lock).
pub fn apply_staff_event(ss: &mut StaffState, event: &Event) {
    match event {
        Event::SessionOpened {
            id,
            staff_id,
            room_id,
            activity_id,
            at,
        } => ss.sessions.push(WorkSession {
            id: *id,
            staff_id: *staff_id,
            room_id: *room_id,
            activity_id: *activity_id,
            started_at: *at,
            stopped_at: None,
            status: SessionStatus::InProgress,
            forced: false,
        }),
        Event::SessionClosed { id, at, forced, .. } => {
            if let Some(s) = ss.session_mut(id) {
                s.close(*at, *forced);
            }
        }
        Event::SessionRestored { session } => {
            ss.sessions.retain(|s| s.id != session.id);
            ss.sessions.push(session.clone());
        }
        _ => {}
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn room_created(id: Ulid, number: &str) -> Event {
        Event::RoomCreated {
            id,
            room_number: number.into(),
            floor: 3,
            status: RoomStatus::Vacant,
            occupancy: Occupancy::Vacant,
        }
    }

    fn seed(order: u32) -> ActivitySeed {
        ActivitySeed {
            id: Ulid::new(),
            name: format!("step {order}"),
            sequence_order: order,
            estimated_minutes: 5,
            is_mandatory: true,
            assigned_to: None,
        }
    }

    #[test]
    fn room_created_indexes_number() {
        let store = InMemoryStore::new();
        let id = Ulid::new();
        store.index_event(&room_created(id, "301"));
        assert!(store.contains_room(&id));
        assert_eq!(store.room_by_number("301"), Some(id));

        store.index_event(&Event::RoomDeleted { id });
        assert!(!store.contains_room(&id));
        assert_eq!(store.room_by_number("301"), None);
    }

    #[test]
    fn reserve_room_number_is_exclusive() {
        let store = InMemoryStore::new();
        let a = Ulid::new();
        let b = Ulid::new();
        assert!(store.reserve_room_number("12", a));
        assert!(!store.reserve_room_number("12", b));
        store.release_room_number("12", &b); // not the owner
        assert_eq!(store.room_by_number("12"), Some(a));
        store.release_room_number("12", &a);
        assert_eq!(store.room_by_number("12"), None);
    }

    #[test]
    fn assignment_fan_out_sorted_and_indexed() {
        let store = InMemoryStore::new();
        let room_id = Ulid::new();
        let mut rs = RoomState::new(Room {
            id: room_id,
            room_number: "1".into(),
            floor: 0,
            status: RoomStatus::Vacant,
            occupancy: Occupancy::Vacant,
        });
        let seeds = vec![seed(2), seed(1), seed(3)];
        let event = Event::AssignmentCreated {
            id: Ulid::new(),
            room_id,
            assignment_date: NaiveDate::from_ymd_opt(2026, 2, 2).unwrap(),
            assignment_type: AssignmentType::Turndown,
            created_at: 10,
            requires_inspection: false,
            activities: seeds.clone(),
        };
        apply_room_event(&mut rs, &event);
        store.index_event(&event);

        let a = rs.current_assignment().unwrap();
        let orders: Vec<u32> = a.activities.iter().map(|x| x.sequence_order).collect();
        assert_eq!(orders, vec![1, 2, 3]);
        assert!(a.activities.iter().all(|x| x.status == ActivityStatus::Pending));
        for s in &seeds {
            assert_eq!(store.room_for_entity(&s.id), Some(room_id));
        }
    }

    #[test]
    fn session_indexes_follow_open_and_close() {
        let store = InMemoryStore::new();
        let staff_id = Ulid::new();
        let activity_id = Ulid::new();
        let id = Ulid::new();
        let mut ss = StaffState::new(staff_id);

        let opened = Event::SessionOpened {
            id,
            staff_id,
            room_id: Ulid::new(),
            activity_id,
            at: 5,
        };
        apply_staff_event(&mut ss, &opened);
        store.index_event(&opened);
        assert_eq!(store.active_for_staff(&staff_id).map(|a| a.session_id), Some(id));
        assert_eq!(store.active_on_activity(&activity_id).map(|a| a.staff_id), Some(staff_id));

        let closed = Event::SessionClosed {
            id,
            staff_id,
            at: 9,
            forced: false,
        };
        apply_staff_event(&mut ss, &closed);
        store.index_event(&closed);
        assert!(store.active_for_staff(&staff_id).is_none());
        assert!(store.active_on_activity(&activity_id).is_none());
        assert_eq!(store.staff_for_session(&id), Some(staff_id));
        assert_eq!(ss.session(&id).unwrap().stopped_at, Some(9));
    }

    #[test]
    fn closing_stale_session_keeps_newer_index_entry() {
        let store = InMemoryStore::new();
        let staff_id = Ulid::new();
        let newer = Ulid::new();
        store.index_event(&Event::SessionOpened {
            id: newer,
            staff_id,
            room_id: Ulid::new(),
            activity_id: Ulid::new(),
            at: 1,
        });
        store.index_event(&Event::SessionClosed {
            id: Ulid::new(),
            staff_id,
            at: 2,
            forced: true,
        });
        assert_eq!(store.active_for_staff(&staff_id).map(|a| a.session_id), Some(newer));
    }

    #[test]
    fn staff_entry_created_once() {
        let store = InMemoryStore::new();
        let id = Ulid::new();
        let a = store.staff_entry(id);
        let b = store.staff_entry(id);
        assert!(Arc::ptr_eq(&a, &b));
        assert!(store.get_staff(&Ulid::new()).is_none());
    }
}
