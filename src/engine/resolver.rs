use crate::model::*;

use super::Precondition;

// ── Room Status Resolution ───────────────────────────────────────

/// Display status of a room given its current assignment. First match wins:
///
/// 1. no assignment → occupancy (occupied, else vacant)
/// 2. inspection pending → Pending Inspection
/// 3. inspection failed → Failed Inspection
/// 4. in progress → Cleaning In Progress (Under Maintenance for repair work)
/// 5. completed → Clean
/// 6. pending → Needs Cleaning
/// 7. anything else → raw occupancy
pub fn resolve(room: &Room, current: Option<&RoomAssignment>) -> DisplayStatus {
    let Some(assignment) = current else {
        return match room.occupancy {
            Occupancy::Occupied => DisplayStatus::Occupied,
            _ => DisplayStatus::Vacant,
        };
    };

    match assignment.inspection.state {
        InspectionState::Pending => return DisplayStatus::PendingInspection,
        InspectionState::Failed => return DisplayStatus::FailedInspection,
        InspectionState::NotStarted | InspectionState::Passed => {}
    }

    match assignment.status {
        AssignmentStatus::InProgress if assignment.assignment_type.is_maintenance() => {
            DisplayStatus::UnderMaintenance
        }
        AssignmentStatus::InProgress => DisplayStatus::CleaningInProgress,
        AssignmentStatus::Completed => DisplayStatus::Clean,
        AssignmentStatus::Pending => DisplayStatus::NeedsCleaning,
        AssignmentStatus::Cancelled => DisplayStatus::from(room.occupancy),
    }
}

// ── Ready-For-Occupation gate ────────────────────────────────────

/// A room may be set to vacant only with no current assignment or a completed one.
pub fn rfo_gate(room_id: ulid::Ulid, current: Option<&RoomAssignment>) -> Result<(), Precondition> {
    match current {
        None => Ok(()),
        Some(a) if a.status == AssignmentStatus::Completed => Ok(()),
        Some(a) => Err(Precondition::AssignmentIncomplete {
            room_id,
            assignment_id: a.id,
            status: a.status,
        }),
    }
}

/// The stored housekeeping status a room should hold after its assignment changed.
///
/// Out-of-order rooms are never touched. A ready assignment releases the room to its
/// occupancy; unfinished or uninspected work keeps it in cleaning (or maintenance).
pub fn settle(room: &Room, current: Option<&RoomAssignment>) -> RoomStatus {
    let released = match room.occupancy {
        Occupancy::Occupied => RoomStatus::Occupied,
        Occupancy::Vacant | Occupancy::Reserved => RoomStatus::Vacant,
    };
    match (room.status, current) {
        (RoomStatus::OutOfOrder, _) => RoomStatus::OutOfOrder,
        (RoomStatus::Cleaning | RoomStatus::Maintenance, None) => released,
        (status, None) => status,
        (_, Some(a)) if a.is_ready() => released,
        (_, Some(a)) => a.assignment_type.working_status(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;
    use ulid::Ulid;

    fn room(status: RoomStatus, occupancy: Occupancy) -> Room {
        Room {
            id: Ulid::new(),
            room_number: "101".into(),
            floor: 1,
            status,
            occupancy,
        }
    }

    fn assignment(status: AssignmentStatus, inspection: InspectionState) -> RoomAssignment {
        RoomAssignment {
            id: Ulid::new(),
            room_id: Ulid::new(),
            assignment_date: NaiveDate::from_ymd_opt(2026, 5, 4).unwrap(),
            assignment_type: AssignmentType::DailyCleaning,
            status,
            completion_percentage: 0,
            created_at: 0,
            requires_inspection: inspection != InspectionState::NotStarted,
            inspection: Inspection {
                state: inspection,
                history: Vec::new(),
            },
            rework_count: 0,
            activities: Vec::new(),
        }
    }

    #[test]
    fn no_assignment_falls_back_to_occupancy() {
        let r = room(RoomStatus::Vacant, Occupancy::Occupied);
        assert_eq!(resolve(&r, None), DisplayStatus::Occupied);
        let r = room(RoomStatus::Vacant, Occupancy::Reserved);
        assert_eq!(resolve(&r, None), DisplayStatus::Vacant);
    }

    #[test]
    fn inspection_outranks_status() {
        let r = room(RoomStatus::Cleaning, Occupancy::Occupied);
        let a = assignment(AssignmentStatus::Completed, InspectionState::Pending);
        assert_eq!(resolve(&r, Some(&a)), DisplayStatus::PendingInspection);

        let a = assignment(AssignmentStatus::InProgress, InspectionState::Failed);
        assert_eq!(resolve(&r, Some(&a)), DisplayStatus::FailedInspection);
    }

    #[test]
    fn housekeeping_overrides_occupancy() {
        let r = room(RoomStatus::Occupied, Occupancy::Occupied);
        let a = assignment(AssignmentStatus::InProgress, InspectionState::NotStarted);
        assert_eq!(resolve(&r, Some(&a)), DisplayStatus::CleaningInProgress);
        let a = assignment(AssignmentStatus::Pending, InspectionState::NotStarted);
        assert_eq!(resolve(&r, Some(&a)), DisplayStatus::NeedsCleaning);
        let a = assignment(AssignmentStatus::Completed, InspectionState::Passed);
        assert_eq!(resolve(&r, Some(&a)), DisplayStatus::Clean);
    }

    #[test]
    fn maintenance_in_progress() {
        let r = room(RoomStatus::Maintenance, Occupancy::Vacant);
        let mut a = assignment(AssignmentStatus::InProgress, InspectionState::NotStarted);
        a.assignment_type = AssignmentType::Maintenance;
        assert_eq!(resolve(&r, Some(&a)), DisplayStatus::UnderMaintenance);
    }

    #[test]
    fn cancelled_falls_through_to_raw_occupancy() {
        let r = room(RoomStatus::Vacant, Occupancy::Reserved);
        let a = assignment(AssignmentStatus::Cancelled, InspectionState::NotStarted);
        assert_eq!(resolve(&r, Some(&a)), DisplayStatus::Reserved);
    }

    #[test]
    fn gate_allows_without_assignment_or_when_completed() {
        let rid = Ulid::new();
        assert!(rfo_gate(rid, None).is_ok());
        let a = assignment(AssignmentStatus::Completed, InspectionState::NotStarted);
        assert!(rfo_gate(rid, Some(&a)).is_ok());
    }

    #[test]
    fn gate_names_the_blocking_assignment() {
        let rid = Ulid::new();
        let a = assignment(AssignmentStatus::InProgress, InspectionState::NotStarted);
        let err = rfo_gate(rid, Some(&a)).unwrap_err();
        assert_eq!(
            err,
            Precondition::AssignmentIncomplete {
                room_id: rid,
                assignment_id: a.id,
                status: AssignmentStatus::InProgress,
            }
        );
    }

    #[test]
    fn settle_releases_ready_room() {
        let r = room(RoomStatus::Cleaning, Occupancy::Vacant);
        let a = assignment(AssignmentStatus::Completed, InspectionState::NotStarted);
        assert_eq!(settle(&r, Some(&a)), RoomStatus::Vacant);

        let r = room(RoomStatus::Cleaning, Occupancy::Occupied);
        assert_eq!(settle(&r, Some(&a)), RoomStatus::Occupied);
    }

    #[test]
    fn settle_holds_uninspected_room() {
        let r = room(RoomStatus::Cleaning, Occupancy::Vacant);
        let a = assignment(AssignmentStatus::Completed, InspectionState::Pending);
        assert_eq!(settle(&r, Some(&a)), RoomStatus::Cleaning);
    }

    #[test]
    fn settle_keeps_out_of_order() {
        let r = room(RoomStatus::OutOfOrder, Occupancy::Vacant);
        let a = assignment(AssignmentStatus::Completed, InspectionState::NotStarted);
        assert_eq!(settle(&r, Some(&a)), RoomStatus::OutOfOrder);
    }

    #[test]
    fn settle_without_assignment() {
        let r = room(RoomStatus::Cleaning, Occupancy::Occupied);
        assert_eq!(settle(&r, None), RoomStatus::Occupied);
        let r = room(RoomStatus::Vacant, Occupancy::Occupied);
        assert_eq!(settle(&r, None), RoomStatus::Vacant);
    }
}
