use crate::model::*;

// ── Assignment Progress Aggregation ──────────────────────────────

/// `round(100 * completed / total)`, half up; `0` for an empty set.
pub fn completion_percentage(statuses: &[ActivityStatus]) -> u8 {
    let total = statuses.len() as u64;
    if total == 0 {
        return 0;
    }
    let completed = statuses
        .iter()
        .filter(|s| **s == ActivityStatus::Completed)
        .count() as u64;
    ((completed * 200 + total) / (total * 2)) as u8
}

/// Parent status implied by the children: completed iff all (and at least one) are
/// completed, in progress iff any is in progress, pending otherwise.
pub fn derive_status(statuses: &[ActivityStatus]) -> AssignmentStatus {
    if !statuses.is_empty() && statuses.iter().all(|s| *s == ActivityStatus::Completed) {
        AssignmentStatus::Completed
    } else if statuses.contains(&ActivityStatus::InProgress) {
        AssignmentStatus::InProgress
    } else {
        AssignmentStatus::Pending
    }
}

/// Recompute every derived field of an assignment from its activities.
///
/// Cancelled assignments are frozen. A completion that needs inspection (first time or
/// after a failed one) moves the inspection to pending.
pub fn refresh_assignment(assignment: &mut RoomAssignment) {
    if assignment.status == AssignmentStatus::Cancelled {
        return;
    }
    let statuses: Vec<ActivityStatus> = assignment.activities.iter().map(|a| a.status).collect();
    assignment.completion_percentage = completion_percentage(&statuses);
    assignment.status = derive_status(&statuses);

    if assignment.status == AssignmentStatus::Completed
        && assignment.requires_inspection
        && matches!(
            assignment.inspection.state,
            InspectionState::NotStarted | InspectionState::Failed
        )
    {
        assignment.inspection.state = InspectionState::Pending;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;
    use ulid::Ulid;

    use ActivityStatus::{Completed as C, InProgress as I, Pending as P};

    fn assignment(statuses: &[ActivityStatus], requires_inspection: bool) -> RoomAssignment {
        let id = Ulid::new();
        RoomAssignment {
            id,
            room_id: Ulid::new(),
            assignment_date: NaiveDate::from_ymd_opt(2026, 1, 1).unwrap(),
            assignment_type: AssignmentType::DailyCleaning,
            status: AssignmentStatus::Pending,
            completion_percentage: 0,
            created_at: 0,
            requires_inspection,
            inspection: Inspection::new(),
            rework_count: 0,
            activities: statuses
                .iter()
                .enumerate()
                .map(|(i, s)| ActivityAssignment {
                    id: Ulid::new(),
                    room_assignment_id: id,
                    activity_name: format!("a{i}"),
                    assigned_to: None,
                    sequence_order: i as u32 + 1,
                    estimated_minutes: 5,
                    is_mandatory: true,
                    status: *s,
                    started_at: None,
                    completed_at: None,
                    time_taken_minutes: None,
                    issues_reported: Vec::new(),
                })
                .collect(),
        }
    }

    #[test]
    fn empty_set_is_zero() {
        assert_eq!(completion_percentage(&[]), 0);
        assert_eq!(derive_status(&[]), AssignmentStatus::Pending);
    }

    #[test]
    fn half_done() {
        assert_eq!(completion_percentage(&[C, C, P, P]), 50);
    }

    #[test]
    fn rounds_like_math_round() {
        assert_eq!(completion_percentage(&[C, P, P]), 33); // 33.33
        assert_eq!(completion_percentage(&[C, C, P]), 67); // 66.67
        assert_eq!(completion_percentage(&[C, P, P, P, P, P, P, P]), 13); // 12.5 rounds up
        assert_eq!(completion_percentage(&[C, C, C]), 100);
        assert_eq!(completion_percentage(&[I, P]), 0);
    }

    #[test]
    fn ordering_does_not_matter() {
        assert_eq!(
            completion_percentage(&[P, C, I, C]),
            completion_percentage(&[C, C, P, I])
        );
    }

    #[test]
    fn idempotent() {
        let set = [C, I, P, C, C];
        let first = completion_percentage(&set);
        let second = completion_percentage(&set);
        assert_eq!(first, second);
        assert_eq!(first, 60);
    }

    #[test]
    fn derived_status() {
        assert_eq!(derive_status(&[C, C, P, P]), AssignmentStatus::Pending);
        assert_eq!(derive_status(&[C, I, P]), AssignmentStatus::InProgress);
        assert_eq!(derive_status(&[C, C]), AssignmentStatus::Completed);
    }

    #[test]
    fn refresh_recomputes_from_children() {
        let mut a = assignment(&[C, C, I, P], false);
        a.completion_percentage = 99; // stale cache
        refresh_assignment(&mut a);
        assert_eq!(a.completion_percentage, 50);
        assert_eq!(a.status, AssignmentStatus::InProgress);
    }

    #[test]
    fn refresh_completion_opens_inspection() {
        let mut a = assignment(&[C, C], true);
        refresh_assignment(&mut a);
        assert_eq!(a.status, AssignmentStatus::Completed);
        assert_eq!(a.inspection.state, InspectionState::Pending);

        let mut b = assignment(&[C, C], false);
        refresh_assignment(&mut b);
        assert_eq!(b.inspection.state, InspectionState::NotStarted);
    }

    #[test]
    fn refresh_rework_reopens_inspection_only_on_completion() {
        let mut a = assignment(&[I, P], true);
        a.inspection.state = InspectionState::Failed;
        refresh_assignment(&mut a);
        assert_eq!(a.inspection.state, InspectionState::Failed);

        for act in &mut a.activities {
            act.status = C;
        }
        refresh_assignment(&mut a);
        assert_eq!(a.inspection.state, InspectionState::Pending);
    }

    #[test]
    fn refresh_leaves_cancelled_alone() {
        let mut a = assignment(&[C, C], false);
        a.status = AssignmentStatus::Cancelled;
        refresh_assignment(&mut a);
        assert_eq!(a.status, AssignmentStatus::Cancelled);
        assert_eq!(a.completion_percentage, 0);
    }
}
