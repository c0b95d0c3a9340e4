use std::fmt;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use ulid::Ulid;

/// Unix milliseconds — the only instant type.
pub type Ms = i64;

pub const MINUTE_MS: Ms = 60_000;

/// Whole minutes between two instants, rounded half up. Negative spans count as zero.
pub fn minutes_between(start: Ms, end: Ms) -> u32 {
    let elapsed = (end - start).max(0);
    ((elapsed + MINUTE_MS / 2) / MINUTE_MS) as u32
}

// ── Enumerations ─────────────────────────────────────────────────

/// Housekeeping status stored on the room row.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RoomStatus {
    Vacant,
    Occupied,
    Cleaning,
    Maintenance,
    OutOfOrder,
}

/// Guest presence, maintained by the front desk. Independent of [`RoomStatus`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Occupancy {
    Vacant,
    Occupied,
    Reserved,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AssignmentType {
    DailyCleaning,
    DeepClean,
    Turndown,
    CheckoutClean,
    Maintenance,
}

impl AssignmentType {
    pub fn is_maintenance(self) -> bool {
        matches!(self, AssignmentType::Maintenance)
    }

    /// Room status while work of this type is under way.
    pub fn working_status(self) -> RoomStatus {
        if self.is_maintenance() {
            RoomStatus::Maintenance
        } else {
            RoomStatus::Cleaning
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            AssignmentType::DailyCleaning => "daily_cleaning",
            AssignmentType::DeepClean => "deep_clean",
            AssignmentType::Turndown => "turndown",
            AssignmentType::CheckoutClean => "checkout_clean",
            AssignmentType::Maintenance => "maintenance",
        }
    }
}

impl fmt::Display for AssignmentType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AssignmentStatus {
    Pending,
    InProgress,
    Completed,
    Cancelled,
}

impl fmt::Display for AssignmentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            AssignmentStatus::Pending => "pending",
            AssignmentStatus::InProgress => "in_progress",
            AssignmentStatus::Completed => "completed",
            AssignmentStatus::Cancelled => "cancelled",
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActivityStatus {
    Pending,
    InProgress,
    Completed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionStatus {
    InProgress,
    Completed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InspectionState {
    NotStarted,
    Pending,
    Passed,
    Failed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InspectionResult {
    Passed,
    Failed,
}

impl InspectionResult {
    pub fn as_str(self) -> &'static str {
        match self {
            InspectionResult::Passed => "passed",
            InspectionResult::Failed => "failed",
        }
    }
}

/// What a dashboard shows for a room. Produced only by the resolver.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DisplayStatus {
    Vacant,
    Occupied,
    Reserved,
    PendingInspection,
    FailedInspection,
    CleaningInProgress,
    UnderMaintenance,
    Clean,
    NeedsCleaning,
}

impl DisplayStatus {
    pub fn label(self) -> &'static str {
        match self {
            DisplayStatus::Vacant => "Vacant",
            DisplayStatus::Occupied => "Occupied",
            DisplayStatus::Reserved => "Reserved",
            DisplayStatus::PendingInspection => "Pending Inspection",
            DisplayStatus::FailedInspection => "Failed Inspection",
            DisplayStatus::CleaningInProgress => "Cleaning In Progress",
            DisplayStatus::UnderMaintenance => "Under Maintenance",
            DisplayStatus::Clean => "Clean",
            DisplayStatus::NeedsCleaning => "Needs Cleaning",
        }
    }
}

impl From<Occupancy> for DisplayStatus {
    fn from(occupancy: Occupancy) -> Self {
        match occupancy {
            Occupancy::Vacant => DisplayStatus::Vacant,
            Occupancy::Occupied => DisplayStatus::Occupied,
            Occupancy::Reserved => DisplayStatus::Reserved,
        }
    }
}

impl fmt::Display for DisplayStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

// ── Rows ─────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Room {
    pub id: Ulid,
    pub room_number: String,
    pub floor: i32,
    pub status: RoomStatus,
    pub occupancy: Occupancy,
}

/// One ordered step of a room assignment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActivityAssignment {
    pub id: Ulid,
    pub room_assignment_id: Ulid,
    pub activity_name: String,
    pub assigned_to: Option<Ulid>,
    pub sequence_order: u32,
    pub estimated_minutes: u32,
    pub is_mandatory: bool,
    pub status: ActivityStatus,
    pub started_at: Option<Ms>,
    pub completed_at: Option<Ms>,
    pub time_taken_minutes: Option<u32>,
    pub issues_reported: Vec<String>,
}

impl ActivityAssignment {
    /// Move to in-progress. Keeps the original `started_at` when resuming.
    pub fn start(&mut self, staff_id: Ulid, at: Ms) {
        if self.status == ActivityStatus::Completed {
            return;
        }
        self.status = ActivityStatus::InProgress;
        self.started_at.get_or_insert(at);
        self.assigned_to.get_or_insert(staff_id);
    }

    /// Move to completed and derive `time_taken_minutes`.
    /// An activity completed without ever being started counts as started at completion.
    pub fn complete(&mut self, at: Ms) {
        if self.status == ActivityStatus::Completed {
            return;
        }
        let started = *self.started_at.get_or_insert(at);
        self.status = ActivityStatus::Completed;
        self.completed_at = Some(at);
        self.time_taken_minutes = Some(minutes_between(started, at));
    }

    /// Back to pending after a failed inspection. Reported issues are kept.
    pub fn reopen(&mut self) {
        self.status = ActivityStatus::Pending;
        self.started_at = None;
        self.completed_at = None;
        self.time_taken_minutes = None;
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChecklistItem {
    pub label: String,
    pub required: bool,
    pub checked: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InspectionRecord {
    pub inspector_id: Ulid,
    pub result: InspectionResult,
    pub checklist: Vec<ChecklistItem>,
    pub notes: Option<String>,
    pub inspected_at: Ms,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Inspection {
    pub state: InspectionState,
    /// Every record ever submitted, oldest first.
    pub history: Vec<InspectionRecord>,
}

impl Inspection {
    pub fn new() -> Self {
        Self {
            state: InspectionState::NotStarted,
            history: Vec::new(),
        }
    }
}

impl Default for Inspection {
    fn default() -> Self {
        Self::new()
    }
}

/// One cleaning or maintenance cycle for a room on a given date.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoomAssignment {
    pub id: Ulid,
    pub room_id: Ulid,
    pub assignment_date: NaiveDate,
    pub assignment_type: AssignmentType,
    pub status: AssignmentStatus,
    /// Cached; recomputed from `activities` after every child change.
    pub completion_percentage: u8,
    pub created_at: Ms,
    pub requires_inspection: bool,
    pub inspection: Inspection,
    pub rework_count: u32,
    /// Sorted by `sequence_order`.
    pub activities: Vec<ActivityAssignment>,
}

impl RoomAssignment {
    pub fn activity(&self, id: &Ulid) -> Option<&ActivityAssignment> {
        self.activities.iter().find(|a| a.id == *id)
    }

    pub fn activity_mut(&mut self, id: &Ulid) -> Option<&mut ActivityAssignment> {
        self.activities.iter_mut().find(|a| a.id == *id)
    }

    /// Neither completed nor cancelled.
    pub fn is_open(&self) -> bool {
        !matches!(
            self.status,
            AssignmentStatus::Completed | AssignmentStatus::Cancelled
        )
    }

    /// Completed and not waiting on (or failed by) an inspection.
    pub fn is_ready(&self) -> bool {
        self.status == AssignmentStatus::Completed
            && !matches!(
                self.inspection.state,
                InspectionState::Pending | InspectionState::Failed
            )
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkSession {
    pub id: Ulid,
    pub staff_id: Ulid,
    pub room_id: Ulid,
    pub activity_id: Ulid,
    pub started_at: Ms,
    pub stopped_at: Option<Ms>,
    pub status: SessionStatus,
    /// Closed by a confirmed force-close rather than by its owner.
    pub forced: bool,
}

impl WorkSession {
    pub fn is_active(&self) -> bool {
        self.status == SessionStatus::InProgress
    }

    pub fn close(&mut self, at: Ms, forced: bool) {
        if !self.is_active() {
            return;
        }
        self.status = SessionStatus::Completed;
        self.stopped_at = Some(at);
        self.forced = forced;
    }
}

// ── Locked state units ───────────────────────────────────────────

/// Everything that belongs to one room: the row plus its assignments and their activities.
#[derive(Debug, Clone)]
pub struct RoomState {
    pub room: Room,
    /// Insertion order, which is creation order.
    pub assignments: Vec<RoomAssignment>,
}

impl RoomState {
    pub fn new(room: Room) -> Self {
        Self {
            room,
            assignments: Vec::new(),
        }
    }

    /// The non-cancelled assignment with the latest `created_at`; ties go to the larger id.
    pub fn current_assignment(&self) -> Option<&RoomAssignment> {
        self.assignments
            .iter()
            .filter(|a| a.status != AssignmentStatus::Cancelled)
            .max_by_key(|a| (a.created_at, a.id))
    }

    pub fn assignment(&self, id: &Ulid) -> Option<&RoomAssignment> {
        self.assignments.iter().find(|a| a.id == *id)
    }

    pub fn assignment_mut(&mut self, id: &Ulid) -> Option<&mut RoomAssignment> {
        self.assignments.iter_mut().find(|a| a.id == *id)
    }

    /// Find an activity and the assignment that owns it.
    pub fn find_activity(&self, activity_id: &Ulid) -> Option<(&RoomAssignment, &ActivityAssignment)> {
        self.assignments
            .iter()
            .find_map(|a| a.activity(activity_id).map(|act| (a, act)))
    }

    pub fn find_activity_mut(&mut self, activity_id: &Ulid) -> Option<&mut RoomAssignment> {
        self.assignments
            .iter_mut()
            .find(|a| a.activities.iter().any(|act| act.id == *activity_id))
    }

    /// Non-cancelled assignment for the given date, if any.
    pub fn open_assignment_on(&self, date: NaiveDate) -> Option<&RoomAssignment> {
        self.assignments
            .iter()
            .find(|a| a.assignment_date == date && a.status != AssignmentStatus::Cancelled)
    }
}

/// Work sessions of one staff member.
#[derive(Debug, Clone)]
pub struct StaffState {
    pub staff_id: Ulid,
    /// Creation order.
    pub sessions: Vec<WorkSession>,
}

impl StaffState {
    pub fn new(staff_id: Ulid) -> Self {
        Self {
            staff_id,
            sessions: Vec::new(),
        }
    }

    pub fn active_sessions(&self) -> impl Iterator<Item = &WorkSession> {
        self.sessions.iter().filter(|s| s.is_active())
    }

    pub fn session(&self, id: &Ulid) -> Option<&WorkSession> {
        self.sessions.iter().find(|s| s.id == *id)
    }

    pub fn session_mut(&mut self, id: &Ulid) -> Option<&mut WorkSession> {
        self.sessions.iter_mut().find(|s| s.id == *id)
    }
}

// ── WAL record format ────────────────────────────────────────────

/// Template data for one activity row created with its assignment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActivitySeed {
    pub id: Ulid,
    pub name: String,
    pub sequence_order: u32,
    pub estimated_minutes: u32,
    pub is_mandatory: bool,
    pub assigned_to: Option<Ulid>,
}

/// The event types — flat, no nesting except the snapshot variants written by compaction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Event {
    RoomCreated {
        id: Ulid,
        room_number: String,
        floor: i32,
        status: RoomStatus,
        occupancy: Occupancy,
    },
    RoomStatusChanged {
        id: Ulid,
        status: RoomStatus,
    },
    OccupancyChanged {
        id: Ulid,
        occupancy: Occupancy,
    },
    RoomDeleted {
        id: Ulid,
    },
    AssignmentCreated {
        id: Ulid,
        room_id: Ulid,
        assignment_date: NaiveDate,
        assignment_type: AssignmentType,
        created_at: Ms,
        requires_inspection: bool,
        activities: Vec<ActivitySeed>,
    },
    AssignmentCancelled {
        id: Ulid,
        room_id: Ulid,
    },
    AssignmentRestored {
        assignment: RoomAssignment,
    },
    ActivityStarted {
        id: Ulid,
        room_id: Ulid,
        staff_id: Ulid,
        at: Ms,
    },
    ActivityCompleted {
        id: Ulid,
        room_id: Ulid,
        at: Ms,
    },
    ActivityReassigned {
        id: Ulid,
        room_id: Ulid,
        staff_id: Ulid,
    },
    IssueReported {
        id: Ulid,
        room_id: Ulid,
        issue: String,
    },
    InspectionRecorded {
        assignment_id: Ulid,
        room_id: Ulid,
        record: InspectionRecord,
    },
    SessionOpened {
        id: Ulid,
        staff_id: Ulid,
        room_id: Ulid,
        activity_id: Ulid,
        at: Ms,
    },
    SessionClosed {
        id: Ulid,
        staff_id: Ulid,
        at: Ms,
        forced: bool,
    },
    SessionRestored {
        session: WorkSession,
    },
}

/// Which locked state unit an event applies to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventTarget {
    Room(Ulid),
    Staff(Ulid),
}

impl Event {
    pub fn target(&self) -> EventTarget {
        match self {
            Event::RoomCreated { id, .. }
            | Event::RoomStatusChanged { id, .. }
            | Event::OccupancyChanged { id, .. }
            | Event::RoomDeleted { id } => EventTarget::Room(*id),
            Event::AssignmentCreated { room_id, .. }
            | Event::AssignmentCancelled { room_id, .. }
            | Event::ActivityStarted { room_id, .. }
            | Event::ActivityCompleted { room_id, .. }
            | Event::ActivityReassigned { room_id, .. }
            | Event::IssueReported { room_id, .. }
            | Event::InspectionRecorded { room_id, .. } => EventTarget::Room(*room_id),
            Event::AssignmentRestored { assignment } => EventTarget::Room(assignment.room_id),
            Event::SessionOpened { staff_id, .. } | Event::SessionClosed { staff_id, .. } => {
                EventTarget::Staff(*staff_id)
            }
            Event::SessionRestored { session } => EventTarget::Staff(session.staff_id),
        }
    }
}

/// One WAL entry: every event produced by a single command, applied all-or-nothing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Commit {
    pub at: Ms,
    pub events: Vec<Event>,
}

// ── Query result types ───────────────────────────────────────────

/// One row of the live room board.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RoomBoardEntry {
    pub room_id: Ulid,
    pub room_number: String,
    pub floor: i32,
    pub status: RoomStatus,
    pub occupancy: Occupancy,
    pub display: DisplayStatus,
    pub assignment_id: Option<Ulid>,
    pub assignment_type: Option<AssignmentType>,
    pub completion_percentage: u8,
    /// Staff with an open session in this room.
    pub active_staff: Vec<Ulid>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionStarted {
    pub session_id: Ulid,
    /// Sessions force-closed to make room for this one.
    pub closed: Vec<Ulid>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionStopped {
    pub session_id: Ulid,
    pub activity_id: Ulid,
    pub time_taken_minutes: Option<u32>,
    pub assignment_status: AssignmentStatus,
    pub completion_percentage: u8,
    pub room_status: RoomStatus,
}
