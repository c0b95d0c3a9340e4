use dashmap::DashMap;
use tokio::sync::broadcast;
use ulid::Ulid;

use crate::model::{Event, InspectionResult, RoomState};

const CHANNEL_CAPACITY: usize = 256;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Table {
    Rooms,
    RoomAssignments,
    ActivityAssignments,
    WorkSessions,
}

impl Table {
    pub const ALL: [Table; 4] = [
        Table::Rooms,
        Table::RoomAssignments,
        Table::ActivityAssignments,
        Table::WorkSessions,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Table::Rooms => "rooms",
            Table::RoomAssignments => "room_assignments",
            Table::ActivityAssignments => "activity_assignments",
            Table::WorkSessions => "work_sessions",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChangeOp {
    Insert,
    Update,
    Delete,
}

/// "Something changed" — consumers must re-query; the id is a hint only.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Change {
    pub table: Table,
    pub op: ChangeOp,
    pub id: Ulid,
}

impl Change {
    fn new(table: Table, op: ChangeOp, id: Ulid) -> Self {
        Change { table, op, id }
    }

    /// The row-level changes an applied event represents.
    ///
    /// Events that insert or reset child rows report each activity row as well. `room` is
    /// the room state after the event; it names the activities a failed inspection reopened.
    pub fn of(event: &Event, room: Option<&RoomState>) -> Vec<Change> {
        match event {
            Event::RoomCreated { id, .. } => vec![Change::new(Table::Rooms, ChangeOp::Insert, *id)],
            Event::RoomStatusChanged { id, .. } | Event::OccupancyChanged { id, .. } => {
                vec![Change::new(Table::Rooms, ChangeOp::Update, *id)]
            }
            Event::RoomDeleted { id } => vec![Change::new(Table::Rooms, ChangeOp::Delete, *id)],
            Event::AssignmentCreated { id, activities, .. } => {
                let mut changes = vec![Change::new(Table::RoomAssignments, ChangeOp::Insert, *id)];
                changes.extend(
                    activities
                        .iter()
                        .map(|seed| Change::new(Table::ActivityAssignments, ChangeOp::Insert, seed.id)),
                );
                changes
            }
            Event::AssignmentRestored { assignment } => {
                let mut changes = vec![Change::new(
                    Table::RoomAssignments,
                    ChangeOp::Insert,
                    assignment.id,
                )];
                changes.extend(
                    assignment
                        .activities
                        .iter()
                        .map(|a| Change::new(Table::ActivityAssignments, ChangeOp::Insert, a.id)),
                );
                changes
            }
            Event::AssignmentCancelled { id, .. } => {
                vec![Change::new(Table::RoomAssignments, ChangeOp::Update, *id)]
            }
            Event::InspectionRecorded {
                assignment_id,
                record,
                ..
            } => {
                let mut changes = vec![Change::new(
                    Table::RoomAssignments,
                    ChangeOp::Update,
                    *assignment_id,
                )];
                if record.result == InspectionResult::Failed
                    && let Some(assignment) = room.and_then(|rs| rs.assignment(assignment_id))
                {
                    changes.extend(
                        assignment
                            .activities
                            .iter()
                            .map(|a| Change::new(Table::ActivityAssignments, ChangeOp::Update, a.id)),
                    );
                }
                changes
            }
            Event::ActivityStarted { id, .. }
            | Event::ActivityCompleted { id, .. }
            | Event::ActivityReassigned { id, .. }
            | Event::IssueReported { id, .. } => {
                vec![Change::new(Table::ActivityAssignments, ChangeOp::Update, *id)]
            }
            Event::SessionOpened { id, .. } => {
                vec![Change::new(Table::WorkSessions, ChangeOp::Insert, *id)]
            }
            Event::SessionRestored { session } => {
                vec![Change::new(Table::WorkSessions, ChangeOp::Insert, session.id)]
            }
            Event::SessionClosed { id, .. } => {
                vec![Change::new(Table::WorkSessions, ChangeOp::Update, *id)]
            }
        }
    }
}

/// Broadcast hub for row-change notifications, one channel per table.
pub struct NotifyHub {
    channels: DashMap<Table, broadcast::Sender<Change>>,
}

impl Default for NotifyHub {
    fn default() -> Self {
        Self::new()
    }
}

impl NotifyHub {
    pub fn new() -> Self {
        Self {
            channels: DashMap::new(),
        }
    }

    /// Subscribe to changes on a table. Creates the channel if needed.
    pub fn subscribe(&self, table: Table) -> broadcast::Receiver<Change> {
        let sender = self
            .channels
            .entry(table)
            .or_insert_with(|| broadcast::channel(CHANNEL_CAPACITY).0);
        sender.subscribe()
    }

    /// Publish the changes for an applied event. No-op for tables nobody listens to.
    pub fn send(&self, event: &Event, room: Option<&RoomState>) {
        for change in Change::of(event, room) {
            if let Some(sender) = self.channels.get(&change.table) {
                let _ = sender.send(change);
            }
        }
    }
}
