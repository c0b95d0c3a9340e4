use crate::model::Ms;

pub const MAX_ROOMS_PER_PROPERTY: usize = 10_000;
pub const MAX_ROOM_NUMBER_LEN: usize = 32;
pub const MAX_ACTIVITIES_PER_ASSIGNMENT: usize = 64;
pub const MAX_ACTIVITY_NAME_LEN: usize = 128;
pub const MAX_ISSUES_PER_ACTIVITY: usize = 32;
pub const MAX_ISSUE_LEN: usize = 1024;
pub const MAX_NOTES_LEN: usize = 4096;
pub const MAX_CHECKLIST_ITEMS: usize = 128;
pub const MAX_CHECKLIST_LABEL_LEN: usize = 256;
pub const MAX_BULK_ASSIGNMENTS: usize = 1_000;
pub const MAX_PROPERTIES: usize = 1_000;
pub const MAX_PROPERTY_NAME_LEN: usize = 128;

/// Closed sessions younger than this survive compaction (7 days).
pub const DEFAULT_SESSION_RETENTION_MS: Ms = 7 * 24 * 3_600_000;
