//! Activity catalog: the ordered housekeeping steps required for each task type.
//!
//! Read-mostly reference data. The assigner fans a template out into activity rows; the
//! inspector derives its checklist from the same template.

use std::collections::HashSet;
use std::path::Path;

use serde::{Deserialize, Serialize};
use ulid::Ulid;

use crate::limits::*;
use crate::model::{ActivitySeed, AssignmentType};

#[derive(Debug, thiserror::Error)]
pub enum CatalogError {
    #[error("cannot read catalog {path}: {source}")]
    Io {
        path: String,
        source: std::io::Error,
    },
    #[error("malformed catalog: {0}")]
    Parse(#[from] serde_json::Error),
    #[error("invalid catalog: {0}")]
    Invalid(String),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HousekeepingActivity {
    pub name: String,
    pub sequence_order: u32,
    pub estimated_minutes: u32,
    #[serde(default = "default_mandatory")]
    pub is_mandatory: bool,
}

fn default_mandatory() -> bool {
    true
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskTemplate {
    pub assignment_type: AssignmentType,
    #[serde(default)]
    pub requires_inspection: bool,
    pub activities: Vec<HousekeepingActivity>,
}

impl TaskTemplate {
    /// Activity rows for a new assignment, in sequence order, all assigned to `assigned_to`.
    pub fn seeds(&self, assigned_to: Option<Ulid>) -> Vec<ActivitySeed> {
        let mut seeds: Vec<ActivitySeed> = self
            .activities
            .iter()
            .map(|a| ActivitySeed {
                id: Ulid::new(),
                name: a.name.clone(),
                sequence_order: a.sequence_order,
                estimated_minutes: a.estimated_minutes,
                is_mandatory: a.is_mandatory,
                assigned_to,
            })
            .collect();
        seeds.sort_by_key(|s| s.sequence_order);
        seeds
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActivityCatalog {
    pub templates: Vec<TaskTemplate>,
}

impl ActivityCatalog {
    pub fn new(templates: Vec<TaskTemplate>) -> Result<Self, CatalogError> {
        let catalog = Self { templates };
        catalog.validate()?;
        Ok(catalog)
    }

    pub fn from_json(json: &str) -> Result<Self, CatalogError> {
        let catalog: ActivityCatalog = serde_json::from_str(json)?;
        catalog.validate()?;
        Ok(catalog)
    }

    pub fn load(path: &Path) -> Result<Self, CatalogError> {
        let json = std::fs::read_to_string(path).map_err(|source| CatalogError::Io {
            path: path.display().to_string(),
            source,
        })?;
        Self::from_json(&json)
    }

    pub fn template(&self, assignment_type: AssignmentType) -> Option<&TaskTemplate> {
        self.templates
            .iter()
            .find(|t| t.assignment_type == assignment_type)
    }

    fn validate(&self) -> Result<(), CatalogError> {
        let mut types = HashSet::new();
        for t in &self.templates {
            if !types.insert(t.assignment_type) {
                return Err(CatalogError::Invalid(format!(
                    "duplicate template for {}",
                    t.assignment_type
                )));
            }
            if t.activities.is_empty() {
                return Err(CatalogError::Invalid(format!(
                    "template {} has no activities",
                    t.assignment_type
                )));
            }
            if t.activities.len() > MAX_ACTIVITIES_PER_ASSIGNMENT {
                return Err(CatalogError::Invalid(format!(
                    "template {} has too many activities",
                    t.assignment_type
                )));
            }
            let mut orders = HashSet::new();
            for a in &t.activities {
                if a.name.trim().is_empty() || a.name.len() > MAX_ACTIVITY_NAME_LEN {
                    return Err(CatalogError::Invalid(format!(
                        "template {} has an activity with an invalid name",
                        t.assignment_type
                    )));
                }
                if !orders.insert(a.sequence_order) {
                    return Err(CatalogError::Invalid(format!(
                        "template {} repeats sequence_order {}",
                        t.assignment_type, a.sequence_order
                    )));
                }
            }
        }
        Ok(())
    }
}

fn step(name: &str, sequence_order: u32, estimated_minutes: u32, is_mandatory: bool) -> HousekeepingActivity {
    HousekeepingActivity {
        name: name.to_string(),
        sequence_order,
        estimated_minutes,
        is_mandatory,
    }
}

impl Default for ActivityCatalog {
    fn default() -> Self {
        Self {
            templates: vec![
                TaskTemplate {
                    assignment_type: AssignmentType::DailyCleaning,
                    requires_inspection: false,
                    activities: vec![
                        step("Make bed", 1, 5, true),
                        step("Clean bathroom", 2, 10, true),
                        step("Dust surfaces", 3, 5, false),
                        step("Vacuum floor", 4, 5, true),
                        step("Restock amenities", 5, 3, true),
                    ],
                },
                TaskTemplate {
                    assignment_type: AssignmentType::CheckoutClean,
                    requires_inspection: true,
                    activities: vec![
                        step("Strip linen", 1, 5, true),
                        step("Remove trash", 2, 2, true),
                        step("Clean bathroom", 3, 15, true),
                        step("Make bed", 4, 7, true),
                        step("Dust surfaces", 5, 5, true),
                        step("Vacuum floor", 6, 8, true),
                        step("Restock amenities", 7, 3, true),
                        step("Check minibar", 8, 2, false),
                    ],
                },
                TaskTemplate {
                    assignment_type: AssignmentType::DeepClean,
                    requires_inspection: true,
                    activities: vec![
                        step("Strip linen", 1, 5, true),
                        step("Wash windows", 2, 20, true),
                        step("Shampoo carpet", 3, 30, true),
                        step("Descale bathroom", 4, 25, true),
                        step("Clean vents", 5, 15, false),
                        step("Make bed", 6, 7, true),
                    ],
                },
                TaskTemplate {
                    assignment_type: AssignmentType::Turndown,
                    requires_inspection: false,
                    activities: vec![
                        step("Turn down bed", 1, 3, true),
                        step("Replace towels", 2, 2, true),
                        step("Close curtains", 3, 1, false),
                    ],
                },
                TaskTemplate {
                    assignment_type: AssignmentType::Maintenance,
                    requires_inspection: true,
                    activities: vec![
                        step("Diagnose fault", 1, 15, true),
                        step("Repair", 2, 45, true),
                        step("Test fix", 3, 10, true),
                        step("Clean work area", 4, 10, true),
                    ],
                },
            ],
        }
    }
}
