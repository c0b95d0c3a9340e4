use std::io;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use dashmap::DashMap;
use dashmap::mapref::entry::Entry;

use crate::catalog::ActivityCatalog;
use crate::compactor;
use crate::engine::Engine;
use crate::limits::*;
use crate::model::Ms;
use crate::notify::NotifyHub;
use crate::sync::{self, BoardFeed};

/// Per-property background settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PropertySettings {
    pub compact_threshold: u64,
    pub session_retention_ms: Ms,
    pub poll_interval: Duration,
}

impl Default for PropertySettings {
    fn default() -> Self {
        Self {
            compact_threshold: 1000,
            session_retention_ms: DEFAULT_SESSION_RETENTION_MS,
            poll_interval: sync::DEFAULT_POLL_INTERVAL,
        }
    }
}

/// One hotel property: its engine and live board.
#[derive(Clone)]
pub struct Property {
    pub name: String,
    pub engine: Arc<Engine>,
    pub board: BoardFeed,
}

/// Manages per-property engines. Each property gets its own Engine + WAL + compactor +
/// board sync, sharing one activity catalog.
pub struct PropertyManager {
    properties: DashMap<String, Property>,
    data_dir: PathBuf,
    catalog: Arc<ActivityCatalog>,
    settings: PropertySettings,
}

impl PropertyManager {
    pub fn new(data_dir: PathBuf, catalog: Arc<ActivityCatalog>, settings: PropertySettings) -> Self {
        Self {
            properties: DashMap::new(),
            data_dir,
            catalog,
            settings,
        }
    }

    pub fn len(&self) -> usize {
        self.properties.len()
    }

    pub fn is_empty(&self) -> bool {
        self.properties.is_empty()
    }

    /// Get or lazily open the property with the given name.
    pub fn get_or_create(&self, name: &str) -> io::Result<Property> {
        if let Some(property) = self.properties.get(name) {
            return Ok(property.value().clone());
        }
        if name.len() > MAX_PROPERTY_NAME_LEN {
            return Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                "property name too long",
            ));
        }
        if self.properties.len() >= MAX_PROPERTIES {
            return Err(io::Error::other("too many properties"));
        }

        // Sanitize property name to prevent path traversal
        let safe_name: String = name
            .chars()
            .filter(|c| c.is_alphanumeric() || *c == '_' || *c == '-')
            .collect();
        if safe_name.is_empty() {
            return Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                "empty property name",
            ));
        }

        let slot = match self.properties.entry(name.to_string()) {
            Entry::Occupied(existing) => return Ok(existing.get().clone()),
            Entry::Vacant(slot) => slot,
        };

        let wal_path = self.data_dir.join(format!("{safe_name}.wal"));
        let notify = Arc::new(NotifyHub::new());
        let engine = Arc::new(Engine::new(wal_path, notify, self.catalog.clone())?);

        let compactor_engine = engine.clone();
        let threshold = self.settings.compact_threshold;
        let retention = self.settings.session_retention_ms;
        tokio::spawn(async move {
            compactor::run_compactor(compactor_engine, threshold, retention).await;
        });
        let board = sync::spawn_board_sync(engine.clone(), self.settings.poll_interval);

        let property = Property {
            name: name.to_string(),
            engine,
            board,
        };
        slot.insert(property.clone());
        tracing::info!("opened property {name}");
        metrics::gauge!(crate::observability::PROPERTIES_ACTIVE).set(self.properties.len() as f64);
        Ok(property)
    }
}
