mod assignments;
mod conflict;
mod error;
mod inspection;
mod progress;
mod queries;
mod resolver;
mod rooms;
mod sessions;
mod store;

pub use assignments::NewAssignment;
pub use conflict::now_ms;
pub use error::{EngineError, Precondition};
pub use inspection::InspectionSubmission;
pub use progress::{completion_percentage, derive_status, refresh_assignment};
pub use resolver::{resolve, rfo_gate, settle};
pub use sessions::StartSession;
pub use store::{ActiveSession, InMemoryStore};

use std::future::Future;
use std::io;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;

use tokio::sync::{mpsc, oneshot, RwLock};
use ulid::Ulid;

use crate::catalog::ActivityCatalog;
use crate::model::*;
use crate::notify::NotifyHub;
use crate::observability;
use crate::wal::Wal;

use store::{apply_room_event, apply_staff_event};

pub type SharedRoomState = Arc<RwLock<RoomState>>;
pub type SharedStaffState = Arc<RwLock<StaffState>>;

/// Source of "now" for every command.
pub type Clock = Arc<dyn Fn() -> Ms + Send + Sync>;

// ── Group-commit WAL channel ─────────────────────────────

pub(super) enum WalCommand {
    Append {
        commit: Commit,
        response: oneshot::Sender<io::Result<()>>,
    },
    Compact {
        snapshot: Vec<Commit>,
        response: oneshot::Sender<io::Result<()>>,
    },
    AppendsSinceCompact {
        response: oneshot::Sender<u64>,
    },
}

/// Background task that owns the WAL and batches appends for group commit.
/// 1. Block until the first Append arrives.
/// 2. Buffer it (no fsync).
/// 3. Drain all immediately available Appends (the batch window).
/// 4. Single flush_sync for the whole batch.
/// 5. Respond to all senders.
async fn wal_writer_loop(mut wal: Wal, mut rx: mpsc::Receiver<WalCommand>) {
    while let Some(cmd) = rx.recv().await {
        match cmd {
            WalCommand::Append { commit, response } => {
                let mut batch = vec![(commit, response)];
                let mut deferred = None;

                loop {
                    match rx.try_recv() {
                        Ok(WalCommand::Append { commit, response }) => {
                            batch.push((commit, response));
                        }
                        Ok(other) => {
                            deferred = Some(other);
                            break;
                        }
                        Err(_) => break,
                    }
                }

                metrics::histogram!(observability::WAL_FLUSH_BATCH_SIZE).record(batch.len() as f64);
                let flush_start = Instant::now();
                let result = flush_batch(&mut wal, &batch);
                metrics::histogram!(observability::WAL_FLUSH_DURATION_SECONDS)
                    .record(flush_start.elapsed().as_secs_f64());
                if let Err(e) = &result {
                    tracing::error!("WAL flush of {} commit(s) failed: {e}", batch.len());
                }
                respond_batch(batch, &result);

                // Non-append commands run only after the batch ahead of them is durable
                if let Some(other) = deferred {
                    handle_non_append(&mut wal, other);
                }
            }
            other => handle_non_append(&mut wal, other),
        }
    }
}

fn flush_batch(wal: &mut Wal, batch: &[(Commit, oneshot::Sender<io::Result<()>>)]) -> io::Result<()> {
    let mut append_err: Option<io::Error> = None;
    for (commit, _) in batch {
        if let Err(e) = wal.append_buffered(commit) {
            append_err = Some(e);
            break;
        }
    }
    // Flush even after an append error so partially buffered bytes
    // don't leak into the next batch.
    let flush_err = wal.flush_sync().err();
    match (append_err, flush_err) {
        (Some(e), _) | (None, Some(e)) => Err(e),
        (None, None) => Ok(()),
    }
}

fn respond_batch(batch: Vec<(Commit, oneshot::Sender<io::Result<()>>)>, result: &io::Result<()>) {
    for (_, tx) in batch {
        let r = match result {
            Ok(()) => Ok(()),
            Err(e) => Err(io::Error::new(e.kind(), e.to_string())),
        };
        let _ = tx.send(r);
    }
}

fn handle_non_append(wal: &mut Wal, cmd: WalCommand) {
    match cmd {
        WalCommand::Compact { snapshot, response } => {
            let result = Wal::write_compact_file(wal.path(), &snapshot)
                .and_then(|()| wal.swap_compact_file());
            let _ = response.send(result);
        }
        WalCommand::AppendsSinceCompact { response } => {
            let _ = response.send(wal.appends_since_compact());
        }
        WalCommand::Append { commit, response } => {
            let result = wal.append_buffered(&commit).and_then(|()| wal.flush_sync());
            let _ = response.send(result);
        }
    }
}

/// The room-operations engine for one property.
///
/// Every command takes the locks it needs (staff before room), validates, appends one
/// [`Commit`] holding all of its events, then applies, indexes and notifies.
pub struct Engine {
    pub store: InMemoryStore,
    pub(super) wal_tx: mpsc::Sender<WalCommand>,
    pub notify: Arc<NotifyHub>,
    pub catalog: Arc<ActivityCatalog>,
    clock: Clock,
    /// Commands hold it shared for their whole duration; compaction holds it exclusively.
    write_gate: RwLock<()>,
}

fn system_clock() -> Clock {
    Arc::new(now_ms)
}

impl Engine {
    pub fn new(
        wal_path: PathBuf,
        notify: Arc<NotifyHub>,
        catalog: Arc<ActivityCatalog>,
    ) -> io::Result<Self> {
        Self::with_clock(wal_path, notify, catalog, system_clock())
    }

    pub fn with_clock(
        wal_path: PathBuf,
        notify: Arc<NotifyHub>,
        catalog: Arc<ActivityCatalog>,
        clock: Clock,
    ) -> io::Result<Self> {
        let commits = Wal::replay(&wal_path)?;
        let wal = Wal::open(&wal_path)?;
        let (wal_tx, wal_rx) = mpsc::channel(4096);
        tokio::spawn(wal_writer_loop(wal, wal_rx));

        let engine = Self {
            store: InMemoryStore::new(),
            wal_tx,
            notify,
            catalog,
            clock,
            write_gate: RwLock::new(()),
        };

        // Sole owner of every Arc during replay, so try_write never contends. Blocking
        // lock calls are off limits: this may run inside an async context.
        for commit in &commits {
            for event in &commit.events {
                engine.replay_event(event)?;
            }
        }
        tracing::debug!(
            "replayed {} commit(s) from {}: {} room(s)",
            commits.len(),
            wal_path.display(),
            engine.store.room_count()
        );

        Ok(engine)
    }

    fn replay_event(&self, event: &Event) -> io::Result<()> {
        let contended = || io::Error::other("replay: state unexpectedly locked");
        self.store.index_event(event);
        match event.target() {
            EventTarget::Room(room_id) => {
                if let Some(rs) = self.store.get_room(&room_id) {
                    let mut guard = rs.try_write().map_err(|_| contended())?;
                    apply_room_event(&mut guard, event);
                }
            }
            EventTarget::Staff(staff_id) => {
                let ss = self.store.staff_entry(staff_id);
                let mut guard = ss.try_write().map_err(|_| contended())?;
                apply_staff_event(&mut guard, event);
            }
        }
        Ok(())
    }

    pub fn now(&self) -> Ms {
        (self.clock)()
    }

    /// Write a commit to the WAL via the background group-commit writer.
    async fn wal_append(&self, commit: &Commit) -> Result<(), EngineError> {
        let (tx, rx) = oneshot::channel();
        self.wal_tx
            .send(WalCommand::Append {
                commit: commit.clone(),
                response: tx,
            })
            .await
            .map_err(|_| EngineError::WalError("WAL writer shut down".into()))?;
        rx.await
            .map_err(|_| EngineError::WalError("WAL writer dropped response".into()))?
            .map_err(|e| EngineError::WalError(e.to_string()))
    }

    /// Shared hold on the write gate; taken once at the top of every command.
    pub(super) async fn begin(&self) -> tokio::sync::RwLockReadGuard<'_, ()> {
        self.write_gate.read().await
    }

    /// Stage, gate, persist, apply, index and notify one command's events.
    ///
    /// The events are applied to copies first; the live state is replaced only after the
    /// WAL append succeeds. Any write of `vacant` is checked against the ready-for-occupation
    /// gate on the staged state.
    pub(super) async fn commit(
        &self,
        room: Option<&mut RoomState>,
        staff: Option<&mut StaffState>,
        events: Vec<Event>,
    ) -> Result<(), EngineError> {
        if events.is_empty() {
            return Ok(());
        }

        let staged_room = room.as_deref().map(|rs| {
            let mut staged = rs.clone();
            for event in &events {
                apply_room_event(&mut staged, event);
            }
            staged
        });
        let staged_staff = staff.as_deref().map(|ss| {
            let mut staged = ss.clone();
            for event in &events {
                apply_staff_event(&mut staged, event);
            }
            staged
        });

        let sets_vacant = events.iter().any(|e| {
            matches!(
                e,
                Event::RoomStatusChanged {
                    status: RoomStatus::Vacant,
                    ..
                }
            )
        });
        if sets_vacant
            && let Some(staged) = &staged_room
            && let Err(blocked) = rfo_gate(staged.room.id, staged.current_assignment())
        {
            metrics::counter!(observability::RFO_REJECTIONS_TOTAL).increment(1);
            tracing::debug!("rejected vacant for room {}: {blocked}", staged.room.room_number);
            return Err(blocked.into());
        }

        let commit = Commit {
            at: self.now(),
            events,
        };
        self.wal_append(&commit).await?;

        let room_after: Option<&RoomState> = match (room, staged_room) {
            (Some(live), Some(staged)) => {
                *live = staged;
                Some(&*live)
            }
            _ => None,
        };
        if let (Some(live), Some(staged)) = (staff, staged_staff) {
            *live = staged;
        }
        for event in &commit.events {
            self.store.index_event(event);
            self.notify.send(event, room_after);
        }
        Ok(())
    }

    pub(super) fn room_handle(&self, room_id: &Ulid) -> Result<SharedRoomState, EngineError> {
        self.store
            .get_room(room_id)
            .ok_or(EngineError::NotFound(*room_id))
    }

    /// Room handle for an assignment or activity id.
    pub(super) fn room_handle_for(&self, entity_id: &Ulid) -> Result<SharedRoomState, EngineError> {
        let room_id = self
            .store
            .room_for_entity(entity_id)
            .ok_or(EngineError::NotFound(*entity_id))?;
        self.room_handle(&room_id)
    }

    // ── Compaction ───────────────────────────────────────

    /// Rewrite the WAL as a snapshot of current state. Closed sessions that stopped before
    /// `session_cutoff` are dropped from memory and from the log. Returns how many were dropped.
    pub async fn compact_wal(&self, session_cutoff: Ms) -> Result<usize, EngineError> {
        let _exclusive = self.write_gate.write().await;
        let at = self.now();
        let mut snapshot = Vec::new();

        let mut rooms = Vec::new();
        for rs in self.store.room_states() {
            rooms.push(rs.read().await.clone());
        }
        rooms.sort_by_key(|rs| rs.room.id);
        for rs in rooms {
            let mut events = vec![Event::RoomCreated {
                id: rs.room.id,
                room_number: rs.room.room_number.clone(),
                floor: rs.room.floor,
                status: rs.room.status,
                occupancy: rs.room.occupancy,
            }];
            events.extend(
                rs.assignments
                    .into_iter()
                    .map(|assignment| Event::AssignmentRestored { assignment }),
            );
            snapshot.push(Commit { at, events });
        }

        let mut dropped = 0;
        for ss in self.store.staff_states() {
            let mut guard = ss.write().await;
            let before = guard.sessions.len();
            let mut expired = Vec::new();
            guard.sessions.retain(|s| {
                let keep = s.is_active() || s.stopped_at.is_some_and(|t| t >= session_cutoff);
                if !keep {
                    expired.push(s.id);
                }
                keep
            });
            dropped += before - guard.sessions.len();
            for id in &expired {
                self.store.forget_session(id);
            }
            if !guard.sessions.is_empty() {
                snapshot.push(Commit {
                    at,
                    events: guard
                        .sessions
                        .iter()
                        .map(|s| Event::SessionRestored { session: s.clone() })
                        .collect(),
                });
            }
        }

        let (tx, rx) = oneshot::channel();
        self.wal_tx
            .send(WalCommand::Compact {
                snapshot,
                response: tx,
            })
            .await
            .map_err(|_| EngineError::WalError("WAL writer shut down".into()))?;
        rx.await
            .map_err(|_| EngineError::WalError("WAL writer dropped response".into()))?
            .map_err(|e| EngineError::WalError(e.to_string()))?;

        metrics::counter!(observability::WAL_COMPACTIONS_TOTAL).increment(1);
        tracing::info!("WAL compacted; dropped {dropped} expired session(s)");
        Ok(dropped)
    }

    pub async fn wal_appends_since_compact(&self) -> u64 {
        let (tx, rx) = oneshot::channel();
        if self
            .wal_tx
            .send(WalCommand::AppendsSinceCompact { response: tx })
            .await
            .is_err()
        {
            return 0;
        }
        rx.await.unwrap_or(0)
    }
}

/// Run one command future, logging a rejection and recording its outcome.
pub(super) async fn instrumented<T>(
    command: &'static str,
    fut: impl Future<Output = Result<T, EngineError>>,
) -> Result<T, EngineError> {
    let started = Instant::now();
    let result = fut.await;
    if let Err(e) = &result {
        match e {
            EngineError::WalError(_) => tracing::warn!(command, "command failed: {e}"),
            _ => tracing::debug!(command, "command rejected: {e}"),
        }
    }
    observability::record_command(command, started, &result);
    result
}
