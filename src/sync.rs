//! Live room board: one watch channel fed by the change feed and a poll tick.
//!
//! Any change on the four tables, a lagged receiver, or the poll tick re-derives the whole
//! board from the engine and publishes it. Bursts of changes are coalesced into one refresh.

use std::sync::Arc;
use std::time::Duration;

use futures::stream::{self, BoxStream, SelectAll};
use futures::{FutureExt, Stream, StreamExt};
use tokio::sync::broadcast::error::RecvError;
use tokio::sync::{broadcast, watch};
use tokio::time::MissedTickBehavior;

use crate::engine::Engine;
use crate::model::RoomBoardEntry;
use crate::notify::{Change, NotifyHub, Table};
use crate::observability;

pub type Board = Arc<Vec<RoomBoardEntry>>;

pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(15);

/// Handle on a running board sync. Cloning shares the same feed.
#[derive(Clone)]
pub struct BoardFeed {
    rx: watch::Receiver<Board>,
}

impl BoardFeed {
    pub fn subscribe(&self) -> watch::Receiver<Board> {
        self.rx.clone()
    }

    /// The latest published board.
    pub fn current(&self) -> Board {
        self.rx.borrow().clone()
    }

    /// The current board, then every board published after it.
    pub fn stream(&self) -> impl Stream<Item = Board> + Send + 'static {
        let mut rx = self.rx.clone();
        let first = rx.borrow_and_update().clone();
        stream::once(async move { first }).chain(stream::unfold(rx, |mut rx| async move {
            rx.changed().await.ok()?;
            let board = rx.borrow_and_update().clone();
            Some((board, rx))
        }))
    }
}

type ChangeStream = SelectAll<BoxStream<'static, Result<Change, RecvError>>>;

fn table_stream(rx: broadcast::Receiver<Change>) -> BoxStream<'static, Result<Change, RecvError>> {
    stream::unfold(rx, |mut rx| async move {
        match rx.recv().await {
            Err(RecvError::Closed) => None,
            item => Some((item, rx)),
        }
    })
    .boxed()
}

/// One merged stream over every table's change channel.
fn subscribe_all(hub: &NotifyHub) -> ChangeStream {
    stream::select_all(Table::ALL.map(|table| table_stream(hub.subscribe(table))))
}

/// Start syncing the board of `engine`. The task ends once every receiver is dropped.
pub fn spawn_board_sync(engine: Arc<Engine>, poll_interval: Duration) -> BoardFeed {
    let (tx, rx) = watch::channel(Board::default());
    let changes = subscribe_all(&engine.notify);
    tokio::spawn(run_board_sync(engine, changes, tx, poll_interval));
    BoardFeed { rx }
}

async fn refresh(engine: &Engine, tx: &watch::Sender<Board>, trigger: &'static str) {
    let board = engine.room_board().await;
    metrics::counter!(observability::BOARD_REFRESHES_TOTAL, "trigger" => trigger).increment(1);
    tracing::trace!("board refreshed ({trigger}): {} room(s)", board.len());
    tx.send_replace(Arc::new(board));
}

async fn run_board_sync(
    engine: Arc<Engine>,
    mut changes: ChangeStream,
    tx: watch::Sender<Board>,
    poll_interval: Duration,
) {
    let mut poll = tokio::time::interval(poll_interval);
    poll.set_missed_tick_behavior(MissedTickBehavior::Delay);
    // First tick completes immediately; the initial refresh below covers it.
    poll.tick().await;
    refresh(&engine, &tx, "startup").await;
    let mut feed_open = true;

    loop {
        let trigger = tokio::select! {
            _ = tx.closed() => break,
            _ = poll.tick() => "poll",
            change = changes.next(), if feed_open => match change {
                Some(Ok(_)) => "change",
                Some(Err(RecvError::Lagged(missed))) => {
                    tracing::warn!("board sync lagged by {missed} change(s); refreshing");
                    "lagged"
                }
                Some(Err(RecvError::Closed)) | None => {
                    tracing::warn!("change feed closed; board sync falls back to polling");
                    feed_open = false;
                    continue;
                }
            },
        };
        // Everything already queued is covered by this refresh
        while let Some(Some(_)) = changes.next().now_or_never() {}
        refresh(&engine, &tx, trigger).await;
    }
    tracing::debug!("board sync stopped: no subscribers left");
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    use ulid::Ulid;

    use crate::catalog::ActivityCatalog;
    use crate::model::DisplayStatus;

    fn test_wal_path(name: &str) -> PathBuf {
        let dir = std::env::temp_dir().join("roomops_test_sync");
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join(name);
        let _ = std::fs::remove_file(&path);
        path
    }

    fn engine(name: &str) -> Arc<Engine> {
        Arc::new(
            Engine::new(
                test_wal_path(name),
                Arc::new(NotifyHub::new()),
                Arc::new(ActivityCatalog::default()),
            )
            .unwrap(),
        )
    }

    async fn next_board(rx: &mut watch::Receiver<Board>) -> Board {
        tokio::time::timeout(Duration::from_secs(5), rx.changed())
            .await
            .expect("no board published")
            .unwrap();
        rx.borrow_and_update().clone()
    }

    #[tokio::test]
    async fn publishes_after_change() {
        let engine = engine("publish_change.wal");
        let feed = spawn_board_sync(engine.clone(), Duration::from_secs(3600));
        let mut rx = feed.subscribe();
        assert!(next_board(&mut rx).await.is_empty());

        let room = Ulid::new();
        engine.create_room(room, "101", 1).await.unwrap();
        let board = next_board(&mut rx).await;
        assert_eq!(board.len(), 1);
        assert_eq!(board[0].room_id, room);
        assert_eq!(board[0].display, DisplayStatus::Vacant);
        assert_eq!(feed.current(), board);
    }

    #[tokio::test]
    async fn poll_tick_republishes() {
        let engine = engine("poll_tick.wal");
        let feed = spawn_board_sync(engine, Duration::from_millis(50));
        let mut rx = feed.subscribe();
        next_board(&mut rx).await;
        // No commands at all: the tick alone publishes again
        next_board(&mut rx).await;
    }

    #[tokio::test]
    async fn stream_yields_current_then_updates() {
        let engine = engine("board_stream.wal");
        let feed = spawn_board_sync(engine.clone(), Duration::from_secs(3600));
        let mut rx = feed.subscribe();
        next_board(&mut rx).await;

        let mut boards = Box::pin(feed.stream());
        assert!(boards.next().await.unwrap().is_empty());
        engine.create_room(Ulid::new(), "7", 0).await.unwrap();
        let board = tokio::time::timeout(Duration::from_secs(5), boards.next())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(board.len(), 1);
    }

    #[tokio::test]
    async fn stops_when_all_receivers_dropped() {
        let engine = engine("sync_stop.wal");
        let (tx, rx) = watch::channel(Board::default());
        let changes = subscribe_all(&engine.notify);
        let task = tokio::spawn(run_board_sync(engine, changes, tx, Duration::from_secs(3600)));
        drop(rx);
        tokio::time::timeout(Duration::from_secs(5), task)
            .await
            .expect("sync task still running")
            .unwrap();
    }
}
