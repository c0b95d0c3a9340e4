use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::NaiveDate;
use ulid::Ulid;

use roomops::catalog::ActivityCatalog;
use roomops::engine::{Engine, NewAssignment, StartSession};
use roomops::model::{AssignmentType, RoomAssignment};
use roomops::notify::NotifyHub;

const ROOMS: usize = 200;

fn percentile(sorted: &[Duration], p: f64) -> Duration {
    if sorted.is_empty() {
        return Duration::ZERO;
    }
    let idx = ((sorted.len() as f64) * p / 100.0) as usize;
    sorted[idx.min(sorted.len() - 1)]
}

fn print_latency(label: &str, latencies: &mut [Duration]) {
    if latencies.is_empty() {
        return;
    }
    latencies.sort();
    let total: Duration = latencies.iter().sum();
    let avg = total / latencies.len() as u32;
    println!("  {label}:");
    println!(
        "    n={}, avg={:.2}ms, p50={:.2}ms, p95={:.2}ms, p99={:.2}ms, max={:.2}ms",
        latencies.len(),
        avg.as_secs_f64() * 1000.0,
        percentile(latencies, 50.0).as_secs_f64() * 1000.0,
        percentile(latencies, 95.0).as_secs_f64() * 1000.0,
        percentile(latencies, 99.0).as_secs_f64() * 1000.0,
        latencies[latencies.len() - 1].as_secs_f64() * 1000.0,
    );
}

fn wal_path() -> PathBuf {
    let dir = std::env::temp_dir().join("roomops_bench");
    std::fs::create_dir_all(&dir).expect("create bench dir");
    dir.join(format!("bench_{}.wal", Ulid::new()))
}

async fn setup(engine: &Engine, date: NaiveDate) -> Vec<RoomAssignment> {
    let mut assignments = Vec::with_capacity(ROOMS);
    for n in 0..ROOMS {
        let room_id = Ulid::new();
        engine
            .create_room(room_id, &format!("{}{:02}", n / 20 + 1, n % 20), (n / 20) as i32 + 1)
            .await
            .expect("create room");
        let assignment = engine
            .create_assignment(NewAssignment {
                id: Ulid::new(),
                room_id,
                assignment_date: date,
                assignment_type: AssignmentType::DailyCleaning,
                assigned_to: None,
            })
            .await
            .expect("create assignment");
        assignments.push(assignment);
    }
    println!("  created {ROOMS} rooms with one daily cleaning each");
    assignments
}

/// One staff member works every activity of `assignment` start to finish.
async fn work(engine: &Engine, staff_id: Ulid, assignment: &RoomAssignment, latencies: &mut Vec<Duration>) {
    for activity in &assignment.activities {
        let start = Instant::now();
        let session_id = Ulid::new();
        engine
            .start_session(StartSession {
                session_id,
                staff_id,
                room_id: assignment.room_id,
                activity_id: activity.id,
                confirm: false,
            })
            .await
            .expect("start session");
        engine.stop_session(session_id).await.expect("stop session");
        latencies.push(start.elapsed());
    }
}

async fn phase1_sequential(engine: &Engine, assignments: &[RoomAssignment]) {
    let staff = Ulid::new();
    let mut latencies = Vec::new();
    let start = Instant::now();
    for assignment in assignments {
        work(engine, staff, assignment, &mut latencies).await;
    }
    let elapsed = start.elapsed();
    let n = latencies.len();
    println!(
        "  {n} start/stop pairs in {:.2}s = {:.0} pairs/sec",
        elapsed.as_secs_f64(),
        n as f64 / elapsed.as_secs_f64()
    );
    print_latency("start+stop", &mut latencies);
}

async fn phase2_concurrent(engine: Arc<Engine>, assignments: Vec<RoomAssignment>) {
    let staff_count = 20;
    let start = Instant::now();
    let mut handles = Vec::new();
    for chunk in assignments.chunks(assignments.len().div_ceil(staff_count)) {
        let engine = engine.clone();
        let chunk = chunk.to_vec();
        handles.push(tokio::spawn(async move {
            let staff = Ulid::new();
            let mut latencies = Vec::new();
            for assignment in &chunk {
                work(&engine, staff, assignment, &mut latencies).await;
            }
            latencies
        }));
    }
    let mut all = Vec::new();
    for handle in handles {
        all.extend(handle.await.expect("worker panicked"));
    }
    let elapsed = start.elapsed();
    println!(
        "  {staff_count} staff, {} pairs in {:.2}s = {:.0} pairs/sec",
        all.len(),
        elapsed.as_secs_f64(),
        all.len() as f64 / elapsed.as_secs_f64()
    );
    print_latency("start+stop", &mut all);
}

async fn phase3_board_under_load(engine: Arc<Engine>, assignments: Vec<RoomAssignment>) {
    let writer_engine = engine.clone();
    let writer = tokio::spawn(async move {
        let staff = Ulid::new();
        let mut latencies = Vec::new();
        for assignment in &assignments {
            work(&writer_engine, staff, assignment, &mut latencies).await;
        }
    });

    let mut reads = Vec::new();
    while !writer.is_finished() {
        let start = Instant::now();
        let board = engine.room_board().await;
        reads.push(start.elapsed());
        assert_eq!(board.len(), ROOMS);
        tokio::task::yield_now().await;
    }
    writer.await.expect("writer panicked");
    print_latency("room_board", &mut reads);
}

async fn phase4_switch_storm(engine: Arc<Engine>, assignments: Vec<RoomAssignment>) {
    let staff = Ulid::new();
    let start = Instant::now();
    let mut handles = Vec::new();
    for assignment in assignments {
        let engine = engine.clone();
        handles.push(tokio::spawn(async move {
            engine
                .start_session(StartSession {
                    session_id: Ulid::new(),
                    staff_id: staff,
                    room_id: assignment.room_id,
                    activity_id: assignment.activities[0].id,
                    confirm: true,
                })
                .await
        }));
    }
    let mut ok = 0;
    for handle in handles {
        if handle.await.expect("switch panicked").is_ok() {
            ok += 1;
        }
    }
    let open = engine
        .sessions_for_staff(staff)
        .await
        .into_iter()
        .filter(|s| s.is_active())
        .count();
    println!(
        "  {ok} confirmed switches in {:.2}s, {open} session(s) left open",
        start.elapsed().as_secs_f64()
    );
    assert_eq!(open, 1, "a staff member must never hold two open sessions");
}

#[tokio::main]
async fn main() {
    let path = wal_path();
    let engine = Arc::new(
        Engine::new(
            path.clone(),
            Arc::new(NotifyHub::new()),
            Arc::new(ActivityCatalog::default()),
        )
        .expect("open engine"),
    );

    println!("=== roomops stress benchmark ===");
    println!("wal: {}\n", path.display());

    let day = |d| NaiveDate::from_ymd_opt(2026, 10, d).expect("valid date");

    println!("[setup]");
    let first = setup(&engine, day(1)).await;

    println!("\n[phase 1] sequential session throughput");
    phase1_sequential(&engine, &first[..ROOMS / 4]).await;

    println!("\n[phase 2] concurrent session throughput");
    phase2_concurrent(engine.clone(), first[ROOMS / 4..].to_vec()).await;

    println!("\n[phase 3] board latency under write load");
    let second = assign_all(&engine, day(2)).await;
    phase3_board_under_load(engine.clone(), second).await;

    println!("\n[phase 4] confirmed switch storm");
    let third = assign_all(&engine, day(3)).await;
    phase4_switch_storm(engine.clone(), third).await;

    let start = Instant::now();
    engine.compact_wal(0).await.expect("compact");
    println!("\n[compaction] {:.2}ms", start.elapsed().as_secs_f64() * 1000.0);

    let _ = std::fs::remove_file(&path);
    println!("\n=== benchmark complete ===");
}

async fn assign_all(engine: &Engine, date: NaiveDate) -> Vec<RoomAssignment> {
    let mut assignments = Vec::new();
    for room in engine.list_rooms().await {
        let assignment = engine
            .create_assignment(NewAssignment {
                id: Ulid::new(),
                room_id: room.id,
                assignment_date: date,
                assignment_type: AssignmentType::DailyCleaning,
                assigned_to: None,
            })
            .await
            .expect("create assignment");
        assignments.push(assignment);
    }
    assignments
}
