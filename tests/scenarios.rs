use std::collections::HashSet;
use std::sync::Arc;

use chrono::{DateTime, Duration, TimeZone, Utc};

use valet::clock::ManualClock;
use valet::config::LotConfig;
use valet::engine::{Engine, EngineError};
use valet::model::Role;
use valet::monitor;
use valet::notify::{Notice, NotifyHub};

fn morning() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2026, 3, 14, 8, 0, 0).unwrap()
}

struct Lot {
    engine: Arc<Engine>,
    clock: Arc<ManualClock>,
    hub: Arc<NotifyHub>,
}

fn lot() -> Lot {
    let clock = Arc::new(ManualClock::new(morning()));
    let hub = Arc::new(NotifyHub::new());
    let engine = Arc::new(Engine::new(
        LotConfig::default(),
        clock.clone(),
        hub.clone(),
    ));
    Lot { engine, clock, hub }
}

fn driver(engine: &Engine, name: &str) -> u32 {
    engine
        .create_user(name, name, "0500000000", "x@y.z", "00-000-00", Role::Subscriber)
        .unwrap()
        .id
}

#[tokio::test]
async fn reserve_claim_extend_exit_full_cycle() {
    let Lot { engine, clock, hub } = lot();
    let dana = driver(&engine, "dana");
    let mut inbox = hub.subscribe(dana);

    let start = morning() + Duration::hours(26);
    let receipt = engine.make_reservation(dana, start).await.unwrap();
    assert!(matches!(
        inbox.recv().await.unwrap(),
        Notice::ReservationConfirmed { .. }
    ));

    clock.set(start + Duration::minutes(3));
    let entry = engine
        .enter_with_reservation(receipt.session_id, dana)
        .await
        .unwrap();
    assert_eq!(entry.spot_id, receipt.spot_id);

    clock.set(start + Duration::hours(3));
    let ext = engine.extend_owned(entry.session_id, dana, 2).await.unwrap();
    assert_eq!(ext.new_end, start + Duration::hours(6));
    assert!(matches!(inbox.recv().await.unwrap(), Notice::Extended { .. }));

    clock.set(start + Duration::hours(7));
    let exit = engine.exit_owned(entry.session_id, dana).await.unwrap();
    assert!(exit.late);

    let history = engine.history(dana).await.unwrap();
    assert_eq!(history.len(), 1);
    assert!(history[0].extended);
    assert!(history[0].late);
}

#[tokio::test]
async fn monitor_expires_unclaimed_reservation() {
    let Lot { engine, clock, hub } = lot();
    let dana = driver(&engine, "dana");
    let start = morning() + Duration::hours(26);
    let receipt = engine.make_reservation(dana, start).await.unwrap();
    let mut inbox = hub.subscribe(dana);

    // Within the grace period nothing happens.
    clock.set(start + Duration::minutes(14));
    monitor::sweep(&engine).await;
    assert!(inbox.try_recv().is_err());

    clock.set(start + Duration::minutes(16));
    monitor::sweep(&engine).await;
    match inbox.recv().await.unwrap() {
        Notice::ReservationCancelled { session_id, reason } => {
            assert_eq!(session_id, receipt.session_id);
            assert_eq!(reason, "expired");
        }
        other => panic!("unexpected notice: {other:?}"),
    }

    // The spot is reusable and another sweep stays quiet.
    monitor::sweep(&engine).await;
    assert!(inbox.try_recv().is_err());
    let other = driver(&engine, "other");
    let entry = engine.enter_walk_in(other).await.unwrap();
    assert_eq!(entry.spot_id, 1);
}

#[tokio::test]
async fn monitor_flags_late_pickup_once_per_episode() {
    let Lot { engine, clock, hub } = lot();
    let dana = driver(&engine, "dana");
    let mut inbox = hub.subscribe(dana);
    let entry = engine.enter_walk_in(dana).await.unwrap();

    clock.set(entry.estimated_end + Duration::minutes(10));
    monitor::sweep(&engine).await;
    monitor::sweep(&engine).await;
    assert!(matches!(
        inbox.recv().await.unwrap(),
        Notice::LatePickup { .. }
    ));
    assert!(inbox.try_recv().is_err());

    // Extending ends the episode; overrunning the new end starts another.
    let ext = engine.extend(entry.session_id, 1).await.unwrap();
    assert!(matches!(inbox.recv().await.unwrap(), Notice::Extended { .. }));

    clock.set(ext.new_end + Duration::minutes(5));
    monitor::sweep(&engine).await;
    assert!(matches!(
        inbox.recv().await.unwrap(),
        Notice::LatePickup { .. }
    ));

    engine.exit(entry.session_id).await.unwrap();
    monitor::sweep(&engine).await;
    assert!(inbox.try_recv().is_err());
}

#[tokio::test]
async fn concurrent_reservations_never_share_a_spot() {
    let Lot { engine, .. } = lot();
    let start = morning() + Duration::hours(26);

    let mut handles = Vec::new();
    for i in 0..10 {
        let user = driver(&engine, &format!("driver{i}"));
        let engine = engine.clone();
        handles.push(tokio::spawn(async move {
            engine.make_reservation(user, start).await
        }));
    }

    let mut spots = HashSet::new();
    let mut admitted = 0;
    for handle in handles {
        match handle.await.unwrap() {
            Ok(receipt) => {
                admitted += 1;
                assert!(spots.insert(receipt.spot_id), "spot assigned twice");
            }
            Err(EngineError::RuleViolated { .. }) => {}
            Err(other) => panic!("unexpected error: {other}"),
        }
    }
    // The admission floor caps overlapping reservations at six of ten.
    assert_eq!(admitted, 6);
}

#[tokio::test]
async fn concurrent_walk_ins_fill_distinct_spots() {
    let Lot { engine, .. } = lot();

    let mut handles = Vec::new();
    for i in 0..12 {
        let user = driver(&engine, &format!("driver{i}"));
        let engine = engine.clone();
        handles.push(tokio::spawn(async move { engine.enter_walk_in(user).await }));
    }

    let mut spots = HashSet::new();
    let mut full = 0;
    for handle in handles {
        match handle.await.unwrap() {
            Ok(entry) => {
                assert!(spots.insert(entry.spot_id), "spot assigned twice");
            }
            Err(EngineError::ParkingFull) => full += 1,
            Err(other) => panic!("unexpected error: {other}"),
        }
    }
    assert_eq!(spots.len(), 10);
    assert_eq!(full, 2);
}
