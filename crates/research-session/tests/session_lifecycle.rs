use chrono::{TimeDelta, TimeZone, Utc};
use research_config::SessionSettings;
use research_session::{ExportWriter, SessionStore, TurnOutcome, TurnRecorder};
use tempfile::TempDir;

#[test]
fn export_round_trip_preserves_every_field() {
    let temp_dir = TempDir::new().unwrap();
    let start = Utc.with_ymd_and_hms(2025, 2, 1, 8, 30, 0).unwrap();

    let mut store = SessionStore::new(SessionSettings::new(3, 24));
    store.create_session_at(start);
    {
        let mut recorder = TurnRecorder::new(&mut store);
        for (i, query) in ["what is RAG", "who invented it", "sources?", "summary"].iter().enumerate() {
            let now = start + TimeDelta::minutes(i as i64);
            let outcome = if i == 2 {
                TurnOutcome::failure("search tool unavailable", 0.25)
            } else {
                TurnOutcome::success(format!("answer {i}"), 1.0 + i as f64)
            };
            recorder.record_at(*query, outcome, now).unwrap();
        }
    }

    let export = store.export_active().unwrap();
    let writer = ExportWriter::new(temp_dir.path());
    let path = writer.write(&export, None).unwrap();

    let restored = ExportWriter::read(&path).unwrap();
    assert_eq!(restored, export);

    let session = &restored.session;
    assert_eq!(session.turns.len(), 3);
    let numbers: Vec<u32> = session.turns.iter().map(|t| t.turn_number).collect();
    assert_eq!(numbers, [2, 3, 4]);
    assert!(session.turns[1].error_occurred);
    assert_eq!(session.turns[1].error_message, "search tool unavailable");
    assert_eq!(session.created_at, start);
    assert_eq!(session.last_activity, start + TimeDelta::minutes(3));
}

#[test]
fn window_never_exceeds_limit_and_keeps_newest() {
    let start = Utc.with_ymd_and_hms(2025, 2, 1, 8, 30, 0).unwrap();
    let mut store = SessionStore::new(SessionSettings::new(4, 24));
    store.create_session_at(start);

    for i in 0..20 {
        let query = format!("q{i}");
        TurnRecorder::new(&mut store)
            .record_at(query.clone(), TurnOutcome::success("a", 0.1), start)
            .unwrap();

        let session = store.get_active_session().unwrap();
        assert!(session.turns.len() <= 4);
        assert_eq!(session.latest_turn().unwrap().user_query, query);
    }

    let session = store.get_active_session().unwrap();
    assert_eq!(session.turns.front().unwrap().user_query, "q16");
}

#[test]
fn clear_then_ensure_starts_fresh() {
    let mut store = SessionStore::new(SessionSettings::default());
    let first = store.ensure_session();
    TurnRecorder::new(&mut store)
        .record("q", TurnOutcome::success("a", 0.2))
        .unwrap();

    assert!(store.clear_session());
    assert!(store.get_active_session().is_none());

    let second = store.ensure_session();
    assert_ne!(first, second);
    assert_eq!(store.get_active_session().unwrap().turns.len(), 0);
}

#[test]
fn expired_sessions_are_swept_and_rotated_sessions_linger_until_then() {
    let start = Utc.with_ymd_and_hms(2025, 2, 1, 8, 0, 0).unwrap();
    let mut store = SessionStore::new(SessionSettings::new(10, 1));
    store.create_session_at(start);
    TurnRecorder::new(&mut store)
        .record_at("q1", TurnOutcome::success("a", 0.1), start)
        .unwrap();

    // Rotation leaves the expired session in the map.
    let later = start + TimeDelta::hours(2);
    TurnRecorder::new(&mut store)
        .record_at("q2", TurnOutcome::success("a", 0.1), later)
        .unwrap();
    assert_eq!(store.session_count(), 2);

    assert_eq!(store.cleanup_expired_sessions_at(later), 1);
    assert_eq!(store.session_count(), 1);
    assert_eq!(store.get_active_session().unwrap().turns[0].user_query, "q2");
}

#[test]
fn export_round_trip_keeps_measured_processing_times_exact() {
    let temp_dir = TempDir::new().unwrap();
    let writer = ExportWriter::new(temp_dir.path());
    let start = Utc.with_ymd_and_hms(2025, 2, 1, 8, 0, 0).unwrap();

    let mut store = SessionStore::new(SessionSettings::new(500, 24));
    store.create_session_at(start);

    // Deterministic spread of nanosecond-precision durations under 30s.
    let mut seed: u64 = 0x9E37_79B9_7F4A_7C15;
    let mut timings = vec![std::time::Duration::from_nanos(1_994_174_408).as_secs_f64()];
    while timings.len() < 500 {
        seed = seed.wrapping_mul(6_364_136_223_846_793_005).wrapping_add(1_442_695_040_888_963_407);
        let nanos = (seed >> 11) % 30_000_000_000;
        timings.push(std::time::Duration::from_nanos(nanos).as_secs_f64());
    }

    {
        let mut recorder = TurnRecorder::new(&mut store);
        for (i, seconds) in timings.iter().enumerate() {
            recorder
                .record_at(format!("q{i}"), TurnOutcome::success("a", *seconds), start)
                .unwrap();
        }
    }

    let export = store.export_active().unwrap();
    let restored = ExportWriter::read(&writer.write(&export, None).unwrap()).unwrap();

    let restored_timings: Vec<f64> = restored.session.turns.iter().map(|t| t.processing_time).collect();
    assert_eq!(restored_timings, timings);
    assert_eq!(restored, export);
}
