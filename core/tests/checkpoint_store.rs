//! Checkpoint store tests.
//!
//! Tests cover: serialization fidelity, duplicate and missing sessions,
//! resume after a restart, independent concurrent sessions, and
//! persistence and audit failures.

use crisis_core::{
    checkpoint::{Checkpoint, CheckpointStore, DriverPhase},
    config::GeneratorConfig,
    driver::{RoundResultView, SimulationDriver},
    event::SessionEvent,
    generator::ScriptedGenerator,
    round::{Suspension, SuspensionKind},
    state::{EvalLabel, Evaluation, SimState, Status},
    store::SimStore,
    types::Round,
    SimError, SimResult,
};
use std::path::PathBuf;

const GOOD_RESOLVED: &str =
    r#"{"score": 88, "label": "good", "reasons": [], "suggestions": [], "resolved": true, "catastrophe": false}"#;

fn migrated_memory_store() -> SimStore {
    let store = SimStore::in_memory().expect("in-memory store");
    store.migrate().expect("migration");
    store
}

/// A temp database path; removed (with WAL side files) on drop.
struct TempDb(PathBuf);

impl TempDb {
    fn new(tag: &str) -> Self {
        Self(std::env::temp_dir().join(format!("crisis-{tag}-{}.sqlite", uuid::Uuid::new_v4())))
    }

    fn path(&self) -> &str {
        self.0.to_str().expect("utf-8 temp path")
    }
}

impl Drop for TempDb {
    fn drop(&mut self) {
        for suffix in ["", "-wal", "-shm"] {
            let _ = std::fs::remove_file(format!("{}{suffix}", self.path()));
        }
    }
}

fn rich_checkpoint(session_id: &str) -> Checkpoint {
    let mut state = SimState::new("exploding batteries");
    state.community_reactions = vec!["1. scary\n2. recall now".into(), "1. still waiting".into()];
    state.company_response = Some("We are recalling all units.".into());
    state.reputation_score = 35;
    state.iteration = 1;
    state.last_eval = Some(Evaluation {
        score:       30,
        label:       EvalLabel::Poor,
        reasons:     vec!["late".into(), "vague".into()],
        suggestions: vec!["name a date".into()],
        resolved:    false,
        catastrophe: false,
    });
    Checkpoint {
        session_id: session_id.to_string(),
        phase:      DriverPhase::AwaitingCompanyResponse,
        state,
        pending: Some(Suspension {
            kind:           SuspensionKind::CompanyResponseRequired,
            message:        "Respond.".into(),
            community_wave: "1. still waiting".into(),
            round:          2,
        }),
    }
}

/// Saving and loading a checkpoint yields an equal value in every field.
#[test]
fn checkpoint_round_trips() {
    let mut store = migrated_memory_store();
    let mut cp = Checkpoint::new("rt-1".into(), SimState::new("exploding batteries"));
    store.create(&cp).unwrap();
    assert_eq!(store.load("rt-1").unwrap(), Some(cp.clone()));

    cp = rich_checkpoint("rt-1");
    store.save(&cp).unwrap();
    assert_eq!(store.load("rt-1").unwrap(), Some(cp));
}

#[test]
fn duplicate_create_is_rejected() {
    let mut store = migrated_memory_store();
    let cp = Checkpoint::new("dup".into(), SimState::new("a"));
    store.create(&cp).unwrap();

    let err = store.create(&Checkpoint::new("dup".into(), SimState::new("b"))).unwrap_err();
    assert!(matches!(err, SimError::SessionExists { .. }), "unexpected error: {err}");
    assert_eq!(store.load("dup").unwrap().map(|c| c.state.cause), Some("a".to_string()));
}

#[test]
fn save_of_unknown_session_is_rejected() {
    let mut store = migrated_memory_store();
    let err = store.save(&rich_checkpoint("ghost")).unwrap_err();
    assert!(matches!(err, SimError::SessionNotFound { .. }), "unexpected error: {err}");
    assert_eq!(store.load("ghost").unwrap(), None);
}

/// A session suspended by one process resumes in the next.
#[test]
fn resume_after_restart() {
    let db = TempDb::new("restart");

    let session_id = {
        let store = SimStore::open(db.path()).unwrap();
        store.migrate().unwrap();
        let mut driver = SimulationDriver::new(
            GeneratorConfig::default(),
            ScriptedGenerator::new().reply("1. before restart"),
            store,
        );
        driver.start("warehouse fire").unwrap().session_id
    };

    let store = SimStore::open(db.path()).unwrap();
    store.migrate().unwrap();
    let mut driver = SimulationDriver::new(
        GeneratorConfig::default(),
        ScriptedGenerator::new().reply(GOOD_RESOLVED),
        store,
    );

    let pending = driver.pending(&session_id).unwrap().expect("pending suspension");
    assert_eq!(pending.community_wave, "1. before restart");

    let view = driver.resume(&session_id, "Everyone is safe; we are rebuilding.").unwrap();
    assert!(matches!(view, RoundResultView::Final { status: Status::Resolved, .. }));
}

/// Sessions on separate connections never see each other's state.
#[test]
fn independent_sessions_run_concurrently() {
    let db = TempDb::new("concurrent");
    let store = SimStore::open(db.path()).unwrap();
    store.migrate().unwrap();

    let handles: Vec<_> = (0..4)
        .map(|i| {
            let thread_store = store.reopen().expect("reopen per thread");
            std::thread::spawn(move || -> SimResult<(String, String)> {
                let store = thread_store;
                let generator = ScriptedGenerator::new()
                    .reply(format!("wave for {i}"))
                    .reply(GOOD_RESOLVED);
                let mut driver = SimulationDriver::new(GeneratorConfig::default(), generator, store);
                let cause = format!("cause {i}");
                let started = driver.start(&cause)?;
                driver.resume(&started.session_id, "Sorry.")?;
                Ok((started.session_id, cause))
            })
        })
        .collect();

    for handle in handles {
        let (session_id, cause) = handle.join().expect("thread panicked").expect("session run");
        let cp = store.load(&session_id).unwrap().expect("checkpoint");
        assert_eq!(cp.state.cause, cause);
        assert_eq!(cp.state.community_reactions.len(), 1);
        assert_eq!(cp.phase, DriverPhase::Terminal);
    }
    assert_eq!(store.list_sessions().unwrap().len(), 4);
}

/// Wraps a real store; fails every save while `fail_saves` is set and
/// every audit append while `fail_events` is set.
struct FlakyStore {
    inner:       SimStore,
    fail_saves:  bool,
    fail_events: bool,
}

impl CheckpointStore for FlakyStore {
    fn create(&mut self, checkpoint: &Checkpoint) -> SimResult<()> {
        self.inner.create(checkpoint)
    }

    fn save(&mut self, checkpoint: &Checkpoint) -> SimResult<()> {
        if self.fail_saves {
            return Err(SimError::Database(rusqlite::Error::InvalidQuery));
        }
        self.inner.save(checkpoint)
    }

    fn load(&self, session_id: &str) -> SimResult<Option<Checkpoint>> {
        self.inner.load(session_id)
    }

    fn append_event(&mut self, session_id: &str, round: Round, event: &SessionEvent) -> SimResult<()> {
        if self.fail_events {
            return Err(SimError::Database(rusqlite::Error::InvalidQuery));
        }
        self.inner.append_event(session_id, round, event)
    }
}

/// A failed write aborts the round; the last good checkpoint stays resumable.
#[test]
fn persistence_failure_aborts_round_without_state_change() {
    let store = FlakyStore { inner: migrated_memory_store(), fail_saves: false, fail_events: false };
    let mut driver = SimulationDriver::new(
        GeneratorConfig::default(),
        ScriptedGenerator::new().reply("1. wave").reply(GOOD_RESOLVED),
        store,
    );
    driver.start_with_id("flaky", "strike").unwrap();

    driver.store_mut().fail_saves = true;
    let err = driver.resume("flaky", "We will negotiate.").unwrap_err();
    assert!(matches!(err, SimError::Database(_)), "unexpected error: {err}");
    assert!(!err.is_protocol_misuse());

    let cp = driver.checkpoint("flaky").unwrap();
    assert_eq!(cp.phase, DriverPhase::AwaitingCompanyResponse);
    assert_eq!(cp.state.iteration, 0);
    assert_eq!(cp.state.reputation_score, 50);
    assert_eq!(cp.state.status, Status::Ongoing);
    assert!(cp.pending.is_some());

    driver.store_mut().fail_saves = false;
    let view = driver.resume("flaky", "We will negotiate.").unwrap();
    assert!(view.is_final());
}

/// A failing audit append after the terminal save still reports the outcome.
#[test]
fn audit_failure_does_not_lose_the_final_outcome() {
    let store = FlakyStore { inner: migrated_memory_store(), fail_saves: false, fail_events: false };
    let mut driver = SimulationDriver::new(
        GeneratorConfig::default(),
        ScriptedGenerator::new().reply("1. wave").reply(GOOD_RESOLVED),
        store,
    );
    driver.start_with_id("audit", "outage").unwrap();

    driver.store_mut().fail_events = true;
    let view = driver.resume("audit", "Service is back and credits are issued.").unwrap();
    match view {
        RoundResultView::Final { status, reputation_score, iteration, .. } => {
            assert_eq!(status, Status::Resolved);
            assert_eq!(reputation_score, 70);
            assert_eq!(iteration, 1);
        }
        other => panic!("expected a final view, got {other:?}"),
    }

    let cp = driver.checkpoint("audit").unwrap();
    assert_eq!(cp.phase, DriverPhase::Terminal);
    assert!(driver.final_view("audit").unwrap().is_some_and(|v| v.is_final()));

    let events = driver.store().inner.events_for_session("audit").unwrap();
    assert!(
        events.iter().all(|e| e.event_type != "round_evaluated" && e.event_type != "session_closed"),
        "no audit rows should have been written while appends fail"
    );
}
