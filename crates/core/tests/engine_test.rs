use std::collections::{BTreeSet, HashSet};
use std::fs;
use std::path::Path;
use std::sync::mpsc;

use combination_generator_core::{
    execute_run, prepare_run, run_combinations, CancellationToken, CopyErrorPolicy, Engine,
    EngineError, RunConfig, RunEvent, RunPhase, RunStatus,
};

fn input_dir(files: &[(&str, usize)]) -> tempfile::TempDir {
    let dir = tempfile::tempdir().expect("tempdir");
    for (name, len) in files {
        fs::write(dir.path().join(name), vec![b'x'; *len]).expect("write input");
    }
    dir
}

/// File-name sets of every output unit under `base`.
fn unit_contents(base: &Path) -> Vec<BTreeSet<String>> {
    let mut units = Vec::new();
    for entry in fs::read_dir(base).expect("read output base") {
        let unit = entry.expect("entry").path();
        assert!(unit.is_dir(), "only unit folders expected in {}", base.display());
        let names = fs::read_dir(&unit)
            .expect("read unit")
            .map(|file| {
                file.expect("file")
                    .file_name()
                    .to_string_lossy()
                    .to_string()
            })
            .collect();
        units.push(names);
    }
    units
}

fn names(items: &[&str]) -> BTreeSet<String> {
    items.iter().map(|item| item.to_string()).collect()
}

#[test]
fn three_files_pairs_produce_three_units() {
    let input = input_dir(&[("a.txt", 10), ("b.txt", 20), ("c.txt", 30)]);
    let output = tempfile::tempdir().expect("tempdir");

    let outcome = run_combinations(
        &RunConfig::new(input.path(), output.path(), 2),
        &CancellationToken::new(),
        |_| {},
    )
    .expect("run succeeds");

    assert_eq!(outcome.status, RunStatus::Completed);
    assert_eq!(outcome.total_combinations, 3);
    assert_eq!(outcome.materialized, 3);
    assert_eq!(outcome.bytes_copied, 120);

    let units: HashSet<BTreeSet<String>> = unit_contents(output.path()).into_iter().collect();
    let expected: HashSet<BTreeSet<String>> = [
        names(&["a.txt", "b.txt"]),
        names(&["a.txt", "c.txt"]),
        names(&["b.txt", "c.txt"]),
    ]
    .into_iter()
    .collect();
    assert_eq!(units, expected);

    for unit in &outcome.output_units {
        for (name, len) in [("a.txt", 10), ("b.txt", 20), ("c.txt", 30)] {
            if let Ok(bytes) = fs::read(unit.join(name)) {
                assert_eq!(bytes.len(), len, "{name} copied intact");
            }
        }
    }
}

#[test]
fn every_subset_materialized_exactly_once() {
    let files: Vec<String> = (0..6).map(|index| format!("f{index}.dat")).collect();
    let specs: Vec<(&str, usize)> = files.iter().map(|name| (name.as_str(), 4)).collect();
    let input = input_dir(&specs);

    for r in 1..=6 {
        let output = tempfile::tempdir().expect("tempdir");
        let outcome = run_combinations(
            &RunConfig::new(input.path(), output.path(), r),
            &CancellationToken::new(),
            |_| {},
        )
        .expect("run succeeds");

        let units = unit_contents(output.path());
        let distinct: HashSet<BTreeSet<String>> = units.iter().cloned().collect();
        assert_eq!(units.len() as u128, outcome.total_combinations, "r={r}");
        assert_eq!(distinct.len(), units.len(), "duplicate subset for r={r}");
        assert!(units.iter().all(|unit| unit.len() == r));
    }
}

#[test]
fn insufficient_files_reported_without_output() {
    let input = input_dir(&[("solo.txt", 5)]);
    let output = tempfile::tempdir().expect("tempdir");
    let base = output.path().join("combos");

    let err = run_combinations(
        &RunConfig::new(input.path(), &base, 2),
        &CancellationToken::new(),
        |_| {},
    )
    .expect_err("1 file cannot form pairs");

    assert!(matches!(err, EngineError::InsufficientFiles { .. }));
    assert!(!base.exists());
}

#[test]
fn repeated_runs_never_share_units() {
    let input = input_dir(&[("a.txt", 1), ("b.txt", 2), ("c.txt", 3)]);
    let output = tempfile::tempdir().expect("tempdir");
    let config = RunConfig::new(input.path(), output.path(), 2);

    let first = run_combinations(&config, &CancellationToken::new(), |_| {}).expect("first");
    let second = run_combinations(&config, &CancellationToken::new(), |_| {}).expect("second");

    let first_units: HashSet<_> = first.output_units.iter().collect();
    assert!(second
        .output_units
        .iter()
        .all(|unit| !first_units.contains(unit)));
    assert_eq!(unit_contents(output.path()).len(), 6);
}

#[test]
fn stop_after_k_combinations_leaves_exactly_k_units() {
    let input = input_dir(&[("a", 1), ("b", 2), ("c", 3), ("d", 4), ("e", 5)]);

    for k in 0..10_u64 {
        let output = tempfile::tempdir().expect("tempdir");
        let token = CancellationToken::new();
        let stopper = token.clone();
        if k == 0 {
            stopper.cancel();
        }

        let outcome = run_combinations(
            &RunConfig::new(input.path(), output.path(), 2),
            &token,
            move |event: RunEvent| {
                if event.phase == RunPhase::Materialized && event.combination_index == k {
                    stopper.cancel();
                }
            },
        )
        .expect("cancelled run still succeeds");

        assert_eq!(outcome.status, RunStatus::Cancelled, "k={k}");
        assert_eq!(outcome.materialized, k);
        let units = unit_contents(output.path());
        assert_eq!(units.len() as u64, k);
        assert!(units.iter().all(|unit| unit.len() == 2));
    }
}

#[test]
fn events_report_progress_and_current_size() {
    let input = input_dir(&[("a.txt", 10), ("b.txt", 20), ("c.txt", 30)]);
    let output = tempfile::tempdir().expect("tempdir");
    let mut events = Vec::new();

    run_combinations(
        &RunConfig::new(input.path(), output.path(), 2),
        &CancellationToken::new(),
        |event| events.push(event),
    )
    .expect("run succeeds");

    let phases: Vec<RunPhase> = events.iter().map(|event| event.phase).collect();
    assert_eq!(
        phases,
        vec![
            RunPhase::Started,
            RunPhase::Materialized,
            RunPhase::Materialized,
            RunPhase::Materialized,
            RunPhase::Completed,
        ]
    );
    assert!(events.windows(2).all(|pair| pair[0].seq < pair[1].seq));

    let sizes: BTreeSet<u64> = events
        .iter()
        .filter(|event| event.phase == RunPhase::Materialized)
        .map(|event| event.combination_bytes)
        .collect();
    assert_eq!(sizes, [30, 40, 50].into_iter().collect());
    assert!(events.iter().all(|event| event.total_combinations == 3));

    let indices: Vec<u64> = events.iter().map(|event| event.combination_index).collect();
    assert_eq!(indices, vec![0, 1, 2, 3, 3]);
}

#[test]
fn cancelled_event_carries_materialized_count() {
    let input = input_dir(&[("a", 1), ("b", 1), ("c", 1), ("d", 1)]);
    let output = tempfile::tempdir().expect("tempdir");
    let token = CancellationToken::new();
    let stopper = token.clone();
    let mut events = Vec::new();

    run_combinations(
        &RunConfig::new(input.path(), output.path(), 2),
        &token,
        |event: RunEvent| {
            if event.phase == RunPhase::Materialized && event.combination_index == 2 {
                stopper.cancel();
            }
            events.push(event);
        },
    )
    .expect("cancelled run succeeds");

    let last = events.last().expect("terminal event");
    assert_eq!(last.phase, RunPhase::Cancelled);
    assert_eq!(last.combination_index, 2);
}

#[test]
fn abort_policy_stops_on_first_copy_failure() {
    let input = input_dir(&[("a.txt", 1), ("b.txt", 2), ("c.txt", 3)]);
    let output = tempfile::tempdir().expect("tempdir");
    let mut config = RunConfig::new(input.path(), output.path(), 2);
    config.error_policy = CopyErrorPolicy::Abort;

    let prepared = prepare_run(&config).expect("prepare");
    fs::remove_file(input.path().join("a.txt")).expect("remove input");

    let mut phases = Vec::new();
    let err = execute_run(prepared, &CancellationToken::new(), |event| {
        phases.push(event.phase)
    })
    .expect_err("missing file aborts");

    match &err {
        EngineError::FileCopy { file, .. } => assert!(file.ends_with("a.txt")),
        other => panic!("unexpected error: {other}"),
    }
    assert!(err.combination_index().is_some());
    assert_eq!(phases.last(), Some(&RunPhase::Failed));
    assert!(phases.contains(&RunPhase::CopyFailed));
    assert!(unit_contents(output.path())
        .iter()
        .all(|unit| unit.len() == 2));
}

#[test]
fn skip_policy_records_failures_and_continues() {
    let input = input_dir(&[("a.txt", 1), ("b.txt", 2), ("c.txt", 3)]);
    let output = tempfile::tempdir().expect("tempdir");
    let mut config = RunConfig::new(input.path(), output.path(), 2);
    config.error_policy = CopyErrorPolicy::Skip;

    let prepared = prepare_run(&config).expect("prepare");
    fs::remove_file(input.path().join("a.txt")).expect("remove input");

    let outcome =
        execute_run(prepared, &CancellationToken::new(), |_| {}).expect("skip keeps going");

    assert_eq!(outcome.status, RunStatus::Completed);
    assert_eq!(outcome.materialized, 1);
    assert_eq!(outcome.failures.len(), 2);
    assert!(outcome
        .failures
        .iter()
        .all(|failure| failure.file.ends_with("a.txt")));
    assert_eq!(
        unit_contents(output.path()),
        vec![names(&["b.txt", "c.txt"])]
    );
}

#[test]
fn engine_rejects_second_run_while_active() {
    let input = input_dir(&[("a", 1), ("b", 1), ("c", 1)]);
    let output = tempfile::tempdir().expect("tempdir");
    let engine = Engine::new();
    let (release_tx, release_rx) = mpsc::channel::<()>();

    let handle = engine
        .start_run(
            RunConfig::new(input.path(), output.path(), 2),
            CancellationToken::new(),
            move |event| {
                if event.phase == RunPhase::Started {
                    let _ = release_rx.recv();
                }
            },
        )
        .expect("first run starts");
    assert!(engine.is_running());

    let second = engine.start_run(
        RunConfig::new(input.path(), output.path(), 2),
        CancellationToken::new(),
        |_| {},
    );
    assert!(matches!(second, Err(EngineError::RunInProgress)));

    release_tx.send(()).expect("release worker");
    let outcome = handle.join().expect("first run finishes");
    assert_eq!(outcome.status, RunStatus::Completed);
    assert_eq!(outcome.materialized, 3);
    assert!(!engine.is_running());

    let again = engine
        .start_run(
            RunConfig::new(input.path(), output.path(), 3),
            CancellationToken::new(),
            |_| {},
        )
        .expect("slot is free again");
    assert_eq!(again.join().expect("third run").materialized, 1);
}

#[test]
fn failed_start_releases_the_slot() {
    let input = input_dir(&[("a", 1)]);
    let output = tempfile::tempdir().expect("tempdir");
    let engine = Engine::new();

    let err = engine
        .start_run(
            RunConfig::new(input.path(), output.path(), 2),
            CancellationToken::new(),
            |_| {},
        )
        .expect_err("not enough files");
    assert!(matches!(err, EngineError::InsufficientFiles { .. }));
    assert!(!engine.is_running());
}

#[test]
fn stop_requested_through_handle_cancels_run() {
    let input = input_dir(&[("a", 1), ("b", 1), ("c", 1), ("d", 1)]);
    let output = tempfile::tempdir().expect("tempdir");
    let engine = Engine::new();
    let (release_tx, release_rx) = mpsc::channel::<()>();

    let handle = engine
        .start_run(
            RunConfig::new(input.path(), output.path(), 2),
            CancellationToken::new(),
            move |event| {
                if event.phase == RunPhase::Started {
                    let _ = release_rx.recv();
                }
            },
        )
        .expect("run starts");
    handle.request_stop();
    release_tx.send(()).expect("release worker");

    let outcome = handle.join().expect("run ends");
    assert_eq!(outcome.status, RunStatus::Cancelled);
    assert_eq!(outcome.materialized, 0);
    assert!(unit_contents(output.path()).is_empty());
}
