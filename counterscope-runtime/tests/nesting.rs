//! End-to-end behavior of the runtime hooks against the synthetic counter
//! subsystem, checked by reading the trace file back.

use std::path::Path;

use counterscope_runtime::{
    Config, Error, EventSpec, Options, Runtime, SyntheticCounters, SyntheticSource, Timestamp,
};

struct Row {
    name: String,
    start: Timestamp,
    end: Timestamp,
    values: Vec<i64>,
}

fn read_trace(path: &Path) -> (Vec<String>, Vec<Row>) {
    let mut reader = csv::Reader::from_path(path).unwrap();
    let header: Vec<String> = reader.headers().unwrap().iter().map(str::to_owned).collect();
    let rows = reader
        .records()
        .map(|rec| {
            let rec = rec.unwrap();
            Row {
                name: rec[0].to_owned(),
                start: rec[1].parse().unwrap(),
                end: rec[2].parse().unwrap(),
                values: rec.iter().skip(3).map(|v| v.parse().unwrap()).collect(),
            }
        })
        .collect();
    (header, rows)
}

fn start(
    dir: &Path,
    events: &str,
    options: Options,
) -> (Runtime<SyntheticCounters>, SyntheticSource, std::path::PathBuf) {
    let path = dir.join("trace.csv");
    let mut config = Config::new(&path, EventSpec::parse(events).unwrap());
    config.options = options;
    let counters = SyntheticCounters::new();
    let source = counters.source();
    let rt = Runtime::with_subsystem(config, counters).unwrap();
    (rt, source, path)
}

#[test]
fn outer_inner_scenario_matches_expected_log() {
    let tmp = tempfile::tempdir().unwrap();
    let (mut rt, _source, path) = start(tmp.path(), "cycles,instructions", Options::default());

    assert_eq!(rt.on_entry("outer").unwrap(), 0);
    assert_eq!(rt.on_entry("inner").unwrap(), 1);
    assert_eq!(rt.on_exit("inner").unwrap(), Some(1));
    assert_eq!(rt.on_exit("outer").unwrap(), Some(0));
    let summary = rt.finalize().unwrap();
    assert_eq!(summary.rows, 2);

    let (header, rows) = read_trace(&path);
    assert_eq!(
        header,
        [
            "function_name",
            "start_timestamp",
            "end_timestamp",
            "cycles",
            "instructions"
        ]
    );
    let names: Vec<&str> = rows.iter().map(|r| r.name.as_str()).collect();
    assert_eq!(names, ["inner", "outer"]);
    // outer started first and finished last.
    assert!(rows[1].start <= rows[0].start);
    assert!(rows[1].end >= rows[0].end);
}

#[test]
fn row_count_equals_entries_in_completion_order() {
    let tmp = tempfile::tempdir().unwrap();
    let (mut rt, _source, path) = start(tmp.path(), "cycles", Options::default());

    // a( b( c() ) d() ) e()
    let script: &[(&str, bool)] = &[
        ("a", true),
        ("b", true),
        ("c", true),
        ("c", false),
        ("b", false),
        ("d", true),
        ("d", false),
        ("a", false),
        ("e", true),
        ("e", false),
    ];
    let mut entries = 0;
    for (name, enter) in script {
        if *enter {
            rt.on_entry(name).unwrap();
            entries += 1;
        } else {
            rt.on_exit(name).unwrap();
        }
    }
    rt.finalize().unwrap();

    let (_, rows) = read_trace(&path);
    assert_eq!(rows.len(), entries);
    let names: Vec<&str> = rows.iter().map(|r| r.name.as_str()).collect();
    assert_eq!(names, ["c", "b", "d", "a", "e"]);
}

#[test]
fn caller_counts_exclude_callee_window() {
    let tmp = tempfile::tempdir().unwrap();
    let (mut rt, source, path) = start(tmp.path(), "cycles,instructions", Options::default());

    rt.on_entry("outer").unwrap();
    source.advance(&[40, 400]);
    rt.on_entry("inner").unwrap();
    source.advance(&[1_000, 10_000]);
    rt.on_exit("inner").unwrap();
    source.advance(&[7, 70]);
    rt.on_exit("outer").unwrap();
    assert_eq!(source.max_running_sessions(), 1);
    rt.finalize().unwrap();

    let (_, rows) = read_trace(&path);
    assert_eq!(rows[0].values, vec![1_000, 10_000]);
    assert_eq!(rows[1].values, vec![7, 70]);
}

#[test]
fn sum_window_mode_totals_caller_windows() {
    let tmp = tempfile::tempdir().unwrap();
    let options = Options {
        window: counterscope_runtime::WindowMode::Sum,
        ..Options::default()
    };
    let (mut rt, source, path) = start(tmp.path(), "cycles", options);

    rt.on_entry("outer").unwrap();
    source.advance(&[40]);
    for _ in 0..3 {
        rt.on_entry("leaf").unwrap();
        source.advance(&[1_000]);
        rt.on_exit("leaf").unwrap();
        source.advance(&[2]);
    }
    rt.on_exit("outer").unwrap();
    rt.finalize().unwrap();

    let (_, rows) = read_trace(&path);
    assert_eq!(rows.len(), 4);
    assert!(rows[..3].iter().all(|r| r.values == [1_000]));
    assert_eq!(rows[3].values, vec![46]);
}

#[test]
fn recursion_produces_distinct_rows_with_increasing_ordinals() {
    let tmp = tempfile::tempdir().unwrap();
    let (mut rt, _source, path) = start(tmp.path(), "cycles", Options::default());

    let entered: Vec<u64> = (0..5).map(|_| rt.on_entry("fib").unwrap()).collect();
    assert!(entered.windows(2).all(|w| w[0] < w[1]), "{entered:?}");
    let exited: Vec<u64> = (0..5).map(|_| rt.on_exit("fib").unwrap().unwrap()).collect();
    let mut expected = entered.clone();
    expected.reverse();
    assert_eq!(exited, expected);
    rt.finalize().unwrap();

    let (_, rows) = read_trace(&path);
    assert_eq!(rows.len(), 5);
    assert!(rows.iter().all(|r| r.name == "fib"));
    // Innermost completes first, so starts are non-increasing down the file.
    assert!(rows.windows(2).all(|w| w[0].start >= w[1].start));
}

#[test]
fn overflow_fails_before_pushing() {
    let tmp = tempfile::tempdir().unwrap();
    let options = Options {
        max_depth: 3,
        ..Options::default()
    };
    let (mut rt, source, path) = start(tmp.path(), "cycles", options);

    for _ in 0..3 {
        rt.on_entry("recurse").unwrap();
    }
    let created = source.sessions_created();
    let err = rt.on_entry("recurse").unwrap_err();
    assert!(matches!(err, Error::StackOverflow { max_depth: 3, .. }), "{err}");
    assert_eq!(rt.depth(), 3);
    assert_eq!(source.sessions_created(), created, "no session for refused frame");
    assert_eq!(source.running_sessions(), 1);

    // The stack is still usable.
    for _ in 0..3 {
        rt.on_exit("recurse").unwrap();
    }
    rt.finalize().unwrap();
    assert_eq!(read_trace(&path).1.len(), 3);
}

#[test]
fn exit_on_empty_stack_writes_nothing_and_keeps_state() {
    let tmp = tempfile::tempdir().unwrap();
    let (mut rt, source, path) = start(tmp.path(), "cycles", Options::default());

    assert_eq!(rt.on_exit("stray").unwrap(), None);
    assert_eq!(rt.depth(), 0);

    rt.on_entry("f").unwrap();
    rt.on_exit("f").unwrap();
    assert_eq!(rt.on_exit("f").unwrap(), None);

    rt.on_entry("g").unwrap();
    source.advance(&[9]);
    assert_eq!(rt.on_exit("g").unwrap(), Some(1));
    let summary = rt.finalize().unwrap();
    assert_eq!(summary.underflows, 2);

    let (_, rows) = read_trace(&path);
    let names: Vec<&str> = rows.iter().map(|r| r.name.as_str()).collect();
    assert_eq!(names, ["f", "g"]);
    assert_eq!(rows[1].values, vec![9]);
}

#[test]
fn trace_values_read_back_exactly() {
    let tmp = tempfile::tempdir().unwrap();
    let (mut rt, source, path) = start(
        tmp.path(),
        "cycles,instructions,branch-misses",
        Options::default(),
    );

    let cases: [[i64; 3]; 3] = [[0, 0, 0], [1, 2, 3], [i64::MAX / 2, 123_456_789_012, 1]];
    for deltas in &cases {
        rt.on_entry("probe").unwrap();
        source.advance(deltas);
        rt.on_exit("probe").unwrap();
    }
    rt.finalize().unwrap();

    let (header, rows) = read_trace(&path);
    assert_eq!(header.len(), 6);
    for (row, deltas) in rows.iter().zip(&cases) {
        assert_eq!(row.values, deltas.to_vec());
        assert!(row.end >= row.start);
    }
}

#[test]
fn empty_event_list_still_records_timestamps() {
    let tmp = tempfile::tempdir().unwrap();
    let path = tmp.path().join("trace.csv");
    let config = Config::new(&path, EventSpec::from_names(Vec::<String>::new()));
    let mut rt = Runtime::with_subsystem(config, SyntheticCounters::new()).unwrap();
    rt.on_entry("f").unwrap();
    rt.on_exit("f").unwrap();
    rt.finalize().unwrap();

    let (header, rows) = read_trace(&path);
    assert_eq!(header.len(), 3);
    assert_eq!(rows.len(), 1);
    assert!(rows[0].values.is_empty());
}

#[test]
fn rejected_event_fails_initialize_without_creating_trace() {
    let tmp = tempfile::tempdir().unwrap();
    let path = tmp.path().join("trace.csv");
    let counters = SyntheticCounters::new();
    let source = counters.source();
    source.reject_event("bogus");

    let config = Config::new(&path, EventSpec::parse("cycles,bogus").unwrap());
    let err = Runtime::with_subsystem(config, counters).unwrap_err();
    assert!(matches!(err, Error::Counter(_)), "{err}");
    assert!(err.to_string().contains("bogus"), "{err}");
    assert!(!path.exists(), "trace file should not be created");
    assert_eq!(source.sessions_created(), 0);
}

#[test]
fn child_session_is_created_after_parent_pauses() {
    let tmp = tempfile::tempdir().unwrap();
    let (mut rt, source, _path) = start(tmp.path(), "cycles", Options::default());
    rt.on_entry("outer").unwrap();
    rt.on_entry("middle").unwrap();
    rt.on_entry("inner").unwrap();
    rt.on_exit("inner").unwrap();
    rt.on_exit("middle").unwrap();
    rt.on_exit("outer").unwrap();
    rt.finalize().unwrap();
    assert_eq!(source.sessions_created_while_running(), 0);
}

#[test]
fn unwritable_output_is_config_error() {
    let tmp = tempfile::tempdir().unwrap();
    let config = Config::new(
        tmp.path().join("missing").join("trace.csv"),
        EventSpec::parse("cycles").unwrap(),
    );
    let err = Runtime::with_subsystem(config, SyntheticCounters::new()).unwrap_err();
    assert!(matches!(err, Error::Config(_)), "{err}");
}
