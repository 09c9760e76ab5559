use std::collections::HashMap;
use std::path::Path;

use counterscope_runtime::Timestamp;
use counterscope_runtime::recorder::FIXED_COLUMNS;

use crate::error::Error;

/// A trace file written by counterscope-runtime.
#[derive(Debug, Clone)]
pub struct Trace {
    pub events: Vec<String>,
    pub rows: Vec<TraceRow>,
}

/// One completed invocation.
#[derive(Debug, Clone, PartialEq)]
pub struct TraceRow {
    pub name: String,
    pub start: Timestamp,
    pub end: Timestamp,
    pub values: Vec<i64>,
}

impl TraceRow {
    pub fn wall_ms(&self) -> f64 {
        self.end.saturating_since(self.start).as_secs_f64() * 1_000.0
    }
}

/// Read and validate a trace from disk.
pub fn load_trace(path: &Path) -> Result<Trace, Error> {
    let read_err = |source: csv::Error| Error::TraceReadError {
        path: path.to_path_buf(),
        source,
    };
    let invalid = |reason: String| Error::InvalidTrace {
        path: path.to_path_buf(),
        reason,
    };

    let mut reader = csv::ReaderBuilder::new()
        .flexible(true)
        .from_path(path)
        .map_err(read_err)?;

    let header = reader.headers().map_err(read_err)?.clone();
    let fixed: Vec<&str> = header.iter().take(FIXED_COLUMNS.len()).collect();
    if fixed != FIXED_COLUMNS {
        return Err(invalid(format!(
            "header must start with {}",
            FIXED_COLUMNS.join(",")
        )));
    }
    let events: Vec<String> = header
        .iter()
        .skip(FIXED_COLUMNS.len())
        .map(str::to_owned)
        .collect();
    let width = FIXED_COLUMNS.len() + events.len();

    let mut rows = Vec::new();
    for (i, record) in reader.records().enumerate() {
        let record = record.map_err(read_err)?;
        // Data rows start on line 2.
        let line = i + 2;
        if record.len() != width {
            return Err(invalid(format!(
                "line {line}: expected {width} fields, found {}",
                record.len()
            )));
        }
        let start = record[1]
            .parse::<Timestamp>()
            .map_err(|e| invalid(format!("line {line}: {e}")))?;
        let end = record[2]
            .parse::<Timestamp>()
            .map_err(|e| invalid(format!("line {line}: {e}")))?;
        let values = record
            .iter()
            .skip(FIXED_COLUMNS.len())
            .map(|v| {
                v.parse::<i64>()
                    .map_err(|_| invalid(format!("line {line}: bad counter value '{v}'")))
            })
            .collect::<Result<Vec<_>, _>>()?;
        rows.push(TraceRow {
            name: record[0].to_owned(),
            start,
            end,
            values,
        });
    }

    Ok(Trace { events, rows })
}

/// Per-event total within a function summary.
#[derive(Debug, Clone, PartialEq, serde::Serialize)]
pub struct EventTotal {
    pub event: String,
    pub total: i64,
}

/// Aggregated data for one function across a trace.
#[derive(Debug, Clone, PartialEq, serde::Serialize)]
pub struct FnSummary {
    pub name: String,
    pub calls: u64,
    pub wall_ms: f64,
    pub counters: Vec<EventTotal>,
}

impl FnSummary {
    fn counter(&self, index: usize) -> i64 {
        self.counters.get(index).map_or(0, |c| c.total)
    }
}

#[derive(Debug, Clone, serde::Serialize)]
pub struct Report {
    pub events: Vec<String>,
    pub functions: Vec<FnSummary>,
}

/// Column a report is ordered by (descending).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SortKey {
    Wall,
    Event(usize),
}

impl SortKey {
    /// `None` or `"wall"` sorts by wall time; anything else must name an event.
    pub fn resolve(trace: &Trace, column: Option<&str>) -> Result<Self, Error> {
        match column {
            None | Some("wall") => Ok(Self::Wall),
            Some(name) => trace
                .events
                .iter()
                .position(|e| e == name)
                .map(Self::Event)
                .ok_or_else(|| Error::UnknownColumn {
                    column: name.to_owned(),
                    available: std::iter::once("wall")
                        .chain(trace.events.iter().map(String::as_str))
                        .collect::<Vec<_>>()
                        .join(", "),
                }),
        }
    }
}

/// Aggregate rows by function name, ordered by `sort` descending.
pub fn summarize(trace: &Trace, sort: SortKey) -> Report {
    let mut order: Vec<&str> = Vec::new();
    let mut map: HashMap<&str, FnSummary> = HashMap::new();

    for row in &trace.rows {
        let entry = map.entry(row.name.as_str()).or_insert_with(|| {
            order.push(row.name.as_str());
            FnSummary {
                name: row.name.clone(),
                calls: 0,
                wall_ms: 0.0,
                counters: trace
                    .events
                    .iter()
                    .map(|event| EventTotal {
                        event: event.clone(),
                        total: 0,
                    })
                    .collect(),
            }
        });
        entry.calls += 1;
        entry.wall_ms += row.wall_ms();
        for (acc, v) in entry.counters.iter_mut().zip(&row.values) {
            acc.total = acc.total.saturating_add(*v);
        }
    }

    // First-completion order breaks ties deterministically.
    let mut functions: Vec<FnSummary> = order
        .into_iter()
        .filter_map(|name| map.remove(name))
        .collect();
    functions.sort_by(|a, b| match sort {
        SortKey::Wall => b
            .wall_ms
            .partial_cmp(&a.wall_ms)
            .unwrap_or(std::cmp::Ordering::Equal),
        SortKey::Event(i) => b.counter(i).cmp(&a.counter(i)),
    });

    Report {
        events: trace.events.clone(),
        functions,
    }
}

/// Format a report as a text table.
pub fn format_table(report: &Report) -> String {
    let mut out = String::new();
    out.push_str(&format!("{:<40} {:>8} {:>12}", "Function", "Calls", "Wall"));
    for event in &report.events {
        out.push_str(&format!(" {:>16}", event));
    }
    out.push('\n');
    let width = 62 + 17 * report.events.len();
    out.push_str(&format!("{}\n", "-".repeat(width)));

    for f in &report.functions {
        out.push_str(&format!(
            "{:<40} {:>8} {:>10.3}ms",
            f.name, f.calls, f.wall_ms
        ));
        for c in &f.counters {
            out.push_str(&format!(" {:>16}", c.total));
        }
        out.push('\n');
    }
    out
}

/// List every row in completion order.
pub fn format_rows(trace: &Trace) -> String {
    let mut out = String::new();
    out.push_str(&format!("{:>6} {:<40} {:>12}", "#", "Function", "Wall"));
    for event in &trace.events {
        out.push_str(&format!(" {:>16}", event));
    }
    out.push('\n');

    for (i, row) in trace.rows.iter().enumerate() {
        out.push_str(&format!(
            "{:>6} {:<40} {:>10.3}ms",
            i,
            row.name,
            row.wall_ms()
        ));
        for v in &row.values {
            out.push_str(&format!(" {:>16}", v));
        }
        out.push('\n');
    }
    out
}

/// Show per-function deltas between two traces.
///
/// Wall time is always compared; counter columns are compared for events both
/// traces recorded.
pub fn diff_traces(a: &Trace, b: &Trace) -> String {
    let ra = summarize(a, SortKey::Wall);
    let rb = summarize(b, SortKey::Wall);
    let a_map: HashMap<&str, &FnSummary> =
        ra.functions.iter().map(|f| (f.name.as_str(), f)).collect();
    let b_map: HashMap<&str, &FnSummary> =
        rb.functions.iter().map(|f| (f.name.as_str(), f)).collect();

    // (event name, index in a, index in b)
    let shared: Vec<(&str, usize, usize)> = a
        .events
        .iter()
        .enumerate()
        .filter_map(|(ia, e)| {
            let ib = b.events.iter().position(|x| x == e)?;
            Some((e.as_str(), ia, ib))
        })
        .collect();

    let mut names: Vec<&str> = a_map.keys().chain(b_map.keys()).copied().collect();
    names.sort_unstable();
    names.dedup();

    let mut out = String::new();
    out.push_str(&format!(
        "{:<40} {:>12} {:>12} {:>12}",
        "Function", "Before", "After", "Delta"
    ));
    for (event, _, _) in &shared {
        out.push_str(&format!(" {:>16}", format!("Δ{event}")));
    }
    out.push('\n');
    out.push_str(&format!("{}\n", "-".repeat(79 + 17 * shared.len())));

    for name in &names {
        let before = a_map.get(name);
        let after = b_map.get(name);
        let wall_before = before.map_or(0.0, |f| f.wall_ms);
        let wall_after = after.map_or(0.0, |f| f.wall_ms);
        out.push_str(&format!(
            "{:<40} {:>10.3}ms {:>10.3}ms {:>+10.3}ms",
            name,
            wall_before,
            wall_after,
            wall_after - wall_before
        ));
        for (_, ia, ib) in &shared {
            let va = before.map_or(0, |f| f.counter(*ia));
            let vb = after.map_or(0, |f| f.counter(*ib));
            out.push_str(&format!(" {:>+16}", vb.saturating_sub(va)));
        }
        out.push('\n');
    }
    out
}
