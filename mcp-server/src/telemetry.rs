//! Aggregate usage counters. No request content is recorded.

use std::collections::BTreeMap;
use std::sync::Mutex;
use std::time::Duration;
use std::time::Instant;

use serde::Serialize;

#[derive(Debug, Default)]
struct Counters {
    tool_calls: BTreeMap<String, u64>,
    resource_accesses: BTreeMap<String, u64>,
    errors: BTreeMap<String, u64>,
}

#[derive(Debug)]
pub struct Telemetry {
    started_at: Instant,
    counters: Mutex<Counters>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct UptimeReport {
    pub seconds: f64,
    pub hours: f64,
    pub human: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CountReport {
    pub total: u64,
    pub by_name: BTreeMap<String, u64>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StatsReport {
    pub uptime: UptimeReport,
    pub tool_calls: CountReport,
    pub top_5: Vec<(String, u64)>,
    pub errors: CountReport,
    pub resource_accesses: CountReport,
    pub requests_per_hour: f64,
    /// Percentage of tool calls that failed.
    pub error_rate: f64,
}

impl Default for Telemetry {
    fn default() -> Self {
        Self::new()
    }
}

impl Telemetry {
    pub fn new() -> Self {
        Self {
            started_at: Instant::now(),
            counters: Mutex::new(Counters::default()),
        }
    }

    pub fn uptime(&self) -> Duration {
        self.started_at.elapsed()
    }

    pub fn record_tool_call(&self, name: &str) {
        self.bump(|c| &mut c.tool_calls, name);
    }

    pub fn record_resource_access(&self, name: &str) {
        self.bump(|c| &mut c.resource_accesses, name);
    }

    pub fn record_error(&self, name: &str) {
        self.bump(|c| &mut c.errors, name);
    }

    fn bump(&self, select: impl FnOnce(&mut Counters) -> &mut BTreeMap<String, u64>, name: &str) {
        let mut counters = match self.counters.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        *select(&mut counters).entry(name.to_string()).or_default() += 1;
    }

    pub fn report(&self) -> StatsReport {
        let counters = match self.counters.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        report_from(&counters, self.uptime())
    }
}

fn count_report(map: &BTreeMap<String, u64>) -> CountReport {
    CountReport {
        total: map.values().sum(),
        by_name: map.clone(),
    }
}

fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

fn report_from(counters: &Counters, uptime: Duration) -> StatsReport {
    let tool_calls = count_report(&counters.tool_calls);
    let errors = count_report(&counters.errors);

    let mut top_5: Vec<(String, u64)> = counters
        .tool_calls
        .iter()
        .map(|(name, count)| (name.clone(), *count))
        .collect();
    top_5.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
    top_5.truncate(5);

    let seconds = uptime.as_secs_f64();
    let whole = uptime.as_secs();
    StatsReport {
        uptime: UptimeReport {
            seconds: round2(seconds),
            hours: round2(seconds / 3600.0),
            human: format!("{}h {}m", whole / 3600, (whole % 3600) / 60),
        },
        requests_per_hour: if seconds > 0.0 {
            round2(tool_calls.total as f64 / seconds * 3600.0)
        } else {
            0.0
        },
        error_rate: if tool_calls.total > 0 {
            round2(errors.total as f64 / tool_calls.total as f64 * 100.0)
        } else {
            0.0
        },
        top_5,
        resource_accesses: count_report(&counters.resource_accesses),
        tool_calls,
        errors,
    }
}
