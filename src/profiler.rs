//! Per-scope time and memory statistics for network forward passes.

use std::collections::BTreeMap;
use std::fmt;
use std::time::{Duration, Instant};

/// Statistic a profile report can show.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProfileMetric {
    Bytes,
    Micros,
}

/// Row ordering of a profile report.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OrderBy {
    #[default]
    Name,
    Bytes,
    Micros,
}

/// Report configuration, built with the `with_*` methods or loaded from the
/// `[profile]` config section.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(default)]
pub struct ProfileOptions {
    /// Deepest scope level shown; `net` is depth 1, `net/trunk` depth 2.
    pub max_depth: usize,
    /// Scopes producing fewer bytes are hidden.
    pub min_memory: u64,
    /// Scopes taking fewer microseconds are hidden.
    pub min_micros: u64,
    /// Only report this forward step (1-based); `None` aggregates all steps.
    pub step: Option<usize>,
    pub select: Vec<ProfileMetric>,
    pub order_by: OrderBy,
}

impl Default for ProfileOptions {
    fn default() -> Self {
        ProfileOptions {
            max_depth: 4,
            min_memory: 2_000_000,
            min_micros: 0,
            step: Some(2),
            select: vec![ProfileMetric::Bytes],
            order_by: OrderBy::Name,
        }
    }
}

impl ProfileOptions {
    pub fn with_max_depth(mut self, depth: usize) -> Self {
        self.max_depth = depth;
        self
    }

    pub fn with_min_memory(mut self, bytes: u64) -> Self {
        self.min_memory = bytes;
        self
    }

    pub fn with_min_micros(mut self, micros: u64) -> Self {
        self.min_micros = micros;
        self
    }

    pub fn with_step(mut self, step: Option<usize>) -> Self {
        self.step = step;
        self
    }

    pub fn select(mut self, metrics: &[ProfileMetric]) -> Self {
        self.select = metrics.to_vec();
        self
    }

    pub fn order_by(mut self, order: OrderBy) -> Self {
        self.order_by = order;
        self
    }
}

#[derive(Debug, Clone)]
struct ScopeRecord {
    step: usize,
    scope: String,
    micros: u64,
    bytes: u64,
}

/// Collects one record per named scope per forward step.
#[derive(Debug, Default)]
pub struct Profiler {
    step: usize,
    records: Vec<ScopeRecord>,
}

impl Profiler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start a new forward step; returns its 1-based number.
    pub fn begin_step(&mut self) -> usize {
        self.step += 1;
        self.step
    }

    pub fn steps(&self) -> usize {
        self.step
    }

    /// Forget all records and restart step numbering.
    pub fn reset(&mut self) {
        self.step = 0;
        self.records.clear();
    }

    /// Record the cost of `scope` (slash-separated, e.g. `net/trunk/stage1`)
    /// in the current step.
    pub fn record(&mut self, scope: &str, elapsed: Duration, bytes: u64) {
        self.records.push(ScopeRecord {
            step: self.step,
            scope: scope.to_string(),
            micros: elapsed.as_micros() as u64,
            bytes,
        });
    }

    /// Aggregate recorded scopes into a name-scope tree. Every scope's totals
    /// include its descendants.
    pub fn profile_name_scope(&self, options: &ProfileOptions) -> ScopeReport {
        let mut totals: BTreeMap<String, (u64, u64)> = BTreeMap::new();
        for record in &self.records {
            if options.step.is_some_and(|s| s != record.step) {
                continue;
            }
            let parts: Vec<&str> = record.scope.split('/').filter(|p| !p.is_empty()).collect();
            for depth in 1..=parts.len().min(options.max_depth) {
                let entry = totals.entry(parts[..depth].join("/")).or_default();
                entry.0 += record.bytes;
                entry.1 += record.micros;
            }
        }

        let mut rows: Vec<ScopeRow> = totals
            .into_iter()
            .filter(|(_, (bytes, micros))| {
                *bytes >= options.min_memory && *micros >= options.min_micros
            })
            .map(|(scope, (bytes, micros))| ScopeRow {
                depth: scope.split('/').count(),
                scope,
                bytes,
                micros,
            })
            .collect();
        match options.order_by {
            OrderBy::Name => {}
            OrderBy::Bytes => rows.sort_by(|a, b| b.bytes.cmp(&a.bytes)),
            OrderBy::Micros => rows.sort_by(|a, b| b.micros.cmp(&a.micros)),
        }

        ScopeReport {
            step: options.step,
            select: options.select.clone(),
            rows,
        }
    }
}

/// Time `f` under `scope` when a profiler is present.
pub fn profile_scope<T>(
    profiler: Option<&mut Profiler>,
    scope: &str,
    f: impl FnOnce() -> T,
    bytes: impl FnOnce(&T) -> u64,
) -> T {
    match profiler {
        Some(profiler) => {
            let start = Instant::now();
            let out = f();
            profiler.record(scope, start.elapsed(), bytes(&out));
            out
        }
        None => f(),
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ScopeRow {
    pub scope: String,
    pub depth: usize,
    pub bytes: u64,
    pub micros: u64,
}

/// Name-scope report produced by [`Profiler::profile_name_scope`].
#[derive(Debug, Clone)]
pub struct ScopeReport {
    pub step: Option<usize>,
    pub select: Vec<ProfileMetric>,
    pub rows: Vec<ScopeRow>,
}

fn human_bytes(bytes: u64) -> String {
    match bytes {
        b if b >= 1_000_000 => format!("{:.2}MB", b as f64 / 1e6),
        b if b >= 1_000 => format!("{:.2}KB", b as f64 / 1e3),
        b => format!("{b}B"),
    }
}

impl fmt::Display for ScopeReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.step {
            Some(step) => writeln!(f, "Profile (name scope, step {step}):")?,
            None => writeln!(f, "Profile (name scope, all steps):")?,
        }
        if self.rows.is_empty() {
            return writeln!(f, "  <no scopes above thresholds>");
        }
        for row in &self.rows {
            let leaf = row.scope.rsplit('/').next().unwrap_or(&row.scope);
            let stats: Vec<String> = self
                .select
                .iter()
                .map(|m| match m {
                    ProfileMetric::Bytes => human_bytes(row.bytes),
                    ProfileMetric::Micros => format!("{}us", row.micros),
                })
                .collect();
            writeln!(
                f,
                "{:indent$}{} ({})",
                "",
                leaf,
                stats.join(", "),
                indent = 2 * row.depth
            )?;
        }
        Ok(())
    }
}
