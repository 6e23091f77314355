/*
 * Copyright 2020 Nikhil Marathe <nsm.nikhil@gmail.com>
 *
 * Licensed under the Apache License, Version 2.0 (the "License");
 * you may not use this file except in compliance with the License.
 * You may obtain a copy of the License at
 *
 *     http://www.apache.org/licenses/LICENSE-2.0
 *
 * Unless required by applicable law or agreed to in writing, software
 * distributed under the License is distributed on an "AS IS" BASIS,
 * WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
 * See the License for the specific language governing permissions and
 * limitations under the License.
 */

//! Per-thread timing counters.
//!
//! Two ways to feed a counter:
//! - `scoped_metric!("name")` times the rest of the enclosing scope.
//! - `record("name", duration)` adds a duration measured elsewhere, for example the run time of a
//!   child process reported back by a worker thread.
//!
//! Counters live in a thread local, so work timed on worker threads has to be recorded on the
//! thread that eventually calls `dump()`.

use std::{
    cell::RefCell,
    fmt,
    sync::atomic::{AtomicBool, Ordering},
    thread_local,
    time::{Duration, Instant},
};

#[derive(Debug, Default)]
struct Metric {
    name: &'static str,
    count: usize,
    sum: u128,
}

impl Metric {
    pub fn record(&mut self, elapsed: Duration) {
        self.count += 1;
        self.sum += elapsed.as_micros();
    }
}

/// A snapshot of one counter, as returned by `snapshot()`.
#[cfg(test)]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MetricSummary {
    pub name: &'static str,
    pub count: usize,
    /// Total time in microseconds.
    pub total_micros: u128,
}

#[cfg(test)]
impl MetricSummary {
    pub fn total(&self) -> Duration {
        Duration::from_micros(self.total_micros as u64)
    }
}

pub struct ScopedMetric {
    metric_index: usize,
    start: Instant,
}

impl ScopedMetric {
    pub fn new(metric_index: usize) -> Self {
        ScopedMetric {
            metric_index,
            start: Instant::now(),
        }
    }
}

impl Drop for ScopedMetric {
    fn drop(&mut self) {
        METRICS.with(|m| {
            m.borrow_mut()
                .record(self.metric_index, self.start.elapsed())
        });
    }
}

#[derive(Debug)]
struct Metrics {
    metrics: Vec<Metric>,
}

impl Metrics {
    pub fn new_metric(&mut self, name: &'static str) -> usize {
        let len = self.metrics.len();
        self.metrics.push(Metric {
            name,
            ..Default::default()
        });
        len
    }

    // Linear, but the number of distinct counters is tiny.
    fn find_or_create(&mut self, name: &'static str) -> usize {
        match self.metrics.iter().position(|m| m.name == name) {
            Some(i) => i,
            None => self.new_metric(name),
        }
    }

    fn record(&mut self, i: usize, elapsed: Duration) {
        self.metrics[i].record(elapsed);
    }
}

impl fmt::Display for Metrics {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let metrics = &self.metrics;

        let mut name_width = 7; // To fit "metric ".
        for metric in metrics {
            name_width = std::cmp::max(name_width, metric.name.len());
        }
        writeln!(
            f,
            "{:name_width$} {:>6} {:>9} {:>11}",
            "metric ",
            "count",
            "avg (us)",
            "total (us)",
            name_width = name_width
        )?;
        writeln!(
            f,
            "{:-<name_width$} {:-^6} {:-^9} {:-^11}",
            "",
            "",
            "",
            "",
            name_width = name_width
        )?;
        for metric in metrics {
            if metric.count == 0 {
                continue;
            }
            writeln!(
                f,
                "{:name_width$} {: >6} {:>9.3} {:>11}",
                metric.name,
                metric.count,
                metric.sum as f64 / metric.count as f64,
                metric.sum,
                name_width = name_width
            )?;
        }
        Ok(())
    }
}

#[macro_export]
macro_rules! scoped_metric {
    ($name:literal) => {
        let _scoped_metric = if $crate::is_enabled() {
            thread_local! {
                static _metric: usize = $crate::new_metric($name);
            }
            ::core::option::Option::Some($crate::ScopedMetric::new(_metric.with(|m| *m)))
        } else {
            ::core::option::Option::None
        };
    };
}

thread_local! {
    static METRICS: RefCell<Metrics> = RefCell::new(Metrics { metrics: vec![] });
}
static ENABLED: AtomicBool = AtomicBool::new(false);

pub fn enable() {
    ENABLED.store(true, Ordering::Relaxed);
}

pub fn is_enabled() -> bool {
    ENABLED.load(Ordering::Relaxed)
}

pub fn dump() {
    METRICS.with(|m| {
        eprintln!("{}", m.borrow());
    })
}

pub fn new_metric(name: &'static str) -> usize {
    METRICS.with(|m| m.borrow_mut().new_metric(name))
}

/// Adds an externally measured duration to the counter called `name`.
///
/// Unlike `scoped_metric!`, this always records, whether or not metrics are enabled, so `dump()`
/// shows per-category action times even when enabled late.
pub fn record(name: &'static str, elapsed: Duration) {
    METRICS.with(|m| {
        let mut m = m.borrow_mut();
        let i = m.find_or_create(name);
        m.record(i, elapsed);
    })
}

/// Counters recorded on this thread so far, in creation order.
#[cfg(test)]
fn snapshot() -> Vec<MetricSummary> {
    METRICS.with(|m| {
        m.borrow()
            .metrics
            .iter()
            .filter(|metric| metric.count > 0)
            .map(|metric| MetricSummary {
                name: metric.name,
                count: metric.count,
                total_micros: metric.sum,
            })
            .collect()
    })
}

/// Zeroes all counters on this thread. Indices handed out to `scoped_metric!` stay valid.
#[cfg(test)]
fn reset() {
    METRICS.with(|m| {
        for metric in m.borrow_mut().metrics.iter_mut() {
            metric.count = 0;
            metric.sum = 0;
        }
    })
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn record_accumulates_by_name() {
        reset();
        record("link", Duration::from_micros(10));
        record("compile", Duration::from_micros(5));
        record("link", Duration::from_micros(30));

        let snap = snapshot();
        let link = snap.iter().find(|m| m.name == "link").expect("link counter");
        assert_eq!(link.count, 2);
        assert_eq!(link.total_micros, 40);
        let compile = snap
            .iter()
            .find(|m| m.name == "compile")
            .expect("compile counter");
        assert_eq!(compile.count, 1);
        assert_eq!(compile.total(), Duration::from_micros(5));
    }

    #[test]
    fn reset_hides_counters_from_snapshot() {
        record("stat", Duration::from_micros(1));
        reset();
        assert!(snapshot().iter().all(|m| m.name != "stat"));
    }

    #[test]
    fn scoped_metric_only_records_when_enabled() {
        reset();
        {
            scoped_metric!("disabled_scope");
        }
        assert!(snapshot().iter().all(|m| m.name != "disabled_scope"));

        enable();
        {
            scoped_metric!("enabled_scope");
        }
        let snap = snapshot();
        assert_eq!(
            snap.iter()
                .find(|m| m.name == "enabled_scope")
                .map(|m| m.count),
            Some(1)
        );
    }

    #[test]
    fn display_lists_only_used_counters() {
        reset();
        record("used", Duration::from_micros(12));
        let text = METRICS.with(|m| m.borrow().to_string());
        assert!(text.contains("used"));
        assert!(text.starts_with("metric "));
    }
}
