use std::collections::VecDeque;
use std::time::{Duration, Instant};

/// Thresholds and bounds for the performance sampler.
#[derive(Clone, Debug)]
pub struct MonitorConfig {
    /// Snapshots kept in the rolling history.
    pub history_limit: usize,
    /// Instantiation latencies folded into the rolling average.
    pub latency_window: usize,
    /// Alert when active count jumps by at least this factor between samples.
    pub active_spike_factor: f64,
    /// Alert when the rolling average instantiation latency crosses this.
    pub latency_ceiling: Duration,
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            history_limit: 256,
            latency_window: 32,
            active_spike_factor: 2.0,
            latency_ceiling: Duration::from_millis(50),
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum AlertKind {
    ActiveSpike,
    LatencyCeiling,
    PoolExhausted,
}

/// Advisory alert raised by the monitor. Alerts never block or fail the
/// operation that triggered them.
#[derive(Clone, Debug)]
pub struct Alert {
    pub kind: AlertKind,
    pub message: String,
}

/// One sampled view of the instance population.
#[derive(Clone, Copy, Debug)]
pub struct Snapshot {
    pub at: Instant,
    pub active: usize,
    pub pooled: usize,
    /// Approximate per-population memory proxy: total node count.
    pub node_count: usize,
    pub avg_instantiation: Duration,
}

type AlertCallback = Box<dyn Fn(&Alert) + Send>;

/// Periodic sampler over instance counts, node counts and instantiation
/// latency, with a bounded history window and threshold-crossing alerts.
pub struct PerformanceMonitor {
    config: MonitorConfig,
    history: VecDeque<Snapshot>,
    latencies: VecDeque<Duration>,
    callbacks: Vec<AlertCallback>,
}

impl PerformanceMonitor {
    pub fn new() -> Self {
        Self::with_config(MonitorConfig::default())
    }

    pub fn with_config(config: MonitorConfig) -> Self {
        Self {
            config,
            history: VecDeque::new(),
            latencies: VecDeque::new(),
            callbacks: Vec::new(),
        }
    }

    pub fn add_alert_callback(&mut self, callback: impl Fn(&Alert) + Send + 'static) {
        self.callbacks.push(Box::new(callback));
    }

    /// Fold one instantiation latency into the rolling window.
    pub fn record_instantiation(&mut self, latency: Duration) {
        if self.latencies.len() == self.config.latency_window {
            self.latencies.pop_front();
        }
        self.latencies.push_back(latency);
    }

    pub fn avg_instantiation(&self) -> Duration {
        if self.latencies.is_empty() {
            return Duration::ZERO;
        }
        let total: Duration = self.latencies.iter().sum();
        total / self.latencies.len() as u32
    }

    /// Record one sample and evaluate thresholds against the previous one.
    pub fn sample(&mut self, active: usize, pooled: usize, node_count: usize) -> Snapshot {
        let snapshot = Snapshot {
            at: Instant::now(),
            active,
            pooled,
            node_count,
            avg_instantiation: self.avg_instantiation(),
        };

        if let Some(previous) = self.history.back() {
            if previous.active > 0
                && (active as f64) >= (previous.active as f64) * self.config.active_spike_factor
            {
                self.raise(Alert {
                    kind: AlertKind::ActiveSpike,
                    message: format!(
                        "active instances jumped {} -> {active}",
                        previous.active
                    ),
                });
            }
        }
        if snapshot.avg_instantiation > self.config.latency_ceiling {
            self.raise(Alert {
                kind: AlertKind::LatencyCeiling,
                message: format!(
                    "average instantiation latency {:?} exceeds ceiling {:?}",
                    snapshot.avg_instantiation, self.config.latency_ceiling
                ),
            });
        }

        if self.history.len() == self.config.history_limit {
            self.history.pop_front();
        }
        self.history.push_back(snapshot);
        snapshot
    }

    /// Advisory pool-exhaustion signal, forwarded from checkout misses.
    pub fn pool_exhausted(&mut self, source_path: &str, capacity: usize) {
        self.raise(Alert {
            kind: AlertKind::PoolExhausted,
            message: format!("pool `{source_path}` exhausted at capacity {capacity}"),
        });
    }

    pub fn latest(&self) -> Option<&Snapshot> {
        self.history.back()
    }

    pub fn history(&self) -> impl Iterator<Item = &Snapshot> {
        self.history.iter()
    }

    fn raise(&self, alert: Alert) {
        log::warn!("performance alert: {}", alert.message);
        for callback in &self.callbacks {
            callback(&alert);
        }
    }
}

impl Default for PerformanceMonitor {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    fn counting_monitor(config: MonitorConfig) -> (PerformanceMonitor, Arc<AtomicUsize>) {
        let mut monitor = PerformanceMonitor::with_config(config);
        let alerts = Arc::new(AtomicUsize::new(0));
        let seen = alerts.clone();
        monitor.add_alert_callback(move |_| {
            seen.fetch_add(1, Ordering::SeqCst);
        });
        (monitor, alerts)
    }

    #[test]
    fn active_spike_raises_alert() {
        let (mut monitor, alerts) = counting_monitor(MonitorConfig::default());
        monitor.sample(10, 0, 100);
        assert_eq!(alerts.load(Ordering::SeqCst), 0);
        monitor.sample(20, 0, 200);
        assert_eq!(alerts.load(Ordering::SeqCst), 1);
        // Growth below the factor stays quiet.
        monitor.sample(25, 0, 250);
        assert_eq!(alerts.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn latency_ceiling_raises_alert() {
        let (mut monitor, alerts) = counting_monitor(MonitorConfig {
            latency_ceiling: Duration::from_millis(1),
            ..MonitorConfig::default()
        });
        monitor.record_instantiation(Duration::from_millis(10));
        monitor.sample(1, 0, 10);
        assert_eq!(alerts.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn history_is_bounded() {
        let (mut monitor, _alerts) = counting_monitor(MonitorConfig {
            history_limit: 4,
            ..MonitorConfig::default()
        });
        for i in 0..10 {
            monitor.sample(i, 0, 0);
        }
        assert_eq!(monitor.history().count(), 4);
        assert_eq!(monitor.latest().unwrap().active, 9);
    }

    #[test]
    fn latency_average_uses_bounded_window() {
        let mut monitor = PerformanceMonitor::with_config(MonitorConfig {
            latency_window: 2,
            ..MonitorConfig::default()
        });
        monitor.record_instantiation(Duration::from_millis(100));
        monitor.record_instantiation(Duration::from_millis(10));
        monitor.record_instantiation(Duration::from_millis(20));
        // Only the last two samples remain.
        assert_eq!(monitor.avg_instantiation(), Duration::from_millis(15));
    }

    #[test]
    fn pool_exhaustion_is_advisory() {
        let (mut monitor, alerts) = counting_monitor(MonitorConfig::default());
        monitor.pool_exhausted("Bullet.scene", 5);
        assert_eq!(alerts.load(Ordering::SeqCst), 1);
    }
}
