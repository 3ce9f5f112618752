use crate::logging::{LogEvent, LogFields, LogLevel};
use serde_json::json;
use std::time::Duration;

#[derive(Debug, Default, Clone)]
pub struct SyncMetrics {
    passes: u64,
    deferred_passes: u64,
    instances_created: u64,
    instances_destroyed: u64,
    instances_reused: u64,
    collisions_resolved: u64,
    destroy_recoveries: u64,
    handler_failures: u64,
}

impl SyncMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_pass(&mut self, deferred: bool) {
        self.passes = self.passes.saturating_add(1);
        if deferred {
            self.deferred_passes = self.deferred_passes.saturating_add(1);
        }
    }

    pub fn record_reconcile(&mut self, created: usize, reused: usize, destroyed: usize) {
        self.instances_created = self.instances_created.saturating_add(created as u64);
        self.instances_reused = self.instances_reused.saturating_add(reused as u64);
        self.instances_destroyed = self.instances_destroyed.saturating_add(destroyed as u64);
    }

    pub fn record_collision(&mut self) {
        self.collisions_resolved = self.collisions_resolved.saturating_add(1);
    }

    pub fn record_recovery(&mut self) {
        self.destroy_recoveries = self.destroy_recoveries.saturating_add(1);
    }

    pub fn record_failure(&mut self) {
        self.handler_failures = self.handler_failures.saturating_add(1);
    }

    pub fn snapshot(&self, uptime: Duration) -> MetricSnapshot {
        MetricSnapshot {
            uptime_ms: uptime.as_millis() as u64,
            passes: self.passes,
            deferred_passes: self.deferred_passes,
            instances_created: self.instances_created,
            instances_destroyed: self.instances_destroyed,
            instances_reused: self.instances_reused,
            collisions_resolved: self.collisions_resolved,
            destroy_recoveries: self.destroy_recoveries,
            handler_failures: self.handler_failures,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MetricSnapshot {
    pub uptime_ms: u64,
    pub passes: u64,
    pub deferred_passes: u64,
    pub instances_created: u64,
    pub instances_destroyed: u64,
    pub instances_reused: u64,
    pub collisions_resolved: u64,
    pub destroy_recoveries: u64,
    pub handler_failures: u64,
}

impl MetricSnapshot {
    pub fn to_log_event(&self, target: &str) -> LogEvent {
        LogEvent::with_fields(
            LogLevel::Info,
            target.to_string(),
            "sync_metrics".to_string(),
            self.as_fields(),
        )
    }

    pub fn as_fields(&self) -> LogFields {
        let mut map = LogFields::new();
        map.insert("uptime_ms".to_string(), json!(self.uptime_ms));
        map.insert("passes".to_string(), json!(self.passes));
        map.insert("deferred_passes".to_string(), json!(self.deferred_passes));
        map.insert("instances_created".to_string(), json!(self.instances_created));
        map.insert("instances_destroyed".to_string(), json!(self.instances_destroyed));
        map.insert("instances_reused".to_string(), json!(self.instances_reused));
        map.insert("collisions_resolved".to_string(), json!(self.collisions_resolved));
        map.insert("destroy_recoveries".to_string(), json!(self.destroy_recoveries));
        map.insert("handler_failures".to_string(), json!(self.handler_failures));
        map
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn snapshot_reports_counts_as_fields() {
        let mut metrics = SyncMetrics::new();
        metrics.record_pass(false);
        metrics.record_pass(true);
        metrics.record_reconcile(3, 1, 2);
        metrics.record_failure();

        let snapshot = metrics.snapshot(Duration::from_millis(1500));
        assert_eq!(snapshot.passes, 2);
        assert_eq!(snapshot.deferred_passes, 1);

        let event = snapshot.to_log_event("counter_tokens::metrics");
        assert_eq!(event.message, "sync_metrics");
        assert_eq!(event.field("instances_created"), Some(&json!(3)));
        assert_eq!(event.field("uptime_ms"), Some(&json!(1500)));
    }
}
