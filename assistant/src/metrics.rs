use prometheus::{IntCounterVec, Opts, Registry};

use crate::agents::catalog::ActionKind;

pub struct Metrics {
    actions: IntCounterVec,
    pipeline_failures: IntCounterVec,
    credential_refresh: IntCounterVec,
}

impl Metrics {
    pub fn new(registry: &Registry) -> prometheus::Result<Self> {
        let actions = IntCounterVec::new(
            Opts::new("assistant_actions_total", "Dispatched actions by outcome"),
            &["action", "outcome"],
        )?;
        let pipeline_failures = IntCounterVec::new(
            Opts::new(
                "assistant_pipeline_failures_total",
                "Requests that ended in an error frame",
            ),
            &["stage"],
        )?;
        let credential_refresh = IntCounterVec::new(
            Opts::new(
                "assistant_credential_refresh_total",
                "Interactive credential refreshes by result",
            ),
            &["result"],
        )?;

        registry.register(Box::new(actions.clone()))?;
        registry.register(Box::new(pipeline_failures.clone()))?;
        registry.register(Box::new(credential_refresh.clone()))?;

        Ok(Self {
            actions,
            pipeline_failures,
            credential_refresh,
        })
    }

    pub fn record_action(&self, kind: ActionKind, outcome: &str) {
        self.actions.with_label_values(&[kind.as_str(), outcome]).inc();
    }

    pub fn record_failure(&self, stage: &str) {
        self.pipeline_failures.with_label_values(&[stage]).inc();
    }

    pub fn record_refresh(&self, result: &str) {
        self.credential_refresh.with_label_values(&[result]).inc();
    }

    pub fn action_count(&self, kind: ActionKind, outcome: &str) -> u64 {
        self.actions.with_label_values(&[kind.as_str(), outcome]).get()
    }

    pub fn refresh_count(&self, result: &str) -> u64 {
        self.credential_refresh.with_label_values(&[result]).get()
    }

    pub fn failure_count(&self, stage: &str) -> u64 {
        self.pipeline_failures.with_label_values(&[stage]).get()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn counters_are_exported_by_the_registry() {
        let registry = Registry::new();
        let metrics = Metrics::new(&registry).unwrap();

        metrics.record_action(ActionKind::ListJobs, "success");
        metrics.record_refresh("abandoned");

        assert_eq!(metrics.action_count(ActionKind::ListJobs, "success"), 1);
        let names: Vec<_> = registry.gather().iter().map(|f| f.get_name().to_string()).collect();
        assert!(names.contains(&"assistant_actions_total".to_string()));
        assert!(names.contains(&"assistant_credential_refresh_total".to_string()));
    }

    #[test]
    fn registering_twice_on_one_registry_fails() {
        let registry = Registry::new();
        Metrics::new(&registry).unwrap();
        assert!(Metrics::new(&registry).is_err());
    }
}
