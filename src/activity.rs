use crate::config::Policy;
use crate::probe::{self, ProcessProbe};
use std::sync::Arc;

/// Decides whether the managed process should yield to a competing activity.
pub struct ActivityDetector<P> {
    policy: Policy,
    probe: Arc<P>,
}

impl<P: ProcessProbe> ActivityDetector<P> {
    pub fn new(policy: Policy, probe: Arc<P>) -> Self {
        Self { policy, probe }
    }

    pub fn policy(&self) -> &Policy {
        &self.policy
    }

    /// Takes a new process snapshot on every call.
    pub fn should_suspend(&self) -> bool {
        self.policy.is_activity_aware() && self.should_suspend_in(&self.probe.process_names())
    }

    /// Same decision over a snapshot the caller already took.
    pub fn should_suspend_in(&self, snapshot: &[String]) -> bool {
        self.policy.is_activity_aware() && should_suspend(&self.policy, snapshot)
    }

    /// Entries of the activity set that are running right now.
    pub fn active_competitors(&self) -> Vec<String> {
        if !self.policy.is_activity_aware() {
            return Vec::new();
        }
        active_competitors(&self.policy, &self.probe.process_names())
    }
}

pub fn should_suspend(policy: &Policy, snapshot: &[String]) -> bool {
    policy
        .activity_set()
        .iter()
        .any(|wanted| snapshot.iter().any(|name| probe::names_match(name, wanted)))
}

pub fn active_competitors(policy: &Policy, snapshot: &[String]) -> Vec<String> {
    policy
        .activity_set()
        .iter()
        .filter(|wanted| snapshot.iter().any(|name| probe::names_match(name, wanted)))
        .cloned()
        .collect()
}
