use std::sync::Arc;
use std::time::Duration;

use super::collaborators::{ExecutionGrant, ExecutionGrantor};

/// Holds a host execution grant for the lifetime of one cycle and ends it
/// exactly once, whichever way the cycle exits (including task abort).
pub struct GrantGuard {
    grantor: Arc<dyn ExecutionGrantor>,
    grant: Option<ExecutionGrant>,
}

impl GrantGuard {
    pub fn acquire(grantor: Arc<dyn ExecutionGrantor>) -> Self {
        let grant = grantor.begin();
        Self {
            grantor,
            grant: Some(grant),
        }
    }

    pub fn budget(&self) -> Option<Duration> {
        self.grant.and_then(|grant| grant.budget)
    }

    pub fn release(mut self) {
        self.end();
    }

    fn end(&mut self) {
        if let Some(grant) = self.grant.take() {
            self.grantor.end(grant.id);
        }
    }
}

impl Drop for GrantGuard {
    fn drop(&mut self) {
        self.end();
    }
}
