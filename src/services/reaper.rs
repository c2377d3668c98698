//! Background reaper - purges expired flows, sessions and pending
//! domain verifications.

use std::sync::Arc;
use std::time::Duration;

use crate::error::ServiceError;
use crate::store::{Clock, DomainStore, FlowStore, SessionStore};

#[derive(Debug, Default, Clone, Copy)]
pub struct SweepStats {
    pub flows: u64,
    pub sessions: u64,
    pub domains: u64,
}

impl SweepStats {
    pub fn total(&self) -> u64 {
        self.flows + self.sessions + self.domains
    }
}

pub struct Reaper {
    flows: Arc<dyn FlowStore>,
    sessions: Arc<dyn SessionStore>,
    domains: Arc<dyn DomainStore>,
    clock: Arc<dyn Clock>,
    interval: Duration,
}

impl Reaper {
    pub fn new(
        flows: Arc<dyn FlowStore>,
        sessions: Arc<dyn SessionStore>,
        domains: Arc<dyn DomainStore>,
        clock: Arc<dyn Clock>,
        interval: Duration,
    ) -> Self {
        Self {
            flows,
            sessions,
            domains,
            clock,
            interval,
        }
    }

    /// One sweep over all stores.
    pub async fn sweep(&self) -> Result<SweepStats, ServiceError> {
        let now = self.clock.now();
        Ok(SweepStats {
            flows: self.flows.delete_expired(now).await?,
            sessions: self.sessions.delete_expired(now).await?,
            domains: self.domains.delete_expired_pending(now).await?,
        })
    }

    /// Sweep on a fixed interval until the task is dropped.
    pub async fn run(self) {
        let mut ticker = tokio::time::interval(self.interval);
        loop {
            ticker.tick().await;
            match self.sweep().await {
                Ok(stats) if stats.total() > 0 => {
                    tracing::info!(
                        flows = stats.flows,
                        sessions = stats.sessions,
                        domains = stats.domains,
                        "reaper sweep removed expired rows"
                    );
                }
                Ok(_) => {}
                Err(err) => {
                    tracing::warn!(error = %err, "reaper sweep failed");
                }
            }
        }
    }
}
