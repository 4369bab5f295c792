//! Background exchange health monitor.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;
use tracing::{debug, warn};

use crate::api::ExchangeGateway;

/// Shared health flag consumed by the submission gate.
#[derive(Debug, Clone)]
pub struct HealthFlag(Arc<AtomicBool>);

impl HealthFlag {
    /// A flag that never turns unhealthy, for setups without a monitor.
    pub fn always_healthy() -> Self {
        Self(Arc::new(AtomicBool::new(true)))
    }

    pub fn is_healthy(&self) -> bool {
        self.0.load(Ordering::Relaxed)
    }

    pub(crate) fn set(&self, healthy: bool) {
        self.0.store(healthy, Ordering::Relaxed);
    }
}

/// Probes the exchange status endpoint on a fixed interval and keeps the
/// shared flag current. New submissions are refused while unhealthy; work
/// already queued keeps running under the retry policy.
pub struct HealthMonitor {
    flag: HealthFlag,
    task: JoinHandle<()>,
}

impl HealthMonitor {
    pub fn spawn(gateway: Arc<dyn ExchangeGateway>, interval: Duration) -> Self {
        let flag = HealthFlag::always_healthy();
        let monitor_flag = flag.clone();

        let task = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            loop {
                ticker.tick().await;
                let healthy = gateway.status().await.is_ok();
                if healthy != monitor_flag.is_healthy() {
                    if healthy {
                        debug!("exchange is healthy again");
                    } else {
                        warn!("exchange health check failed, refusing new submissions");
                    }
                }
                monitor_flag.set(healthy);
            }
        });

        Self { flag, task }
    }

    pub fn flag(&self) -> HealthFlag {
        self.flag.clone()
    }

    pub fn stop(&self) {
        self.task.abort();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::testutil::MockGateway;
    use rust_decimal_macros::dec;

    #[tokio::test]
    async fn test_monitor_reports_healthy_gateway() {
        let gateway = Arc::new(MockGateway::new(dec!(100)));
        let monitor = HealthMonitor::spawn(gateway, Duration::from_millis(5));
        let flag = monitor.flag();

        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(flag.is_healthy());
        monitor.stop();
    }
}
