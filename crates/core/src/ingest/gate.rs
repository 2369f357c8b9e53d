use std::time::Duration;

/// Decides when a rate-limited request may go out.
#[async_trait::async_trait]
pub trait RequestGate: Send + Sync {
    async fn wait(&self);
}

/// Sleeps a fixed amount before every request. Not cancellable mid-wait from the caller's
/// side; dropping the future is the only way out.
#[derive(Debug, Clone)]
pub struct FixedDelay {
    delay: Duration,
}

impl FixedDelay {
    pub fn new(delay: Duration) -> Self {
        Self { delay }
    }

    pub fn delay(&self) -> Duration {
        self.delay
    }
}

#[async_trait::async_trait]
impl RequestGate for FixedDelay {
    async fn wait(&self) {
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct Immediate;

#[async_trait::async_trait]
impl RequestGate for Immediate {
    async fn wait(&self) {}
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::time::Instant;

    #[tokio::test(start_paused = true)]
    async fn fixed_delay_waits_every_time() {
        let gate = FixedDelay::new(Duration::from_secs(15));
        let start = Instant::now();

        gate.wait().await;
        assert!(start.elapsed() >= Duration::from_secs(15));

        gate.wait().await;
        assert!(start.elapsed() >= Duration::from_secs(30));
    }

    #[tokio::test(start_paused = true)]
    async fn immediate_does_not_wait() {
        let start = Instant::now();
        Immediate.wait().await;
        assert_eq!(start.elapsed(), Duration::ZERO);
    }
}
