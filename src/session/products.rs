//! Active product set ("games being played").
//!
//! Every change goes through one async mutex that is held across the
//! session call, so the idle refresh and the control surface can never
//! interleave their writes.

use crate::client::EntitlementClient;
use crate::models::Result;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::info;

/// Handle to the session's active product set.
///
/// Cheap to clone; all clones share the same writer lock.
#[derive(Clone)]
pub struct ActiveProducts {
    client: Arc<dyn EntitlementClient>,
    /// Configured list, never mutated
    configured: Arc<[u32]>,
    /// Last list pushed to the session
    current: Arc<Mutex<Vec<u32>>>,
}

impl ActiveProducts {
    pub fn new(client: Arc<dyn EntitlementClient>, configured: Vec<u32>) -> Self {
        Self {
            client,
            configured: configured.into(),
            current: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// Report the full configured list as active.
    pub async fn start(&self) -> Result<()> {
        let mut current = self.current.lock().await;
        self.client.set_active_products(&self.configured).await?;
        *current = self.configured.to_vec();
        info!(count = current.len(), "Started playing games");
        Ok(())
    }

    /// Report nothing as active.
    pub async fn stop(&self) -> Result<()> {
        let mut current = self.current.lock().await;
        self.client.set_active_products(&[]).await?;
        current.clear();
        info!("Stopped playing games");
        Ok(())
    }

    /// Stop, wait `pause`, then restore the configured list.
    ///
    /// The lock is released during the pause so control requests stay
    /// responsive; the restore always uses the configured list.
    pub async fn refresh(&self, pause: std::time::Duration) -> Result<()> {
        info!("Hourly cycle: stopping games");
        self.stop().await?;
        tokio::time::sleep(pause).await;
        info!("Hourly cycle: starting games again");
        self.start().await
    }

    pub fn configured(&self) -> &[u32] {
        &self.configured
    }

    pub async fn current(&self) -> Vec<u32> {
        self.current.lock().await.clone()
    }
}


#[cfg(test)]
mod tests {
    use super::fake::FakeSession;
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn test_stop_then_start_restores_configured_list() {
        let session = Arc::new(FakeSession::default());
        let products = ActiveProducts::new(session.clone(), vec![730, 570, 440]);

        products.start().await.unwrap();
        products.stop().await.unwrap();
        assert!(products.current().await.is_empty());
        products.start().await.unwrap();

        assert_eq!(products.current().await, vec![730, 570, 440]);
        assert_eq!(
            *session.active_calls.lock().unwrap(),
            vec![vec![730, 570, 440], vec![], vec![730, 570, 440]]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_refresh_pauses_between_stop_and_start() {
        let session = Arc::new(FakeSession::default());
        let products = ActiveProducts::new(session.clone(), vec![1]);

        let started = tokio::time::Instant::now();
        products.refresh(Duration::from_secs(10)).await.unwrap();

        assert!(started.elapsed() >= Duration::from_secs(10));
        assert_eq!(*session.active_calls.lock().unwrap(), vec![vec![], vec![1]]);
    }
}
