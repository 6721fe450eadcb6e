//! Session lifecycle state machine.
//!
//! Epistemic foundation:
//! - K_i: Disconnected → Authenticating → Live → Failed, never backwards
//! - K_i: The claim loop is handed off exactly once, on the first logon
//! - B_i: A persisted sentry lets the service skip full re-authentication
//! - I^B: Any session error is terminal; restarting is the supervisor's job

use crate::client::{Credentials, EntitlementClient, PersonaState, SessionEvent};
use crate::models::{Config, FreebieError, Result, Secrets};
use crate::session::{ActiveProducts, SentryStore, guard};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::{JoinError, JoinSet};
use tokio::time::MissedTickBehavior;
use tracing::{error, info, warn};

/// Error messages that mean the stored credentials or sentry are stale.
const CREDENTIAL_MARKERS: &[&str] = &["incorrect login", "logon session"];

/// Where the session currently is.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Disconnected,
    Authenticating,
    Live,
    Failed,
}

/// Whether a session error invalidates the persisted sentry.
pub fn is_credential_error(message: &str) -> bool {
    let lower = message.to_lowercase();
    CREDENTIAL_MARKERS.iter().any(|m| lower.contains(m))
}

/// Static settings for one session.
#[derive(Clone)]
pub struct SessionSettings {
    pub account_name: String,
    pub password: String,
    pub shared_secret: String,
    pub persona: PersonaState,
    pub idle_refresh: Duration,
    pub idle_pause: Duration,
}

impl SessionSettings {
    pub fn from_config(config: &Config, secrets: &Secrets) -> Self {
        Self {
            account_name: secrets.username.clone(),
            password: secrets.password.clone(),
            shared_secret: secrets.shared_secret.clone(),
            persona: PersonaState(config.account.persona_state),
            idle_refresh: config.schedule.idle_refresh(),
            idle_pause: config.schedule.idle_pause(),
        }
    }
}

/// Owns the authenticated session and the work that depends on it.
pub struct SessionManager {
    client: Arc<dyn EntitlementClient>,
    products: ActiveProducts,
    sentry: SentryStore,
    settings: SessionSettings,
    state: SessionState,
}

impl SessionManager {
    pub fn new(
        client: Arc<dyn EntitlementClient>,
        products: ActiveProducts,
        sentry: SentryStore,
        settings: SessionSettings,
    ) -> Self {
        Self {
            client,
            products,
            sentry,
            settings,
            state: SessionState::Disconnected,
        }
    }

    /// Build logon credentials with a fresh two-factor code and the stored sentry.
    pub fn credentials(&self) -> Result<Credentials> {
        let sentry = self.sentry.load()?;
        if sentry.is_some() {
            info!("Using stored sentry file");
        }
        Ok(Credentials {
            account_name: self.settings.account_name.clone(),
            password: self.settings.password.clone(),
            two_factor_code: guard::auth_code(&self.settings.shared_secret)?,
            sentry,
        })
    }

    /// Log on and drive the session until it fails.
    ///
    /// `on_live` is spawned once, after the first logon. The returned value
    /// is always an error: the session has no successful end state.
    pub async fn run<F>(mut self, mut events: mpsc::Receiver<SessionEvent>, on_live: F) -> Result<()>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let mut on_live = Some(on_live);
        let mut tasks = JoinSet::new();

        let outcome = self.drive(&mut events, &mut on_live, &mut tasks).await;

        tasks.abort_all();
        self.state = SessionState::Failed;
        outcome
    }

    async fn drive<F>(
        &mut self,
        events: &mut mpsc::Receiver<SessionEvent>,
        on_live: &mut Option<F>,
        tasks: &mut JoinSet<()>,
    ) -> Result<()>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let credentials = self.credentials()?;
        self.state = SessionState::Authenticating;
        info!(account = %credentials.account_name, "Logging on");
        if let Err(e) = self.client.connect(&credentials).await {
            return Err(self.fail(&e.to_string()));
        }

        loop {
            let event = tokio::select! {
                biased;
                event = events.recv() => event,
                Some(joined) = tasks.join_next(), if !tasks.is_empty() => {
                    return Err(self.task_ended(joined));
                }
            };
            let Some(event) = event else {
                return Err(FreebieError::ChannelClosed);
            };

            match event {
                SessionEvent::LoggedOn { steam_id } => {
                    info!(
                        steam_id = steam_id.as_deref().unwrap_or("unknown"),
                        "Logged on"
                    );
                    self.go_live(on_live, tasks).await?;
                }
                SessionEvent::Sentry { data } => {
                    if let Err(e) = self.sentry.save(&data) {
                        error!(error = %e, "Failed to persist sentry");
                    }
                }
                SessionEvent::Error { message } => {
                    return Err(self.fail(&message));
                }
            }
        }
    }

    /// Background work (idle refresh, claim loop) runs forever; any exit is fatal.
    fn task_ended(&mut self, joined: std::result::Result<(), JoinError>) -> FreebieError {
        self.state = SessionState::Failed;
        let message = match joined {
            Ok(()) => "background task exited".to_string(),
            Err(e) if e.is_panic() => format!("background task panicked: {e}"),
            Err(e) => format!("background task failed: {e}"),
        };
        error!(message = %message, "Session work stopped");
        FreebieError::Internal(message)
    }

    async fn go_live<F>(&mut self, on_live: &mut Option<F>, tasks: &mut JoinSet<()>) -> Result<()>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        if let Err(e) = self.client.set_presence(self.settings.persona).await {
            return Err(self.fail(&e.to_string()));
        }
        if let Err(e) = self.products.start().await {
            return Err(self.fail(&e.to_string()));
        }

        if self.state == SessionState::Live {
            return Ok(());
        }
        self.state = SessionState::Live;

        let products = self.products.clone();
        let period = self.settings.idle_refresh;
        let pause = self.settings.idle_pause;
        tasks.spawn(async move {
            let mut ticker = tokio::time::interval_at(tokio::time::Instant::now() + period, period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                ticker.tick().await;
                if let Err(e) = products.refresh(pause).await {
                    warn!(error = %e, "Idle refresh failed");
                }
            }
        });

        if let Some(claim_loop) = on_live.take() {
            info!("Session live, starting claim loop");
            tasks.spawn(claim_loop);
        }
        Ok(())
    }

    /// Record a terminal failure, dropping the sentry if it is to blame.
    fn fail(&mut self, message: &str) -> FreebieError {
        self.state = SessionState::Failed;
        error!(message = message, "Steam session error");

        let credentials_rejected = is_credential_error(message);
        if credentials_rejected {
            if let Err(e) = self.sentry.invalidate() {
                error!(error = %e, "Failed to remove stale sentry file");
            }
        }

        FreebieError::Session {
            message: message.to_string(),
            credentials_rejected,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::products::fake::FakeSession;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tempfile::TempDir;

    const SECRET: &str = "MTIzNDU2Nzg5MDEyMzQ1Njc4OTA=";

    fn settings() -> SessionSettings {
        SessionSettings {
            account_name: "idler".to_string(),
            password: "pw".to_string(),
            shared_secret: SECRET.to_string(),
            persona: PersonaState::ONLINE,
            idle_refresh: Duration::from_secs(3_600),
            idle_pause: Duration::from_secs(10),
        }
    }

    fn manager(session: &Arc<FakeSession>, sentry: SentryStore) -> SessionManager {
        let products = ActiveProducts::new(session.clone(), vec![10, 20]);
        SessionManager::new(session.clone(), products, sentry, settings())
    }

    #[test]
    fn test_credential_error_markers() {
        assert!(is_credential_error("Incorrect login."));
        assert!(is_credential_error("Logon session expired"));
        assert!(!is_credential_error("ServiceUnavailable"));
    }

    #[tokio::test]
    async fn test_stored_sentry_sent_and_removed_on_incorrect_login() {
        let temp_dir = TempDir::new().unwrap();
        let sentry = SentryStore::new(temp_dir.path().join("sentry.bin"));
        sentry.save(&[7, 7, 7]).unwrap();

        let session = Arc::new(FakeSession::default());
        let (tx, rx) = mpsc::channel(8);
        tx.send(SessionEvent::Error {
            message: "Incorrect login".to_string(),
        })
        .await
        .unwrap();

        let result = manager(&session, sentry.clone()).run(rx, async {}).await;

        let connects = session.connects.lock().unwrap();
        assert_eq!(connects.len(), 1);
        assert_eq!(connects[0].sentry, Some(vec![7, 7, 7]));
        assert_eq!(connects[0].two_factor_code.len(), 5);

        assert!(matches!(
            result,
            Err(FreebieError::Session {
                credentials_rejected: true,
                ..
            })
        ));
        assert!(!sentry.path().exists());
    }

    #[tokio::test]
    async fn test_other_errors_keep_sentry() {
        let temp_dir = TempDir::new().unwrap();
        let sentry = SentryStore::new(temp_dir.path().join("sentry.bin"));
        sentry.save(b"keep").unwrap();

        let session = Arc::new(FakeSession::default());
        let (tx, rx) = mpsc::channel(8);
        tx.send(SessionEvent::Error {
            message: "NoConnection".to_string(),
        })
        .await
        .unwrap();

        let result = manager(&session, sentry.clone()).run(rx, async {}).await;
        assert!(matches!(
            result,
            Err(FreebieError::Session {
                credentials_rejected: false,
                ..
            })
        ));
        assert_eq!(sentry.load().unwrap(), Some(b"keep".to_vec()));
    }

    #[tokio::test]
    async fn test_logon_goes_live_and_hands_off_once() {
        let temp_dir = TempDir::new().unwrap();
        let sentry = SentryStore::new(temp_dir.path().join("sentry.bin"));
        let session = Arc::new(FakeSession::default());
        let handoffs = Arc::new(AtomicUsize::new(0));

        let (tx, rx) = mpsc::channel(8);
        let counter = handoffs.clone();
        let run = tokio::spawn(manager(&session, sentry.clone()).run(rx, async move {
            counter.fetch_add(1, Ordering::SeqCst);
            std::future::pending::<()>().await;
        }));

        tx.send(SessionEvent::LoggedOn { steam_id: None }).await.unwrap();
        tx.send(SessionEvent::Sentry { data: vec![1, 2] }).await.unwrap();
        tx.send(SessionEvent::LoggedOn { steam_id: None }).await.unwrap();
        drop(tx);

        let result = run.await.unwrap();
        assert!(matches!(result, Err(FreebieError::ChannelClosed)));

        // Spawned hand-off may be aborted before it is polled; it must never run twice.
        assert!(handoffs.load(Ordering::SeqCst) <= 1);
        assert_eq!(
            *session.presence.lock().unwrap(),
            vec![PersonaState::ONLINE, PersonaState::ONLINE]
        );
        assert_eq!(
            *session.active_calls.lock().unwrap(),
            vec![vec![10, 20], vec![10, 20]]
        );
        assert_eq!(sentry.load().unwrap(), Some(vec![1, 2]));
    }

    #[tokio::test(start_paused = true)]
    async fn test_claim_loop_starts_and_idle_refresh_runs_hourly() {
        let temp_dir = TempDir::new().unwrap();
        let sentry = SentryStore::new(temp_dir.path().join("sentry.bin"));
        let session = Arc::new(FakeSession::default());
        let handoffs = Arc::new(AtomicUsize::new(0));

        let (tx, rx) = mpsc::channel(8);
        let counter = handoffs.clone();
        let run = tokio::spawn(manager(&session, sentry).run(rx, async move {
            counter.fetch_add(1, Ordering::SeqCst);
            std::future::pending::<()>().await;
        }));

        tx.send(SessionEvent::LoggedOn { steam_id: None }).await.unwrap();
        tokio::time::sleep(Duration::from_secs(3_600 + 11)).await;

        assert_eq!(handoffs.load(Ordering::SeqCst), 1);
        assert_eq!(
            *session.active_calls.lock().unwrap(),
            vec![vec![10, 20], vec![], vec![10, 20]]
        );

        tx.send(SessionEvent::Error {
            message: "shutting down".to_string(),
        })
        .await
        .unwrap();
        assert!(run.await.unwrap().is_err());
    }

    #[tokio::test]
    async fn test_claim_loop_panic_ends_session_with_error() {
        let temp_dir = TempDir::new().unwrap();
        let sentry = SentryStore::new(temp_dir.path().join("sentry.bin"));
        let session = Arc::new(FakeSession::default());

        let (tx, rx) = mpsc::channel(8);
        tx.send(SessionEvent::LoggedOn { steam_id: None }).await.unwrap();

        let result = manager(&session, sentry)
            .run(rx, async {
                panic!("claim loop blew up");
            })
            .await;

        match result {
            Err(FreebieError::Internal(message)) => assert!(message.contains("panicked")),
            other => panic!("expected Internal error, got {other:?}"),
        }
        // Sender still alive: the exit came from the task, not the channel.
        drop(tx);
    }

    #[tokio::test]
    async fn test_claim_loop_returning_ends_session_with_error() {
        let temp_dir = TempDir::new().unwrap();
        let sentry = SentryStore::new(temp_dir.path().join("sentry.bin"));
        let session = Arc::new(FakeSession::default());

        let (tx, rx) = mpsc::channel(8);
        tx.send(SessionEvent::LoggedOn { steam_id: None }).await.unwrap();

        let result = manager(&session, sentry).run(rx, async {}).await;
        assert!(matches!(result, Err(FreebieError::Internal(_))));
        drop(tx);
    }
}
