//! Claim loop: scan → claim → notify → record, forever.
//!
//! Epistemic foundation:
//! - K_i: Cycles never overlap; the next one starts after the previous sleep
//! - K_i: The ledger is only written after the notification was attempted
//! - B_i: Any cycle may fail; the loop retries after a fixed delay
//! - I^B: Whether an unnotified claim is recorded is a policy choice (`LedgerPolicy`)

use crate::ledger::Ledger;
use crate::models::{CycleReport, LedgerPolicy, Offer, Result, ScheduleConfig};
use crate::notify::{Notifier, claim_summary};
use crate::pipeline::{CatalogScanner, ClaimExecutor};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info, warn};

/// Sample a wait uniformly from `[min, max]` at millisecond granularity.
pub fn next_interval<R: Rng + ?Sized>(rng: &mut R, min: Duration, max: Duration) -> Duration {
    let min_ms = min.as_millis() as u64;
    let max_ms = (max.as_millis() as u64).max(min_ms);
    Duration::from_millis(rng.random_range(min_ms..=max_ms))
}

/// Owns everything one claim cycle touches.
pub struct ClaimLoop {
    scanner: CatalogScanner,
    executor: ClaimExecutor,
    notifier: Arc<dyn Notifier>,
    ledger: Ledger,
    subject: String,
    schedule: ScheduleConfig,
    rng: StdRng,
}

impl ClaimLoop {
    pub fn new(
        scanner: CatalogScanner,
        executor: ClaimExecutor,
        notifier: Arc<dyn Notifier>,
        ledger: Ledger,
        schedule: ScheduleConfig,
        subject: impl Into<String>,
    ) -> Self {
        Self {
            scanner,
            executor,
            notifier,
            ledger,
            subject: subject.into(),
            schedule,
            rng: StdRng::from_os_rng(),
        }
    }

    /// Replace the interval RNG (deterministic schedules in tests).
    pub fn with_rng(mut self, rng: StdRng) -> Self {
        self.rng = rng;
        self
    }

    pub fn ledger(&self) -> &Ledger {
        &self.ledger
    }

    /// Run one full cycle.
    ///
    /// Only ledger writes can fail the cycle; catalog, claim and
    /// notification failures are logged and contained.
    pub async fn run_cycle(&mut self) -> Result<CycleReport> {
        let mut report = CycleReport::default();

        let offers = self.scanner.scan(&self.ledger).await;
        let fresh: Vec<Offer> = offers
            .into_iter()
            .filter(|offer| !self.ledger.contains(offer.title()))
            .collect();
        report.discovered = fresh.len();

        if fresh.is_empty() {
            info!("No new free games found");
            return Ok(report);
        }

        for offer in &fresh {
            info!(
                "Free game found:\n  Title: {}\n  Discount: {}%\n  Price: ${:.2}\n  Link: {}",
                offer.title(),
                offer.discount_percent(),
                offer.price(),
                offer.link()
            );
        }

        tokio::time::sleep(self.schedule.claim_delay()).await;
        let granted = self.executor.claim(&fresh).await;
        if granted.is_empty() {
            return Ok(report);
        }

        let claimed: Vec<Offer> = fresh
            .into_iter()
            .filter(|offer| granted.contains(&offer.app_id()))
            .collect();
        report.claimed = claimed.len();
        if claimed.is_empty() {
            warn!(granted = ?granted, "Granted ids match no candidate offer");
            return Ok(report);
        }

        match self
            .notifier
            .send(&self.subject, &claim_summary(&claimed))
            .await
        {
            Ok(()) => report.notified = true,
            Err(e) => error!(error = %e, "Error sending email"),
        }

        if !report.notified && self.schedule.ledger_policy == LedgerPolicy::AfterNotifySuccess {
            warn!(
                count = claimed.len(),
                "Notification failed, leaving claimed titles out of the ledger"
            );
            return Ok(report);
        }

        for offer in &claimed {
            if self.ledger.record(offer.title())? {
                report.recorded += 1;
            }
        }
        info!(
            recorded = report.recorded,
            total = self.ledger.len(),
            "Ledger updated"
        );

        Ok(report)
    }

    fn next_interval(&mut self) -> Duration {
        next_interval(
            &mut self.rng,
            self.schedule.min_interval(),
            self.schedule.max_interval(),
        )
    }

    /// Run cycles until the task is dropped or aborted.
    pub async fn run(mut self) {
        loop {
            let wait = match self.run_cycle().await {
                Ok(_) => {
                    let wait = self.next_interval();
                    info!(
                        hours = format!("{:.2}", wait.as_secs_f64() / 3600.0),
                        "Next check scheduled"
                    );
                    wait
                }
                Err(e) => {
                    error!(error = %e, "Error in claim loop");
                    let wait = self.schedule.retry_delay();
                    warn!(minutes = wait.as_secs() / 60, "Retrying after delay");
                    wait
                }
            };
            tokio::time::sleep(wait).await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{OfferPolicy, PriceDetail};
    use crate::notify::fake::FakeNotifier;
    use crate::pipeline::scanner::fake::FakeCatalog;
    use crate::session::fake::FakeSession;
    use std::fs;
    use tempfile::TempDir;

    const SUBJECT: &str = "New Free Steam Games Claimed!";

    struct Harness {
        catalog: Arc<FakeCatalog>,
        session: Arc<FakeSession>,
        notifier: Arc<FakeNotifier>,
        claim_loop: ClaimLoop,
    }

    fn free() -> Option<PriceDetail> {
        Some(PriceDetail {
            discount_percent: 100,
            final_price: 0,
        })
    }

    fn harness(
        temp_dir: &TempDir,
        catalog: FakeCatalog,
        session: FakeSession,
        notifier: FakeNotifier,
        policy: LedgerPolicy,
    ) -> Harness {
        let catalog = Arc::new(catalog);
        let session = Arc::new(session);
        let notifier = Arc::new(notifier);
        let ledger = Ledger::open(&temp_dir.path().join("seen_promotions.txt")).unwrap();
        let schedule = ScheduleConfig {
            ledger_policy: policy,
            ..ScheduleConfig::default()
        };

        let claim_loop = ClaimLoop::new(
            CatalogScanner::new(catalog.clone(), OfferPolicy::default(), "free"),
            ClaimExecutor::new(session.clone()),
            notifier.clone(),
            ledger,
            schedule,
            SUBJECT,
        )
        .with_rng(StdRng::seed_from_u64(7));

        Harness {
            catalog,
            session,
            notifier,
            claim_loop,
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_free_sample_claimed_notified_and_recorded() {
        let temp_dir = TempDir::new().unwrap();
        let mut h = harness(
            &temp_dir,
            FakeCatalog::default().with_item("Free Sample", 42, free()),
            FakeSession::granting(vec![42]),
            FakeNotifier::default(),
            LedgerPolicy::AfterNotifyAttempt,
        );

        let report = h.claim_loop.run_cycle().await.unwrap();
        assert_eq!(
            report,
            CycleReport {
                discovered: 1,
                claimed: 1,
                recorded: 1,
                notified: true,
            }
        );

        let sent = h.notifier.sent.lock().unwrap();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].0, SUBJECT);
        assert!(sent[0].1.contains("Free Sample"));
        assert!(sent[0].1.contains("https://store.steampowered.com/app/42"));

        let contents = fs::read_to_string(h.claim_loop.ledger().path()).unwrap();
        assert_eq!(contents, "Free Sample\n");
    }

    #[tokio::test(start_paused = true)]
    async fn test_recorded_offer_is_never_claimed_again() {
        let temp_dir = TempDir::new().unwrap();
        let mut h = harness(
            &temp_dir,
            FakeCatalog::default().with_item("Free Sample", 42, free()),
            FakeSession::granting(vec![42]),
            FakeNotifier::default(),
            LedgerPolicy::AfterNotifyAttempt,
        );

        h.claim_loop.run_cycle().await.unwrap();
        let second = h.claim_loop.run_cycle().await.unwrap();

        assert_eq!(second, CycleReport::default());
        assert_eq!(h.catalog.searches(), 2);
        assert_eq!(h.session.license_calls.lock().unwrap().len(), 1);
        assert_eq!(h.notifier.sent.lock().unwrap().len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_only_granted_offers_are_notified_and_recorded() {
        let temp_dir = TempDir::new().unwrap();
        let mut h = harness(
            &temp_dir,
            FakeCatalog::default()
                .with_item("Owned Already", 1, free())
                .with_item("New One", 2, free()),
            FakeSession::granting(vec![2]),
            FakeNotifier::default(),
            LedgerPolicy::AfterNotifyAttempt,
        );

        let report = h.claim_loop.run_cycle().await.unwrap();
        assert_eq!(report.discovered, 2);
        assert_eq!(report.claimed, 1);
        assert_eq!(*h.session.license_calls.lock().unwrap(), vec![vec![1, 2]]);

        let sent = h.notifier.sent.lock().unwrap();
        assert!(sent[0].1.contains("New One"));
        assert!(!sent[0].1.contains("Owned Already"));
        assert_eq!(
            h.claim_loop.ledger().titles().collect::<Vec<_>>(),
            vec!["New One"]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_failed_claim_leaves_offers_for_next_cycle() {
        let temp_dir = TempDir::new().unwrap();
        let mut h = harness(
            &temp_dir,
            FakeCatalog::default().with_item("Free Sample", 42, free()),
            FakeSession::failing(),
            FakeNotifier::default(),
            LedgerPolicy::AfterNotifyAttempt,
        );

        let report = h.claim_loop.run_cycle().await.unwrap();
        assert_eq!(report.discovered, 1);
        assert_eq!(report.claimed, 0);
        assert!(h.notifier.sent.lock().unwrap().is_empty());
        assert!(h.claim_loop.ledger().is_empty());

        h.claim_loop.run_cycle().await.unwrap();
        assert_eq!(h.session.license_calls.lock().unwrap().len(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_notify_failure_still_records_after_attempt() {
        let temp_dir = TempDir::new().unwrap();
        let mut h = harness(
            &temp_dir,
            FakeCatalog::default().with_item("Free Sample", 42, free()),
            FakeSession::granting(vec![42]),
            FakeNotifier::failing(),
            LedgerPolicy::AfterNotifyAttempt,
        );

        let report = h.claim_loop.run_cycle().await.unwrap();
        assert!(!report.notified);
        assert_eq!(report.recorded, 1);
        assert!(h.claim_loop.ledger().contains("Free Sample"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_notify_failure_skips_ledger_after_success_policy() {
        let temp_dir = TempDir::new().unwrap();
        let mut h = harness(
            &temp_dir,
            FakeCatalog::default().with_item("Free Sample", 42, free()),
            FakeSession::granting(vec![42]),
            FakeNotifier::failing(),
            LedgerPolicy::AfterNotifySuccess,
        );

        let report = h.claim_loop.run_cycle().await.unwrap();
        assert!(!report.notified);
        assert_eq!(report.recorded, 0);
        assert!(h.claim_loop.ledger().is_empty());
        assert_eq!(
            fs::read_to_string(h.claim_loop.ledger().path()).unwrap(),
            ""
        );

        // Offer stays unseen, so the next cycle claims and notifies again.
        h.claim_loop.run_cycle().await.unwrap();
        assert_eq!(h.session.license_calls.lock().unwrap().len(), 2);
        assert_eq!(h.notifier.sent.lock().unwrap().len(), 2);
    }

    #[test]
    fn test_interval_bounds_over_many_samples() {
        let mut rng = StdRng::seed_from_u64(42);
        let min = Duration::from_secs(3_600);
        let max = Duration::from_secs(21_600);

        for _ in 0..10_000 {
            let ms = next_interval(&mut rng, min, max).as_millis();
            assert!((3_600_000..=21_600_000).contains(&ms), "out of range: {ms}");
        }
    }

    #[test]
    fn test_interval_degenerate_range() {
        let mut rng = StdRng::seed_from_u64(1);
        let fixed = Duration::from_secs(60);
        assert_eq!(next_interval(&mut rng, fixed, fixed), fixed);
    }

    #[tokio::test(start_paused = true)]
    async fn test_run_waits_at_least_an_hour_between_cycles() {
        let temp_dir = TempDir::new().unwrap();
        let h = harness(
            &temp_dir,
            FakeCatalog::default(),
            FakeSession::granting(vec![]),
            FakeNotifier::default(),
            LedgerPolicy::AfterNotifyAttempt,
        );
        let catalog = h.catalog.clone();
        let task = tokio::spawn(h.claim_loop.run());

        tokio::time::sleep(Duration::from_secs(59 * 60)).await;
        assert_eq!(catalog.searches(), 1);

        tokio::time::sleep(Duration::from_secs(5 * 3_600 + 2 * 60)).await;
        assert!(catalog.searches() >= 2);

        task.abort();
    }

    #[tokio::test(start_paused = true)]
    async fn test_failed_cycle_retries_after_ten_minutes() {
        let temp_dir = TempDir::new().unwrap();
        let h = harness(
            &temp_dir,
            FakeCatalog::default().with_item("Free Sample", 42, free()),
            FakeSession::granting(vec![42]),
            FakeNotifier::default(),
            LedgerPolicy::AfterNotifyAttempt,
        );

        // A directory in place of the ledger file makes every append fail.
        let ledger_path = h.claim_loop.ledger().path().to_path_buf();
        fs::remove_file(&ledger_path).unwrap();
        fs::create_dir(&ledger_path).unwrap();

        let catalog = h.catalog.clone();
        let task = tokio::spawn(h.claim_loop.run());

        tokio::time::sleep(Duration::from_secs(9 * 60)).await;
        assert_eq!(catalog.searches(), 1);

        tokio::time::sleep(Duration::from_secs(2 * 60)).await;
        assert_eq!(catalog.searches(), 2);

        task.abort();
    }
}
