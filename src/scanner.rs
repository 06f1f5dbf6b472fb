use std::collections::HashSet;
use std::fmt;
use std::net::Ipv4Addr;
use std::time::{Duration, Instant};

use futures::future;
use futures::stream::{self, StreamExt};
use log::{debug, info};
use tokio_util::sync::CancellationToken;

use crate::error::{Error, Result};
use crate::probe::{ProbeStatus, Prober};
use crate::range::{AddressRange, InvalidRangeError};

/// Immutable scan parameters.
#[derive(Debug, Clone)]
pub struct ScanConfig {
    /// Upper bound on probes in flight at any moment.
    pub concurrency: usize,
    /// How long a single probe waits for a reply.
    pub probe_timeout: Duration,
    /// Host count above which the confirmation hook (if any) is consulted.
    pub large_scan_threshold: u64,
}

impl Default for ScanConfig {
    fn default() -> Self {
        ScanConfigBuilder::new().build()
    }
}

#[derive(Debug, Clone)]
pub struct ScanConfigBuilder {
    concurrency: Option<usize>,
    probe_timeout: Option<Duration>,
    large_scan_threshold: Option<u64>,
}

impl ScanConfigBuilder {
    pub fn new() -> Self {
        Self {
            concurrency: Some(50),
            probe_timeout: Some(Duration::from_secs(1)),
            large_scan_threshold: Some(1024),
        }
    }

    pub fn with_concurrency(mut self, concurrency: usize) -> Self {
        self.concurrency = Some(concurrency.max(1));
        self
    }

    pub fn with_probe_timeout(mut self, timeout: Duration) -> Self {
        self.probe_timeout = Some(timeout);
        self
    }

    pub fn with_large_scan_threshold(mut self, threshold: u64) -> Self {
        self.large_scan_threshold = Some(threshold);
        self
    }

    pub fn build(self) -> ScanConfig {
        ScanConfig {
            concurrency: self.concurrency.unwrap(),
            probe_timeout: self.probe_timeout.unwrap(),
            large_scan_threshold: self.large_scan_threshold.unwrap(),
        }
    }
}

impl Default for ScanConfigBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// The frozen classification of one finished scan.
#[derive(Debug, Clone)]
pub struct ScanResult {
    /// Number of usable hosts the range expanded to.
    pub total: u64,
    /// How many of them answered their probe.
    pub reachable: u64,
    /// Hosts that never answered, ascending by address value.
    pub unreachable: Vec<Ipv4Addr>,
    /// Wall-clock duration of the whole scan.
    pub elapsed: Duration,
}

type ConfirmHook = Box<dyn Fn(u64) -> bool + Send + Sync>;

/// Drives many [`Prober`] invocations concurrently over an address range and
/// classifies every host as reachable or unreachable.
///
/// # Example
/// ```no_run
/// use async_sweep::{AddressRange, PingProber, ScanConfigBuilder, Scanner};
/// use std::time::Duration;
///
/// let config = ScanConfigBuilder::new()
///     .with_concurrency(100)
///     .with_probe_timeout(Duration::from_secs(2))
///     .build();
/// let scanner = Scanner::new(PingProber::new(), config);
/// tokio_test::block_on(async {
///     let range: AddressRange = "10.0.0.0/28".parse().unwrap();
///     let result = scanner.scan(&range).await.unwrap();
///     for host in &result.unreachable {
///         println!("{host} did not answer");
///     }
/// })
/// ```
pub struct Scanner<P> {
    prober: P,
    config: ScanConfig,
    cancel: CancellationToken,
    confirm: Option<ConfirmHook>,
}

impl<P: fmt::Debug> fmt::Debug for Scanner<P> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Scanner")
            .field("prober", &self.prober)
            .field("config", &self.config)
            .field("cancelled", &self.cancel.is_cancelled())
            .finish_non_exhaustive()
    }
}

impl<P: Prober> Scanner<P> {
    pub fn new(prober: P, config: ScanConfig) -> Self {
        Self {
            prober,
            config,
            cancel: CancellationToken::new(),
            confirm: None,
        }
    }

    /// Installs a hook consulted before a scan whose host count exceeds
    /// [`ScanConfig::large_scan_threshold`]. Returning `false` aborts the scan
    /// before any probe is issued.
    pub fn with_confirm(mut self, hook: impl Fn(u64) -> bool + Send + Sync + 'static) -> Self {
        self.confirm = Some(Box::new(hook));
        self
    }

    /// Token for requesting early termination from outside the scan.
    ///
    /// Cancelling stops the dispatch of new probes; probes already in flight
    /// run to their own timeout, after which [`Scanner::scan`] returns
    /// [`Error::Cancelled`].
    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Probes every usable host in `range` and returns the classification.
    ///
    /// Individual probe failures are folded into the result as unreachable
    /// hosts; only invalid input, an aborted confirmation, cancellation, or a
    /// broken aggregation invariant produce an error.
    pub async fn scan(&self, range: &AddressRange) -> Result<ScanResult> {
        let host_count = range.host_count();
        if let Some(confirm) = &self.confirm {
            if host_count > self.config.large_scan_threshold && !confirm(host_count) {
                info!("scan of {} declined at {} hosts", range, host_count);
                return Err(Error::Aborted);
            }
        }

        let targets: Vec<Ipv4Addr> = range.hosts().collect();
        if targets.is_empty() {
            return Err(InvalidRangeError::NoUsableHosts(range.to_string()).into());
        }
        let total = targets.len() as u64;
        info!(
            "scanning {}: {} hosts, {} in flight, {:?} per-probe timeout",
            range, total, self.config.concurrency, self.config.probe_timeout
        );

        let started = Instant::now();
        let timeout = self.config.probe_timeout;
        let cancel = self.cancel.clone();
        let mut outcomes = stream::iter(targets)
            .take_while(move |_| future::ready(!cancel.is_cancelled()))
            .map(|target| self.prober.probe(target, timeout))
            .buffer_unordered(self.config.concurrency);

        // Single logical writer: outcomes are merged one at a time as they
        // complete, in arbitrary order.
        let mut seen = HashSet::with_capacity(total as usize);
        let mut reachable = 0u64;
        let mut unreachable = Vec::new();
        while let Some(outcome) = outcomes.next().await {
            if !seen.insert(outcome.target) {
                return Err(Error::DuplicateOutcome(outcome.target));
            }
            debug!("{} -> {:?}", outcome.target, outcome.status);
            match outcome.status {
                ProbeStatus::Reachable => reachable += 1,
                ProbeStatus::Unreachable => unreachable.push(outcome.target),
            }
        }

        if self.cancel.is_cancelled() {
            return Err(Error::Cancelled);
        }
        let observed = seen.len() as u64;
        if observed != total {
            return Err(Error::IncompleteAggregation {
                expected: total,
                actual: observed,
            });
        }

        unreachable.sort_unstable();
        let elapsed = started.elapsed();
        info!(
            "scan of {} finished in {:.2?}: {} reachable, {} unreachable",
            range,
            elapsed,
            reachable,
            unreachable.len()
        );
        Ok(ScanResult {
            total,
            reachable,
            unreachable,
            elapsed,
        })
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashSet;
    use std::net::Ipv4Addr;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;
    use std::time::Duration;

    use async_trait::async_trait;

    use super::{ScanConfigBuilder, Scanner};
    use crate::error::Error;
    use crate::probe::{ProbeOutcome, ProbeStatus, Prober};
    use crate::range::AddressRange;

    /// Reports reachable exactly for the addresses it was seeded with.
    struct StaticProber {
        reachable: HashSet<Ipv4Addr>,
    }

    impl StaticProber {
        fn new<const N: usize>(reachable: [Ipv4Addr; N]) -> Self {
            Self {
                reachable: reachable.into_iter().collect(),
            }
        }
    }

    #[async_trait]
    impl Prober for StaticProber {
        async fn probe(&self, target: Ipv4Addr, _timeout: Duration) -> ProbeOutcome {
            let status = if self.reachable.contains(&target) {
                ProbeStatus::Reachable
            } else {
                ProbeStatus::Unreachable
            };
            ProbeOutcome::new(status, target)
        }
    }

    /// Tracks how many probes were issued and the peak number in flight.
    #[derive(Clone, Default)]
    struct CountingProber {
        issued: Arc<AtomicUsize>,
        in_flight: Arc<AtomicUsize>,
        peak: Arc<AtomicUsize>,
    }

    #[async_trait]
    impl Prober for CountingProber {
        async fn probe(&self, target: Ipv4Addr, _timeout: Duration) -> ProbeOutcome {
            self.issued.fetch_add(1, Ordering::SeqCst);
            let current = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
            self.peak.fetch_max(current, Ordering::SeqCst);
            tokio::time::sleep(Duration::from_millis(5)).await;
            self.in_flight.fetch_sub(1, Ordering::SeqCst);
            ProbeOutcome::new(ProbeStatus::Unreachable, target)
        }
    }

    /// Completes probes for high addresses before low ones.
    struct SkewedProber;

    #[async_trait]
    impl Prober for SkewedProber {
        async fn probe(&self, target: Ipv4Addr, _timeout: Duration) -> ProbeOutcome {
            let delay = 200u64.saturating_sub(u64::from(target.octets()[3]) * 10);
            tokio::time::sleep(Duration::from_millis(delay)).await;
            ProbeOutcome::new(ProbeStatus::Unreachable, target)
        }
    }

    fn addr(d: u8) -> Ipv4Addr {
        Ipv4Addr::new(10, 0, 0, d)
    }

    #[tokio::test]
    async fn all_unreachable_slash_30() {
        let scanner = Scanner::new(StaticProber::new([]), ScanConfigBuilder::new().build());
        let range: AddressRange = "10.0.0.0/30".parse().unwrap();
        let result = scanner.scan(&range).await.unwrap();
        assert_eq!(result.total, 2);
        assert_eq!(result.reachable, 0);
        assert_eq!(result.unreachable, vec![addr(1), addr(2)]);
    }

    #[tokio::test]
    async fn mixed_outcomes_slash_30() {
        let scanner = Scanner::new(
            StaticProber::new([addr(1)]),
            ScanConfigBuilder::new().build(),
        );
        let range: AddressRange = "10.0.0.0/30".parse().unwrap();
        let result = scanner.scan(&range).await.unwrap();
        assert_eq!(result.reachable, 1);
        assert_eq!(result.unreachable, vec![addr(2)]);
    }

    #[tokio::test]
    async fn every_host_is_classified_exactly_once() {
        let prober = CountingProber::default();
        let scanner = Scanner::new(
            prober.clone(),
            ScanConfigBuilder::new().with_concurrency(32).build(),
        );
        let range: AddressRange = "192.168.0.0/24".parse().unwrap();
        let result = scanner.scan(&range).await.unwrap();
        assert_eq!(result.total, 254);
        assert_eq!(result.reachable + result.unreachable.len() as u64, 254);
        assert_eq!(prober.issued.load(Ordering::SeqCst), 254);
    }

    #[tokio::test]
    async fn concurrency_ceiling_is_respected() {
        let prober = CountingProber::default();
        let scanner = Scanner::new(
            prober.clone(),
            ScanConfigBuilder::new().with_concurrency(8).build(),
        );
        let range: AddressRange = "192.168.0.0/24".parse().unwrap();
        scanner.scan(&range).await.unwrap();
        let peak = prober.peak.load(Ordering::SeqCst);
        assert!(peak <= 8, "peak in-flight probes was {peak}");
        assert!(peak > 1, "probes never overlapped");
    }

    #[tokio::test]
    async fn unreachable_list_is_sorted_despite_completion_order() {
        let scanner = Scanner::new(
            SkewedProber,
            ScanConfigBuilder::new().with_concurrency(16).build(),
        );
        let range: AddressRange = "10.0.0.0/28".parse().unwrap();
        let result = scanner.scan(&range).await.unwrap();
        let expected: Vec<Ipv4Addr> = (1..=14).map(addr).collect();
        assert_eq!(result.unreachable, expected);
    }

    #[tokio::test]
    async fn deterministic_prober_gives_identical_results() {
        let range: AddressRange = "10.0.0.0/28".parse().unwrap();
        let mut runs = Vec::new();
        for _ in 0..2 {
            let scanner = Scanner::new(
                StaticProber::new([addr(1), addr(5)]),
                ScanConfigBuilder::new().with_concurrency(4).build(),
            );
            runs.push(scanner.scan(&range).await.unwrap());
        }
        assert_eq!(runs[0].total, runs[1].total);
        assert_eq!(runs[0].reachable, runs[1].reachable);
        assert_eq!(runs[0].unreachable, runs[1].unreachable);
    }

    #[tokio::test]
    async fn cancelled_scan_issues_no_further_probes() {
        let prober = CountingProber::default();
        let scanner = Scanner::new(prober.clone(), ScanConfigBuilder::new().build());
        scanner.cancellation_token().cancel();
        let range: AddressRange = "192.168.0.0/24".parse().unwrap();
        let err = scanner.scan(&range).await.unwrap_err();
        assert!(matches!(err, Error::Cancelled));
        assert_eq!(prober.issued.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn declined_confirmation_aborts_before_probing() {
        let prober = CountingProber::default();
        let scanner = Scanner::new(
            prober.clone(),
            ScanConfigBuilder::new().with_large_scan_threshold(8).build(),
        )
        .with_confirm(|_| false);
        let range: AddressRange = "192.168.0.0/24".parse().unwrap();
        let err = scanner.scan(&range).await.unwrap_err();
        assert!(matches!(err, Error::Aborted));
        assert_eq!(prober.issued.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn accepted_confirmation_proceeds() {
        let seen_count = Arc::new(AtomicUsize::new(0));
        let hook_count = Arc::clone(&seen_count);
        let scanner = Scanner::new(
            StaticProber::new([]),
            ScanConfigBuilder::new().with_large_scan_threshold(1).build(),
        )
        .with_confirm(move |hosts| {
            hook_count.store(hosts as usize, Ordering::SeqCst);
            true
        });
        let range: AddressRange = "10.0.0.0/30".parse().unwrap();
        let result = scanner.scan(&range).await.unwrap();
        assert_eq!(result.total, 2);
        assert_eq!(seen_count.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn small_range_skips_confirmation() {
        let scanner = Scanner::new(StaticProber::new([]), ScanConfigBuilder::new().build())
            .with_confirm(|_| false);
        let range: AddressRange = "10.0.0.0/30".parse().unwrap();
        assert!(scanner.scan(&range).await.is_ok());
    }
}
