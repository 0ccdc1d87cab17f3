//! State shared by the dispatcher, the workers and every bruter of one scan.
use std::fmt;
use std::net::Ipv4Addr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use async_channel::{Receiver, Sender};
use colored::Colorize;
use log::{debug, warn};
use reqwest::Url;
use serde_derive::Serialize;

use super::transport::Transport;
use super::Task;
use crate::address::NetworkIterator;
use crate::credentials::{default_guesses, Guess};
use crate::input::{DEFAULT_MANAGER_PATH, DEFAULT_PORTS};
use crate::{detail, output, warning};

/// URL scheme of a target. Probing always starts with plain HTTP.
#[derive(Serialize, Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum Scheme {
    Http,
    Https,
}

impl Scheme {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Http => "http",
            Self::Https => "https",
        }
    }
}

impl fmt::Display for Scheme {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One HTTP endpoint that may host the manager.
#[derive(Serialize, Debug, Clone, PartialEq, Eq, Hash)]
pub struct Target {
    pub host: String,
    pub port: u16,
    pub manager_path: String,
    pub scheme: Scheme,
}

impl Target {
    pub fn new(host: impl Into<String>, port: u16, manager_path: impl Into<String>) -> Self {
        Self {
            host: host.into(),
            port,
            manager_path: manager_path.into(),
            scheme: Scheme::Http,
        }
    }

    #[must_use]
    pub fn with_scheme(&self, scheme: Scheme) -> Self {
        Self {
            scheme,
            ..self.clone()
        }
    }

    /// `scheme://host:port/manager_path`, or `None` if that is not a valid URL.
    pub fn url(&self) -> Option<Url> {
        Url::parse(&format!(
            "{}://{}:{}{}",
            self.scheme, self.host, self.port, self.manager_path
        ))
        .ok()
    }
}

impl fmt::Display for Target {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.host, self.port)
    }
}

/// A credential that was accepted by a target.
#[derive(Serialize, Debug, Clone, PartialEq, Eq)]
pub struct Finding {
    pub target: Target,
    pub guess: Guess,
}

/// What a finished scan found and how much work it took.
#[derive(Serialize, Debug, Clone, Default, PartialEq, Eq)]
pub struct ScanSummary {
    pub findings: Vec<Finding>,
    pub addresses: u64,
    pub open_ports: u64,
    pub managers_found: u64,
    pub attempts: u64,
    pub descriptor_warnings: u64,
}

/// Read-only knobs of one scan.
#[derive(Debug, Clone)]
pub struct ScanSettings {
    pub ports: Vec<u16>,
    pub manager_path: String,
    pub guesses: Vec<Guess>,
    /// Timeout of every HTTP request.
    pub timeout: Duration,
    /// Timeout of the initial open-port check.
    pub connect_timeout: Duration,
    /// Number of workers.
    pub concurrency: usize,
    /// Pause between guess batches against the same target.
    pub avoid_lockout: bool,
    /// How long a server is expected to remember failed logins.
    pub lockout_window: Duration,
    /// Guesses per target per lockout window.
    pub tries_per_window: usize,
    pub greppable: bool,
    pub accessible: bool,
}

impl Default for ScanSettings {
    fn default() -> Self {
        Self {
            ports: DEFAULT_PORTS.to_vec(),
            manager_path: DEFAULT_MANAGER_PATH.to_owned(),
            guesses: default_guesses(),
            timeout: Duration::from_millis(5000),
            connect_timeout: Duration::from_millis(1500),
            concurrency: 100,
            avoid_lockout: true,
            lockout_window: Duration::from_secs(300),
            tries_per_window: 3,
            greppable: false,
            accessible: false,
        }
    }
}

impl ScanSettings {
    /// Time a bruter waits between batches. Attempts are only queued, not
    /// executed, when the bruter moves on, so two request timeouts are added
    /// on top of the lockout window to let the batch drain. Saturates
    /// instead of overflowing for absurd operator values.
    pub fn lockout_delay(&self) -> Duration {
        self.lockout_window
            .saturating_add(self.timeout.saturating_mul(2))
    }
}

/// Bookkeeping that decides when the brute queue may close.
///
/// The brute queue closes once discovery is over (`scan_finished`), no
/// scan task is still probing (`scans_in_flight`, since a probe may still
/// start a bruter) and no bruter is left to queue attempts (`active_bruters`).
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct Tracking {
    pub scan_finished: bool,
    pub scans_in_flight: usize,
    pub active_bruters: usize,
    pub brute_queue_closed: bool,
}

impl Tracking {
    const fn is_done(&self) -> bool {
        self.scan_finished && self.scans_in_flight == 0 && self.active_bruters == 0
    }
}

#[derive(Debug, Default)]
struct Counters {
    open_ports: AtomicU64,
    managers_found: AtomicU64,
    attempts: AtomicU64,
    descriptor_warnings: AtomicU64,
}

/// Everything the pipeline shares: the address walk, the settings, the
/// transport, both work queues and the termination bookkeeping.
pub struct ScanState {
    network: NetworkIterator,
    settings: ScanSettings,
    transport: Arc<dyn Transport>,
    scan_tx: Sender<Task>,
    scan_rx: Receiver<Task>,
    brute_tx: Sender<Task>,
    brute_rx: Receiver<Task>,
    tracking: Mutex<Tracking>,
    findings: Mutex<Vec<Finding>>,
    counters: Counters,
}

impl ScanState {
    /// Both queues hold twice as many tasks as there are workers, so
    /// producers wait instead of buffering an entire network.
    pub fn new(
        network: NetworkIterator,
        mut settings: ScanSettings,
        transport: Arc<dyn Transport>,
    ) -> Self {
        settings.concurrency = settings.concurrency.max(1);
        settings.tries_per_window = settings.tries_per_window.max(1);
        if settings.guesses.is_empty() {
            warn!("No credentials were supplied, using the built-in list");
            settings.guesses = default_guesses();
        }

        let capacity = 2 * settings.concurrency;
        let (scan_tx, scan_rx) = async_channel::bounded(capacity);
        let (brute_tx, brute_rx) = async_channel::bounded(capacity);

        Self {
            network,
            settings,
            transport,
            scan_tx,
            scan_rx,
            brute_tx,
            brute_rx,
            tracking: Mutex::new(Tracking::default()),
            findings: Mutex::new(Vec::new()),
            counters: Counters::default(),
        }
    }

    pub const fn settings(&self) -> &ScanSettings {
        &self.settings
    }

    pub fn transport(&self) -> &dyn Transport {
        self.transport.as_ref()
    }

    pub fn next_address(&self) -> Option<Ipv4Addr> {
        self.network.next_address()
    }

    pub(crate) const fn scan_sender(&self) -> &Sender<Task> {
        &self.scan_tx
    }

    pub(crate) fn scan_receiver(&self) -> Receiver<Task> {
        self.scan_rx.clone()
    }

    pub(crate) const fn brute_sender(&self) -> &Sender<Task> {
        &self.brute_tx
    }

    pub(crate) fn brute_receiver(&self) -> Receiver<Task> {
        self.brute_rx.clone()
    }

    fn lock_tracking(&self) -> MutexGuard<'_, Tracking> {
        self.tracking.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Current bookkeeping values.
    pub fn tracking(&self) -> Tracking {
        *self.lock_tracking()
    }

    // Must be called with the tracking lock held, so the decision and the
    // close cannot interleave with another register/unregister.
    fn close_brute_queue_if_done(&self, tracking: &mut Tracking) {
        if tracking.is_done() && !tracking.brute_queue_closed {
            tracking.brute_queue_closed = true;
            let newly_closed = self.brute_tx.close();
            debug_assert!(newly_closed, "brute queue closed twice");
            debug!("Brute queue closed");
        }
    }

    /// A scan task is about to be queued.
    pub(crate) fn begin_scan(&self) {
        self.lock_tracking().scans_in_flight += 1;
    }

    /// Marks the running scan task as finished once the returned guard is
    /// dropped, also when the task panics.
    pub(crate) const fn scan_completion(&self) -> ScanCompletion<'_> {
        ScanCompletion { state: self }
    }

    /// A scan task has finished, including starting its bruter, if any.
    pub(crate) fn finish_scan(&self) {
        let mut tracking = self.lock_tracking();
        tracking.scans_in_flight = tracking.scans_in_flight.saturating_sub(1);
        self.close_brute_queue_if_done(&mut tracking);
    }

    /// Every scan task has been queued. Returns the number of bruters
    /// still running.
    pub(crate) fn mark_scan_finished(&self) -> usize {
        let mut tracking = self.lock_tracking();
        tracking.scan_finished = true;
        self.close_brute_queue_if_done(&mut tracking);
        tracking.active_bruters
    }

    /// Counts a bruter as active until the returned guard is dropped.
    pub(crate) fn register_bruter(self: &Arc<Self>) -> BruterRegistration {
        self.lock_tracking().active_bruters += 1;
        self.counters.managers_found.fetch_add(1, Ordering::Relaxed);
        BruterRegistration {
            state: Arc::clone(self),
        }
    }

    fn unregister_bruter(&self) {
        let mut tracking = self.lock_tracking();
        tracking.active_bruters = tracking.active_bruters.saturating_sub(1);
        self.close_brute_queue_if_done(&mut tracking);
    }

    pub(crate) fn note_open_port(&self) {
        self.counters.open_ports.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn note_attempt(&self) {
        self.counters.attempts.fetch_add(1, Ordering::Relaxed);
    }

    /// The OS refused a socket. The scan goes on, but results are missing,
    /// which the operator has to know about.
    pub(crate) fn note_descriptor_exhaustion(&self) {
        let previous = self
            .counters
            .descriptor_warnings
            .fetch_add(1, Ordering::Relaxed);
        if previous == 0 {
            warning!(
                "Too many open files. The OS is limiting file descriptors and YOU ARE MISSING SCAN RESULTS. Lower the concurrency or raise the ulimit.",
                self.settings.greppable,
                self.settings.accessible
            );
        } else {
            debug!("Too many open files ({} times so far)", previous + 1);
        }
    }

    /// Records and prints a working credential.
    pub(crate) fn report_success(&self, target: Target, guess: Guess) {
        let url = target
            .url()
            .map_or_else(|| target.to_string(), |url| url.to_string());

        if self.settings.greppable {
            println!("{url} {guess}");
        } else if self.settings.accessible {
            output!(format!("Success {guess} on {url}"));
        } else {
            output!(format!(
                "Success {} on {}",
                guess.to_string().green().bold(),
                url.purple()
            ));
        }

        self.findings
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(Finding { target, guess });
    }

    pub(crate) fn announce_manager(&self, url: &Url) {
        detail!(
            format!("Manager found at {url}, starting to guess credentials"),
            self.settings.greppable,
            self.settings.accessible
        );
    }

    pub fn summary(&self) -> ScanSummary {
        ScanSummary {
            findings: self
                .findings
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .clone(),
            addresses: self.network.len(),
            open_ports: self.counters.open_ports.load(Ordering::Relaxed),
            managers_found: self.counters.managers_found.load(Ordering::Relaxed),
            attempts: self.counters.attempts.load(Ordering::Relaxed),
            descriptor_warnings: self.counters.descriptor_warnings.load(Ordering::Relaxed),
        }
    }
}

impl fmt::Debug for ScanState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ScanState")
            .field("network", &self.network)
            .field("settings", &self.settings)
            .field("tracking", &self.tracking())
            .finish_non_exhaustive()
    }
}

/// Keeps a bruter counted as active. Dropping it unregisters the bruter,
/// which may close the brute queue.
#[derive(Debug)]
pub(crate) struct BruterRegistration {
    state: Arc<ScanState>,
}

impl Drop for BruterRegistration {
    fn drop(&mut self) {
        self.state.unregister_bruter();
    }
}

/// Held by the worker while it runs one `ScanPort` task.
#[derive(Debug)]
pub(crate) struct ScanCompletion<'a> {
    state: &'a ScanState,
}

impl Drop for ScanCompletion<'_> {
    fn drop(&mut self) {
        self.state.finish_scan();
    }
}
