//! Core functionality for actual scanning behaviour.
//!
//! A scan runs in two phases that share one pool of workers. The dispatcher
//! fills the scan queue with one task per address and port. Workers check
//! each port and probe the manager path; every target answering `401`
//! gets a bruter which feeds credential attempts into the brute queue.
//! The brute queue closes once discovery is over and the last bruter is
//! done, and the workers stop when both queues are closed and drained.
mod bruter;
pub mod probe;
mod state;
pub mod transport;

pub use state::{Finding, ScanSettings, ScanState, ScanSummary, Scheme, Target, Tracking};

use std::net::SocketAddr;
use std::sync::atomic::AtomicBool;
use std::sync::Arc;

use futures::future::join_all;
use log::{debug, warn};

use crate::address::NetworkIterator;
use crate::credentials::Guess;
use crate::detail;
use transport::Transport;

/// A unit of work for the worker pool.
#[derive(Debug)]
pub(crate) enum Task {
    /// Check one port and probe it for the manager.
    ScanPort(SocketAddr),
    /// Queued after the last `ScanPort`; marks the end of discovery.
    ScanFinished,
    /// Try one credential against a target.
    BruteAttempt {
        target: Arc<Target>,
        guess: Guess,
        /// Set once any guess worked against this target.
        found: Arc<AtomicBool>,
    },
}

/// Runs a full discovery and brute force pass over one network.
///
/// ```rust,no_run
/// # use std::sync::Arc;
/// # use mgrhunt::address::{parse_network, NetworkIterator};
/// # use mgrhunt::scanner::{ScanSettings, Scanner};
/// # use mgrhunt::scanner::transport::HttpTransport;
/// # async fn scan() -> anyhow::Result<()> {
/// let network = parse_network("10.0.0.0/24")?;
/// let settings = ScanSettings::default();
/// let transport = HttpTransport::new(settings.timeout, false)?;
///
/// let scanner = Scanner::new(NetworkIterator::new(&network), settings, Arc::new(transport));
/// let summary = scanner.run().await;
/// println!("{} credentials found", summary.findings.len());
/// # Ok(())
/// # }
/// ```
#[derive(Debug)]
pub struct Scanner {
    state: Arc<ScanState>,
}

impl Scanner {
    pub fn new(
        network: NetworkIterator,
        settings: ScanSettings,
        transport: Arc<dyn Transport>,
    ) -> Self {
        Self {
            state: Arc::new(ScanState::new(network, settings, transport)),
        }
    }

    /// State shared with the workers, e.g. to inspect the bookkeeping.
    pub const fn state(&self) -> &Arc<ScanState> {
        &self.state
    }

    /// Runs until every address was probed and every bruter ran out of
    /// guesses. Returns all working credentials and some statistics.
    pub async fn run(self) -> ScanSummary {
        let settings = self.state.settings();
        debug!(
            "Start scanning.\nWorkers {}\nAddresses {}\nPorts {:?}\nGuesses {}",
            settings.concurrency,
            self.state.summary().addresses,
            settings.ports,
            settings.guesses.len()
        );

        let dispatcher = tokio::spawn(dispatch(Arc::clone(&self.state)));
        let workers: Vec<_> = (0..settings.concurrency)
            .map(|_| tokio::spawn(work(Arc::clone(&self.state))))
            .collect();

        if let Err(e) = dispatcher.await {
            warn!("Dispatcher stopped unexpectedly: {e}");
        }
        for result in join_all(workers).await {
            if let Err(e) = result {
                warn!("Worker stopped unexpectedly: {e}");
            }
        }

        let summary = self.state.summary();
        debug!("Scan finished: {summary:?}");
        summary
    }
}

/// Queues one scan task per address and port, then the end marker, then
/// closes the scan queue.
async fn dispatch(state: Arc<ScanState>) {
    let sender = state.scan_sender();
    let ports = &state.settings().ports;

    while let Some(ip) = state.next_address() {
        for &port in ports {
            state.begin_scan();
            if sender
                .send(Task::ScanPort(SocketAddr::new(ip.into(), port)))
                .await
                .is_err()
            {
                state.finish_scan();
            }
        }
    }

    if sender.send(Task::ScanFinished).await.is_err() {
        state.mark_scan_finished();
    }
    sender.close();
    debug!("All scan tasks queued");
}

enum Next {
    Run(Task),
    ScanClosed,
    BruteClosed,
}

/// One worker: takes tasks from whichever queue has one ready until both
/// queues are closed and empty.
async fn work(state: Arc<ScanState>) {
    let mut scan_queue = Some(state.scan_receiver());
    let mut brute_queue = Some(state.brute_receiver());

    loop {
        let next = match (&scan_queue, &brute_queue) {
            (Some(scan), Some(brute)) => tokio::select! {
                task = scan.recv() => task.map_or(Next::ScanClosed, Next::Run),
                task = brute.recv() => task.map_or(Next::BruteClosed, Next::Run),
            },
            (Some(scan), None) => scan.recv().await.map_or(Next::ScanClosed, Next::Run),
            (None, Some(brute)) => brute.recv().await.map_or(Next::BruteClosed, Next::Run),
            (None, None) => break,
        };

        match next {
            Next::Run(task) => execute(&state, task).await,
            Next::ScanClosed => scan_queue = None,
            Next::BruteClosed => brute_queue = None,
        }
    }
}

async fn execute(state: &Arc<ScanState>, task: Task) {
    match task {
        Task::ScanPort(addr) => {
            let _completion = state.scan_completion();
            probe::check_port(state, addr).await;
        }
        Task::ScanFinished => {
            let active = state.mark_scan_finished();
            let settings = state.settings();
            detail!(
                format!("Discovery finished, {active} bruters still running"),
                settings.greppable,
                settings.accessible
            );
        }
        Task::BruteAttempt {
            target,
            guess,
            found,
        } => bruter::attempt(state, &target, &guess, &found).await,
    }
}
