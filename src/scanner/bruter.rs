//! Paced credential guessing against one target.
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use log::debug;
use reqwest::StatusCode;
use tokio::time;

use super::state::{BruterRegistration, ScanState, Scheme, Target};
use super::transport::too_many_open_files;
use super::Task;
use crate::credentials::Guess;

/// Created for every target that asked for credentials. Queues the guesses
/// a few at a time and waits between batches, so servers that lock
/// accounts after repeated failures forget earlier attempts first.
#[derive(Debug)]
pub(crate) struct Bruter {
    state: Arc<ScanState>,
    target: Arc<Target>,
    cursor: usize,
    lockout_delay: Duration,
    found: Arc<AtomicBool>,
    _registration: BruterRegistration,
}

impl Bruter {
    /// Registers a bruter for `target` right away and lets it queue work in
    /// the background.
    pub(crate) fn spawn(state: &Arc<ScanState>, target: Target) {
        let bruter = Self::new(state, target);
        tokio::spawn(bruter.generate_work());
    }

    fn new(state: &Arc<ScanState>, target: Target) -> Self {
        Self {
            _registration: state.register_bruter(),
            state: Arc::clone(state),
            target: Arc::new(target),
            cursor: 0,
            lockout_delay: state.settings().lockout_delay(),
            found: Arc::new(AtomicBool::new(false)),
        }
    }

    async fn generate_work(mut self) {
        debug!("Bruter created for {}", self.target);
        let settings = self.state.settings();
        let guesses = &settings.guesses;
        let sender = self.state.brute_sender();

        loop {
            if self.found.load(Ordering::Relaxed) {
                debug!("Credentials for {} found, no more guesses", self.target);
                break;
            }

            let end = (self.cursor + settings.tries_per_window).min(guesses.len());
            for guess in &guesses[self.cursor..end] {
                let task = Task::BruteAttempt {
                    target: Arc::clone(&self.target),
                    guess: guess.clone(),
                    found: Arc::clone(&self.found),
                };
                // The queue only closes once this bruter is unregistered.
                if sender.send(task).await.is_err() {
                    debug!("Brute queue closed under the bruter for {}", self.target);
                    return;
                }
            }
            self.cursor = end;

            if self.cursor >= guesses.len() {
                break;
            }
            if settings.avoid_lockout {
                debug!(
                    "Waiting {:?} before guessing more against {}",
                    self.lockout_delay, self.target
                );
                time::sleep(self.lockout_delay).await;
            }
        }

        debug!("Bruter for {} is done", self.target);
    }
}

/// Tries one credential, falling back from HTTP to HTTPS once on `400`.
pub(crate) async fn attempt(state: &ScanState, target: &Target, guess: &Guess, found: &AtomicBool) {
    let mut scheme = target.scheme;

    loop {
        let candidate = target.with_scheme(scheme);
        let Some(url) = candidate.url() else {
            return;
        };

        state.note_attempt();
        match state.transport().get(&url, Some(guess)).await {
            Ok(reply) if reply.status == StatusCode::OK => {
                found.store(true, Ordering::Relaxed);
                state.report_success(candidate, guess.clone());
                return;
            }
            Ok(reply) if reply.status == StatusCode::BAD_REQUEST && scheme == Scheme::Http => {
                scheme = Scheme::Https;
            }
            Ok(reply) => {
                debug!("{guess} rejected by {url} ({})", reply.status);
                return;
            }
            Err(e) => {
                if too_many_open_files(&e) {
                    state.note_descriptor_exhaustion();
                } else {
                    debug!("Guess {guess} against {url} failed: {e}");
                }
                return;
            }
        }
    }
}
