//! A scripted, in-memory network for driving whole scans.
#![allow(dead_code)]

use std::collections::{HashMap, HashSet};
use std::net::SocketAddr;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use mgrhunt::address::{parse_network, NetworkIterator};
use mgrhunt::credentials::Guess;
use mgrhunt::scanner::transport::{Reply, Transport};
use mgrhunt::scanner::{ScanSettings, ScanState, Scanner};
use reqwest::{StatusCode, Url};
use tokio::io;

/// How one URL answers.
#[derive(Debug, Clone)]
pub struct Endpoint {
    anonymous: Reply,
    accepted: Vec<Guess>,
    rejected: StatusCode,
}

impl Endpoint {
    /// Answers `status` to everything.
    pub fn status(status: StatusCode) -> Self {
        Self {
            anonymous: Reply::new(status),
            accepted: Vec::new(),
            rejected: status,
        }
    }

    /// `401` unless one of `accepted` is sent, then `200`.
    pub fn guarded(accepted: &[Guess]) -> Self {
        Self {
            anonymous: Reply::new(StatusCode::UNAUTHORIZED),
            accepted: accepted.to_vec(),
            rejected: StatusCode::UNAUTHORIZED,
        }
    }

    /// `401` without credentials, `200` for one of `accepted` and `rejected`
    /// for any other guess.
    pub fn guarded_rejecting(accepted: &[Guess], rejected: StatusCode) -> Self {
        Self {
            rejected,
            ..Self::guarded(accepted)
        }
    }

    pub fn redirect(location: &str) -> Self {
        Self {
            anonymous: Reply::redirect(StatusCode::FOUND, location),
            accepted: Vec::new(),
            rejected: StatusCode::FOUND,
        }
    }
}

/// Hosts whose ports are open answer according to their routes. Any URL
/// without a route refuses the connection.
#[derive(Debug, Default)]
pub struct MockTransport {
    open: HashSet<SocketAddr>,
    exhausted: HashSet<SocketAddr>,
    routes: HashMap<String, Endpoint>,
    requests: Mutex<Vec<(String, Option<Guess>)>>,
}

impl MockTransport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn open(mut self, addr: &str) -> Self {
        self.open.insert(addr.parse().unwrap());
        self
    }

    /// Connecting to `addr` fails as if the process ran out of descriptors.
    pub fn exhausted(mut self, addr: &str) -> Self {
        self.exhausted.insert(addr.parse().unwrap());
        self
    }

    pub fn route(mut self, url: &str, endpoint: Endpoint) -> Self {
        self.routes.insert(url.to_owned(), endpoint);
        self
    }

    pub fn requests(&self) -> Vec<(String, Option<Guess>)> {
        self.requests.lock().unwrap().clone()
    }

    pub fn requests_to(&self, url: &str) -> usize {
        self.requests()
            .iter()
            .filter(|(requested, _)| requested == url)
            .count()
    }

    pub fn authenticated_requests(&self) -> usize {
        self.requests()
            .iter()
            .filter(|(_, guess)| guess.is_some())
            .count()
    }
}

#[async_trait]
impl Transport for MockTransport {
    async fn connect(&self, addr: SocketAddr, _timeout: Duration) -> io::Result<()> {
        if self.exhausted.contains(&addr) {
            return Err(io::Error::other("Too many open files (os error 24)"));
        }
        if self.open.contains(&addr) {
            Ok(())
        } else {
            Err(io::ErrorKind::ConnectionRefused.into())
        }
    }

    async fn get(&self, url: &Url, credentials: Option<&Guess>) -> io::Result<Reply> {
        self.requests
            .lock()
            .unwrap()
            .push((url.to_string(), credentials.cloned()));
        tokio::task::yield_now().await;

        let endpoint = self
            .routes
            .get(url.as_str())
            .ok_or_else(|| io::Error::from(io::ErrorKind::ConnectionRefused))?;

        Ok(match credentials {
            None => endpoint.anonymous.clone(),
            Some(guess) if endpoint.accepted.contains(guess) => Reply::new(StatusCode::OK),
            Some(_) => Reply::new(endpoint.rejected),
        })
    }
}

/// Settings for fast tests: one port, no pauses between guesses.
pub fn settings(ports: &[u16], guesses: Vec<Guess>) -> ScanSettings {
    ScanSettings {
        ports: ports.to_vec(),
        guesses,
        concurrency: 4,
        avoid_lockout: false,
        greppable: true,
        ..ScanSettings::default()
    }
}

pub fn scanner(network: &str, settings: ScanSettings, transport: &Arc<MockTransport>) -> Scanner {
    let network = parse_network(network).unwrap();
    let transport: Arc<dyn Transport> = transport.clone();
    Scanner::new(NetworkIterator::new(&network), settings, transport)
}

pub fn state(settings: ScanSettings, transport: &Arc<MockTransport>) -> Arc<ScanState> {
    let network = parse_network("10.0.0.0/30").unwrap();
    let transport: Arc<dyn Transport> = transport.clone();
    Arc::new(ScanState::new(
        NetworkIterator::new(&network),
        settings,
        transport,
    ))
}

pub fn guesses(pairs: &[(&str, &str)]) -> Vec<Guess> {
    pairs
        .iter()
        .map(|(user, pass)| Guess::new(*user, *pass))
        .collect()
}
