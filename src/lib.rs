//! This crate exposes the internal functionality of the mgrhunt manager
//! finder.
//!
//! mgrhunt walks every IPv4 address of a network in a pseudo-random order,
//! checks a handful of web ports on each host and requests the manager
//! application path. Every endpoint that asks for HTTP Basic
//! authentication is then tested against a list of credentials, paced so
//! that account lockouts on the server are avoided.
//!
//! ## Architecture Overview
//!
//! The scanning behaviour is managed by
//! [`Scanner`](crate::scanner::Scanner), which pulls addresses from a
//! [`NetworkIterator`](crate::address::NetworkIterator) and talks to the
//! network through a [`Transport`](crate::scanner::transport::Transport):
//!
//! 1. **Input Processing**: the network, ports and credential files are parsed
//! 2. **Discovery**: workers connect to every address and port, and probe open ports for the manager
//! 3. **Brute force**: every manager that answers `401` gets its own paced stream of guesses
//! 4. **Result Processing**: working credentials are printed as they are found and collected in a summary
//!
//! ## Basic Usage Example
//!
//! ```rust,no_run
//! use std::sync::Arc;
//!
//! use mgrhunt::address::{parse_network, NetworkIterator};
//! use mgrhunt::credentials::default_guesses;
//! use mgrhunt::scanner::transport::HttpTransport;
//! use mgrhunt::scanner::{ScanSettings, Scanner};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let network = parse_network("192.168.56.0/24")?;
//!     let settings = ScanSettings {
//!         ports: vec![8080, 8443],
//!         guesses: default_guesses(),
//!         ..ScanSettings::default()
//!     };
//!     let transport = HttpTransport::new(settings.timeout, false)?;
//!
//!     let scanner = Scanner::new(NetworkIterator::new(&network), settings, Arc::new(transport));
//!     let summary = scanner.run().await;
//!
//!     for finding in &summary.findings {
//!         println!("{} {}", finding.target, finding.guess);
//!     }
//!     Ok(())
//! }
//! ```
//!
//! ## Error Handling
//!
//! Unreachable hosts, refused connections and unexpected answers are part of
//! every scan and only show up in the debug log. Running out of file
//! descriptors is different: it silently hides results, so it is reported
//! once and counted in the
//! [`ScanSummary`](crate::scanner::ScanSummary).
#![allow(clippy::needless_doctest_main)]

pub mod tui;

pub mod input;

pub mod address;

pub mod credentials;

pub mod scanner;
