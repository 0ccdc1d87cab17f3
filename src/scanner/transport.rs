//! The network primitives the scanner is built on: opening a TCP connection
//! and issuing a GET, optionally with Basic-Auth credentials.
use std::error::Error;
use std::fmt::Write as _;
use std::net::SocketAddr;
use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use log::debug;
use reqwest::header::LOCATION;
use reqwest::redirect::Policy;
use reqwest::{Client, StatusCode, Url};
use tokio::io::{self, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::time;

use crate::credentials::Guess;

/// What the scanner needs to know about an HTTP response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reply {
    pub status: StatusCode,
    /// Raw `Location` header, if any.
    pub location: Option<String>,
}

impl Reply {
    pub const fn new(status: StatusCode) -> Self {
        Self {
            status,
            location: None,
        }
    }

    pub fn redirect(status: StatusCode, location: impl Into<String>) -> Self {
        Self {
            status,
            location: Some(location.into()),
        }
    }
}

/// Network access used by every scan and brute task.
///
/// One instance is shared by all workers, so implementations must be safe
/// to call concurrently. Errors are plain [`io::Error`]s; the scanner only
/// distinguishes descriptor exhaustion (see [`too_many_open_files`]) from
/// everything else.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Succeeds if a TCP connection to `addr` can be opened within `timeout`.
    async fn connect(&self, addr: SocketAddr, timeout: Duration) -> io::Result<()>;

    /// Issues a GET for `url` without following redirects.
    async fn get(&self, url: &Url, credentials: Option<&Guess>) -> io::Result<Reply>;
}

/// [`Transport`] backed by tokio sockets and one shared `reqwest` client.
#[derive(Debug, Clone)]
pub struct HttpTransport {
    client: Client,
}

impl HttpTransport {
    /// Builds the shared client. Redirects are never followed automatically
    /// since the scanner inspects them itself. With `verify_certs` off,
    /// self-signed and mismatching certificates are accepted.
    pub fn new(timeout: Duration, verify_certs: bool) -> Result<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .connect_timeout(timeout)
            .redirect(Policy::none())
            .danger_accept_invalid_certs(!verify_certs)
            .build()
            .context("Failed to create HTTP client")?;

        Ok(Self { client })
    }
}

#[async_trait]
impl Transport for HttpTransport {
    async fn connect(&self, addr: SocketAddr, timeout: Duration) -> io::Result<()> {
        let stream = time::timeout(timeout, TcpStream::connect(addr)).await??;
        debug!("Connection was successful, shutting down stream {addr}");
        if let Err(e) = { stream }.shutdown().await {
            debug!("Shutdown stream error {e}");
        }
        Ok(())
    }

    async fn get(&self, url: &Url, credentials: Option<&Guess>) -> io::Result<Reply> {
        let mut request = self.client.get(url.clone());
        if let Some(guess) = credentials {
            request = request.basic_auth(&guess.username, Some(&guess.password));
        }

        let response = request
            .send()
            .await
            .map_err(|e| io::Error::other(describe(&e)))?;

        let location = response
            .headers()
            .get(LOCATION)
            .and_then(|value| value.to_str().ok())
            .map(str::to_owned);

        Ok(Reply {
            status: response.status(),
            location,
        })
    }
}

/// True if `err` means the process ran out of file descriptors. Such
/// failures hide open ports, so they are reported instead of ignored.
pub fn too_many_open_files(err: &io::Error) -> bool {
    // EMFILE
    if cfg!(unix) && err.raw_os_error() == Some(24) {
        return true;
    }
    err.to_string().to_lowercase().contains("too many open files")
}

// reqwest wraps the interesting part (refused, reset, EMFILE, ...) a few
// levels down the source chain.
fn describe(err: &(dyn Error + 'static)) -> String {
    let mut message = err.to_string();
    let mut source = err.source();
    while let Some(inner) = source {
        let _ = write!(message, ": {inner}");
        source = inner.source();
    }
    message
}
