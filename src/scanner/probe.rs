//! Finds out whether an open port serves the manager and whether it asks
//! for credentials.
use std::net::SocketAddr;
use std::sync::Arc;

use log::{debug, info, warn};
use reqwest::{StatusCode, Url};

use super::bruter::Bruter;
use super::state::{ScanState, Scheme, Target};
use super::transport::too_many_open_files;
use crate::detail;

/// How probing a target ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProbeOutcome {
    /// No HTTP answer at all.
    Unreachable,
    /// `404` or `403`: no manager here.
    Absent,
    /// `401`: a bruter was started for this target.
    Guarded(Target),
    /// Any other answer, including a second `400` or an unusable redirect.
    Unexpected(StatusCode),
}

/// Connects to `addr` and, if the port is open, probes it for the manager.
pub(crate) async fn check_port(state: &Arc<ScanState>, addr: SocketAddr) {
    let settings = state.settings();

    if let Err(e) = state
        .transport()
        .connect(addr, settings.connect_timeout)
        .await
    {
        if too_many_open_files(&e) {
            state.note_descriptor_exhaustion();
        } else {
            debug!("{addr} is closed: {e}");
        }
        return;
    }

    state.note_open_port();
    detail!(
        format!("{addr} is open"),
        settings.greppable,
        settings.accessible
    );

    let target = Target::new(addr.ip().to_string(), addr.port(), &settings.manager_path);
    check_endpoint(state, target).await;
}

/// Requests the manager path without credentials and acts on the answer.
///
/// The request is retried at most once over HTTPS (after a `400` under
/// HTTP) and at most one redirect is followed, so a target never costs more
/// than four requests. On `401` a bruter is registered before this returns.
pub async fn check_endpoint(state: &Arc<ScanState>, mut target: Target) -> ProbeOutcome {
    let mut redirected = false;

    loop {
        let Some(url) = target.url() else {
            warn!("Cannot build a URL for {target}{}", target.manager_path);
            return ProbeOutcome::Unreachable;
        };

        let reply = match state.transport().get(&url, None).await {
            Ok(reply) => reply,
            Err(e) => {
                if too_many_open_files(&e) {
                    state.note_descriptor_exhaustion();
                } else {
                    debug!("{url} did not answer: {e}");
                }
                return ProbeOutcome::Unreachable;
            }
        };

        match reply.status {
            StatusCode::NOT_FOUND | StatusCode::FORBIDDEN => {
                debug!("Manager not found at {url} ({})", reply.status);
                return ProbeOutcome::Absent;
            }
            StatusCode::UNAUTHORIZED => {
                state.announce_manager(&url);
                Bruter::spawn(state, target.clone());
                return ProbeOutcome::Guarded(target);
            }
            StatusCode::BAD_REQUEST if target.scheme == Scheme::Http => {
                debug!("{url} answered 400, retrying over https");
                target = target.with_scheme(Scheme::Https);
            }
            status if status.is_redirection() && !redirected => {
                let resolved = reply
                    .location
                    .as_deref()
                    .and_then(|location| resolve_redirect(&url, &target, location));
                let Some(resolved) = resolved else {
                    warn!(
                        "Unusable redirect from {url} to {:?}, giving up on {target}",
                        reply.location
                    );
                    return ProbeOutcome::Unexpected(status);
                };
                debug!("{url} redirects to {}", resolved);
                redirected = true;
                target = resolved;
            }
            status => {
                info!("{url} answered {status}, not trying credentials");
                return ProbeOutcome::Unexpected(status);
            }
        }
    }
}

/// Resolves `location` against the request URL. Host, port and scheme come
/// from the redirect. A redirect within the same origin also supplies the
/// path; otherwise the configured manager path is kept. Returns `None` if
/// the result is unusable or would repeat the same request.
fn resolve_redirect(url: &Url, target: &Target, location: &str) -> Option<Target> {
    let next = url.join(location).ok()?;
    let scheme = match next.scheme() {
        "http" => Scheme::Http,
        "https" => Scheme::Https,
        _ => return None,
    };
    let host = next.host_str()?.to_owned();
    let port = next.port_or_known_default()?;

    let same_origin = host == target.host && port == target.port && scheme == target.scheme;
    let manager_path = if same_origin {
        next.path().to_owned()
    } else {
        target.manager_path.clone()
    };

    let resolved = Target {
        host,
        port,
        manager_path,
        scheme,
    };
    (resolved != *target).then_some(resolved)
}
