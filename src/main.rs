#![allow(clippy::doc_markdown)]
#![allow(clippy::unnecessary_debug_formatting)]
use mgrhunt::address::{parse_network, NetworkIterator};
use mgrhunt::credentials::build_guesses;
use mgrhunt::input::{Config, Opts};
use mgrhunt::scanner::transport::HttpTransport;
use mgrhunt::scanner::{ScanSummary, Scanner};
use mgrhunt::{detail, opening, output, warning};

use colorful::{Color, Colorful};
use std::process;
use std::sync::Arc;
use std::time::{Duration, Instant};

// Average value for Ubuntu
#[cfg(unix)]
const DEFAULT_FILE_DESCRIPTORS_LIMIT: u64 = 8000;
#[cfg(unix)]
// Sockets a single worker may hold at once: the port check, the plain and
// the TLS probe, and a few keep-alive connections of the shared client.
const SOCKETS_PER_WORKER: u64 = 7;

#[macro_use]
extern crate log;

#[cfg(not(tarpaulin_include))]
#[allow(clippy::too_many_lines)]
#[tokio::main]
/// Reads the command line, scans the network and reports every working
/// credential.
async fn main() {
    env_logger::init();

    let mut opts: Opts = Opts::read();
    let config = match Config::read(opts.config_path.clone()) {
        Ok(config) => config,
        Err(e) => {
            warning!(format!("Could not read the configuration file: {e}"));
            process::exit(1);
        }
    };
    opts.merge(&config);

    debug!("Main() `opts` arguments are {opts:?}");

    if !opts.greppable && !opts.accessible && !opts.no_banner {
        print_opening(&opts);
    }

    let Some(target) = opts.target.clone() else {
        warning!(
            "No target given. Pass a network such as --target 10.0.0.0/24.",
            opts.greppable,
            opts.accessible
        );
        process::exit(1);
    };

    let network = match parse_network(&target) {
        Ok(network) => network,
        Err(e) => {
            warning!(format!("{e:#}"), opts.greppable, opts.accessible);
            process::exit(1);
        }
    };

    let guesses = match build_guesses(
        opts.userpassfile.as_deref(),
        opts.userfile.as_deref(),
        opts.passfile.as_deref(),
        opts.dedup,
    ) {
        Ok(guesses) => guesses,
        Err(e) => {
            warning!(format!("{e:#}"), opts.greppable, opts.accessible);
            process::exit(1);
        }
    };

    #[cfg(unix)]
    check_ulimit(&opts);

    let settings = opts.scan_settings(guesses);
    let transport = match HttpTransport::new(settings.timeout, opts.verify_certs) {
        Ok(transport) => transport,
        Err(e) => {
            warning!(format!("{e:#}"), opts.greppable, opts.accessible);
            process::exit(1);
        }
    };

    let network = NetworkIterator::with_order(&network, opts.scan_order);
    detail!(
        format!(
            "Scanning {} addresses on ports {:?} with {} credentials",
            network.len(),
            settings.ports,
            settings.guesses.len()
        ),
        opts.greppable,
        opts.accessible
    );

    let scanner = Scanner::new(network, settings, Arc::new(transport));
    let started = Instant::now();
    let summary = scanner.run().await;

    print_summary(&opts, &summary, started.elapsed());

    if opts.json {
        match serde_json::to_string_pretty(&summary) {
            Ok(json) => println!("{json}"),
            Err(e) => warning!(format!("Could not serialize the results: {e}")),
        }
    }

    if summary.descriptor_warnings > 0 {
        warning!(
            format!(
                "The OS refused {} sockets because of the file descriptor limit. Results are incomplete.",
                summary.descriptor_warnings
            ),
            opts.greppable,
            opts.accessible
        );
    }
}

/// Prints the opening title of mgrhunt
#[allow(clippy::items_after_statements, clippy::needless_raw_string_hashes)]
fn print_opening(opts: &Opts) {
    debug!("Printing opening");
    let s = r#"
                       _                 _
 _ __ ___   __ _ _ __| |__  _   _ _ __ | |_
| '_ ` _ \ / _` | '__| '_ \| | | | '_ \| __|
| | | | | | (_| | |  | | | | |_| | | | | |_
|_| |_| |_|\__, |_|  |_| |_|\__,_|_| |_|\__|
           |___/
Default credentials never die, they just wait for a scan."#;
    println!("{}", s.gradient(Color::Green).bold());
    let info = r#"________________________________________
: Only test networks you are allowed to :
: touch. Guessing can lock out accounts :
 ----------------------------------------"#;
    println!("{}", info.gradient(Color::Yellow).bold());
    opening!();

    let config_path = opts
        .config_path
        .clone()
        .or_else(mgrhunt::input::default_config_path);

    if let Some(path) = config_path {
        detail!(
            format!("The config file is expected to be at {path:?}"),
            opts.greppable,
            opts.accessible
        );
    }
}

fn print_summary(opts: &Opts, summary: &ScanSummary, elapsed: Duration) {
    if opts.greppable {
        return;
    }

    detail!(
        format!("Completed in {elapsed:.2?}"),
        opts.greppable,
        opts.accessible
    );

    output!(
        format!(
            "Scanned {} addresses: {} open ports, {} managers, {} attempts, {} credentials found",
            summary.addresses,
            summary.open_ports,
            summary.managers_found,
            summary.attempts,
            summary.findings.len()
        ),
        opts.greppable,
        opts.accessible
    );

    for finding in &summary.findings {
        let url = finding
            .target
            .url()
            .map_or_else(|| finding.target.to_string(), |url| url.to_string());
        output!(
            format!("{url} {}", finding.guess),
            opts.greppable,
            opts.accessible
        );
    }
}

/// Raises the file descriptor limit if asked to and warns when the
/// concurrency could exhaust it.
#[cfg(unix)]
fn check_ulimit(opts: &Opts) {
    let soft = adjust_ulimit_size(opts);
    let needed = (opts.concurrency as u64).saturating_mul(SOCKETS_PER_WORKER);

    if needed > soft {
        warning!(
            format!(
                "File limit is lower than {needed} ({} workers times {SOCKETS_PER_WORKER} sockets). Lower the concurrency or use '--ulimit {needed}'.",
                opts.concurrency
            ),
            opts.greppable,
            opts.accessible
        );
    } else if soft < DEFAULT_FILE_DESCRIPTORS_LIMIT {
        debug!("File limit {soft} is below the usual {DEFAULT_FILE_DESCRIPTORS_LIMIT}");
    }
}

#[cfg(unix)]
fn adjust_ulimit_size(opts: &Opts) -> u64 {
    use rlimit::Resource;

    if let Some(limit) = opts.ulimit {
        if Resource::NOFILE.set(limit, limit).is_ok() {
            detail!(
                format!("Automatically increasing ulimit value to {limit}."),
                opts.greppable,
                opts.accessible
            );
        } else {
            warning!(
                "ERROR. Failed to set ulimit value.",
                opts.greppable,
                opts.accessible
            );
        }
    }

    match Resource::NOFILE.get() {
        Ok((soft, _)) => soft,
        Err(e) => {
            debug!("Could not read the file limit: {e}");
            u64::MAX
        }
    }
}
