//! Provides a means to read, parse and hold configuration options for scans.
use anyhow::Context;
use clap::{Parser, ValueEnum};
use serde_derive::Deserialize;
use std::fs;
use std::path::PathBuf;
use std::time::Duration;

use crate::credentials::Guess;
use crate::scanner::ScanSettings;

const LOWEST_PORT_NUMBER: u16 = 1;
const TOP_PORT_NUMBER: u16 = 65535;

/// Ports Tomcat and its front ends usually listen on.
pub const DEFAULT_PORTS: [u16; 6] = [8080, 8443, 80, 443, 8000, 8888];

/// Where Tomcat serves the manager application.
pub const DEFAULT_MANAGER_PATH: &str = "/manager/html";

pub type Ports = Vec<u16>;

/// Represents the strategy in which the addresses of the network are visited.
///   - Serial will run from the first to the last address of the network.
///   - Random will randomize the order in which addresses are visited.
#[derive(Deserialize, Debug, ValueEnum, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum ScanOrder {
    Serial,
    Random,
}

#[cfg(not(tarpaulin_include))]
pub fn parse_ports_and_ranges(input: &str) -> Result<Ports, String> {
    let mut ports = Vec::new();

    for part in input.split(',') {
        let part = part.trim();
        if part.is_empty() {
            continue;
        }

        if part.contains('-') {
            let range_ports = parse_port_range(part)?;
            ports.extend(range_ports);
        } else {
            let port = parse_single_port(part)?;
            ports.push(port);
        }
    }

    if ports.is_empty() {
        return Err(String::from("No valid ports or ranges provided"));
    }

    // keep the given order, it decides which port of a host is tried first
    let mut seen = std::collections::HashSet::new();
    ports.retain(|port| seen.insert(*port));

    Ok(ports)
}

fn parse_port_range(range_str: &str) -> Result<Vec<u16>, String> {
    let range_parts: Vec<&str> = range_str.split('-').collect();
    if range_parts.len() != 2 {
        return Err(format!(
            "Invalid range format '{range_str}'. Expected 'start-end'. Example: 8000-8100.",
        ));
    }

    let start: u16 = range_parts[0].parse().map_err(|_| {
        format!(
            "Invalid start port '{}' in range '{range_str}'",
            range_parts[0]
        )
    })?;
    let end: u16 = range_parts[1].parse().map_err(|_| {
        format!(
            "Invalid end port '{}' in range '{range_str}'",
            range_parts[1]
        )
    })?;

    if start > end {
        return Err(format!(
            "Start port {start} is greater than end port {end} in range '{range_str}'",
        ));
    }

    if start < LOWEST_PORT_NUMBER {
        return Err(format!(
            "Ports in range '{range_str}' must be between {LOWEST_PORT_NUMBER} and {TOP_PORT_NUMBER}",
        ));
    }

    Ok((start..=end).collect())
}

fn parse_single_port(port_str: &str) -> Result<u16, String> {
    let port: u16 = port_str
        .parse()
        .map_err(|_| format!("Invalid port number '{port_str}'"))?;

    if port < LOWEST_PORT_NUMBER {
        return Err(format!(
            "Port {port} must be between {LOWEST_PORT_NUMBER} and {TOP_PORT_NUMBER}",
        ));
    }

    Ok(port)
}

/// Makes sure the manager path starts with `/` so it can be appended to
/// `scheme://host:port`.
pub fn normalize_manager_path(input: &str) -> String {
    let path = input.trim();
    if path.starts_with('/') {
        path.to_owned()
    } else {
        format!("/{path}")
    }
}

fn parse_manager_path(input: &str) -> Result<String, String> {
    Ok(normalize_manager_path(input))
}

#[derive(Parser, Debug, Clone)]
#[command(
    name = "mgrhunt",
    version = env!("CARGO_PKG_VERSION"),
    max_term_width = 120,
    help_template = "{bin} {version}\n{about}\n\nUSAGE:\n    {usage}\n\nOPTIONS:\n{options}",
)]
#[allow(clippy::struct_excessive_bools)]
/// Finds Basic-Auth protected manager endpoints in a network and tests
/// credentials against them.
/// WARNING Only scan networks you are authorized to test. Guessing
/// passwords can lock out real accounts.
pub struct Opts {
    /// The target network in CIDR notation, e.g. 10.10.10.0/24.
    #[arg(short, long)]
    pub target: Option<String>,

    /// A list of ports and/or port ranges to check. Examples: 8080,8443 or 8000-8100,80
    #[arg(short, long, value_parser = parse_ports_and_ranges)]
    pub ports: Option<Ports>,

    /// Path of the manager application.
    #[arg(short, long, value_parser = parse_manager_path, default_value = DEFAULT_MANAGER_PATH)]
    pub manager_path: String,

    /// Number of concurrent workers. Each worker may hold several file
    /// descriptors, so keep it well below 'ulimit -n / 7'.
    #[arg(short = 'C', long, default_value = "100")]
    pub concurrency: usize,

    /// The order of visiting addresses. "random" spreads the load over the
    /// network, "serial" walks it from the first to the last address.
    #[arg(long, value_enum, ignore_case = true, default_value = "random")]
    pub scan_order: ScanOrder,

    /// The timeout in milliseconds for every HTTP request.
    #[arg(long, default_value = "5000")]
    pub timeout: u64,

    /// The timeout in milliseconds before a port is assumed to be closed.
    #[arg(long, default_value = "1500")]
    pub connect_timeout: u64,

    /// A file with one user name per line. Needs --passfile.
    #[arg(long)]
    pub userfile: Option<PathBuf>,

    /// A file with one password per line. Needs --userfile.
    #[arg(long)]
    pub passfile: Option<PathBuf>,

    /// A file with one user:password combination per line. If no credential
    /// file is given, a built-in list of manager defaults is used.
    #[arg(long)]
    pub userpassfile: Option<PathBuf>,

    /// Drop repeated user:password combinations.
    #[arg(long)]
    pub dedup: bool,

    /// Send guesses back to back instead of pausing between batches.
    #[arg(long)]
    pub no_lockout_avoidance: bool,

    /// Seconds a server is expected to remember failed logins.
    #[arg(long, default_value = "300")]
    pub lockout_window: u64,

    /// Guesses per target within one lockout window.
    #[arg(long, default_value = "3")]
    pub tries_per_window: usize,

    /// Verify TLS certificates. Off by default since managers are usually
    /// addressed by IP and use self-signed certificates.
    #[arg(long)]
    pub verify_certs: bool,

    /// Automatically ups the ULIMIT with the value you provided.
    #[arg(short, long)]
    pub ulimit: Option<u64>,

    /// Greppable mode. Only output working credentials, one per line.
    #[arg(short, long)]
    pub greppable: bool,

    /// Accessible mode. Turns off features which negatively affect screen readers.
    #[arg(long)]
    pub accessible: bool,

    /// Print all findings as JSON once the scan is done.
    #[arg(long)]
    pub json: bool,

    /// Hide the banner
    #[arg(long)]
    pub no_banner: bool,

    /// Whether to ignore the configuration file or not.
    #[arg(short, long)]
    pub no_config: bool,

    /// Custom path to config file
    #[arg(short, long, value_parser)]
    pub config_path: Option<PathBuf>,
}

#[cfg(not(tarpaulin_include))]
impl Opts {
    pub fn read() -> Self {
        let mut opts = Self::parse();

        if opts.ports.is_none() {
            opts.ports = Some(DEFAULT_PORTS.to_vec());
        }

        opts
    }

    /// Reads the command line arguments into an Opts struct and merge
    /// values found within the user configuration file.
    pub fn merge(&mut self, config: &Config) {
        if !self.no_config {
            self.merge_required(config);
            self.merge_optional(config);
        }
    }

    fn merge_required(&mut self, config: &Config) {
        macro_rules! merge_required {
            ($($field: ident),+) => {
                $(
                    if let Some(e) = &config.$field {
                        self.$field = e.clone();
                    }
                )+
            }
        }

        merge_required!(
            concurrency,
            scan_order,
            timeout,
            connect_timeout,
            dedup,
            no_lockout_avoidance,
            lockout_window,
            tries_per_window,
            verify_certs,
            greppable,
            accessible,
            json
        );

        if let Some(path) = &config.manager_path {
            self.manager_path = normalize_manager_path(path);
        }
    }

    fn merge_optional(&mut self, config: &Config) {
        macro_rules! merge_optional {
            ($($field: ident),+) => {
                $(
                    if config.$field.is_some() {
                        self.$field = config.$field.clone();
                    }
                )+
            }
        }

        merge_optional!(
            target,
            ports,
            userfile,
            passfile,
            userpassfile,
            ulimit
        );
    }

    /// The scan settings these options describe, with `guesses` as the
    /// credential list.
    pub fn scan_settings(&self, guesses: Vec<Guess>) -> ScanSettings {
        ScanSettings {
            ports: self
                .ports
                .clone()
                .unwrap_or_else(|| DEFAULT_PORTS.to_vec()),
            manager_path: self.manager_path.clone(),
            guesses,
            timeout: Duration::from_millis(self.timeout),
            connect_timeout: Duration::from_millis(self.connect_timeout),
            concurrency: self.concurrency,
            avoid_lockout: !self.no_lockout_avoidance,
            lockout_window: Duration::from_secs(self.lockout_window),
            tries_per_window: self.tries_per_window,
            greppable: self.greppable,
            accessible: self.accessible,
        }
    }
}

impl Default for Opts {
    fn default() -> Self {
        Self {
            target: None,
            ports: None,
            manager_path: DEFAULT_MANAGER_PATH.to_owned(),
            concurrency: 100,
            scan_order: ScanOrder::Random,
            timeout: 5000,
            connect_timeout: 1500,
            userfile: None,
            passfile: None,
            userpassfile: None,
            dedup: false,
            no_lockout_avoidance: false,
            lockout_window: 300,
            tries_per_window: 3,
            verify_certs: false,
            ulimit: None,
            greppable: true,
            accessible: false,
            json: false,
            no_banner: false,
            no_config: true,
            config_path: None,
        }
    }
}

/// Struct used to deserialize the options specified within our config file.
/// These will be further merged with our command line arguments in order to
/// generate the final Opts struct.
#[cfg(not(tarpaulin_include))]
#[derive(Debug, Deserialize)]
pub struct Config {
    target: Option<String>,
    ports: Option<Vec<u16>>,
    manager_path: Option<String>,
    concurrency: Option<usize>,
    scan_order: Option<ScanOrder>,
    timeout: Option<u64>,
    connect_timeout: Option<u64>,
    userfile: Option<PathBuf>,
    passfile: Option<PathBuf>,
    userpassfile: Option<PathBuf>,
    dedup: Option<bool>,
    no_lockout_avoidance: Option<bool>,
    lockout_window: Option<u64>,
    tries_per_window: Option<usize>,
    verify_certs: Option<bool>,
    ulimit: Option<u64>,
    greppable: Option<bool>,
    accessible: Option<bool>,
    json: Option<bool>,
}

#[cfg(not(tarpaulin_include))]
#[allow(clippy::doc_link_with_quotes)]
impl Config {
    /// Reads the configuration file with TOML format and parses it into a
    /// Config struct.
    ///
    /// # Format
    ///
    /// target = "10.0.0.0/24"
    /// ports = [8080, 8443]
    /// manager_path = "/manager/html"
    /// concurrency = 50
    /// lockout_window = 600
    /// userpassfile = "/opt/lists/tomcat_userpass.txt"
    ///
    pub fn read(custom_config_path: Option<PathBuf>) -> anyhow::Result<Self> {
        let config_path = custom_config_path.or_else(default_config_path);
        let content = match config_path {
            Some(path) if path.exists() => fs::read_to_string(&path)
                .with_context(|| format!("Failed to read config file {}", path.display()))?,
            _ => String::new(),
        };

        Self::parse(&content)
    }

    /// Parses configuration file contents.
    pub fn parse(content: &str) -> anyhow::Result<Self> {
        Ok(toml::from_str(content)?)
    }
}

/// Constructs default path to config toml
pub fn default_config_path() -> Option<PathBuf> {
    let mut config_path = dirs::home_dir()?;
    config_path.push(".mgrhunt.toml");
    Some(config_path)
}

#[cfg(test)]
mod tests {
    use clap::{CommandFactory, Parser};
    use parameterized::parameterized;
    use std::path::PathBuf;
    use std::time::Duration;

    use super::{
        normalize_manager_path, parse_ports_and_ranges, Config, Opts, ScanOrder, DEFAULT_PORTS,
    };
    use crate::credentials::default_guesses;

    impl Config {
        fn default() -> Self {
            Self {
                target: Some("10.0.0.0/24".to_owned()),
                ports: None,
                manager_path: Some("host-manager/html".to_owned()),
                concurrency: Some(25),
                scan_order: Some(ScanOrder::Serial),
                timeout: Some(1_000),
                connect_timeout: None,
                userfile: None,
                passfile: None,
                userpassfile: None,
                dedup: Some(true),
                no_lockout_avoidance: None,
                lockout_window: Some(600),
                tries_per_window: None,
                verify_certs: None,
                ulimit: None,
                greppable: Some(false),
                accessible: Some(true),
                json: None,
            }
        }
    }

    #[test]
    fn verify_cli() {
        Opts::command().debug_assert();
    }

    #[parameterized(input = {
        "manager/html", "/manager/html", "  /host-manager/html ", "",
    }, expected = {
        "/manager/html", "/manager/html", "/host-manager/html", "/",
    })]
    fn manager_path_always_starts_with_slash(input: &str, expected: &str) {
        assert_eq!(normalize_manager_path(input), expected);
    }

    #[parameterized(input = {
        vec!["mgrhunt", "--target", "10.0.0.0/30"],
        vec!["mgrhunt", "-t", "10.0.0.0/30", "-p", "8080,8443"],
        vec!["mgrhunt", "-t", "10.0.0.0/30", "-m", "manager/text"],
    }, manager_path = {
        "/manager/html",
        "/manager/html",
        "/manager/text",
    })]
    fn parse_target_and_path(input: Vec<&str>, manager_path: &str) {
        let opts = Opts::parse_from(input);

        assert_eq!(opts.target.as_deref(), Some("10.0.0.0/30"));
        assert_eq!(opts.manager_path, manager_path);
    }

    #[test]
    fn cli_defaults() {
        let opts = Opts::parse_from(["mgrhunt", "-t", "10.0.0.0/8"]);
        assert_eq!(opts.concurrency, 100);
        assert_eq!(opts.timeout, 5000);
        assert_eq!(opts.connect_timeout, 1500);
        assert_eq!(opts.lockout_window, 300);
        assert_eq!(opts.tries_per_window, 3);
        assert!(!opts.no_lockout_avoidance);
        assert!(!opts.verify_certs);
        assert_eq!(opts.ports, None);
        assert_eq!(opts.scan_order, ScanOrder::Random);
    }

    #[parameterized(input = {
        vec!["mgrhunt", "-t", "10.0.0.0/8", "--scan-order", "serial"],
        vec!["mgrhunt", "-t", "10.0.0.0/8", "--scan-order", "Random"],
    }, order = {
        ScanOrder::Serial,
        ScanOrder::Random,
    })]
    fn parse_scan_order(input: Vec<&str>, order: ScanOrder) {
        assert_eq!(Opts::parse_from(input).scan_order, order);
    }

    #[test]
    fn settings_follow_options() {
        let opts = Opts::parse_from([
            "mgrhunt",
            "-t",
            "10.0.0.0/30",
            "-p",
            "8080",
            "--timeout",
            "2000",
            "--no-lockout-avoidance",
            "--lockout-window",
            "60",
        ]);
        let settings = opts.scan_settings(default_guesses());

        assert_eq!(settings.ports, vec![8080]);
        assert_eq!(settings.timeout, Duration::from_secs(2));
        assert_eq!(settings.connect_timeout, Duration::from_millis(1500));
        assert!(!settings.avoid_lockout);
        assert_eq!(settings.lockout_window, Duration::from_secs(60));
        assert_eq!(settings.guesses, default_guesses());
    }

    #[test]
    fn settings_use_default_ports() {
        let settings = Opts::default().scan_settings(Vec::new());
        assert_eq!(settings.ports, DEFAULT_PORTS.to_vec());
        assert_eq!(settings.manager_path, "/manager/html");
    }

    #[test]
    fn opts_no_merge_when_config_is_ignored() {
        let mut opts = Opts::default();
        let config = Config::default();

        opts.merge(&config);

        assert_eq!(opts.target, None);
        assert!(opts.greppable);
        assert!(!opts.accessible);
        assert_eq!(opts.timeout, 5000);
        assert_eq!(opts.manager_path, "/manager/html");
    }

    #[test]
    fn opts_merge_required_arguments() {
        let mut opts = Opts::default();
        let config = Config::default();

        opts.merge_required(&config);

        assert_eq!(opts.concurrency, 25);
        assert_eq!(opts.scan_order, ScanOrder::Serial);
        assert_eq!(opts.timeout, 1_000);
        assert_eq!(opts.connect_timeout, 1500);
        assert!(opts.dedup);
        assert_eq!(opts.lockout_window, 600);
        assert!(!opts.greppable);
        assert!(opts.accessible);
        assert_eq!(opts.manager_path, "/host-manager/html");
    }

    #[test]
    fn opts_merge_optional_arguments() {
        let mut opts = Opts::default();
        let mut config = Config::default();
        config.ports = Some(vec![8080, 8081]);
        config.ulimit = Some(1_000);
        config.userpassfile = Some(PathBuf::from("fixtures/userpass.txt"));

        opts.merge_optional(&config);

        assert_eq!(opts.target.as_deref(), Some("10.0.0.0/24"));
        assert_eq!(opts.ports, Some(vec![8080, 8081]));
        assert_eq!(opts.ulimit, Some(1_000));
        assert_eq!(opts.userpassfile, config.userpassfile);
    }

    #[test]
    fn config_parses_toml() {
        let config = Config::parse(
            "target = \"192.168.0.0/16\"\nports = [8080]\nconcurrency = 10\nno_lockout_avoidance = true\n",
        )
        .unwrap();
        let mut opts = Opts {
            no_config: false,
            ..Opts::default()
        };
        opts.merge(&config);

        assert_eq!(opts.target.as_deref(), Some("192.168.0.0/16"));
        assert_eq!(opts.ports, Some(vec![8080]));
        assert_eq!(opts.concurrency, 10);
        assert!(opts.no_lockout_avoidance);
    }

    #[test]
    fn config_read_without_file_is_empty() {
        let config = Config::read(Some(PathBuf::from("fixtures/does_not_exist.toml"))).unwrap();
        assert_eq!(config.target, None);
    }

    #[test]
    fn config_read_reports_unreadable_file() {
        // a directory exists but cannot be read as a file
        let err = Config::read(Some(PathBuf::from("fixtures"))).unwrap_err();
        assert!(err.to_string().contains("Failed to read config file"));
    }

    #[test]
    fn config_parses_scan_order() {
        let config = Config::parse("scan_order = \"serial\"").unwrap();
        assert_eq!(config.scan_order, Some(ScanOrder::Serial));
    }

    #[test]
    fn config_rejects_garbage() {
        assert!(Config::parse("ports = \"eighty\"").is_err());
    }

    #[test]
    fn test_parse_ports_and_ranges_single_port() {
        let result = parse_ports_and_ranges("8080");
        assert_eq!(result, Ok(vec![8080]));
    }

    #[test]
    fn test_parse_ports_and_ranges_keeps_order() {
        let result = parse_ports_and_ranges("8080,8443,80,443");
        assert_eq!(result, Ok(vec![8080, 8443, 80, 443]));
    }

    #[test]
    fn test_parse_ports_and_ranges_mixed_ports_and_ranges() {
        let result = parse_ports_and_ranges("8443, 8000-8002, 80");
        assert_eq!(result, Ok(vec![8443, 8000, 8001, 8002, 80]));
    }

    #[test]
    fn test_parse_ports_and_ranges_duplicates() {
        let result = parse_ports_and_ranges("80,443,80,443");
        assert_eq!(result, Ok(vec![80, 443]));
    }

    #[test]
    fn test_parse_ports_and_ranges_empty_input() {
        let result = parse_ports_and_ranges("");
        assert!(result
            .unwrap_err()
            .contains("No valid ports or ranges provided"));
    }

    #[test]
    fn test_parse_ports_and_ranges_invalid_port() {
        let result = parse_ports_and_ranges("80,abc,443");
        assert!(result.unwrap_err().contains("Invalid port number 'abc'"));
    }

    #[test]
    fn test_parse_ports_and_ranges_invalid_range_format() {
        let result = parse_ports_and_ranges("80,1-2-3,443");
        assert!(result
            .unwrap_err()
            .contains("Invalid range format '1-2-3'. Expected 'start-end'"));
    }

    #[test]
    fn test_parse_ports_and_ranges_reverse_range() {
        let result = parse_ports_and_ranges("80,5-1,443");
        assert!(result
            .unwrap_err()
            .contains("Start port 5 is greater than end port 1 in range '5-1'"));
    }

    #[test]
    fn test_parse_ports_and_ranges_out_of_bounds_port() {
        let result = parse_ports_and_ranges("80,70000,443");
        assert!(result.unwrap_err().contains("Invalid port number '70000'"));
    }

    #[test]
    fn test_parse_ports_and_ranges_zero_port() {
        let result = parse_ports_and_ranges("80,0,443");
        assert!(result
            .unwrap_err()
            .contains("Port 0 must be between 1 and 65535"));
    }
}
