//! Username/password guesses: the built-in defaults and loading them from files.
use std::fmt;
use std::fs;
use std::path::Path;

use anyhow::{Context, Result};
use itertools::Itertools;
use log::{debug, warn};
use serde_derive::Serialize;

/// One username and password to try.
#[derive(Serialize, Debug, Clone, PartialEq, Eq, Hash)]
pub struct Guess {
    pub username: String,
    pub password: String,
}

impl Guess {
    pub fn new(username: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            password: password.into(),
        }
    }
}

impl fmt::Display for Guess {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.username, self.password)
    }
}

// Tomcat manager defaults, as shipped by vendors, installers and tutorials.
const DEFAULT_USERPASS: [(&str, &str); 24] = [
    ("admin", ""),
    ("admin", "admin"),
    ("admin", "manager"),
    ("admin", "password"),
    ("admin", "tomcat"),
    ("admin", "s3cret"),
    ("admin", "j5Brn9"),
    ("admin", "root"),
    ("manager", "manager"),
    ("manager", "tomcat"),
    ("manager", "s3cret"),
    ("role1", "role1"),
    ("role1", "tomcat"),
    ("role", "changethis"),
    ("root", "root"),
    ("root", "changethis"),
    ("root", "owaspbwa"),
    ("tomcat", "tomcat"),
    ("tomcat", "s3cret"),
    ("tomcat", "changethis"),
    ("tomcat", "password"),
    ("tomcat", "admin"),
    ("both", "tomcat"),
    ("ovwebusr", "OvW*busr1"),
];

/// The built-in guesses used when no credentials were configured.
pub fn default_guesses() -> Vec<Guess> {
    DEFAULT_USERPASS
        .iter()
        .map(|(user, pass)| Guess::new(*user, *pass))
        .collect()
}

/// Builds the ordered guess list.
///
/// Explicit `user:password` pairs come first, followed by every user
/// combined with every password. When both sources are empty the
/// [`default_guesses`] are used, so the result is never empty.
///
/// ```rust
/// # use mgrhunt::credentials::build_guesses;
/// let guesses = build_guesses(None, None, None, false).unwrap();
/// assert!(!guesses.is_empty());
/// ```
pub fn build_guesses(
    userpass_file: Option<&Path>,
    user_file: Option<&Path>,
    pass_file: Option<&Path>,
    dedup: bool,
) -> Result<Vec<Guess>> {
    let mut guesses = match userpass_file {
        Some(path) => parse_userpass(&read_lines(path)?),
        None => Vec::new(),
    };

    let users = user_file.map(read_lines).transpose()?.unwrap_or_default();
    let passwords = pass_file.map(read_lines).transpose()?.unwrap_or_default();
    if users.is_empty() != passwords.is_empty() {
        warn!("A user list needs a password list and vice versa; the given one is ignored");
    }
    guesses.extend(combine(&users, &passwords));

    if dedup {
        guesses = guesses.into_iter().unique().collect();
    }

    if guesses.is_empty() {
        debug!("No credentials configured, falling back to the built-in list");
        guesses = default_guesses();
    }

    Ok(guesses)
}

/// Every user paired with every password, users in the outer loop.
pub fn combine(users: &[String], passwords: &[String]) -> Vec<Guess> {
    users
        .iter()
        .cartesian_product(passwords.iter())
        .map(|(user, pass)| Guess::new(user.as_str(), pass.as_str()))
        .collect()
}

/// Splits `user:password` lines at the first colon, so passwords may
/// contain colons themselves.
pub fn parse_userpass(lines: &[String]) -> Vec<Guess> {
    lines
        .iter()
        .filter_map(|line| match line.split_once(':') {
            Some((user, pass)) => Some(Guess::new(user, pass)),
            None => {
                warn!("Skipping credential line without a colon: {line:?}");
                None
            }
        })
        .collect()
}

fn read_lines(path: &Path) -> Result<Vec<String>> {
    let content = fs::read_to_string(path)
        .with_context(|| format!("Could not read credential file {}", path.display()))?;

    Ok(content
        .lines()
        .map(|line| line.trim_end_matches('\r'))
        .filter(|line| !line.is_empty())
        .map(str::to_owned)
        .collect())
}
