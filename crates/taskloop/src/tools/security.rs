//! Command policy for the allow-listed shell and package installers

use std::path::{Component, Path};
use std::sync::OnceLock;

use regex::Regex;

/// Programs the shell tool may run
pub const ALLOWED_COMMANDS: &[&str] = &[
    "ls", "grep", "ps", "echo", "cat", "df", "free", "uptime", "head", "tail", "wc", "pwd",
];

/// Characters that would let a command line chain, redirect or substitute
pub const FORBIDDEN_PATTERNS: &[char] = &[';', '&', '|', '>', '<', '$', '(', ')', '`'];

/// Why a command line was refused
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PolicyViolation {
    #[error("Forbidden characters detected.")]
    ForbiddenCharacter,

    #[error("Command not allowed or empty.")]
    CommandNotAllowed,

    #[error("Could not parse command line: {0}")]
    Unparseable(String),

    #[error("Privacy Error: Path '{0}' is restricted.")]
    RestrictedPath(String),

    #[error("Invalid package name '{0}'.")]
    InvalidPackage(String),
}

/// Allow-list firewall for the `shell` tool
#[derive(Debug, Clone)]
pub struct ShellFirewall {
    allowed: Vec<String>,
}

impl Default for ShellFirewall {
    fn default() -> Self {
        Self {
            allowed: ALLOWED_COMMANDS.iter().map(|s| s.to_string()).collect(),
        }
    }
}

impl ShellFirewall {
    pub fn new() -> Self {
        Self::default()
    }

    /// Validate a command line and split it into argv.
    ///
    /// No argument, nor the value of a `--flag=value` argument, may contain a
    /// `..` component; absolute ones must live under `/tmp` or `workspace_root`.
    pub fn check(&self, line: &str, workspace_root: &Path) -> Result<Vec<String>, PolicyViolation> {
        if line.contains(FORBIDDEN_PATTERNS) {
            return Err(PolicyViolation::ForbiddenCharacter);
        }

        let argv = shell_words::split(line).map_err(|e| PolicyViolation::Unparseable(e.to_string()))?;

        match argv.first() {
            Some(program) if self.allowed.iter().any(|a| a == program) => {}
            _ => return Err(PolicyViolation::CommandNotAllowed),
        }

        for arg in &argv[1..] {
            let value = arg.split_once('=').map(|(_, v)| v);
            for candidate in std::iter::once(arg.as_str()).chain(value) {
                if !path_allowed(Path::new(candidate), workspace_root) {
                    return Err(PolicyViolation::RestrictedPath(arg.clone()));
                }
            }
        }

        Ok(argv)
    }
}

fn path_allowed(path: &Path, workspace_root: &Path) -> bool {
    if path.components().any(|c| c == Component::ParentDir) {
        return false;
    }
    !path.is_absolute() || path.starts_with("/tmp") || path.starts_with(workspace_root)
}

fn package_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r"^[A-Za-z0-9][A-Za-z0-9._+\-]*(\[[A-Za-z0-9,_\-]+\])?([=<>!~]=?[A-Za-z0-9.*+\-]+)?$")
            .expect("package name pattern is valid")
    })
}

/// Validate package names for `pip_install` / `apt_install`
pub fn validate_packages(packages: &[String]) -> Result<(), PolicyViolation> {
    for package in packages {
        if package.starts_with('-') || !package_pattern().is_match(package) {
            return Err(PolicyViolation::InvalidPackage(package.clone()));
        }
    }
    Ok(())
}
