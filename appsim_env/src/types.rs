//! Common types for the appsim environment abstraction.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Name of the module every call targets unless another one is requested.
pub const DEFAULT_MODULE: &str = "default";

/// Auth domain assigned to simulated users that don't name one.
pub const DEFAULT_AUTH_DOMAIN: &str = "gmail.com";

/// Unique identifier for a spawned emulator instance.
///
/// Uses UUID v4 so two contexts never confuse each other's processes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct InstanceId(pub Uuid);

impl InstanceId {
    /// Creates a new random InstanceId.
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for InstanceId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for InstanceId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        // Show first 8 chars for readability
        write!(f, "{}", &self.0.to_string()[..8])
    }
}

/// Log severity, totally ordered from quietest to loudest.
///
/// As a threshold, a level lets through every call at that level or any
/// more important one (`Critical` is the most important). `Child` lets
/// everything through and also forwards the emulator's own log lines.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Off,
    Critical,
    Error,
    Warning,
    Info,
    Debug,
    Child,
}

impl Severity {
    /// Every level, in order.
    pub fn all() -> [Severity; 7] {
        [
            Severity::Off,
            Severity::Critical,
            Severity::Error,
            Severity::Warning,
            Severity::Info,
            Severity::Debug,
            Severity::Child,
        ]
    }

    /// Levels a log call can actually be made at.
    pub fn call_levels() -> [Severity; 5] {
        [
            Severity::Critical,
            Severity::Error,
            Severity::Warning,
            Severity::Info,
            Severity::Debug,
        ]
    }

    /// Returns true if a call at `level` passes this threshold.
    pub fn admits(&self, level: Severity) -> bool {
        *self != Severity::Off && level != Severity::Off && level <= *self
    }

    /// Returns true if emulator output should be forwarded.
    pub fn forwards_child(&self) -> bool {
        *self == Severity::Child
    }

    /// Returns the level name.
    pub fn name(&self) -> &'static str {
        match self {
            Severity::Off => "off",
            Severity::Critical => "critical",
            Severity::Error => "error",
            Severity::Warning => "warning",
            Severity::Info => "info",
            Severity::Debug => "debug",
            Severity::Child => "child",
        }
    }
}

impl Default for Severity {
    fn default() -> Self {
        Severity::Warning
    }
}

impl std::fmt::Display for Severity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.name())
    }
}

impl std::str::FromStr for Severity {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "off" | "none" => Ok(Severity::Off),
            "critical" => Ok(Severity::Critical),
            "error" => Ok(Severity::Error),
            "warning" | "warn" => Ok(Severity::Warning),
            "info" => Ok(Severity::Info),
            "debug" => Ok(Severity::Debug),
            "child" => Ok(Severity::Child),
            _ => Err(format!("Unknown severity: {}", s)),
        }
    }
}

/// A user identity simulated by the harness.
///
/// `id` is assigned on login; whatever the caller puts there is replaced.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SimulatedUser {
    pub email: String,
    pub admin: bool,
    pub id: String,
    pub auth_domain: String,
}

impl SimulatedUser {
    /// Creates a non-admin user with the given email.
    pub fn new(email: impl Into<String>) -> Self {
        Self {
            email: email.into(),
            admin: false,
            id: String::new(),
            auth_domain: DEFAULT_AUTH_DOMAIN.to_string(),
        }
    }

    /// Marks the user as an application admin.
    pub fn with_admin(mut self, admin: bool) -> Self {
        self.admin = admin;
        self
    }

    /// Sets the auth domain.
    pub fn with_auth_domain(mut self, domain: impl Into<String>) -> Self {
        self.auth_domain = domain.into();
        self
    }

    /// Local part of the email, or the whole email when it has no `@`.
    pub fn nickname(&self) -> &str {
        self.email.split('@').next().unwrap_or(&self.email)
    }
}

impl std::fmt::Display for SimulatedUser {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.email)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_severity_order() {
        let all = Severity::all();
        for pair in all.windows(2) {
            assert!(pair[0] < pair[1]);
        }
    }

    #[test]
    fn test_threshold_admits() {
        assert!(Severity::Info.admits(Severity::Error));
        assert!(Severity::Info.admits(Severity::Info));
        assert!(!Severity::Info.admits(Severity::Debug));
        assert!(Severity::Child.admits(Severity::Debug));
        assert!(!Severity::Off.admits(Severity::Critical));
    }

    #[test]
    fn test_only_child_forwards() {
        assert!(Severity::Child.forwards_child());
        assert!(!Severity::Debug.forwards_child());
    }

    #[test]
    fn test_severity_parse() {
        assert_eq!("WARN".parse::<Severity>(), Ok(Severity::Warning));
        assert_eq!("child".parse::<Severity>(), Ok(Severity::Child));
        assert!("loud".parse::<Severity>().is_err());
    }

    #[test]
    fn test_auth_domain() {
        assert_eq!(SimulatedUser::new("a@b.c").auth_domain, DEFAULT_AUTH_DOMAIN);
        let user = SimulatedUser::new("a@corp.example").with_auth_domain("corp.example");
        assert_eq!(user.auth_domain, "corp.example");
    }

    #[test]
    fn test_nickname() {
        assert_eq!(SimulatedUser::new("user@host.com").nickname(), "user");
        assert_eq!(SimulatedUser::new("nobody").nickname(), "nobody");
    }

    proptest::proptest! {
        #[test]
        fn prop_admits_matches_order(t in 0usize..7, l in 1usize..6) {
            let threshold = Severity::all()[t];
            let level = Severity::all()[l];
            let expected = threshold != Severity::Off && level <= threshold;
            proptest::prop_assert_eq!(threshold.admits(level), expected);
        }
    }
}
