//! Scripted behaviors.
//!
//! # Data Flow
//! ```text
//! request target (path and query)
//!     → Behavior::from_target (exact, case-sensitive match)
//!     → dispatcher.rs (reads the body unless the behavior fires first)
//!     → checks.rs / noisy.rs / pages.rs (build the response)
//!     → SessionBody (streams, ends or aborts)
//! ```
//!
//! # Design Decisions
//! - The route set is closed; unknown paths get the welcome page
//! - Silent rejection and silent timeout act before the body is read
//! - Fixtures are built once and shared read-only

pub mod checks;
pub mod dispatcher;
pub mod fixtures;
pub mod noisy;
pub mod pages;

use std::fmt;

pub use dispatcher::{DispatchError, Dispatcher};
pub use fixtures::Fixtures;

/// One of the fixed response strategies.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Behavior {
    SilentRejection,
    SilentTimeout,
    NoisyRejection,
    NoisyTimeout,
    BigRandomFile,
    CheckPattern,
    CheckString,
    CheckJson,
    SilentResponse,
    Stop,
    Welcome,
}

impl Behavior {
    pub const ALL: [Behavior; 11] = [
        Behavior::SilentRejection,
        Behavior::SilentTimeout,
        Behavior::NoisyRejection,
        Behavior::NoisyTimeout,
        Behavior::BigRandomFile,
        Behavior::CheckPattern,
        Behavior::CheckString,
        Behavior::CheckJson,
        Behavior::SilentResponse,
        Behavior::Stop,
        Behavior::Welcome,
    ];

    /// Select the behavior for a request target.
    ///
    /// The whole target must match, so a query string makes it unknown.
    pub fn from_target(target: &str) -> Self {
        match target {
            "/silentrejection" => Behavior::SilentRejection,
            "/silenttimeout" => Behavior::SilentTimeout,
            "/noisyrejection" => Behavior::NoisyRejection,
            "/noisytimeout" => Behavior::NoisyTimeout,
            "/bigrandomfile" => Behavior::BigRandomFile,
            "/checkpattern" => Behavior::CheckPattern,
            "/checkstring" => Behavior::CheckString,
            "/checkjson" => Behavior::CheckJson,
            "/silentresponse" => Behavior::SilentResponse,
            "/stop" => Behavior::Stop,
            _ => Behavior::Welcome,
        }
    }

    /// Route serving this behavior; the welcome page answers any other path.
    pub fn path(self) -> &'static str {
        match self {
            Behavior::SilentRejection => "/silentrejection",
            Behavior::SilentTimeout => "/silenttimeout",
            Behavior::NoisyRejection => "/noisyrejection",
            Behavior::NoisyTimeout => "/noisytimeout",
            Behavior::BigRandomFile => "/bigrandomfile",
            Behavior::CheckPattern => "/checkpattern",
            Behavior::CheckString => "/checkstring",
            Behavior::CheckJson => "/checkjson",
            Behavior::SilentResponse => "/silentresponse",
            Behavior::Stop => "/stop",
            Behavior::Welcome => "/",
        }
    }

    /// Label used in logs and metrics.
    pub fn name(self) -> &'static str {
        match self {
            Behavior::SilentRejection => "silent_rejection",
            Behavior::SilentTimeout => "silent_timeout",
            Behavior::NoisyRejection => "noisy_rejection",
            Behavior::NoisyTimeout => "noisy_timeout",
            Behavior::BigRandomFile => "big_random_file",
            Behavior::CheckPattern => "check_pattern",
            Behavior::CheckString => "check_string",
            Behavior::CheckJson => "check_json",
            Behavior::SilentResponse => "silent_response",
            Behavior::Stop => "stop",
            Behavior::Welcome => "welcome",
        }
    }

    /// Whether the behavior acts before the request body is read.
    pub fn fires_before_body(self) -> bool {
        matches!(self, Behavior::SilentRejection | Behavior::SilentTimeout)
    }
}

impl fmt::Display for Behavior {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn paths_round_trip() {
        for behavior in Behavior::ALL {
            assert_eq!(Behavior::from_target(behavior.path()), behavior);
        }
    }

    #[test]
    fn matching_is_exact() {
        assert_eq!(Behavior::from_target("/"), Behavior::Welcome);
        assert_eq!(Behavior::from_target("/CheckJson"), Behavior::Welcome);
        assert_eq!(Behavior::from_target("/checkjson/"), Behavior::Welcome);
        assert_eq!(Behavior::from_target("/stop/now"), Behavior::Welcome);
        assert_eq!(Behavior::from_target(""), Behavior::Welcome);
        assert_eq!(Behavior::from_target("/checkjson?x=1"), Behavior::Welcome);
        assert_eq!(Behavior::from_target("/stop?"), Behavior::Welcome);
    }

    #[test]
    fn only_silent_behaviors_skip_the_body() {
        let early: Vec<_> = Behavior::ALL
            .into_iter()
            .filter(|b| b.fires_before_body())
            .collect();
        assert_eq!(early, [Behavior::SilentRejection, Behavior::SilentTimeout]);
    }
}
