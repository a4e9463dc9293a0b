//! Startup helpers.
//!
//! Build metadata is injected at compile time through the `GIT_COMMIT`,
//! `GIT_BRANCH` and `BUILD_TIME` environment variables.

use std::fmt;

/// Compile-time build metadata.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BuildInfo {
    pub version: String,
    pub git_commit: &'static str,
    pub git_branch: &'static str,
    pub build_time: &'static str,
}

impl BuildInfo {
    /// Metadata for this binary, reporting `version` as the project version.
    pub fn current(version: &str) -> Self {
        Self {
            version: version.to_string(),
            git_commit: option_env!("GIT_COMMIT").unwrap_or(""),
            git_branch: option_env!("GIT_BRANCH").unwrap_or(""),
            build_time: option_env!("BUILD_TIME").unwrap_or(""),
        }
    }
}

impl fmt::Display for BuildInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "version: {}", self.version)?;
        writeln!(f, "git commit: {}", self.git_commit)?;
        writeln!(f, "git branch: {}", self.git_branch)?;
        write!(f, "built time: {}", self.build_time)
    }
}
