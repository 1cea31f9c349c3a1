//! Version range checks for provider dependencies.

use semver::{Version, VersionReq};

/// Decides whether a version satisfies a range.
pub trait VersionChecker: Send + Sync {
    /// `true` when `version` is within `range`.
    fn satisfies(&self, version: &Version, range: &VersionReq) -> bool;
}

/// Cargo-flavoured semver matching via the `semver` crate.
///
/// Pre-release versions only match ranges that name a pre-release of the same
/// `major.minor.patch`.
#[derive(Debug, Clone, Copy, Default)]
pub struct SemverChecker;

impl VersionChecker for SemverChecker {
    fn satisfies(&self, version: &Version, range: &VersionReq) -> bool {
        range.matches(version)
    }
}
