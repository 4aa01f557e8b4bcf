//! Build-time information about this crate, for logs and bug reports.

mod raw {
    include!(concat!(env!("OUT_DIR"), "/built.rs"));
}

/// Relic crate version such as 0.1.0.
pub const RELIC_PKG_VERSION: &str = raw::PKG_VERSION;

/// Comma separated features enabled for this build.
pub const RELIC_FEATURES: &str = raw::FEATURES_STR;

lazy_static! {
    /// Git version such as a96e8f991c91a81df51e7975849441f52fdbcdcc, or
    /// a96e8f99...-dirty, or unknown-git-version if Relic is not built from
    /// a git repo.
    pub static ref RELIC_GIT_VERSION: &'static str = &RELIC_GIT_VERSION_STRING;

    // Owned string
    static ref RELIC_GIT_VERSION_STRING: String = match (raw::GIT_COMMIT_HASH, raw::GIT_DIRTY) {
        (Some(hash), dirty) => format!("{}{}", hash, if dirty == Some(true) { "-dirty" } else { "" }),
        (None, _) => "unknown-git-version".to_string(),
    };
}
