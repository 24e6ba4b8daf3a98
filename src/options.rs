//! # Per-spawn options for [`LocalManager::go`](crate::LocalManager::go).
//!
//! Options are passed as a plain list and folded left to right, so a
//! repeated option takes its last value. Variants unknown to the folding
//! code are ignored rather than rejected.
//!
//! ## Example
//! ```
//! use std::time::Duration;
//! use tasktree::GoOption;
//!
//! let opts = vec![
//!     GoOption::Timeout(Duration::from_secs(5)),
//!     GoOption::WaitGroupName("workers".into()),
//! ];
//! # let _ = opts;
//! ```

use std::time::Duration;

/// A single spawn option.
#[non_exhaustive]
#[derive(Debug, Clone)]
pub enum GoOption {
    /// Cancel the task's context after this duration.
    ///
    /// A zero duration disables the deadline.
    Timeout(Duration),
    /// Catch a panicking worker, report it, and run cleanup as usual.
    ///
    /// Enabled by default. When disabled the panic resumes after the
    /// tracking record has been cleaned up.
    PanicRecovery(bool),
    /// Additionally count the task in the named function wait group,
    /// creating the group lazily if it does not exist yet.
    WaitGroupName(String),
}

/// Folded spawn configuration.
#[derive(Debug, Clone)]
pub(crate) struct SpawnOptions {
    pub(crate) timeout: Option<Duration>,
    pub(crate) panic_recovery: bool,
    pub(crate) wait_group: Option<String>,
}

impl Default for SpawnOptions {
    fn default() -> Self {
        Self {
            timeout: None,
            panic_recovery: true,
            wait_group: None,
        }
    }
}

impl SpawnOptions {
    /// Folds an option list, last value winning per option kind.
    pub(crate) fn fold(opts: impl IntoIterator<Item = GoOption>) -> Self {
        let mut folded = Self::default();
        for opt in opts {
            match opt {
                GoOption::Timeout(d) => {
                    folded.timeout = (d > Duration::ZERO).then_some(d);
                }
                GoOption::PanicRecovery(enabled) => folded.panic_recovery = enabled,
                GoOption::WaitGroupName(name) => folded.wait_group = Some(name),
                #[allow(unreachable_patterns)]
                _ => {}
            }
        }
        folded
    }
}
