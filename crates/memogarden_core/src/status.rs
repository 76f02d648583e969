//! Operating-mode state machine.

use crate::checker::Finding;
use crate::types::Timestamp;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::fmt;

const TARGET: &str = "memogarden::status";

/// Process-wide consistency status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SystemStatus {
    /// Both stores agree.
    Normal,
    /// Known inconsistencies; writes continue with a warning.
    Inconsistent,
    /// Writes refused by an operator.
    ReadOnly,
    /// Writes refused after storage-level corruption or operator action.
    SafeMode,
}

impl SystemStatus {
    /// Returns the wire name.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Normal => "NORMAL",
            Self::Inconsistent => "INCONSISTENT",
            Self::ReadOnly => "READ_ONLY",
            Self::SafeMode => "SAFE_MODE",
        }
    }

    /// Returns true if new cross-store transactions may open.
    #[must_use]
    pub fn permits_cross_store_writes(self) -> bool {
        matches!(self, Self::Normal | Self::Inconsistent)
    }

    /// Returns true for modes only an operator can leave.
    #[must_use]
    pub fn is_administrative(self) -> bool {
        matches!(self, Self::ReadOnly | Self::SafeMode)
    }
}

impl fmt::Display for SystemStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// What the status interface reports.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HealthReport {
    /// Current mode.
    pub status: SystemStatus,
    /// Why the system is in that mode, if not NORMAL.
    pub reason: Option<String>,
    /// Findings from the most recent consistency check.
    pub findings: Vec<Finding>,
    /// True when an operator should look at the stores.
    pub requires_operator_attention: bool,
    /// When the mode last changed.
    pub changed_at: Timestamp,
    /// When the last consistency check completed.
    pub last_checked_at: Option<Timestamp>,
}

#[derive(Debug)]
struct State {
    status: SystemStatus,
    reason: Option<String>,
    findings: Vec<Finding>,
    changed_at: Timestamp,
    last_checked_at: Option<Timestamp>,
    partial_commits: u64,
}

/// Shared holder of the current [`SystemStatus`].
///
/// Owned by the coordinator and lent to transactions so the partial-commit
/// path can flag the system. Readers never block each other.
#[derive(Debug)]
pub struct StatusCell {
    state: RwLock<State>,
}

impl StatusCell {
    /// Creates a cell in `status`.
    #[must_use]
    pub fn new(status: SystemStatus) -> Self {
        Self {
            state: RwLock::new(State {
                status,
                reason: None,
                findings: Vec::new(),
                changed_at: Timestamp::now(),
                last_checked_at: None,
                partial_commits: 0,
            }),
        }
    }

    /// Returns the current mode.
    #[must_use]
    pub fn get(&self) -> SystemStatus {
        self.state.read().status
    }

    /// Returns a point-in-time health snapshot.
    #[must_use]
    pub fn health(&self) -> HealthReport {
        let state = self.state.read();
        HealthReport {
            status: state.status,
            reason: state.reason.clone(),
            findings: state.findings.clone(),
            requires_operator_attention: state.status != SystemStatus::Normal,
            changed_at: state.changed_at,
            last_checked_at: state.last_checked_at,
        }
    }

    /// Returns how many partial commits have been flagged so far.
    ///
    /// A check captures this before scanning and hands it back to
    /// [`apply_check`](Self::apply_check).
    pub(crate) fn partial_commit_epoch(&self) -> u64 {
        self.state.read().partial_commits
    }

    /// Records the outcome of a consistency check and returns the new mode.
    ///
    /// A check moves the system between NORMAL and INCONSISTENT, or into
    /// SAFE_MODE on storage corruption. It never leaves READ_ONLY or
    /// SAFE_MODE unless `override_admin` is set by an operator resume.
    ///
    /// `epoch` is the [`partial_commit_epoch`](Self::partial_commit_epoch)
    /// seen when the scan started. If a partial commit was flagged since,
    /// the scan may have missed its orphans and cannot report NORMAL.
    pub(crate) fn apply_check(
        &self,
        classified: SystemStatus,
        findings: Vec<Finding>,
        override_admin: bool,
        epoch: u64,
    ) -> SystemStatus {
        let mut state = self.state.write();
        let now = Timestamp::now();
        state.last_checked_at = Some(now);
        state.findings = findings;
        let stale = state.partial_commits != epoch;

        let next = match (state.status, classified) {
            (_, SystemStatus::SafeMode) => SystemStatus::SafeMode,
            (current, _) if current.is_administrative() && !override_admin => current,
            (_, SystemStatus::Normal) if stale => SystemStatus::Inconsistent,
            (_, classified) => classified,
        };
        if stale {
            tracing::debug!(
                target: TARGET,
                scanned_at = epoch,
                current = state.partial_commits,
                "partial commit flagged during consistency check"
            );
        }
        let reason = match next {
            SystemStatus::Normal => None,
            _ if next == state.status && next.is_administrative() => state.reason.clone(),
            SystemStatus::Inconsistent if stale && state.findings.is_empty() => state
                .reason
                .clone()
                .filter(|_| state.status == SystemStatus::Inconsistent)
                .or_else(|| Some("partial commit flagged while the check was running".to_string())),
            SystemStatus::SafeMode => Some("storage integrity check failed".to_string()),
            _ => Some(format!(
                "consistency check reported {} finding(s)",
                state.findings.len()
            )),
        };
        Self::transition(&mut state, next, reason, now);
        next
    }

    /// Flags the system INCONSISTENT after a partial commit.
    ///
    /// An administrative mode already in force is kept; the reason is
    /// recorded either way.
    pub(crate) fn mark_inconsistent(&self, reason: impl Into<String>) {
        let mut state = self.state.write();
        state.partial_commits += 1;
        let next = if state.status.is_administrative() {
            state.status
        } else {
            SystemStatus::Inconsistent
        };
        Self::transition(&mut state, next, Some(reason.into()), Timestamp::now());
    }

    /// Enters an operating mode on operator request, or when the startup
    /// scan itself could not run.
    pub(crate) fn set(&self, status: SystemStatus, reason: impl Into<String>) {
        let mut state = self.state.write();
        Self::transition(&mut state, status, Some(reason.into()), Timestamp::now());
    }

    fn transition(state: &mut State, next: SystemStatus, reason: Option<String>, now: Timestamp) {
        let previous = state.status;
        state.reason = reason;
        if previous == next {
            return;
        }
        state.status = next;
        state.changed_at = now;
        let reason = state.reason.as_deref().unwrap_or("");
        match next {
            SystemStatus::Normal => {
                tracing::info!(
                    target: TARGET,
                    from = %previous,
                    to = %next,
                    "system status changed"
                );
            }
            _ => {
                tracing::warn!(
                    target: TARGET,
                    from = %previous,
                    to = %next,
                    reason,
                    "system status changed"
                );
            }
        }
    }
}

impl Default for StatusCell {
    fn default() -> Self {
        Self::new(SystemStatus::Normal)
    }
}
