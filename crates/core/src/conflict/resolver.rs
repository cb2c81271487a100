//! Conflict resolution state machine.
//!
//! ```text
//! Pending --apply--> Applied --commit--> Committed
//!    |                  |
//!    +------cancel------+--> Cancelled
//! ```
//!
//! A [`ConflictResolver`] is built from the conflict report of a merge. Each
//! entry gets a choice (ours or theirs), then [`ConflictResolver::apply`]
//! checks out all "ours" paths in one operation and all "theirs" paths in a
//! second. The concluding commit is always a fresh merge commit.

use std::collections::BTreeSet;
use std::fmt;

use serde::{Deserialize, Serialize};
use tracing::{debug, info, instrument, warn};

use super::entry::{Choice, ConflictEntry, ConflictSide};
use super::policy::DecisionPolicy;
use crate::cancel::CancelToken;
use crate::errors::{ConflictError, VcsError};
use crate::vcs::{MergeOutcome, Stage, VersionControl};

/// Lifecycle of a resolution.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ResolutionState {
    /// Entries extracted, decisions may still change.
    Pending,
    /// Both stage checkouts done; waiting for the commit.
    Applied,
    /// Merge commit created.
    Committed,
    /// Working tree reset to the pre-merge head.
    Cancelled,
}

impl fmt::Display for ResolutionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Pending => write!(f, "pending"),
            Self::Applied => write!(f, "applied"),
            Self::Committed => write!(f, "committed"),
            Self::Cancelled => write!(f, "cancelled"),
        }
    }
}

/// Resolves the conflicts of one merge against a version-control backend.
pub struct ConflictResolver<'a, V: VersionControl + ?Sized> {
    vcs: &'a V,
    their_ref: String,
    entries: Vec<ConflictEntry>,
    state: ResolutionState,
}

impl<'a, V: VersionControl + ?Sized> ConflictResolver<'a, V> {
    /// Extract both sides of every conflicting path in `outcome`.
    ///
    /// Ours is read from `HEAD`, theirs from the merged ref. If extraction is
    /// cancelled or fails, the working tree is reset to `HEAD` before the
    /// error is returned.
    #[instrument(skip_all, fields(their_ref = %outcome.their_ref, conflicts = outcome.conflicts.len()))]
    pub fn from_merge(
        vcs: &'a V,
        outcome: &MergeOutcome,
        cancel: &CancelToken,
    ) -> Result<Self, ConflictError> {
        match extract(vcs, outcome, cancel) {
            Ok(entries) => {
                info!(entries = entries.len(), "conflicts extracted");
                Ok(Self {
                    vcs,
                    their_ref: outcome.their_ref.clone(),
                    entries,
                    state: ResolutionState::Pending,
                })
            }
            Err(e) => {
                warn!(error = %e, "conflict extraction failed, resetting working tree");
                if let Err(reset) = vcs.reset_hard("HEAD") {
                    warn!(error = %reset, "reset after failed extraction also failed");
                }
                Err(e)
            }
        }
    }

    pub fn entries(&self) -> &[ConflictEntry] {
        &self.entries
    }

    pub fn entry(&self, path: &str) -> Option<&ConflictEntry> {
        self.entries.iter().find(|e| e.path == path)
    }

    pub fn state(&self) -> ResolutionState {
        self.state
    }

    pub fn their_ref(&self) -> &str {
        &self.their_ref
    }

    /// Override the choice for one path.
    pub fn set_choice(&mut self, path: &str, choice: Choice) -> Result<(), ConflictError> {
        self.require(ResolutionState::Pending, ResolutionState::Pending)?;
        let entry = self
            .entries
            .iter_mut()
            .find(|e| e.path == path)
            .ok_or_else(|| ConflictError::NotFound(path.to_string()))?;
        debug!(path, %choice, "choice set");
        entry.choice = choice;
        Ok(())
    }

    /// Ask `policy` for every entry. An abort cancels the resolution.
    pub fn decide_with(&mut self, policy: &mut dyn DecisionPolicy) -> Result<(), ConflictError> {
        self.require(ResolutionState::Pending, ResolutionState::Pending)?;
        for index in 0..self.entries.len() {
            match policy.choose(&self.entries[index]) {
                Some(choice) => self.entries[index].choice = choice,
                None => {
                    info!(path = %self.entries[index].path, "resolution aborted by decision surface");
                    self.cancel()?;
                    return Err(ConflictError::Cancelled);
                }
            }
        }
        Ok(())
    }

    /// Paths to check out from each side.
    pub fn partition(&self) -> (BTreeSet<String>, BTreeSet<String>) {
        let mut ours = BTreeSet::new();
        let mut theirs = BTreeSet::new();
        for entry in &self.entries {
            match entry.choice {
                Choice::Ours => ours.insert(entry.path.clone()),
                Choice::Theirs => theirs.insert(entry.path.clone()),
            };
        }
        (ours, theirs)
    }

    /// Check out every path from its chosen side: one operation per side.
    ///
    /// If either checkout fails the merge is abandoned: the working tree is
    /// reset to `HEAD` and the resolver ends up `Cancelled`.
    #[instrument(skip(self))]
    pub fn apply(&mut self) -> Result<(), ConflictError> {
        self.require(ResolutionState::Pending, ResolutionState::Applied)?;
        let (ours, theirs) = self.partition();
        let checked_out = self
            .vcs
            .checkout_stage(Stage::Ours, &ours)
            .and_then(|()| self.vcs.checkout_stage(Stage::Theirs, &theirs));
        if let Err(e) = checked_out {
            self.abandon("stage checkout failed", &e);
            return Err(e.into());
        }
        info!(ours = ours.len(), theirs = theirs.len(), "resolution applied");
        self.state = ResolutionState::Applied;
        Ok(())
    }

    /// Conclude the merge with a new commit. Amending is always rejected.
    #[instrument(skip(self, message))]
    pub fn commit(&mut self, message: &str, amend: bool) -> Result<String, ConflictError> {
        if amend {
            return Err(ConflictError::InvalidAmend);
        }
        self.require(ResolutionState::Applied, ResolutionState::Committed)?;
        let sha = match self.vcs.commit(message, false) {
            Ok(sha) => sha,
            Err(VcsError::InvalidAmend) => return Err(ConflictError::InvalidAmend),
            Err(e) => {
                self.abandon("merge commit failed", &e);
                return Err(e.into());
            }
        };
        self.state = ResolutionState::Committed;
        info!(%sha, "merge committed");
        Ok(sha)
    }

    /// Abandon the merge and hard-reset to the pre-merge head.
    #[instrument(skip(self))]
    pub fn cancel(&mut self) -> Result<(), ConflictError> {
        match self.state {
            ResolutionState::Pending | ResolutionState::Applied => {}
            other => {
                return Err(ConflictError::InvalidStateTransition {
                    from: other.to_string(),
                    to: ResolutionState::Cancelled.to_string(),
                })
            }
        }
        self.vcs.reset_hard("HEAD")?;
        self.state = ResolutionState::Cancelled;
        info!("conflict resolution cancelled");
        Ok(())
    }

    /// Reset after a failed step; the step's own error is what the caller sees.
    fn abandon(&mut self, what: &str, error: &VcsError) {
        warn!(%error, "{what}, resetting working tree");
        if let Err(reset) = self.vcs.reset_hard("HEAD") {
            warn!(error = %reset, "reset after failed resolution also failed");
        }
        self.state = ResolutionState::Cancelled;
    }

    fn require(&self, from: ResolutionState, to: ResolutionState) -> Result<(), ConflictError> {
        if self.state == from {
            Ok(())
        } else {
            Err(ConflictError::InvalidStateTransition {
                from: self.state.to_string(),
                to: to.to_string(),
            })
        }
    }
}

fn extract<V: VersionControl + ?Sized>(
    vcs: &V,
    outcome: &MergeOutcome,
    cancel: &CancelToken,
) -> Result<Vec<ConflictEntry>, ConflictError> {
    let mut entries = Vec::with_capacity(outcome.conflicts.len());
    for path in &outcome.conflicts {
        if cancel.is_cancelled() {
            return Err(ConflictError::Cancelled);
        }
        let ours = vcs
            .resolve_file_at_ref(path, "HEAD")?
            .map(|content| ConflictSide::from_content(path, content));
        let theirs = vcs
            .resolve_file_at_ref(path, &outcome.their_ref)?
            .map(|content| ConflictSide::from_content(path, content));
        let entry = ConflictEntry::new(path.clone(), ours, theirs)?;
        debug!(%path, status = %entry.status(), "conflict entry");
        entries.push(entry);
    }
    Ok(entries)
}
