//! Per-object conflict resolution after a merge.
//!
//! The conflict subsystem is responsible for:
//! 1. **Extraction** -- reading "ours" and "theirs" for every conflicting path.
//! 2. **Decision** -- choosing a side per path, by default or through a policy.
//! 3. **Apply / finalize** -- two stage checkouts and a fresh merge commit, or
//!    a hard reset when the resolution is abandoned.

pub mod entry;
pub mod policy;
pub mod resolver;

pub use entry::{Choice, ConflictEntry, ConflictSide, ConflictStatus, SideKind};
pub use policy::{DecisionPolicy, DefaultPolicy, PreferPolicy};
pub use resolver::{ConflictResolver, ResolutionState};
