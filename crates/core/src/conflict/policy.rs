//! Decision surfaces for conflict entries.

use super::entry::{Choice, ConflictEntry};

/// Picks a side for each conflict entry. Returning `None` aborts the whole
/// resolution.
pub trait DecisionPolicy {
    fn choose(&mut self, entry: &ConflictEntry) -> Option<Choice>;
}

/// Keeps ours when present, else theirs.
#[derive(Debug, Clone, Copy, Default)]
pub struct DefaultPolicy;

impl DecisionPolicy for DefaultPolicy {
    fn choose(&mut self, entry: &ConflictEntry) -> Option<Choice> {
        Some(entry.default_choice())
    }
}

/// Always picks the same side, even when that side deleted the file.
#[derive(Debug, Clone, Copy)]
pub struct PreferPolicy(pub Choice);

impl DecisionPolicy for PreferPolicy {
    fn choose(&mut self, _entry: &ConflictEntry) -> Option<Choice> {
        Some(self.0)
    }
}

impl<F> DecisionPolicy for F
where
    F: FnMut(&ConflictEntry) -> Option<Choice>,
{
    fn choose(&mut self, entry: &ConflictEntry) -> Option<Choice> {
        self(entry)
    }
}
