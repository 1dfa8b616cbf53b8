/// Changeset - dataset change log for a session
///
/// Every mutation a session commits is recorded as a [`DatasetChange`] and
/// bumps the generation counter. Derived state that depends only on the
/// dataset (column metadata) is keyed by that generation and rebuilt when it
/// moves.
///
/// The log keeps the most recent changes only; the generation keeps counting.

use crate::combine::JoinHow;
use std::collections::VecDeque;

/// Number of changes kept in the log.
pub const CHANGE_LOG_CAPACITY: usize = 256;

/// Represents a single committed change to the session's dataset
#[derive(Debug, Clone, PartialEq)]
pub enum DatasetChange {
    /// A new dataset replaced the previous one
    Loaded { rows: usize, columns: usize },

    /// An edit was propagated to `affected` rows of `column`
    CellsEdited {
        column: String,
        affected: usize,
        route: Vec<String>,
    },

    /// Rows were inserted at the top or bottom
    RowsInserted { at: usize, count: usize },

    /// Rows were deleted
    RowsDeleted { count: usize },

    ColumnAdded { name: String },
    ColumnDropped { name: String },
    ColumnRenamed { from: String, to: String },

    /// Rows of another table were appended
    Concatenated { source: String, count: usize },

    /// Another table was joined on; `rows` is the resulting row count
    Joined { source: String, how: JoinHow, rows: usize },
}

/// Bounded change log with a monotonically increasing generation
#[derive(Debug, Clone, Default)]
pub struct Changeset {
    changes: VecDeque<DatasetChange>,
    /// Incremented on every recorded change
    generation: u64,
}

impl Changeset {
    pub fn new() -> Self {
        Changeset {
            changes: VecDeque::new(),
            generation: 0,
        }
    }

    /// Record a change and advance the generation
    pub fn record(&mut self, change: DatasetChange) -> u64 {
        if self.changes.len() == CHANGE_LOG_CAPACITY {
            self.changes.pop_front();
        }
        self.changes.push_back(change);
        self.generation += 1;
        self.generation
    }

    /// Returns the current generation number
    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// Oldest first
    pub fn changes(&self) -> impl Iterator<Item = &DatasetChange> {
        self.changes.iter()
    }

    pub fn is_empty(&self) -> bool {
        self.changes.is_empty()
    }

    pub fn len(&self) -> usize {
        self.changes.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_changeset_basic() {
        let mut cs = Changeset::new();
        assert!(cs.is_empty());
        assert_eq!(cs.generation(), 0);

        assert_eq!(cs.record(DatasetChange::Loaded { rows: 3, columns: 2 }), 1);
        assert_eq!(
            cs.record(DatasetChange::ColumnAdded {
                name: "note".to_string()
            }),
            2
        );
        assert_eq!(cs.len(), 2);
        assert_eq!(
            cs.changes().last(),
            Some(&DatasetChange::ColumnAdded {
                name: "note".to_string()
            })
        );
    }

    #[test]
    fn test_changeset_is_bounded() {
        let mut cs = Changeset::new();
        for count in 0..CHANGE_LOG_CAPACITY + 10 {
            cs.record(DatasetChange::RowsDeleted { count });
        }
        assert_eq!(cs.len(), CHANGE_LOG_CAPACITY);
        assert_eq!(cs.generation(), (CHANGE_LOG_CAPACITY + 10) as u64);
        assert_eq!(
            cs.changes().next(),
            Some(&DatasetChange::RowsDeleted { count: 10 })
        );
    }
}
