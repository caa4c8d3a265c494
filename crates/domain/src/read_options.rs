use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Opaque handle of an open transaction that a read should join.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TransactionHandle(Uuid);

impl TransactionHandle {
    /// Creates a random transaction handle.
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Creates a handle from an existing UUID value.
    #[must_use]
    pub fn from_uuid(value: Uuid) -> Self {
        Self(value)
    }

    /// Returns the underlying UUID value.
    #[must_use]
    pub fn as_uuid(&self) -> Uuid {
        self.0
    }
}

impl Default for TransactionHandle {
    fn default() -> Self {
        Self::new()
    }
}

/// One option accepted by repository read methods.
///
/// Only [`ReadOption::Primary`] changes routing; the others pass through to
/// the repository untouched.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReadOption {
    /// Read from the primary instead of a replica.
    Primary,
    /// Reuse the given transaction.
    Transactional(TransactionHandle),
    /// Include soft-deleted rows.
    IncludeSoftDeleted,
    /// Take a row lock (`SELECT ... FOR UPDATE`).
    RowLock,
    /// Log the generated statement.
    Debug,
}

/// Ordered list of read options.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReadOptions(Vec<ReadOption>);

impl ReadOptions {
    /// Creates an empty option list (replica read).
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates an option list that forces a primary read.
    #[must_use]
    pub fn primary() -> Self {
        Self(vec![ReadOption::Primary])
    }

    /// Appends one option.
    #[must_use]
    pub fn with(mut self, option: ReadOption) -> Self {
        self.0.push(option);
        self
    }

    /// Returns whether the list already forces a primary read.
    #[must_use]
    pub fn forces_primary(&self) -> bool {
        self.0.contains(&ReadOption::Primary)
    }

    /// Returns the list with the primary hint appended once.
    #[must_use]
    pub fn with_primary(mut self) -> Self {
        if !self.forces_primary() {
            self.0.push(ReadOption::Primary);
        }
        self
    }

    /// Returns the transaction handle, if the read joins one.
    #[must_use]
    pub fn transaction(&self) -> Option<TransactionHandle> {
        self.0.iter().find_map(|option| match option {
            ReadOption::Transactional(handle) => Some(*handle),
            _ => None,
        })
    }

    /// Returns whether the list contains `option`.
    #[must_use]
    pub fn contains(&self, option: ReadOption) -> bool {
        self.0.contains(&option)
    }

    /// Iterates options in insertion order.
    pub fn iter(&self) -> impl Iterator<Item = &ReadOption> {
        self.0.iter()
    }

    /// Number of options.
    #[must_use]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Returns whether no option is set.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl From<Vec<ReadOption>> for ReadOptions {
    fn from(value: Vec<ReadOption>) -> Self {
        Self(value)
    }
}

#[cfg(test)]
mod tests {
    use super::{ReadOption, ReadOptions, TransactionHandle};

    #[test]
    fn with_primary_appends_hint_once() {
        let options = ReadOptions::new()
            .with(ReadOption::IncludeSoftDeleted)
            .with_primary()
            .with_primary();

        assert!(options.forces_primary());
        assert_eq!(options.len(), 2);
    }

    #[test]
    fn passthrough_options_survive_primary_promotion() {
        let handle = TransactionHandle::new();
        let options = ReadOptions::from(vec![ReadOption::Transactional(handle), ReadOption::Debug])
            .with_primary();

        assert_eq!(options.transaction(), Some(handle));
        assert!(options.contains(ReadOption::Debug));
        assert!(options.forces_primary());
    }

    #[test]
    fn empty_options_read_from_replica() {
        assert!(!ReadOptions::new().forces_primary());
        assert!(ReadOptions::primary().forces_primary());
    }
}
