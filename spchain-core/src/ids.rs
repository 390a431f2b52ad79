use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

/// Submission position of an action inside its batch (0-based).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ActionId(u32);

/// Process-unique identity of a batch scope.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct BatchId(u64);

/// In-batch object identifier used by the client-svc wire format
/// (`ObjectPathId` / `ParentId` attributes).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ObjectToken(u32);

impl ActionId {
    pub fn new(value: u32) -> Self {
        ActionId(value)
    }

    pub fn as_u32(&self) -> u32 {
        self.0
    }

    pub fn index(&self) -> usize {
        self.0 as usize
    }
}

impl BatchId {
    pub fn new(value: u64) -> Self {
        BatchId(value)
    }

    pub fn as_u64(&self) -> u64 {
        self.0
    }
}

impl ObjectToken {
    pub fn new(value: u32) -> Self {
        ObjectToken(value)
    }

    pub fn as_u32(&self) -> u32 {
        self.0
    }
}

impl fmt::Display for ActionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Action#{}", self.0)
    }
}

impl fmt::Display for BatchId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Batch#{}", self.0)
    }
}

impl fmt::Display for ObjectToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<u32> for ActionId {
    fn from(value: u32) -> Self {
        ActionId::new(value)
    }
}

impl From<u32> for ObjectToken {
    fn from(value: u32) -> Self {
        ObjectToken::new(value)
    }
}

static NEXT_BATCH_ID: AtomicU64 = AtomicU64::new(1);

/// Allocate a fresh batch id. Ids are never reused within a process.
pub fn next_batch_id() -> BatchId {
    BatchId(NEXT_BATCH_ID.fetch_add(1, Ordering::Relaxed))
}

/// Hands out object tokens for one serialization pass. Not shared between batches.
#[derive(Debug, Default)]
pub struct TokenAllocator {
    next: u32,
}

impl TokenAllocator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn allocate(&mut self) -> ObjectToken {
        let token = ObjectToken(self.next);
        self.next += 1;
        token
    }

    pub fn peek_next(&self) -> u32 {
        self.next
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;
    use std::thread;

    #[test]
    fn test_id_display() {
        assert_eq!(format!("{}", ActionId::new(3)), "Action#3");
        assert_eq!(format!("{}", BatchId::new(9)), "Batch#9");
        assert_eq!(format!("{}", ObjectToken::new(12)), "12");
        assert_eq!(ActionId::from(4).index(), 4);
    }

    #[test]
    fn test_token_allocator_monotonic() {
        let mut tokens = TokenAllocator::new();
        assert_eq!(tokens.allocate().as_u32(), 0);
        assert_eq!(tokens.allocate().as_u32(), 1);
        assert_eq!(tokens.peek_next(), 2);
    }

    #[test]
    fn test_batch_ids_unique_across_threads() {
        let handles: Vec<_> = (0..8)
            .map(|_| thread::spawn(|| (0..50).map(|_| next_batch_id()).collect::<Vec<_>>()))
            .collect();

        let mut seen = HashSet::new();
        for handle in handles {
            for id in handle.join().unwrap() {
                assert!(seen.insert(id), "Duplicate batch id: {}", id);
            }
        }
        assert_eq!(seen.len(), 400);
    }

    #[test]
    fn test_serialization_is_transparent() {
        assert_eq!(serde_json::to_string(&ActionId::new(5)).unwrap(), "5");
        let token: ObjectToken = serde_json::from_str("17").unwrap();
        assert_eq!(token, ObjectToken::new(17));
    }
}
