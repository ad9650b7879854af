//! Batch operations sent to the store as one ordered pipeline.

// == Batch Op ==
/// A single store primitive queued in a batch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BatchOp {
    Get { key: String },
    Set {
        key: String,
        value: Vec<u8>,
        ttl_seconds: u64,
    },
    Delete { key: String },
    Increment { key: String },
    Expire { key: String, ttl_seconds: u64 },
    SetAdd { key: String, member: String },
    SetRemove { key: String, member: String },
    SetMembers { key: String },
}

// == Batch Reply ==
/// Outcome of one successful batch operation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BatchReply {
    /// Result of `Get`
    Value(Option<Vec<u8>>),
    /// Result of `Set`
    Done,
    /// Result of `Delete`, `Expire`, `SetAdd` and `SetRemove`
    Flag(bool),
    /// Result of `Increment`
    Count(i64),
    /// Result of `SetMembers`
    Members(Vec<String>),
}

impl BatchReply {
    /// Returns the boolean outcome, if this reply carries one.
    pub fn flag(&self) -> Option<bool> {
        match self {
            BatchReply::Flag(flag) => Some(*flag),
            _ => None,
        }
    }
}
