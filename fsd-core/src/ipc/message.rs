use std::fmt;
use std::ops::BitOr;

use notify::EventKind;
use notify::event::ModifyKind;
use serde::{Deserialize, Serialize};

use crate::error::Result;

/// Label carried by every compaction message.
pub const COMPACT_MESSAGE_NAME: &str = "CompactNow";

/// Operation carried by a bus message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum FsdOp {
    /// A new file or directory was created.
    Create,
    /// A file was written to, or is currently being written to.
    Write,
    /// A path was removed.
    Remove,
    /// A path was renamed away.
    Rename,
    /// File attributes changed.
    Chmod,
    /// Internal request to trim retained history.
    Compact,
    /// Raw operation the daemon does not understand. Never published.
    Invalid,
}

impl FsdOp {
    pub fn as_str(&self) -> &'static str {
        match self {
            FsdOp::Create => "Create",
            FsdOp::Write => "Write",
            FsdOp::Remove => "Remove",
            FsdOp::Rename => "Rename",
            FsdOp::Chmod => "Chmod",
            FsdOp::Compact => "Compact",
            FsdOp::Invalid => "Invalid",
        }
    }

    /// Pick exactly one operation out of a raw bitset. When several bits are
    /// set the highest priority wins, in the order
    /// `Chmod < Create < Remove < Rename < Write`.
    pub fn from_op_set(ops: OpSet) -> Self {
        if ops.contains(OpSet::WRITE) {
            FsdOp::Write
        } else if ops.contains(OpSet::RENAME) {
            FsdOp::Rename
        } else if ops.contains(OpSet::REMOVE) {
            FsdOp::Remove
        } else if ops.contains(OpSet::CREATE) {
            FsdOp::Create
        } else if ops.contains(OpSet::CHMOD) {
            FsdOp::Chmod
        } else {
            FsdOp::Invalid
        }
    }

    pub fn is_filesystem_op(&self) -> bool {
        !matches!(self, FsdOp::Compact | FsdOp::Invalid)
    }
}

impl fmt::Display for FsdOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Raw filesystem operation bits as reported by the platform watcher.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct OpSet(u8);

impl OpSet {
    pub const EMPTY: OpSet = OpSet(0);
    pub const CREATE: OpSet = OpSet(1);
    pub const WRITE: OpSet = OpSet(1 << 1);
    pub const REMOVE: OpSet = OpSet(1 << 2);
    pub const RENAME: OpSet = OpSet(1 << 3);
    pub const CHMOD: OpSet = OpSet(1 << 4);

    pub fn contains(&self, other: OpSet) -> bool {
        other.0 != 0 && self.0 & other.0 == other.0
    }

    pub fn is_empty(&self) -> bool {
        self.0 == 0
    }

    pub fn bits(&self) -> u8 {
        self.0
    }

    /// Translate a `notify` event kind into raw operation bits. Access and
    /// catch-all kinds carry no bits and end up as [`FsdOp::Invalid`].
    pub fn from_event_kind(kind: &EventKind) -> Self {
        match kind {
            EventKind::Create(_) => OpSet::CREATE,
            EventKind::Modify(ModifyKind::Metadata(_)) => OpSet::CHMOD,
            EventKind::Modify(ModifyKind::Name(_)) => OpSet::RENAME,
            EventKind::Modify(ModifyKind::Data(_) | ModifyKind::Any | ModifyKind::Other) => {
                OpSet::WRITE
            }
            EventKind::Remove(_) => OpSet::REMOVE,
            EventKind::Access(_) | EventKind::Any | EventKind::Other => OpSet::EMPTY,
        }
    }
}

impl BitOr for OpSet {
    type Output = OpSet;

    fn bitor(self, rhs: OpSet) -> OpSet {
        OpSet(self.0 | rhs.0)
    }
}

/// Unit of communication on the event bus.
///
/// `name` is a filesystem path for watcher-originated messages and a
/// symbolic label for [`FsdOp::Compact`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    #[serde(rename = "event_name")]
    pub name: String,
    #[serde(rename = "event_operation")]
    pub operation: FsdOp,
}

impl Message {
    pub fn new(name: impl Into<String>, operation: FsdOp) -> Self {
        Self {
            name: name.into(),
            operation,
        }
    }

    pub fn compact() -> Self {
        Self::new(COMPACT_MESSAGE_NAME, FsdOp::Compact)
    }

    pub fn event_name(&self) -> &str {
        &self.name
    }

    pub fn event_operation(&self) -> FsdOp {
        self.operation
    }

    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string(self)?)
    }

    pub fn from_json(raw: &str) -> Result<Self> {
        Ok(serde_json::from_str(raw)?)
    }
}

impl fmt::Display for Message {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}({})", self.operation, self.name)
    }
}
