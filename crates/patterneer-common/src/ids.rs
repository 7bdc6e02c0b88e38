use std::fmt;

/// Document-wide identity of a construction entity.
///
/// Ids are allocated by the host document; `EntityId::NULL` (raw 0) is the
/// reserved "no entity" sentinel and is never a live entity.
#[derive(Debug, Copy, Clone, Hash, PartialEq, Eq, PartialOrd, Ord)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct EntityId(u32);

impl EntityId {
    pub const NULL: EntityId = EntityId(0);

    pub const fn new(raw: u32) -> Self {
        EntityId(raw)
    }

    #[inline]
    pub const fn raw(self) -> u32 {
        self.0
    }

    #[inline]
    pub const fn is_null(self) -> bool {
        self.0 == 0
    }
}

impl fmt::Display for EntityId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<u32> for EntityId {
    fn from(raw: u32) -> Self {
        EntityId(raw)
    }
}

/// Index of a pattern block (an independently ordered sub-drawing).
pub type BlockId = i32;

/// A node not yet tied to any pattern block.
pub const NO_BLOCK: BlockId = -1;
