use patterneer_common::{BlockId, NO_BLOCK};
use rustc_hash::FxHashMap;

use crate::dom::ElementId;

/// Bidirectional name ↔ id registry for pattern blocks.
///
/// Blocks are created on first reference: [`BlockRegistry::get_id`] on an
/// unseen name allocates the next integer id. Ids are stable across rename.
/// Each block may cache one opaque anchor (the host's per-block root
/// element); one block may be active at a time.
#[derive(Debug)]
pub struct BlockRegistry<A = ElementId> {
    name_to_id: FxHashMap<String, BlockId>,
    id_to_name: FxHashMap<BlockId, String>,
    anchors: FxHashMap<BlockId, A>,
    next_id: BlockId,
    active: Option<String>,
}

impl<A> Default for BlockRegistry<A> {
    fn default() -> Self {
        BlockRegistry {
            name_to_id: FxHashMap::default(),
            id_to_name: FxHashMap::default(),
            anchors: FxHashMap::default(),
            next_id: 0,
            active: None,
        }
    }
}

impl<A> BlockRegistry<A> {
    pub fn new() -> Self {
        BlockRegistry::default()
    }

    /// Id for `name`, allocating the next one if the name is new.
    pub fn get_id(&mut self, name: &str) -> BlockId {
        if let Some(&id) = self.name_to_id.get(name) {
            return id;
        }
        let id = self.next_id;
        self.next_id += 1;
        self.name_to_id.insert(name.to_string(), id);
        self.id_to_name.insert(id, name.to_string());
        id
    }

    /// Register a block together with its anchor. Allocates if needed.
    pub fn add_block(&mut self, name: &str, anchor: A) -> BlockId {
        let id = self.get_id(name);
        self.anchors.insert(id, anchor);
        id
    }

    pub fn find_id(&self, name: &str) -> Option<BlockId> {
        self.name_to_id.get(name).copied()
    }

    pub fn find_name(&self, id: BlockId) -> Option<&str> {
        self.id_to_name.get(&id).map(String::as_str)
    }

    pub fn has_id(&self, id: BlockId) -> bool {
        self.id_to_name.contains_key(&id)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.name_to_id.contains_key(name)
    }

    pub fn block_names(&self) -> Vec<&str> {
        self.name_to_id.keys().map(String::as_str).collect()
    }

    pub fn block_ids(&self) -> Vec<BlockId> {
        self.id_to_name.keys().copied().collect()
    }

    /// Replace the cached anchor of a known block.
    pub fn set_anchor(&mut self, name: &str, anchor: A) -> bool {
        match self.name_to_id.get(name) {
            Some(&id) => {
                self.anchors.insert(id, anchor);
                true
            }
            None => false,
        }
    }

    pub fn set_anchor_by_id(&mut self, id: BlockId, anchor: A) -> bool {
        if !self.id_to_name.contains_key(&id) {
            return false;
        }
        self.anchors.insert(id, anchor);
        true
    }

    pub fn anchor(&self, name: &str) -> Option<&A> {
        self.anchors.get(&self.find_id(name)?)
    }

    pub fn anchor_by_id(&self, id: BlockId) -> Option<&A> {
        self.anchors.get(&id)
    }

    pub fn active_anchor(&self) -> Option<&A> {
        self.anchor(self.active.as_deref()?)
    }

    pub fn has_anchor(&self, name: &str) -> bool {
        self.anchor(name).is_some()
    }

    pub fn has_anchor_by_id(&self, id: BlockId) -> bool {
        self.anchors.contains_key(&id)
    }

    /// Rename a block. The id and anchor stay; if the renamed block was
    /// active, the active name follows. Fails if the old name is unknown.
    pub fn rename(&mut self, old_name: &str, new_name: &str) -> bool {
        debug_assert!(!old_name.is_empty(), "old block name is empty");
        debug_assert!(!new_name.is_empty(), "new block name is empty");

        let Some(id) = self.name_to_id.remove(old_name) else {
            return false;
        };

        self.name_to_id.insert(new_name.to_string(), id);
        self.id_to_name.insert(id, new_name.to_string());

        if self.active.as_deref() == Some(old_name) {
            self.active = Some(new_name.to_string());
        }
        true
    }

    /// Make `name` the active block. Fails if the name is unknown.
    pub fn set_active(&mut self, name: &str) -> bool {
        if !self.name_to_id.contains_key(name) {
            return false;
        }
        if self.active.as_deref() != Some(name) {
            self.active = Some(name.to_string());
        }
        true
    }

    pub fn set_active_by_id(&mut self, id: BlockId) -> bool {
        match self.id_to_name.get(&id) {
            Some(name) => {
                if self.active.as_deref() != Some(name.as_str()) {
                    self.active = Some(name.clone());
                }
                true
            }
            None => false,
        }
    }

    pub fn active(&self) -> Option<&str> {
        self.active.as_deref()
    }

    /// Id of the active block, or [`NO_BLOCK`] when none is active.
    pub fn active_id(&self) -> BlockId {
        self.active
            .as_deref()
            .and_then(|name| self.find_id(name))
            .unwrap_or(NO_BLOCK)
    }

    pub fn has_active(&self) -> bool {
        self.active.is_some()
    }

    pub fn clear_active(&mut self) {
        self.active = None;
    }

    pub fn len(&self) -> usize {
        self.name_to_id.len()
    }

    pub fn is_empty(&self) -> bool {
        self.name_to_id.is_empty()
    }

    /// Drop every block, anchor and the active mark, and reset the id
    /// counter so the next allocation starts at 0 again.
    pub fn clear(&mut self) {
        self.name_to_id.clear();
        self.id_to_name.clear();
        self.anchors.clear();
        self.next_id = 0;
        self.active = None;
    }
}
