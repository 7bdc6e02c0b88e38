//! In-memory persisted element tree.
//!
//! The engine never owns the on-disk format; it only needs the narrow
//! surface rename propagation walks: find an element by entity id, read and
//! write named attributes, and enumerate child elements by tag. `Document`
//! is that surface, backed by an element arena with stable handles.

use patterneer_common::EntityId;
use rustc_hash::FxHashMap;

/// Handle to one element of a [`Document`]. Stable for the lifetime of the
/// element; dangling after `remove_element`.
#[derive(Debug, Copy, Clone, Hash, PartialEq, Eq)]
pub struct ElementId(u32);

impl ElementId {
    fn index(self) -> usize {
        self.0 as usize
    }
}

/// Closed set of element tags the engine understands.
///
/// The first eight are the formula-bearing entity tags rename propagation
/// visits; the rest are their formula-carrying child elements.
#[derive(Debug, Copy, Clone, Hash, PartialEq, Eq)]
pub enum ElementTag {
    Point,
    Operation,
    Arc,
    ElArc,
    Spline,
    Path,
    Tools,
    Detail,

    PathPoint,
    Node,
    Data,
    PatternInfo,
    Grainline,
    MirrorLine,
    Offset,
    Calculation,
}

impl ElementTag {
    pub fn as_str(self) -> &'static str {
        match self {
            ElementTag::Point => "point",
            ElementTag::Operation => "operation",
            ElementTag::Arc => "arc",
            ElementTag::ElArc => "elArc",
            ElementTag::Spline => "spline",
            ElementTag::Path => "path",
            ElementTag::Tools => "tools",
            ElementTag::Detail => "detail",
            ElementTag::PathPoint => "pathPoint",
            ElementTag::Node => "node",
            ElementTag::Data => "data",
            ElementTag::PatternInfo => "patternInfo",
            ElementTag::Grainline => "grainline",
            ElementTag::MirrorLine => "mirrorLine",
            ElementTag::Offset => "offset",
            ElementTag::Calculation => "calculation",
        }
    }
}

/// Attribute names used by the formula-bearing slots.
pub mod attr {
    pub const LENGTH: &str = "length";
    pub const ANGLE: &str = "angle";
    pub const RADIUS: &str = "radius";
    pub const C1_RADIUS: &str = "c1Radius";
    pub const C2_RADIUS: &str = "c2Radius";
    pub const C_RADIUS: &str = "cRadius";
    pub const WIDTH: &str = "width";
    pub const HEIGHT: &str = "height";
    pub const VISIBLE: &str = "visible";
    pub const ANGLE1: &str = "angle1";
    pub const ANGLE2: &str = "angle2";
    pub const RADIUS1: &str = "radius1";
    pub const RADIUS2: &str = "radius2";
    pub const LENGTH1: &str = "length1";
    pub const LENGTH2: &str = "length2";
    pub const ROTATION_ANGLE: &str = "rotationAngle";
    pub const K_ASM1: &str = "kAsm1";
    pub const K_ASM2: &str = "kAsm2";
    pub const SA_BEFORE: &str = "before";
    pub const SA_AFTER: &str = "after";
    pub const PASSMARK_LENGTH: &str = "passmarkLength";
    pub const PASSMARK_WIDTH: &str = "passmarkWidth";
    pub const PASSMARK_ANGLE: &str = "passmarkAngle";
    pub const ROTATION: &str = "rotation";
    pub const FOLD_LINE_HEIGHT: &str = "foldLineHeightFormula";
    pub const FOLD_LINE_WIDTH: &str = "foldLineWidthFormula";
    pub const FOLD_LINE_CENTER: &str = "foldLineCenterFormula";
    pub const NAME: &str = "name";
}

#[derive(Debug)]
struct ElementData {
    tag: ElementTag,
    entity: Option<EntityId>,
    parent: Option<ElementId>,
    attrs: FxHashMap<String, String>,
    children: Vec<ElementId>,
}

/// Element arena with entity-id lookup.
#[derive(Debug, Default)]
pub struct Document {
    elements: Vec<Option<ElementData>>,
    by_entity: FxHashMap<EntityId, ElementId>,
}

impl Document {
    pub fn new() -> Self {
        Document::default()
    }

    pub fn create_element(&mut self, tag: ElementTag) -> ElementId {
        let id = ElementId(self.elements.len() as u32);
        self.elements.push(Some(ElementData {
            tag,
            entity: None,
            parent: None,
            attrs: FxHashMap::default(),
            children: Vec::new(),
        }));
        id
    }

    /// Create an element and register it under a construction entity id so
    /// `find_element_by_id` can reach it.
    pub fn create_entity_element(&mut self, tag: ElementTag, entity: EntityId) -> ElementId {
        let el = self.create_element(tag);
        if let Some(data) = self.data_mut(el) {
            data.entity = Some(entity);
        }
        self.by_entity.insert(entity, el);
        el
    }

    fn data(&self, el: ElementId) -> Option<&ElementData> {
        self.elements.get(el.index()).and_then(|e| e.as_ref())
    }

    fn data_mut(&mut self, el: ElementId) -> Option<&mut ElementData> {
        self.elements.get_mut(el.index()).and_then(|e| e.as_mut())
    }

    /// Attach `child` under `parent`. Returns false if either handle is
    /// stale or the child already has a parent.
    pub fn append_child(&mut self, parent: ElementId, child: ElementId) -> bool {
        if self.data(parent).is_none() {
            return false;
        }
        match self.data_mut(child) {
            Some(data) if data.parent.is_none() => data.parent = Some(parent),
            _ => return false,
        }
        if let Some(data) = self.data_mut(parent) {
            data.children.push(child);
        }
        true
    }

    /// Drop an element and its whole subtree. Entity registrations inside
    /// the subtree are removed as well.
    pub fn remove_element(&mut self, el: ElementId) -> bool {
        let Some(data) = self.data(el) else {
            return false;
        };
        let parent = data.parent;

        let mut stack = vec![el];
        while let Some(current) = stack.pop() {
            if let Some(data) = self.elements.get_mut(current.index()).and_then(|s| s.take()) {
                if let Some(entity) = data.entity {
                    self.by_entity.remove(&entity);
                }
                stack.extend(data.children);
            }
        }

        if let Some(parent) = parent {
            if let Some(data) = self.data_mut(parent) {
                data.children.retain(|&c| c != el);
            }
        }
        true
    }

    pub fn find_element_by_id(&self, entity: EntityId) -> Option<ElementId> {
        let el = *self.by_entity.get(&entity)?;
        self.data(el).map(|_| el)
    }

    pub fn tag(&self, el: ElementId) -> Option<ElementTag> {
        self.data(el).map(|d| d.tag)
    }

    pub fn entity(&self, el: ElementId) -> Option<EntityId> {
        self.data(el).and_then(|d| d.entity)
    }

    pub fn attribute(&self, el: ElementId, name: &str) -> Option<&str> {
        self.data(el)?.attrs.get(name).map(String::as_str)
    }

    pub fn has_attribute(&self, el: ElementId, name: &str) -> bool {
        self.data(el).is_some_and(|d| d.attrs.contains_key(name))
    }

    /// Returns false if the handle is stale.
    pub fn set_attribute(&mut self, el: ElementId, name: &str, value: impl Into<String>) -> bool {
        match self.data_mut(el) {
            Some(data) => {
                data.attrs.insert(name.to_string(), value.into());
                true
            }
            None => false,
        }
    }

    pub fn children(&self, el: ElementId) -> &[ElementId] {
        self.data(el).map(|d| d.children.as_slice()).unwrap_or(&[])
    }

    pub fn first_child_by_tag(&self, el: ElementId, tag: ElementTag) -> Option<ElementId> {
        self.children(el)
            .iter()
            .copied()
            .find(|&c| self.tag(c) == Some(tag))
    }

    /// All descendants carrying `tag`, in document order.
    pub fn descendants_by_tag(&self, el: ElementId, tag: ElementTag) -> Vec<ElementId> {
        let mut found = Vec::new();
        let mut stack: Vec<ElementId> = self.children(el).iter().rev().copied().collect();
        while let Some(current) = stack.pop() {
            if self.tag(current) == Some(tag) {
                found.push(current);
            }
            stack.extend(self.children(current).iter().rev().copied());
        }
        found
    }
}
