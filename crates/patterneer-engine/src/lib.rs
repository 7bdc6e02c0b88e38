pub mod dom;
pub mod undo;

pub mod engine;

pub use dom::{Document, ElementId, ElementTag};
pub use engine::block_registry::BlockRegistry;
pub use engine::graph::{DependencyGraph, GraphReadView, GraphWriteView};
pub use engine::history::{GeometryStore, HistoryNavigator};
pub use engine::rename::{
    ArcKind, CurveAliasKind, RenameAlias, RenameArc, RenameError, RenameLabel, RenamePair,
    RenameSegmentCurves,
};
pub use undo::UndoCommand;

pub use patterneer_common::{
    BlockId, EntityId, HistoryVisibility, NO_BLOCK, NodeKind, PatternNode, ToolRecord, ToolTag,
    history_visibility,
};
