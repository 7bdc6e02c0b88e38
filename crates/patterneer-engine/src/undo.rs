use crate::dom::Document;

/// Boundary to the host's undo stack.
///
/// The stack itself lives outside this crate; commands only promise that
/// `redo` and `undo` may each be invoked any number of times in alternation
/// after construction, and that `undo` reverts exactly what the matching
/// `redo` touched.
pub trait UndoCommand {
    fn redo(&mut self, doc: &mut Document);
    fn undo(&mut self, doc: &mut Document);
}
