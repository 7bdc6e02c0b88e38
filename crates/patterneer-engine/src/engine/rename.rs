//! Reversible rename propagation.
//!
//! Each command snapshots the dependent subgraph of the renamed entity at
//! construction time, then rewrites formula tokens in the persisted
//! elements of that snapshot on every `redo`/`undo`. The snapshot is never
//! recomputed: by the time undo runs the graph may have changed shape, but
//! undo must still revert exactly the elements redo touched.

use patterneer_common::{EntityId, NodeKind, PatternNode};
use patterneer_parse::variable_tokens;
use thiserror::Error;

use crate::dom::{Document, ElementId, ElementTag, attr};
use crate::engine::grammar::{
    ARC_PREFIXES, EL_ARC_PREFIXES, LINE_PAIR_PREFIXES, SPLINE_PATH_PREFIXES, SPLINE_PREFIXES,
    rewrite_alias_token, rewrite_arc_token, rewrite_label_token, rewrite_pair_token,
    rewrite_segment_token,
};
use crate::engine::graph::DependencyGraph;
use crate::undo::UndoCommand;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum RenameError {
    #[error("label must not be empty")]
    EmptyLabel,
    #[error("label `{0}` must not contain an underscore")]
    UnderscoredLabel(String),
}

fn validate_label(label: &str) -> Result<(), RenameError> {
    if label.is_empty() {
        return Err(RenameError::EmptyLabel);
    }
    // Underscores delimit operand slots inside tokens; a label containing
    // one could never be matched unambiguously.
    if label.contains('_') {
        return Err(RenameError::UnderscoredLabel(label.to_string()));
    }
    Ok(())
}

/// Snapshot of everything that transitively depends on `target`. Raw
/// geometry records hold no formulas, so object-kind nodes are skipped.
fn snapshot_dependents(graph: &DependencyGraph, target: EntityId) -> Vec<PatternNode> {
    graph.dependent_nodes_where(target, |node| node.kind != NodeKind::Object)
}

/// Entity tags whose elements carry formulas.
const FORMULA_BEARING_TAGS: &[ElementTag] = &[
    ElementTag::Point,
    ElementTag::Operation,
    ElementTag::Arc,
    ElementTag::ElArc,
    ElementTag::Spline,
    ElementTag::Path,
    ElementTag::Tools,
    ElementTag::Detail,
];

const POINT_ATTRS: &[&str] = &[
    attr::LENGTH,
    attr::ANGLE,
    attr::RADIUS,
    attr::C1_RADIUS,
    attr::C2_RADIUS,
    attr::C_RADIUS,
    attr::WIDTH,
    attr::HEIGHT,
    attr::VISIBLE,
];

const OPERATION_ATTRS: &[&str] = &[attr::ANGLE, attr::LENGTH, attr::ROTATION_ANGLE];

const ARC_ATTRS: &[&str] = &[attr::LENGTH, attr::ANGLE1, attr::ANGLE2, attr::RADIUS];

const EL_ARC_ATTRS: &[&str] = &[
    attr::LENGTH,
    attr::ANGLE1,
    attr::ANGLE2,
    attr::RADIUS1,
    attr::RADIUS2,
    attr::ROTATION_ANGLE,
];

const SPLINE_ATTRS: &[&str] = &[
    attr::ANGLE1,
    attr::ANGLE2,
    attr::LENGTH1,
    attr::LENGTH2,
    attr::WIDTH,
];

const PATH_POINT_ATTRS: &[&str] = &[
    attr::K_ASM2,
    attr::ANGLE,
    attr::ANGLE1,
    attr::ANGLE2,
    attr::LENGTH1,
    attr::LENGTH2,
    attr::K_ASM1,
];

const NODE_ATTRS: &[&str] = &[
    attr::SA_BEFORE,
    attr::SA_AFTER,
    attr::PASSMARK_LENGTH,
    attr::PASSMARK_WIDTH,
    attr::PASSMARK_ANGLE,
];

const PIECE_DATA_ATTRS: &[&str] = &[attr::WIDTH, attr::HEIGHT, attr::ROTATION];

const GRAINLINE_ATTRS: &[&str] = &[attr::LENGTH, attr::ROTATION];

const MIRROR_LINE_ATTRS: &[&str] = &[
    attr::FOLD_LINE_HEIGHT,
    attr::FOLD_LINE_WIDTH,
    attr::FOLD_LINE_CENTER,
];

/// Walk the snapshotted dependents and rewrite every formula-bearing slot.
fn propagate(
    doc: &mut Document,
    dependents: &[PatternNode],
    rewrite: &dyn Fn(&str) -> Option<String>,
) {
    for node in dependents {
        let Some(element) = doc.find_element_by_id(node.id) else {
            continue;
        };
        let Some(tag) = doc.tag(element) else {
            continue;
        };
        if !FORMULA_BEARING_TAGS.contains(&tag) {
            continue;
        }
        process_element(doc, element, tag, rewrite);
    }
}

fn process_element(
    doc: &mut Document,
    element: ElementId,
    tag: ElementTag,
    rewrite: &dyn Fn(&str) -> Option<String>,
) {
    match tag {
        ElementTag::Point => process_attrs(doc, element, POINT_ATTRS, rewrite),
        ElementTag::Operation => process_attrs(doc, element, OPERATION_ATTRS, rewrite),
        ElementTag::Arc => process_attrs(doc, element, ARC_ATTRS, rewrite),
        ElementTag::ElArc => process_attrs(doc, element, EL_ARC_ATTRS, rewrite),
        ElementTag::Spline => {
            process_attrs(doc, element, SPLINE_ATTRS, rewrite);
            for path_point in doc.descendants_by_tag(element, ElementTag::PathPoint) {
                process_attrs(doc, path_point, PATH_POINT_ATTRS, rewrite);
            }
            for offset in doc.descendants_by_tag(element, ElementTag::Offset) {
                process_attrs(doc, offset, &[attr::WIDTH], rewrite);
            }
        }
        ElementTag::Path | ElementTag::Tools => {
            process_attrs(doc, element, &[attr::VISIBLE], rewrite);
            process_node_descendants(doc, element, rewrite);
        }
        ElementTag::Detail => {
            process_attrs(doc, element, &[attr::WIDTH], rewrite);
            if let Some(data) = doc.first_child_by_tag(element, ElementTag::Data) {
                process_attrs(doc, data, PIECE_DATA_ATTRS, rewrite);
            }
            if let Some(info) = doc.first_child_by_tag(element, ElementTag::PatternInfo) {
                process_attrs(doc, info, PIECE_DATA_ATTRS, rewrite);
            }
            if let Some(grainline) = doc.first_child_by_tag(element, ElementTag::Grainline) {
                process_attrs(doc, grainline, GRAINLINE_ATTRS, rewrite);
            }
            if let Some(mirror) = doc.first_child_by_tag(element, ElementTag::MirrorLine) {
                process_attrs(doc, mirror, MIRROR_LINE_ATTRS, rewrite);
            }
            process_node_descendants(doc, element, rewrite);
        }
        // Guarded by FORMULA_BEARING_TAGS above.
        _ => {}
    }
}

fn process_node_descendants(
    doc: &mut Document,
    element: ElementId,
    rewrite: &dyn Fn(&str) -> Option<String>,
) {
    for node in doc.descendants_by_tag(element, ElementTag::Node) {
        process_attrs(doc, node, NODE_ATTRS, rewrite);
    }
}

fn process_attrs(
    doc: &mut Document,
    element: ElementId,
    attrs: &[&str],
    rewrite: &dyn Fn(&str) -> Option<String>,
) {
    for name in attrs {
        process_attribute(doc, element, name, rewrite);
    }
}

fn process_attribute(
    doc: &mut Document,
    element: ElementId,
    name: &str,
    rewrite: &dyn Fn(&str) -> Option<String>,
) {
    let Some(formula) = doc.attribute(element, name) else {
        return;
    };
    let formula = formula.to_string();

    let updated = process_formula(&formula, rewrite);
    // Byte-identical formulas are not written back: an unused label must
    // leave the persisted tree untouched.
    if updated != formula {
        doc.set_attribute(element, name, updated);
    }
}

fn process_formula(formula: &str, rewrite: &dyn Fn(&str) -> Option<String>) -> String {
    if formula.is_empty() {
        return formula.to_string();
    }

    let tokens = match variable_tokens(formula) {
        Ok(tokens) => tokens,
        Err(error) => {
            tracing::warn!(%error, formula, "formula did not tokenize, left untouched");
            return formula.to_string();
        }
    };

    let mut result = formula.to_string();
    // Reverse order keeps earlier byte positions valid while splicing.
    for (&position, token) in tokens.iter().rev() {
        if let Some(new_token) = rewrite(token) {
            result.replace_range(position..position + token.len(), &new_token);
        }
    }
    result
}

/// Plain label rename across every naming grammar of the closed set.
#[derive(Debug)]
pub struct RenameLabel {
    dependents: Vec<PatternNode>,
    old: String,
    new: String,
}

impl RenameLabel {
    pub fn new(
        graph: &DependencyGraph,
        target: EntityId,
        old_label: &str,
        new_label: &str,
    ) -> Result<Self, RenameError> {
        validate_label(old_label)?;
        validate_label(new_label)?;
        Ok(RenameLabel {
            dependents: snapshot_dependents(graph, target),
            old: old_label.to_string(),
            new: new_label.to_string(),
        })
    }
}

impl UndoCommand for RenameLabel {
    fn redo(&mut self, doc: &mut Document) {
        propagate(doc, &self.dependents, &|token| {
            rewrite_label_token(token, &self.old, &self.new)
        });
    }

    fn undo(&mut self, doc: &mut Document) {
        propagate(doc, &self.dependents, &|token| {
            rewrite_label_token(token, &self.new, &self.old)
        });
    }
}

/// Rename both endpoint labels of one line / spline / spline path at once.
pub struct RenamePair {
    dependents: Vec<PatternNode>,
    prefixes: &'static [&'static str],
    old: (String, String),
    new: (String, String),
    duplicate: u32,
}

impl RenamePair {
    pub fn for_line(
        graph: &DependencyGraph,
        target: EntityId,
        old_pair: (&str, &str),
        new_pair: (&str, &str),
    ) -> Result<Self, RenameError> {
        Self::with(graph, target, LINE_PAIR_PREFIXES, old_pair, new_pair, 0)
    }

    pub fn for_spline(
        graph: &DependencyGraph,
        target: EntityId,
        old_pair: (&str, &str),
        new_pair: (&str, &str),
        duplicate: u32,
    ) -> Result<Self, RenameError> {
        Self::with(graph, target, SPLINE_PREFIXES, old_pair, new_pair, duplicate)
    }

    pub fn for_spline_path(
        graph: &DependencyGraph,
        target: EntityId,
        old_pair: (&str, &str),
        new_pair: (&str, &str),
        duplicate: u32,
    ) -> Result<Self, RenameError> {
        Self::with(
            graph,
            target,
            SPLINE_PATH_PREFIXES,
            old_pair,
            new_pair,
            duplicate,
        )
    }

    fn with(
        graph: &DependencyGraph,
        target: EntityId,
        prefixes: &'static [&'static str],
        old_pair: (&str, &str),
        new_pair: (&str, &str),
        duplicate: u32,
    ) -> Result<Self, RenameError> {
        for label in [old_pair.0, old_pair.1, new_pair.0, new_pair.1] {
            validate_label(label)?;
        }
        Ok(RenamePair {
            dependents: snapshot_dependents(graph, target),
            prefixes,
            old: (old_pair.0.to_string(), old_pair.1.to_string()),
            new: (new_pair.0.to_string(), new_pair.1.to_string()),
            duplicate,
        })
    }
}

impl UndoCommand for RenamePair {
    fn redo(&mut self, doc: &mut Document) {
        propagate(doc, &self.dependents, &|token| {
            rewrite_pair_token(
                token,
                self.prefixes,
                (self.old.0.as_str(), self.old.1.as_str()),
                (self.new.0.as_str(), self.new.1.as_str()),
                self.duplicate,
            )
        });
    }

    fn undo(&mut self, doc: &mut Document) {
        propagate(doc, &self.dependents, &|token| {
            rewrite_pair_token(
                token,
                self.prefixes,
                (self.new.0.as_str(), self.new.1.as_str()),
                (self.old.0.as_str(), self.old.1.as_str()),
                self.duplicate,
            )
        });
    }
}

/// Which curve family an alias or segment belongs to.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum CurveAliasKind {
    Arc,
    ElArc,
    Spline,
    SplinePath,
    All,
}

impl CurveAliasKind {
    fn prefixes(self) -> Vec<&'static str> {
        match self {
            CurveAliasKind::Arc => ARC_PREFIXES.to_vec(),
            CurveAliasKind::ElArc => EL_ARC_PREFIXES.to_vec(),
            CurveAliasKind::Spline => SPLINE_PREFIXES.to_vec(),
            CurveAliasKind::SplinePath => SPLINE_PATH_PREFIXES.to_vec(),
            CurveAliasKind::All => [
                ARC_PREFIXES,
                EL_ARC_PREFIXES,
                SPLINE_PREFIXES,
                SPLINE_PATH_PREFIXES,
            ]
            .concat(),
        }
    }
}

/// Rename a curve alias (`<prefix>_<alias>` tokens, no id qualifier).
pub struct RenameAlias {
    dependents: Vec<PatternNode>,
    prefixes: Vec<&'static str>,
    old: String,
    new: String,
}

impl RenameAlias {
    pub fn new(
        graph: &DependencyGraph,
        target: EntityId,
        kind: CurveAliasKind,
        old_alias: &str,
        new_alias: &str,
    ) -> Result<Self, RenameError> {
        validate_label(old_alias)?;
        validate_label(new_alias)?;
        Ok(RenameAlias {
            dependents: snapshot_dependents(graph, target),
            prefixes: kind.prefixes(),
            old: old_alias.to_string(),
            new: new_alias.to_string(),
        })
    }
}

impl UndoCommand for RenameAlias {
    fn redo(&mut self, doc: &mut Document) {
        propagate(doc, &self.dependents, &|token| {
            rewrite_alias_token(token, &self.prefixes, &self.old, &self.new)
        });
    }

    fn undo(&mut self, doc: &mut Document) {
        propagate(doc, &self.dependents, &|token| {
            rewrite_alias_token(token, &self.prefixes, &self.new, &self.old)
        });
    }
}

/// Circular or elliptical arc.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum ArcKind {
    Arc,
    ElArc,
}

/// Rename an arc's center label in the id-qualified grammar
/// (`<prefix>_<center>_<arcId>[_<dup>]`); only tokens carrying this arc's
/// id are rewritten.
pub struct RenameArc {
    dependents: Vec<PatternNode>,
    prefixes: &'static [&'static str],
    old_center: String,
    new_center: String,
    arc_id: u32,
    duplicate: u32,
}

impl RenameArc {
    pub fn new(
        graph: &DependencyGraph,
        arc: EntityId,
        kind: ArcKind,
        old_center: &str,
        new_center: &str,
        duplicate: u32,
    ) -> Result<Self, RenameError> {
        validate_label(old_center)?;
        validate_label(new_center)?;
        Ok(RenameArc {
            dependents: snapshot_dependents(graph, arc),
            prefixes: match kind {
                ArcKind::Arc => ARC_PREFIXES,
                ArcKind::ElArc => EL_ARC_PREFIXES,
            },
            old_center: old_center.to_string(),
            new_center: new_center.to_string(),
            arc_id: arc.raw(),
            duplicate,
        })
    }
}

impl UndoCommand for RenameArc {
    fn redo(&mut self, doc: &mut Document) {
        propagate(doc, &self.dependents, &|token| {
            rewrite_arc_token(
                token,
                self.prefixes,
                &self.old_center,
                &self.new_center,
                self.arc_id,
                self.duplicate,
            )
        });
    }

    fn undo(&mut self, doc: &mut Document) {
        propagate(doc, &self.dependents, &|token| {
            rewrite_arc_token(
                token,
                self.prefixes,
                &self.new_center,
                &self.old_center,
                self.arc_id,
                self.duplicate,
            )
        });
    }
}

/// Rename the cut point embedded in segment-curve names.
///
/// Cutting a curve that runs `left → right` at a point produces two
/// segments named `<prefix>_<left>_<point>` and `<prefix>_<point>_<right>`.
/// When the cut point is renamed, both shapes are rewritten in every
/// dependent formula; anchoring on the end labels keeps unrelated curves
/// that mention the point untouched.
pub struct RenameSegmentCurves {
    dependents: Vec<PatternNode>,
    prefixes: Vec<&'static str>,
    left: String,
    right: String,
    old_point: String,
    new_point: String,
}

impl RenameSegmentCurves {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        graph: &DependencyGraph,
        point: EntityId,
        kind: CurveAliasKind,
        left: &str,
        right: &str,
        old_point: &str,
        new_point: &str,
    ) -> Result<Self, RenameError> {
        for label in [left, right, old_point, new_point] {
            validate_label(label)?;
        }
        Ok(RenameSegmentCurves {
            dependents: snapshot_dependents(graph, point),
            prefixes: kind.prefixes(),
            left: left.to_string(),
            right: right.to_string(),
            old_point: old_point.to_string(),
            new_point: new_point.to_string(),
        })
    }
}

impl UndoCommand for RenameSegmentCurves {
    fn redo(&mut self, doc: &mut Document) {
        propagate(doc, &self.dependents, &|token| {
            rewrite_segment_token(
                token,
                &self.prefixes,
                &self.left,
                &self.right,
                &self.old_point,
                &self.new_point,
            )
        });
    }

    fn undo(&mut self, doc: &mut Document) {
        propagate(doc, &self.dependents, &|token| {
            rewrite_segment_token(
                token,
                &self.prefixes,
                &self.left,
                &self.right,
                &self.new_point,
                &self.old_point,
            )
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn labels_are_validated() {
        let graph = DependencyGraph::new();
        assert_eq!(
            RenameLabel::new(&graph, EntityId::new(1), "", "B").unwrap_err(),
            RenameError::EmptyLabel
        );
        assert_eq!(
            RenameLabel::new(&graph, EntityId::new(1), "A", "B_2").unwrap_err(),
            RenameError::UnderscoredLabel("B_2".to_string())
        );
        assert!(RenameLabel::new(&graph, EntityId::new(1), "A", "B").is_ok());
    }

    #[test]
    fn formula_splicing_preserves_surroundings() {
        let rewritten = process_formula("Line_A_C + Line_AB_C * 2", &|token| {
            rewrite_label_token(token, "A", "B")
        });
        assert_eq!(rewritten, "Line_B_C + Line_AB_C * 2");
    }

    #[test]
    fn malformed_formula_is_left_untouched() {
        let rewritten = process_formula("Line_A_C + (", &|token| {
            rewrite_label_token(token, "A", "B")
        });
        assert_eq!(rewritten, "Line_A_C + (");
    }

    #[test]
    fn multiple_replacements_in_one_formula() {
        let rewritten = process_formula("Line_A_C+AngleLine_C_A_2", &|token| {
            rewrite_label_token(token, "A", "Waist")
        });
        assert_eq!(rewritten, "Line_Waist_C+AngleLine_C_Waist_2");
    }
}
