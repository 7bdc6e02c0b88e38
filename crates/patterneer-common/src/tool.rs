use crate::ids::EntityId;

/// Every kind of construction step the document can record.
///
/// The set is closed on purpose: `history_visibility` matches on it without
/// a wildcard arm, so adding a tag here forces a review of every
/// classification site before the crate compiles again.
#[derive(Debug, Copy, Clone, Hash, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum ToolTag {
    // Markers and aliases that never appear in a finished record. They exist
    // as intermediate values while a tool is being created or as scene-only
    // items, never as history entries.
    Arrow,
    SinglePoint,
    DoublePoint,
    LinePoint,
    AbstractSpline,
    AbstractCut,
    Midpoint,
    ArcIntersectAxis,
    ArcStart,
    ArcEnd,
    BackgroundImage,
    BackgroundImageControls,
    BackgroundPixmapImage,
    BackgroundSvgImage,

    // Per-block bookkeeping. Recorded so block state can be restored, but
    // never shown in the visible step list.
    Piece,
    PiecePath,
    NodePoint,
    NodeArc,
    NodeElArc,
    NodeSpline,
    NodeSplinePath,
    UnionDetails,
    Group,
    Pin,
    PlaceLabel,
    InsertNode,
    DuplicateDetail,

    // Construction tools a user can see and reorder.
    BasePoint,
    EndLine,
    Line,
    AlongLine,
    ShoulderPoint,
    Normal,
    Bisector,
    LineIntersect,
    Spline,
    CubicBezier,
    CutSpline,
    CutArc,
    Arc,
    ArcWithLength,
    SplinePath,
    CubicBezierPath,
    CutSplinePath,
    PointOfContact,
    Height,
    Triangle,
    LineIntersectAxis,
    PointOfIntersectionArcs,
    PointOfIntersectionCircles,
    PointOfIntersectionCurves,
    CurveIntersectAxis,
    PointOfIntersection,
    PointFromCircleAndTangent,
    PointFromArcAndTangent,
    TrueDarts,
    Rotation,
    FlippingByLine,
    FlippingByAxis,
    Move,
    EllipticalArc,
    EllipticalArcWithLength,
    ParallelCurve,
    GraduatedCurve,
}

/// How a record participates in the visible step list.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum HistoryVisibility {
    /// A construction step the user sees and may reorder.
    Visible,
    /// Recorded for per-block state restoration only; silently skipped.
    Bookkeeping,
    /// Cannot occur in a finished record; hitting one is a caller bug.
    Unreachable,
}

/// Classify a tag for the visible-sequence filter.
///
/// The match is exhaustive with no wildcard: a new `ToolTag` variant will
/// not compile until it is classified here.
pub fn history_visibility(tag: ToolTag) -> HistoryVisibility {
    use HistoryVisibility::*;
    use ToolTag::*;

    match tag {
        Arrow | SinglePoint | DoublePoint | LinePoint | AbstractSpline | AbstractCut | Midpoint
        | ArcIntersectAxis | ArcStart | ArcEnd | BackgroundImage | BackgroundImageControls
        | BackgroundPixmapImage | BackgroundSvgImage => Unreachable,

        Piece | PiecePath | NodePoint | NodeArc | NodeElArc | NodeSpline | NodeSplinePath
        | UnionDetails | Group | Pin | PlaceLabel | InsertNode | DuplicateDetail => Bookkeeping,

        BasePoint | EndLine | Line | AlongLine | ShoulderPoint | Normal | Bisector
        | LineIntersect | Spline | CubicBezier | CutSpline | CutArc | Arc | ArcWithLength
        | SplinePath | CubicBezierPath | CutSplinePath | PointOfContact | Height | Triangle
        | LineIntersectAxis | PointOfIntersectionArcs | PointOfIntersectionCircles
        | PointOfIntersectionCurves | CurveIntersectAxis | PointOfIntersection
        | PointFromCircleAndTangent | PointFromArcAndTangent | TrueDarts | Rotation
        | FlippingByLine | FlippingByAxis | Move | EllipticalArc | EllipticalArcWithLength
        | ParallelCurve | GraduatedCurve => Visible,
    }
}

/// One construction step as recorded by the document, in creation order.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct ToolRecord {
    pub id: EntityId,
    pub tag: ToolTag,
}

impl ToolRecord {
    pub fn new(id: EntityId, tag: ToolTag) -> Self {
        ToolRecord { id, tag }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bookkeeping_tags_are_not_visible() {
        for tag in [
            ToolTag::Piece,
            ToolTag::PiecePath,
            ToolTag::NodePoint,
            ToolTag::Group,
            ToolTag::UnionDetails,
            ToolTag::InsertNode,
        ] {
            assert_eq!(history_visibility(tag), HistoryVisibility::Bookkeeping);
        }
    }

    #[test]
    fn geometry_tools_are_visible() {
        for tag in [
            ToolTag::BasePoint,
            ToolTag::EndLine,
            ToolTag::Line,
            ToolTag::Spline,
            ToolTag::CutArc,
            ToolTag::Rotation,
            ToolTag::GraduatedCurve,
        ] {
            assert_eq!(history_visibility(tag), HistoryVisibility::Visible);
        }
    }

    #[test]
    fn alias_tags_are_unreachable() {
        for tag in [ToolTag::Arrow, ToolTag::Midpoint, ToolTag::ArcStart] {
            assert_eq!(history_visibility(tag), HistoryVisibility::Unreachable);
        }
    }
}
