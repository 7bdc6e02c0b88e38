//! Whole-token grammars for formula variable names.
//!
//! Variable tokens follow a small closed set of naming grammars
//! (`Line_A_B`, `RadiusArc_O_12`, `Spl_A_B_1`, …). Every matcher here
//! anchors on the full token and requires the searched label to fill an
//! exact operand slot; a token that merely contains the label as a
//! substring of a longer name is returned unchanged.

use regex::Regex;

/// Prefixes of two-operand tokens: `<prefix>_<label1>_<label2>[_<dup>]`.
pub(crate) const TWO_OPERAND_PREFIXES: &[&str] = &[
    "Line",
    "AngleLine",
    "Angle1Spl",
    "Angle2Spl",
    "Angle1SplPath",
    "Angle2SplPath",
    "C1LengthSpl",
    "C2LengthSpl",
    "C1LengthSplPath",
    "C2LengthSplPath",
    "Spl",
    "SplPath",
];

/// Prefixes of id-qualified one-operand tokens:
/// `<prefix>_<label>_<id>[_<dup>]`.
pub(crate) const ONE_OPERAND_ID_PREFIXES: &[&str] = &[
    "RadiusArc",
    "Angle1Arc",
    "Angle2Arc",
    "Angle1ElArc",
    "Angle2ElArc",
    "Arc",
    "ElArc",
    "Radius1ElArc",
    "Radius2ElArc",
];

pub(crate) const LINE_PAIR_PREFIXES: &[&str] = &["Line", "AngleLine"];

pub(crate) const SPLINE_PREFIXES: &[&str] = &[
    "Spl",
    "Angle1Spl",
    "Angle2Spl",
    "C1LengthSpl",
    "C2LengthSpl",
];

pub(crate) const SPLINE_PATH_PREFIXES: &[&str] = &[
    "SplPath",
    "Angle1SplPath",
    "Angle2SplPath",
    "C1LengthSplPath",
    "C2LengthSplPath",
];

pub(crate) const ARC_PREFIXES: &[&str] = &["Arc", "RadiusArc", "Angle1Arc", "Angle2Arc"];

pub(crate) const EL_ARC_PREFIXES: &[&str] = &[
    "ElArc",
    "Radius1ElArc",
    "Radius2ElArc",
    "Angle1ElArc",
    "Angle2ElArc",
];

fn grammar(pattern: String) -> Option<Regex> {
    // Patterns are assembled from escaped fragments; compilation only fails
    // on a bug in this module.
    Regex::new(&pattern).ok()
}

/// Plain label rename: try every grammar in the closed set with `old` in
/// each operand slot. Returns the rewritten token, or `None` when the token
/// does not reference `old`.
pub(crate) fn rewrite_label_token(token: &str, old: &str, new: &str) -> Option<String> {
    let escaped_old = regex::escape(old);

    for prefix in TWO_OPERAND_PREFIXES {
        let escaped_prefix = regex::escape(prefix);

        // First operand: prefix_old_<anything> with optional _<number>.
        let first = grammar(format!("^({escaped_prefix})_({escaped_old})_(.+?)(?:_(\\d+))?$"))?;
        if let Some(caps) = first.captures(token) {
            let label2 = &caps[3];
            return Some(match caps.get(4) {
                Some(suffix) => format!("{prefix}_{new}_{label2}_{}", suffix.as_str()),
                None => format!("{prefix}_{new}_{label2}"),
            });
        }

        // Second operand with duplicate suffix: prefix_<anything>_old_<number>.
        let second_dup = grammar(format!("^({escaped_prefix})_(.+?)_({escaped_old})_(\\d+)$"))?;
        if let Some(caps) = second_dup.captures(token) {
            return Some(format!("{prefix}_{}_{new}_{}", &caps[2], &caps[4]));
        }

        // Second operand without suffix: prefix_<anything>_old.
        let second = grammar(format!("^({escaped_prefix})_(.+?)_({escaped_old})$"))?;
        if let Some(caps) = second.captures(token) {
            return Some(format!("{prefix}_{}_{new}", &caps[2]));
        }
    }

    for prefix in ONE_OPERAND_ID_PREFIXES {
        let escaped_prefix = regex::escape(prefix);

        // prefix_old_<id> or prefix_old_<id>_<duplicate>.
        let with_id = grammar(format!(
            "^({escaped_prefix})_({escaped_old})_(\\d+)(?:_(\\d+))?$"
        ))?;
        if let Some(caps) = with_id.captures(token) {
            let id = &caps[3];
            return Some(match caps.get(4) {
                Some(duplicate) => format!("{prefix}_{new}_{id}_{}", duplicate.as_str()),
                None => format!("{prefix}_{new}_{id}"),
            });
        }
    }

    None
}

/// Both operands of one specific two-operand token at once, with an exact
/// duplicate number (`0` means "no suffix").
pub(crate) fn rewrite_pair_token(
    token: &str,
    prefixes: &[&str],
    old: (&str, &str),
    new: (&str, &str),
    duplicate: u32,
) -> Option<String> {
    let escaped_first = regex::escape(old.0);
    let escaped_second = regex::escape(old.1);

    for prefix in prefixes {
        let escaped_prefix = regex::escape(prefix);

        let pattern = if duplicate == 0 {
            format!("^({escaped_prefix})_({escaped_first})_({escaped_second})$")
        } else {
            format!("^({escaped_prefix})_({escaped_first})_({escaped_second})_({duplicate})$")
        };
        if grammar(pattern)?.is_match(token) {
            return Some(if duplicate == 0 {
                format!("{prefix}_{}_{}", new.0, new.1)
            } else {
                format!("{prefix}_{}_{}_{duplicate}", new.0, new.1)
            });
        }
    }

    None
}

/// Curve alias rename: `<prefix>_<alias>`, no id qualifier.
pub(crate) fn rewrite_alias_token(
    token: &str,
    prefixes: &[&str],
    old: &str,
    new: &str,
) -> Option<String> {
    let escaped_old = regex::escape(old);

    for prefix in prefixes {
        let escaped_prefix = regex::escape(prefix);
        if grammar(format!("^({escaped_prefix})_({escaped_old})$"))?.is_match(token) {
            return Some(format!("{prefix}_{new}"));
        }
    }

    None
}

/// Arc center-label rename, qualified by the arc's entity id so only tokens
/// of that one arc are touched.
pub(crate) fn rewrite_arc_token(
    token: &str,
    prefixes: &[&str],
    old_center: &str,
    new_center: &str,
    arc_id: u32,
    duplicate: u32,
) -> Option<String> {
    let escaped_old = regex::escape(old_center);

    for prefix in prefixes {
        let escaped_prefix = regex::escape(prefix);

        let pattern = if duplicate == 0 {
            format!("^({escaped_prefix})_({escaped_old})_({arc_id})$")
        } else {
            format!("^({escaped_prefix})_({escaped_old})_({arc_id})_({duplicate})$")
        };
        if grammar(pattern)?.is_match(token) {
            return Some(if duplicate == 0 {
                format!("{prefix}_{new_center}_{arc_id}")
            } else {
                format!("{prefix}_{new_center}_{arc_id}_{duplicate}")
            });
        }
    }

    None
}

/// Cut-segment substitution: segments of a curve cut at a point embed the
/// point label (`<prefix>_<left>_<point>` and `<prefix>_<point>_<right>`).
/// Renaming the cut point rewrites exactly those two shapes, keeping any
/// duplicate suffix.
pub(crate) fn rewrite_segment_token(
    token: &str,
    prefixes: &[&str],
    left: &str,
    right: &str,
    old_point: &str,
    new_point: &str,
) -> Option<String> {
    let escaped_left = regex::escape(left);
    let escaped_right = regex::escape(right);
    let escaped_old = regex::escape(old_point);

    for prefix in prefixes {
        let escaped_prefix = regex::escape(prefix);

        let left_segment = grammar(format!(
            "^({escaped_prefix})_({escaped_left})_({escaped_old})(?:_(\\d+))?$"
        ))?;
        if let Some(caps) = left_segment.captures(token) {
            return Some(match caps.get(4) {
                Some(dup) => format!("{prefix}_{left}_{new_point}_{}", dup.as_str()),
                None => format!("{prefix}_{left}_{new_point}"),
            });
        }

        let right_segment = grammar(format!(
            "^({escaped_prefix})_({escaped_old})_({escaped_right})(?:_(\\d+))?$"
        ))?;
        if let Some(caps) = right_segment.captures(token) {
            return Some(match caps.get(4) {
                Some(dup) => format!("{prefix}_{new_point}_{right}_{}", dup.as_str()),
                None => format!("{prefix}_{new_point}_{right}"),
            });
        }
    }

    None
}
