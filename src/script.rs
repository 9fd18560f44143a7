use crate::assets::{base_name, scene_line, ImageAsset, TextAsset};
use std::collections::BTreeMap;

/// Context-localization window: the first ANCHOR_LEN chars of a frame's
/// scene snippet are searched for in the assembled script, and the
/// surrounding [P - CONTEXT_BEFORE, P + CONTEXT_AFTER] slice is returned.
pub const ANCHOR_LEN: usize = 40;
pub const CONTEXT_BEFORE: usize = 1000;
pub const CONTEXT_AFTER: usize = 3000;

/// Per-frame outcome of script assembly. Skips are silent at this layer;
/// the workflow decides how to report them.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LineOutcome {
    Found { frame: String },
    Skipped { frame: String, reason: SkipReason },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    MissingText,
    TooFewLines,
}

/// Builds the canonical narrative script: one scene-text line per frame, in
/// lexicographic frame-name order. The ordering must stay total and
/// deterministic because context localization later searches positionally
/// into this exact string.
pub fn assemble(
    frames: &BTreeMap<String, ImageAsset>,
    texts: &[TextAsset],
) -> (String, Vec<LineOutcome>) {
    let mut lines = Vec::new();
    let mut outcomes = Vec::new();

    for frame_name in frames.keys() {
        let base = base_name(frame_name);
        let text = texts.iter().find(|t| {
            t.name.starts_with(base) && t.name.to_ascii_lowercase().ends_with(".txt")
        });

        match text {
            None => outcomes.push(LineOutcome::Skipped {
                frame: frame_name.clone(),
                reason: SkipReason::MissingText,
            }),
            Some(t) => match scene_line(&t.content) {
                Some(line) => {
                    lines.push(line.to_string());
                    outcomes.push(LineOutcome::Found {
                        frame: frame_name.clone(),
                    });
                }
                None => outcomes.push(LineOutcome::Skipped {
                    frame: frame_name.clone(),
                    reason: SkipReason::TooFewLines,
                }),
            },
        }
    }

    (lines.join("\n"), outcomes)
}

/// Returns the local narrative window around the first occurrence of the
/// snippet's anchor inside the assembled script, or an empty string when the
/// anchor is missing. Window offsets are byte-based and clamped to char
/// boundaries so multi-byte text never slices mid-codepoint.
pub fn localize(script: &str, snippet: &str) -> String {
    let anchor: String = snippet.chars().take(ANCHOR_LEN).collect();
    if anchor.is_empty() {
        return String::new();
    }

    let Some(pos) = script.find(&anchor) else {
        return String::new();
    };

    let start = floor_char_boundary(script, pos.saturating_sub(CONTEXT_BEFORE));
    let end = ceil_char_boundary(script, (pos + CONTEXT_AFTER).min(script.len()));
    script[start..end].to_string()
}

fn floor_char_boundary(s: &str, mut idx: usize) -> usize {
    while idx > 0 && !s.is_char_boundary(idx) {
        idx -= 1;
    }
    idx
}

fn ceil_char_boundary(s: &str, mut idx: usize) -> usize {
    while idx < s.len() && !s.is_char_boundary(idx) {
        idx += 1;
    }
    idx
}
