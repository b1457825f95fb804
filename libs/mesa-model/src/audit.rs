//! Composite range auditing
//!
//! Arrays and selector blocks each occupy a contiguous index range within
//! their point type. Two ranges of the same kind overlapping is a severe
//! latent correctness issue for a grid-control profile, so it is a hard
//! catalog-load error here. An array is allowed to sit inside a selector
//! block's edit range (curve arrays live inside curve edit blocks).

use crate::error::{CatalogError, Result};
use crate::point::{PointDefinition, PointType};
use std::collections::HashMap;
use std::sync::Arc;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum RangeKind {
    Array,
    SelectorBlock,
}

#[derive(Debug)]
struct CompositeRange<'a> {
    definition: &'a PointDefinition,
    kind: RangeKind,
    start: u16,
    end: u16,
}

fn composite_ranges(points: &[Arc<PointDefinition>]) -> Vec<CompositeRange<'_>> {
    let mut ranges = Vec::new();
    for point in points {
        if let Some(last) = point.array_last_index() {
            ranges.push(CompositeRange {
                definition: point,
                kind: RangeKind::Array,
                start: point.index,
                end: last,
            });
        } else if let Some((start, end)) = point.selector_bounds() {
            ranges.push(CompositeRange {
                definition: point,
                kind: RangeKind::SelectorBlock,
                start,
                end,
            });
        }
    }
    ranges
}

/// Fail the load when two composite ranges of the same kind overlap within
/// one point type.
pub fn check_overlaps(points: &[Arc<PointDefinition>]) -> Result<()> {
    let mut by_type: HashMap<PointType, Vec<CompositeRange<'_>>> = HashMap::new();
    for range in composite_ranges(points) {
        by_type
            .entry(range.definition.point_type)
            .or_default()
            .push(range);
    }
    for ranges in by_type.values() {
        for (i, a) in ranges.iter().enumerate() {
            for b in &ranges[i + 1..] {
                if a.kind == b.kind && a.start <= b.end && b.start <= a.end {
                    return Err(CatalogError::Overlap(format!(
                        "{} [{},{}] and {} [{},{}]",
                        a.definition, a.start, a.end, b.definition, b.start, b.end
                    )));
                }
            }
        }
    }
    Ok(())
}

/// One line per composite range, for diagnostics.
pub fn audit_report(points: &[Arc<PointDefinition>]) -> Vec<String> {
    let mut lines: Vec<String> = composite_ranges(points)
        .iter()
        .map(|range| {
            let kind = match range.kind {
                RangeKind::Array => "array",
                RangeKind::SelectorBlock => "selector_block",
            };
            format!(
                "{} ({}): {} indexes=({},{})",
                range.definition.name, range.definition.point_type, kind, range.start, range.end
            )
        })
        .collect();
    lines.sort();
    lines
}
