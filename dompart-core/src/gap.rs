//! Gap analysis
//!
//! Unassigned residues are grouped into maximal runs and classified by where
//! they sit relative to the assigned domains. Segments are derived data and
//! are recomputed from scratch on every pass.

use crate::domain::Domain;
use crate::range::{Position, Segment, SequenceRange};
use serde::Serialize;
use std::collections::BTreeSet;

pub const DEFAULT_MIN_DOMAIN_SIZE: usize = 25;
pub const DEFAULT_NEIGHBOR_TOLERANCE: u32 = 5;

/// Position of a gap relative to the domains around it
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SegmentType {
    Nterm,
    Cterm,
    Interstitial,
    Singleton,
}

impl SegmentType {
    pub fn as_str(&self) -> &'static str {
        match self {
            SegmentType::Nterm => "nterm",
            SegmentType::Cterm => "cterm",
            SegmentType::Interstitial => "inter",
            SegmentType::Singleton => "singleton",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FragmentSize {
    Small,
    Large,
}

/// A maximal run of unassigned residues.
///
/// Neighbor references are indices into the domain list the segment was
/// derived from and are only valid until that list changes.
#[derive(Debug, Clone, PartialEq)]
pub struct UnassignedSegment {
    pub start: Position,
    pub end: Position,
    pub positions: BTreeSet<Position>,
    pub segment_type: SegmentType,
    pub fragment_size: FragmentSize,
    pub preceding_domain: Option<usize>,
    pub following_domain: Option<usize>,
    segment: Segment,
}

impl UnassignedSegment {
    fn classify(
        segment: &Segment,
        domains: &[Domain],
        min_domain_size: usize,
        neighbor_tolerance: u32,
    ) -> Self {
        let (start, end) = (segment.start(), segment.end());
        let length = segment.length();

        let segment_type = if length == 1 {
            SegmentType::Singleton
        } else {
            let before = domains.iter().any(|d| d.end() < start);
            let after = domains.iter().any(|d| d.start() > end);
            match (before, after) {
                (true, true) => SegmentType::Interstitial,
                (true, false) => SegmentType::Cterm,
                _ => SegmentType::Nterm,
            }
        };

        let fragment_size = if length < min_domain_size {
            FragmentSize::Small
        } else {
            FragmentSize::Large
        };

        let (preceding_domain, following_domain) =
            find_neighbors(start, end, domains, neighbor_tolerance);

        Self {
            start,
            end,
            positions: segment.positions().collect(),
            segment_type,
            fragment_size,
            preceding_domain,
            following_domain,
            segment: segment.clone(),
        }
    }

    pub fn length(&self) -> usize {
        self.positions.len()
    }

    pub fn is_small(&self) -> bool {
        self.fragment_size == FragmentSize::Small
    }

    pub fn is_singleton(&self) -> bool {
        self.segment_type == SegmentType::Singleton
    }

    pub fn has_both_neighbors(&self) -> bool {
        self.preceding_domain.is_some() && self.following_domain.is_some()
    }

    pub fn range(&self) -> SequenceRange {
        SequenceRange::from(self.segment.clone())
    }

    /// `start-end`, as recorded in provenance strings
    pub fn span_label(&self) -> String {
        format!("{}-{}", self.start, self.end)
    }
}

/// Domains touching the gap within `tolerance` on either side.
///
/// A domain counts as preceding when its end is within tolerance of the
/// residue before the gap; otherwise as following when its start is within
/// tolerance of the residue after it. The latest-ending preceding and the
/// earliest-starting following candidate are kept, first on ties.
fn find_neighbors(
    start: Position,
    end: Position,
    domains: &[Domain],
    tolerance: u32,
) -> (Option<usize>, Option<usize>) {
    let tolerance = i64::from(tolerance);
    let before_gap = i64::from(start) - 1;
    let after_gap = i64::from(end) + 1;

    let mut preceding: Option<(usize, Position)> = None;
    let mut following: Option<(usize, Position)> = None;

    for (idx, domain) in domains.iter().enumerate() {
        if (i64::from(domain.end()) - before_gap).abs() <= tolerance {
            if preceding.map_or(true, |(_, best)| domain.end() > best) {
                preceding = Some((idx, domain.end()));
            }
        } else if (after_gap - i64::from(domain.start())).abs() <= tolerance
            && following.map_or(true, |(_, best)| domain.start() < best)
        {
            following = Some((idx, domain.start()));
        }
    }

    (preceding.map(|(i, _)| i), following.map(|(i, _)| i))
}

/// Group unused positions into classified gap segments, in position order.
pub fn discover_gaps(
    unused: &BTreeSet<Position>,
    domains: &[Domain],
    min_domain_size: usize,
    neighbor_tolerance: u32,
) -> Vec<UnassignedSegment> {
    let Ok(runs) = SequenceRange::from_positions(unused.iter().copied(), None) else {
        return Vec::new();
    };

    runs.segments()
        .iter()
        .map(|seg| UnassignedSegment::classify(seg, domains, min_domain_size, neighbor_tolerance))
        .collect()
}

/// Aggregate statistics over one gap analysis pass
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct GapSummary {
    pub total_unassigned: usize,
    pub coverage_percent: f64,
    pub num_gaps: usize,
    pub small_fragments: usize,
    pub large_gaps: usize,
    pub singletons: usize,
    pub nterm_gaps: usize,
    pub cterm_gaps: usize,
    pub interstitial_gaps: usize,
    pub largest_gap: usize,
    pub average_gap: f64,
}

impl GapSummary {
    pub fn from_segments(segments: &[UnassignedSegment], sequence_length: usize) -> Self {
        let total_unassigned: usize = segments.iter().map(UnassignedSegment::length).sum();
        let coverage_percent = if sequence_length > 0 {
            (sequence_length.saturating_sub(total_unassigned)) as f64 / sequence_length as f64 * 100.0
        } else {
            0.0
        };
        let count = |t: SegmentType| segments.iter().filter(|s| s.segment_type == t).count();
        let small_fragments = segments.iter().filter(|s| s.is_small()).count();

        Self {
            total_unassigned,
            coverage_percent,
            num_gaps: segments.len(),
            small_fragments,
            large_gaps: segments.len() - small_fragments,
            singletons: count(SegmentType::Singleton),
            nterm_gaps: count(SegmentType::Nterm),
            cterm_gaps: count(SegmentType::Cterm),
            interstitial_gaps: count(SegmentType::Interstitial),
            largest_gap: segments.iter().map(UnassignedSegment::length).max().unwrap_or(0),
            average_gap: if segments.is_empty() {
                0.0
            } else {
                total_unassigned as f64 / segments.len() as f64
            },
        }
    }
}

/// Consistency problems between gaps, domains and the sequence extent.
pub fn validate_gap_analysis(
    segments: &[UnassignedSegment],
    domains: &[Domain],
    sequence_length: usize,
) -> Vec<String> {
    let mut issues = Vec::new();

    for segment in segments {
        for domain in domains {
            let shared: Vec<Position> = segment
                .positions
                .intersection(domain.positions())
                .copied()
                .collect();
            if !shared.is_empty() {
                issues.push(format!(
                    "Segment {} overlaps with domain {} at positions {:?}",
                    segment.span_label(),
                    domain.id,
                    shared
                ));
            }
        }
    }

    for (i, a) in segments.iter().enumerate() {
        for b in &segments[i + 1..] {
            if a.positions.intersection(&b.positions).next().is_some() {
                issues.push(format!(
                    "Segments {} and {} overlap",
                    a.span_label(),
                    b.span_label()
                ));
            }
        }
    }

    let covered: BTreeSet<Position> = domains
        .iter()
        .flat_map(|d| d.positions().iter().copied())
        .chain(segments.iter().flat_map(|s| s.positions.iter().copied()))
        .collect();
    let expected: BTreeSet<Position> = (1..=sequence_length as Position).collect();

    let missing: Vec<Position> = expected.difference(&covered).copied().collect();
    if !missing.is_empty() {
        issues.push(format!("Missing positions not covered by domains or segments: {:?}", missing));
    }
    let extra: Vec<Position> = covered.difference(&expected).copied().collect();
    if !extra.is_empty() {
        issues.push(format!("Positions outside sequence bounds: {:?}", extra));
    }

    issues
}
