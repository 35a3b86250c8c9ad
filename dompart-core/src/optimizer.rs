//! Boundary optimization
//!
//! A single deterministic refinement pass over a [`DomainLayout`]:
//!
//! 1. trim small overlaps between domains,
//! 2. classify the remaining gaps,
//! 3. fold small gaps into neighboring domains by type-specific rules,
//! 4. re-run gap analysis to refresh statistics.
//!
//! Large gaps are left unassigned. How an interstitial gap is divided
//! between its two neighbors is delegated to a [`BoundaryResolver`].

use crate::domain::Domain;
use crate::gap::{SegmentType, UnassignedSegment, DEFAULT_MIN_DOMAIN_SIZE, DEFAULT_NEIGHBOR_TOLERANCE};
use crate::layout::{DomainLayout, LayoutResult};
use crate::range::Position;
use serde::Serialize;
use std::collections::BTreeSet;

/// Decides how a gap between two domains is divided.
///
/// Returns the positions for `preceding` and `following`; together they
/// must be exactly the segment's positions.
pub trait BoundaryResolver {
    fn resolve(
        &self,
        preceding: &Domain,
        following: &Domain,
        segment: &UnassignedSegment,
    ) -> (BTreeSet<Position>, BTreeSet<Position>);
}

/// Sequence-position bisection.
///
/// The first `len / 2 + 1` positions go to the preceding domain. A single
/// residue goes to the neighbor whose primary evidence is more confident,
/// the preceding one on ties.
#[derive(Debug, Clone, Copy, Default)]
pub struct SequenceBoundaryResolver;

impl BoundaryResolver for SequenceBoundaryResolver {
    fn resolve(
        &self,
        preceding: &Domain,
        following: &Domain,
        segment: &UnassignedSegment,
    ) -> (BTreeSet<Position>, BTreeSet<Position>) {
        if segment.length() == 1 {
            let first = preceding.primary_evidence().confidence;
            let second = following.primary_evidence().confidence;
            return if first >= second {
                (segment.positions.clone(), BTreeSet::new())
            } else {
                (BTreeSet::new(), segment.positions.clone())
            };
        }

        let cut = segment.length() / 2 + 1;
        let to_preceding = segment.positions.iter().copied().take(cut).collect();
        let to_following = segment.positions.iter().copied().skip(cut).collect();
        (to_preceding, to_following)
    }
}

/// Parameters for boundary optimization
#[derive(Debug, Clone)]
pub struct OptimizerParams {
    /// Gaps shorter than this are merged; longer ones are skipped
    pub min_domain_size: usize,
    /// Maximum distance for a domain to count as a gap's neighbor
    pub neighbor_tolerance: u32,
    /// Overlaps up to this many residues are trimmed
    pub max_overlap: usize,
}

impl Default for OptimizerParams {
    fn default() -> Self {
        Self {
            min_domain_size: DEFAULT_MIN_DOMAIN_SIZE,
            neighbor_tolerance: DEFAULT_NEIGHBOR_TOLERANCE,
            max_overlap: 5,
        }
    }
}

/// Counters for one optimization pass
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct OptimizationStats {
    pub nterm_merges: usize,
    pub cterm_merges: usize,
    pub inter_single_merges: usize,
    pub inter_split_merges: usize,
    pub singleton_merges: usize,
    pub large_gaps_skipped: usize,
    pub overlaps_resolved: usize,
}

impl OptimizationStats {
    /// Number of mutations applied to domains
    pub fn total_actions(&self) -> usize {
        self.nterm_merges
            + self.cterm_merges
            + self.inter_single_merges
            + self.inter_split_merges
            + self.singleton_merges
            + self.overlaps_resolved
    }
}

pub struct BoundaryOptimizer {
    params: OptimizerParams,
    resolver: Box<dyn BoundaryResolver + Send + Sync>,
}

impl BoundaryOptimizer {
    pub fn new(params: OptimizerParams) -> Self {
        Self::with_resolver(params, Box::new(SequenceBoundaryResolver))
    }

    pub fn with_resolver(
        params: OptimizerParams,
        resolver: Box<dyn BoundaryResolver + Send + Sync>,
    ) -> Self {
        Self { params, resolver }
    }

    pub fn params(&self) -> &OptimizerParams {
        &self.params
    }

    /// Run one refinement pass over `layout`.
    pub fn optimize(&self, layout: &mut DomainLayout) -> LayoutResult<OptimizationStats> {
        let mut stats = OptimizationStats {
            overlaps_resolved: layout.resolve_small_overlaps(self.params.max_overlap)?,
            ..OptimizationStats::default()
        };
        if stats.overlaps_resolved > 0 {
            log::debug!("Resolved {} small domain overlaps", stats.overlaps_resolved);
        }

        layout.analyze_gaps(self.params.min_domain_size, self.params.neighbor_tolerance);
        if layout.unassigned_segments().is_empty() {
            log::debug!("No unassigned segments; nothing to optimize");
            return Ok(stats);
        }

        let (small, large): (Vec<UnassignedSegment>, Vec<UnassignedSegment>) = layout
            .unassigned_segments()
            .iter()
            .cloned()
            .partition(UnassignedSegment::is_small);

        for segment in &small {
            self.process_fragment(segment, layout, &mut stats)?;
        }
        for segment in &large {
            log::debug!(
                "Skipping large gap {} ({} residues)",
                segment.span_label(),
                segment.length()
            );
            stats.large_gaps_skipped += 1;
        }

        layout.analyze_gaps(self.params.min_domain_size, self.params.neighbor_tolerance);
        log::debug!(
            "Optimization complete: {} actions, {} gaps remain",
            stats.total_actions(),
            layout.unassigned_segments().len()
        );
        Ok(stats)
    }

    fn process_fragment(
        &self,
        segment: &UnassignedSegment,
        layout: &mut DomainLayout,
        stats: &mut OptimizationStats,
    ) -> LayoutResult<()> {
        match segment.segment_type {
            SegmentType::Nterm => self.merge_terminal(segment, layout, stats, Terminus::N),
            SegmentType::Cterm => self.merge_terminal(segment, layout, stats, Terminus::C),
            SegmentType::Interstitial => self.merge_interstitial(segment, layout, stats),
            SegmentType::Singleton => self.merge_singleton(segment, layout, stats),
        }
    }

    fn merge_terminal(
        &self,
        segment: &UnassignedSegment,
        layout: &mut DomainLayout,
        stats: &mut OptimizationStats,
        terminus: Terminus,
    ) -> LayoutResult<()> {
        let target = match terminus {
            Terminus::N => first_by(layout.domains(), |d| d.start()),
            Terminus::C => first_by(layout.domains(), |d| u32::MAX - d.end()),
        };
        let Some(idx) = target else {
            log::warn!("No domains available for terminal fragment {}", segment.span_label());
            return Ok(());
        };

        let action = match terminus {
            Terminus::N => "nterm_merge",
            Terminus::C => "cterm_merge",
        };
        log::debug!(
            "{}: fragment {} into {}",
            action,
            segment.span_label(),
            layout.domains()[idx].id
        );
        layout.record_action(idx, action, &segment.span_label())?;
        layout.merge_segment_with_domain(segment, idx)?;

        match terminus {
            Terminus::N => stats.nterm_merges += 1,
            Terminus::C => stats.cterm_merges += 1,
        }
        Ok(())
    }

    fn merge_interstitial(
        &self,
        segment: &UnassignedSegment,
        layout: &mut DomainLayout,
        stats: &mut OptimizationStats,
    ) -> LayoutResult<()> {
        match (segment.preceding_domain, segment.following_domain) {
            (Some(before), Some(after)) => {
                let split = self.resolver.resolve(
                    layout.domain(before)?,
                    layout.domain(after)?,
                    segment,
                );
                log::debug!(
                    "Splitting fragment {} between {} ({}) and {} ({})",
                    segment.span_label(),
                    layout.domains()[before].id,
                    split.0.len(),
                    layout.domains()[after].id,
                    split.1.len()
                );
                layout.split_segment_between_domains(segment, before, after, split)?;
                stats.inter_split_merges += 1;
            }
            (Some(idx), None) | (None, Some(idx)) => {
                log::debug!(
                    "Merging fragment {} into neighbor {}",
                    segment.span_label(),
                    layout.domains()[idx].id
                );
                layout.merge_segment_with_domain(segment, idx)?;
                stats.inter_single_merges += 1;
            }
            (None, None) => {
                log::debug!(
                    "Fragment {} has no neighbor within tolerance; treating as N-terminal",
                    segment.span_label()
                );
                self.merge_terminal(segment, layout, stats, Terminus::N)?;
            }
        }
        Ok(())
    }

    fn merge_singleton(
        &self,
        segment: &UnassignedSegment,
        layout: &mut DomainLayout,
        stats: &mut OptimizationStats,
    ) -> LayoutResult<()> {
        let Some((idx, distance)) = nearest_domain(segment.start, layout.domains()) else {
            log::warn!("No domains available for singleton {}", segment.start);
            return Ok(());
        };

        log::debug!(
            "Merging singleton {} into {} (distance {})",
            segment.start,
            layout.domains()[idx].id,
            distance
        );
        layout.merge_segment_with_domain(segment, idx)?;
        stats.singleton_merges += 1;
        Ok(())
    }
}

impl Default for BoundaryOptimizer {
    fn default() -> Self {
        Self::new(OptimizerParams::default())
    }
}

#[derive(Debug, Clone, Copy)]
enum Terminus {
    N,
    C,
}

/// Index and distance of the domain whose start or end is closest to
/// `position`, smaller start first on ties.
pub fn nearest_domain(position: Position, domains: &[Domain]) -> Option<(usize, i64)> {
    let pos = i64::from(position);
    let mut closest: Option<(usize, i64, Position)> = None;

    for (idx, domain) in domains.iter().enumerate() {
        let distance = (pos - i64::from(domain.start()))
            .abs()
            .min((pos - i64::from(domain.end())).abs());
        let better = match closest {
            None => true,
            Some((_, best, start)) => distance < best || (distance == best && domain.start() < start),
        };
        if better {
            closest = Some((idx, distance, domain.start()));
        }
    }

    closest.map(|(idx, distance, _)| (idx, distance))
}

/// Index of the domain minimizing `key`, first on ties
fn first_by(domains: &[Domain], key: impl Fn(&Domain) -> Position) -> Option<usize> {
    domains
        .iter()
        .enumerate()
        .min_by_key(|(idx, d)| (key(d), *idx))
        .map(|(idx, _)| idx)
}
