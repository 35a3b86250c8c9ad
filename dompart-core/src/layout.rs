//! Domain layout for one protein chain
//!
//! The layout exclusively owns its domains and keeps the used/unused
//! position sets in step with them: after every mutation `used` is the union
//! of all domain positions and `used ∪ unused = {1..sequence_length}`.

use crate::domain::{AssessmentLevel, Domain};
use crate::gap::{
    discover_gaps, GapSummary, UnassignedSegment, DEFAULT_MIN_DOMAIN_SIZE,
    DEFAULT_NEIGHBOR_TOLERANCE,
};
use crate::range::{Position, RangeError};
use serde::Serialize;
use std::collections::BTreeSet;
use thiserror::Error;

/// Errors that can occur when mutating a layout
#[derive(Debug, Clone, PartialEq, Error)]
pub enum LayoutError {
    #[error("No domain at index {0}")]
    DomainIndex(usize),

    #[error("Range error: {0}")]
    Range(#[from] RangeError),
}

pub type LayoutResult<T> = Result<T, LayoutError>;

/// Residue coverage of a layout
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CoverageStats {
    pub total_residues: usize,
    pub assigned_residues: usize,
    pub unassigned_residues: usize,
    pub coverage_percent: f64,
    pub num_domains: usize,
    pub num_gaps: usize,
    pub small_fragments: usize,
    pub large_gaps: usize,
}

/// Distribution of per-domain quality verdicts
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct QualitySummary {
    pub total_domains: usize,
    pub good: usize,
    pub questionable: usize,
    pub poor: usize,
}

#[derive(Debug, Clone)]
pub struct DomainLayout {
    sequence_length: usize,
    domains: Vec<Domain>,
    unassigned: Vec<UnassignedSegment>,
    used: BTreeSet<Position>,
    unused: BTreeSet<Position>,
    min_domain_size: usize,
    neighbor_tolerance: u32,
}

impl DomainLayout {
    /// Build a layout and run an initial gap analysis with default settings.
    pub fn from_domains(domains: Vec<Domain>, sequence_length: usize) -> Self {
        let mut layout = Self {
            sequence_length,
            domains,
            unassigned: Vec::new(),
            used: BTreeSet::new(),
            unused: BTreeSet::new(),
            min_domain_size: DEFAULT_MIN_DOMAIN_SIZE,
            neighbor_tolerance: DEFAULT_NEIGHBOR_TOLERANCE,
        };
        layout.analyze_gaps(DEFAULT_MIN_DOMAIN_SIZE, DEFAULT_NEIGHBOR_TOLERANCE);
        layout
    }

    pub fn sequence_length(&self) -> usize {
        self.sequence_length
    }

    pub fn domains(&self) -> &[Domain] {
        &self.domains
    }

    pub fn domain(&self, idx: usize) -> LayoutResult<&Domain> {
        self.domains.get(idx).ok_or(LayoutError::DomainIndex(idx))
    }

    pub fn unassigned_segments(&self) -> &[UnassignedSegment] {
        &self.unassigned
    }

    pub fn used_positions(&self) -> &BTreeSet<Position> {
        &self.used
    }

    pub fn unused_positions(&self) -> &BTreeSet<Position> {
        &self.unused
    }

    pub fn into_domains(self) -> Vec<Domain> {
        self.domains
    }

    fn refresh_positions(&mut self) {
        self.used = self
            .domains
            .iter()
            .flat_map(|d| d.positions().iter().copied())
            .collect();
        self.unused = (1..=self.sequence_length as Position)
            .filter(|p| !self.used.contains(p))
            .collect();
    }

    /// Recompute position tracking and the classified gap list.
    pub fn analyze_gaps(&mut self, min_domain_size: usize, neighbor_tolerance: u32) {
        self.min_domain_size = min_domain_size;
        self.neighbor_tolerance = neighbor_tolerance;
        self.refresh_positions();
        self.unassigned = discover_gaps(
            &self.unused,
            &self.domains,
            min_domain_size,
            neighbor_tolerance,
        );
    }

    fn reanalyze(&mut self) {
        self.analyze_gaps(self.min_domain_size, self.neighbor_tolerance);
    }

    pub fn add_domain(&mut self, domain: Domain) {
        self.domains.push(domain);
        self.reanalyze();
    }

    pub fn remove_domain(&mut self, idx: usize) -> LayoutResult<Domain> {
        if idx >= self.domains.len() {
            return Err(LayoutError::DomainIndex(idx));
        }
        let removed = self.domains.remove(idx);
        self.reanalyze();
        Ok(removed)
    }

    fn domain_mut(&mut self, idx: usize) -> LayoutResult<&mut Domain> {
        self.domains.get_mut(idx).ok_or(LayoutError::DomainIndex(idx))
    }

    pub fn record_action(&mut self, domain_idx: usize, action: &str, details: &str) -> LayoutResult<()> {
        self.domain_mut(domain_idx)?.record_action(action, details);
        Ok(())
    }

    fn drop_segment(&mut self, segment: &UnassignedSegment) {
        self.unassigned
            .retain(|s| !(s.start == segment.start && s.end == segment.end));
    }

    /// Give a whole gap segment to one domain.
    pub fn merge_segment_with_domain(
        &mut self,
        segment: &UnassignedSegment,
        domain_idx: usize,
    ) -> LayoutResult<()> {
        let domain = self.domain_mut(domain_idx)?;
        domain.record_action(
            "merge_segment",
            &format!("{}_{}", segment.segment_type.as_str(), segment.span_label()),
        );
        domain.add_positions(&segment.positions)?;

        self.refresh_positions();
        self.drop_segment(segment);
        Ok(())
    }

    /// Divide a gap segment between two domains.
    pub fn split_segment_between_domains(
        &mut self,
        segment: &UnassignedSegment,
        first_idx: usize,
        second_idx: usize,
        split: (BTreeSet<Position>, BTreeSet<Position>),
    ) -> LayoutResult<()> {
        let (to_first, to_second) = split;
        self.domain(second_idx)?;

        for (idx, positions) in [(first_idx, &to_first), (second_idx, &to_second)] {
            if positions.is_empty() {
                continue;
            }
            let domain = self.domain_mut(idx)?;
            domain.record_action(
                "split_merge",
                &format!("gained_{}_from_{}", positions.len(), segment.span_label()),
            );
            domain.add_positions(positions)?;
        }

        self.refresh_positions();
        self.drop_segment(segment);
        Ok(())
    }

    /// Index pairs `(i, j)`, `i < j`, of domains within `tolerance` residues.
    pub fn overlapping_pairs(&self, tolerance: u32) -> Vec<(usize, usize)> {
        let mut pairs = Vec::new();
        for (i, a) in self.domains.iter().enumerate() {
            for (j, b) in self.domains.iter().enumerate().skip(i + 1) {
                if a.overlaps_with(b, tolerance) {
                    pairs.push((i, j));
                }
            }
        }
        pairs
    }

    /// Trim overlaps of at most `max_overlap` residues from the weaker domain.
    ///
    /// Lower confidence loses; on equal confidence the smaller domain loses,
    /// then the domain whose id sorts later, then the later one in the list.
    /// A domain that would be trimmed to nothing is removed instead; its
    /// residues all remain with the winner. Returns the number of overlaps
    /// resolved.
    pub fn resolve_small_overlaps(&mut self, max_overlap: usize) -> LayoutResult<usize> {
        let pairs = self.overlapping_pairs(0);
        let mut emptied: BTreeSet<usize> = BTreeSet::new();
        let mut resolved = 0;

        for (i, j) in pairs {
            if emptied.contains(&i) || emptied.contains(&j) {
                continue;
            }

            let (a, b) = (&self.domains[i], &self.domains[j]);
            let overlap: BTreeSet<Position> =
                a.positions().intersection(b.positions()).copied().collect();
            if overlap.is_empty() || overlap.len() > max_overlap {
                continue;
            }

            let (winner, loser, by_size) = if a.confidence > b.confidence {
                (i, j, false)
            } else if b.confidence > a.confidence {
                (j, i, false)
            } else if a.size() != b.size() {
                if a.size() > b.size() {
                    (i, j, true)
                } else {
                    (j, i, true)
                }
            } else if b.id < a.id {
                (j, i, false)
            } else {
                (i, j, false)
            };

            let winner_id = self.domains[winner].id.clone();
            let details = if by_size {
                format!("lost_{}_to_larger_{}", overlap.len(), winner_id)
            } else {
                format!("lost_{}_to_{}", overlap.len(), winner_id)
            };

            let loser_domain = &mut self.domains[loser];
            match loser_domain.remove_positions(&overlap) {
                Ok(_) => {
                    log::debug!("Trimmed {} residues from {} ({})", overlap.len(), loser_domain.id, details);
                    loser_domain.record_action("overlap_trim", &details);
                }
                Err(RangeError::Empty) => {
                    log::warn!(
                        "Domain {} lies entirely within {}; removing it",
                        loser_domain.id,
                        winner_id
                    );
                    emptied.insert(loser);
                }
                Err(e) => return Err(e.into()),
            }
            resolved += 1;
        }

        for idx in emptied.into_iter().rev() {
            self.domains.remove(idx);
        }
        if resolved > 0 {
            self.reanalyze();
        }
        Ok(resolved)
    }

    pub fn gap_summary(&self) -> GapSummary {
        GapSummary::from_segments(&self.unassigned, self.sequence_length)
    }

    pub fn coverage_stats(&self) -> CoverageStats {
        let small_fragments = self.unassigned.iter().filter(|s| s.is_small()).count();
        CoverageStats {
            total_residues: self.sequence_length,
            assigned_residues: self.used.len(),
            unassigned_residues: self.unused.len(),
            coverage_percent: if self.sequence_length > 0 {
                self.used.len() as f64 / self.sequence_length as f64 * 100.0
            } else {
                0.0
            },
            num_domains: self.domains.len(),
            num_gaps: self.unassigned.len(),
            small_fragments,
            large_gaps: self.unassigned.len() - small_fragments,
        }
    }

    pub fn quality_summary(&self) -> QualitySummary {
        let mut summary = QualitySummary {
            total_domains: self.domains.len(),
            ..QualitySummary::default()
        };
        for domain in &self.domains {
            match domain.quality_assessment().overall {
                AssessmentLevel::Good => summary.good += 1,
                AssessmentLevel::Questionable => summary.questionable += 1,
                AssessmentLevel::Poor => summary.poor += 1,
            }
        }
        summary
    }

    /// Violations of the position-tracking invariants; empty when consistent.
    pub fn check_invariants(&self) -> Vec<String> {
        let mut issues = Vec::new();

        let union: BTreeSet<Position> = self
            .domains
            .iter()
            .flat_map(|d| d.positions().iter().copied())
            .collect();
        if union != self.used {
            issues.push("Used positions differ from the union of domain positions".to_string());
        }
        if self.used.intersection(&self.unused).next().is_some() {
            issues.push("Used and unused positions intersect".to_string());
        }
        let all: BTreeSet<Position> = self.used.union(&self.unused).copied().collect();
        let expected: BTreeSet<Position> = (1..=self.sequence_length as Position).collect();
        if all != expected {
            issues.push(format!(
                "Used and unused positions do not cover 1..{}",
                self.sequence_length
            ));
        }
        for domain in &self.domains {
            if domain.size() != domain.range().total_length() {
                issues.push(format!("Domain {} range disagrees with its positions", domain.id));
            }
        }

        issues
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::evidence::{Evidence, EvidenceType};
    use crate::gap::SegmentType;
    use crate::range::SequenceRange;

    fn domain(id: &str, range: &str, conf: f64) -> Domain {
        let ev = Evidence::new(
            EvidenceType::DomainBlast,
            "1abc",
            SequenceRange::parse(range).unwrap(),
            conf,
        );
        Domain::from_evidence(id, ev, None).unwrap()
    }

    #[test]
    fn test_position_tracking() {
        let layout = DomainLayout::from_domains(vec![domain("d1", "1-100", 0.9)], 150);
        assert_eq!(layout.used_positions().len(), 100);
        assert_eq!(layout.unused_positions().len(), 50);
        assert_eq!(layout.unassigned_segments().len(), 1);
        assert!(layout.check_invariants().is_empty());
    }

    #[test]
    fn test_empty_layout() {
        let layout = DomainLayout::from_domains(Vec::new(), 0);
        assert!(layout.unassigned_segments().is_empty());
        assert_eq!(layout.coverage_stats().coverage_percent, 0.0);
        assert!(layout.check_invariants().is_empty());
    }

    #[test]
    fn test_merge_segment_records_provenance() {
        let mut layout = DomainLayout::from_domains(vec![domain("d1", "11-100", 0.9)], 100);
        let segment = layout.unassigned_segments()[0].clone();
        assert_eq!(segment.segment_type, SegmentType::Nterm);

        layout.merge_segment_with_domain(&segment, 0).unwrap();
        assert_eq!(layout.domains()[0].range().to_string(), "1-100");
        assert_eq!(layout.domains()[0].optimization_actions(), ["merge_segment:nterm_1-10"]);
        assert!(layout.unassigned_segments().is_empty());
        assert!(layout.unused_positions().is_empty());
        assert!(layout.check_invariants().is_empty());
    }

    #[test]
    fn test_split_segment() {
        let mut layout = DomainLayout::from_domains(
            vec![domain("d1", "1-50", 0.9), domain("d2", "54-100", 0.9)],
            100,
        );
        let segment = layout.unassigned_segments()[0].clone();
        let split = ([51, 52].into_iter().collect(), [53].into_iter().collect());
        layout.split_segment_between_domains(&segment, 0, 1, split).unwrap();

        assert_eq!(layout.domains()[0].range().to_string(), "1-52");
        assert_eq!(layout.domains()[1].range().to_string(), "53-100");
        assert_eq!(layout.domains()[0].optimization_actions(), ["split_merge:gained_2_from_51-53"]);
        assert!(layout.check_invariants().is_empty());
    }

    #[test]
    fn test_bad_index() {
        let mut layout = DomainLayout::from_domains(vec![domain("d1", "11-100", 0.9)], 100);
        let segment = layout.unassigned_segments()[0].clone();
        assert_eq!(
            layout.merge_segment_with_domain(&segment, 3),
            Err(LayoutError::DomainIndex(3))
        );
        assert!(layout.remove_domain(1).is_err());
    }

    #[test]
    fn test_overlap_lower_confidence_loses() {
        let mut layout = DomainLayout::from_domains(
            vec![domain("d1", "1-53", 0.8), domain("d2", "50-100", 0.9)],
            100,
        );
        assert_eq!(layout.resolve_small_overlaps(5).unwrap(), 1);
        assert_eq!(layout.domains()[0].range().to_string(), "1-49");
        assert_eq!(layout.domains()[0].optimization_actions(), ["overlap_trim:lost_4_to_d2"]);
        assert_eq!(layout.used_positions().len(), 100);
        assert!(layout.check_invariants().is_empty());
    }

    #[test]
    fn test_overlap_tie_smaller_loses() {
        let mut layout = DomainLayout::from_domains(
            vec![domain("d1", "1-53", 0.9), domain("d2", "50-70", 0.9)],
            100,
        );
        layout.resolve_small_overlaps(5).unwrap();
        assert_eq!(layout.domains()[1].range().to_string(), "54-70");
        assert_eq!(
            layout.domains()[1].optimization_actions(),
            ["overlap_trim:lost_4_to_larger_d1"]
        );
    }

    #[test]
    fn test_overlap_full_tie_uses_id() {
        let mut layout = DomainLayout::from_domains(
            vec![domain("d9", "1-52", 0.9), domain("d2", "50-101", 0.9)],
            110,
        );
        layout.resolve_small_overlaps(5).unwrap();
        assert_eq!(layout.domains()[0].range().to_string(), "1-49");
        assert_eq!(layout.domains()[1].range().to_string(), "50-101");
    }

    #[test]
    fn test_large_overlap_untouched() {
        let mut layout = DomainLayout::from_domains(
            vec![domain("d1", "1-60", 0.8), domain("d2", "50-100", 0.9)],
            100,
        );
        assert_eq!(layout.resolve_small_overlaps(5).unwrap(), 0);
        assert_eq!(layout.domains()[0].range().to_string(), "1-60");
    }

    #[test]
    fn test_contained_domain_removed() {
        let mut layout = DomainLayout::from_domains(
            vec![domain("d1", "1-100", 0.9), domain("d2", "40-43", 0.5)],
            100,
        );
        assert_eq!(layout.resolve_small_overlaps(5).unwrap(), 1);
        assert_eq!(layout.domains().len(), 1);
        assert_eq!(layout.used_positions().len(), 100);
    }

    #[test]
    fn test_quality_summary() {
        let layout = DomainLayout::from_domains(
            vec![domain("d1", "1-50", 0.9), domain("d2", "51-100", 0.3)],
            100,
        );
        let summary = layout.quality_summary();
        assert_eq!(summary.total_domains, 2);
        assert_eq!(summary.good, 1);
        assert_eq!(summary.questionable, 1);
    }
}
