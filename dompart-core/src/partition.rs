//! Domain partitioning
//!
//! Turns a bag of evidence into a non-redundant, position-ordered list of
//! domains:
//!
//! 1. filter: drop malformed items, undecomposable chain BLAST hits and,
//!    optionally, evidence failing the per-type quality gate;
//! 2. phase 1: decompose chain BLAST hits onto reference domain boundaries;
//! 3. phases 2 and 3: accept domain BLAST, then HHsearch hits directly;
//! 4. optimize boundaries and renumber `d1..dN` by start position.
//!
//! Every candidate must pass the same admission control: mostly new
//! residues, almost no residues already claimed, and at least
//! `min_domain_size` residues long.

use crate::decompose::{DecomposeParams, Decomposer};
use crate::domain::Domain;
use crate::evidence::{sort_by_priority, Evidence, EvidenceType};
use crate::gap::{DEFAULT_MIN_DOMAIN_SIZE, DEFAULT_NEIGHBOR_TOLERANCE};
use crate::layout::{CoverageStats, DomainLayout, LayoutError};
use crate::optimizer::{BoundaryOptimizer, BoundaryResolver, OptimizationStats, OptimizerParams};
use crate::quality::QualityThresholds;
use crate::range::Position;
use crate::reference::ReferenceDefinitions;
use serde::Serialize;
use std::collections::BTreeSet;
use thiserror::Error;

/// Errors that can occur during partitioning
#[derive(Debug, Error)]
pub enum PartitionError {
    #[error("Boundary optimization failed: {0}")]
    Layout(#[from] LayoutError),
}

pub type PartitionResult<T> = Result<T, PartitionError>;

/// Parameters for partitioning
#[derive(Debug, Clone, Serialize)]
pub struct PartitionParams {
    /// Minimum evidence length, and the small/large gap boundary
    pub min_domain_size: usize,
    /// Fraction of a candidate that must be unclaimed (exclusive)
    pub new_coverage_threshold: f64,
    /// Fraction of a candidate that may already be claimed (exclusive)
    pub old_coverage_threshold: f64,
    pub neighbor_tolerance: u32,
    pub max_overlap: usize,
    pub min_mapped_positions: usize,
    pub apply_quality_thresholds: bool,
    pub quality: QualityThresholds,
}

impl Default for PartitionParams {
    fn default() -> Self {
        Self {
            min_domain_size: DEFAULT_MIN_DOMAIN_SIZE,
            new_coverage_threshold: 0.7,
            old_coverage_threshold: 0.1,
            neighbor_tolerance: DEFAULT_NEIGHBOR_TOLERANCE,
            max_overlap: 5,
            min_mapped_positions: DecomposeParams::default().min_mapped_positions,
            apply_quality_thresholds: true,
            quality: QualityThresholds::default(),
        }
    }
}

/// Per-phase selection counters
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct PhaseStats {
    pub evaluated: usize,
    pub accepted: usize,
    pub domains_created: usize,
    pub rejected_size: usize,
    pub rejected_coverage: usize,
    pub rejected_decomposition: usize,
}

/// What happened to the evidence on its way through the pipeline
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct PartitionReport {
    pub sequence_length: usize,
    pub input_evidence: usize,
    pub skipped_malformed: usize,
    pub skipped_unsupported_type: usize,
    pub dropped_undecomposable: usize,
    pub rejected_quality: usize,
    pub chain_blast: PhaseStats,
    pub domain_blast: PhaseStats,
    pub hhsearch: PhaseStats,
    pub optimization: OptimizationStats,
    pub coverage: Option<CoverageStats>,
}

/// Final domains plus the report that produced them
#[derive(Debug, Clone)]
pub struct PartitionOutcome {
    pub domains: Vec<Domain>,
    pub report: PartitionReport,
}

/// Claimed and unclaimed residues during selection
struct ResidueTracker {
    sequence_length: usize,
    used: BTreeSet<Position>,
    unused: BTreeSet<Position>,
}

impl ResidueTracker {
    fn new(sequence_length: usize) -> Self {
        Self {
            sequence_length,
            used: BTreeSet::new(),
            unused: (1..=sequence_length as Position).collect(),
        }
    }

    /// (new coverage, used coverage) of a candidate position set
    fn coverage(&self, positions: &BTreeSet<Position>) -> (f64, f64) {
        if positions.is_empty() {
            return (0.0, 0.0);
        }
        let total = positions.len() as f64;
        let new = positions.intersection(&self.unused).count() as f64;
        let used = positions.intersection(&self.used).count() as f64;
        (new / total, used / total)
    }

    fn claim(&mut self, positions: &BTreeSet<Position>) {
        for pos in positions {
            self.unused.remove(pos);
            self.used.insert(*pos);
        }
    }
}

enum Admission {
    Accept,
    TooSmall,
    Coverage { new: f64, used: f64 },
}

pub struct Partitioner {
    params: PartitionParams,
    decomposer: Decomposer,
    optimizer: BoundaryOptimizer,
}

impl Partitioner {
    pub fn new(params: PartitionParams) -> Self {
        let optimizer = BoundaryOptimizer::new(Self::optimizer_params(&params));
        Self::build(params, optimizer)
    }

    /// Use a custom boundary resolver for interstitial gaps.
    pub fn with_resolver(
        params: PartitionParams,
        resolver: Box<dyn BoundaryResolver + Send + Sync>,
    ) -> Self {
        let optimizer = BoundaryOptimizer::with_resolver(Self::optimizer_params(&params), resolver);
        Self::build(params, optimizer)
    }

    fn build(params: PartitionParams, optimizer: BoundaryOptimizer) -> Self {
        let decomposer = Decomposer::new(DecomposeParams {
            min_mapped_positions: params.min_mapped_positions,
        });
        Self {
            params,
            decomposer,
            optimizer,
        }
    }

    fn optimizer_params(params: &PartitionParams) -> OptimizerParams {
        OptimizerParams {
            min_domain_size: params.min_domain_size,
            neighbor_tolerance: params.neighbor_tolerance,
            max_overlap: params.max_overlap,
        }
    }

    pub fn params(&self) -> &PartitionParams {
        &self.params
    }

    /// Partition a chain, returning domains ordered by start position.
    pub fn partition(
        &self,
        evidence: &[Evidence],
        sequence_length: usize,
        references: Option<&ReferenceDefinitions>,
    ) -> PartitionResult<Vec<Domain>> {
        Ok(self
            .partition_with_report(evidence, sequence_length, references)?
            .domains)
    }

    pub fn partition_with_report(
        &self,
        evidence: &[Evidence],
        sequence_length: usize,
        references: Option<&ReferenceDefinitions>,
    ) -> PartitionResult<PartitionOutcome> {
        let (candidates, mut report) = self.select_candidates(evidence, sequence_length, references);

        if candidates.is_empty() {
            log::info!("No domains selected; boundary optimization skipped");
            return Ok(PartitionOutcome {
                domains: Vec::new(),
                report,
            });
        }

        let mut layout = DomainLayout::from_domains(candidates, sequence_length);
        report.optimization = self.optimizer.optimize(&mut layout)?;
        let coverage = layout.coverage_stats();
        log::info!(
            "Final coverage: {}/{} residues ({:.1}%), {} domains, {} gaps",
            coverage.assigned_residues,
            coverage.total_residues,
            coverage.coverage_percent,
            coverage.num_domains,
            coverage.num_gaps
        );
        report.coverage = Some(coverage);

        let mut domains = layout.into_domains();
        domains.sort_by_key(|d| (d.start(), d.end()));
        for (i, domain) in domains.iter_mut().enumerate() {
            domain.id = format!("d{}", i + 1);
        }

        for domain in &domains {
            let issues = domain.provenance_issues();
            if !issues.is_empty() {
                log::warn!("Domain {} provenance issues: {:?}", domain.id, issues);
            }
            log::debug!(
                "{}: {} @ {} (source: {})",
                domain.id,
                domain.family,
                domain.range(),
                domain.source
            );
        }

        Ok(PartitionOutcome { domains, report })
    }

    /// Run filtering and phases 1 to 3 without boundary optimization.
    ///
    /// Candidates are in acceptance order and are named after their reference
    /// domain when the evidence carries one, `d{n}` otherwise.
    pub fn select_candidates(
        &self,
        evidence: &[Evidence],
        sequence_length: usize,
        references: Option<&ReferenceDefinitions>,
    ) -> (Vec<Domain>, PartitionReport) {
        let mut report = PartitionReport {
            sequence_length,
            input_evidence: evidence.len(),
            ..PartitionReport::default()
        };

        if sequence_length == 0 {
            log::warn!("Sequence length is 0; nothing to partition");
            return (Vec::new(), report);
        }
        log::info!(
            "Partitioning {} evidence items for {} residue protein",
            evidence.len(),
            sequence_length
        );

        let [mut chain_blast, mut domain_blast, mut hhsearch] =
            self.filter(evidence, sequence_length, references, &mut report);
        sort_by_priority(&mut chain_blast);
        sort_by_priority(&mut domain_blast);
        sort_by_priority(&mut hhsearch);

        let mut tracker = ResidueTracker::new(sequence_length);
        let mut candidates = Vec::new();

        report.chain_blast =
            self.process_chain_blast(&chain_blast, references, &mut tracker, &mut candidates);
        self.log_phase("Chain BLAST", &report.chain_blast, &tracker, sequence_length);

        report.domain_blast =
            self.process_direct(&domain_blast, references, &mut tracker, &mut candidates);
        self.log_phase("Domain BLAST", &report.domain_blast, &tracker, sequence_length);

        report.hhsearch = self.process_direct(&hhsearch, references, &mut tracker, &mut candidates);
        self.log_phase("HHsearch", &report.hhsearch, &tracker, sequence_length);

        (candidates, report)
    }

    /// Split usable evidence into chain BLAST, domain BLAST and HHsearch lists.
    fn filter(
        &self,
        evidence: &[Evidence],
        sequence_length: usize,
        references: Option<&ReferenceDefinitions>,
        report: &mut PartitionReport,
    ) -> [Vec<Evidence>; 3] {
        let mut lists: [Vec<Evidence>; 3] = Default::default();

        for item in evidence {
            let slot = match item.evidence_type {
                EvidenceType::ChainBlast => 0,
                EvidenceType::DomainBlast => 1,
                EvidenceType::Hhsearch => 2,
                EvidenceType::ChainBlastDecomposed => {
                    log::debug!("Ignoring pre-decomposed evidence from {}", item.source_id);
                    report.skipped_unsupported_type += 1;
                    continue;
                }
            };

            if item.query_range.is_multi_chain() {
                log::warn!(
                    "Skipping {} evidence {}: multi-chain range {}",
                    item.evidence_type,
                    item.source_id,
                    item.query_range
                );
                report.skipped_malformed += 1;
                continue;
            }
            if item.query_range.end_position() as usize > sequence_length {
                log::warn!(
                    "Skipping {} evidence {}: range {} exceeds sequence length {}",
                    item.evidence_type,
                    item.source_id,
                    item.query_range,
                    sequence_length
                );
                report.skipped_malformed += 1;
                continue;
            }

            if item.evidence_type == EvidenceType::ChainBlast {
                let key = item.target_key();
                if !references.is_some_and(|refs| refs.contains(&key)) {
                    log::debug!("Dropping chain BLAST hit {}: no reference domains", key);
                    report.dropped_undecomposable += 1;
                    continue;
                }
            }

            if self.params.apply_quality_thresholds {
                if let Err(reason) = self.params.quality.check(item) {
                    log::debug!(
                        "Rejected {} {}: {}",
                        item.evidence_type,
                        item.domain_id.as_deref().unwrap_or(&item.source_id),
                        reason
                    );
                    report.rejected_quality += 1;
                    continue;
                }
            }

            lists[slot].push(item.clone());
        }

        if report.rejected_quality > 0 {
            log::info!("Quality thresholds rejected {} evidence items", report.rejected_quality);
        }
        lists
    }

    fn admission(&self, positions: &BTreeSet<Position>, tracker: &ResidueTracker) -> Admission {
        if positions.len() < self.params.min_domain_size {
            return Admission::TooSmall;
        }
        let (new, used) = tracker.coverage(positions);
        if new > self.params.new_coverage_threshold && used < self.params.old_coverage_threshold {
            Admission::Accept
        } else {
            Admission::Coverage { new, used }
        }
    }

    fn candidate_id(evidence: &Evidence, candidates: &[Domain]) -> String {
        evidence
            .domain_id
            .clone()
            .unwrap_or_else(|| format!("d{}", candidates.len() + 1))
    }

    /// Admit one evidence item as a domain, claiming its residues.
    fn try_accept(
        &self,
        evidence: &Evidence,
        references: Option<&ReferenceDefinitions>,
        tracker: &mut ResidueTracker,
        candidates: &mut Vec<Domain>,
        stats: &mut PhaseStats,
    ) -> bool {
        let positions = match evidence.positions() {
            Ok(p) if evidence.query_range.end_position() as usize <= tracker.sequence_length => p,
            _ => {
                log::warn!(
                    "Skipping {}: range {} unusable",
                    evidence.source_id,
                    evidence.query_range
                );
                stats.rejected_size += 1;
                return false;
            }
        };

        match self.admission(&positions, tracker) {
            Admission::TooSmall => {
                stats.rejected_size += 1;
                false
            }
            Admission::Coverage { new, used } => {
                log::debug!(
                    "Rejected {} @ {}: {:.1}% new, {:.1}% used",
                    evidence.domain_id.as_deref().unwrap_or(&evidence.source_id),
                    evidence.query_range,
                    new * 100.0,
                    used * 100.0
                );
                stats.rejected_coverage += 1;
                false
            }
            Admission::Accept => {
                let id = Self::candidate_id(evidence, candidates);
                match Domain::from_evidence(id, evidence.clone(), references) {
                    Ok(domain) => {
                        log::debug!(
                            "Selected {}: {} @ {} (confidence {:.3})",
                            domain.id,
                            domain.family,
                            domain.range(),
                            domain.confidence
                        );
                        tracker.claim(&positions);
                        candidates.push(domain);
                        stats.domains_created += 1;
                        true
                    }
                    Err(e) => {
                        log::warn!("Skipping {}: {}", evidence.source_id, e);
                        stats.rejected_size += 1;
                        false
                    }
                }
            }
        }
    }

    fn process_chain_blast(
        &self,
        evidence: &[Evidence],
        references: Option<&ReferenceDefinitions>,
        tracker: &mut ResidueTracker,
        candidates: &mut Vec<Domain>,
    ) -> PhaseStats {
        let mut stats = PhaseStats::default();

        for item in evidence {
            stats.evaluated += 1;

            let Ok(positions) = item.positions() else {
                stats.rejected_size += 1;
                continue;
            };
            match self.admission(&positions, tracker) {
                Admission::Accept => {}
                Admission::TooSmall => {
                    stats.rejected_size += 1;
                    continue;
                }
                Admission::Coverage { .. } => {
                    stats.rejected_coverage += 1;
                    continue;
                }
            }

            let Some(refs) = references else {
                stats.rejected_decomposition += 1;
                continue;
            };
            let parts = match self.decomposer.decompose(item, refs) {
                Ok(parts) => parts,
                Err(e) => {
                    log::debug!("Rejected chain BLAST {}: {}", item.target_key(), e);
                    stats.rejected_decomposition += 1;
                    continue;
                }
            };

            let mut sub_stats = PhaseStats::default();
            let accepted = parts
                .iter()
                .filter(|part| self.try_accept(part, references, tracker, candidates, &mut sub_stats))
                .count();
            stats.domains_created += sub_stats.domains_created;

            if accepted > 0 {
                stats.accepted += 1;
            } else {
                log::debug!("Rejected chain BLAST {}: no sub-domain admitted", item.target_key());
                stats.rejected_coverage += 1;
            }
        }

        stats
    }

    fn process_direct(
        &self,
        evidence: &[Evidence],
        references: Option<&ReferenceDefinitions>,
        tracker: &mut ResidueTracker,
        candidates: &mut Vec<Domain>,
    ) -> PhaseStats {
        let mut stats = PhaseStats::default();

        for item in evidence {
            if tracker.unused.len() < self.params.min_domain_size {
                break;
            }
            stats.evaluated += 1;
            if self.try_accept(item, references, tracker, candidates, &mut stats) {
                stats.accepted += 1;
            }
        }

        stats
    }

    fn log_phase(&self, name: &str, stats: &PhaseStats, tracker: &ResidueTracker, sequence_length: usize) {
        log::info!(
            "{}: {} of {} accepted, {} domains, coverage {}/{} ({:.1}%)",
            name,
            stats.accepted,
            stats.evaluated,
            stats.domains_created,
            tracker.used.len(),
            sequence_length,
            tracker.used.len() as f64 / sequence_length as f64 * 100.0
        );
    }
}

impl Default for Partitioner {
    fn default() -> Self {
        Self::new(PartitionParams::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::evidence::AlignmentData;
    use crate::range::SequenceRange;
    use crate::reference::ReferenceDomain;

    fn hit(kind: EvidenceType, source: &str, range: &str, conf: f64) -> Evidence {
        Evidence::new(kind, source, SequenceRange::parse(range).unwrap(), conf)
    }

    fn lenient() -> PartitionParams {
        PartitionParams {
            apply_quality_thresholds: false,
            ..PartitionParams::default()
        }
    }

    #[test]
    fn test_empty_inputs() {
        let partitioner = Partitioner::default();
        assert!(partitioner.partition(&[], 100, None).unwrap().is_empty());

        let evidence = vec![hit(EvidenceType::DomainBlast, "1abc", "1-50", 0.9)];
        assert!(partitioner.partition(&evidence, 0, None).unwrap().is_empty());
    }

    #[test]
    fn test_admission_thresholds_are_exclusive() {
        let partitioner = Partitioner::new(lenient());
        let mut tracker = ResidueTracker::new(100);
        tracker.claim(&(1..=10).collect());

        // 10 of 100 positions already used: used coverage 0.1 is not < 0.1
        let positions: BTreeSet<Position> = (1..=100).collect();
        assert!(matches!(
            partitioner.admission(&positions, &tracker),
            Admission::Coverage { .. }
        ));

        let positions: BTreeSet<Position> = (10..=100).collect();
        assert!(matches!(partitioner.admission(&positions, &tracker), Admission::Accept));

        let positions: BTreeSet<Position> = (50..=73).collect();
        assert!(matches!(partitioner.admission(&positions, &tracker), Admission::TooSmall));
    }

    #[test]
    fn test_quality_gate_applied() {
        let mut good = hit(EvidenceType::DomainBlast, "1abc", "1-100", 0.9);
        good.hit_range = Some(SequenceRange::parse("1-100").unwrap());
        good.reference_length = Some(100);
        let bare = hit(EvidenceType::DomainBlast, "2abc", "101-200", 0.9);

        let (candidates, report) =
            Partitioner::default().select_candidates(&[good, bare], 200, None);
        assert_eq!(candidates.len(), 1);
        assert_eq!(report.rejected_quality, 1);
    }

    #[test]
    fn test_chain_blast_without_references_dropped() {
        let evidence = vec![hit(EvidenceType::ChainBlast, "1abc", "1-100", 0.9)];
        let (candidates, report) = Partitioner::new(lenient()).select_candidates(&evidence, 100, None);
        assert!(candidates.is_empty());
        assert_eq!(report.dropped_undecomposable, 1);
    }

    #[test]
    fn test_out_of_bounds_and_multichain_skipped() {
        let evidence = vec![
            hit(EvidenceType::DomainBlast, "1abc", "1-120", 0.9),
            hit(EvidenceType::DomainBlast, "2abc", "A:1-30,B:31-60", 0.9),
            hit(EvidenceType::ChainBlastDecomposed, "3abc", "1-50", 0.9),
        ];
        let (candidates, report) = Partitioner::new(lenient()).select_candidates(&evidence, 100, None);
        assert!(candidates.is_empty());
        assert_eq!(report.skipped_malformed, 2);
        assert_eq!(report.skipped_unsupported_type, 1);
    }

    #[test]
    fn test_nested_segments_checked_against_length() {
        let past_end = vec![hit(EvidenceType::DomainBlast, "1abc", "1-400,5-10", 0.9)];
        let (candidates, report) = Partitioner::new(lenient()).select_candidates(&past_end, 300, None);
        assert!(candidates.is_empty());
        assert_eq!(report.skipped_malformed, 1);

        let inside = vec![hit(EvidenceType::DomainBlast, "1abc", "1-300,5-10", 0.9)];
        let domains = Partitioner::new(lenient()).partition(&inside, 300, None).unwrap();
        assert_eq!(domains.len(), 1);
        assert_eq!(domains[0].range().to_string(), "1-300");
        assert!(DomainLayout::from_domains(domains, 300).check_invariants().is_empty());
    }

    #[test]
    fn test_domain_blast_before_hhsearch() {
        let evidence = vec![
            hit(EvidenceType::Hhsearch, "hh", "1-100", 0.95),
            hit(EvidenceType::DomainBlast, "db", "1-100", 0.6),
        ];
        let (candidates, report) = Partitioner::new(lenient()).select_candidates(&evidence, 100, None);
        assert_eq!(candidates.len(), 1);
        assert_eq!(candidates[0].source, EvidenceType::DomainBlast);
        // Fewer than 25 residues left, so HHsearch is never evaluated
        assert_eq!(report.hhsearch.evaluated, 0);
    }

    #[test]
    fn test_single_reference_partial_decomposition_accepted() {
        let refs: ReferenceDefinitions = vec![ReferenceDomain {
            domain_id: "e5xyzA1".to_string(),
            source_id: "5xyz".to_string(),
            chain: "A".to_string(),
            range: SequenceRange::parse("1-100").unwrap(),
            length: 100,
            t_group: None,
            h_group: None,
        }]
        .into_iter()
        .collect();

        let seq = "A".repeat(60);
        let mut chain = hit(EvidenceType::ChainBlast, "5xyz", "1-60", 0.9);
        chain.source_chain = Some("A".to_string());
        chain.alignment = Some(AlignmentData {
            query_seq: seq.clone(),
            hit_seq: seq,
            query_start: 1,
            query_end: 60,
            hit_start: 1,
            hit_end: 60,
        });

        let (candidates, report) =
            Partitioner::new(lenient()).select_candidates(&[chain], 60, Some(&refs));
        assert_eq!(candidates.len(), 1);
        assert_eq!(candidates[0].id, "e5xyzA1");
        assert!((candidates[0].confidence - 0.54).abs() < 1e-9);
        assert_eq!(report.chain_blast.accepted, 1);
    }
}
