//! Alignment-based chain BLAST decomposition
//!
//! A chain BLAST hit aligns the query against a whole reference chain. When
//! the domain boundaries of that chain are known, the alignment is used to
//! project each reference domain onto the query, yielding one
//! `chain_blast_decomposed` evidence item per reference domain.

use crate::evidence::{AlignmentData, Evidence, EvidenceType};
use crate::range::{Position, RangeError, SequenceRange};
use crate::reference::{ReferenceDefinitions, ReferenceDomain};
use std::collections::BTreeMap;
use thiserror::Error;

const GAP: char = '-';

/// Errors that can occur during decomposition
#[derive(Debug, Clone, PartialEq, Error)]
pub enum DecomposeError {
    #[error("Evidence has no alignment data")]
    MissingAlignment,

    #[error("Alignment strings have different lengths: {query} vs {hit}")]
    AlignmentLengthMismatch { query: usize, hit: usize },

    #[error("No reference domains for {source_id}_{chain}")]
    NoReferenceDomains { source_id: String, chain: String },

    #[error("No reference domain mapped onto the query")]
    NoDomainsMapped,

    #[error("Only {mapped} of {references} reference domains mapped")]
    PartialDecomposition { mapped: usize, references: usize },

    #[error("Range error: {0}")]
    Range(#[from] RangeError),
}

pub type DecomposeResult<T> = Result<T, DecomposeError>;

/// Parameters for decomposition
#[derive(Debug, Clone)]
pub struct DecomposeParams {
    /// Reference domains mapping fewer query positions are discarded
    pub min_mapped_positions: usize,
}

impl Default for DecomposeParams {
    fn default() -> Self {
        Self {
            min_mapped_positions: 20,
        }
    }
}

/// Map each aligned query position to its hit position (both 1-based).
///
/// Only columns where neither side is a gap produce a pair.
pub fn alignment_mapping(alignment: &AlignmentData) -> DecomposeResult<BTreeMap<Position, Position>> {
    let query: Vec<char> = alignment.query_seq.chars().collect();
    let hit: Vec<char> = alignment.hit_seq.chars().collect();
    if query.len() != hit.len() {
        return Err(DecomposeError::AlignmentLengthMismatch {
            query: query.len(),
            hit: hit.len(),
        });
    }

    let mut mapping = BTreeMap::new();
    let mut query_pos = alignment.query_start;
    let mut hit_pos = alignment.hit_start;

    for (q, h) in query.into_iter().zip(hit) {
        if q != GAP && h != GAP {
            mapping.insert(query_pos, hit_pos);
        }
        if q != GAP {
            query_pos += 1;
        }
        if h != GAP {
            hit_pos += 1;
        }
    }

    Ok(mapping)
}

/// Projects chain-level hits onto reference domain boundaries
pub struct Decomposer {
    params: DecomposeParams,
}

impl Decomposer {
    pub fn new(params: DecomposeParams) -> Self {
        Self { params }
    }

    /// Decompose a chain BLAST hit into per-domain sub-evidence.
    ///
    /// Succeeds when more than one reference domain maps, or when the only
    /// reference domain of a single-domain target maps.
    pub fn decompose(
        &self,
        evidence: &Evidence,
        references: &ReferenceDefinitions,
    ) -> DecomposeResult<Vec<Evidence>> {
        let alignment = evidence
            .alignment
            .as_ref()
            .ok_or(DecomposeError::MissingAlignment)?;

        let key = evidence.target_key();
        let domains = references
            .get(&key)
            .filter(|d| !d.is_empty())
            .ok_or_else(|| DecomposeError::NoReferenceDomains {
                source_id: key.source_id.clone(),
                chain: key.chain.clone(),
            })?;

        let query_to_hit = alignment_mapping(alignment)?;
        let hit_to_query: BTreeMap<Position, Position> =
            query_to_hit.into_iter().map(|(q, h)| (h, q)).collect();

        let mut decomposed = Vec::new();
        for reference in domains {
            if let Some(sub) = self.project(evidence, reference, &hit_to_query)? {
                decomposed.push(sub);
            }
        }

        match (decomposed.len(), domains.len()) {
            (0, _) => Err(DecomposeError::NoDomainsMapped),
            (1, references) if references > 1 => Err(DecomposeError::PartialDecomposition {
                mapped: 1,
                references,
            }),
            _ => Ok(decomposed),
        }
    }

    fn project(
        &self,
        evidence: &Evidence,
        reference: &ReferenceDomain,
        hit_to_query: &BTreeMap<Position, Position>,
    ) -> DecomposeResult<Option<Evidence>> {
        if reference.length == 0 {
            log::warn!(
                "Skipping reference {}: invalid length {}",
                reference.domain_id,
                reference.length
            );
            return Ok(None);
        }

        let mut hit_positions = Vec::new();
        let mut query_positions = Vec::new();
        for (ref_pos, _) in reference.range.to_positions() {
            if let Some(&query_pos) = hit_to_query.get(&ref_pos) {
                hit_positions.push(ref_pos);
                query_positions.push(query_pos);
            }
        }

        if query_positions.len() < self.params.min_mapped_positions {
            log::debug!(
                "Skipping {}: only {} positions mapped",
                reference.domain_id,
                query_positions.len()
            );
            return Ok(None);
        }

        let coverage = query_positions.len() as f64 / reference.length as f64;
        let query_range = SequenceRange::from_positions(query_positions, None)?;
        let hit_range = SequenceRange::from_positions(hit_positions, None)?;

        log::debug!(
            "Decomposed {} to {}: {} (coverage={:.1}%)",
            evidence.source_id,
            reference.domain_id,
            query_range,
            coverage * 100.0
        );

        let mut sub = Evidence::new(
            EvidenceType::ChainBlastDecomposed,
            evidence.source_id.clone(),
            query_range,
            evidence.confidence * coverage,
        );
        sub.source_chain = evidence.source_chain.clone();
        sub.domain_id = Some(reference.domain_id.clone());
        sub.evalue = evidence.evalue;
        sub.hit_range = Some(hit_range);
        sub.hsp_count = evidence.hsp_count;
        sub.discontinuous = sub.query_range.is_discontinuous();
        sub.reference_length = Some(reference.length);
        sub.alignment_coverage = Some(coverage);
        sub.t_group = reference.t_group.clone();
        sub.h_group = reference.h_group.clone();

        Ok(Some(sub))
    }
}

impl Default for Decomposer {
    fn default() -> Self {
        Self::new(DecomposeParams::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn alignment(query: &str, hit: &str, query_start: Position, hit_start: Position) -> AlignmentData {
        AlignmentData {
            query_seq: query.to_string(),
            hit_seq: hit.to_string(),
            query_start,
            query_end: query_start + query.chars().filter(|c| *c != GAP).count() as Position - 1,
            hit_start,
            hit_end: hit_start + hit.chars().filter(|c| *c != GAP).count() as Position - 1,
        }
    }

    fn reference(domain_id: &str, range: &str, length: u32) -> ReferenceDomain {
        ReferenceDomain {
            domain_id: domain_id.to_string(),
            source_id: "2abc".to_string(),
            chain: "A".to_string(),
            range: SequenceRange::parse(range).unwrap(),
            length,
            t_group: Some("1.1.1".to_string()),
            h_group: Some("1.1".to_string()),
        }
    }

    fn chain_hit(len: usize) -> Evidence {
        let mut ev = Evidence::new(
            EvidenceType::ChainBlast,
            "2abc",
            SequenceRange::parse(&format!("1-{}", len)).unwrap(),
            0.9,
        );
        ev.source_chain = Some("A".to_string());
        let seq = "M".repeat(len);
        ev.alignment = Some(alignment(&seq, &seq, 1, 1));
        ev
    }

    #[test]
    fn test_mapping_skips_gap_columns() {
        let aln = alignment("AC-GT", "A-TGT", 10, 100);
        let mapping = alignment_mapping(&aln).unwrap();
        let pairs: Vec<(Position, Position)> = mapping.into_iter().collect();
        // A/A, G/G, T/T aligned; C and T face gaps
        assert_eq!(pairs, vec![(10, 100), (12, 102), (13, 103)]);
    }

    #[test]
    fn test_mapping_length_mismatch() {
        let aln = alignment("ACGT", "ACG", 1, 1);
        assert_eq!(
            alignment_mapping(&aln),
            Err(DecomposeError::AlignmentLengthMismatch { query: 4, hit: 3 })
        );
    }

    #[test]
    fn test_two_domain_decomposition() {
        let refs: ReferenceDefinitions = vec![
            reference("e2abcA1", "1-100", 100),
            reference("e2abcA2", "101-200", 100),
        ]
        .into_iter()
        .collect();

        let subs = Decomposer::default().decompose(&chain_hit(200), &refs).unwrap();
        assert_eq!(subs.len(), 2);
        assert_eq!(subs[0].domain_id.as_deref(), Some("e2abcA1"));
        assert_eq!(subs[0].query_range.to_string(), "1-100");
        assert_eq!(subs[1].query_range.to_string(), "101-200");
        assert_eq!(subs[1].evidence_type, EvidenceType::ChainBlastDecomposed);
        assert!((subs[0].confidence - 0.9).abs() < 1e-9);
        assert_eq!(subs[0].t_group.as_deref(), Some("1.1.1"));
    }

    #[test]
    fn test_partial_coverage_scales_confidence() {
        // Reference domain of 100 residues, alignment reaches only 60 of them
        let refs: ReferenceDefinitions =
            vec![reference("e2abcA1", "1-100", 100)].into_iter().collect();
        let subs = Decomposer::default().decompose(&chain_hit(60), &refs).unwrap();
        assert_eq!(subs.len(), 1);
        assert!((subs[0].confidence - 0.9 * 0.6).abs() < 1e-9);
        assert_eq!(subs[0].alignment_coverage, Some(0.6));
    }

    #[test]
    fn test_single_mapped_of_many_fails() {
        let refs: ReferenceDefinitions = vec![
            reference("e2abcA1", "1-100", 100),
            reference("e2abcA2", "101-200", 100),
        ]
        .into_iter()
        .collect();
        assert_eq!(
            Decomposer::default().decompose(&chain_hit(110), &refs),
            Err(DecomposeError::PartialDecomposition {
                mapped: 1,
                references: 2
            })
        );
    }

    #[test]
    fn test_failures() {
        let refs = ReferenceDefinitions::new();
        let mut hit = chain_hit(100);
        let err = Decomposer::default().decompose(&hit, &refs).unwrap_err();
        assert!(matches!(err, DecomposeError::NoReferenceDomains { ref source_id, .. } if source_id == "2abc"));
        assert_eq!(err.to_string(), "No reference domains for 2abc_A");

        let refs: ReferenceDefinitions =
            vec![reference("e2abcA1", "150-200", 51)].into_iter().collect();
        assert_eq!(
            Decomposer::default().decompose(&hit, &refs),
            Err(DecomposeError::NoDomainsMapped)
        );

        hit.alignment = None;
        assert_eq!(
            Decomposer::default().decompose(&hit, &refs),
            Err(DecomposeError::MissingAlignment)
        );
    }
}
