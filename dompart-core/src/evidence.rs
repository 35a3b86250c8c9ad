//! Evidence records and the priority policy
//!
//! Evidence is a homology hit against the query chain produced by one of the
//! search methods. The partitioner consumes evidence in the total order
//! defined by [`Evidence::priority_cmp`]; that order decides which hit wins
//! contested residues, so every tie is broken explicitly.

use crate::confidence::{calculate_confidence, ConfidenceFactors};
use crate::range::{Position, RangeResult, SequenceRange};
use crate::reference::ReferenceKey;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// E-value used for ordering when a hit reports none
pub const MISSING_EVALUE: f64 = 999.0;

/// Search method that produced a hit
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EvidenceType {
    ChainBlast,
    DomainBlast,
    Hhsearch,
    ChainBlastDecomposed,
}

impl EvidenceType {
    pub const ALL: [EvidenceType; 4] = [
        EvidenceType::ChainBlast,
        EvidenceType::DomainBlast,
        EvidenceType::Hhsearch,
        EvidenceType::ChainBlastDecomposed,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            EvidenceType::ChainBlast => "chain_blast",
            EvidenceType::DomainBlast => "domain_blast",
            EvidenceType::Hhsearch => "hhsearch",
            EvidenceType::ChainBlastDecomposed => "chain_blast_decomposed",
        }
    }
}

impl fmt::Display for EvidenceType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("Unknown evidence type: {0}")]
pub struct UnknownEvidenceType(pub String);

impl FromStr for EvidenceType {
    type Err = UnknownEvidenceType;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        EvidenceType::ALL
            .into_iter()
            .find(|t| t.as_str() == s)
            .ok_or_else(|| UnknownEvidenceType(s.to_string()))
    }
}

/// Pairwise alignment of the query against a whole target chain.
///
/// Strings are gapped with `-`; starts and ends are 1-based.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AlignmentData {
    pub query_seq: String,
    pub hit_seq: String,
    pub query_start: Position,
    pub query_end: Position,
    pub hit_start: Position,
    pub hit_end: Position,
}

/// A single homology hit against the query chain
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Evidence {
    #[serde(rename = "type")]
    pub evidence_type: EvidenceType,
    /// Matched structure, e.g. `6dgv`
    pub source_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_chain: Option<String>,
    /// Reference domain id, e.g. `e6dgvA1`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub domain_id: Option<String>,
    pub query_range: SequenceRange,
    pub confidence: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub evalue: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub probability: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub alignment: Option<AlignmentData>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reference_length: Option<u32>,
    /// Range covered on the reference sequence
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hit_range: Option<SequenceRange>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub alignment_coverage: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reference_coverage: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub t_group: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub h_group: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hsp_count: Option<u32>,
    #[serde(default)]
    pub discontinuous: bool,
}

/// Snapshot of the numbers that describe how good a hit is
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct QualityMetrics {
    pub confidence: f64,
    pub evalue: Option<f64>,
    pub reference_coverage: Option<f64>,
    pub query_length: usize,
    pub hit_length: Option<usize>,
    pub reference_length: Option<u32>,
    pub discontinuous: bool,
}

impl Evidence {
    pub fn new(
        evidence_type: EvidenceType,
        source_id: impl Into<String>,
        query_range: SequenceRange,
        confidence: f64,
    ) -> Self {
        Self {
            evidence_type,
            source_id: source_id.into(),
            source_chain: None,
            domain_id: None,
            query_range,
            confidence,
            evalue: None,
            probability: None,
            alignment: None,
            reference_length: None,
            hit_range: None,
            alignment_coverage: None,
            reference_coverage: None,
            t_group: None,
            h_group: None,
            hsp_count: None,
            discontinuous: false,
        }
    }

    /// Query positions; fails for chain-tagged ranges.
    pub fn positions(&self) -> RangeResult<BTreeSet<Position>> {
        self.query_range.position_set()
    }

    /// Explicit reference coverage, else hit length over reference length.
    pub fn reference_coverage(&self) -> Option<f64> {
        if self.reference_coverage.is_some() {
            return self.reference_coverage;
        }
        match (&self.hit_range, self.reference_length) {
            (Some(hit), Some(len)) if len > 0 => Some(hit.total_length() as f64 / len as f64),
            _ => None,
        }
    }

    /// Chain of the matched target.
    ///
    /// Uses the explicit chain, then the suffix after the last `_` of the
    /// domain id (`6dgv_A`), then the sixth character of an ECOD-style id
    /// (`e6dgvA1`), then `A`.
    pub fn chain_id(&self) -> String {
        if let Some(chain) = self.source_chain.as_deref().filter(|c| !c.is_empty()) {
            return chain.to_string();
        }

        if let Some(domain_id) = self.domain_id.as_deref() {
            if let Some((_, suffix)) = domain_id.rsplit_once('_') {
                if !suffix.is_empty() {
                    return suffix.to_string();
                }
            } else if domain_id.starts_with('e') {
                if let Some(c) = domain_id.chars().nth(5).filter(|c| c.is_alphabetic()) {
                    return c.to_string();
                }
            }
        }

        "A".to_string()
    }

    pub fn target_key(&self) -> ReferenceKey {
        ReferenceKey::new(&self.source_id, &self.chain_id())
    }

    /// Secondary ordering score, higher is better
    pub fn tiebreak_score(&self) -> f64 {
        let mut score = 0.0;
        if self.alignment.is_some() {
            score += 10.0;
        }
        if let Some(coverage) = self.alignment_coverage {
            score += coverage * 5.0;
        }
        if self.query_range.is_discontinuous() {
            score += 2.0;
        }
        if self.reference_length.is_some() {
            score += 1.0;
        }
        score
    }

    /// Total processing order: confidence desc, e-value asc, tiebreak desc,
    /// then source id, domain id and range text ascending.
    pub fn priority_cmp(&self, other: &Evidence) -> Ordering {
        other
            .confidence
            .total_cmp(&self.confidence)
            .then_with(|| {
                let a = self.evalue.unwrap_or(MISSING_EVALUE);
                let b = other.evalue.unwrap_or(MISSING_EVALUE);
                a.total_cmp(&b)
            })
            .then_with(|| other.tiebreak_score().total_cmp(&self.tiebreak_score()))
            .then_with(|| self.source_id.cmp(&other.source_id))
            .then_with(|| {
                let a = self.domain_id.as_deref().unwrap_or("");
                let b = other.domain_id.as_deref().unwrap_or("");
                a.cmp(b)
            })
            .then_with(|| {
                self.query_range
                    .to_string()
                    .cmp(&other.query_range.to_string())
            })
    }

    pub fn confidence_factors(&self) -> ConfidenceFactors {
        ConfidenceFactors {
            evalue: self.evalue,
            probability: self.probability,
            alignment_coverage: self.alignment_coverage,
            reference_coverage: self.reference_coverage(),
        }
    }

    /// Fill derived provenance fields and recompute confidence from them.
    pub fn populate_provenance(&mut self) {
        if self.hsp_count.is_none() {
            self.hsp_count = Some(1);
        }
        self.discontinuous = self.query_range.is_discontinuous();

        if let Some(coverage) = self.reference_coverage() {
            self.reference_coverage = Some(coverage);
            if self.alignment_coverage.is_none() {
                self.alignment_coverage = Some(coverage);
            }
        }

        if self.source_chain.is_none() {
            self.source_chain = Some(self.chain_id());
        }

        self.confidence = calculate_confidence(self.evidence_type, &self.confidence_factors());
    }

    pub fn quality_metrics(&self) -> QualityMetrics {
        QualityMetrics {
            confidence: self.confidence,
            evalue: self.evalue,
            reference_coverage: self.reference_coverage(),
            query_length: self.query_range.total_length(),
            hit_length: self.hit_range.as_ref().map(SequenceRange::total_length),
            reference_length: self.reference_length,
            discontinuous: self.discontinuous,
        }
    }
}

/// Stable sort into processing order.
pub fn sort_by_priority(evidence: &mut [Evidence]) {
    evidence.sort_by(|a, b| a.priority_cmp(b));
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ev(kind: EvidenceType, source: &str, range: &str, conf: f64) -> Evidence {
        Evidence::new(kind, source, SequenceRange::parse(range).unwrap(), conf)
    }

    #[test]
    fn test_evidence_type_strings() {
        for kind in EvidenceType::ALL {
            assert_eq!(kind.as_str().parse::<EvidenceType>().unwrap(), kind);
        }
        assert!("blastp".parse::<EvidenceType>().is_err());
        assert_eq!(
            serde_json::to_string(&EvidenceType::ChainBlastDecomposed).unwrap(),
            "\"chain_blast_decomposed\""
        );
    }

    #[test]
    fn test_priority_confidence_then_evalue() {
        let mut items = vec![
            ev(EvidenceType::DomainBlast, "b", "1-50", 0.8),
            ev(EvidenceType::DomainBlast, "a", "1-50", 0.9),
            ev(EvidenceType::DomainBlast, "c", "1-50", 0.8),
        ];
        items[2].evalue = Some(1e-10);
        sort_by_priority(&mut items);

        let order: Vec<&str> = items.iter().map(|e| e.source_id.as_str()).collect();
        assert_eq!(order, vec!["a", "c", "b"]);
    }

    #[test]
    fn test_priority_tiebreak_and_identity() {
        let mut with_ref = ev(EvidenceType::DomainBlast, "z", "1-50", 0.8);
        with_ref.reference_length = Some(50);
        let mut items = vec![
            ev(EvidenceType::DomainBlast, "b", "10-60", 0.8),
            ev(EvidenceType::DomainBlast, "b", "1-50", 0.8),
            with_ref,
        ];
        sort_by_priority(&mut items);

        assert_eq!(items[0].source_id, "z");
        assert_eq!(items[1].query_range.to_string(), "1-50");
        assert_eq!(items[2].query_range.to_string(), "10-60");
    }

    #[test]
    fn test_reference_coverage_derived() {
        let mut e = ev(EvidenceType::DomainBlast, "1abc", "1-80", 0.9);
        assert_eq!(e.reference_coverage(), None);
        e.hit_range = Some(SequenceRange::parse("1-80").unwrap());
        e.reference_length = Some(100);
        assert!((e.reference_coverage().unwrap() - 0.8).abs() < 1e-9);
        e.reference_coverage = Some(0.5);
        assert_eq!(e.reference_coverage(), Some(0.5));
    }

    #[test]
    fn test_chain_id_fallbacks() {
        let mut e = ev(EvidenceType::ChainBlast, "6dgv", "1-50", 0.9);
        assert_eq!(e.chain_id(), "A");

        e.domain_id = Some("e6dgvB1".to_string());
        assert_eq!(e.chain_id(), "B");

        e.domain_id = Some("6dgv_C".to_string());
        assert_eq!(e.chain_id(), "C");

        e.source_chain = Some("D".to_string());
        assert_eq!(e.chain_id(), "D");
        assert_eq!(e.target_key(), ReferenceKey::new("6dgv", "D"));
    }

    #[test]
    fn test_populate_provenance() {
        let mut e = ev(EvidenceType::DomainBlast, "1abc", "1-40,60-100", 0.0);
        e.evalue = Some(1e-20);
        e.hit_range = Some(SequenceRange::parse("1-90").unwrap());
        e.reference_length = Some(100);
        e.populate_provenance();

        assert!(e.discontinuous);
        assert_eq!(e.hsp_count, Some(1));
        assert_eq!(e.source_chain.as_deref(), Some("A"));
        assert!((e.reference_coverage.unwrap() - 0.9).abs() < 1e-9);
        assert_eq!(e.alignment_coverage, e.reference_coverage);
        // 0.9 base + 0.04 reference boost + 0.02 alignment boost, clamped
        assert!((e.confidence - 0.95).abs() < 1e-9);
    }

    #[test]
    fn test_quality_metrics() {
        let mut e = ev(EvidenceType::Hhsearch, "2xyz", "5-104", 0.7);
        e.hit_range = Some(SequenceRange::parse("1-50").unwrap());
        let metrics = e.quality_metrics();
        assert_eq!(metrics.query_length, 100);
        assert_eq!(metrics.hit_length, Some(50));
        assert_eq!(metrics.reference_coverage, None);
    }
}
