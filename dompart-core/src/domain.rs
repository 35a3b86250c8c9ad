//! Domain model with provenance
//!
//! A domain owns the set of residues assigned to it. Its range is always the
//! minimal range covering that set and is recomputed on every mutation; the
//! range at creation is frozen as the original range, and every boundary
//! change is appended to an action log.

use crate::evidence::{Evidence, EvidenceType};
use crate::range::{Position, RangeError, RangeResult, SequenceRange};
use crate::reference::{classify_evidence, family_label, Classification, ReferenceDefinitions};
use serde::Serialize;
use std::collections::BTreeSet;

/// Overall verdict on a domain's supporting evidence
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum AssessmentLevel {
    Good,
    Questionable,
    Poor,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum QualityIssue {
    LowConfidence,
    PoorReferenceCoverage,
    PoorEvalue,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct QualityAssessment {
    pub overall: AssessmentLevel,
    pub issues: Vec<QualityIssue>,
}

/// Before/after view of boundary optimization on one domain
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct OptimizationSummary {
    pub was_optimized: bool,
    pub original_range: String,
    pub final_range: String,
    pub actions: Vec<String>,
    pub position_change: i64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Domain {
    pub id: String,
    range: SequenceRange,
    pub family: String,
    pub source: EvidenceType,
    pub classification: Classification,
    evidence: Vec<Evidence>,
    primary: usize,
    pub reference_domain_id: Option<String>,
    pub confidence: f64,
    assigned_positions: BTreeSet<Position>,
    original_range: SequenceRange,
    optimization_actions: Vec<String>,
}

impl Domain {
    /// Create a domain from the evidence that supports it.
    ///
    /// Fails for chain-tagged evidence ranges.
    pub fn from_evidence(
        id: impl Into<String>,
        evidence: Evidence,
        references: Option<&ReferenceDefinitions>,
    ) -> RangeResult<Self> {
        let assigned_positions = evidence.positions()?;
        let range = SequenceRange::from_positions(assigned_positions.iter().copied(), None)?;
        let classification = classify_evidence(&evidence, references);
        let family = family_label(&evidence, &classification);

        Ok(Self {
            id: id.into(),
            range,
            family,
            source: evidence.evidence_type,
            classification,
            primary: 0,
            reference_domain_id: evidence.domain_id.clone(),
            confidence: evidence.confidence,
            assigned_positions,
            original_range: evidence.query_range.clone(),
            optimization_actions: Vec::new(),
            evidence: vec![evidence],
        })
    }

    pub fn range(&self) -> &SequenceRange {
        &self.range
    }

    pub fn original_range(&self) -> &SequenceRange {
        &self.original_range
    }

    pub fn positions(&self) -> &BTreeSet<Position> {
        &self.assigned_positions
    }

    pub fn evidence(&self) -> &[Evidence] {
        &self.evidence
    }

    /// Highest-confidence supporting evidence; earliest wins ties
    pub fn primary_evidence(&self) -> &Evidence {
        &self.evidence[self.primary]
    }

    pub fn optimization_actions(&self) -> &[String] {
        &self.optimization_actions
    }

    pub fn size(&self) -> usize {
        self.assigned_positions.len()
    }

    pub fn start(&self) -> Position {
        self.range.start_position()
    }

    pub fn end(&self) -> Position {
        self.range.end_position()
    }

    pub fn record_action(&mut self, action: &str, details: &str) {
        self.optimization_actions.push(format!("{}:{}", action, details));
    }

    /// Claim positions; returns how many were new.
    pub fn add_positions(&mut self, positions: &BTreeSet<Position>) -> RangeResult<usize> {
        let before = self.assigned_positions.len();
        self.assigned_positions.extend(positions.iter().copied());
        self.rebuild_range()?;
        Ok(self.assigned_positions.len() - before)
    }

    /// Release positions; returns how many were held.
    ///
    /// Leaves the domain untouched and fails if nothing would remain.
    pub fn remove_positions(&mut self, positions: &BTreeSet<Position>) -> RangeResult<usize> {
        let remaining: BTreeSet<Position> = self
            .assigned_positions
            .difference(positions)
            .copied()
            .collect();
        if remaining.is_empty() {
            return Err(RangeError::Empty);
        }
        let removed = self.assigned_positions.len() - remaining.len();
        self.assigned_positions = remaining;
        self.rebuild_range()?;
        Ok(removed)
    }

    fn rebuild_range(&mut self) -> RangeResult<()> {
        self.range = SequenceRange::from_positions(self.assigned_positions.iter().copied(), None)?;
        Ok(())
    }

    /// Attach further supporting evidence, promoting it to primary if it is
    /// strictly more confident.
    pub fn add_evidence(&mut self, evidence: Evidence) {
        let details = format!("added_{}_{:.2}", evidence.evidence_type, evidence.confidence);
        if evidence.confidence > self.confidence {
            self.confidence = evidence.confidence;
            self.primary = self.evidence.len();
            if evidence.domain_id.is_some() {
                self.reference_domain_id = evidence.domain_id.clone();
            }
        }
        self.evidence.push(evidence);
        self.record_action("evidence_merge", &details);
    }

    /// Minimum residue distance to another domain; 0 when they overlap.
    pub fn distance_to(&self, other: &Domain) -> u32 {
        let mut best = u32::MAX;
        for a in self.range.segments() {
            for b in other.range.segments() {
                let distance = if a.overlaps(b) {
                    0
                } else if a.end() < b.start() {
                    b.start() - a.end()
                } else {
                    a.start() - b.end()
                };
                best = best.min(distance);
            }
        }
        best
    }

    /// True when some pair of residues lies within `tolerance` of each other.
    pub fn overlaps_with(&self, other: &Domain, tolerance: u32) -> bool {
        self.distance_to(other) <= tolerance
    }

    fn original_positions(&self) -> BTreeSet<Position> {
        self.original_range
            .to_positions()
            .into_iter()
            .map(|(p, _)| p)
            .collect()
    }

    /// True once the assigned residues differ from those of the original range
    pub fn was_optimized(&self) -> bool {
        self.original_positions() != self.assigned_positions
    }

    pub fn optimization_summary(&self) -> OptimizationSummary {
        OptimizationSummary {
            was_optimized: self.was_optimized(),
            original_range: self.original_range.to_string(),
            final_range: self.range.to_string(),
            actions: self.optimization_actions.clone(),
            position_change: self.size() as i64 - self.original_positions().len() as i64,
        }
    }

    pub fn quality_assessment(&self) -> QualityAssessment {
        let primary = self.primary_evidence();
        let mut issues = Vec::new();

        if primary.confidence < 0.5 {
            issues.push(QualityIssue::LowConfidence);
        }
        if primary.reference_coverage().is_some_and(|rc| rc < 0.5) {
            issues.push(QualityIssue::PoorReferenceCoverage);
        }
        if primary.evalue.is_some_and(|e| e > 1.0) {
            issues.push(QualityIssue::PoorEvalue);
        }

        let overall = match issues.len() {
            0 => AssessmentLevel::Good,
            1 => AssessmentLevel::Questionable,
            _ => AssessmentLevel::Poor,
        };
        QualityAssessment { overall, issues }
    }

    /// Problems with this domain's provenance record; empty when complete.
    pub fn provenance_issues(&self) -> Vec<String> {
        let mut issues = Vec::new();

        if self.id.is_empty() {
            issues.push("Missing domain ID".to_string());
        }
        if self.family.is_empty() {
            issues.push("Missing family assignment".to_string());
        }
        if self.confidence <= 0.0 {
            issues.push("Missing or invalid confidence score".to_string());
        }
        if self.size() != self.range.total_length() {
            issues.push("Assigned positions disagree with range".to_string());
        }
        if self.was_optimized() && self.optimization_actions.is_empty() {
            issues.push("Range changed but no optimization recorded".to_string());
        }

        issues
    }
}
