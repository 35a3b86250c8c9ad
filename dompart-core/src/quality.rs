//! Evidence quality gate
//!
//! Per-method minimum confidence and minimum reference coverage. Methods
//! with an entry in the table must report both a hit range and a reference
//! length; evidence missing either is rejected rather than waved through.

use crate::evidence::{Evidence, EvidenceType};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Floors applied to one evidence type
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TypeThresholds {
    pub min_confidence: f64,
    pub min_reference_coverage: f64,
}

/// Why an evidence item failed the gate
#[derive(Debug, Clone, PartialEq)]
pub enum QualityRejection {
    LowConfidence { confidence: f64, minimum: f64 },
    MissingReferenceData,
    LowReferenceCoverage { coverage: f64, minimum: f64 },
}

impl fmt::Display for QualityRejection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            QualityRejection::LowConfidence { confidence, minimum } => {
                write!(f, "confidence {:.3} < {:.3}", confidence, minimum)
            }
            QualityRejection::MissingReferenceData => {
                write!(f, "incomplete reference data (missing hit range or reference length)")
            }
            QualityRejection::LowReferenceCoverage { coverage, minimum } => {
                write!(f, "reference coverage {:.1}% < {:.0}%", coverage * 100.0, minimum * 100.0)
            }
        }
    }
}

/// Lookup table from evidence type to its thresholds.
///
/// Types without an entry pass unconditionally.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct QualityThresholds {
    by_type: BTreeMap<EvidenceType, TypeThresholds>,
}

impl Default for QualityThresholds {
    fn default() -> Self {
        Self::empty()
            .with(EvidenceType::Hhsearch, 0.65, 0.6)
            .with(EvidenceType::DomainBlast, 0.5, 0.5)
            .with(EvidenceType::ChainBlastDecomposed, 0.5, 0.5)
    }
}

impl QualityThresholds {
    pub fn empty() -> Self {
        Self {
            by_type: BTreeMap::new(),
        }
    }

    pub fn with(mut self, evidence_type: EvidenceType, min_confidence: f64, min_reference_coverage: f64) -> Self {
        self.set(
            evidence_type,
            TypeThresholds {
                min_confidence,
                min_reference_coverage,
            },
        );
        self
    }

    pub fn set(&mut self, evidence_type: EvidenceType, thresholds: TypeThresholds) {
        self.by_type.insert(evidence_type, thresholds);
    }

    pub fn get(&self, evidence_type: EvidenceType) -> Option<&TypeThresholds> {
        self.by_type.get(&evidence_type)
    }

    pub fn iter(&self) -> impl Iterator<Item = (EvidenceType, &TypeThresholds)> {
        self.by_type.iter().map(|(k, v)| (*k, v))
    }

    /// Check one evidence item against its type's thresholds.
    pub fn check(&self, evidence: &Evidence) -> Result<(), QualityRejection> {
        let Some(thresholds) = self.get(evidence.evidence_type) else {
            return Ok(());
        };

        if evidence.confidence < thresholds.min_confidence {
            return Err(QualityRejection::LowConfidence {
                confidence: evidence.confidence,
                minimum: thresholds.min_confidence,
            });
        }

        let (hit_range, reference_length) = match (&evidence.hit_range, evidence.reference_length) {
            (Some(hit), Some(len)) if len > 0 => (hit, len),
            _ => return Err(QualityRejection::MissingReferenceData),
        };

        let coverage = hit_range.total_length() as f64 / reference_length as f64;
        if coverage < thresholds.min_reference_coverage {
            return Err(QualityRejection::LowReferenceCoverage {
                coverage,
                minimum: thresholds.min_reference_coverage,
            });
        }

        Ok(())
    }
}
