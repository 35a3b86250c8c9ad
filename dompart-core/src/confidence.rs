//! Evidence confidence scoring
//!
//! Banded heuristic over e-value (or HHsearch probability), scaled by how
//! much each search method is trusted and nudged by coverage of the
//! reference domain.

use crate::evidence::EvidenceType;

/// Lower bound of any computed confidence
pub const MIN_CONFIDENCE: f64 = 0.05;
/// Upper bound of any computed confidence
pub const MAX_CONFIDENCE: f64 = 0.95;

const BASE_CONFIDENCE: f64 = 0.1;

/// E-value upper bounds (exclusive) and the base confidence they earn
const EVALUE_BANDS: [(f64, f64); 7] = [
    (1e-10, 0.9),
    (1e-8, 0.8),
    (1e-5, 0.7),
    (1e-3, 0.6),
    (0.01, 0.5),
    (0.1, 0.4),
    (1.0, 0.3),
];
const EVALUE_FLOOR_CONFIDENCE: f64 = 0.2;

/// Raw scores available for one evidence item
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct ConfidenceFactors {
    pub evalue: Option<f64>,
    /// HHsearch probability, either 0-1 or 0-100 scale
    pub probability: Option<f64>,
    pub alignment_coverage: Option<f64>,
    pub reference_coverage: Option<f64>,
}

/// Trust placed in each search method
pub fn type_multiplier(evidence_type: EvidenceType) -> f64 {
    match evidence_type {
        EvidenceType::DomainBlast => 1.0,
        EvidenceType::Hhsearch => 0.95,
        EvidenceType::ChainBlast => 0.9,
        EvidenceType::ChainBlastDecomposed => 0.85,
    }
}

fn base_confidence(factors: &ConfidenceFactors) -> f64 {
    match (factors.evalue, factors.probability) {
        (Some(evalue), _) if evalue > 0.0 => EVALUE_BANDS
            .iter()
            .find(|(bound, _)| evalue < *bound)
            .map(|(_, conf)| *conf)
            .unwrap_or(EVALUE_FLOOR_CONFIDENCE),
        (_, Some(probability)) => {
            let probability = if probability > 1.0 {
                probability / 100.0
            } else {
                probability
            };
            probability.clamp(0.1, 0.9)
        }
        _ => BASE_CONFIDENCE,
    }
}

/// Compute a confidence in `[MIN_CONFIDENCE, MAX_CONFIDENCE]`.
///
/// A zero or negative e-value carries no signal and falls through to the
/// probability (or the base confidence).
pub fn calculate_confidence(evidence_type: EvidenceType, factors: &ConfidenceFactors) -> f64 {
    let mut confidence = base_confidence(factors) * type_multiplier(evidence_type);

    match factors.reference_coverage {
        Some(rc) if rc > 0.7 => confidence += ((rc - 0.7) * 0.2).min(0.1),
        Some(rc) if rc < 0.3 => confidence -= ((0.3 - rc) * 0.2).min(0.1),
        _ => {}
    }

    if let Some(ac) = factors.alignment_coverage {
        if ac > 0.7 {
            confidence += ((ac - 0.7) * 0.1).min(0.05);
        }
    }

    confidence.clamp(MIN_CONFIDENCE, MAX_CONFIDENCE)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn close(a: f64, b: f64) -> bool {
        (a - b).abs() < 1e-9
    }

    #[test]
    fn test_evalue_bands() {
        let conf = |evalue| {
            calculate_confidence(
                EvidenceType::DomainBlast,
                &ConfidenceFactors {
                    evalue: Some(evalue),
                    ..Default::default()
                },
            )
        };
        assert!(close(conf(1e-50), 0.9));
        assert!(close(conf(1e-9), 0.8));
        assert!(close(conf(1e-6), 0.7));
        assert!(close(conf(1e-4), 0.6));
        assert!(close(conf(0.005), 0.5));
        assert!(close(conf(0.05), 0.4));
        assert!(close(conf(0.5), 0.3));
        assert!(close(conf(10.0), 0.2));
    }

    #[test]
    fn test_probability_scales() {
        let factors = ConfidenceFactors {
            probability: Some(85.0),
            ..Default::default()
        };
        assert!(close(calculate_confidence(EvidenceType::Hhsearch, &factors), 0.85 * 0.95));

        let factors = ConfidenceFactors {
            probability: Some(0.99),
            ..Default::default()
        };
        assert!(close(calculate_confidence(EvidenceType::Hhsearch, &factors), 0.9 * 0.95));
    }

    #[test]
    fn test_zero_evalue_falls_back() {
        let factors = ConfidenceFactors {
            evalue: Some(0.0),
            ..Default::default()
        };
        assert!(close(calculate_confidence(EvidenceType::DomainBlast, &factors), 0.1));
    }

    #[test]
    fn test_type_multipliers_order() {
        let factors = ConfidenceFactors {
            evalue: Some(1e-20),
            ..Default::default()
        };
        let domain = calculate_confidence(EvidenceType::DomainBlast, &factors);
        let hh = calculate_confidence(EvidenceType::Hhsearch, &factors);
        let chain = calculate_confidence(EvidenceType::ChainBlast, &factors);
        let decomposed = calculate_confidence(EvidenceType::ChainBlastDecomposed, &factors);
        assert!(domain > hh && hh > chain && chain > decomposed);
    }

    #[test]
    fn test_reference_coverage_adjustments() {
        let base = ConfidenceFactors {
            evalue: Some(1e-6),
            ..Default::default()
        };
        let good = ConfidenceFactors {
            reference_coverage: Some(1.0),
            ..base
        };
        let poor = ConfidenceFactors {
            reference_coverage: Some(0.0),
            ..base
        };
        assert!(close(calculate_confidence(EvidenceType::DomainBlast, &good), 0.76));
        assert!(close(calculate_confidence(EvidenceType::DomainBlast, &poor), 0.64));
    }

    #[test]
    fn test_clamped() {
        let factors = ConfidenceFactors {
            evalue: Some(1e-100),
            alignment_coverage: Some(1.0),
            reference_coverage: Some(1.0),
            ..Default::default()
        };
        assert!(close(calculate_confidence(EvidenceType::DomainBlast, &factors), MAX_CONFIDENCE));

        let factors = ConfidenceFactors {
            evalue: Some(100.0),
            reference_coverage: Some(0.0),
            ..Default::default()
        };
        let conf = calculate_confidence(EvidenceType::ChainBlastDecomposed, &factors);
        assert!(conf >= MIN_CONFIDENCE);
    }
}
