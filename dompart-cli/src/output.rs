//! Partition result documents

use chrono::{DateTime, Utc};
use dompart_core::{
    AssessmentLevel, Classification, CoverageStats, Domain, Evidence, EvidenceType,
    PartitionOutcome, PartitionParams, PartitionReport,
};
use serde::Serialize;
use std::path::Path;

use crate::error::CliResult;

#[derive(Debug, Serialize)]
pub struct PartitionDocument {
    pub metadata: Metadata,
    pub statistics: Statistics,
    pub domains: Vec<DomainRecord>,
}

#[derive(Debug, Serialize)]
pub struct Metadata {
    pub protein_id: String,
    pub sequence_length: usize,
    pub tool_version: String,
    pub core_version: String,
    pub processed_at: DateTime<Utc>,
    pub parameters: PartitionParams,
}

#[derive(Debug, Serialize)]
pub struct Statistics {
    pub domain_count: usize,
    pub domains_optimized: usize,
    pub evidence_loaded: usize,
    pub evidence_skipped_on_load: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub coverage: Option<CoverageStats>,
    pub report: PartitionReport,
}

#[derive(Debug, Serialize)]
pub struct DomainRecord {
    pub id: String,
    pub range: String,
    pub original_range: String,
    pub is_discontinuous: bool,
    pub size: usize,
    pub family: String,
    pub source: EvidenceType,
    pub classification: Classification,
    pub confidence: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reference_domain_id: Option<String>,
    pub quality: AssessmentLevel,
    pub optimization_actions: Vec<String>,
    pub evidence_count: usize,
    pub primary_evidence: Evidence,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub evidence: Option<Vec<Evidence>>,
}

impl DomainRecord {
    pub fn from_domain(domain: &Domain, include_evidence: bool) -> Self {
        Self {
            id: domain.id.clone(),
            range: domain.range().to_string(),
            original_range: domain.original_range().to_string(),
            is_discontinuous: domain.range().is_discontinuous(),
            size: domain.size(),
            family: domain.family.clone(),
            source: domain.source,
            classification: domain.classification.clone(),
            confidence: domain.confidence,
            reference_domain_id: domain.reference_domain_id.clone(),
            quality: domain.quality_assessment().overall,
            optimization_actions: domain.optimization_actions().to_vec(),
            evidence_count: domain.evidence().len(),
            primary_evidence: domain.primary_evidence().clone(),
            evidence: include_evidence.then(|| domain.evidence().to_vec()),
        }
    }
}

/// Inputs describing one finished job
pub struct DocumentSource<'a> {
    pub protein_id: &'a str,
    pub sequence_length: usize,
    pub evidence_loaded: usize,
    pub evidence_skipped: usize,
    pub params: &'a PartitionParams,
}

impl PartitionDocument {
    pub fn new(source: DocumentSource<'_>, outcome: &PartitionOutcome, include_evidence: bool) -> Self {
        let domains: Vec<DomainRecord> = outcome
            .domains
            .iter()
            .map(|d| DomainRecord::from_domain(d, include_evidence))
            .collect();

        Self {
            metadata: Metadata {
                protein_id: source.protein_id.to_string(),
                sequence_length: source.sequence_length,
                tool_version: env!("CARGO_PKG_VERSION").to_string(),
                core_version: dompart_core::VERSION.to_string(),
                processed_at: Utc::now(),
                parameters: source.params.clone(),
            },
            statistics: Statistics {
                domain_count: domains.len(),
                domains_optimized: outcome.domains.iter().filter(|d| d.was_optimized()).count(),
                evidence_loaded: source.evidence_loaded,
                evidence_skipped_on_load: source.evidence_skipped,
                coverage: outcome.report.coverage.clone(),
                report: outcome.report.clone(),
            },
            domains,
        }
    }

    pub fn write(&self, path: &Path, pretty: bool) -> CliResult<()> {
        let content = if pretty {
            serde_json::to_string_pretty(self)?
        } else {
            serde_json::to_string(self)?
        };
        std::fs::write(path, content)?;
        Ok(())
    }
}
