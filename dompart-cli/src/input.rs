//! Job and reference-table loading
//!
//! A job is one protein: a JSON document with its id, sequence length and
//! evidence list. Reference domain definitions and the chain blacklist are
//! CSV tables shared by every job in a run.

use dompart_core::{
    AlignmentData, Evidence, EvidenceType, ReferenceDefinitions, ReferenceDomain, ReferenceKey,
    SequenceRange,
};
use serde::Deserialize;
use std::collections::HashSet;
use std::path::Path;

use crate::error::{CliError, CliResult};

/// One protein ready for partitioning
#[derive(Debug, Clone)]
pub struct ProteinJob {
    pub protein_id: String,
    pub sequence_length: usize,
    pub evidence: Vec<Evidence>,
    /// Evidence items dropped while loading
    pub skipped: usize,
}

#[derive(Debug, Deserialize)]
struct JobFile {
    protein_id: String,
    sequence_length: usize,
    #[serde(default)]
    evidence: Vec<RawEvidence>,
}

/// Evidence as written in job files; ranges are still text
#[derive(Debug, Deserialize)]
struct RawEvidence {
    #[serde(rename = "type")]
    evidence_type: String,
    source_id: String,
    #[serde(default)]
    source_chain: Option<String>,
    #[serde(default)]
    domain_id: Option<String>,
    query_range: String,
    #[serde(default)]
    confidence: Option<f64>,
    #[serde(default)]
    evalue: Option<f64>,
    #[serde(default)]
    probability: Option<f64>,
    #[serde(default)]
    alignment: Option<AlignmentData>,
    #[serde(default)]
    reference_length: Option<u32>,
    #[serde(default)]
    hit_range: Option<String>,
    #[serde(default)]
    t_group: Option<String>,
    #[serde(default)]
    h_group: Option<String>,
    #[serde(default)]
    hsp_count: Option<u32>,
}

impl RawEvidence {
    fn into_evidence(self) -> Result<Evidence, String> {
        let evidence_type: EvidenceType = self.evidence_type.parse().map_err(|e| format!("{}", e))?;
        let query_range = SequenceRange::parse(&self.query_range)
            .map_err(|e| format!("query range '{}': {}", self.query_range, e))?;
        let hit_range = self
            .hit_range
            .as_deref()
            .map(SequenceRange::parse)
            .transpose()
            .map_err(|e| format!("hit range: {}", e))?;

        if let Some(confidence) = self.confidence {
            if !(0.0..=1.0).contains(&confidence) {
                return Err(format!("confidence {} outside [0, 1]", confidence));
            }
        }

        let mut evidence = Evidence::new(evidence_type, self.source_id, query_range, 0.0);
        evidence.source_chain = self.source_chain;
        evidence.domain_id = self.domain_id;
        evidence.evalue = self.evalue;
        evidence.probability = self.probability;
        evidence.alignment = self.alignment;
        evidence.reference_length = self.reference_length;
        evidence.hit_range = hit_range;
        evidence.t_group = self.t_group;
        evidence.h_group = self.h_group;
        evidence.hsp_count = self.hsp_count;

        evidence.populate_provenance();
        if let Some(confidence) = self.confidence {
            evidence.confidence = confidence;
        }
        Ok(evidence)
    }
}

/// Load a job file; unusable evidence items are skipped with a warning.
pub fn load_job(path: &Path) -> CliResult<ProteinJob> {
    if !path.exists() {
        return Err(CliError::file_not_found(path.to_path_buf()));
    }
    let content = std::fs::read_to_string(path)?;
    let file: JobFile = serde_json::from_str(&content)
        .map_err(|e| CliError::parse(path.display().to_string(), e.to_string()))?;

    let mut evidence = Vec::with_capacity(file.evidence.len());
    let mut skipped = 0;
    for (i, raw) in file.evidence.into_iter().enumerate() {
        match raw.into_evidence() {
            Ok(item) => evidence.push(item),
            Err(reason) => {
                log::warn!("{}: skipping evidence #{}: {}", file.protein_id, i + 1, reason);
                skipped += 1;
            }
        }
    }

    log::debug!(
        "Loaded {} evidence items for {} ({} skipped)",
        evidence.len(),
        file.protein_id,
        skipped
    );

    Ok(ProteinJob {
        protein_id: file.protein_id,
        sequence_length: file.sequence_length,
        evidence,
        skipped,
    })
}

#[derive(Debug, Deserialize)]
struct ReferenceRow {
    domain_id: String,
    pdb_id: String,
    chain_id: String,
    range: String,
    #[serde(default)]
    length: Option<String>,
    #[serde(default)]
    t_group: Option<String>,
    #[serde(default)]
    h_group: Option<String>,
}

#[derive(Debug, Deserialize)]
struct BlacklistRow {
    #[serde(default)]
    pdb_id: Option<String>,
    #[serde(default)]
    chain_id: Option<String>,
    #[serde(default)]
    reason: Option<String>,
}

/// Counts from loading a reference table
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReferenceLoadStats {
    pub domains: usize,
    pub chains: usize,
    pub invalid: usize,
    pub blacklisted: usize,
}

/// Drop chain prefixes such as `A:` from every segment.
fn strip_chain_prefixes(range: &str) -> String {
    range
        .split(',')
        .map(|segment| segment.rsplit_once(':').map_or(segment, |(_, rest)| rest).trim())
        .collect::<Vec<_>>()
        .join(",")
}

fn parse_reference_row(row: ReferenceRow) -> Result<ReferenceDomain, String> {
    let range = SequenceRange::parse(&strip_chain_prefixes(&row.range))
        .map_err(|e| format!("invalid range '{}': {}", row.range, e))?;

    let length = match row.length.as_deref().map(str::trim).map(str::parse::<i64>) {
        Some(Ok(len)) if len > 0 => len as u32,
        Some(Ok(len)) => return Err(format!("invalid length {}", len)),
        _ => return Err("missing or invalid length".to_string()),
    };

    let non_empty = |v: Option<String>| v.filter(|s| !s.trim().is_empty());
    Ok(ReferenceDomain {
        domain_id: row.domain_id,
        source_id: row.pdb_id.to_lowercase(),
        chain: row.chain_id,
        range,
        length,
        t_group: non_empty(row.t_group),
        h_group: non_empty(row.h_group),
    })
}

/// Load the chain blacklist; a missing file means nothing is excluded.
pub fn load_blacklist(path: &Path) -> CliResult<HashSet<ReferenceKey>> {
    let mut blacklist = HashSet::new();
    if !path.exists() {
        log::debug!("No blacklist file found: {}", path.display());
        return Ok(blacklist);
    }

    let mut reader = csv::ReaderBuilder::new()
        .flexible(true)
        .trim(csv::Trim::All)
        .from_path(path)
        .map_err(|e| CliError::reference(format!("{}: {}", path.display(), e)))?;

    for row in reader.deserialize::<BlacklistRow>() {
        let row = match row {
            Ok(row) => row,
            Err(e) => {
                log::warn!("Skipping blacklist row in {}: {}", path.display(), e);
                continue;
            }
        };
        let (Some(pdb_id), Some(chain_id)) = (row.pdb_id, row.chain_id) else {
            continue;
        };
        if pdb_id.is_empty() || chain_id.is_empty() {
            continue;
        }
        log::debug!(
            "Blacklisted {}_{}: {}",
            pdb_id,
            chain_id,
            row.reason.as_deref().unwrap_or("no reason given")
        );
        blacklist.insert(ReferenceKey::new(&pdb_id, &chain_id));
    }

    log::info!("Loaded {} blacklisted reference chains", blacklist.len());
    Ok(blacklist)
}

/// Load reference domain definitions, excluding blacklisted chains.
pub fn load_references(
    path: &Path,
    blacklist: &HashSet<ReferenceKey>,
) -> CliResult<(ReferenceDefinitions, ReferenceLoadStats)> {
    if !path.exists() {
        return Err(CliError::file_not_found(path.to_path_buf()));
    }

    let mut reader = csv::ReaderBuilder::new()
        .trim(csv::Trim::All)
        .from_path(path)
        .map_err(|e| CliError::reference(format!("{}: {}", path.display(), e)))?;

    let mut definitions = ReferenceDefinitions::new();
    let mut stats = ReferenceLoadStats::default();

    for (line, row) in reader.deserialize::<ReferenceRow>().enumerate() {
        let row = match row {
            Ok(row) => row,
            Err(e) => {
                log::warn!("Skipping reference row {}: {}", line + 2, e);
                stats.invalid += 1;
                continue;
            }
        };

        if blacklist.contains(&ReferenceKey::new(&row.pdb_id, &row.chain_id)) {
            stats.blacklisted += 1;
            continue;
        }

        let domain_id = row.domain_id.clone();
        match parse_reference_row(row) {
            Ok(domain) => definitions.insert(domain),
            Err(reason) => {
                log::warn!("Skipping reference {}: {}", domain_id, reason);
                stats.invalid += 1;
            }
        }
    }

    stats.domains = definitions.num_domains();
    stats.chains = definitions.num_chains();
    log::info!(
        "Loaded {} reference domains for {} chains",
        stats.domains,
        stats.chains
    );
    if stats.blacklisted > 0 {
        log::info!("Excluded {} blacklisted reference domains", stats.blacklisted);
    }
    if stats.invalid > 0 {
        log::warn!("Skipped {} reference domains with invalid data", stats.invalid);
    }

    Ok((definitions, stats))
}
