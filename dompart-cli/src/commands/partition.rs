//! Partition command implementation - split proteins into domains

use anyhow::{anyhow, Context, Result};
use dompart_core::{Partitioner, ReferenceDefinitions};
use rayon::prelude::*;
use std::collections::HashSet;
use std::path::{Path, PathBuf};

use crate::config::Config;
use crate::error::CliError;
use crate::input::{load_blacklist, load_job, load_references};
use crate::output::{DocumentSource, PartitionDocument};

/// Outcome of one successfully processed job
#[derive(Debug, Clone)]
pub struct JobSummary {
    pub protein_id: String,
    pub domains: usize,
    pub coverage_percent: f64,
    pub output: PathBuf,
}

#[allow(clippy::too_many_arguments)]
pub fn execute(
    config: &Config,
    inputs: Vec<PathBuf>,
    references: Option<PathBuf>,
    blacklist: Option<PathBuf>,
    out_dir: PathBuf,
    min_domain_size: Option<usize>,
    no_quality_filter: bool,
    include_evidence: bool,
) -> Result<Vec<JobSummary>> {
    let mut params = config.partition_params()?;
    if let Some(size) = min_domain_size {
        params.min_domain_size = size;
    }
    if no_quality_filter {
        params.apply_quality_thresholds = false;
    }
    let include_evidence = include_evidence || config.output.include_evidence;

    let jobs = collect_jobs(&inputs)?;
    if jobs.is_empty() {
        return Err(anyhow!(CliError::validation("no job files found in the given inputs")));
    }
    log::info!("Partitioning {} proteins", jobs.len());

    let references = load_reference_data(
        references.or_else(|| config.references.definitions.clone()),
        blacklist.or_else(|| config.references.blacklist.clone()),
    )?;
    if references.is_none() {
        log::warn!("No reference definitions given; chain BLAST decomposition disabled");
    }

    std::fs::create_dir_all(&out_dir)
        .with_context(|| format!("Failed to create output directory: {}", out_dir.display()))?;

    let partitioner = Partitioner::new(params);
    let pretty = config.output.pretty;

    let results: Vec<(PathBuf, Result<JobSummary>)> = jobs
        .par_iter()
        .map(|path| {
            let result = process_job(
                path,
                &partitioner,
                references.as_ref(),
                &out_dir,
                pretty,
                include_evidence,
            );
            (path.clone(), result)
        })
        .collect();

    let total = results.len();
    let mut summaries = Vec::with_capacity(total);
    let mut first_error = None;
    for (path, result) in results {
        match result {
            Ok(summary) => {
                log::debug!("{} -> {}", summary.protein_id, summary.output.display());
                summaries.push(summary);
            }
            Err(e) => {
                log::error!("{}: {:#}", path.display(), e);
                first_error.get_or_insert(e);
            }
        }
    }

    log::info!("Partitioned {} of {} proteins", summaries.len(), total);
    if let Some(error) = first_error {
        return Err(error.context(format!("{} of {} jobs failed", total - summaries.len(), total)));
    }

    Ok(summaries)
}

/// Expand directories into their `.json` files, sorted by name.
fn collect_jobs(inputs: &[PathBuf]) -> Result<Vec<PathBuf>> {
    let mut jobs = Vec::new();
    for input in inputs {
        if input.is_dir() {
            let mut found: Vec<PathBuf> = std::fs::read_dir(input)
                .with_context(|| format!("Failed to read job directory: {}", input.display()))?
                .filter_map(|entry| entry.ok().map(|e| e.path()))
                .filter(|p| p.extension().is_some_and(|ext| ext == "json"))
                .collect();
            found.sort();
            log::debug!("Found {} job files in {}", found.len(), input.display());
            jobs.extend(found);
        } else {
            jobs.push(input.clone());
        }
    }
    Ok(jobs)
}

fn load_reference_data(
    definitions: Option<PathBuf>,
    blacklist: Option<PathBuf>,
) -> Result<Option<ReferenceDefinitions>> {
    let Some(definitions) = definitions else {
        return Ok(None);
    };

    let excluded = match blacklist {
        Some(path) => load_blacklist(&path)?,
        None => HashSet::new(),
    };
    let (references, stats) = load_references(&definitions, &excluded)
        .with_context(|| format!("Failed to load reference definitions: {}", definitions.display()))?;
    if stats.domains == 0 {
        log::warn!(
            "{} holds no usable reference domains ({} invalid, {} blacklisted)",
            definitions.display(),
            stats.invalid,
            stats.blacklisted
        );
    }
    Ok(Some(references))
}

fn process_job(
    path: &Path,
    partitioner: &Partitioner,
    references: Option<&ReferenceDefinitions>,
    out_dir: &Path,
    pretty: bool,
    include_evidence: bool,
) -> Result<JobSummary> {
    let job = load_job(path)?;

    let outcome = partitioner
        .partition_with_report(&job.evidence, job.sequence_length, references)
        .map_err(|e| CliError::partition(job.protein_id.clone(), e.to_string()))?;

    let source = DocumentSource {
        protein_id: &job.protein_id,
        sequence_length: job.sequence_length,
        evidence_loaded: job.evidence.len(),
        evidence_skipped: job.skipped,
        params: partitioner.params(),
    };
    let document = PartitionDocument::new(source, &outcome, include_evidence);

    let output = out_dir.join(format!("{}.domains.json", job.protein_id));
    document
        .write(&output, pretty)
        .with_context(|| format!("Failed to write results: {}", output.display()))?;

    let coverage_percent = outcome
        .report
        .coverage
        .as_ref()
        .map_or(0.0, |c| c.coverage_percent);
    log::info!(
        "{}: {} domains, {:.1}% coverage",
        job.protein_id,
        outcome.domains.len(),
        coverage_percent
    );

    Ok(JobSummary {
        protein_id: job.protein_id,
        domains: outcome.domains.len(),
        coverage_percent,
        output,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    const JOB: &str = r#"{
        "protein_id": "8ovp_A",
        "sequence_length": 200,
        "evidence": [
            {"type": "chain_blast", "source_id": "5xyz", "source_chain": "A",
             "query_range": "1-60", "confidence": 0.9,
             "alignment": {"query_seq": "ACDEFGHIKLACDEFGHIKLACDEFGHIKLACDEFGHIKLACDEFGHIKLACDEFGHIKL",
                           "hit_seq": "ACDEFGHIKLACDEFGHIKLACDEFGHIKLACDEFGHIKLACDEFGHIKLACDEFGHIKL",
                           "query_start": 1, "query_end": 60, "hit_start": 1, "hit_end": 60}},
            {"type": "domain_blast", "source_id": "6dgv", "domain_id": "e6dgvA1",
             "query_range": "70-190", "confidence": 0.85,
             "hit_range": "1-120", "reference_length": 125}
        ]
    }"#;

    const REFERENCES: &str = "domain_id,pdb_id,chain_id,range,length\n\
                              e5xyzA1,5xyz,A,1-60,60\n";

    fn setup() -> (TempDir, PathBuf, PathBuf) {
        let dir = TempDir::new().unwrap();
        let jobs = dir.path().join("jobs");
        std::fs::create_dir(&jobs).unwrap();
        std::fs::write(jobs.join("8ovp_A.json"), JOB).unwrap();
        std::fs::write(jobs.join("notes.txt"), "not a job").unwrap();
        let refs = dir.path().join("domain_definitions.csv");
        std::fs::write(&refs, REFERENCES).unwrap();
        (dir, jobs, refs)
    }

    #[test]
    fn test_partition_directory() {
        let (dir, jobs, refs) = setup();
        let out_dir = dir.path().join("out");

        let summaries = execute(
            &Config::default(),
            vec![jobs],
            Some(refs),
            None,
            out_dir.clone(),
            None,
            false,
            false,
        )
        .unwrap();

        assert_eq!(summaries.len(), 1);
        assert_eq!(summaries[0].protein_id, "8ovp_A");
        assert_eq!(summaries[0].domains, 2);
        assert!((summaries[0].coverage_percent - 100.0).abs() < 1e-9);

        let written = std::fs::read_to_string(out_dir.join("8ovp_A.domains.json")).unwrap();
        let value: serde_json::Value = serde_json::from_str(&written).unwrap();
        assert_eq!(value["domains"][0]["reference_domain_id"], "e5xyzA1");
        assert_eq!(value["domains"][1]["reference_domain_id"], "e6dgvA1");
    }

    #[test]
    fn test_blacklisted_chain_not_decomposed() {
        let (dir, jobs, refs) = setup();
        let blacklist = dir.path().join("blacklist.csv");
        std::fs::write(&blacklist, "pdb_id,chain_id,reason\n5XYZ,A,obsolete\n").unwrap();

        let summaries = execute(
            &Config::default(),
            vec![jobs],
            Some(refs),
            Some(blacklist),
            dir.path().join("out"),
            None,
            false,
            false,
        )
        .unwrap();
        assert_eq!(summaries[0].domains, 1);
    }

    #[test]
    fn test_missing_job_fails() {
        let dir = TempDir::new().unwrap();
        let result = execute(
            &Config::default(),
            vec![dir.path().join("missing.json")],
            None,
            None,
            dir.path().join("out"),
            None,
            false,
            false,
        );

        let err = result.unwrap_err();
        assert!(err.to_string().contains("1 of 1 jobs failed"));
        assert!(matches!(
            err.downcast_ref::<CliError>(),
            Some(CliError::FileNotFound { .. })
        ));
    }

    #[test]
    fn test_empty_input_rejected() {
        let dir = TempDir::new().unwrap();
        let result = execute(
            &Config::default(),
            vec![dir.path().to_path_buf()],
            None,
            None,
            dir.path().join("out"),
            None,
            false,
            false,
        );
        assert!(result.is_err());
    }
}
