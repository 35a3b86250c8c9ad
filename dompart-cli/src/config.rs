//! Configuration handling for the dompart CLI
//!
//! Supports loading configuration from dompart.toml files with CLI argument overrides.

use anyhow::{Context, Result};
use dompart_core::{EvidenceType, PartitionParams, QualityThresholds, TypeThresholds};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use crate::error::{CliError, CliResult};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub general: GeneralConfig,
    #[serde(default)]
    pub references: ReferenceConfig,
    #[serde(default)]
    pub partition: PartitionConfig,
    #[serde(default)]
    pub quality: QualityConfig,
    #[serde(default)]
    pub output: OutputConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GeneralConfig {
    /// Default number of threads to use
    #[serde(default = "default_threads")]
    pub threads: usize,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ReferenceConfig {
    /// Reference domain definitions CSV
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub definitions: Option<PathBuf>,

    /// Blacklisted reference chains CSV
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub blacklist: Option<PathBuf>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PartitionConfig {
    /// Minimum evidence length in residues
    #[serde(default = "default_min_domain_size")]
    pub min_domain_size: usize,

    /// Unclaimed fraction a candidate must exceed
    #[serde(default = "default_new_coverage")]
    pub new_coverage_threshold: f64,

    /// Claimed fraction a candidate must stay below
    #[serde(default = "default_old_coverage")]
    pub old_coverage_threshold: f64,

    /// Neighbor distance allowed when classifying gaps
    #[serde(default = "default_neighbor_tolerance")]
    pub neighbor_tolerance: u32,

    /// Largest overlap resolved between accepted domains
    #[serde(default = "default_max_overlap")]
    pub max_overlap: usize,

    /// Mapped residues required per decomposed reference domain
    #[serde(default = "default_min_mapped_positions")]
    pub min_mapped_positions: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QualityConfig {
    /// Apply per-type quality thresholds before selection
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Thresholds keyed by evidence type
    #[serde(default = "default_thresholds")]
    pub thresholds: BTreeMap<String, TypeThresholds>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OutputConfig {
    /// Pretty-print result JSON
    #[serde(default = "default_true")]
    pub pretty: bool,

    /// Include every supporting evidence item, not only the primary one
    #[serde(default)]
    pub include_evidence: bool,
}

// Default value functions
fn default_threads() -> usize { num_cpus::get() }
fn default_true() -> bool { true }
fn default_min_domain_size() -> usize { PartitionParams::default().min_domain_size }
fn default_new_coverage() -> f64 { PartitionParams::default().new_coverage_threshold }
fn default_old_coverage() -> f64 { PartitionParams::default().old_coverage_threshold }
fn default_neighbor_tolerance() -> u32 { PartitionParams::default().neighbor_tolerance }
fn default_max_overlap() -> usize { PartitionParams::default().max_overlap }
fn default_min_mapped_positions() -> usize { PartitionParams::default().min_mapped_positions }

fn default_thresholds() -> BTreeMap<String, TypeThresholds> {
    QualityThresholds::default()
        .iter()
        .map(|(kind, thresholds)| (kind.as_str().to_string(), *thresholds))
        .collect()
}

impl Default for GeneralConfig {
    fn default() -> Self {
        Self { threads: default_threads() }
    }
}

impl Default for PartitionConfig {
    fn default() -> Self {
        Self {
            min_domain_size: default_min_domain_size(),
            new_coverage_threshold: default_new_coverage(),
            old_coverage_threshold: default_old_coverage(),
            neighbor_tolerance: default_neighbor_tolerance(),
            max_overlap: default_max_overlap(),
            min_mapped_positions: default_min_mapped_positions(),
        }
    }
}

impl Default for QualityConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            thresholds: default_thresholds(),
        }
    }
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            pretty: true,
            include_evidence: false,
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            general: GeneralConfig::default(),
            references: ReferenceConfig::default(),
            partition: PartitionConfig::default(),
            quality: QualityConfig::default(),
            output: OutputConfig::default(),
        }
    }
}

impl Config {
    /// Load configuration from file or use defaults
    pub fn load(config_path: Option<&Path>) -> Result<Self> {
        let config = match config_path {
            Some(path) => {
                log::info!("Loading configuration from: {}", path.display());
                Self::load_from_file(path)?
            }
            None => {
                let default_path = PathBuf::from("dompart.toml");
                if default_path.exists() {
                    log::info!("Loading configuration from: dompart.toml");
                    Self::load_from_file(&default_path)?
                } else {
                    log::debug!("Using default configuration");
                    Self::default()
                }
            }
        };

        Ok(config)
    }

    /// Load configuration from a specific TOML file
    pub fn load_from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read configuration file: {}", path.display()))?;

        let config: Config = toml::from_str(&content)
            .with_context(|| format!("Failed to parse configuration file: {}", path.display()))?;

        Ok(config)
    }

    /// Save configuration to a TOML file
    pub fn save_to_file(&self, path: &Path) -> Result<()> {
        let content = toml::to_string_pretty(self).context("Failed to serialize configuration")?;

        std::fs::write(path, content)
            .with_context(|| format!("Failed to write configuration file: {}", path.display()))?;

        Ok(())
    }

    /// Generate example configuration file content
    pub fn example_toml() -> CliResult<String> {
        Ok(toml::to_string_pretty(&Self::default())?)
    }

    /// Quality threshold table with evidence types resolved
    pub fn quality_thresholds(&self) -> CliResult<QualityThresholds> {
        let mut table = QualityThresholds::empty();
        for (name, thresholds) in &self.quality.thresholds {
            let kind: EvidenceType = name
                .parse()
                .map_err(|e| CliError::config(format!("[quality.thresholds] {}", e)))?;
            table.set(kind, *thresholds);
        }
        Ok(table)
    }

    /// Partitioner parameters described by this configuration
    pub fn partition_params(&self) -> CliResult<PartitionParams> {
        let p = &self.partition;
        if !(0.0..=1.0).contains(&p.new_coverage_threshold)
            || !(0.0..=1.0).contains(&p.old_coverage_threshold)
        {
            return Err(CliError::config(
                "coverage thresholds must lie between 0 and 1",
            ));
        }

        Ok(PartitionParams {
            min_domain_size: p.min_domain_size,
            new_coverage_threshold: p.new_coverage_threshold,
            old_coverage_threshold: p.old_coverage_threshold,
            neighbor_tolerance: p.neighbor_tolerance,
            max_overlap: p.max_overlap,
            min_mapped_positions: p.min_mapped_positions,
            apply_quality_thresholds: self.quality.enabled,
            quality: self.quality_thresholds()?,
        })
    }
}
