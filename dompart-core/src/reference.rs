//! Reference domain definitions and ECOD classification
//!
//! Reference definitions map a matched target chain to the known domain
//! boundaries on that chain. They drive chain BLAST decomposition and
//! fill in classification for evidence that carries none.

use crate::evidence::Evidence;
use crate::range::SequenceRange;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::fmt;

/// Target chain identity: (source structure id, chain id).
///
/// Source ids are case-insensitive and stored lower-case.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ReferenceKey {
    pub source_id: String,
    pub chain: String,
}

impl ReferenceKey {
    pub fn new(source_id: &str, chain: &str) -> Self {
        Self {
            source_id: source_id.trim().to_lowercase(),
            chain: chain.trim().to_string(),
        }
    }
}

impl fmt::Display for ReferenceKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}_{}", self.source_id, self.chain)
    }
}

/// One known domain on a reference chain, in that chain's numbering
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReferenceDomain {
    pub domain_id: String,
    pub source_id: String,
    pub chain: String,
    pub range: SequenceRange,
    pub length: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub t_group: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub h_group: Option<String>,
}

impl ReferenceDomain {
    pub fn key(&self) -> ReferenceKey {
        ReferenceKey::new(&self.source_id, &self.chain)
    }
}

/// Reference domains grouped by target chain, each group sorted by start
#[derive(Debug, Clone, Default)]
pub struct ReferenceDefinitions {
    by_chain: BTreeMap<ReferenceKey, Vec<ReferenceDomain>>,
    by_domain_id: HashMap<String, ReferenceKey>,
}

impl ReferenceDefinitions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, domain: ReferenceDomain) {
        let key = domain.key();
        self.by_domain_id.insert(domain.domain_id.clone(), key.clone());
        let group = self.by_chain.entry(key).or_default();
        group.push(domain);
        group.sort_by(|a, b| {
            a.range
                .start_position()
                .cmp(&b.range.start_position())
                .then_with(|| a.domain_id.cmp(&b.domain_id))
        });
    }

    pub fn get(&self, key: &ReferenceKey) -> Option<&[ReferenceDomain]> {
        self.by_chain.get(key).map(Vec::as_slice)
    }

    pub fn contains(&self, key: &ReferenceKey) -> bool {
        self.by_chain.contains_key(key)
    }

    pub fn find_domain(&self, domain_id: &str) -> Option<&ReferenceDomain> {
        let key = self.by_domain_id.get(domain_id)?;
        self.by_chain
            .get(key)?
            .iter()
            .find(|d| d.domain_id == domain_id)
    }

    /// Drop a whole chain, returning how many domains it held.
    pub fn remove_chain(&mut self, key: &ReferenceKey) -> usize {
        match self.by_chain.remove(key) {
            Some(domains) => {
                for domain in &domains {
                    self.by_domain_id.remove(&domain.domain_id);
                }
                domains.len()
            }
            None => 0,
        }
    }

    pub fn num_chains(&self) -> usize {
        self.by_chain.len()
    }

    pub fn num_domains(&self) -> usize {
        self.by_chain.values().map(Vec::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.by_chain.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&ReferenceKey, &[ReferenceDomain])> {
        self.by_chain.iter().map(|(k, v)| (k, v.as_slice()))
    }
}

impl FromIterator<ReferenceDomain> for ReferenceDefinitions {
    fn from_iter<I: IntoIterator<Item = ReferenceDomain>>(iter: I) -> Self {
        let mut defs = Self::new();
        for domain in iter {
            defs.insert(domain);
        }
        defs
    }
}

/// ECOD hierarchy levels: X-group, H-group (`x.h`), T-group (`x.h.t`)
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Classification {
    pub x_group: Option<String>,
    pub h_group: Option<String>,
    pub t_group: Option<String>,
}

impl Classification {
    /// Split a dotted T-group id into its hierarchy levels.
    pub fn from_t_group(t_group: &str) -> Self {
        let parts: Vec<&str> = t_group
            .trim()
            .split('.')
            .filter(|p| !p.is_empty())
            .collect();

        match parts.as_slice() {
            [] => Self::default(),
            [x] => Self {
                x_group: Some(x.to_string()),
                ..Self::default()
            },
            [x, h] => Self {
                x_group: Some(x.to_string()),
                h_group: Some(format!("{}.{}", x, h)),
                t_group: None,
            },
            [x, h, t, ..] => Self {
                x_group: Some(x.to_string()),
                h_group: Some(format!("{}.{}", x, h)),
                t_group: Some(format!("{}.{}.{}", x, h, t)),
            },
        }
    }

    pub fn is_classified(&self) -> bool {
        self.x_group.is_some() || self.h_group.is_some() || self.t_group.is_some()
    }
}

/// Classification for evidence: its own T-group, then the reference entry
/// for its domain id, then its own H-group alone.
pub fn classify_evidence(
    evidence: &Evidence,
    references: Option<&ReferenceDefinitions>,
) -> Classification {
    if let Some(t_group) = evidence.t_group.as_deref().filter(|t| !t.is_empty()) {
        return Classification::from_t_group(t_group);
    }

    let reference_t_group = evidence
        .domain_id
        .as_deref()
        .zip(references)
        .and_then(|(id, refs)| refs.find_domain(id))
        .and_then(|r| r.t_group.as_deref());
    if let Some(t_group) = reference_t_group {
        return Classification::from_t_group(t_group);
    }

    if let Some(h_group) = evidence.h_group.as_deref().filter(|h| !h.is_empty()) {
        return Classification {
            h_group: Some(h_group.to_string()),
            ..Classification::default()
        };
    }

    Classification::default()
}

/// Family label: T-group, source id, reference domain id, or "unclassified".
pub fn family_label(evidence: &Evidence, classification: &Classification) -> String {
    classification
        .t_group
        .clone()
        .or_else(|| Some(evidence.source_id.clone()).filter(|s| !s.is_empty()))
        .or_else(|| evidence.domain_id.clone())
        .unwrap_or_else(|| "unclassified".to_string())
}
