//! Sequence range algebra
//!
//! Single-chain, multi-chain and discontinuous residue ranges. A range is a
//! sorted, non-empty list of inclusive segments. Its string form
//! (`"2-135,207-248"`, `"A:1-10,B:15-20"`) is the canonical representation
//! and round-trips through [`SequenceRange::parse`].

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// 1-based residue position
pub type Position = u32;

/// Errors that can occur while building or converting ranges
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RangeError {
    #[error("Empty range")]
    Empty,

    #[error("Invalid segment: start {start} > end {end}")]
    InvalidSegment { start: i64, end: i64 },

    #[error("Invalid segment: start {0} < 1")]
    StartBelowOne(i64),

    #[error("Invalid number in range segment: {0}")]
    InvalidNumber(String),

    #[error("Invalid chain format: {0}")]
    InvalidChain(String),

    #[error("Cannot mix chain-tagged and untagged segments")]
    MixedChains,

    #[error("Cannot convert multi-chain range to simple positions")]
    MultiChain,

    #[error("No structured positions found in range")]
    NoStructuredPositions,
}

pub type RangeResult<T> = Result<T, RangeError>;

/// A single continuous, inclusive run of residues
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Segment {
    start: Position,
    end: Position,
    chain: Option<String>,
}

impl Segment {
    pub fn new(start: Position, end: Position, chain: Option<String>) -> RangeResult<Self> {
        Self::checked(i64::from(start), i64::from(end), chain)
    }

    fn checked(start: i64, end: i64, chain: Option<String>) -> RangeResult<Self> {
        if start > end {
            return Err(RangeError::InvalidSegment { start, end });
        }
        if start < 1 {
            return Err(RangeError::StartBelowOne(start));
        }
        let to_pos = |v: i64| {
            Position::try_from(v).map_err(|_| RangeError::InvalidNumber(v.to_string()))
        };
        Ok(Self {
            start: to_pos(start)?,
            end: to_pos(end)?,
            chain,
        })
    }

    pub fn start(&self) -> Position {
        self.start
    }

    pub fn end(&self) -> Position {
        self.end
    }

    pub fn chain(&self) -> Option<&str> {
        self.chain.as_deref()
    }

    /// Number of residues in this segment
    pub fn length(&self) -> usize {
        (self.end - self.start) as usize + 1
    }

    pub fn contains(&self, position: Position, chain: Option<&str>) -> bool {
        self.start <= position && position <= self.end && self.chain() == chain
    }

    /// Segments on different chains never overlap
    pub fn overlaps(&self, other: &Segment) -> bool {
        self.chain == other.chain && !(self.end < other.start || other.end < self.start)
    }

    /// Residues strictly between two same-chain, non-overlapping segments.
    ///
    /// Returns `None` for different chains or overlapping segments, `Some(0)`
    /// for adjacent ones.
    pub fn gap_to(&self, other: &Segment) -> Option<u32> {
        if self.chain != other.chain || self.overlaps(other) {
            return None;
        }
        if self.end < other.start {
            Some(other.start - self.end - 1)
        } else {
            Some(self.start - other.end - 1)
        }
    }

    /// Smallest segment covering both; chains must match.
    pub fn merge_with(&self, other: &Segment) -> Option<Segment> {
        if self.chain != other.chain {
            return None;
        }
        Some(Segment {
            start: self.start.min(other.start),
            end: self.end.max(other.end),
            chain: self.chain.clone(),
        })
    }

    pub fn positions(&self) -> std::ops::RangeInclusive<Position> {
        self.start..=self.end
    }

    fn sort_key(&self) -> (&str, Position, Position) {
        (self.chain().unwrap_or(""), self.start, self.end)
    }

    fn parse(text: &str) -> RangeResult<Self> {
        let (chain, body) = match text.split_once(':') {
            Some((chain, body)) => {
                if !is_valid_chain(chain) || body.is_empty() {
                    return Err(RangeError::InvalidChain(text.to_string()));
                }
                (Some(chain.to_string()), body)
            }
            None => (None, text),
        };

        // Only the first dash separates start and end
        let (start, end) = match body.split_once('-') {
            Some((start, end)) => (parse_number(start, text)?, parse_number(end, text)?),
            None => {
                let pos = parse_number(body, text)?;
                (pos, pos)
            }
        };

        Self::checked(start, end, chain)
    }
}

impl fmt::Display for Segment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.chain {
            Some(chain) => write!(f, "{}:{}-{}", chain, self.start, self.end),
            None => write!(f, "{}-{}", self.start, self.end),
        }
    }
}

fn is_valid_chain(chain: &str) -> bool {
    !chain.is_empty() && chain.chars().all(|c| c.is_ascii_alphanumeric() || c == '_')
}

fn parse_number(value: &str, segment: &str) -> RangeResult<i64> {
    value
        .trim()
        .parse::<i64>()
        .map_err(|_| RangeError::InvalidNumber(segment.to_string()))
}

/// Sorted, non-empty list of segments
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct SequenceRange {
    segments: Vec<Segment>,
}

impl SequenceRange {
    /// Build a range from segments, sorting by chain then position.
    pub fn new(mut segments: Vec<Segment>) -> RangeResult<Self> {
        if segments.is_empty() {
            return Err(RangeError::Empty);
        }

        let tagged = segments.iter().filter(|s| s.chain.is_some()).count();
        if tagged != 0 && tagged != segments.len() {
            return Err(RangeError::MixedChains);
        }

        segments.sort_by(|a, b| a.sort_key().cmp(&b.sort_key()));
        Ok(Self { segments })
    }

    /// Parse `"1-10,15-20"`, `"A:1-10,B:15-20"`, `"5"` or `"A:5"`.
    pub fn parse(text: &str) -> RangeResult<Self> {
        let text = text.trim();
        if text.is_empty() {
            return Err(RangeError::Empty);
        }

        let segments = text
            .split(',')
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(Segment::parse)
            .collect::<RangeResult<Vec<_>>>()?;

        Self::new(segments)
    }

    /// Minimal range covering `positions`; duplicates are ignored.
    pub fn from_positions<I>(positions: I, chain: Option<&str>) -> RangeResult<Self>
    where
        I: IntoIterator<Item = Position>,
    {
        let unique: BTreeSet<Position> = positions.into_iter().collect();
        let mut iter = unique.into_iter();
        let first = iter.next().ok_or(RangeError::Empty)?;
        let chain = chain.map(str::to_string);

        let mut segments = Vec::new();
        let (mut start, mut end) = (first, first);
        for pos in iter {
            if pos == end + 1 {
                end = pos;
            } else {
                segments.push(Segment::new(start, end, chain.clone())?);
                start = pos;
                end = pos;
            }
        }
        segments.push(Segment::new(start, end, chain)?);

        Self::new(segments)
    }

    pub fn segments(&self) -> &[Segment] {
        &self.segments
    }

    /// Every position paired with its chain
    pub fn to_positions(&self) -> Vec<(Position, Option<&str>)> {
        self.segments
            .iter()
            .flat_map(|seg| seg.positions().map(move |pos| (pos, seg.chain())))
            .collect()
    }

    /// Flatten to bare positions; only defined for untagged ranges.
    pub fn to_positions_simple(&self) -> RangeResult<Vec<Position>> {
        if self.is_multi_chain() {
            return Err(RangeError::MultiChain);
        }
        Ok(self.segments.iter().flat_map(Segment::positions).collect())
    }

    pub fn position_set(&self) -> RangeResult<BTreeSet<Position>> {
        self.to_positions_simple().map(|p| p.into_iter().collect())
    }

    /// True when segments carry chain tags
    pub fn is_multi_chain(&self) -> bool {
        self.segments.iter().any(|s| s.chain.is_some())
    }

    pub fn is_discontinuous(&self) -> bool {
        self.segments.len() > 1
    }

    pub fn chains(&self) -> BTreeSet<Option<&str>> {
        self.segments.iter().map(Segment::chain).collect()
    }

    pub fn total_length(&self) -> usize {
        self.segments.iter().map(Segment::length).sum()
    }

    /// Overall first and last position, ignoring gaps
    pub fn span(&self) -> (Position, Position) {
        (self.start_position(), self.end_position())
    }

    /// Lowest start over all segments
    pub fn start_position(&self) -> Position {
        self.segments.iter().map(|s| s.start).min().unwrap_or_default()
    }

    /// Highest end over all segments; segments may nest or overlap.
    pub fn end_position(&self) -> Position {
        self.segments.iter().map(|s| s.end).max().unwrap_or_default()
    }

    pub fn contains(&self, position: Position, chain: Option<&str>) -> bool {
        self.segments.iter().any(|s| s.contains(position, chain))
    }

    pub fn contains_position(&self, position: Position) -> bool {
        self.contains(position, None)
    }

    /// Fraction of this range covered by `other`, in [0, 1].
    pub fn coverage(&self, other: &SequenceRange) -> f64 {
        let own: BTreeSet<_> = self.to_positions().into_iter().collect();
        if own.is_empty() {
            return 0.0;
        }
        let theirs: BTreeSet<_> = other.to_positions().into_iter().collect();
        own.intersection(&theirs).count() as f64 / own.len() as f64
    }

    pub fn overlaps(&self, other: &SequenceRange) -> bool {
        self.segments
            .iter()
            .any(|a| other.segments.iter().any(|b| a.overlaps(b)))
    }

    /// Merge same-chain segments separated by at most `tolerance` residues.
    ///
    /// Overlapping segments are always merged.
    pub fn merge_gaps(&self, tolerance: u32) -> SequenceRange {
        if self.segments.len() <= 1 {
            return self.clone();
        }

        let mut by_chain: BTreeMap<Option<&str>, Vec<&Segment>> = BTreeMap::new();
        for segment in &self.segments {
            by_chain.entry(segment.chain()).or_default().push(segment);
        }

        let mut merged = Vec::with_capacity(self.segments.len());
        for (_, mut segments) in by_chain {
            segments.sort_by_key(|s| (s.start, s.end));
            let mut current = segments[0].clone();
            for next in &segments[1..] {
                let mergeable = match current.gap_to(next) {
                    Some(gap) => gap <= tolerance,
                    None => current.overlaps(next),
                };
                match current.merge_with(next) {
                    Some(joined) if mergeable => {
                        log::trace!("Merged {} and {} into {}", current, next, joined);
                        current = joined;
                    }
                    _ => {
                        merged.push(current);
                        current = (*next).clone();
                    }
                }
            }
            merged.push(current);
        }

        // Segments came from a valid range, so the invariants still hold
        merged.sort_by(|a, b| a.sort_key().cmp(&b.sort_key()));
        SequenceRange { segments: merged }
    }

    /// Restrict the range to positions with observed structure.
    pub fn map_to_structured(
        &self,
        structured: &BTreeSet<Position>,
        chain: Option<&str>,
    ) -> RangeResult<SequenceRange> {
        let multi = self.is_multi_chain();
        if multi && chain.is_none() {
            return Err(RangeError::MultiChain);
        }

        let mapped: Vec<Position> = self
            .to_positions()
            .into_iter()
            .filter(|(pos, pos_chain)| (!multi || *pos_chain == chain) && structured.contains(pos))
            .map(|(pos, _)| pos)
            .collect();

        if mapped.is_empty() {
            return Err(RangeError::NoStructuredPositions);
        }
        SequenceRange::from_positions(mapped, chain)
    }
}

impl fmt::Display for SequenceRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, segment) in self.segments.iter().enumerate() {
            if i > 0 {
                f.write_str(",")?;
            }
            write!(f, "{}", segment)?;
        }
        Ok(())
    }
}

impl FromStr for SequenceRange {
    type Err = RangeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl From<Segment> for SequenceRange {
    fn from(segment: Segment) -> Self {
        SequenceRange {
            segments: vec![segment],
        }
    }
}

impl TryFrom<String> for SequenceRange {
    type Error = RangeError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<SequenceRange> for String {
    fn from(range: SequenceRange) -> Self {
        range.to_string()
    }
}
