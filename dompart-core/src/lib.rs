//! Domain partitioning core library
//!
//! Sequence ranges, evidence ranking, chain BLAST decomposition, residue-level
//! domain selection and boundary optimization for splitting a protein chain
//! into structural domains.

pub mod range;
pub mod evidence;
pub mod confidence;
pub mod quality;
pub mod reference;
pub mod decompose;
pub mod domain;
pub mod gap;
pub mod layout;
pub mod optimizer;
pub mod partition;

// Re-export commonly used types and functions
pub use range::{Position, RangeError, RangeResult, Segment, SequenceRange};
pub use evidence::{sort_by_priority, AlignmentData, Evidence, EvidenceType};
pub use confidence::{calculate_confidence, ConfidenceFactors};
pub use quality::{QualityRejection, QualityThresholds, TypeThresholds};
pub use reference::{Classification, ReferenceDefinitions, ReferenceDomain, ReferenceKey};
pub use decompose::{DecomposeError, DecomposeParams, Decomposer};
pub use domain::{AssessmentLevel, Domain, QualityAssessment};
pub use gap::{discover_gaps, FragmentSize, GapSummary, SegmentType, UnassignedSegment};
pub use layout::{CoverageStats, DomainLayout, LayoutError};
pub use optimizer::{
    nearest_domain, BoundaryOptimizer, BoundaryResolver, OptimizationStats, OptimizerParams,
    SequenceBoundaryResolver,
};
pub use partition::{
    PartitionError, PartitionOutcome, PartitionParams, PartitionReport, PartitionResult,
    Partitioner, PhaseStats,
};

/// Version information for the partitioning core library
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
