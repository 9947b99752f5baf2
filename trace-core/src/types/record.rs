//! Traceability record aggregate.
//!
//! One record per finished task, capturing what was produced, which raw
//! material lots went in, rework and waste with their causes, who
//! actually worked the shift, and the dual sign-off trail.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::common::{OperatorId, RecordId, TaskId, UserId};

/// Disposition state of a traceability record
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RecordState {
    UnderReview,
    Released,
    Retained,
}

impl RecordState {
    /// Stable wire name
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::UnderReview => "under_review",
            Self::Released => "released",
            Self::Retained => "retained",
        }
    }

    /// Legal transitions: review resolves to released or retained, and
    /// quality control may correct one disposition to the other. Nothing
    /// goes back to under_review.
    pub fn can_transition_to(&self, target: RecordState) -> bool {
        match (self, target) {
            (Self::UnderReview, Self::Released) | (Self::UnderReview, Self::Retained) => true,
            (Self::Released, Self::Retained) | (Self::Retained, Self::Released) => true,
            _ => false,
        }
    }
}

/// Sign-off kind; one signature of each kind fully endorses a record
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SignatureKind {
    Supervisor,
    QualityControl,
}

impl SignatureKind {
    /// Stable wire name
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Supervisor => "supervisor",
            Self::QualityControl => "quality_control",
        }
    }
}

/// An immutable sign-off entry
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Signature {
    pub kind: SignatureKind,
    pub user_id: UserId,
    pub signed_at: DateTime<Utc>,
}

/// Causal category for rework and waste quantities
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Cause {
    Breakage,
    Sealing,
    Tempering,
    Labeling,
    Expiry,
    /// Free-text escape category; the payload is the description
    Other(String),
}

/// A rework or waste quantity tagged with its cause
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CauseEntry {
    pub quantity: u32,
    pub cause: Cause,
}

/// Consumption of one raw material during the run
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MaterialUsage {
    pub material_code: String,
    /// Supplier lot; mandatory when the catalog flags the material as
    /// lot-required
    pub lot: Option<String>,
    pub quantity: u32,
    pub unit: String,
    pub rework: Vec<CauseEntry>,
    pub waste: Vec<CauseEntry>,
}

/// Reference to an uploaded label photograph; bytes live in media
/// storage, the record only keeps the pointer
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PhotoRef {
    pub url: String,
    pub content_type: Option<String>,
    pub size_bytes: u64,
}

/// The traceability record aggregate
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TraceabilityRecord {
    pub id: RecordId,
    /// Owning finished task, one-to-one
    pub task_id: TaskId,
    pub product_code: String,
    pub quantity_produced: u32,
    /// Ordinal day (1-366) of the task's reference date, fixed at creation
    pub day_of_year: u16,
    /// `{product}-{day_of_year}-{operator}`; the middle segment never
    /// changes after creation
    pub lot_code: String,
    pub state: RecordState,
    /// Required non-empty exactly when state is `Retained`
    pub retention_reason: Option<String>,
    pub label_photo: Option<PhotoRef>,
    pub materials: Vec<MaterialUsage>,
    /// Who actually worked the shift; independent of the task's nominal
    /// assignment
    pub actual_operator_ids: Vec<OperatorId>,
    pub signatures: Vec<Signature>,
    pub notes: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl TraceabilityRecord {
    /// An existing signature of the given kind, if any
    pub fn signature_of(&self, kind: SignatureKind) -> Option<&Signature> {
        self.signatures.iter().find(|s| s.kind == kind)
    }

    /// True iff both a supervisor and a quality-control signature exist
    pub fn signatures_complete(&self) -> bool {
        self.signature_of(SignatureKind::Supervisor).is_some()
            && self.signature_of(SignatureKind::QualityControl).is_some()
    }
}
