//! Catalog entities: products, raw materials, recipes, operators,
//! production lines and shifts.
//!
//! Catalogs are read-only from the traceability component's perspective
//! (operator bulk import excepted); they are maintained through the
//! plant administration tooling.

use chrono::{DateTime, NaiveTime, Utc};
use serde::{Deserialize, Serialize};

use super::common::{LineId, OperatorId, ShiftId};

/// A manufactured product, keyed by its natural plant code (e.g. "410")
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Product {
    pub code: String,
    pub name: String,
    pub description: Option<String>,
    pub active: bool,
}

/// A raw material from the plant catalog (e.g. "LAC0001")
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RawMaterial {
    pub code: String,
    pub name: String,
    /// Default unit of measure used when a usage entry omits one
    pub unit: String,
    /// Whether consuming this material requires recording a supplier lot
    pub lot_required: bool,
    pub active: bool,
}

/// One line of a product's recipe: which material it expects, in which
/// position on the traceability form
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecipeLine {
    pub product_code: String,
    pub material_code: String,
    pub position: u32,
    pub active: bool,
}

/// A plant worker, identified by a short worker code
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Operator {
    pub id: OperatorId,
    pub code: String,
    pub first_name: String,
    pub last_name: String,
    pub active: bool,
    pub imported_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Operator {
    /// Full display name
    pub fn full_name(&self) -> String {
        format!("{} {}", self.first_name, self.last_name)
    }
}

/// A production line in the plant
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProductionLine {
    pub id: LineId,
    pub name: String,
    pub description: Option<String>,
    pub active: bool,
}

/// A work shift (AM / Jornada / PM)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Shift {
    pub id: ShiftId,
    pub name: String,
    pub starts_at: NaiveTime,
    pub ends_at: NaiveTime,
    pub active: bool,
}
