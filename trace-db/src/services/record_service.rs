//! Traceability record service.
//!
//! Owns the record lifecycle: creation against a finished task, aggregate
//! updates while under review, the quality-control disposition
//! transitions and the dual sign-off.

use chrono::Utc;
use std::collections::HashSet;
use std::sync::Arc;

use trace_core::lot::{build_lot_code, lot_reference_date, rebuild_lot_code};
use trace_core::types::{
    Actor, Cause, CauseEntry, MaterialUsage, PhotoRef, RecordId, RecordState, Role, Signature,
    SignatureKind, TaskId, TaskStatus, TraceabilityRecord,
};
use trace_core::validation::{require_non_empty, validate_label_photo};
use trace_core::{TraceError, TraceResult};

use crate::services::CatalogService;
use crate::store::{RecordFilter, TraceStore};

/// One rework or waste line in a record request
#[derive(Debug, Clone)]
pub struct NewCauseEntry {
    pub quantity: u32,
    pub cause: Cause,
}

/// One material consumption line in a record request
#[derive(Debug, Clone)]
pub struct NewMaterialUsage {
    pub material_code: String,
    pub lot: Option<String>,
    pub quantity: u32,
    /// Defaults to the catalog unit when omitted
    pub unit: Option<String>,
    pub rework: Vec<NewCauseEntry>,
    pub waste: Vec<NewCauseEntry>,
}

/// Request to open a traceability record for a task
#[derive(Debug, Clone)]
pub struct NewRecord {
    pub task_id: TaskId,
    pub quantity_produced: u32,
    /// Operator code stamped into the lot's last segment
    pub operator_code_for_lot: String,
    pub actual_operator_codes: Vec<String>,
    pub materials: Vec<NewMaterialUsage>,
    pub notes: Option<String>,
}

/// Request to amend a record still under review.
///
/// Material usages and the actual-worker set are replaced wholesale when
/// supplied.
#[derive(Debug, Clone, Default)]
pub struct UpdateRecord {
    pub quantity_produced: Option<u32>,
    /// Regenerates the lot's last segment via the deriver
    pub operator_code_for_lot: Option<String>,
    /// Never accepted; the day segment is fixed at creation
    pub day_of_year: Option<u16>,
    pub actual_operator_codes: Option<Vec<String>>,
    pub materials: Option<Vec<NewMaterialUsage>>,
    pub notes: Option<String>,
    pub label_photo: Option<PhotoRef>,
}

/// Traceability record lifecycle
pub struct RecordService {
    store: Arc<dyn TraceStore>,
    catalog: Arc<CatalogService>,
}

impl RecordService {
    pub fn new(store: Arc<dyn TraceStore>, catalog: Arc<CatalogService>) -> Self {
        Self { store, catalog }
    }

    /// Open the record for a task.
    ///
    /// A task still in progress is finished here, in the same storage
    /// transaction that inserts the record. A task that never ran cannot
    /// be documented.
    pub async fn create(&self, input: NewRecord, actor: &Actor) -> TraceResult<TraceabilityRecord> {
        if input.quantity_produced < 1 {
            return Err(TraceError::validation(
                "Produced quantity must be at least 1",
            ));
        }

        let mut task = self
            .store
            .get_task(&input.task_id)
            .await?
            .ok_or_else(|| TraceError::not_found("Task", input.task_id.to_string()))?;

        let now = Utc::now();
        match task.status {
            TaskStatus::Pending => {
                return Err(TraceError::validation(
                    "Task never started; nothing to document",
                ));
            }
            TaskStatus::InProgress => {
                task.finish(now)?;
            }
            TaskStatus::Finished => {}
        }

        let day = trace_core::lot::day_of_year(lot_reference_date(&task));
        let lot_code = build_lot_code(&task.product_code, day, &input.operator_code_for_lot)?;

        let workers = self
            .catalog
            .resolve_operators(&input.actual_operator_codes)
            .await?;
        let materials = self.build_materials(input.materials).await?;

        let record = TraceabilityRecord {
            id: RecordId::new(),
            task_id: task.id,
            product_code: task.product_code.clone(),
            quantity_produced: input.quantity_produced,
            day_of_year: day,
            lot_code,
            state: RecordState::UnderReview,
            retention_reason: None,
            label_photo: None,
            materials,
            actual_operator_ids: workers.iter().map(|o| o.id).collect(),
            signatures: Vec::new(),
            notes: input.notes,
            created_at: now,
            updated_at: now,
        };

        self.store.insert_record(&record, &task).await?;
        tracing::info!(
            record_id = %record.id,
            task_id = %task.id,
            lot = %record.lot_code,
            actor = %actor.user_id,
            "Traceability record opened"
        );
        Ok(record)
    }

    /// Amend a record that is still under review
    pub async fn update(
        &self,
        id: &RecordId,
        input: UpdateRecord,
        actor: &Actor,
    ) -> TraceResult<TraceabilityRecord> {
        if input.day_of_year.is_some() {
            return Err(TraceError::validation(
                "The day-of-year segment is fixed at creation and cannot be changed",
            ));
        }

        // Re-read and retry when a concurrent writer (a signature append)
        // bumps the aggregate between our read and the conditional replace.
        loop {
            let mut record = self.get(id).await?;
            if record.state != RecordState::UnderReview {
                return Err(TraceError::validation(format!(
                    "Only records under review can be amended (current state: {})",
                    record.state.as_str()
                )));
            }

            let changes = input.clone();
            if let Some(quantity) = changes.quantity_produced {
                if quantity < 1 {
                    return Err(TraceError::validation(
                        "Produced quantity must be at least 1",
                    ));
                }
                record.quantity_produced = quantity;
            }
            if let Some(code) = changes.operator_code_for_lot {
                record.lot_code = rebuild_lot_code(&record.lot_code, &code)?;
            }
            if let Some(codes) = changes.actual_operator_codes {
                let workers = self.catalog.resolve_operators(&codes).await?;
                record.actual_operator_ids = workers.iter().map(|o| o.id).collect();
            }
            if let Some(materials) = changes.materials {
                record.materials = self.build_materials(materials).await?;
            }
            if let Some(notes) = changes.notes {
                record.notes = if notes.trim().is_empty() {
                    None
                } else {
                    Some(notes)
                };
            }
            if let Some(photo) = changes.label_photo {
                validate_label_photo(&photo)?;
                record.label_photo = Some(photo);
            }

            let base_updated_at = record.updated_at;
            record.updated_at = Utc::now();
            match self.store.replace_record(&record, base_updated_at).await {
                Ok(()) => {
                    tracing::debug!(record_id = %id, actor = %actor.user_id, "Record amended");
                    return Ok(record);
                }
                Err(TraceError::Conflict(_)) => continue,
                Err(e) => return Err(e),
            }
        }
    }

    /// Quality-control disposition change.
    ///
    /// Retaining requires a reason; releasing clears any previous one.
    pub async fn transition(
        &self,
        id: &RecordId,
        target: RecordState,
        retention_reason: Option<String>,
        actor: &Actor,
    ) -> TraceResult<TraceabilityRecord> {
        if actor.role != Role::QualityControl {
            return Err(TraceError::permission(
                "Only quality control can change a record's disposition",
            ));
        }

        loop {
            let mut record = self.get(id).await?;
            if !record.state.can_transition_to(target) {
                return Err(TraceError::validation(format!(
                    "Cannot transition a record from {} to {}",
                    record.state.as_str(),
                    target.as_str()
                )));
            }

            match target {
                RecordState::Retained => {
                    let reason =
                        require_non_empty(retention_reason.as_deref(), "Retention reason")?;
                    record.retention_reason = Some(reason);
                }
                RecordState::Released => {
                    record.retention_reason = None;
                }
                RecordState::UnderReview => unreachable!("rejected by can_transition_to"),
            }

            let previous = record.state;
            record.state = target;
            let base_updated_at = record.updated_at;
            record.updated_at = Utc::now();
            match self.store.replace_record(&record, base_updated_at).await {
                Ok(()) => {
                    tracing::info!(
                        record_id = %id,
                        from = previous.as_str(),
                        to = target.as_str(),
                        actor = %actor.user_id,
                        "Record disposition changed"
                    );
                    return Ok(record);
                }
                Err(TraceError::Conflict(_)) => continue,
                Err(e) => return Err(e),
            }
        }
    }

    /// Add one sign-off. The signer's role must match the signature kind,
    /// and the storage layer rejects a second signature of the same kind.
    pub async fn sign(
        &self,
        id: &RecordId,
        kind: SignatureKind,
        actor: &Actor,
    ) -> TraceResult<TraceabilityRecord> {
        let required = match kind {
            SignatureKind::Supervisor => Role::Supervisor,
            SignatureKind::QualityControl => Role::QualityControl,
        };
        if actor.role != required {
            return Err(TraceError::permission(format!(
                "A {} signature requires the {} role",
                kind.as_str(),
                required.as_str()
            )));
        }

        let signature = Signature {
            kind,
            user_id: actor.user_id,
            signed_at: Utc::now(),
        };
        let record = self.store.append_signature(id, signature).await?;
        tracing::info!(
            record_id = %id,
            kind = kind.as_str(),
            actor = %actor.user_id,
            complete = record.signatures_complete(),
            "Record signed"
        );
        Ok(record)
    }

    /// True iff both the supervisor and quality-control signatures exist
    pub async fn signatures_complete(&self, id: &RecordId) -> TraceResult<bool> {
        Ok(self.get(id).await?.signatures_complete())
    }

    /// Attach or replace the label photo reference
    pub async fn attach_label_photo(
        &self,
        id: &RecordId,
        photo: PhotoRef,
        actor: &Actor,
    ) -> TraceResult<TraceabilityRecord> {
        validate_label_photo(&photo)?;

        loop {
            let mut record = self.get(id).await?;
            record.label_photo = Some(photo.clone());
            let base_updated_at = record.updated_at;
            record.updated_at = Utc::now();
            match self.store.replace_record(&record, base_updated_at).await {
                Ok(()) => {
                    tracing::debug!(record_id = %id, actor = %actor.user_id, "Label photo attached");
                    return Ok(record);
                }
                Err(TraceError::Conflict(_)) => continue,
                Err(e) => return Err(e),
            }
        }
    }

    pub async fn get(&self, id: &RecordId) -> TraceResult<TraceabilityRecord> {
        self.store
            .get_record(id)
            .await?
            .ok_or_else(|| TraceError::not_found("Record", id.to_string()))
    }

    pub async fn get_by_task(&self, task_id: &TaskId) -> TraceResult<TraceabilityRecord> {
        self.store
            .get_record_by_task(task_id)
            .await?
            .ok_or_else(|| TraceError::not_found("Record", task_id.to_string()))
    }

    pub async fn list(&self, filter: &RecordFilter) -> TraceResult<Vec<TraceabilityRecord>> {
        self.store.list_records(filter).await
    }

    /// Resolve and validate the material-usage lines of a request.
    ///
    /// Unknown material codes are collected and reported together.
    async fn build_materials(
        &self,
        inputs: Vec<NewMaterialUsage>,
    ) -> TraceResult<Vec<MaterialUsage>> {
        let mut seen: HashSet<String> = HashSet::new();
        let mut missing: Vec<String> = Vec::new();
        let mut usages = Vec::with_capacity(inputs.len());

        for input in inputs {
            if !seen.insert(input.material_code.clone()) {
                return Err(TraceError::validation(format!(
                    "Material {} appears more than once in the record",
                    input.material_code
                )));
            }
            if input.quantity < 1 {
                return Err(TraceError::validation(format!(
                    "Quantity for material {} must be at least 1",
                    input.material_code
                )));
            }

            let material = match self.store.get_material(&input.material_code).await? {
                Some(m) => m,
                None => {
                    missing.push(input.material_code);
                    continue;
                }
            };

            if material.lot_required && input.lot.as_deref().map_or(true, |l| l.trim().is_empty()) {
                return Err(TraceError::validation(format!(
                    "Material {} requires a supplier lot",
                    material.code
                )));
            }

            let rework = build_cause_entries(input.rework, &material.code, "rework")?;
            let waste = build_cause_entries(input.waste, &material.code, "waste")?;

            usages.push(MaterialUsage {
                material_code: material.code,
                lot: input.lot.map(|l| l.trim().to_string()).filter(|l| !l.is_empty()),
                quantity: input.quantity,
                unit: input.unit.unwrap_or(material.unit),
                rework,
                waste,
            });
        }

        if !missing.is_empty() {
            missing.sort();
            return Err(TraceError::UnknownCodes {
                entity: "material",
                codes: missing,
            });
        }

        Ok(usages)
    }
}

fn build_cause_entries(
    inputs: Vec<NewCauseEntry>,
    material_code: &str,
    kind: &str,
) -> TraceResult<Vec<CauseEntry>> {
    inputs
        .into_iter()
        .map(|entry| {
            if entry.quantity < 1 {
                return Err(TraceError::validation(format!(
                    "A {} quantity for material {} must be at least 1",
                    kind, material_code
                )));
            }
            if let Cause::Other(detail) = &entry.cause {
                if detail.trim().is_empty() {
                    return Err(TraceError::validation(format!(
                        "An 'other' {} cause for material {} needs a description",
                        kind, material_code
                    )));
                }
            }
            Ok(CauseEntry {
                quantity: entry.quantity,
                cause: entry.cause,
            })
        })
        .collect()
}
