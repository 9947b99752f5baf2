//! In-memory store for tests and development.
//!
//! All state sits behind a single `RwLock` so that compound invariant
//! checks (task slot uniqueness, line exclusivity, record-per-task,
//! signature-per-kind) run under one write guard.

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use std::collections::HashMap;
use tokio::sync::RwLock;

use trace_core::types::{
    LineId, Operator, Product, ProductionLine, RawMaterial, RecipeLine, RecordId, Shift, ShiftId,
    Signature, Task, TaskId, TaskStatus, TraceabilityRecord,
};
use trace_core::{TraceError, TraceResult};

use super::{RecordFilter, TaskFilter, TraceStore};

type TaskSlot = (LineId, ShiftId, NaiveDate, String);

#[derive(Debug, Default)]
struct Inner {
    products: HashMap<String, Product>,
    materials: HashMap<String, RawMaterial>,
    recipes: HashMap<(String, String), RecipeLine>,
    operators: HashMap<String, Operator>,
    lines: HashMap<LineId, ProductionLine>,
    shifts: HashMap<ShiftId, Shift>,
    tasks: HashMap<TaskId, Task>,
    task_slots: HashMap<TaskSlot, TaskId>,
    records: HashMap<RecordId, TraceabilityRecord>,
    record_by_task: HashMap<TaskId, RecordId>,
}

/// Memory-backed [`TraceStore`]
#[derive(Debug, Default)]
pub struct MemoryStore {
    inner: RwLock<Inner>,
}

impl MemoryStore {
    /// Create an empty store
    pub fn new() -> Self {
        Self::default()
    }
}

fn task_slot(task: &Task) -> TaskSlot {
    (
        task.line_id,
        task.shift_id,
        task.scheduled_date,
        task.product_code.clone(),
    )
}

#[async_trait]
impl TraceStore for MemoryStore {
    // ==================== Catalog ====================

    async fn put_product(&self, product: &Product) -> TraceResult<()> {
        self.inner
            .write()
            .await
            .products
            .insert(product.code.clone(), product.clone());
        Ok(())
    }

    async fn get_product(&self, code: &str) -> TraceResult<Option<Product>> {
        Ok(self.inner.read().await.products.get(code).cloned())
    }

    async fn list_products(&self) -> TraceResult<Vec<Product>> {
        let mut products: Vec<Product> =
            self.inner.read().await.products.values().cloned().collect();
        products.sort_by(|a, b| a.code.cmp(&b.code));
        Ok(products)
    }

    async fn put_material(&self, material: &RawMaterial) -> TraceResult<()> {
        self.inner
            .write()
            .await
            .materials
            .insert(material.code.clone(), material.clone());
        Ok(())
    }

    async fn get_material(&self, code: &str) -> TraceResult<Option<RawMaterial>> {
        Ok(self.inner.read().await.materials.get(code).cloned())
    }

    async fn list_materials(&self) -> TraceResult<Vec<RawMaterial>> {
        let mut materials: Vec<RawMaterial> =
            self.inner.read().await.materials.values().cloned().collect();
        materials.sort_by(|a, b| a.code.cmp(&b.code));
        Ok(materials)
    }

    async fn put_recipe_line(&self, line: &RecipeLine) -> TraceResult<()> {
        let key = (line.product_code.clone(), line.material_code.clone());
        self.inner.write().await.recipes.insert(key, line.clone());
        Ok(())
    }

    async fn list_recipe(&self, product_code: &str) -> TraceResult<Vec<RecipeLine>> {
        let mut lines: Vec<RecipeLine> = self
            .inner
            .read()
            .await
            .recipes
            .values()
            .filter(|l| l.product_code == product_code)
            .cloned()
            .collect();
        lines.sort_by_key(|l| l.position);
        Ok(lines)
    }

    async fn put_operator(&self, operator: &Operator) -> TraceResult<()> {
        self.inner
            .write()
            .await
            .operators
            .insert(operator.code.clone(), operator.clone());
        Ok(())
    }

    async fn get_operator(&self, code: &str) -> TraceResult<Option<Operator>> {
        Ok(self.inner.read().await.operators.get(code).cloned())
    }

    async fn list_operators(&self) -> TraceResult<Vec<Operator>> {
        let mut operators: Vec<Operator> =
            self.inner.read().await.operators.values().cloned().collect();
        operators.sort_by(|a, b| a.code.cmp(&b.code));
        Ok(operators)
    }

    async fn put_line(&self, line: &ProductionLine) -> TraceResult<()> {
        self.inner.write().await.lines.insert(line.id, line.clone());
        Ok(())
    }

    async fn get_line(&self, id: &LineId) -> TraceResult<Option<ProductionLine>> {
        Ok(self.inner.read().await.lines.get(id).cloned())
    }

    async fn list_lines(&self) -> TraceResult<Vec<ProductionLine>> {
        let mut lines: Vec<ProductionLine> =
            self.inner.read().await.lines.values().cloned().collect();
        lines.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(lines)
    }

    async fn put_shift(&self, shift: &Shift) -> TraceResult<()> {
        self.inner
            .write()
            .await
            .shifts
            .insert(shift.id, shift.clone());
        Ok(())
    }

    async fn get_shift(&self, id: &ShiftId) -> TraceResult<Option<Shift>> {
        Ok(self.inner.read().await.shifts.get(id).cloned())
    }

    async fn list_shifts(&self) -> TraceResult<Vec<Shift>> {
        let mut shifts: Vec<Shift> = self.inner.read().await.shifts.values().cloned().collect();
        shifts.sort_by_key(|s| s.starts_at);
        Ok(shifts)
    }

    // ==================== Tasks ====================

    async fn insert_task(&self, task: &Task) -> TraceResult<()> {
        let mut inner = self.inner.write().await;
        let slot = task_slot(task);
        if inner.task_slots.contains_key(&slot) {
            return Err(TraceError::conflict(
                "A task already exists for this line, shift, date and product",
            ));
        }
        inner.task_slots.insert(slot, task.id);
        inner.tasks.insert(task.id, task.clone());
        Ok(())
    }

    async fn update_task(&self, task: &Task) -> TraceResult<()> {
        let mut inner = self.inner.write().await;
        let old = inner
            .tasks
            .get(&task.id)
            .cloned()
            .ok_or_else(|| TraceError::not_found("Task", task.id.to_string()))?;

        let old_slot = task_slot(&old);
        let new_slot = task_slot(task);
        if old_slot != new_slot {
            if inner.task_slots.contains_key(&new_slot) {
                return Err(TraceError::conflict(
                    "A task already exists for this line, shift, date and product",
                ));
            }
            inner.task_slots.remove(&old_slot);
            inner.task_slots.insert(new_slot, task.id);
        }
        inner.tasks.insert(task.id, task.clone());
        Ok(())
    }

    async fn delete_task(&self, id: &TaskId) -> TraceResult<()> {
        let mut inner = self.inner.write().await;
        let task = inner
            .tasks
            .remove(id)
            .ok_or_else(|| TraceError::not_found("Task", id.to_string()))?;
        inner.task_slots.remove(&task_slot(&task));
        Ok(())
    }

    async fn get_task(&self, id: &TaskId) -> TraceResult<Option<Task>> {
        Ok(self.inner.read().await.tasks.get(id).cloned())
    }

    async fn list_tasks(&self, filter: &TaskFilter) -> TraceResult<Vec<Task>> {
        let mut tasks: Vec<Task> = self
            .inner
            .read()
            .await
            .tasks
            .values()
            .filter(|t| filter.matches(t))
            .cloned()
            .collect();
        tasks.sort_by(|a, b| b.scheduled_date.cmp(&a.scheduled_date).then(a.created_at.cmp(&b.created_at)));
        Ok(tasks)
    }

    async fn start_task(&self, id: &TaskId, at: DateTime<Utc>) -> TraceResult<Task> {
        let mut inner = self.inner.write().await;
        let mut task = inner
            .tasks
            .get(id)
            .cloned()
            .ok_or_else(|| TraceError::not_found("Task", id.to_string()))?;

        if let Some(running) = inner
            .tasks
            .values()
            .find(|t| t.line_id == task.line_id && t.status == TaskStatus::InProgress)
        {
            return Err(TraceError::conflict(format!(
                "Task {} is already in progress on this line",
                running.id
            )));
        }

        task.start(at)?;
        inner.tasks.insert(task.id, task.clone());
        Ok(task)
    }

    async fn finish_task(&self, id: &TaskId, at: DateTime<Utc>) -> TraceResult<Task> {
        let mut inner = self.inner.write().await;
        let mut task = inner
            .tasks
            .get(id)
            .cloned()
            .ok_or_else(|| TraceError::not_found("Task", id.to_string()))?;
        task.finish(at)?;
        inner.tasks.insert(task.id, task.clone());
        Ok(task)
    }

    async fn line_in_progress(&self, line_id: &LineId) -> TraceResult<Option<Task>> {
        Ok(self
            .inner
            .read()
            .await
            .tasks
            .values()
            .find(|t| t.line_id == *line_id && t.status == TaskStatus::InProgress)
            .cloned())
    }

    // ==================== Traceability records ====================

    async fn insert_record(&self, record: &TraceabilityRecord, task: &Task) -> TraceResult<()> {
        let mut inner = self.inner.write().await;
        if !inner.tasks.contains_key(&task.id) {
            return Err(TraceError::not_found("Task", task.id.to_string()));
        }
        if inner.record_by_task.contains_key(&record.task_id) {
            return Err(TraceError::conflict(format!(
                "Task {} already has a traceability record",
                record.task_id
            )));
        }
        inner.record_by_task.insert(record.task_id, record.id);
        inner.records.insert(record.id, record.clone());
        inner.tasks.insert(task.id, task.clone());
        Ok(())
    }

    async fn replace_record(
        &self,
        record: &TraceabilityRecord,
        expected_updated_at: DateTime<Utc>,
    ) -> TraceResult<()> {
        let mut inner = self.inner.write().await;
        let current = inner
            .records
            .get(&record.id)
            .ok_or_else(|| TraceError::not_found("Record", record.id.to_string()))?;
        if current.updated_at != expected_updated_at {
            return Err(TraceError::conflict(format!(
                "Record {} was modified concurrently",
                record.id
            )));
        }
        inner.records.insert(record.id, record.clone());
        Ok(())
    }

    async fn append_signature(
        &self,
        id: &RecordId,
        signature: Signature,
    ) -> TraceResult<TraceabilityRecord> {
        let mut inner = self.inner.write().await;
        let record = inner
            .records
            .get_mut(id)
            .ok_or_else(|| TraceError::not_found("Record", id.to_string()))?;

        if record.signature_of(signature.kind).is_some() {
            return Err(TraceError::conflict(format!(
                "Record {} already has a {} signature",
                id,
                signature.kind.as_str()
            )));
        }
        record.updated_at = signature.signed_at;
        record.signatures.push(signature);
        Ok(record.clone())
    }

    async fn get_record(&self, id: &RecordId) -> TraceResult<Option<TraceabilityRecord>> {
        Ok(self.inner.read().await.records.get(id).cloned())
    }

    async fn get_record_by_task(
        &self,
        task_id: &TaskId,
    ) -> TraceResult<Option<TraceabilityRecord>> {
        let inner = self.inner.read().await;
        Ok(inner
            .record_by_task
            .get(task_id)
            .and_then(|id| inner.records.get(id))
            .cloned())
    }

    async fn list_records(&self, filter: &RecordFilter) -> TraceResult<Vec<TraceabilityRecord>> {
        let mut records: Vec<TraceabilityRecord> = self
            .inner
            .read()
            .await
            .records
            .values()
            .filter(|r| filter.matches(r))
            .cloned()
            .collect();
        records.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(records)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use trace_core::types::{RecordState, SignatureKind, UserId};

    fn sample_task() -> Task {
        Task {
            id: TaskId::new(),
            line_id: LineId::new(),
            shift_id: ShiftId::new(),
            product_code: "410".to_string(),
            supervisor_id: UserId::new(),
            scheduled_date: NaiveDate::from_ymd_opt(2025, 12, 8).unwrap(),
            production_goal: 500,
            notes: None,
            status: TaskStatus::Pending,
            assigned_operator_ids: vec![],
            created_at: Utc::now(),
            started_at: None,
            finished_at: None,
        }
    }

    fn sample_record(task: &Task) -> TraceabilityRecord {
        let now = Utc::now();
        TraceabilityRecord {
            id: RecordId::new(),
            task_id: task.id,
            product_code: task.product_code.clone(),
            quantity_produced: 480,
            day_of_year: 342,
            lot_code: "410-342-96".to_string(),
            state: RecordState::UnderReview,
            retention_reason: None,
            label_photo: None,
            materials: vec![],
            actual_operator_ids: vec![],
            signatures: vec![],
            notes: None,
            created_at: now,
            updated_at: now,
        }
    }

    #[tokio::test]
    async fn task_slot_uniqueness() {
        let store = MemoryStore::new();
        let task = sample_task();
        store.insert_task(&task).await.unwrap();

        let mut duplicate = sample_task();
        duplicate.line_id = task.line_id;
        duplicate.shift_id = task.shift_id;
        assert!(matches!(
            store.insert_task(&duplicate).await,
            Err(TraceError::Conflict(_))
        ));
    }

    #[tokio::test]
    async fn one_in_progress_task_per_line() {
        let store = MemoryStore::new();
        let first = sample_task();
        let mut second = sample_task();
        second.line_id = first.line_id;
        second.product_code = "411".to_string();
        store.insert_task(&first).await.unwrap();
        store.insert_task(&second).await.unwrap();

        store.start_task(&first.id, Utc::now()).await.unwrap();
        assert!(matches!(
            store.start_task(&second.id, Utc::now()).await,
            Err(TraceError::Conflict(_))
        ));

        // Finishing the first frees the line
        store.finish_task(&first.id, Utc::now()).await.unwrap();
        store.start_task(&second.id, Utc::now()).await.unwrap();
    }

    #[tokio::test]
    async fn one_record_per_task() {
        let store = MemoryStore::new();
        let mut task = sample_task();
        store.insert_task(&task).await.unwrap();
        task.status = TaskStatus::Finished;

        let record = sample_record(&task);
        store.insert_record(&record, &task).await.unwrap();

        let second = sample_record(&task);
        assert!(matches!(
            store.insert_record(&second, &task).await,
            Err(TraceError::Conflict(_))
        ));

        let by_task = store.get_record_by_task(&task.id).await.unwrap().unwrap();
        assert_eq!(by_task.id, record.id);
    }

    #[tokio::test]
    async fn duplicate_signature_conflicts() {
        let store = MemoryStore::new();
        let mut task = sample_task();
        store.insert_task(&task).await.unwrap();
        task.status = TaskStatus::Finished;
        let record = sample_record(&task);
        store.insert_record(&record, &task).await.unwrap();

        let sig = Signature {
            kind: SignatureKind::Supervisor,
            user_id: UserId::new(),
            signed_at: Utc::now(),
        };
        let updated = store.append_signature(&record.id, sig.clone()).await.unwrap();
        assert_eq!(updated.signatures.len(), 1);

        assert!(matches!(
            store.append_signature(&record.id, sig).await,
            Err(TraceError::Conflict(_))
        ));

        // The first signature is unaffected
        let stored = store.get_record(&record.id).await.unwrap().unwrap();
        assert_eq!(stored.signatures.len(), 1);
    }

    #[tokio::test]
    async fn update_task_moves_slot() {
        let store = MemoryStore::new();
        let task = sample_task();
        store.insert_task(&task).await.unwrap();

        let mut moved = task.clone();
        moved.scheduled_date = NaiveDate::from_ymd_opt(2025, 12, 9).unwrap();
        store.update_task(&moved).await.unwrap();

        // The old slot is free again
        let mut replacement = sample_task();
        replacement.line_id = task.line_id;
        replacement.shift_id = task.shift_id;
        store.insert_task(&replacement).await.unwrap();
    }

    #[tokio::test]
    async fn stale_aggregate_replace_conflicts() {
        let store = MemoryStore::new();
        let mut task = sample_task();
        store.insert_task(&task).await.unwrap();
        task.status = TaskStatus::Finished;
        let record = sample_record(&task);
        store.insert_record(&record, &task).await.unwrap();

        // A signature lands after our copy of the aggregate was read
        let sig = Signature {
            kind: SignatureKind::Supervisor,
            user_id: UserId::new(),
            signed_at: Utc::now(),
        };
        store.append_signature(&record.id, sig).await.unwrap();

        // Writing through the stale copy must not erase the signature
        let mut stale = record.clone();
        stale.quantity_produced = 450;
        let stale_version = stale.updated_at;
        stale.updated_at = Utc::now();
        assert!(matches!(
            store.replace_record(&stale, stale_version).await,
            Err(TraceError::Conflict(_))
        ));
        let stored = store.get_record(&record.id).await.unwrap().unwrap();
        assert_eq!(stored.signatures.len(), 1);

        // A write based on a fresh read goes through
        let mut fresh = stored.clone();
        fresh.quantity_produced = 450;
        let version = fresh.updated_at;
        fresh.updated_at = Utc::now();
        store.replace_record(&fresh, version).await.unwrap();
        let stored = store.get_record(&record.id).await.unwrap().unwrap();
        assert_eq!(stored.quantity_produced, 450);
        assert_eq!(stored.signatures.len(), 1);
    }
}
