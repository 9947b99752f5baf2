//! Sled-backed persistent store.
//!
//! One tree per entity plus index trees for the uniqueness rules. The
//! record aggregate is stored as a single serialized document, so
//! signature appends are compare-and-swap loops on one key; task-slot
//! and line-exclusivity rules use multi-tree transactions.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{de::DeserializeOwned, Serialize};
use sled::transaction::{ConflictableTransactionError, TransactionError};
use sled::Transactional;
use std::path::Path;

use trace_core::types::{
    LineId, Operator, Product, ProductionLine, RawMaterial, RecipeLine, RecordId, Shift, ShiftId,
    Signature, Task, TaskId, TaskStatus, TraceabilityRecord,
};
use trace_core::{TraceError, TraceResult};

use super::{RecordFilter, TaskFilter, TraceStore};

const PRODUCTS_TREE: &str = "products";
const MATERIALS_TREE: &str = "materials";
const RECIPES_TREE: &str = "recipes";
const OPERATORS_TREE: &str = "operators";
const LINES_TREE: &str = "lines";
const SHIFTS_TREE: &str = "shifts";
const TASKS_TREE: &str = "tasks";
const TASK_SLOTS_TREE: &str = "task_slots";
const LINE_ACTIVE_TREE: &str = "line_active";
const RECORDS_TREE: &str = "records";
const RECORD_BY_TASK_TREE: &str = "record_by_task";

/// Sled-backed [`TraceStore`]
#[derive(Debug, Clone)]
pub struct SledStore {
    db: sled::Db,
    products: sled::Tree,
    materials: sled::Tree,
    recipes: sled::Tree,
    operators: sled::Tree,
    lines: sled::Tree,
    shifts: sled::Tree,
    tasks: sled::Tree,
    task_slots: sled::Tree,
    line_active: sled::Tree,
    records: sled::Tree,
    record_by_task: sled::Tree,
}

impl SledStore {
    /// Open or create the database at `path`
    pub fn open<P: AsRef<Path>>(path: P) -> TraceResult<Self> {
        let db = sled::open(path)
            .map_err(|e| TraceError::Storage(format!("Failed to open sled db: {}", e)))?;

        let open_tree = |name: &str| {
            db.open_tree(name)
                .map_err(|e| TraceError::Storage(format!("Failed to open {} tree: {}", name, e)))
        };

        Ok(Self {
            products: open_tree(PRODUCTS_TREE)?,
            materials: open_tree(MATERIALS_TREE)?,
            recipes: open_tree(RECIPES_TREE)?,
            operators: open_tree(OPERATORS_TREE)?,
            lines: open_tree(LINES_TREE)?,
            shifts: open_tree(SHIFTS_TREE)?,
            tasks: open_tree(TASKS_TREE)?,
            task_slots: open_tree(TASK_SLOTS_TREE)?,
            line_active: open_tree(LINE_ACTIVE_TREE)?,
            records: open_tree(RECORDS_TREE)?,
            record_by_task: open_tree(RECORD_BY_TASK_TREE)?,
            db,
        })
    }

    /// Flush pending writes to disk
    pub fn flush(&self) -> TraceResult<()> {
        self.db
            .flush()
            .map_err(|e| TraceError::Storage(format!("Failed to flush db: {}", e)))?;
        Ok(())
    }

    // ==================== Helpers ====================

    fn serialize<T: Serialize>(value: &T) -> TraceResult<Vec<u8>> {
        serde_json::to_vec(value).map_err(|e| TraceError::Serialization(e.to_string()))
    }

    fn deserialize<T: DeserializeOwned>(bytes: &[u8]) -> TraceResult<T> {
        serde_json::from_slice(bytes).map_err(|e| TraceError::Serialization(e.to_string()))
    }

    fn slot_key(task: &Task) -> Vec<u8> {
        let mut key = Vec::with_capacity(48 + task.product_code.len());
        key.extend_from_slice(task.line_id.0.as_bytes());
        key.extend_from_slice(task.shift_id.0.as_bytes());
        key.extend_from_slice(task.scheduled_date.to_string().as_bytes());
        key.push(0);
        key.extend_from_slice(task.product_code.as_bytes());
        key
    }

    fn recipe_key(product_code: &str, material_code: &str) -> Vec<u8> {
        let mut key = Vec::with_capacity(product_code.len() + material_code.len() + 1);
        key.extend_from_slice(product_code.as_bytes());
        key.push(0);
        key.extend_from_slice(material_code.as_bytes());
        key
    }

    fn recipe_prefix(product_code: &str) -> Vec<u8> {
        let mut prefix = Vec::with_capacity(product_code.len() + 1);
        prefix.extend_from_slice(product_code.as_bytes());
        prefix.push(0);
        prefix
    }

    fn get_doc<T: DeserializeOwned>(tree: &sled::Tree, key: &[u8]) -> TraceResult<Option<T>> {
        match tree
            .get(key)
            .map_err(|e| TraceError::Storage(format!("Read failed: {}", e)))?
        {
            Some(bytes) => Ok(Some(Self::deserialize(&bytes)?)),
            None => Ok(None),
        }
    }

    fn put_doc<T: Serialize>(tree: &sled::Tree, key: &[u8], value: &T) -> TraceResult<()> {
        let bytes = Self::serialize(value)?;
        tree.insert(key, bytes)
            .map_err(|e| TraceError::Storage(format!("Write failed: {}", e)))?;
        Ok(())
    }

    fn scan_docs<T: DeserializeOwned>(tree: &sled::Tree) -> TraceResult<Vec<T>> {
        let mut out = Vec::new();
        for item in tree.iter() {
            let (_, value) =
                item.map_err(|e| TraceError::Storage(format!("Iteration failed: {}", e)))?;
            out.push(Self::deserialize(&value)?);
        }
        Ok(out)
    }

    fn tx_err(e: TransactionError<TraceError>) -> TraceError {
        match e {
            TransactionError::Abort(e) => e,
            TransactionError::Storage(e) => TraceError::Storage(e.to_string()),
        }
    }

    fn abort<T>(e: TraceError) -> Result<T, ConflictableTransactionError<TraceError>> {
        Err(ConflictableTransactionError::Abort(e))
    }

    fn tx_serialize<T: Serialize>(
        value: &T,
    ) -> Result<Vec<u8>, ConflictableTransactionError<TraceError>> {
        serde_json::to_vec(value)
            .map_err(|e| ConflictableTransactionError::Abort(TraceError::Serialization(e.to_string())))
    }

    fn tx_deserialize<T: DeserializeOwned>(
        bytes: &[u8],
    ) -> Result<T, ConflictableTransactionError<TraceError>> {
        serde_json::from_slice(bytes)
            .map_err(|e| ConflictableTransactionError::Abort(TraceError::Serialization(e.to_string())))
    }
}

#[async_trait]
impl TraceStore for SledStore {
    // ==================== Catalog ====================

    async fn put_product(&self, product: &Product) -> TraceResult<()> {
        Self::put_doc(&self.products, product.code.as_bytes(), product)
    }

    async fn get_product(&self, code: &str) -> TraceResult<Option<Product>> {
        Self::get_doc(&self.products, code.as_bytes())
    }

    async fn list_products(&self) -> TraceResult<Vec<Product>> {
        let mut products: Vec<Product> = Self::scan_docs(&self.products)?;
        products.sort_by(|a, b| a.code.cmp(&b.code));
        Ok(products)
    }

    async fn put_material(&self, material: &RawMaterial) -> TraceResult<()> {
        Self::put_doc(&self.materials, material.code.as_bytes(), material)
    }

    async fn get_material(&self, code: &str) -> TraceResult<Option<RawMaterial>> {
        Self::get_doc(&self.materials, code.as_bytes())
    }

    async fn list_materials(&self) -> TraceResult<Vec<RawMaterial>> {
        let mut materials: Vec<RawMaterial> = Self::scan_docs(&self.materials)?;
        materials.sort_by(|a, b| a.code.cmp(&b.code));
        Ok(materials)
    }

    async fn put_recipe_line(&self, line: &RecipeLine) -> TraceResult<()> {
        let key = Self::recipe_key(&line.product_code, &line.material_code);
        Self::put_doc(&self.recipes, &key, line)
    }

    async fn list_recipe(&self, product_code: &str) -> TraceResult<Vec<RecipeLine>> {
        let mut lines = Vec::new();
        for item in self.recipes.scan_prefix(Self::recipe_prefix(product_code)) {
            let (_, value) =
                item.map_err(|e| TraceError::Storage(format!("Iteration failed: {}", e)))?;
            lines.push(Self::deserialize::<RecipeLine>(&value)?);
        }
        lines.sort_by_key(|l| l.position);
        Ok(lines)
    }

    async fn put_operator(&self, operator: &Operator) -> TraceResult<()> {
        Self::put_doc(&self.operators, operator.code.as_bytes(), operator)
    }

    async fn get_operator(&self, code: &str) -> TraceResult<Option<Operator>> {
        Self::get_doc(&self.operators, code.as_bytes())
    }

    async fn list_operators(&self) -> TraceResult<Vec<Operator>> {
        let mut operators: Vec<Operator> = Self::scan_docs(&self.operators)?;
        operators.sort_by(|a, b| a.code.cmp(&b.code));
        Ok(operators)
    }

    async fn put_line(&self, line: &ProductionLine) -> TraceResult<()> {
        Self::put_doc(&self.lines, line.id.0.as_bytes(), line)
    }

    async fn get_line(&self, id: &LineId) -> TraceResult<Option<ProductionLine>> {
        Self::get_doc(&self.lines, id.0.as_bytes())
    }

    async fn list_lines(&self) -> TraceResult<Vec<ProductionLine>> {
        let mut lines: Vec<ProductionLine> = Self::scan_docs(&self.lines)?;
        lines.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(lines)
    }

    async fn put_shift(&self, shift: &Shift) -> TraceResult<()> {
        Self::put_doc(&self.shifts, shift.id.0.as_bytes(), shift)
    }

    async fn get_shift(&self, id: &ShiftId) -> TraceResult<Option<Shift>> {
        Self::get_doc(&self.shifts, id.0.as_bytes())
    }

    async fn list_shifts(&self) -> TraceResult<Vec<Shift>> {
        let mut shifts: Vec<Shift> = Self::scan_docs(&self.shifts)?;
        shifts.sort_by_key(|s| s.starts_at);
        Ok(shifts)
    }

    // ==================== Tasks ====================

    async fn insert_task(&self, task: &Task) -> TraceResult<()> {
        let task_key = task.id.0.as_bytes().to_vec();
        let slot_key = Self::slot_key(task);
        let task_bytes = Self::serialize(task)?;

        (&self.tasks, &self.task_slots)
            .transaction(|(tasks, slots)| {
                if slots.get(&slot_key)?.is_some() {
                    return Self::abort(TraceError::conflict(
                        "A task already exists for this line, shift, date and product",
                    ));
                }
                slots.insert(slot_key.as_slice(), task_key.as_slice())?;
                tasks.insert(task_key.as_slice(), task_bytes.as_slice())?;
                Ok(())
            })
            .map_err(Self::tx_err)
    }

    async fn update_task(&self, task: &Task) -> TraceResult<()> {
        let task_key = task.id.0.as_bytes().to_vec();
        let new_slot = Self::slot_key(task);
        let task_bytes = Self::serialize(task)?;

        (&self.tasks, &self.task_slots)
            .transaction(|(tasks, slots)| {
                let old_bytes = match tasks.get(&task_key)? {
                    Some(bytes) => bytes,
                    None => {
                        return Self::abort(TraceError::not_found("Task", task.id.to_string()))
                    }
                };
                let old: Task = Self::tx_deserialize(&old_bytes)?;
                let old_slot = Self::slot_key(&old);

                if old_slot != new_slot {
                    if slots.get(&new_slot)?.is_some() {
                        return Self::abort(TraceError::conflict(
                            "A task already exists for this line, shift, date and product",
                        ));
                    }
                    slots.remove(old_slot.as_slice())?;
                    slots.insert(new_slot.as_slice(), task_key.as_slice())?;
                }
                tasks.insert(task_key.as_slice(), task_bytes.as_slice())?;
                Ok(())
            })
            .map_err(Self::tx_err)
    }

    async fn delete_task(&self, id: &TaskId) -> TraceResult<()> {
        let task_key = id.0.as_bytes().to_vec();
        let id = *id;

        (&self.tasks, &self.task_slots)
            .transaction(|(tasks, slots)| {
                let bytes = match tasks.get(&task_key)? {
                    Some(bytes) => bytes,
                    None => return Self::abort(TraceError::not_found("Task", id.to_string())),
                };
                let task: Task = Self::tx_deserialize(&bytes)?;
                slots.remove(Self::slot_key(&task))?;
                tasks.remove(task_key.as_slice())?;
                Ok(())
            })
            .map_err(Self::tx_err)
    }

    async fn get_task(&self, id: &TaskId) -> TraceResult<Option<Task>> {
        Self::get_doc(&self.tasks, id.0.as_bytes())
    }

    async fn list_tasks(&self, filter: &TaskFilter) -> TraceResult<Vec<Task>> {
        let mut tasks: Vec<Task> = Self::scan_docs::<Task>(&self.tasks)?
            .into_iter()
            .filter(|t| filter.matches(t))
            .collect();
        tasks.sort_by(|a, b| {
            b.scheduled_date
                .cmp(&a.scheduled_date)
                .then(a.created_at.cmp(&b.created_at))
        });
        Ok(tasks)
    }

    async fn start_task(&self, id: &TaskId, at: DateTime<Utc>) -> TraceResult<Task> {
        let task_key = id.0.as_bytes().to_vec();
        let id = *id;

        (&self.tasks, &self.line_active)
            .transaction(|(tasks, line_active)| {
                let bytes = match tasks.get(&task_key)? {
                    Some(bytes) => bytes,
                    None => return Self::abort(TraceError::not_found("Task", id.to_string())),
                };
                let mut task: Task = Self::tx_deserialize(&bytes)?;

                let line_key = task.line_id.0.as_bytes().to_vec();
                if let Some(running) = line_active.get(&line_key)? {
                    let running_id = uuid::Uuid::from_slice(&running)
                        .map(|u| u.to_string())
                        .unwrap_or_default();
                    return Self::abort(TraceError::conflict(format!(
                        "Task {} is already in progress on this line",
                        running_id
                    )));
                }

                if let Err(e) = task.start(at) {
                    return Self::abort(e);
                }

                line_active.insert(line_key.as_slice(), task_key.as_slice())?;
                tasks.insert(task_key.as_slice(), Self::tx_serialize(&task)?)?;
                Ok(task)
            })
            .map_err(Self::tx_err)
    }

    async fn finish_task(&self, id: &TaskId, at: DateTime<Utc>) -> TraceResult<Task> {
        let task_key = id.0.as_bytes().to_vec();
        let id = *id;

        (&self.tasks, &self.line_active)
            .transaction(|(tasks, line_active)| {
                let bytes = match tasks.get(&task_key)? {
                    Some(bytes) => bytes,
                    None => return Self::abort(TraceError::not_found("Task", id.to_string())),
                };
                let mut task: Task = Self::tx_deserialize(&bytes)?;

                if let Err(e) = task.finish(at) {
                    return Self::abort(e);
                }

                let line_key = task.line_id.0.as_bytes().to_vec();
                if let Some(active) = line_active.get(&line_key)? {
                    if active.as_ref() == task_key.as_slice() {
                        line_active.remove(line_key.as_slice())?;
                    }
                }
                tasks.insert(task_key.as_slice(), Self::tx_serialize(&task)?)?;
                Ok(task)
            })
            .map_err(Self::tx_err)
    }

    async fn line_in_progress(&self, line_id: &LineId) -> TraceResult<Option<Task>> {
        let active = self
            .line_active
            .get(line_id.0.as_bytes())
            .map_err(|e| TraceError::Storage(format!("Read failed: {}", e)))?;
        match active {
            Some(task_key) => {
                let task: Option<Task> = Self::get_doc(&self.tasks, &task_key)?;
                Ok(task.filter(|t| t.status == TaskStatus::InProgress))
            }
            None => Ok(None),
        }
    }

    // ==================== Traceability records ====================

    async fn insert_record(&self, record: &TraceabilityRecord, task: &Task) -> TraceResult<()> {
        let record_key = record.id.0.as_bytes().to_vec();
        let task_key = task.id.0.as_bytes().to_vec();
        let line_key = task.line_id.0.as_bytes().to_vec();
        let record_bytes = Self::serialize(record)?;
        let task_bytes = Self::serialize(task)?;
        let task_id = record.task_id;

        (&self.records, &self.record_by_task, &self.tasks, &self.line_active)
            .transaction(|(records, by_task, tasks, line_active)| {
                if tasks.get(&task_key)?.is_none() {
                    return Self::abort(TraceError::not_found("Task", task_id.to_string()));
                }
                if by_task.get(&task_key)?.is_some() {
                    return Self::abort(TraceError::conflict(format!(
                        "Task {} already has a traceability record",
                        task_id
                    )));
                }

                by_task.insert(task_key.as_slice(), record_key.as_slice())?;
                records.insert(record_key.as_slice(), record_bytes.as_slice())?;
                tasks.insert(task_key.as_slice(), task_bytes.as_slice())?;

                // Record creation finishes the task; free the line if it
                // was still marked busy by this task.
                if let Some(active) = line_active.get(&line_key)? {
                    if active.as_ref() == task_key.as_slice() {
                        line_active.remove(line_key.as_slice())?;
                    }
                }
                Ok(())
            })
            .map_err(Self::tx_err)
    }

    async fn replace_record(
        &self,
        record: &TraceabilityRecord,
        expected_updated_at: DateTime<Utc>,
    ) -> TraceResult<()> {
        let key = record.id.0.as_bytes();
        let updated = Self::serialize(record)?;

        loop {
            let current = self
                .records
                .get(key)
                .map_err(|e| TraceError::Storage(format!("Read failed: {}", e)))?
                .ok_or_else(|| TraceError::not_found("Record", record.id.to_string()))?;

            let stored: TraceabilityRecord = Self::deserialize(&current)?;
            if stored.updated_at != expected_updated_at {
                return Err(TraceError::conflict(format!(
                    "Record {} was modified concurrently",
                    record.id
                )));
            }

            let swap = self
                .records
                .compare_and_swap(key, Some(current), Some(updated.clone()))
                .map_err(|e| TraceError::Storage(format!("CAS failed: {}", e)))?;
            if swap.is_ok() {
                return Ok(());
            }
            // Lost the race; reload and re-check the version
        }
    }

    async fn append_signature(
        &self,
        id: &RecordId,
        signature: Signature,
    ) -> TraceResult<TraceabilityRecord> {
        let key = id.0.as_bytes();

        loop {
            let current = self
                .records
                .get(key)
                .map_err(|e| TraceError::Storage(format!("Read failed: {}", e)))?
                .ok_or_else(|| TraceError::not_found("Record", id.to_string()))?;

            let mut record: TraceabilityRecord = Self::deserialize(&current)?;
            if record.signature_of(signature.kind).is_some() {
                return Err(TraceError::conflict(format!(
                    "Record {} already has a {} signature",
                    id,
                    signature.kind.as_str()
                )));
            }
            record.updated_at = signature.signed_at;
            record.signatures.push(signature.clone());

            let updated = Self::serialize(&record)?;
            let swap = self
                .records
                .compare_and_swap(key, Some(current), Some(updated))
                .map_err(|e| TraceError::Storage(format!("CAS failed: {}", e)))?;
            if swap.is_ok() {
                return Ok(record);
            }
            // Lost the race; reload and retry
        }
    }

    async fn get_record(&self, id: &RecordId) -> TraceResult<Option<TraceabilityRecord>> {
        Self::get_doc(&self.records, id.0.as_bytes())
    }

    async fn get_record_by_task(
        &self,
        task_id: &TaskId,
    ) -> TraceResult<Option<TraceabilityRecord>> {
        let index = self
            .record_by_task
            .get(task_id.0.as_bytes())
            .map_err(|e| TraceError::Storage(format!("Read failed: {}", e)))?;
        match index {
            Some(record_key) => Self::get_doc(&self.records, &record_key),
            None => Ok(None),
        }
    }

    async fn list_records(&self, filter: &RecordFilter) -> TraceResult<Vec<TraceabilityRecord>> {
        let mut records: Vec<TraceabilityRecord> =
            Self::scan_docs::<TraceabilityRecord>(&self.records)?
                .into_iter()
                .filter(|r| filter.matches(r))
                .collect();
        records.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(records)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;
    use trace_core::types::{RecordState, SignatureKind, UserId};

    fn open_store() -> (SledStore, tempfile::TempDir) {
        let dir = tempfile::tempdir().unwrap();
        let store = SledStore::open(dir.path()).unwrap();
        (store, dir)
    }

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
    async fn task_round_trip() {
        let (store, _dir) = open_store();
        let task = sample_task();
        store.insert_task(&task).await.unwrap();

        let loaded = store.get_task(&task.id).await.unwrap().unwrap();
        assert_eq!(loaded, task);
    }

    #[tokio::test]
    async fn task_slot_conflict() {
        let (store, _dir) = open_store();
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
    async fn line_exclusivity_via_active_index() {
        let (store, _dir) = open_store();
        let first = sample_task();
        let mut second = sample_task();
        second.line_id = first.line_id;
        second.product_code = "411".to_string();
        store.insert_task(&first).await.unwrap();
        store.insert_task(&second).await.unwrap();

        let started = store.start_task(&first.id, Utc::now()).await.unwrap();
        assert_eq!(started.status, TaskStatus::InProgress);

        assert!(matches!(
            store.start_task(&second.id, Utc::now()).await,
            Err(TraceError::Conflict(_))
        ));

        let running = store.line_in_progress(&first.line_id).await.unwrap();
        assert_eq!(running.unwrap().id, first.id);

        store.finish_task(&first.id, Utc::now()).await.unwrap();
        assert!(store.line_in_progress(&first.line_id).await.unwrap().is_none());
        store.start_task(&second.id, Utc::now()).await.unwrap();
    }

    #[tokio::test]
    async fn record_insert_finishes_task_and_frees_line() {
        let (store, _dir) = open_store();
        let task = sample_task();
        store.insert_task(&task).await.unwrap();
        let mut task = store.start_task(&task.id, Utc::now()).await.unwrap();

        task.finish(Utc::now()).unwrap();
        let record = sample_record(&task);
        store.insert_record(&record, &task).await.unwrap();

        let stored_task = store.get_task(&task.id).await.unwrap().unwrap();
        assert_eq!(stored_task.status, TaskStatus::Finished);
        assert!(store.line_in_progress(&task.line_id).await.unwrap().is_none());

        // Second record for the same task conflicts
        let second = sample_record(&task);
        assert!(matches!(
            store.insert_record(&second, &task).await,
            Err(TraceError::Conflict(_))
        ));
    }

    #[tokio::test]
    async fn signature_uniqueness() {
        let (store, _dir) = open_store();
        let mut task = sample_task();
        store.insert_task(&task).await.unwrap();
        task.status = TaskStatus::Finished;
        let record = sample_record(&task);
        store.insert_record(&record, &task).await.unwrap();

        let sig = Signature {
            kind: SignatureKind::QualityControl,
            user_id: UserId::new(),
            signed_at: Utc::now(),
        };
        store.append_signature(&record.id, sig.clone()).await.unwrap();
        assert!(matches!(
            store.append_signature(&record.id, sig).await,
            Err(TraceError::Conflict(_))
        ));
    }

    #[tokio::test]
    async fn stale_aggregate_replace_conflicts() {
        let (store, _dir) = open_store();
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

    #[tokio::test]
    async fn recipe_prefix_scan() {
        let (store, _dir) = open_store();
        for (product, material, position) in
            [("410", "LAC0001", 2), ("410", "CHO0003", 1), ("411", "LAC0001", 1)]
        {
            store
                .put_recipe_line(&RecipeLine {
                    product_code: product.to_string(),
                    material_code: material.to_string(),
                    position,
                    active: true,
                })
                .await
                .unwrap();
        }

        let recipe = store.list_recipe("410").await.unwrap();
        assert_eq!(recipe.len(), 2);
        assert_eq!(recipe[0].material_code, "CHO0003");
        assert_eq!(recipe[1].material_code, "LAC0001");
    }

    #[tokio::test]
    async fn survives_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let task = sample_task();
        {
            let store = SledStore::open(dir.path()).unwrap();
            store.insert_task(&task).await.unwrap();
            store.flush().unwrap();
        }
        let store = SledStore::open(dir.path()).unwrap();
        let loaded = store.get_task(&task.id).await.unwrap().unwrap();
        assert_eq!(loaded.product_code, "410");
    }
}
