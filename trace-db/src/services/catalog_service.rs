//! Catalog service: product/material/operator lookups and the operator
//! bulk import.

use chrono::Utc;
use std::sync::Arc;

use trace_core::types::{Operator, OperatorId, Product, ProductionLine, RawMaterial, Shift};
use trace_core::{TraceError, TraceResult};

use crate::store::TraceStore;

/// A product together with the materials its recipe expects, in form order
#[derive(Debug, Clone)]
pub struct ProductWithRecipe {
    pub product: Product,
    pub materials: Vec<RawMaterial>,
}

/// One parsed row of an operator import (the spreadsheet parsing itself
/// happens upstream)
#[derive(Debug, Clone)]
pub struct OperatorImportRow {
    pub code: String,
    pub first_name: String,
    pub last_name: String,
}

/// Outcome of a bulk operator import
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ImportSummary {
    pub created: usize,
    pub updated: usize,
}

/// Read-mostly access to the plant catalogs
pub struct CatalogService {
    store: Arc<dyn TraceStore>,
}

impl CatalogService {
    pub fn new(store: Arc<dyn TraceStore>) -> Self {
        Self { store }
    }

    pub async fn list_products(&self) -> TraceResult<Vec<Product>> {
        Ok(self
            .store
            .list_products()
            .await?
            .into_iter()
            .filter(|p| p.active)
            .collect())
    }

    /// A product with its recipe materials resolved, for pre-populating
    /// the traceability form
    pub async fn product_with_recipe(&self, code: &str) -> TraceResult<ProductWithRecipe> {
        let product = self
            .store
            .get_product(code)
            .await?
            .ok_or_else(|| TraceError::not_found("Product", code))?;

        let mut materials = Vec::new();
        for line in self.store.list_recipe(code).await? {
            if !line.active {
                continue;
            }
            if let Some(material) = self.store.get_material(&line.material_code).await? {
                if material.active {
                    materials.push(material);
                }
            }
        }

        Ok(ProductWithRecipe { product, materials })
    }

    pub async fn list_materials(&self) -> TraceResult<Vec<RawMaterial>> {
        Ok(self
            .store
            .list_materials()
            .await?
            .into_iter()
            .filter(|m| m.active)
            .collect())
    }

    pub async fn list_lines(&self) -> TraceResult<Vec<ProductionLine>> {
        Ok(self
            .store
            .list_lines()
            .await?
            .into_iter()
            .filter(|l| l.active)
            .collect())
    }

    pub async fn list_shifts(&self) -> TraceResult<Vec<Shift>> {
        Ok(self
            .store
            .list_shifts()
            .await?
            .into_iter()
            .filter(|s| s.active)
            .collect())
    }

    pub async fn list_operators(&self) -> TraceResult<Vec<Operator>> {
        Ok(self
            .store
            .list_operators()
            .await?
            .into_iter()
            .filter(|o| o.active)
            .collect())
    }

    /// Create-or-update operators by code. Existing operators get their
    /// names refreshed and are reactivated.
    pub async fn import_operators(
        &self,
        rows: Vec<OperatorImportRow>,
    ) -> TraceResult<ImportSummary> {
        if rows.is_empty() {
            return Err(TraceError::validation("Operator import must not be empty"));
        }

        let mut summary = ImportSummary::default();
        let now = Utc::now();

        for row in rows {
            let code = row.code.trim();
            if code.is_empty() {
                return Err(TraceError::validation(
                    "Every imported operator needs a code",
                ));
            }

            match self.store.get_operator(code).await? {
                Some(mut existing) => {
                    existing.first_name = row.first_name;
                    existing.last_name = row.last_name;
                    existing.active = true;
                    existing.updated_at = now;
                    self.store.put_operator(&existing).await?;
                    summary.updated += 1;
                }
                None => {
                    let operator = Operator {
                        id: OperatorId::new(),
                        code: code.to_string(),
                        first_name: row.first_name,
                        last_name: row.last_name,
                        active: true,
                        imported_at: now,
                        updated_at: now,
                    };
                    self.store.put_operator(&operator).await?;
                    summary.created += 1;
                }
            }
        }

        tracing::info!(
            created = summary.created,
            updated = summary.updated,
            "Operator import complete"
        );
        Ok(summary)
    }

    /// Resolve a list of operator codes, failing with the full set of
    /// missing codes rather than the first one
    pub async fn resolve_operators(&self, codes: &[String]) -> TraceResult<Vec<Operator>> {
        let mut resolved = Vec::with_capacity(codes.len());
        let mut missing = Vec::new();

        for code in codes {
            match self.store.get_operator(code).await? {
                Some(op) if op.active => resolved.push(op),
                _ => missing.push(code.clone()),
            }
        }

        if !missing.is_empty() {
            return Err(TraceError::UnknownCodes {
                entity: "operator",
                codes: missing,
            });
        }
        Ok(resolved)
    }
}
