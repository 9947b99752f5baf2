//! Catalog endpoints

use axum::{
    extract::{Path, State},
    Json,
};

use trace_core::types::{Operator, Product, ProductionLine, RawMaterial, Role, Shift};
use trace_db::services::OperatorImportRow;

use crate::auth::CurrentActor;
use crate::dto::{ImportOperatorsRequest, ImportSummaryResponse, ProductWithRecipeResponse};
use crate::error::{ApiError, ApiResult};
use crate::state::AppState;

/// List active products
pub async fn list_products(State(state): State<AppState>) -> ApiResult<Json<Vec<Product>>> {
    Ok(Json(state.catalog.list_products().await?))
}

/// Get one product with its recipe materials resolved
pub async fn get_product(
    State(state): State<AppState>,
    Path(code): Path<String>,
) -> ApiResult<Json<ProductWithRecipeResponse>> {
    let found = state.catalog.product_with_recipe(&code).await?;
    Ok(Json(ProductWithRecipeResponse {
        product: found.product,
        materials: found.materials,
    }))
}

/// List active raw materials
pub async fn list_materials(State(state): State<AppState>) -> ApiResult<Json<Vec<RawMaterial>>> {
    Ok(Json(state.catalog.list_materials().await?))
}

/// List active production lines
pub async fn list_lines(State(state): State<AppState>) -> ApiResult<Json<Vec<ProductionLine>>> {
    Ok(Json(state.catalog.list_lines().await?))
}

/// List active shifts
pub async fn list_shifts(State(state): State<AppState>) -> ApiResult<Json<Vec<Shift>>> {
    Ok(Json(state.catalog.list_shifts().await?))
}

/// List active operators
pub async fn list_operators(State(state): State<AppState>) -> ApiResult<Json<Vec<Operator>>> {
    Ok(Json(state.catalog.list_operators().await?))
}

/// Bulk operator import (upsert by code)
pub async fn import_operators(
    State(state): State<AppState>,
    CurrentActor(actor): CurrentActor,
    Json(req): Json<ImportOperatorsRequest>,
) -> ApiResult<Json<ImportSummaryResponse>> {
    if actor.role != Role::Supervisor {
        return Err(ApiError::Forbidden(
            "Only supervisors can import operators".to_string(),
        ));
    }

    let rows = req
        .operators
        .into_iter()
        .map(|row| OperatorImportRow {
            code: row.code,
            first_name: row.first_name,
            last_name: row.last_name,
        })
        .collect();

    let summary = state.catalog.import_operators(rows).await?;
    Ok(Json(ImportSummaryResponse {
        created: summary.created,
        updated: summary.updated,
    }))
}
