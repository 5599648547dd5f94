use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;

use anyhow::{Context, Result};
use axum::extract::{Extension, Path as UrlPath};
use axum::Json;
use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::error::{AppError, AppResult};

/// key: boleto-record -> billing document consumed by the settlement workflow
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BoletoRecord {
    #[serde(alias = "codigo_boleto")]
    pub document_id: String,
    #[serde(alias = "codigo_barras")]
    pub barcode: String,
    #[serde(alias = "nome_devedor")]
    pub debtor_name: String,
    #[serde(alias = "cpf_devedor")]
    pub debtor_tax_id: String,
    #[serde(alias = "identificacao_cliente")]
    pub client_reference: String,
    #[serde(alias = "valor")]
    pub amount: Decimal,
    #[serde(alias = "data_vencimento")]
    pub due_date: NaiveDate,
    #[serde(alias = "descricao", default)]
    pub description: String,
    #[serde(default)]
    pub status: Option<String>,
    #[serde(alias = "codigo_correios", default)]
    pub authority_code: Option<String>,
}

/// Read-only lookup surface over the loaded record set.
pub trait RecordStore: Send + Sync {
    fn find_by_barcode(&self, barcode: &str) -> Option<BoletoRecord>;
    fn find_by_document_id(&self, document_id: &str) -> Option<BoletoRecord>;
    fn is_empty(&self) -> bool;
}

#[derive(Debug, Default)]
pub struct InMemoryRecordStore {
    by_barcode: HashMap<String, BoletoRecord>,
    by_document: HashMap<String, String>,
}

impl InMemoryRecordStore {
    pub fn new(records: impl IntoIterator<Item = BoletoRecord>) -> Self {
        let mut store = Self::default();
        for record in records {
            // first occurrence wins, like a top-down scan of the sheet
            if store.by_barcode.contains_key(&record.barcode) {
                continue;
            }
            store
                .by_document
                .entry(record.document_id.clone())
                .or_insert_with(|| record.barcode.clone());
            store.by_barcode.insert(record.barcode.clone(), record);
        }
        store
    }

    /// Loads a JSON array of records. A missing file yields an empty store so
    /// the service still boots and reports the base as unavailable.
    pub fn from_path(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let raw = match std::fs::read_to_string(path) {
            Ok(raw) => raw,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
                tracing::warn!(path = %path.display(), "boleto data file not found; starting empty");
                return Ok(Self::default());
            }
            Err(err) => {
                return Err(err).with_context(|| format!("failed to read {}", path.display()))
            }
        };
        let records: Vec<BoletoRecord> = serde_json::from_str(&raw)
            .with_context(|| format!("failed to parse boleto records in {}", path.display()))?;
        let store = Self::new(records);
        tracing::info!(
            path = %path.display(),
            records = store.by_barcode.len(),
            "boleto records loaded"
        );
        Ok(store)
    }

    pub fn len(&self) -> usize {
        self.by_barcode.len()
    }
}

impl RecordStore for InMemoryRecordStore {
    fn find_by_barcode(&self, barcode: &str) -> Option<BoletoRecord> {
        self.by_barcode.get(barcode).cloned()
    }

    fn find_by_document_id(&self, document_id: &str) -> Option<BoletoRecord> {
        self.by_document
            .get(document_id)
            .and_then(|barcode| self.by_barcode.get(barcode))
            .cloned()
    }

    fn is_empty(&self) -> bool {
        self.by_barcode.is_empty()
    }
}

#[derive(Debug, Deserialize)]
pub struct LookupRequest {
    #[serde(default, alias = "codigo_barras")]
    pub barcode: String,
}

#[derive(Debug, Serialize)]
pub struct LookupResponse {
    pub success: bool,
    pub message: String,
    pub boleto: BoletoRecord,
}

/// key: boleto-lookup -> barcode search
pub async fn lookup_by_barcode(
    Extension(store): Extension<Arc<dyn RecordStore>>,
    Json(payload): Json<LookupRequest>,
) -> AppResult<Json<LookupResponse>> {
    find(store.as_ref(), payload.barcode.trim())
}

pub async fn get_by_barcode(
    Extension(store): Extension<Arc<dyn RecordStore>>,
    UrlPath(barcode): UrlPath<String>,
) -> AppResult<Json<LookupResponse>> {
    find(store.as_ref(), barcode.trim())
}

fn find(store: &dyn RecordStore, barcode: &str) -> AppResult<Json<LookupResponse>> {
    if barcode.is_empty() {
        return Err(AppError::BadRequest("barcode is required".into()));
    }
    if store.is_empty() {
        return Err(AppError::Message("boleto record base unavailable".into()));
    }
    let boleto = store
        .find_by_barcode(barcode)
        .ok_or_else(|| AppError::NotFound("boleto with barcode not found".into()))?;
    Ok(Json(LookupResponse {
        success: true,
        message: "boleto found".into(),
        boleto,
    }))
}
