use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use serde::Deserialize;
use serde_json::{Map, Value};

use crate::error::SettlementError;
use crate::records::BoletoRecord;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AmountEncoding {
    /// `"15075"`
    String,
    /// `15075`
    Integer,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ClientKeySource {
    DocumentId,
    ClientReference,
}

/// key: settlement-payload-mapping -> provider field table
///
/// Every field name is provider configuration. The defaults reproduce the
/// layout expected by the STER registration endpoint.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct PayloadMapping {
    pub initiation_code_field: String,
    pub amount_field: String,
    pub tax_id_field: String,
    pub quantity_field: String,
    pub client_key_field: String,
    pub message_field: String,
    pub amount_encoding: AmountEncoding,
    pub client_key_prefix: String,
    pub client_key_source: ClientKeySource,
    pub quantity: u32,
    pub message: String,
}

impl Default for PayloadMapping {
    fn default() -> Self {
        Self {
            initiation_code_field: "codigoCorreios".into(),
            amount_field: "valorServico".into(),
            tax_id_field: "numeroIdentificacaoCliente".into(),
            quantity_field: "quantidade".into(),
            client_key_field: "chaveCliente".into(),
            message_field: "textoTicket".into(),
            amount_encoding: AmountEncoding::String,
            client_key_prefix: "ASL-".into(),
            client_key_source: ClientKeySource::DocumentId,
            quantity: 1,
            message: "Texto adicional no ticket".into(),
        }
    }
}

impl PayloadMapping {
    pub fn build(
        &self,
        initiation_code: &str,
        record: &BoletoRecord,
    ) -> Result<Value, SettlementError> {
        let cents = to_minor_units(record.amount).ok_or_else(|| SettlementError::InvalidRecord {
            document_id: record.document_id.clone(),
            reason: format!("amount {} is not a payable value", record.amount),
        })?;
        let key_source = match self.client_key_source {
            ClientKeySource::DocumentId => &record.document_id,
            ClientKeySource::ClientReference => &record.client_reference,
        };

        let mut payload = Map::new();
        payload.insert(
            self.initiation_code_field.clone(),
            Value::from(initiation_code),
        );
        payload.insert(self.amount_field.clone(), self.encode(cents));
        payload.insert(
            self.tax_id_field.clone(),
            Value::from(strip_tax_id(&record.debtor_tax_id)),
        );
        payload.insert(
            self.quantity_field.clone(),
            self.encode(i64::from(self.quantity)),
        );
        payload.insert(
            self.client_key_field.clone(),
            Value::from(format!("{}{key_source}", self.client_key_prefix)),
        );
        payload.insert(self.message_field.clone(), Value::from(self.message.clone()));
        Ok(Value::Object(payload))
    }

    fn encode(&self, value: i64) -> Value {
        match self.amount_encoding {
            AmountEncoding::String => Value::from(value.to_string()),
            AmountEncoding::Integer => Value::from(value),
        }
    }
}

/// Converts currency units to truncated minor units (cents).
pub fn to_minor_units(amount: Decimal) -> Option<i64> {
    if amount.is_sign_negative() {
        return None;
    }
    amount
        .checked_mul(Decimal::ONE_HUNDRED)
        .map(|cents| cents.trunc())
        .and_then(|cents| cents.to_i64())
}

/// Drops CPF/CNPJ punctuation such as `.`, `-` and `/`.
pub fn strip_tax_id(raw: &str) -> String {
    raw.chars().filter(char::is_ascii_alphanumeric).collect()
}
