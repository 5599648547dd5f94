use std::fs;
use std::time::Duration;

use anyhow::{anyhow, bail, Context, Result};
use once_cell::sync::Lazy;
use serde_json::Value;

use crate::settlement::{
    ConfirmationPolicy, ConfirmationReentry, EngineSettings, PayloadMapping, ReferenceExtractor,
    UnknownProtocolStatus,
};

/// Address the HTTP server should bind to. Defaults to `0.0.0.0`.
pub static BIND_ADDRESS: Lazy<String> =
    Lazy::new(|| std::env::var("BIND_ADDRESS").unwrap_or_else(|_| "0.0.0.0".to_string()));

/// Port the HTTP server should listen on. Defaults to `3000`.
pub static BIND_PORT: Lazy<u16> = Lazy::new(|| {
    std::env::var("BIND_PORT")
        .ok()
        .and_then(|value| value.parse::<u16>().ok())
        .unwrap_or(3000)
});

/// JSON file holding the boleto record set. Defaults to `data/boletos.json`.
pub static BOLETO_DATA_PATH: Lazy<String> = Lazy::new(|| {
    read_optional_env("BOLETO_DATA_PATH").unwrap_or_else(|| "data/boletos.json".to_string())
});

pub const DEFAULT_REGISTRATION_URL: &str =
    "https://apphom.correios.com.br/ster/api/v1/atendimentos/registra";

const MIN_REGISTRATION_TIMEOUT_SECS: u64 = 10;
const MAX_REGISTRATION_TIMEOUT_SECS: u64 = 30;

/// key: settlement-config -> workflow settings resolved at startup
#[derive(Debug, Clone)]
pub struct SettlementConfig {
    pub registration_url: String,
    pub registration_token: Option<String>,
    pub reference_fields: ReferenceExtractor,
    pub engine: EngineSettings,
    pub confirmation: ConfirmationPolicy,
    pub job_retention: Option<chrono::Duration>,
    pub sweep_interval: Duration,
}

pub fn settlement_config_from_env() -> Result<SettlementConfig> {
    let registration_url = read_optional_env("SETTLEMENT_REGISTRATION_URL")
        .unwrap_or_else(|| DEFAULT_REGISTRATION_URL.to_string());
    url::Url::parse(&registration_url).with_context(|| {
        format!("SETTLEMENT_REGISTRATION_URL is not a valid URL: {registration_url}")
    })?;

    let registration_token = read_secret_env(
        "SETTLEMENT_REGISTRATION_TOKEN",
        "SETTLEMENT_REGISTRATION_TOKEN_FILE",
    )?;

    let timeout_secs = read_optional_env("SETTLEMENT_REGISTRATION_TIMEOUT_SECS")
        .and_then(|value| value.parse::<u64>().ok())
        .map(clamp_timeout_secs)
        .unwrap_or(MAX_REGISTRATION_TIMEOUT_SECS);

    let mapping = match json_from_env("SETTLEMENT_PAYLOAD_MAPPING")? {
        Some(value) => serde_json::from_value::<PayloadMapping>(value)
            .context("SETTLEMENT_PAYLOAD_MAPPING does not describe a payload mapping")?,
        None => PayloadMapping::default(),
    };

    let reference_fields = read_optional_env("SETTLEMENT_REFERENCE_FIELDS")
        .map(|value| split_list(&value))
        .filter(|fields| !fields.is_empty())
        .map(ReferenceExtractor::new)
        .unwrap_or_default();

    let dispatch_queue = read_optional_env("SETTLEMENT_DISPATCH_QUEUE")
        .and_then(|value| value.parse::<usize>().ok())
        .filter(|value| *value > 0)
        .unwrap_or(64);

    let confirmation = ConfirmationPolicy {
        reentry: parse_reentry(read_optional_env("SETTLEMENT_CONFIRMATION_REENTRY").as_deref())?,
        unknown_protocol: parse_unknown_protocol_status(
            read_optional_env("SETTLEMENT_UNKNOWN_PROTOCOL_STATUS").as_deref(),
        )?,
    };

    let job_retention = read_optional_env("SETTLEMENT_JOB_RETENTION_SECS")
        .and_then(|value| value.parse::<i64>().ok())
        .filter(|value| *value > 0)
        .map(chrono::Duration::seconds);

    let sweep_interval = read_optional_env("SETTLEMENT_SWEEP_INTERVAL_SECS")
        .and_then(|value| value.parse::<u64>().ok())
        .filter(|value| *value > 0)
        .map(Duration::from_secs)
        .unwrap_or(Duration::from_secs(300));

    Ok(SettlementConfig {
        registration_url,
        registration_token,
        reference_fields,
        engine: EngineSettings {
            mapping,
            call_timeout: Duration::from_secs(timeout_secs),
            dispatch_queue,
        },
        confirmation,
        job_retention,
        sweep_interval,
    })
}

pub fn clamp_timeout_secs(value: u64) -> u64 {
    value.clamp(MIN_REGISTRATION_TIMEOUT_SECS, MAX_REGISTRATION_TIMEOUT_SECS)
}

pub fn parse_reentry(raw: Option<&str>) -> Result<ConfirmationReentry> {
    match raw.map(|value| value.trim().to_ascii_lowercase()).as_deref() {
        None | Some("") | Some("idempotent") => Ok(ConfirmationReentry::Idempotent),
        Some("reject") => Ok(ConfirmationReentry::Reject),
        Some(other) => Err(anyhow!(
            "unsupported SETTLEMENT_CONFIRMATION_REENTRY value '{other}'; expected 'idempotent' or 'reject'"
        )),
    }
}

pub fn parse_unknown_protocol_status(raw: Option<&str>) -> Result<UnknownProtocolStatus> {
    match raw.map(str::trim) {
        None | Some("") | Some("404") => Ok(UnknownProtocolStatus::NotFound),
        Some("400") => Ok(UnknownProtocolStatus::BadRequest),
        Some(other) => bail!(
            "unsupported SETTLEMENT_UNKNOWN_PROTOCOL_STATUS value '{other}'; expected '404' or '400'"
        ),
    }
}

fn split_list(raw: &str) -> Vec<String> {
    raw.split(',')
        .filter_map(|item| {
            let trimmed = item.trim();
            if trimmed.is_empty() {
                None
            } else {
                Some(trimmed.to_string())
            }
        })
        .collect()
}

fn read_optional_env(key: &str) -> Option<String> {
    std::env::var(key)
        .ok()
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
}

fn read_secret_env(value_key: &str, file_key: &str) -> Result<Option<String>> {
    if let Some(path) = read_optional_env(file_key) {
        let contents = fs::read_to_string(&path)
            .with_context(|| format!("failed to read {file_key} from {path}"))?;
        let trimmed = contents.trim().to_string();
        if !trimmed.is_empty() {
            return Ok(Some(trimmed));
        }
    }

    Ok(read_optional_env(value_key))
}

fn json_from_env(var: &str) -> Result<Option<Value>> {
    match read_optional_env(var) {
        Some(raw) => serde_json::from_str(&raw)
            .map(Some)
            .with_context(|| format!("failed to parse {var} as JSON")),
        None => Ok(None),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn timeout_is_clamped_to_provider_window() {
        assert_eq!(clamp_timeout_secs(1), 10);
        assert_eq!(clamp_timeout_secs(15), 15);
        assert_eq!(clamp_timeout_secs(120), 30);
    }

    #[test]
    fn confirmation_policy_values_parse() {
        assert_eq!(parse_reentry(None).unwrap(), ConfirmationReentry::Idempotent);
        assert_eq!(
            parse_reentry(Some(" Reject ")).unwrap(),
            ConfirmationReentry::Reject
        );
        assert!(parse_reentry(Some("sometimes")).is_err());

        assert_eq!(
            parse_unknown_protocol_status(Some("400")).unwrap(),
            UnknownProtocolStatus::BadRequest
        );
        assert_eq!(
            parse_unknown_protocol_status(None).unwrap(),
            UnknownProtocolStatus::NotFound
        );
        assert!(parse_unknown_protocol_status(Some("418")).is_err());
    }

    use std::io::Write;
    use std::sync::Mutex;

    use crate::settlement::AmountEncoding;

    static ENV_LOCK: Mutex<()> = Mutex::new(());

    const SETTLEMENT_VARS: &[&str] = &[
        "SETTLEMENT_REGISTRATION_URL",
        "SETTLEMENT_REGISTRATION_TOKEN",
        "SETTLEMENT_REGISTRATION_TOKEN_FILE",
        "SETTLEMENT_REGISTRATION_TIMEOUT_SECS",
        "SETTLEMENT_PAYLOAD_MAPPING",
        "SETTLEMENT_REFERENCE_FIELDS",
        "SETTLEMENT_UNKNOWN_PROTOCOL_STATUS",
        "SETTLEMENT_CONFIRMATION_REENTRY",
        "SETTLEMENT_DISPATCH_QUEUE",
        "SETTLEMENT_JOB_RETENTION_SECS",
        "SETTLEMENT_SWEEP_INTERVAL_SECS",
    ];

    fn with_env<T>(vars: &[(&str, &str)], body: impl FnOnce() -> T) -> T {
        let _guard = ENV_LOCK.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        for key in SETTLEMENT_VARS {
            std::env::remove_var(key);
        }
        for (key, value) in vars {
            std::env::set_var(key, value);
        }
        let result = body();
        for key in SETTLEMENT_VARS {
            std::env::remove_var(key);
        }
        result
    }

    #[test]
    fn defaults_leave_retention_off() {
        let config = with_env(&[], settlement_config_from_env).unwrap();
        assert_eq!(config.registration_url, DEFAULT_REGISTRATION_URL);
        assert!(config.registration_token.is_none());
        assert!(config.job_retention.is_none());
        assert_eq!(config.sweep_interval, Duration::from_secs(300));
        assert_eq!(config.engine.call_timeout, Duration::from_secs(30));
        assert_eq!(config.engine.dispatch_queue, 64);
        assert_eq!(config.confirmation, ConfirmationPolicy::default());
    }

    #[test]
    fn overrides_are_read_from_env() {
        let config = with_env(
            &[
                ("SETTLEMENT_REGISTRATION_TIMEOUT_SECS", "5"),
                (
                    "SETTLEMENT_PAYLOAD_MAPPING",
                    r#"{"amount_field": "valor", "amount_encoding": "integer", "client_key_prefix": "X-"}"#,
                ),
                ("SETTLEMENT_REFERENCE_FIELDS", "protocolo"),
                ("SETTLEMENT_CONFIRMATION_REENTRY", "reject"),
                ("SETTLEMENT_JOB_RETENTION_SECS", "3600"),
                ("SETTLEMENT_SWEEP_INTERVAL_SECS", "15"),
            ],
            settlement_config_from_env,
        )
        .unwrap();
        assert_eq!(config.engine.call_timeout, Duration::from_secs(10));
        assert_eq!(config.engine.mapping.amount_field, "valor");
        assert_eq!(config.engine.mapping.amount_encoding, AmountEncoding::Integer);
        assert_eq!(config.engine.mapping.client_key_prefix, "X-");
        assert_eq!(config.engine.mapping.initiation_code_field, "codigoCorreios");
        assert_eq!(
            config.reference_fields.candidates().to_vec(),
            vec!["protocolo".to_string()]
        );
        assert_eq!(config.confirmation.reentry, ConfirmationReentry::Reject);
        assert_eq!(config.job_retention, Some(chrono::Duration::hours(1)));
        assert_eq!(config.sweep_interval, Duration::from_secs(15));
    }

    #[test]
    fn token_file_takes_precedence() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "  file-token  ").unwrap();
        let path = file.path().to_string_lossy().to_string();

        let config = with_env(
            &[
                ("SETTLEMENT_REGISTRATION_TOKEN", "inline-token"),
                ("SETTLEMENT_REGISTRATION_TOKEN_FILE", path.as_str()),
            ],
            settlement_config_from_env,
        )
        .unwrap();
        assert_eq!(config.registration_token.as_deref(), Some("file-token"));

        let config = with_env(
            &[("SETTLEMENT_REGISTRATION_TOKEN", "inline-token")],
            settlement_config_from_env,
        )
        .unwrap();
        assert_eq!(config.registration_token.as_deref(), Some("inline-token"));
    }

    #[test]
    fn invalid_settings_fail_startup() {
        let err = with_env(
            &[("SETTLEMENT_REGISTRATION_URL", "not a url")],
            settlement_config_from_env,
        )
        .unwrap_err();
        assert!(err.to_string().contains("SETTLEMENT_REGISTRATION_URL"));

        let err = with_env(
            &[("SETTLEMENT_PAYLOAD_MAPPING", "{broken")],
            settlement_config_from_env,
        )
        .unwrap_err();
        assert!(err.to_string().contains("SETTLEMENT_PAYLOAD_MAPPING"));

        let err = with_env(
            &[("SETTLEMENT_REGISTRATION_TOKEN_FILE", "/nonexistent/settlement/token")],
            settlement_config_from_env,
        )
        .unwrap_err();
        assert!(err.to_string().contains("SETTLEMENT_REGISTRATION_TOKEN_FILE"));
    }

    #[test]
    fn reference_field_lists_ignore_blanks() {
        assert_eq!(
            split_list("protocolo, ,codigo,"),
            vec!["protocolo".to_string(), "codigo".to_string()]
        );
    }
}
