use std::env;
use std::path::PathBuf;
use std::time::Duration;

use crate::error::AppError;

#[derive(Debug, Clone)]
pub struct Config {
    pub port: u16,
    pub environment: String,
    pub database_url: String,
    pub otel_service_name: String,
    pub otel_exporter_endpoint: String,
    pub request_timeout_secs: u64,
    pub cors_allowed_origins: Option<Vec<String>>,
    pub work_dir: PathBuf,
    pub download_container: String,
    pub blob_account_url: String,
    pub blob_sas_token: String,
    pub ann: EngineCommandConfig,
    pub eo: EngineCommandConfig,
    pub mailgun_api_key: String,
    pub mailgun_domain: String,
    pub mailgun_base_url: String,
    pub mail_timeout_secs: u64,
    pub from_address: String,
    pub admin_email: String,
    pub email_subject: String,
    pub email_body: String,
}

/// How to launch one analysis engine. `args` may contain the placeholders
/// `{input}`, `{output_dir}`, `{output_name}` and `{stem}`.
#[derive(Debug, Clone)]
pub struct EngineCommandConfig {
    pub program: String,
    pub args: Vec<String>,
    pub working_dir: Option<PathBuf>,
}

impl Config {
    pub fn from_env() -> Result<Self, AppError> {
        dotenvy::dotenv().ok();

        Ok(Self {
            port: parsed("APP_PORT", 8080)?,
            environment: env::var("APP_ENVIRONMENT")
                .unwrap_or_else(|_| "development".to_string()),
            database_url: required("DATABASE_URL")?,
            otel_service_name: env::var("OTEL_SERVICE_NAME")
                .unwrap_or_else(|_| "swot-analyzer".to_string()),
            otel_exporter_endpoint: env::var("OTEL_EXPORTER_OTLP_ENDPOINT")
                .unwrap_or_else(|_| "http://localhost:4317".to_string()),
            request_timeout_secs: parsed("REQUEST_TIMEOUT_SECS", 240)?,
            cors_allowed_origins: env::var("CORS_ALLOWED_ORIGINS")
                .ok()
                .map(|v| split_list(&v))
                .filter(|origins| !origins.is_empty()),
            work_dir: env::var("WORK_DIR")
                .map(PathBuf::from)
                .unwrap_or_else(|_| env::temp_dir().join("swot-analyzer")),
            download_container: required("DOWNLOAD_CONTAINER")?,
            blob_account_url: required("BLOB_ACCOUNT_URL")?,
            blob_sas_token: required("BLOB_SAS_TOKEN")?,
            ann: engine_command("ANN")?,
            eo: engine_command("EO")?,
            mailgun_api_key: required("MAILGUN_API_KEY")?,
            mailgun_domain: required("MAILGUN_DOMAIN")?,
            mailgun_base_url: env::var("MAILGUN_BASE_URL")
                .unwrap_or_else(|_| "https://api.mailgun.net/v3".to_string()),
            mail_timeout_secs: parsed("MAIL_TIMEOUT_SECS", 30)?,
            from_address: required("FROM_ADDRESS")?,
            admin_email: required("ADMIN_EMAIL")?,
            email_subject: env::var("EMAIL_SUBJECT")
                .unwrap_or_else(|_| "SWOT analysis report".to_string()),
            email_body: env::var("EMAIL_BODY").unwrap_or_else(|_| {
                "Your analysis report is attached.".to_string()
            }),
        })
    }

    pub fn is_production(&self) -> bool {
        self.environment == "production"
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}

fn required(name: &str) -> Result<String, AppError> {
    env::var(name).map_err(|_| AppError::Config(format!("{name} must be set")))
}

fn parsed<T: std::str::FromStr>(name: &str, default: T) -> Result<T, AppError> {
    match env::var(name) {
        Ok(value) => value
            .trim()
            .parse()
            .map_err(|_| AppError::Config(format!("{name} must be a number, got {value:?}"))),
        Err(_) => Ok(default),
    }
}

fn engine_command(prefix: &str) -> Result<EngineCommandConfig, AppError> {
    let args_var = format!("{prefix}_ARGS");
    let args = match env::var(&args_var) {
        Ok(raw) => parse_args(&raw)
            .map_err(|e| AppError::Config(format!("{args_var} must be a JSON string array: {e}")))?,
        Err(_) => Vec::new(),
    };

    Ok(EngineCommandConfig {
        program: required(&format!("{prefix}_PROGRAM"))?,
        args,
        working_dir: env::var(format!("{prefix}_WORKING_DIR"))
            .ok()
            .map(PathBuf::from),
    })
}

pub(crate) fn parse_args(raw: &str) -> Result<Vec<String>, serde_json::Error> {
    serde_json::from_str(raw)
}

pub(crate) fn split_list(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}
