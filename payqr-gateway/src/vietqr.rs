use anyhow::{Context, Result, bail};
use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use log::{error, info};
use payqr_core::banks::deserialize_flag;
use payqr_core::{BankDirectory, BankRecord};
use reqwest::header::{HeaderMap, HeaderValue, CONTENT_TYPE};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::path::Path;
use std::time::{Duration, Instant};

pub const DEFAULT_BASE_URL: &str = "https://api.vietqr.io";
pub const DEFAULT_LOG_TARGET: &str = "payqr::gateway";

#[derive(Debug, Clone)]
pub struct GatewayConfig {
    pub base_url: String,
    pub client_id: String,
    pub api_key: String,
    pub timeout_secs: u64,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            client_id: String::new(),
            api_key: String::new(),
            timeout_secs: 10,
        }
    }
}

/// Body of `POST /v2/generate`.
#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct QrRequest {
    pub account_no: String,
    pub account_name: String,
    /// Receiving bank BIN.
    pub acq_id: String,
    /// Transfer memo shown to the payer.
    pub add_info: String,
    pub amount: u64,
    pub template: String,
}

/// One entry of `GET /v2/banks`. Upstream carries both `shortName` and
/// `short_name`, so this is kept apart from `BankRecord`.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ApiBank {
    id: Option<i64>,
    name: Option<String>,
    code: Option<String>,
    bin: Option<String>,
    short_name: Option<String>,
    #[serde(rename = "short_name")]
    short_name_legacy: Option<String>,
    logo: Option<String>,
    #[serde(default, deserialize_with = "deserialize_flag")]
    transfer_supported: bool,
    #[serde(default, deserialize_with = "deserialize_flag")]
    lookup_supported: bool,
    #[serde(default, deserialize_with = "deserialize_flag")]
    support: bool,
    #[serde(default, deserialize_with = "deserialize_flag")]
    is_transfer: bool,
    #[serde(rename = "swift_code")]
    swift_code: Option<String>,
}

impl From<ApiBank> for BankRecord {
    fn from(b: ApiBank) -> Self {
        BankRecord {
            id: b.id,
            name: b.name.unwrap_or_default(),
            code: b.code.unwrap_or_default(),
            bin: b.bin.unwrap_or_default(),
            logo: b.logo,
            transfer_supported: b.transfer_supported,
            lookup_supported: b.lookup_supported,
            short_name: b.short_name.or(b.short_name_legacy),
            support: b.support,
            is_transfer: b.is_transfer,
            swift_code: b.swift_code,
        }
    }
}

#[derive(Debug, Deserialize)]
struct BankListResponse {
    #[serde(default)]
    data: Vec<ApiBank>,
}

/// Decode the base64 payload of a `data:image/png;base64,....` URL.
pub fn decode_data_url(url: &str) -> Result<Vec<u8>> {
    let (_, encoded) = url
        .split_once(',')
        .ok_or_else(|| anyhow::anyhow!("qrDataURL has no ',' separator"))?;
    STANDARD
        .decode(encoded.trim())
        .context("qrDataURL payload is not valid base64")
}

/// Client for the VietQR generate and bank-list endpoints.
#[derive(Debug, Clone)]
pub struct VietQrClient {
    http: reqwest::Client,
    config: GatewayConfig,
    log_target: String,
}

impl VietQrClient {
    pub fn new(config: GatewayConfig) -> Result<Self> {
        Self::with_log_target(config, DEFAULT_LOG_TARGET)
    }

    pub fn with_log_target(config: GatewayConfig, log_target: impl Into<String>) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .context("build http client")?;
        Ok(Self {
            http,
            config,
            log_target: log_target.into(),
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.config.base_url.trim_end_matches('/'), path)
    }

    /// Generate a payment QR and return the decoded image bytes.
    pub async fn generate_qr(&self, req: &QrRequest) -> Result<Vec<u8>> {
        let target = self.log_target.as_str();
        info!(
            target: target,
            "generating QR for account {} bank {} amount {}",
            req.account_no, req.acq_id, req.amount
        );
        let started = Instant::now();

        let mut headers = HeaderMap::new();
        headers.insert("x-client-id", HeaderValue::from_str(&self.config.client_id)?);
        headers.insert("x-api-key", HeaderValue::from_str(&self.config.api_key)?);
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));

        let resp = self
            .http
            .post(self.url("/v2/generate"))
            .headers(headers)
            .json(req)
            .send()
            .await
            .context("vietqr generate request")?;

        let status = resp.status();
        let body: Value = resp.json().await.context("parse vietqr generate response")?;
        info!(
            target: target,
            "vietqr generate finished in {:.2} ms, status={status}",
            started.elapsed().as_secs_f64() * 1000.0
        );

        let data_url = body
            .get("data")
            .and_then(|d| d.get("qrDataURL"))
            .and_then(Value::as_str);
        match data_url {
            Some(url) if status.is_success() => decode_data_url(url),
            _ => {
                error!(target: target, "QR generation failed: {status} {body}");
                bail!("QR generation failed: {status} {body}");
            }
        }
    }

    /// Fetch the full bank list.
    pub async fn fetch_banks(&self) -> Result<Vec<BankRecord>> {
        let resp = self
            .http
            .get(self.url("/v2/banks"))
            .send()
            .await
            .context("vietqr banks request")?
            .error_for_status()
            .context("vietqr banks status")?;
        let out: BankListResponse = resp.json().await.context("parse vietqr bank list")?;
        Ok(out.data.into_iter().map(BankRecord::from).collect())
    }

    /// Fetch the bank list and replace the directory file at `path`.
    /// On any failure the existing file is left as it was.
    pub async fn refresh_directory(&self, path: &Path) -> Result<BankDirectory> {
        let target = self.log_target.as_str();
        let result = self.try_refresh(path).await;
        match &result {
            Ok(d) => info!(
                target: target,
                "bank directory updated: {} banks -> {}",
                d.len(),
                path.display()
            ),
            Err(e) => error!(target: target, "bank directory refresh failed: {e:#}"),
        }
        result
    }

    async fn try_refresh(&self, path: &Path) -> Result<BankDirectory> {
        let banks = self.fetch_banks().await?;
        let directory = BankDirectory::from_records(banks);
        if directory.is_empty() {
            bail!("bank list came back empty");
        }
        directory.save_atomic(path)?;
        Ok(directory)
    }
}
