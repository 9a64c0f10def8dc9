//! Shared signed-REST helper for venue adapters.
//!
//! A thin `reqwest`-based client that knows how to attach an
//! HMAC-SHA256 signature for authenticated endpoints, the pattern common
//! to Binance-style CEX REST APIs, alongside plain unauthenticated GETs.

use std::time::Duration;

use chrono::Utc;
use reqwest::{Client, Method, RequestBuilder};
use tracing::{debug, warn};

use crate::error::{AdapterError, AdapterResult};
use crate::signing::HmacSigner;

const DEFAULT_TIMEOUT: Duration = Duration::from_secs(10);

/// A REST client bound to one venue's base URL and (optionally) a signer
/// for authenticated endpoints.
pub struct RestClient {
    http: Client,
    base_url: String,
    api_key: Option<String>,
    signer: Option<HmacSigner>,
    /// Header the signed API key rides on. Every HMAC-authenticated CEX
    /// picks its own name (Binance `X-MBX-APIKEY`, OKX `OK-ACCESS-KEY`,
    /// Gate.io `KEY`, BingX `X-BX-APIKEY`); defaults to Binance's.
    api_key_header: String,
}

impl RestClient {
    pub fn new(base_url: impl Into<String>) -> AdapterResult<Self> {
        let http = Client::builder()
            .timeout(DEFAULT_TIMEOUT)
            .build()
            .map_err(|e| AdapterError::Transport(e.to_string()))?;
        Ok(Self {
            http,
            base_url: base_url.into(),
            api_key: None,
            signer: None,
            api_key_header: "X-MBX-APIKEY".to_string(),
        })
    }

    pub fn with_credentials(mut self, api_key: impl Into<String>, api_secret: impl Into<String>) -> Self {
        self.api_key = Some(api_key.into());
        self.signer = Some(HmacSigner::new(api_secret.into()));
        self
    }

    pub fn with_api_key_header(mut self, header: impl Into<String>) -> Self {
        self.api_key_header = header.into();
        self
    }

    /// Build a request for `path`, signing it with the timestamp +
    /// query-string convention most HMAC-authenticated CEXes use, when
    /// credentials are configured.
    pub fn signed_request(&self, method: Method, path: &str, query: &str) -> AdapterResult<RequestBuilder> {
        let signer = self
            .signer
            .as_ref()
            .ok_or_else(|| AdapterError::CredentialMissing(self.base_url.clone()))?;
        let api_key = self
            .api_key
            .as_ref()
            .ok_or_else(|| AdapterError::CredentialMissing(self.base_url.clone()))?;

        let timestamp = Utc::now().timestamp_millis();
        let signed_query = if query.is_empty() {
            format!("timestamp={timestamp}")
        } else {
            format!("{query}&timestamp={timestamp}")
        };
        let signature = signer.sign_hex(&signed_query);
        let url = format!("{}{path}?{signed_query}&signature={signature}", self.base_url);

        debug!(%url, "building signed request");
        Ok(self
            .http
            .request(method, url)
            .header(self.api_key_header.as_str(), api_key))
    }

    pub fn public_request(&self, method: Method, path: &str) -> RequestBuilder {
        self.http.request(method, format!("{}{path}", self.base_url))
    }

    pub async fn send_json<T: serde::de::DeserializeOwned>(
        &self,
        builder: RequestBuilder,
    ) -> AdapterResult<T> {
        let response = builder
            .send()
            .await
            .map_err(|e| AdapterError::Transport(e.to_string()))?;

        let status = response.status();
        if status == reqwest::StatusCode::TOO_MANY_REQUESTS {
            return Err(AdapterError::RateLimit(self.base_url.clone()));
        }
        if status == reqwest::StatusCode::UNAUTHORIZED || status == reqwest::StatusCode::FORBIDDEN {
            return Err(AdapterError::CredentialInvalid(self.base_url.clone()));
        }
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            warn!(%status, %body, "venue API error");
            return Err(AdapterError::ApiError(format!("HTTP {status}: {body}")));
        }

        response
            .json::<T>()
            .await
            .map_err(|e| AdapterError::ApiError(format!("response parse failed: {e}")))
    }
}
