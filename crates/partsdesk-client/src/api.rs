//! Authenticated HTTP transport
//!
//! Every outbound call goes through [`ApiClient::execute`], which:
//! - attaches the bearer token unless the route is public
//! - spawns a renewal check when the route may trigger one
//! - refreshes the stored expiry from the `X-Token-Expires-At` header
//! - clears the session when an authenticated call is rejected with 401

use partsdesk_core::page::DEFAULT_ALIASES;
use partsdesk_core::{DecodedPage, PageDecoder, SessionStore};
use partsdesk_observability::Metrics;
use reqwest::{Client, Method, StatusCode};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info, instrument, warn};

use crate::client::{HttpClientConfig, create_client, with_retry};
use crate::renewal::{HttpRenewalEndpoint, RenewalConfig, TokenRenewalCoordinator, join_url};
use crate::routes::{DEFAULT_PUBLIC_ROUTES, RequestOptions, RouteGuard};
use crate::{ClientError, Result};

/// Response header carrying the token's current expiry
pub const TOKEN_EXPIRES_HEADER: &str = "x-token-expires-at";

/// API client configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ApiConfig {
    /// Backend base URL, e.g. `https://api.example.com/api`
    pub base_url: String,

    pub http: HttpClientConfig,

    pub renewal: RenewalConfig,

    /// Route suffixes sent without authorization
    pub public_routes: Vec<String>,

    /// Extra wrapper keys the page decoder descends into
    pub page_aliases: Vec<String>,

    pub login_path: String,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:3000/api".to_string(),
            http: HttpClientConfig::default(),
            renewal: RenewalConfig::default(),
            public_routes: DEFAULT_PUBLIC_ROUTES.iter().map(|s| s.to_string()).collect(),
            page_aliases: DEFAULT_ALIASES.iter().map(|s| s.to_string()).collect(),
            login_path: "/auth/login".to_string(),
        }
    }
}

/// A request to the backend, relative to the base URL
#[derive(Debug, Clone)]
pub struct ApiRequest {
    pub method: Method,
    pub path: String,
    pub query: Vec<(String, String)>,
    pub body: Option<serde_json::Value>,
    pub options: RequestOptions,
}

impl ApiRequest {
    pub fn new(method: Method, path: impl Into<String>) -> Self {
        Self {
            method,
            path: path.into(),
            query: Vec::new(),
            body: None,
            options: RequestOptions::default(),
        }
    }

    pub fn get(path: impl Into<String>) -> Self {
        Self::new(Method::GET, path)
    }

    pub fn post(path: impl Into<String>) -> Self {
        Self::new(Method::POST, path)
    }

    pub fn query(mut self, key: impl Into<String>, value: impl ToString) -> Self {
        self.query.push((key.into(), value.to_string()));
        self
    }

    pub fn json(mut self, body: serde_json::Value) -> Self {
        self.body = Some(body);
        self
    }

    pub fn skip_renewal(mut self) -> Self {
        self.options.skip_renewal = true;
        self
    }
}

/// A completed response with its body read
#[derive(Debug, Clone)]
pub struct ApiResponse {
    pub status: u16,
    /// Value of the expiry header, if any
    pub token_expires_at: Option<String>,
    pub body: String,
}

impl ApiResponse {
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    /// Strict decode of the whole body
    pub fn json<T: DeserializeOwned>(&self) -> Result<T> {
        serde_json::from_str(&self.body).map_err(|e| ClientError::Parse(e.to_string()))
    }
}

/// HTTP transport bound to one session store and one renewal coordinator
#[derive(Clone)]
pub struct ApiClient {
    http: Client,
    base_url: String,
    store: Arc<dyn SessionStore>,
    routes: RouteGuard,
    renewal: Arc<TokenRenewalCoordinator>,
    decoder: PageDecoder,
    max_retries: u32,
    login_path: String,
    metrics: Option<Metrics>,
}

impl std::fmt::Debug for ApiClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ApiClient")
            .field("base_url", &self.base_url)
            .field("routes", &self.routes)
            .field("max_retries", &self.max_retries)
            .finish_non_exhaustive()
    }
}

impl ApiClient {
    pub fn new(config: ApiConfig, store: Arc<dyn SessionStore>) -> Result<Self> {
        Self::build(config, store, None)
    }

    pub fn with_metrics(
        config: ApiConfig,
        store: Arc<dyn SessionStore>,
        metrics: Metrics,
    ) -> Result<Self> {
        Self::build(config, store, Some(metrics))
    }

    fn build(
        config: ApiConfig,
        store: Arc<dyn SessionStore>,
        metrics: Option<Metrics>,
    ) -> Result<Self> {
        let base_url = config.base_url.trim().trim_end_matches('/').to_string();
        if base_url.is_empty() {
            return Err(ClientError::Config("base_url must not be empty".to_string()));
        }

        let http = create_client(&config.http)?;
        let endpoint = HttpRenewalEndpoint::new(http.clone(), &base_url, &config.renewal.path);
        let mut coordinator = TokenRenewalCoordinator::new(
            Arc::clone(&store),
            Arc::new(endpoint),
            config.renewal.clone(),
        );
        if let Some(metrics) = &metrics {
            coordinator = coordinator.with_metrics(metrics.clone());
        }

        Ok(Self {
            http,
            base_url,
            routes: RouteGuard::new(config.public_routes, config.renewal.path),
            store,
            renewal: Arc::new(coordinator),
            decoder: PageDecoder::with_aliases(config.page_aliases),
            max_retries: config.http.max_retries,
            login_path: config.login_path,
            metrics,
        })
    }

    /// Replace the renewal coordinator, e.g. to inject a clock or endpoint
    pub fn with_renewal_coordinator(mut self, coordinator: Arc<TokenRenewalCoordinator>) -> Self {
        self.renewal = coordinator;
        self
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub fn store(&self) -> &Arc<dyn SessionStore> {
        &self.store
    }

    pub fn renewal(&self) -> &Arc<TokenRenewalCoordinator> {
        &self.renewal
    }

    pub fn routes(&self) -> &RouteGuard {
        &self.routes
    }

    pub fn decoder(&self) -> &PageDecoder {
        &self.decoder
    }

    pub(crate) fn login_path(&self) -> &str {
        &self.login_path
    }

    /// Send a request and read its body.
    ///
    /// Returns [`ClientError::Status`] for non-success responses and
    /// [`ClientError::SessionEnded`] when an authenticated call is rejected
    /// and its session was cleared.
    #[instrument(skip(self, request), fields(method = %request.method, path = %request.path))]
    pub async fn execute(&self, request: ApiRequest) -> Result<ApiResponse> {
        let public = self.routes.is_public(&request.path);
        let token = if public { None } else { self.store.token() };
        if !public && token.is_none() {
            return Err(ClientError::NotAuthenticated);
        }

        if self
            .routes
            .should_trigger_renewal(&request.path, &request.options)
        {
            // Fire and forget; the request does not wait for the renewal
            let _ = self.renewal.trigger();
        }

        let request_ref = &request;
        let token_ref = token.as_deref();
        let send = move || self.send_once(request_ref, token_ref);
        let response = if request.method == Method::GET {
            with_retry(self.max_retries, send).await?
        } else {
            send().await?
        };

        if response.status == StatusCode::UNAUTHORIZED.as_u16() {
            if public {
                return Err(ClientError::Status {
                    status_code: response.status,
                    message: response.body,
                });
            }
            if self.end_session(token_ref) {
                return Err(ClientError::SessionEnded);
            }
            // The rejected token was already replaced; the stored session stays
            return Err(ClientError::Status {
                status_code: response.status,
                message: response.body,
            });
        }

        if let (Some(sent), Some(expires_at)) = (token_ref, response.token_expires_at.as_deref()) {
            self.refresh_expiry(sent, expires_at);
        }

        if !response.is_success() {
            return Err(ClientError::Status {
                status_code: response.status,
                message: response.body,
            });
        }
        Ok(response)
    }

    pub async fn get(&self, path: &str) -> Result<ApiResponse> {
        self.execute(ApiRequest::get(path)).await
    }

    pub async fn get_json<T: DeserializeOwned>(&self, path: &str) -> Result<T> {
        self.get(path).await?.json()
    }

    pub async fn post_json(&self, path: &str, body: serde_json::Value) -> Result<ApiResponse> {
        self.execute(ApiRequest::post(path).json(body)).await
    }

    /// Fetch a list endpoint and resolve its shape
    pub async fn get_page<T: DeserializeOwned>(
        &self,
        request: ApiRequest,
    ) -> Result<DecodedPage<T>> {
        let response = self.execute(request).await?;
        Ok(self.decode_page(&response.body))
    }

    pub fn decode_page<T: DeserializeOwned>(&self, body: &str) -> DecodedPage<T> {
        let (page, shape) = self.decoder.decode_with_shape(body);
        debug!(shape = shape.as_str(), items = page.items().len(), "Decoded page");
        if let Some(metrics) = &self.metrics {
            metrics.record_page_decode(shape.as_str());
        }
        page
    }

    /// Forget the session locally
    pub fn logout(&self) -> Result<()> {
        self.store.clear_session()?;
        self.renewal.reset();
        if let Some(metrics) = &self.metrics {
            metrics.record_session_clear("logout");
        }
        info!("Logged out");
        Ok(())
    }

    async fn send_once(&self, request: &ApiRequest, token: Option<&str>) -> Result<ApiResponse> {
        let url = join_url(&self.base_url, &request.path);
        let mut builder = self.http.request(request.method.clone(), &url);
        if !request.query.is_empty() {
            builder = builder.query(&request.query);
        }
        if let Some(token) = token {
            builder = builder.bearer_auth(token);
        }
        if let Some(body) = &request.body {
            builder = builder.json(body);
        }

        let started = Instant::now();
        let response = match builder.send().await {
            Ok(response) => response,
            Err(e) => {
                self.record_request(&request.method, None, started);
                return Err(e.into());
            }
        };

        let status = response.status().as_u16();
        self.record_request(&request.method, Some(status), started);

        let token_expires_at = response
            .headers()
            .get(TOKEN_EXPIRES_HEADER)
            .and_then(|v| v.to_str().ok())
            .map(str::trim)
            .filter(|v| !v.is_empty())
            .map(str::to_string);
        let body = response.text().await?;

        debug!(status, bytes = body.len(), "Response received");

        let response = ApiResponse {
            status,
            token_expires_at,
            body,
        };
        if matches!(status, 429 | 502 | 503 | 504) {
            return Err(ClientError::Status {
                status_code: status,
                message: response.body,
            });
        }
        Ok(response)
    }

    fn record_request(&self, method: &Method, status: Option<u16>, started: Instant) {
        if let Some(metrics) = &self.metrics {
            metrics.record_http_request(method.as_str(), status, started.elapsed().as_secs_f64());
        }
    }

    fn refresh_expiry(&self, sent_token: &str, expires_at: &str) {
        // A renewal may have rotated the token while this request was in flight
        if self.store.token().as_deref() != Some(sent_token) {
            return;
        }
        if self.store.expiry().as_deref() == Some(expires_at) {
            return;
        }
        match self.store.update_expiry(expires_at) {
            Ok(()) => debug!(expires_at, "Token expiry refreshed from response header"),
            Err(e) => warn!(error = %e, "Failed to store refreshed expiry"),
        }
    }

    /// Clear the session whose token was rejected; false when the stored
    /// token has changed since the request was sent
    fn end_session(&self, sent_token: Option<&str>) -> bool {
        if self.store.token().as_deref() != sent_token {
            debug!("Rejected token was already replaced, keeping session");
            return false;
        }
        warn!("Authorization rejected, clearing session");
        if let Err(e) = self.store.clear_session() {
            warn!(error = %e, "Failed to clear session");
        }
        self.renewal.reset();
        if let Some(metrics) = &self.metrics {
            metrics.record_session_clear("unauthorized");
        }
        true
    }
}
