//! PartsDesk HTTP Client
//!
//! This crate talks to the PartsDesk backend:
//! - Pooled reqwest client with retries for idempotent requests
//! - Public route classification and the skip-renewal marker
//! - Token renewal coordinator (single flight, throttled)
//! - Authenticated transport with session-ending 401 handling
//! - Login and incremental page loading

pub mod api;
pub mod auth;
pub mod client;
pub mod error;
pub mod paging;
pub mod renewal;
pub mod routes;

pub use api::{ApiClient, ApiConfig, ApiRequest, ApiResponse, TOKEN_EXPIRES_HEADER};
pub use auth::Credentials;
pub use client::HttpClientConfig;
pub use error::{ClientError, Result};
pub use paging::{PageFetch, PageKey, PageResult, PageSource, RouteFetcher};
pub use renewal::{
    Clock, ManualClock, RenewalConfig, RenewalEndpoint, RenewalOutcome, RenewedCredentials,
    SkipReason, SystemClock, TokenRenewalCoordinator,
};
pub use routes::{RequestOptions, RouteGuard};
