//! Route classification for authorization and renewal
//!
//! Public routes (login, registration, password recovery) never carry an
//! authorization header and never trigger a renewal check. Neither does the
//! renewal endpoint itself, nor any request explicitly marked with
//! [`RequestOptions::skip_renewal`]; a renewal is itself an HTTP request and
//! would otherwise re-enter the check.

/// Route suffixes reachable without a session
pub const DEFAULT_PUBLIC_ROUTES: [&str; 6] = [
    "/auth/login",
    "/auth/register",
    "/auth/forgot-password",
    "/auth/verify-reset-code",
    "/auth/reset-password",
    "/health",
];

pub const DEFAULT_RENEWAL_PATH: &str = "/auth/renew";

/// Per-request transport options
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RequestOptions {
    /// Do not evaluate token renewal for this request
    pub skip_renewal: bool,
}

impl RequestOptions {
    pub fn skip_renewal() -> Self {
        Self { skip_renewal: true }
    }
}

#[derive(Debug, Clone)]
pub struct RouteGuard {
    public_suffixes: Vec<String>,
    renewal_path: String,
}

impl Default for RouteGuard {
    fn default() -> Self {
        Self::new(DEFAULT_PUBLIC_ROUTES, DEFAULT_RENEWAL_PATH)
    }
}

impl RouteGuard {
    pub fn new<I, S>(public_suffixes: I, renewal_path: impl Into<String>) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let renewal_path: String = renewal_path.into();
        Self {
            public_suffixes: public_suffixes
                .into_iter()
                .map(|s| {
                    let s: String = s.into();
                    normalize_path(&s).to_string()
                })
                .filter(|s| !s.is_empty())
                .collect(),
            renewal_path: normalize_path(&renewal_path).to_string(),
        }
    }

    /// Whether `path` ends with one of the public route suffixes
    pub fn is_public(&self, path: &str) -> bool {
        let path = normalize_path(path);
        self.public_suffixes
            .iter()
            .any(|suffix| path.ends_with(suffix.as_str()))
    }

    /// Whether `path` is the renewal endpoint
    pub fn is_renewal(&self, path: &str) -> bool {
        !self.renewal_path.is_empty() && normalize_path(path).ends_with(&self.renewal_path)
    }

    /// Whether a request to `path` may evaluate token renewal
    pub fn should_trigger_renewal(&self, path: &str, options: &RequestOptions) -> bool {
        !options.skip_renewal && !self.is_public(path) && !self.is_renewal(path)
    }

    pub fn renewal_path(&self) -> &str {
        &self.renewal_path
    }
}

/// Drop the query string and trailing slashes
fn normalize_path(path: &str) -> &str {
    let path = path.split(['?', '#']).next().unwrap_or_default();
    path.trim_end_matches('/')
}
