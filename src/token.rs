use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use futures::future::{BoxFuture, FutureExt, Shared};
use jsonwebtoken::{decode, Algorithm, DecodingKey, Validation};
use serde::Deserialize;
use serde_json::{json, Value};
use tokio::sync::Mutex;

use crate::error::TokenError;
use crate::request::{Method, RequestBuilder, RequestOptions};
use crate::response::{normalize, Payload};
use crate::transport::Transport;

/// What the token provider knows about the caller's identity.
///
/// `Anonymous` (no credentials were ever configured) and `RefreshFailed`
/// (credentials exist but the auth provider could not issue a token) both
/// mean "send the request without `Authorization`", but callers that want to
/// prompt for sign-in versus report an outage can tell them apart.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TokenState {
    Authenticated(String),
    Anonymous,
    RefreshFailed(String),
}

impl TokenState {
    pub fn into_token(self) -> Option<String> {
        match self {
            TokenState::Authenticated(token) => Some(token),
            TokenState::Anonymous | TokenState::RefreshFailed(_) => None,
        }
    }
}

/// Supplies the bearer token for each call
#[async_trait]
pub trait TokenProvider: Send + Sync {
    async fn token_state(&self) -> TokenState;

    /// Bearer token for the next call, or `None` to proceed unauthenticated.
    /// Never fails: refresh errors surface as `None`.
    async fn get_token(&self) -> Option<String> {
        self.token_state().await.into_token()
    }

    /// Forget `token` if it is still the cached one, e.g. after the server
    /// answered 401 to a request that carried it. A newer token issued in
    /// the meantime is kept.
    async fn invalidate(&self, _token: &str) {}
}

/// A token as issued by the auth provider
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IssuedToken {
    pub token: String,
    pub expires_at: Option<DateTime<Utc>>,
}

impl IssuedToken {
    pub fn new(token: impl Into<String>) -> Self {
        Self {
            token: token.into(),
            expires_at: None,
        }
    }

    pub fn expiring_at(token: impl Into<String>, expires_at: DateTime<Utc>) -> Self {
        Self {
            token: token.into(),
            expires_at: Some(expires_at),
        }
    }

    /// Fill a missing expiry from the JWT `exp` claim, when the token is a JWT
    pub fn with_jwt_expiry(mut self) -> Self {
        if self.expires_at.is_none() {
            self.expires_at = jwt_expiry(&self.token);
        }
        self
    }

    /// Tokens without a known expiry stay fresh until invalidated
    pub fn is_fresh(&self, now: DateTime<Utc>, leeway: Duration) -> bool {
        match self.expires_at {
            Some(expires_at) => now
                .checked_add_signed(leeway)
                .map(|stale_at| stale_at < expires_at)
                .unwrap_or(false),
            None => true,
        }
    }
}

#[derive(Debug, Deserialize)]
struct ExpiryClaim {
    exp: i64,
}

/// Read `exp` without verifying the signature; the server does the verifying
fn jwt_expiry(token: &str) -> Option<DateTime<Utc>> {
    let mut validation = Validation::new(Algorithm::HS256);
    validation.insecure_disable_signature_validation();
    validation.validate_exp = false;
    validation.validate_aud = false;
    validation.required_spec_claims.clear();

    let data = decode::<ExpiryClaim>(token, &DecodingKey::from_secret(&[]), &validation).ok()?;
    DateTime::<Utc>::from_timestamp(data.claims.exp, 0)
}

/// The auth provider: performs one token fetch or refresh round trip
#[async_trait]
pub trait TokenSource: Send + Sync + 'static {
    async fn fetch_token(&self) -> Result<IssuedToken, TokenError>;
}

/// Fixed token (or none at all)
#[derive(Debug, Clone, Default)]
pub struct StaticTokenProvider {
    token: Option<String>,
}

impl StaticTokenProvider {
    pub fn new(token: Option<String>) -> Self {
        Self { token }
    }

    pub fn anonymous() -> Self {
        Self { token: None }
    }
}

#[async_trait]
impl TokenProvider for StaticTokenProvider {
    async fn token_state(&self) -> TokenState {
        match &self.token {
            Some(token) => TokenState::Authenticated(token.clone()),
            None => TokenState::Anonymous,
        }
    }
}

type SharedRefresh = Shared<BoxFuture<'static, Result<IssuedToken, TokenError>>>;

#[derive(Default)]
struct CacheState {
    cached: Option<IssuedToken>,
    in_flight: Option<(u64, SharedRefresh)>,
    generation: u64,
}

/// Caches the last issued token and refreshes it single-flight.
///
/// While a refresh is in flight every caller awaits the same shared future,
/// so N concurrent callers with an empty cache cause exactly one
/// `fetch_token` round trip and all receive the same token.
pub struct CachingTokenProvider<S: TokenSource> {
    source: Arc<S>,
    leeway: Duration,
    state: Mutex<CacheState>,
}

impl<S: TokenSource> CachingTokenProvider<S> {
    pub fn new(source: S) -> Self {
        Self::with_leeway(source, Duration::seconds(30))
    }

    /// Treat cached tokens as stale `leeway` before they actually expire
    pub fn with_leeway(source: S, leeway: Duration) -> Self {
        Self {
            source: Arc::new(source),
            leeway,
            state: Mutex::new(CacheState::default()),
        }
    }

    pub fn source(&self) -> &S {
        &self.source
    }

    /// Currently cached token, without triggering a refresh
    pub async fn cached(&self) -> Option<IssuedToken> {
        self.state.lock().await.cached.clone()
    }

    async fn refresh(&self) -> Result<IssuedToken, TokenError> {
        let (generation, refresh) = {
            let mut state = self.state.lock().await;

            if let Some(issued) = &state.cached {
                if issued.is_fresh(Utc::now(), self.leeway) {
                    return Ok(issued.clone());
                }
            }

            match &state.in_flight {
                Some((generation, refresh)) => (*generation, refresh.clone()),
                None => {
                    state.generation += 1;
                    let generation = state.generation;
                    let source = Arc::clone(&self.source);
                    let refresh = async move {
                        tracing::debug!("Refreshing bearer token");
                        source.fetch_token().await.map(IssuedToken::with_jwt_expiry)
                    }
                    .boxed()
                    .shared();

                    state.in_flight = Some((generation, refresh.clone()));
                    (generation, refresh)
                }
            }
        };

        let outcome = refresh.await;

        let mut state = self.state.lock().await;
        if matches!(&state.in_flight, Some((current, _)) if *current == generation) {
            state.in_flight = None;
            state.cached = outcome.as_ref().ok().cloned();
        }

        outcome
    }
}

#[async_trait]
impl<S: TokenSource> TokenProvider for CachingTokenProvider<S> {
    async fn token_state(&self) -> TokenState {
        match self.refresh().await {
            Ok(issued) => TokenState::Authenticated(issued.token),
            Err(TokenError::NoCredentials) => TokenState::Anonymous,
            Err(e) => {
                tracing::warn!("Token refresh failed, continuing unauthenticated: {}", e);
                TokenState::RefreshFailed(e.to_string())
            }
        }
    }

    async fn invalidate(&self, token: &str) {
        let mut state = self.state.lock().await;
        if state.cached.as_ref().map(|issued| issued.token == token).unwrap_or(false) {
            state.cached = None;
            tracing::debug!("Cached bearer token invalidated");
        }
    }
}

/// Token source exchanging a long-lived refresh token with the platform's
/// refresh endpoint.
///
/// Sends `{"token": "<refresh token>"}` and accepts either the enveloped
/// `{"success": true, "data": {"token", "expires_in"}}` or a bare
/// `{"token", "expires_in"}` body.
pub struct RefreshTokenSource {
    builder: RequestBuilder,
    path: String,
    refresh_token: Option<String>,
    transport: Arc<dyn Transport>,
}

impl RefreshTokenSource {
    pub fn new(
        builder: RequestBuilder,
        path: impl Into<String>,
        refresh_token: Option<String>,
        transport: Arc<dyn Transport>,
    ) -> Self {
        Self {
            builder,
            path: path.into(),
            refresh_token,
            transport,
        }
    }
}

#[async_trait]
impl TokenSource for RefreshTokenSource {
    async fn fetch_token(&self) -> Result<IssuedToken, TokenError> {
        let refresh_token = self
            .refresh_token
            .as_deref()
            .ok_or(TokenError::NoCredentials)?;

        let options = RequestOptions::new()
            .method(Method::Post)
            .body(json!({ "token": refresh_token }).to_string());
        let descriptor = self
            .builder
            .build(&self.path, None, &options)
            .map_err(|e| TokenError::Misconfigured(e.to_string()))?;

        let raw = self.transport.send(&descriptor, None).await?;
        let payload = normalize(raw)?;

        parse_token_response(payload)
    }
}

fn parse_token_response(payload: Payload) -> Result<IssuedToken, TokenError> {
    let body = match payload {
        Payload::Json(body) => body,
        Payload::Text(_) => {
            return Err(TokenError::MalformedResponse("expected a JSON body".to_string()))
        }
    };

    let data = body.get("data").unwrap_or(&body);
    let token = data
        .get("token")
        .and_then(Value::as_str)
        .filter(|token| !token.is_empty())
        .ok_or_else(|| TokenError::MalformedResponse("missing 'token'".to_string()))?;

    let expires_at = match data.get("expires_in") {
        None | Some(Value::Null) => None,
        Some(value) => Some(
            value
                .as_i64()
                .and_then(Duration::try_seconds)
                .and_then(|lifetime| Utc::now().checked_add_signed(lifetime))
                .ok_or_else(|| {
                    TokenError::MalformedResponse(format!("'expires_in' out of range: {}", value))
                })?,
        ),
    };

    Ok(IssuedToken {
        token: token.to_string(),
        expires_at,
    })
}
