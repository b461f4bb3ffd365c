use std::sync::Arc;

use serde::Serialize;

use crate::config::ClientConfig;
use crate::error::BuildError;
use crate::request::{Method, RequestBuilder, RequestOptions};
use crate::response::{normalize, ApiResult};
use crate::tenant::TenantContext;
use crate::token::{CachingTokenProvider, RefreshTokenSource, StaticTokenProvider, TokenProvider};
use crate::transport::{CancelSignal, HttpTransport, Transport};

/// Tenant-aware authenticated client used by every data-fetching caller.
///
/// Each call fetches a token, builds a fresh descriptor, performs exactly one
/// transport attempt and normalizes the outcome. The outer `Result` only
/// carries programmer errors (`BuildError`); every HTTP or network outcome is
/// the inner [`ApiResult`].
#[derive(Clone)]
pub struct ApiClient {
    builder: RequestBuilder,
    tokens: Arc<dyn TokenProvider>,
    transport: Arc<dyn Transport>,
}

impl ApiClient {
    pub fn new(
        builder: RequestBuilder,
        tokens: Arc<dyn TokenProvider>,
        transport: Arc<dyn Transport>,
    ) -> Self {
        Self {
            builder,
            tokens,
            transport,
        }
    }

    /// Wire up the HTTP transport and token provider described by `config`.
    ///
    /// A fixed access token wins over the refresh flow; with neither the
    /// client runs anonymously.
    pub fn from_config(config: &ClientConfig) -> Result<Self, BuildError> {
        let builder = RequestBuilder::new(&config.api.base_url)?;
        let transport: Arc<dyn Transport> = Arc::new(HttpTransport::new(
            &config.transport.user_agent,
            config.connect_timeout(),
        )?);

        let tokens: Arc<dyn TokenProvider> = match (&config.auth.access_token, &config.auth.refresh_token) {
            (Some(token), _) => Arc::new(StaticTokenProvider::new(Some(token.clone()))),
            (None, Some(_)) => {
                let source = RefreshTokenSource::new(
                    builder.clone(),
                    config.auth.refresh_path.clone(),
                    config.auth.refresh_token.clone(),
                    Arc::clone(&transport),
                );
                Arc::new(CachingTokenProvider::with_leeway(source, config.auth.token_leeway()))
            }
            (None, None) => Arc::new(StaticTokenProvider::anonymous()),
        };

        Ok(Self::new(builder, tokens, transport))
    }

    pub fn builder(&self) -> &RequestBuilder {
        &self.builder
    }

    pub fn tokens(&self) -> &Arc<dyn TokenProvider> {
        &self.tokens
    }

    /// Handle that stamps `tenant` on every call
    pub fn for_tenant(&self, tenant: TenantContext) -> TenantClient {
        TenantClient {
            client: self.clone(),
            tenant,
        }
    }

    /// Run one call. `cancel` covers the whole call, token refresh included;
    /// when it fires the call resolves to [`ApiFailure::cancelled`].
    ///
    /// [`ApiFailure::cancelled`]: crate::error::ApiFailure::cancelled
    pub async fn request(
        &self,
        path: &str,
        options: RequestOptions,
        cancel: Option<CancelSignal>,
    ) -> Result<ApiResult, BuildError> {
        match cancel {
            Some(signal) => match signal.guard(self.execute(path, &options)).await {
                Ok(outcome) => outcome,
                Err(cancelled) => {
                    tracing::debug!(path, "Request cancelled");
                    Ok(Err(cancelled))
                }
            },
            None => self.execute(path, &options).await,
        }
    }

    async fn execute(&self, path: &str, options: &RequestOptions) -> Result<ApiResult, BuildError> {
        let token = self.tokens.get_token().await;
        let descriptor = self.builder.build(path, token.as_deref(), options)?;

        let result = match self.transport.send(&descriptor, None).await {
            Ok(raw) => normalize(raw),
            Err(failure) => Err(failure),
        };

        if let Err(failure) = &result {
            tracing::debug!(
                method = %descriptor.method,
                path = %descriptor.path,
                status = failure.status,
                "Request failed: {}",
                failure.message
            );

            // Drop the rejected token so the next call refreshes; no retry here
            if failure.is_unauthorized() {
                if let Some(token) = &token {
                    self.tokens.invalidate(token).await;
                }
            }
        }

        Ok(result)
    }

    pub async fn get(&self, path: &str) -> Result<ApiResult, BuildError> {
        self.call(Method::Get, path, None, None).await
    }

    pub async fn delete(&self, path: &str) -> Result<ApiResult, BuildError> {
        self.call(Method::Delete, path, None, None).await
    }

    pub async fn post_json<B: Serialize>(&self, path: &str, body: &B) -> Result<ApiResult, BuildError> {
        self.call(Method::Post, path, Some(encode(body)?), None).await
    }

    pub async fn put_json<B: Serialize>(&self, path: &str, body: &B) -> Result<ApiResult, BuildError> {
        self.call(Method::Put, path, Some(encode(body)?), None).await
    }

    pub async fn patch_json<B: Serialize>(&self, path: &str, body: &B) -> Result<ApiResult, BuildError> {
        self.call(Method::Patch, path, Some(encode(body)?), None).await
    }

    async fn call(
        &self,
        method: Method,
        path: &str,
        body: Option<String>,
        tenant: Option<&TenantContext>,
    ) -> Result<ApiResult, BuildError> {
        let options = RequestOptions {
            method: Some(method),
            body,
            tenant: tenant.cloned(),
            ..RequestOptions::default()
        };
        self.request(path, options, None).await
    }
}

/// `ApiClient` bound to one tenant
#[derive(Clone)]
pub struct TenantClient {
    client: ApiClient,
    tenant: TenantContext,
}

impl TenantClient {
    pub fn tenant(&self) -> &TenantContext {
        &self.tenant
    }

    /// Like [`ApiClient::request`]; an explicit tenant in `options` is replaced
    pub async fn request(
        &self,
        path: &str,
        mut options: RequestOptions,
        cancel: Option<CancelSignal>,
    ) -> Result<ApiResult, BuildError> {
        options.tenant = Some(self.tenant.clone());
        self.client.request(path, options, cancel).await
    }

    pub async fn get(&self, path: &str) -> Result<ApiResult, BuildError> {
        self.client.call(Method::Get, path, None, Some(&self.tenant)).await
    }

    pub async fn delete(&self, path: &str) -> Result<ApiResult, BuildError> {
        self.client.call(Method::Delete, path, None, Some(&self.tenant)).await
    }

    pub async fn post_json<B: Serialize>(&self, path: &str, body: &B) -> Result<ApiResult, BuildError> {
        self.client
            .call(Method::Post, path, Some(encode(body)?), Some(&self.tenant))
            .await
    }

    pub async fn put_json<B: Serialize>(&self, path: &str, body: &B) -> Result<ApiResult, BuildError> {
        self.client
            .call(Method::Put, path, Some(encode(body)?), Some(&self.tenant))
            .await
    }

    pub async fn patch_json<B: Serialize>(&self, path: &str, body: &B) -> Result<ApiResult, BuildError> {
        self.client
            .call(Method::Patch, path, Some(encode(body)?), Some(&self.tenant))
            .await
    }
}

fn encode<B: Serialize>(body: &B) -> Result<String, BuildError> {
    serde_json::to_string(body).map_err(|e| BuildError::InvalidBody(e.to_string()))
}
