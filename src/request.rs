use std::collections::BTreeMap;

use bytes::Bytes;
use serde::{Deserialize, Serialize};
use url::Url;

use crate::error::BuildError;
use crate::tenant::{TenantContext, TENANT_HEADER};

pub const AUTHORIZATION_HEADER: &str = "Authorization";
pub const ACCEPT_HEADER: &str = "Accept";
pub const CONTENT_TYPE_HEADER: &str = "Content-Type";
pub const JSON_CONTENT_TYPE: &str = "application/json";

/// HTTP methods used by the platform API
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Method {
    Get,
    Post,
    Put,
    Patch,
    Delete,
}

impl Method {
    pub fn as_str(&self) -> &'static str {
        match self {
            Method::Get => "GET",
            Method::Post => "POST",
            Method::Put => "PUT",
            Method::Patch => "PATCH",
            Method::Delete => "DELETE",
        }
    }
}

impl std::fmt::Display for Method {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for Method {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_uppercase().as_str() {
            "GET" => Ok(Method::Get),
            "POST" => Ok(Method::Post),
            "PUT" => Ok(Method::Put),
            "PATCH" => Ok(Method::Patch),
            "DELETE" => Ok(Method::Delete),
            other => Err(format!("unsupported method '{}'", other)),
        }
    }
}

impl From<Method> for reqwest::Method {
    fn from(method: Method) -> Self {
        match method {
            Method::Get => reqwest::Method::GET,
            Method::Post => reqwest::Method::POST,
            Method::Put => reqwest::Method::PUT,
            Method::Patch => reqwest::Method::PATCH,
            Method::Delete => reqwest::Method::DELETE,
        }
    }
}

/// Per-call options supplied by the caller
#[derive(Debug, Clone, Default)]
pub struct RequestOptions {
    pub method: Option<Method>,
    pub headers: BTreeMap<String, String>,
    pub body: Option<String>,
    pub tenant: Option<TenantContext>,
}

impl RequestOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn method(mut self, method: Method) -> Self {
        self.method = Some(method);
        self
    }

    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.insert(name.into(), value.into());
        self
    }

    pub fn body(mut self, body: impl Into<String>) -> Self {
        self.body = Some(body.into());
        self
    }

    pub fn tenant(mut self, tenant: TenantContext) -> Self {
        self.tenant = Some(tenant);
        self
    }
}

/// Fully composed request, constructed fresh for every call
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequestDescriptor {
    pub method: Method,
    /// Normalized path, always with exactly one leading slash
    pub path: String,
    pub url: Url,
    pub headers: BTreeMap<String, String>,
    pub body: Option<Bytes>,
}

impl RequestDescriptor {
    /// Case-insensitive header lookup
    pub fn header(&self, name: &str) -> Option<&str> {
        find_header(&self.headers, name).map(|(_, value)| value.as_str())
    }

    pub fn tenant_slug(&self) -> Option<&str> {
        self.header(TENANT_HEADER)
    }
}

/// Composes request descriptors against a fixed base origin
#[derive(Debug, Clone)]
pub struct RequestBuilder {
    base: Url,
}

impl RequestBuilder {
    pub fn new(base_origin: &str) -> Result<Self, BuildError> {
        let mut base = Url::parse(base_origin)
            .map_err(|_| BuildError::InvalidBaseUrl(base_origin.to_string()))?;

        if base.cannot_be_a_base() || !matches!(base.scheme(), "http" | "https") {
            return Err(BuildError::InvalidBaseUrl(base_origin.to_string()));
        }

        // Paths are appended to the base path, so drop any trailing slash
        let trimmed = base.path().trim_end_matches('/').to_string();
        base.set_path(&trimmed);
        base.set_query(None);
        base.set_fragment(None);

        Ok(Self { base })
    }

    pub fn base(&self) -> &Url {
        &self.base
    }

    /// Build a request descriptor.
    ///
    /// Caller headers win over the defaults on collision (compared
    /// case-insensitively), including `Authorization` and `X-Tenant-Slug`.
    /// A body without an explicit method is rejected instead of guessing POST.
    pub fn build(
        &self,
        path: &str,
        token: Option<&str>,
        options: &RequestOptions,
    ) -> Result<RequestDescriptor, BuildError> {
        let path = normalize_path(path)?;

        let method = match (options.method, &options.body) {
            (Some(method), _) => method,
            (None, None) => Method::Get,
            (None, Some(_)) => return Err(BuildError::MethodRequired),
        };

        let mut headers = BTreeMap::new();
        headers.insert(ACCEPT_HEADER.to_string(), JSON_CONTENT_TYPE.to_string());

        if options.body.is_some() {
            headers.insert(CONTENT_TYPE_HEADER.to_string(), JSON_CONTENT_TYPE.to_string());
        }
        if let Some(token) = token {
            headers.insert(AUTHORIZATION_HEADER.to_string(), format!("Bearer {}", token));
        }
        if let Some(tenant) = &options.tenant {
            headers.insert(TENANT_HEADER.to_string(), tenant.slug().to_string());
        }

        for (name, value) in &options.headers {
            validate_header(name, value)?;

            if let Some((existing, _)) = find_header(&headers, name) {
                let existing = existing.clone();
                headers.remove(&existing);
            }
            headers.insert(name.clone(), value.clone());
        }

        let url = self.join(&path)?;

        Ok(RequestDescriptor {
            method,
            path,
            url,
            headers,
            body: options.body.clone().map(Bytes::from),
        })
    }

    fn join(&self, path: &str) -> Result<Url, BuildError> {
        let joined = format!("{}{}", self.base.as_str().trim_end_matches('/'), path);
        Url::parse(&joined).map_err(|e| BuildError::InvalidUrl(e.to_string()))
    }
}

fn normalize_path(path: &str) -> Result<String, BuildError> {
    let trimmed = path.trim().trim_start_matches('/');

    if trimmed.is_empty() {
        return Err(BuildError::EmptyPath);
    }

    Ok(format!("/{}", trimmed))
}

fn find_header<'a>(
    headers: &'a BTreeMap<String, String>,
    name: &str,
) -> Option<(&'a String, &'a String)> {
    headers.iter().find(|(key, _)| key.eq_ignore_ascii_case(name))
}

fn validate_header(name: &str, value: &str) -> Result<(), BuildError> {
    reqwest::header::HeaderName::from_bytes(name.as_bytes()).map_err(|e| {
        BuildError::InvalidHeader {
            name: name.to_string(),
            reason: e.to_string(),
        }
    })?;
    reqwest::header::HeaderValue::from_str(value).map_err(|e| BuildError::InvalidHeader {
        name: name.to_string(),
        reason: e.to_string(),
    })?;
    Ok(())
}
