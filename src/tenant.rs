use serde::{Deserialize, Serialize};

use crate::error::BuildError;

/// Header carrying the tenant slug on every tenant-scoped request
pub const TENANT_HEADER: &str = "X-Tenant-Slug";

/// Studio (tenant) a request is scoped to.
///
/// Attached per call and never cached by the client, so two calls for
/// different studios can share one `ApiClient`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TenantContext {
    slug: String,
}

impl TenantContext {
    pub fn new(slug: impl Into<String>) -> Result<Self, BuildError> {
        let slug = slug.into();
        let trimmed = slug.trim();

        if trimmed.is_empty() {
            return Err(BuildError::EmptyTenant);
        }

        Ok(Self {
            slug: trimmed.to_string(),
        })
    }

    pub fn slug(&self) -> &str {
        &self.slug
    }
}

impl std::fmt::Display for TenantContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.slug)
    }
}
