pub mod cli;
pub mod client;
pub mod config;
pub mod error;
pub mod request;
pub mod response;
pub mod retry;
pub mod tenant;
pub mod token;
pub mod transport;

pub use client::{ApiClient, TenantClient};
pub use error::{ApiFailure, BuildError, FailureKind, TokenError};
pub use request::{Method, RequestBuilder, RequestDescriptor, RequestOptions};
pub use response::{ApiResult, Payload};
pub use tenant::TenantContext;
pub use token::{CachingTokenProvider, IssuedToken, StaticTokenProvider, TokenProvider, TokenSource, TokenState};
pub use transport::{cancellation, CancelHandle, CancelSignal, HttpTransport, RawResponse, Transport};
