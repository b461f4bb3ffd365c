use std::time::Duration;

use clap::Args;

use crate::cli::utils::{output_failure, output_payload};
use crate::cli::{resolve_tenant, OutputFormat};
use crate::client::ApiClient;
use crate::config::ClientConfig;
use crate::request::{Method, RequestOptions};
use crate::retry::{run_with_retry, RetryPolicy};
use crate::transport::cancellation;

#[derive(Args, Debug)]
pub struct RequestArgs {
    #[arg(help = "HTTP method (GET, POST, PUT, PATCH, DELETE)")]
    pub method: Method,

    #[arg(help = "Path relative to the API base URL, e.g. /courses")]
    pub path: String,

    #[arg(long, help = "Tenant slug (defaults to STUDIO_TENANT)")]
    pub tenant: Option<String>,

    #[arg(long, short = 'd', help = "JSON request body")]
    pub data: Option<String>,

    #[arg(long = "header", short = 'H', help = "Extra header as 'Name: value' (repeatable)")]
    pub headers: Vec<String>,

    #[arg(long, default_value = "1", help = "Total attempts, retrying transient failures")]
    pub attempts: u32,

    #[arg(long, help = "Cancel each attempt after this many milliseconds")]
    pub timeout_ms: Option<u64>,
}

pub async fn handle(
    args: RequestArgs,
    client_config: &ClientConfig,
    output_format: OutputFormat,
) -> anyhow::Result<()> {
    let client = ApiClient::from_config(client_config)?;
    let tenant = resolve_tenant(args.tenant.clone(), client_config)?;

    if let Some(data) = &args.data {
        serde_json::from_str::<serde_json::Value>(data)
            .map_err(|e| anyhow::anyhow!("--data is not valid JSON: {}", e))?;
    }

    let mut options = RequestOptions::new().method(args.method);
    options.body = args.data.clone();
    options.tenant = tenant;
    for header in &args.headers {
        let (name, value) = parse_header(header)?;
        options = options.header(name, value);
    }

    // Surface programmer errors before any network round trip
    client.builder().build(&args.path, None, &options)?;

    let policy = RetryPolicy::with_attempts(args.attempts);
    let timeout = args.timeout_ms.map(Duration::from_millis);

    let result = run_with_retry(&policy, || {
        let client = client.clone();
        let options = options.clone();
        let path = args.path.clone();
        async move {
            let (handle, signal) = cancellation();
            let deadline = timeout.map(|after| handle.cancel_after(after));

            let outcome = match client.request(&path, options, Some(signal)).await {
                Ok(result) => result,
                // already validated above
                Err(e) => Err(crate::error::ApiFailure::transport(e.to_string())),
            };

            if let Some(deadline) = deadline {
                deadline.abort();
            }
            outcome
        }
    })
    .await;

    match result {
        Ok(payload) => output_payload(&output_format, &payload),
        Err(failure) => {
            output_failure(&output_format, &failure)?;
            Err(anyhow::anyhow!("request failed with status {}", failure.status))
        }
    }
}

fn parse_header(raw: &str) -> anyhow::Result<(String, String)> {
    let (name, value) = raw
        .split_once(':')
        .ok_or_else(|| anyhow::anyhow!("Header '{}' must look like 'Name: value'", raw))?;
    Ok((name.trim().to_string(), value.trim().to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_header() {
        assert_eq!(
            parse_header("X-Tenant-Slug: acme").unwrap(),
            ("X-Tenant-Slug".to_string(), "acme".to_string())
        );
        assert!(parse_header("no-colon").is_err());
    }
}
