use serde_json::json;

use crate::cli::OutputFormat;
use crate::error::ApiFailure;
use crate::response::Payload;

/// Render the body of a successful API call
pub fn render_payload(output_format: &OutputFormat, payload: &Payload) -> anyhow::Result<String> {
    let rendered = match (output_format, payload) {
        (OutputFormat::Json, Payload::Json(value)) => {
            serde_json::to_string_pretty(&json!({ "success": true, "data": value }))?
        }
        (OutputFormat::Json, Payload::Text(text)) => {
            serde_json::to_string_pretty(&json!({ "success": true, "text": text }))?
        }
        (OutputFormat::Text, Payload::Json(value)) => serde_json::to_string_pretty(value)?,
        (OutputFormat::Text, Payload::Text(text)) => text.clone(),
    };
    Ok(rendered)
}

pub fn output_payload(output_format: &OutputFormat, payload: &Payload) -> anyhow::Result<()> {
    println!("{}", render_payload(output_format, payload)?);
    Ok(())
}

/// Output a failed API call in the appropriate format
pub fn output_failure(output_format: &OutputFormat, failure: &ApiFailure) -> anyhow::Result<()> {
    match output_format {
        OutputFormat::Json => {
            println!("{}", serde_json::to_string_pretty(&failure.to_json())?);
        }
        OutputFormat::Text => {
            eprintln!("Error: {}", failure);
            if let Some(details) = &failure.details {
                eprintln!("Details: {}", details);
            }
        }
    }
    Ok(())
}
