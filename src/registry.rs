//! Trust-registry client
//!
//! Thin wrappers over the remote registry. The wire format is the
//! report JSON itself; transport details stay out of the pipeline.

use std::time::Duration;

use tracing::info;

use crate::errors::AuditError;
use crate::report::Report;

const REGISTRY_TIMEOUT: Duration = Duration::from_secs(30);

fn http() -> reqwest::Client {
    reqwest::Client::builder()
        .timeout(REGISTRY_TIMEOUT)
        .build()
        .expect("HTTP client construction cannot fail with static options")
}

/// Query the registry for a published audit by package name.
pub async fn lookup(base_url: &str, name: &str) -> Result<serde_json::Value, AuditError> {
    let url = format!("{}/api/skills/{}", base_url.trim_end_matches('/'), name);
    let response = http()
        .get(&url)
        .send()
        .await
        .map_err(|e| AuditError::fetch(format!("registry unreachable: {e}")))?;

    if response.status().as_u16() == 404 {
        return Err(AuditError::input_with_hint(
            format!("'{name}' is not in the registry"),
            "Names are exact; try the repository name without the owner prefix.",
        ));
    }
    if !response.status().is_success() {
        return Err(AuditError::fetch(format!(
            "registry returned HTTP {}",
            response.status()
        )));
    }
    response
        .json()
        .await
        .map_err(|e| AuditError::fetch(format!("registry sent an undecodable body: {e}")))
}

/// Upload a finished report. Failures are reported but never block
/// the local result.
pub async fn upload(base_url: &str, report: &Report) -> Result<(), AuditError> {
    let url = format!("{}/api/reports", base_url.trim_end_matches('/'));
    let response = http()
        .post(&url)
        .json(report)
        .send()
        .await
        .map_err(|e| AuditError::fetch(format!("registry unreachable: {e}")))?;

    if !response.status().is_success() {
        return Err(AuditError::fetch(format!(
            "registry rejected the report: HTTP {}",
            response.status()
        )));
    }
    info!(slug = %report.skill_slug, "report uploaded to registry");
    Ok(())
}
