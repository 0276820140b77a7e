use crate::source_reference::SourceReference;
use anyhow::{Context, Result};
use reqwest::Client;
use tracing::{info, warn};

/// Lines of this many characters or fewer are treated as blank.
const BLANK_LINE_MAX_CHARS: usize = 2;

fn create_client(tls_verify: bool) -> Result<Client> {
    info!("Initializing manifest HTTP client");
    if !tls_verify {
        warn!("TLS certificate verification is disabled for the manifest download");
    }
    Client::builder()
        .danger_accept_invalid_certs(!tls_verify)
        .build()
        .context("Failed to build HTTP client")
}

/// Downloads the manifest and returns the references it lists, in file order.
pub async fn fetch_manifest(url: &str, tls_verify: bool) -> Result<Vec<SourceReference>> {
    let client = create_client(tls_verify)?;
    info!("Fetching image manifest from URL {}", url);
    let response = client
        .get(url)
        .send()
        .await
        .with_context(|| format!("Failed to send request to fetch manifest {}", url))?;

    if !response.status().is_success() {
        anyhow::bail!(
            "Server returned error status {} while fetching manifest {}",
            response.status(),
            url
        );
    }

    let body = response
        .text()
        .await
        .context("Failed to read manifest response body")?;
    let references = parse_manifest(&body);
    info!("Manifest lists {} image references", references.len());

    Ok(references)
}

pub fn parse_manifest(body: &str) -> Vec<SourceReference> {
    body.lines()
        .map(str::trim)
        .filter(|line| line.chars().count() > BLANK_LINE_MAX_CHARS && !line.starts_with('#'))
        .filter_map(|line| match SourceReference::parse(line) {
            Ok(reference) => Some(reference),
            Err(e) => {
                warn!("Skipping manifest line {:?}: {}", line, e);
                None
            }
        })
        .collect()
}
