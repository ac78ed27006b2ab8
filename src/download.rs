//! Downloads remote resources into memory.

use std::{path::Path, time::Duration};

use anyhow::{Context, Result};
use futures::StreamExt;
use log::debug;
use reqwest::{Client, StatusCode};

use crate::{cli::create_spinner, grid::FetchError};

const REQUEST_TIMEOUT: Duration = Duration::from_secs(300);

/// Builds the shared HTTP client.
pub fn make_client() -> Result<Client> {
    let client = Client::builder()
        .timeout(REQUEST_TIMEOUT)
        .user_agent(concat!(env!("CARGO_PKG_NAME"), "/", env!("CARGO_PKG_VERSION")))
        .build()?;

    Ok(client)
}

/// Streams the body at `url` into memory.
///
/// A 404 is reported as [`FetchError::NotFound`] so callers can tell an absent
/// dataset apart from a failing service.
pub async fn download_bytes(client: &Client, url: &str) -> Result<Vec<u8>, FetchError> {
    debug!("GET {}", url);
    let response = client.get(url).send().await?;

    match response.status() {
        status if status.is_success() => {}
        StatusCode::NOT_FOUND => return Err(FetchError::NotFound(url.to_string())),
        status => return Err(FetchError::Status(status.as_u16())),
    }

    let mut body = Vec::with_capacity(response.content_length().unwrap_or(0) as usize);
    let mut stream = response.bytes_stream();

    while let Some(chunk) = stream.next().await {
        body.extend_from_slice(&chunk?);
    }

    Ok(body)
}

/// Reads a text resource from an `http(s)://` URL or a local path.
pub async fn fetch_text(client: &Client, location: &str) -> Result<String> {
    if location.starts_with("http://") || location.starts_with("https://") {
        let bar = create_spinner(format!("Downloading {}...", location));

        let bytes = download_bytes(client, location)
            .await
            .with_context(|| format!("Failed to download `{}`", location))?;
        bar.finish_and_clear();

        return String::from_utf8(bytes).with_context(|| format!("`{}` is not UTF-8", location));
    }

    let path = location.strip_prefix("file://").unwrap_or(location);
    tokio::fs::read_to_string(Path::new(path))
        .await
        .with_context(|| format!("Failed to read `{}`", path))
}

// -- Tests -------------------------------------------------------------------
