use reqwest::{Client, StatusCode};
use std::time::Duration;
use url::Url;

use crate::error::EdgarError;

/// GET `url` and return the body.
///
/// 404 is a normal "nothing here" answer and comes back as `Ok(None)`;
/// every other non-success status is an error.
pub async fn fetch_text(
    client: &Client,
    url: &Url,
    user_agent: &str,
    accept: &str,
    timeout: Duration,
) -> Result<Option<String>, EdgarError> {
    log::debug!("Fetching URL: {}", url);

    let response = client
        .get(url.as_str())
        .header(reqwest::header::USER_AGENT, user_agent)
        .header(reqwest::header::ACCEPT, accept)
        .header(reqwest::header::ACCEPT_ENCODING, "gzip, deflate")
        .timeout(timeout)
        .send()
        .await?;

    let status = response.status();
    log::debug!("Response status: {}", status);

    if status == StatusCode::NOT_FOUND {
        return Ok(None);
    }
    if !status.is_success() {
        return Err(EdgarError::Status {
            status: status.as_u16(),
            url: url.to_string(),
        });
    }

    let content = response.text().await?;
    log::debug!("Received content length: {}", content.len());
    Ok(Some(content))
}
