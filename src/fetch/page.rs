use std::time::Duration;

use reqwest::{Client, StatusCode};
use tracing::debug;
use url::Url;

use crate::error::DseError;

/// Upstream requests are cut off after this long; dsebd.org regularly stalls
/// under load and the default client would wait forever.
pub const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Build the shared upstream HTTP client with the bounded request timeout.
pub fn build_client() -> Result<Client, DseError> {
    Ok(Client::builder().timeout(REQUEST_TIMEOUT).build()?)
}

/// GET `url` with the given query pairs and return the response body.
///
/// The URL must be absolute. Any response other than 200 is an error carrying
/// the status code; network failures and timeouts surface as
/// [`DseError::Http`]. No retries happen here — the caller decides whether a
/// failure is masked or propagated.
pub async fn fetch_page(
    client: &Client,
    url: &str,
    params: &[(&str, &str)],
) -> Result<String, DseError> {
    let url = Url::parse(url)?;
    debug!(url = %url, "fetching page");

    let mut request = client.get(url.clone());
    if !params.is_empty() {
        request = request.query(params);
    }

    let resp = request.send().await?;
    let status = resp.status();
    if status != StatusCode::OK {
        return Err(DseError::Status {
            url: url.to_string(),
            status,
        });
    }
    Ok(resp.text().await?)
}
