//! HTTP client utilities shared by the vendor wire clients.

use reqwest::{Client, RequestBuilder, StatusCode};
use serde::Serialize;
use std::collections::HashMap;

use crate::client::ClientError;
use crate::options::{HttpTransport, TransportOptions};

/// Build a configured HTTP client from transport options.
///
/// Applies the timeout and, when set and parseable, the proxy.
pub fn build_http_client(
    transport_options: &TransportOptions<HttpTransport>,
) -> Result<Client, reqwest::Error> {
    let mut builder = Client::builder();

    if let Some(timeout) = transport_options.timeout {
        builder = builder.timeout(timeout);
    }

    if let Some(proxy_url) = &transport_options.provider.proxy {
        match reqwest::Proxy::all(proxy_url) {
            Ok(proxy) => builder = builder.proxy(proxy),
            Err(e) => tracing::warn!(proxy = %proxy_url, error = %e, "ignoring invalid proxy"),
        }
    }

    builder.build()
}

/// Add extra headers to a request if specified in transport options.
pub fn add_extra_headers(
    mut request: RequestBuilder,
    extra_headers: &Option<HashMap<String, String>>,
) -> RequestBuilder {
    if let Some(headers) = extra_headers {
        for (key, value) in headers {
            request = request.header(key, value);
        }
    }
    request
}

/// Send `body` as JSON and turn a non-success status into a vendor error.
pub async fn send_json<B: Serialize + ?Sized>(
    request: RequestBuilder,
    body: &B,
    on_error: impl FnOnce(StatusCode, &str) -> ClientError,
) -> Result<reqwest::Response, ClientError> {
    let response = request.json(body).send().await?;
    let status = response.status();

    if !status.is_success() {
        let body = response.text().await.unwrap_or_default();
        return Err(on_error(status, &body));
    }

    Ok(response)
}
