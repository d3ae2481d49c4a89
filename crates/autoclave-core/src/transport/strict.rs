//! Strict HTTP executor built on reqwest.

use std::time::Duration;

use reqwest::blocking::Client;
use tracing::{debug, instrument};

use super::traits::{HttpRequest, HttpResponse, Method, RequestExecutor, TransportError};
use crate::device::DeviceAddress;
use crate::protocol::DEFAULT_REQUEST_TIMEOUT;

/// Standards-conforming executor. Fails fast on framing violations.
pub struct StrictExecutor {
    client: Client,
}

impl StrictExecutor {
    pub fn new() -> Result<Self, TransportError> {
        let client = Client::builder()
            .timeout(DEFAULT_REQUEST_TIMEOUT)
            .build()
            .map_err(|e| TransportError::MalformedResponse(format!("HTTP client setup: {e}")))?;
        Ok(Self { client })
    }

    fn map_error(address: &DeviceAddress, timeout: Duration, e: reqwest::Error) -> TransportError {
        if e.is_timeout() {
            TransportError::timeout(timeout)
        } else if e.is_connect() {
            TransportError::ConnectionFailed {
                address: address.to_string(),
                message: e.to_string(),
            }
        } else {
            TransportError::MalformedResponse(e.to_string())
        }
    }
}

impl RequestExecutor for StrictExecutor {
    #[instrument(level = "debug", skip(self, request), fields(method = %request.method, path = %request.path))]
    fn execute(
        &self,
        address: &DeviceAddress,
        request: &HttpRequest,
        timeout: Duration,
    ) -> Result<HttpResponse, TransportError> {
        let url = format!("{}{}", address.base_url(), request.path);
        let mut builder = match request.method {
            Method::Get => self.client.get(&url),
            Method::Head => self.client.head(&url),
            Method::Post => self.client.post(&url),
        }
        .timeout(timeout);

        for (name, value) in &request.headers {
            // reqwest derives the length from the body itself.
            if name.eq_ignore_ascii_case("content-length") {
                continue;
            }
            builder = builder.header(name.as_str(), value.as_str());
        }
        if let Some(body) = &request.body {
            builder = builder.body(body.clone());
        }

        let response = builder
            .send()
            .map_err(|e| Self::map_error(address, timeout, e))?;

        let status = response.status().as_u16();
        let headers = response
            .headers()
            .iter()
            .map(|(k, v)| {
                (
                    k.as_str().to_ascii_lowercase(),
                    String::from_utf8_lossy(v.as_bytes()).into_owned(),
                )
            })
            .collect();
        let body = response
            .bytes()
            .map_err(|e| Self::map_error(address, timeout, e))?
            .to_vec();

        debug!(status, bytes = body.len(), "Strict response");
        Ok(HttpResponse {
            status,
            headers,
            body,
        })
    }

    fn name(&self) -> &'static str {
        "strict"
    }
}
