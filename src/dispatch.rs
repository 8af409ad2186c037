//! Sends the ask request bound to a cancellation handle.
//!
//! The dispatcher performs no interpretation of status codes or faults; it
//! only reports what happened as a [`RawOutcome`] for the classifier.

use reqwest::{
    header::{ACCEPT, CONTENT_TYPE},
    Method, StatusCode,
};

use crate::{
    errors::{Error, Result},
    http::{apply_header_list, request_id_from_headers, HeaderList},
    timer::CancellationHandle,
    REQUEST_ID_HEADER,
};

/// Settled result of a single dispatch, before classification.
#[derive(Debug)]
pub enum RawOutcome {
    /// The cancellation handle fired before the transport settled.
    Cancelled,
    /// The transport failed without producing an HTTP response.
    Fault(reqwest::Error),
    /// The backend answered with a status line.
    Response(RawResponse),
}

/// HTTP response as seen by the classifier.
#[derive(Debug)]
pub struct RawResponse {
    pub status: StatusCode,
    /// Reason phrase for the status, when one is known.
    pub status_text: Option<String>,
    pub request_id: Option<String>,
    pub body: RawBody,
}

#[derive(Debug)]
pub enum RawBody {
    /// The response carries no payload.
    Empty,
    /// Success body, not yet read.
    Stream(reqwest::Response),
    /// Failure body, read to completion.
    Text(String),
}

/// Builds and sends ask requests on a shared HTTP client.
#[derive(Clone, Debug)]
pub struct Dispatcher {
    http: reqwest::Client,
    base_url: reqwest::Url,
    client_header: Option<String>,
    default_headers: Option<HeaderList>,
}

impl Dispatcher {
    pub fn new(
        http: reqwest::Client,
        base_url: reqwest::Url,
        client_header: Option<String>,
        default_headers: Option<HeaderList>,
    ) -> Self {
        Self {
            http,
            base_url,
            client_header,
            default_headers,
        }
    }

    /// Build the POST request for `path`.
    ///
    /// `Authorization` is only set when a non-empty token is present. The token
    /// is sent exactly as stored; a missing token is left for the backend to judge.
    pub fn build(
        &self,
        path: &str,
        body: Vec<u8>,
        token: Option<&str>,
        request_id: Option<&str>,
        headers: &HeaderList,
    ) -> Result<reqwest::RequestBuilder> {
        let url = self
            .base_url
            .join(path.trim_start_matches('/'))
            .map_err(|err| Error::Config(format!("invalid path: {err}")))?;
        let mut builder = self
            .http
            .request(Method::POST, url)
            .header(CONTENT_TYPE, "application/json")
            .header(ACCEPT, "application/x-ndjson, application/json");
        if let Some(token) = token.filter(|token| !token.is_empty()) {
            builder = builder.bearer_auth(token);
        }
        if let Some(req_id) = request_id.filter(|id| !id.trim().is_empty()) {
            builder = builder.header(REQUEST_ID_HEADER, req_id);
        }
        if let Some(client_header) = self.client_header.as_deref() {
            builder = builder.header("X-Notebook-Client", client_header);
        }
        if let Some(defaults) = &self.default_headers {
            builder = apply_header_list(builder, defaults)?;
        }
        builder = apply_header_list(builder, headers)?;
        Ok(builder.body(body))
    }

    /// Send the request, racing it against `cancel`.
    ///
    /// Triggering `cancel` drops the in-flight transport future, which aborts
    /// the connection. A failure body is read under the same handle.
    pub async fn send(
        &self,
        builder: reqwest::RequestBuilder,
        cancel: &CancellationHandle,
    ) -> RawOutcome {
        let response = tokio::select! {
            biased;
            _ = cancel.cancelled() => return RawOutcome::Cancelled,
            result = builder.send() => match result {
                Ok(response) => response,
                Err(err) => return RawOutcome::Fault(err),
            },
        };

        let status = response.status();
        let status_text = status.canonical_reason().map(|s| s.to_string());
        let request_id = request_id_from_headers(response.headers());

        let body = if status.is_success() {
            if has_no_body(&response) {
                RawBody::Empty
            } else {
                RawBody::Stream(response)
            }
        } else {
            tokio::select! {
                biased;
                _ = cancel.cancelled() => return RawOutcome::Cancelled,
                text = response.text() => RawBody::Text(text.unwrap_or_default()),
            }
        };

        RawOutcome::Response(RawResponse {
            status,
            status_text,
            request_id,
            body,
        })
    }
}

fn has_no_body(response: &reqwest::Response) -> bool {
    let status = response.status();
    status == StatusCode::NO_CONTENT
        || status == StatusCode::RESET_CONTENT
        || response.content_length() == Some(0)
}
