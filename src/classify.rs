//! Maps a [`RawOutcome`] to the stream handle or a typed [`Error`].

use reqwest::StatusCode;

use crate::{
    dispatch::{RawBody, RawOutcome, RawResponse},
    errors::{Error, HttpError, Result},
    stream::AskStream,
};

/// Classify a settled dispatch.
///
/// Cancellation always maps to [`Error::Timeout`]; whether the deadline or an
/// external cancel fired is not distinguished. A 401 is returned as an
/// ordinary [`Error::Http`]; the caller reacts to it via
/// [`Error::is_auth_expired`].
pub fn classify(raw: RawOutcome) -> Result<AskStream> {
    match raw {
        RawOutcome::Cancelled => Err(Error::timeout()),
        RawOutcome::Fault(err) => Err(classify_transport_error(err)),
        RawOutcome::Response(resp) => classify_response(resp),
    }
}

/// Classify a transport fault that carries no HTTP semantics.
///
/// Connection, send and timeout failures are transient network failures;
/// anything else is passed through untouched.
pub fn classify_transport_error(err: reqwest::Error) -> Error {
    if err.is_connect() || err.is_request() || err.is_timeout() {
        Error::network(Some(err))
    } else {
        Error::Unclassified(err)
    }
}

fn classify_response(resp: RawResponse) -> Result<AskStream> {
    let RawResponse {
        status,
        status_text,
        request_id,
        body,
    } = resp;

    if !status.is_success() {
        let raw_body = match body {
            RawBody::Text(text) if !text.is_empty() => Some(text),
            _ => None,
        };
        let message = failure_message(status, status_text.as_deref(), raw_body.as_deref());
        return Err(HttpError {
            status: status.as_u16(),
            message,
            raw_body,
        }
        .into());
    }

    match body {
        RawBody::Stream(response) => Ok(AskStream::new(response, request_id)),
        RawBody::Empty | RawBody::Text(_) => Err(Error::EmptyBody),
    }
}

/// Human-readable message for a failure response.
///
/// Prefers a JSON `detail` or `message` string, then the status text, then a
/// generic `HTTP error, status <code>`.
pub(crate) fn failure_message(
    status: StatusCode,
    status_text: Option<&str>,
    body: Option<&str>,
) -> String {
    if let Some(message) = body.and_then(body_message) {
        return message;
    }
    status_text
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(|s| s.to_string())
        .unwrap_or_else(|| format!("HTTP error, status {}", status.as_u16()))
}

fn body_message(body: &str) -> Option<String> {
    let value: serde_json::Value = serde_json::from_str(body).ok()?;
    ["detail", "message"].iter().find_map(|field| {
        value
            .get(field)
            .and_then(|v| v.as_str())
            .map(|s| s.to_string())
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::ErrorKind;

    fn failure(status: u16, status_text: Option<&str>, body: &str) -> RawOutcome {
        RawOutcome::Response(RawResponse {
            status: StatusCode::from_u16(status).expect("status"),
            status_text: status_text.map(|s| s.to_string()),
            request_id: None,
            body: RawBody::Text(body.to_string()),
        })
    }

    fn http_error(raw: RawOutcome) -> HttpError {
        match classify(raw) {
            Err(Error::Http(err)) => err,
            other => panic!("expected http error, got {other:?}"),
        }
    }

    #[test]
    fn cancelled_is_timeout() {
        let err = classify(RawOutcome::Cancelled).expect_err("timeout");
        assert_eq!(err.kind(), ErrorKind::Timeout);
        assert_eq!(err.to_string(), crate::CONNECTION_LOST_MESSAGE);
    }

    #[test]
    fn detail_field_wins() {
        let err = http_error(failure(500, Some("Internal Server Error"), r#"{"detail":"X"}"#));
        assert_eq!(err.status, 500);
        assert_eq!(err.message, "X");
        assert_eq!(err.raw_body.as_deref(), Some(r#"{"detail":"X"}"#));
    }

    #[test]
    fn message_field_used_without_detail() {
        let err = http_error(failure(400, Some("Bad Request"), r#"{"message":"bad question"}"#));
        assert_eq!(err.message, "bad question");
    }

    #[test]
    fn detail_preferred_over_message() {
        let err = http_error(failure(
            422,
            Some("Unprocessable Entity"),
            r#"{"message":"second","detail":"first"}"#,
        ));
        assert_eq!(err.message, "first");
    }

    #[test]
    fn unparsable_body_falls_back_to_status_text() {
        let err = http_error(failure(503, Some("Service Unavailable"), "<html>oops</html>"));
        assert_eq!(err.message, "Service Unavailable");
    }

    #[test]
    fn non_string_detail_falls_back_to_status_text() {
        let err = http_error(failure(
            422,
            Some("Unprocessable Entity"),
            r#"{"detail":[{"loc":["body","question"],"msg":"field required"}]}"#,
        ));
        assert_eq!(err.message, "Unprocessable Entity");
    }

    #[test]
    fn missing_status_text_uses_generic_message() {
        let err = http_error(failure(599, None, ""));
        assert_eq!(err.message, "HTTP error, status 599");
        assert!(err.raw_body.is_none());

        let err = http_error(failure(599, Some("  "), "{}"));
        assert_eq!(err.message, "HTTP error, status 599");
    }

    #[test]
    fn unauthorized_is_flagged() {
        let err = classify(failure(401, Some("Unauthorized"), r#"{"detail":"Invalid password"}"#))
            .expect_err("401");
        assert!(err.is_auth_expired());
        assert_eq!(err.to_string(), "401: Invalid password");
    }

    #[test]
    fn success_without_body_is_empty_body() {
        let raw = RawOutcome::Response(RawResponse {
            status: StatusCode::OK,
            status_text: Some("OK".into()),
            request_id: None,
            body: RawBody::Empty,
        });
        let err = classify(raw).expect_err("empty body");
        assert_eq!(err.kind(), ErrorKind::EmptyBody);
    }
}
