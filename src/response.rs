//! Outgoing HTTP response type and the [`IntoResponse`] conversion trait.
//!
//! A [`Response`] stays mutable all the way back out of the middleware
//! pipeline: outer middleware call `next`, then stamp headers onto whatever
//! came back, including redirects and error responses.

use std::sync::Arc;

use bytes::Bytes;
use http::header::{HeaderName, HeaderValue};
use http::StatusCode;
use http_body_util::Full;
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::error::Error;

/// Common content-type values for use with [`ResponseBuilder::bytes`].
pub enum ContentType {
    Html,        // text/html; charset=utf-8
    Json,        // application/json
    OctetStream, // application/octet-stream
    Text,        // text/plain; charset=utf-8
}

impl ContentType {
    fn as_str(&self) -> &'static str {
        match self {
            Self::Html        => "text/html; charset=utf-8",
            Self::Json        => "application/json",
            Self::OctetStream => "application/octet-stream",
            Self::Text        => "text/plain; charset=utf-8",
        }
    }
}

/// The JSON envelope every API endpoint answers with.
///
/// ```json
/// { "success": true, "error": null, "data": { "id": 7 } }
/// ```
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Envelope<T> {
    pub success: bool,
    pub error: Option<String>,
    pub data: Option<T>,
}

/// An outgoing HTTP response.
///
/// ```rust
/// use hearth::{Response, StatusCode};
///
/// Response::text("hello");
/// Response::redirect("/admin/login");
/// Response::success(&serde_json::json!({ "id": 1 }));
/// Response::failure(StatusCode::BAD_REQUEST, "name is required");
///
/// Response::builder()
///     .status(StatusCode::CREATED)
///     .header("location", "/api/v1/tags/42")
///     .json(br#"{"id":42}"#.to_vec());
/// ```
#[derive(Debug)]
pub struct Response {
    pub(crate) status: StatusCode,
    pub(crate) headers: Vec<(String, String)>,
    pub(crate) body: Vec<u8>,
    pub(crate) failure: Option<Arc<Error>>,
}

impl Response {
    /// `200 OK` with an `application/json` body taken as-is.
    pub fn json(body: Vec<u8>) -> Self {
        Self::bytes_raw("application/json", body)
    }

    /// `200 OK` with `value` serialized as JSON. A serialization failure
    /// becomes a 500 carrying the error.
    pub fn json_value<T: Serialize + ?Sized>(value: &T) -> Self {
        match serde_json::to_vec(value) {
            Ok(body) => Self::json(body),
            Err(e) => Self::from_error(e.into()),
        }
    }

    /// `200 OK` with `text/plain; charset=utf-8`.
    pub fn text(body: impl Into<String>) -> Self {
        Self::bytes_raw("text/plain; charset=utf-8", body.into().into_bytes())
    }

    /// `200 OK` with `text/html; charset=utf-8`.
    pub fn html(body: impl Into<String>) -> Self {
        Self::bytes_raw("text/html; charset=utf-8", body.into().into_bytes())
    }

    /// Response with no body.
    pub fn status(code: StatusCode) -> Self {
        Self { status: code, headers: Vec::new(), body: Vec::new(), failure: None }
    }

    /// `302 Found` to `location`.
    pub fn redirect(location: &str) -> Self {
        Self::redirect_with(location, StatusCode::FOUND)
    }

    pub fn redirect_with(location: &str, code: StatusCode) -> Self {
        let mut res = Self::status(code);
        res.set_header("location", location);
        res
    }

    /// `200 OK` envelope with `data` and no error.
    pub fn success<T: Serialize + ?Sized>(data: &T) -> Self {
        Self::envelope(StatusCode::OK, true, None, Some(data))
    }

    /// Envelope with `success: false`, the given message and `data: null`.
    pub fn failure(code: StatusCode, message: impl Into<String>) -> Self {
        Self::envelope::<()>(code, false, Some(message.into()), None)
    }

    fn envelope<T: Serialize + ?Sized>(
        code: StatusCode,
        success: bool,
        error: Option<String>,
        data: Option<&T>,
    ) -> Self {
        #[derive(Serialize)]
        struct Wire<'a, T: ?Sized> {
            success: bool,
            error: Option<String>,
            data: Option<&'a T>,
        }
        let mut res = Self::json_value(&Wire { success, error, data });
        if res.failure.is_none() {
            res.status = code;
        }
        res
    }

    /// A response standing in for an unhandled error.
    ///
    /// The status follows [`Error::status_code`]. The error rides along so the
    /// application's top-level handler can log it and decide how much of it
    /// the client gets to see.
    pub fn from_error(err: Error) -> Self {
        let mut res = Self::text(err.to_string());
        res.status = err.status_code();
        res.failure = Some(Arc::new(err));
        res
    }

    /// Builder for responses that need a custom status or extra headers.
    pub fn builder() -> ResponseBuilder {
        ResponseBuilder { headers: Vec::new(), status: StatusCode::OK }
    }

    fn bytes_raw(content_type: &str, body: Vec<u8>) -> Self {
        Self {
            status: StatusCode::OK,
            headers: vec![("content-type".to_owned(), content_type.to_owned())],
            body,
            failure: None,
        }
    }

    pub fn status_code(&self) -> StatusCode { self.status }
    pub fn headers(&self) -> &[(String, String)] { &self.headers }
    pub fn body(&self) -> &[u8] { &self.body }

    /// The error this response stands in for, if any.
    pub fn error(&self) -> Option<&Error> {
        self.failure.as_deref()
    }

    pub fn set_status(&mut self, code: StatusCode) -> &mut Self {
        self.status = code;
        self
    }

    pub fn set_body(&mut self, body: impl Into<Vec<u8>>) -> &mut Self {
        self.body = body.into();
        self
    }

    /// Case-insensitive header lookup. Returns the first value.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    /// Sets `name` to `value`, replacing every existing value of that header.
    pub fn set_header(&mut self, name: &str, value: &str) -> &mut Self {
        self.headers.retain(|(k, _)| !k.eq_ignore_ascii_case(name));
        self.headers.push((name.to_ascii_lowercase(), value.to_owned()));
        self
    }

    /// Adds a value without touching existing ones (e.g. `set-cookie`).
    pub fn append_header(&mut self, name: &str, value: &str) -> &mut Self {
        self.headers.push((name.to_ascii_lowercase(), value.to_owned()));
        self
    }

    pub(crate) fn into_http(self) -> http::Response<Full<Bytes>> {
        let mut res = http::Response::new(Full::new(Bytes::from(self.body)));
        *res.status_mut() = self.status;
        let headers = res.headers_mut();
        for (name, value) in self.headers {
            match (HeaderName::from_bytes(name.as_bytes()), HeaderValue::from_str(&value)) {
                (Ok(name), Ok(value)) => {
                    headers.append(name, value);
                }
                _ => warn!(header = %name, "dropping invalid response header"),
            }
        }
        res
    }
}

/// Fluent builder for [`Response`].
///
/// Obtain via [`Response::builder()`]. Defaults to `200 OK`.
pub struct ResponseBuilder {
    headers: Vec<(String, String)>,
    status: StatusCode,
}

impl ResponseBuilder {
    pub fn status(mut self, code: StatusCode) -> Self {
        self.status = code;
        self
    }

    pub fn header(mut self, name: &str, value: &str) -> Self {
        self.headers.push((name.to_ascii_lowercase(), value.to_owned()));
        self
    }

    /// Terminate with a JSON body (`application/json`).
    pub fn json(self, body: Vec<u8>) -> Response {
        self.finish("application/json", body)
    }

    /// Terminate with a plain-text body.
    pub fn text(self, body: impl Into<String>) -> Response {
        self.finish("text/plain; charset=utf-8", body.into().into_bytes())
    }

    /// Terminate with a typed body.
    pub fn bytes(self, content_type: ContentType, body: Vec<u8>) -> Response {
        self.finish(content_type.as_str(), body)
    }

    /// Terminate with no body.
    pub fn no_body(self) -> Response {
        Response { status: self.status, headers: self.headers, body: Vec::new(), failure: None }
    }

    fn finish(self, content_type: &str, body: Vec<u8>) -> Response {
        let mut headers = vec![("content-type".to_owned(), content_type.to_owned())];
        headers.extend(self.headers);
        Response { status: self.status, headers, body, failure: None }
    }
}

/// Conversion into an HTTP [`Response`].
///
/// Implement on your own types to return them directly from handlers.
pub trait IntoResponse {
    fn into_response(self) -> Response;
}

impl IntoResponse for Response {
    fn into_response(self) -> Response { self }
}

impl IntoResponse for &'static str {
    fn into_response(self) -> Response { Response::text(self) }
}

impl IntoResponse for String {
    fn into_response(self) -> Response { Response::text(self) }
}

/// Return a status directly from a handler: `return StatusCode::NO_CONTENT`
impl IntoResponse for StatusCode {
    fn into_response(self) -> Response { Response::status(self) }
}

impl IntoResponse for Error {
    fn into_response(self) -> Response { Response::from_error(self) }
}

/// `Err` becomes an error response, so handlers can use `?`.
impl<R, E> IntoResponse for Result<R, E>
where
    R: IntoResponse,
    E: Into<Error>,
{
    fn into_response(self) -> Response {
        match self {
            Ok(r) => r.into_response(),
            Err(e) => Response::from_error(e.into()),
        }
    }
}
