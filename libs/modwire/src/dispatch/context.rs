use axum::body::Bytes;
use axum::extract::{FromRequestParts, RawPathParams, Request};
use axum::response::{IntoResponse, Response};
use http::header::{CONTENT_TYPE, COOKIE};
use http::{Extensions, HeaderMap, HeaderName, HeaderValue, Method, StatusCode, Uri};
use parking_lot::Mutex;
use serde_json::{Map, Value};

use super::error::HttpError;

/// Request section a binding can read.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Section {
    Body,
    Query,
    Params,
    Headers,
    Cookies,
}

#[derive(Default)]
struct ResponseSlot {
    status: Option<StatusCode>,
    headers: HeaderMap,
    written: Option<Response>,
}

/// Everything a handler can see about one request, plus a slot for writing the response.
///
/// Sections are parsed once, up front. Query, params, headers and cookies are JSON
/// objects of strings (a repeated query key becomes an array).
pub struct RequestContext {
    method: Method,
    uri: Uri,
    body: Value,
    query: Value,
    params: Value,
    headers: Value,
    cookies: Value,
    raw_body: Bytes,
    extensions: Extensions,
    response: Mutex<ResponseSlot>,
}

impl std::fmt::Debug for RequestContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RequestContext")
            .field("method", &self.method)
            .field("uri", &self.uri)
            .field("params", &self.params)
            .field("query", &self.query)
            .finish_non_exhaustive()
    }
}

impl RequestContext {
    pub async fn from_request(req: Request) -> Result<Self, HttpError> {
        let (mut parts, body) = req.into_parts();

        let params = match RawPathParams::from_request_parts(&mut parts, &()).await {
            Ok(raw) => Value::Object(
                raw.iter()
                    .map(|(k, v)| (k.to_string(), Value::String(v.to_string())))
                    .collect(),
            ),
            Err(_) => Value::Object(Map::new()),
        };

        let raw_body = axum::body::to_bytes(body, usize::MAX)
            .await
            .map_err(body_read_error)?;

        let content_type = parts
            .headers
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .unwrap_or("");
        let body = parse_body(content_type, &raw_body)?;
        let query = parse_form(parts.uri.query().unwrap_or("").as_bytes());
        let headers = collect_headers(&parts.headers);
        let cookies = parse_cookies(&parts.headers);

        Ok(Self {
            method: parts.method,
            uri: parts.uri,
            body,
            query,
            params,
            headers,
            cookies,
            raw_body,
            extensions: parts.extensions,
            response: Mutex::new(ResponseSlot::default()),
        })
    }

    pub fn method(&self) -> &Method {
        &self.method
    }

    pub fn uri(&self) -> &Uri {
        &self.uri
    }

    pub fn path(&self) -> &str {
        self.uri.path()
    }

    pub fn section(&self, section: Section) -> &Value {
        match section {
            Section::Body => &self.body,
            Section::Query => &self.query,
            Section::Params => &self.params,
            Section::Headers => &self.headers,
            Section::Cookies => &self.cookies,
        }
    }

    pub fn body(&self) -> &Value {
        &self.body
    }

    pub fn raw_body(&self) -> &Bytes {
        &self.raw_body
    }

    pub fn param(&self, name: &str) -> Option<&str> {
        self.params.get(name).and_then(Value::as_str)
    }

    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .get(name.to_ascii_lowercase())
            .and_then(Value::as_str)
    }

    pub fn cookie(&self, name: &str) -> Option<&str> {
        self.cookies.get(name).and_then(Value::as_str)
    }

    /// Request extensions, as left by the router and upstream middleware.
    pub fn extensions(&self) -> &Extensions {
        &self.extensions
    }

    pub fn set_status(&self, status: StatusCode) {
        self.response.lock().status = Some(status);
    }

    pub fn status(&self) -> Option<StatusCode> {
        self.response.lock().status
    }

    pub fn insert_header(&self, name: HeaderName, value: HeaderValue) {
        self.response.lock().headers.insert(name, value);
    }

    /// Write the whole response from inside the handler. It is sent as-is.
    pub fn respond(&self, response: impl IntoResponse) {
        self.response.lock().written = Some(response.into_response());
    }

    pub fn has_responded(&self) -> bool {
        self.response.lock().written.is_some()
    }

    pub(crate) fn take_written(&self) -> Option<Response> {
        self.response.lock().written.take()
    }

    pub(crate) fn take_headers(&self) -> HeaderMap {
        std::mem::take(&mut self.response.lock().headers)
    }
}

fn body_read_error(err: axum::Error) -> HttpError {
    // the body limit layer only trips while streaming when there is no content-length
    if err.to_string().contains("length limit exceeded") {
        HttpError::new(StatusCode::PAYLOAD_TOO_LARGE, "request body too large")
    } else {
        HttpError::bad_request(format!("failed to read request body: {err}"))
    }
}

fn parse_body(content_type: &str, raw: &Bytes) -> Result<Value, HttpError> {
    if raw.iter().all(u8::is_ascii_whitespace) {
        return Ok(Value::Object(Map::new()));
    }
    let mime = content_type
        .split(';')
        .next()
        .unwrap_or("")
        .trim()
        .to_ascii_lowercase();
    if mime == "application/x-www-form-urlencoded" {
        return Ok(parse_form(raw));
    }
    if mime.starts_with("text/") {
        return Ok(Value::String(String::from_utf8_lossy(raw).into_owned()));
    }
    if mime == "application/json" || mime.ends_with("+json") {
        return serde_json::from_slice(raw)
            .map_err(|e| HttpError::bad_request(format!("malformed JSON body: {e}")));
    }
    // other media types are left to `raw_body`
    Ok(Value::Object(Map::new()))
}

/// `a=1&b=2&a=3` → `{"a": ["1", "3"], "b": "2"}`
fn parse_form(input: &[u8]) -> Value {
    let mut out = Map::new();
    for (key, value) in url::form_urlencoded::parse(input) {
        let value = Value::String(value.into_owned());
        match out.get_mut(key.as_ref()) {
            None => {
                out.insert(key.into_owned(), value);
            }
            Some(Value::Array(items)) => items.push(value),
            Some(existing) => {
                let first = existing.take();
                *existing = Value::Array(vec![first, value]);
            }
        }
    }
    Value::Object(out)
}

fn collect_headers(headers: &HeaderMap) -> Value {
    let mut out = Map::new();
    for name in headers.keys() {
        let joined = headers
            .get_all(name)
            .iter()
            .map(|v| String::from_utf8_lossy(v.as_bytes()).into_owned())
            .collect::<Vec<_>>()
            .join(", ");
        out.insert(name.as_str().to_string(), Value::String(joined));
    }
    Value::Object(out)
}

fn parse_cookies(headers: &HeaderMap) -> Value {
    let mut out = Map::new();
    for header in headers.get_all(COOKIE) {
        let Ok(raw) = header.to_str() else { continue };
        for pair in raw.split(';') {
            let Some((name, value)) = pair.split_once('=') else {
                continue;
            };
            let name = name.trim();
            if name.is_empty() || out.contains_key(name) {
                continue;
            }
            let value = value.trim().trim_matches('"');
            let decoded = urlencoding::decode(value)
                .map(|v| v.into_owned())
                .unwrap_or_else(|_| value.to_string());
            out.insert(name.to_string(), Value::String(decoded));
        }
    }
    Value::Object(out)
}
