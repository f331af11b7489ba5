//! The request/response pipeline shared by every resource operation.
//!
//! # Design
//! Each verb primitive runs the same three steps: build an `HttpRequest`
//! (attaching session cookies), hand it to the `Transport`, then pass the
//! response through `classify`. The builders and `classify` are pure, so the
//! request shapes and the status taxonomy are tested without any I/O. No
//! retries happen here; a failed status is returned to the caller as-is.

use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::debug;
use url::Url;

use crate::error::{ApiError, ErrorKind};
use crate::http::{HttpMethod, HttpRequest, HttpResponse};
use crate::session::Session;
use crate::transport::Transport;

const JSON_CONTENT_TYPE: &str = "application/json";
const TEXT_CONTENT_TYPE: &str = "text/plain";

/// Owns the transport, the base URL and the session for one client.
#[derive(Debug)]
pub struct HttpPipeline<T> {
    transport: T,
    base_url: Url,
    session: Session,
}

impl<T: Transport> HttpPipeline<T> {
    pub fn new(base_url: &str, transport: T) -> Result<Self, ApiError> {
        let base_url = Url::parse(base_url)?;
        if base_url.cannot_be_a_base() {
            return Err(ApiError::InvalidUrl(
                url::ParseError::RelativeUrlWithCannotBeABaseBase,
            ));
        }
        Ok(Self {
            transport,
            base_url,
            session: Session::new(),
        })
    }

    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    pub fn session(&self) -> &Session {
        &self.session
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    /// Resolve an absolute path against the base URL.
    ///
    /// The base URL's own path is replaced. Segments and query pairs are
    /// percent-encoded; an empty last segment yields a trailing slash. Query
    /// values are form-encoded, so a space is sent as `+`, which the server
    /// decodes the same as `%20`.
    pub fn url(&self, segments: &[&str], query: &[(&str, &str)]) -> Result<Url, ApiError> {
        let mut url = self.base_url.clone();
        url.set_query(None);
        url.set_fragment(None);
        url.path_segments_mut()
            .map_err(|()| ApiError::InvalidUrl(url::ParseError::RelativeUrlWithCannotBeABaseBase))?
            .clear()
            .extend(segments);
        if !query.is_empty() {
            url.query_pairs_mut().extend_pairs(query);
        }
        Ok(url)
    }

    // -----------------------------------------------------------------------
    // Request builders
    // -----------------------------------------------------------------------

    pub fn build_get(&self, url: &Url) -> HttpRequest {
        self.request(HttpMethod::Get, url, None, None)
    }

    pub fn build_post_json<P>(&self, url: &Url, payload: &P) -> Result<HttpRequest, ApiError>
    where
        P: Serialize + ?Sized,
    {
        let body = serde_json::to_string(payload)
            .map_err(|e| ApiError::SerializationError(e.to_string()))?;
        Ok(self.request(HttpMethod::Post, url, Some(JSON_CONTENT_TYPE), Some(body)))
    }

    pub fn build_put_empty(&self, url: &Url) -> HttpRequest {
        self.request(HttpMethod::Put, url, Some(TEXT_CONTENT_TYPE), Some(String::new()))
    }

    pub fn build_delete(&self, url: &Url) -> HttpRequest {
        self.request(HttpMethod::Delete, url, None, None)
    }

    fn request(
        &self,
        method: HttpMethod,
        url: &Url,
        content_type: Option<&str>,
        body: Option<String>,
    ) -> HttpRequest {
        let mut headers = Vec::new();
        if let Some(content_type) = content_type {
            headers.push(("content-type".to_string(), content_type.to_string()));
        }
        if let Some(cookie) = self.session.cookie_header() {
            headers.push(("cookie".to_string(), cookie));
        }
        HttpRequest {
            method,
            url: url.to_string(),
            headers,
            body,
        }
    }

    // -----------------------------------------------------------------------
    // Verb primitives
    // -----------------------------------------------------------------------

    pub fn get(&self, url: &Url) -> Result<String, ApiError> {
        Ok(self.send(self.build_get(url))?.body)
    }

    pub fn post_json<P>(&self, url: &Url, payload: &P) -> Result<String, ApiError>
    where
        P: Serialize + ?Sized,
    {
        Ok(self.send(self.build_post_json(url, payload)?)?.body)
    }

    pub fn put_empty(&self, url: &Url) -> Result<String, ApiError> {
        Ok(self.send(self.build_put_empty(url))?.body)
    }

    pub fn delete(&self, url: &Url) -> Result<String, ApiError> {
        Ok(self.send(self.build_delete(url))?.body)
    }

    /// POST like `post_json`, then keep any cookies the server set.
    ///
    /// Returns the number of cookies stored. Nothing is stored on failure.
    pub(crate) fn post_json_capturing_session<P>(&self, url: &Url, payload: &P) -> Result<usize, ApiError>
    where
        P: Serialize + ?Sized,
    {
        let response = self.send(self.build_post_json(url, payload)?)?;
        Ok(self
            .session
            .store_set_cookies(response.header_values("set-cookie")))
    }

    fn send(&self, request: HttpRequest) -> Result<HttpResponse, ApiError> {
        let response = self.transport.execute(&request)?;
        debug!(
            method = request.method.as_str(),
            url = %request.url,
            status = response.status,
            "keywhiz exchange"
        );
        classify(response)
    }
}

/// Map a response onto the error taxonomy, passing successes through intact.
pub fn classify(response: HttpResponse) -> Result<HttpResponse, ApiError> {
    let status = response.status;
    if let Some(kind) = ErrorKind::from_status(status) {
        debug!(status, ?kind, "classified failure");
        return Err(ApiError::Status(kind));
    }
    if status >= 400 {
        debug!(status, "unclassified failure");
        return Err(ApiError::UnexpectedStatus {
            status,
            body: response.body,
        });
    }
    Ok(response)
}

pub(crate) fn decode<R: DeserializeOwned>(body: &str) -> Result<R, ApiError> {
    serde_json::from_str(body).map_err(|e| ApiError::DeserializationError(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mock::MockTransport;

    const BASE_URL: &str = "http://localhost:4444";

    fn pipeline(transport: MockTransport) -> HttpPipeline<MockTransport> {
        HttpPipeline::new(BASE_URL, transport).unwrap()
    }

    fn response(status: u16, body: &str) -> HttpResponse {
        HttpResponse {
            status,
            headers: Vec::new(),
            body: body.to_string(),
        }
    }

    #[test]
    fn classify_maps_every_known_status() {
        let expected = [
            (400, ErrorKind::MalformedRequest),
            (401, ErrorKind::Unauthorized),
            (403, ErrorKind::Forbidden),
            (404, ErrorKind::NotFound),
            (409, ErrorKind::Conflict),
            (415, ErrorKind::UnsupportedMediaType),
            (422, ErrorKind::Validation),
        ];
        for (status, kind) in expected {
            let err = classify(response(status, "")).unwrap_err();
            assert!(matches!(err, ApiError::Status(k) if k == kind), "{status}");
        }
    }

    #[test]
    fn classify_other_failures_carry_status_and_body() {
        for status in [402, 405, 429, 500, 503, 599] {
            let err = classify(response(status, "boom")).unwrap_err();
            match err {
                ApiError::UnexpectedStatus { status: s, body } => {
                    assert_eq!(s, status);
                    assert_eq!(body, "boom");
                }
                other => panic!("{status}: unexpected {other:?}"),
            }
        }
    }

    #[test]
    fn classify_passes_success_body_unmodified() {
        for status in [200, 201, 204, 302, 399] {
            let body = "  {\"raw\": true}\n";
            let ok = classify(response(status, body)).unwrap();
            assert_eq!(ok.body, body, "{status}");
        }
    }

    #[test]
    fn every_primitive_runs_the_classifier() {
        let transport = MockTransport::new()
            .respond(404, "")
            .respond(409, "")
            .respond(403, "")
            .respond(500, "");
        let p = pipeline(transport);
        let url = p.url(&["admin", "groups"], &[]).unwrap();

        assert!(p.get(&url).unwrap_err().is_not_found());
        assert_eq!(
            p.post_json(&url, &serde_json::json!({})).unwrap_err().kind(),
            Some(ErrorKind::Conflict)
        );
        assert_eq!(p.put_empty(&url).unwrap_err().kind(), Some(ErrorKind::Forbidden));
        assert_eq!(p.delete(&url).unwrap_err().status(), Some(500));
        assert_eq!(p.transport().calls(), 4);
    }

    #[test]
    fn url_replaces_base_path_and_keeps_trailing_slash() {
        let p = HttpPipeline::new("http://localhost:4444/ignored/path?x=1", MockTransport::new()).unwrap();
        let url = p.url(&["admin", "groups", ""], &[]).unwrap();
        assert_eq!(url.as_str(), "http://localhost:4444/admin/groups/");
    }

    #[test]
    fn url_encodes_segments_and_query() {
        let p = pipeline(MockTransport::new());
        let url = p
            .url(&["admin", "secrets", "generators", "a/b"], &[])
            .unwrap();
        assert_eq!(url.as_str(), "http://localhost:4444/admin/secrets/generators/a%2Fb");

        let url = p
            .url(&["admin", "secrets"], &[("name", "db pass&x"), ("version", "")])
            .unwrap();
        assert_eq!(
            url.as_str(),
            "http://localhost:4444/admin/secrets?name=db+pass%26x&version="
        );
    }

    #[test]
    fn base_url_must_be_usable() {
        assert!(matches!(
            HttpPipeline::new("not a url", MockTransport::new()),
            Err(ApiError::InvalidUrl(_))
        ));
        assert!(matches!(
            HttpPipeline::new("mailto:admin@example.com", MockTransport::new()),
            Err(ApiError::InvalidUrl(_))
        ));
    }

    #[test]
    fn post_json_sets_content_type_and_body() {
        let p = pipeline(MockTransport::new());
        let url = p.url(&["admin", "clients"], &[]).unwrap();
        let req = p
            .build_post_json(&url, &serde_json::json!({"name": "web"}))
            .unwrap();
        assert_eq!(req.method, HttpMethod::Post);
        assert_eq!(req.url, "http://localhost:4444/admin/clients");
        assert_eq!(req.header("content-type"), Some("application/json"));
        assert_eq!(req.body.as_deref(), Some(r#"{"name":"web"}"#));
    }

    #[test]
    fn put_empty_sends_empty_text_body() {
        let p = pipeline(MockTransport::new());
        let url = p.url(&["admin", "memberships"], &[]).unwrap();
        let req = p.build_put_empty(&url);
        assert_eq!(req.method, HttpMethod::Put);
        assert_eq!(req.header("content-type"), Some("text/plain"));
        assert_eq!(req.body.as_deref(), Some(""));
    }

    #[test]
    fn get_and_delete_carry_no_body_or_headers_before_login() {
        let p = pipeline(MockTransport::new());
        let url = p.url(&["admin", "me"], &[]).unwrap();
        for req in [p.build_get(&url), p.build_delete(&url)] {
            assert!(req.body.is_none());
            assert!(req.headers.is_empty());
        }
    }

    #[test]
    fn captured_cookies_ride_on_later_requests() {
        let transport = MockTransport::new()
            .respond_with_headers(200, "", &[("Set-Cookie", "session=s3cr3t; Path=/; HttpOnly")])
            .respond(200, "[]");
        let p = pipeline(transport);
        let login = p.url(&["admin", "login"], &[]).unwrap();
        let stored = p
            .post_json_capturing_session(&login, &serde_json::json!({}))
            .unwrap();
        assert_eq!(stored, 1);

        let url = p.url(&["admin", "groups", ""], &[]).unwrap();
        p.get(&url).unwrap();
        let sent = p.transport().requests();
        assert_eq!(sent[0].header("cookie"), None);
        assert_eq!(sent[1].header("cookie"), Some("session=s3cr3t"));
    }

    #[test]
    fn failed_capture_leaves_session_untouched() {
        let transport = MockTransport::new()
            .respond_with_headers(401, "", &[("Set-Cookie", "session=nope")]);
        let p = pipeline(transport);
        let login = p.url(&["admin", "login"], &[]).unwrap();
        let err = p
            .post_json_capturing_session(&login, &serde_json::json!({}))
            .unwrap_err();
        assert_eq!(err.kind(), Some(ErrorKind::Unauthorized));
        assert!(p.session().is_empty());
    }

    #[test]
    fn transport_failures_pass_through() {
        let p = pipeline(MockTransport::new());
        let url = p.url(&["admin", "me"], &[]).unwrap();
        assert!(matches!(p.get(&url), Err(ApiError::Transport(_))));
    }

    #[test]
    fn decode_reports_bad_json() {
        let err = decode::<Vec<String>>("not json").unwrap_err();
        assert!(matches!(err, ApiError::DeserializationError(_)));
    }
}
