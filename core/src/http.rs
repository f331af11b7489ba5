//! HTTP exchange types described as plain data.
//!
//! # Design
//! The pipeline builds `HttpRequest` values and classifies `HttpResponse`
//! values without touching the network; a `Transport` performs the actual
//! round-trip in between. Keeping both ends as plain data makes the request
//! shape and the status handling testable without a socket.

/// HTTP method for a request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HttpMethod {
    Get,
    Post,
    Put,
    Delete,
}

impl HttpMethod {
    pub fn as_str(self) -> &'static str {
        match self {
            HttpMethod::Get => "GET",
            HttpMethod::Post => "POST",
            HttpMethod::Put => "PUT",
            HttpMethod::Delete => "DELETE",
        }
    }
}

/// An HTTP request described as plain data.
///
/// `url` is fully resolved against the client's base URL. Header names are
/// lower-case.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpRequest {
    pub method: HttpMethod,
    pub url: String,
    pub headers: Vec<(String, String)>,
    pub body: Option<String>,
}

impl HttpRequest {
    /// First value of the named header, compared case-insensitively.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(key, _)| key.eq_ignore_ascii_case(name))
            .map(|(_, value)| value.as_str())
    }
}

/// An HTTP response described as plain data.
///
/// Repeated headers (such as `set-cookie`) appear once per value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpResponse {
    pub status: u16,
    pub headers: Vec<(String, String)>,
    pub body: String,
}

impl HttpResponse {
    /// All values of the named header, compared case-insensitively.
    pub fn header_values<'a>(&'a self, name: &'a str) -> impl Iterator<Item = &'a str> + 'a {
        self.headers
            .iter()
            .filter(move |(key, _)| key.eq_ignore_ascii_case(name))
            .map(|(_, value)| value.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn header_lookup_ignores_case() {
        let req = HttpRequest {
            method: HttpMethod::Post,
            url: "http://localhost:4444/admin/login".to_string(),
            headers: vec![("content-type".to_string(), "application/json".to_string())],
            body: Some("{}".to_string()),
        };
        assert_eq!(req.header("Content-Type"), Some("application/json"));
        assert_eq!(req.header("cookie"), None);
    }

    #[test]
    fn header_value_outlives_the_lookup_name() {
        let req = HttpRequest {
            method: HttpMethod::Get,
            url: "http://localhost:4444/admin/me".to_string(),
            headers: vec![("cookie".to_string(), "session=abc".to_string())],
            body: None,
        };
        let value = {
            let name = String::from("COOKIE");
            req.header(&name)
        };
        assert_eq!(value, Some("session=abc"));
    }

    #[test]
    fn repeated_response_headers_are_all_returned() {
        let response = HttpResponse {
            status: 200,
            headers: vec![
                ("Set-Cookie".to_string(), "a=1".to_string()),
                ("content-type".to_string(), "text/plain".to_string()),
                ("set-cookie".to_string(), "b=2".to_string()),
            ],
            body: String::new(),
        };
        let cookies: Vec<&str> = response.header_values("set-cookie").collect();
        assert_eq!(cookies, vec!["a=1", "b=2"]);
    }
}
