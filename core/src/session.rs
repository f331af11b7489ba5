//! Session cookies carried between calls.
//!
//! `Session` is written only by a successful login and read by every request
//! the pipeline builds. Expiry and logout are decided by the server; nothing
//! here ever drops a cookie except a newer one with the same name.
//!
//! Concurrent logins on the same client race: each cookie name keeps
//! whichever value was stored last, and requests built while a login is in
//! flight may go out with the old cookies.

use parking_lot::RwLock;

#[derive(Debug, Default)]
pub struct Session {
    cookies: RwLock<Vec<(String, String)>>,
}

impl Session {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_empty(&self) -> bool {
        self.cookies.read().is_empty()
    }

    /// Value for a `cookie` request header, or `None` before login.
    pub fn cookie_header(&self) -> Option<String> {
        let cookies = self.cookies.read();
        if cookies.is_empty() {
            return None;
        }
        let pairs: Vec<String> = cookies
            .iter()
            .map(|(name, value)| format!("{name}={value}"))
            .collect();
        Some(pairs.join("; "))
    }

    /// Keep the `name=value` part of each `Set-Cookie` value, replacing any
    /// cookie already stored under the same name. Returns how many were kept.
    pub(crate) fn store_set_cookies<'a>(&self, values: impl IntoIterator<Item = &'a str>) -> usize {
        let mut cookies = self.cookies.write();
        let mut stored = 0;
        for value in values {
            let Some((name, value)) = parse_set_cookie(value) else {
                continue;
            };
            match cookies.iter_mut().find(|(existing, _)| *existing == name) {
                Some(slot) => slot.1 = value,
                None => cookies.push((name, value)),
            }
            stored += 1;
        }
        stored
    }
}

fn parse_set_cookie(header: &str) -> Option<(String, String)> {
    let pair = header.split(';').next()?;
    let (name, value) = pair.split_once('=')?;
    let name = name.trim();
    if name.is_empty() {
        return None;
    }
    Some((name.to_string(), value.trim().to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_session_has_no_cookie_header() {
        let session = Session::new();
        assert!(session.is_empty());
        assert_eq!(session.cookie_header(), None);
    }

    #[test]
    fn attributes_are_dropped() {
        let session = Session::new();
        let stored = session.store_set_cookies(["session=abc123; Path=/; HttpOnly; Secure"]);
        assert_eq!(stored, 1);
        assert_eq!(session.cookie_header().as_deref(), Some("session=abc123"));
    }

    #[test]
    fn multiple_cookies_are_joined_in_order() {
        let session = Session::new();
        session.store_set_cookies(["session=abc; Path=/", "xsrf=tok"]);
        assert_eq!(session.cookie_header().as_deref(), Some("session=abc; xsrf=tok"));
    }

    #[test]
    fn same_name_replaces_previous_value() {
        let session = Session::new();
        session.store_set_cookies(["session=old", "xsrf=tok"]);
        session.store_set_cookies(["session=new"]);
        assert_eq!(session.cookie_header().as_deref(), Some("session=new; xsrf=tok"));
    }

    #[test]
    fn malformed_values_are_skipped() {
        let session = Session::new();
        let stored = session.store_set_cookies(["garbage", "=novalue", " ; Path=/"]);
        assert_eq!(stored, 0);
        assert!(session.is_empty());
    }
}
