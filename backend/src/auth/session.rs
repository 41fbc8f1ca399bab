//! Session and return-path cookies.

use axum::http::{header, HeaderMap};

/// Holds the signed session token.
pub const AUTH_COOKIE: &str = "janus_auth";
/// Holds the path to go back to after signing in.
pub const RETURN_COOKIE: &str = "janus_auth_return";
/// Holds the `state` sent to the identity provider.
pub const STATE_COOKIE: &str = "janus_auth_state";

/// Read one cookie from the request's `Cookie` headers.
pub fn read_cookie(headers: &HeaderMap, name: &str) -> Option<String> {
    headers
        .get_all(header::COOKIE)
        .iter()
        .filter_map(|value| value.to_str().ok())
        .flat_map(|value| value.split(';'))
        .filter_map(|pair| pair.trim().split_once('='))
        .find(|(key, _)| *key == name)
        .map(|(_, value)| value.to_string())
        .filter(|value| !value.is_empty())
}

/// `Set-Cookie` value storing `value` for the whole site.
pub fn set_cookie(name: &str, value: &str) -> String {
    format!("{}={}; Path=/; HttpOnly; SameSite=Lax", name, value)
}

/// Like [`set_cookie`], but kept by the browser for `max_age` seconds.
pub fn set_cookie_for(name: &str, value: &str, max_age: u64) -> String {
    format!("{}; Max-Age={}", set_cookie(name, value), max_age)
}

/// `Set-Cookie` value that expires `name` immediately.
pub fn clear_cookie(name: &str) -> String {
    format!("{}=; Path=/; HttpOnly; SameSite=Lax; Max-Age=0", name)
}

/// Only local absolute paths are accepted as return targets.
///
/// Browsers read both `//host` and `/\host` as another origin.
pub fn safe_return_path(path: Option<String>) -> String {
    match path {
        Some(path) if is_local_path(&path) => path,
        _ => "/".to_string(),
    }
}

fn is_local_path(path: &str) -> bool {
    let mut chars = path.chars();
    chars.next() == Some('/') && !matches!(chars.next(), Some('/') | Some('\\'))
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[test]
    fn test_read_cookie_across_headers() {
        let mut headers = HeaderMap::new();
        headers.append(header::COOKIE, "a=1; b=2".parse().unwrap());
        headers.append(header::COOKIE, "janus_auth_return=/user/admin/".parse().unwrap());
        assert_eq!(read_cookie(&headers, "b"), Some("2".to_string()));
        assert_eq!(
            read_cookie(&headers, RETURN_COOKIE),
            Some("/user/admin/".to_string())
        );
        assert_eq!(read_cookie(&headers, AUTH_COOKIE), None);
    }

    #[test]
    fn test_empty_cookie_is_absent() {
        let mut headers = HeaderMap::new();
        headers.insert(header::COOKIE, "janus_auth=".parse().unwrap());
        assert_eq!(read_cookie(&headers, AUTH_COOKIE), None);
    }

    #[test]
    fn test_clear_cookie_expires() {
        assert!(clear_cookie(AUTH_COOKIE).starts_with("janus_auth=;"));
        assert!(clear_cookie(AUTH_COOKIE).contains("Max-Age=0"));
    }

    #[test]
    fn test_set_cookie_for_keeps_attributes() {
        assert_eq!(
            set_cookie_for(AUTH_COOKIE, "abc", 3600),
            "janus_auth=abc; Path=/; HttpOnly; SameSite=Lax; Max-Age=3600"
        );
    }

    #[rstest]
    #[case(Some("/user/admin/"), "/user/admin/")]
    #[case(Some("/"), "/")]
    #[case(Some("//evil.example.com"), "/")]
    #[case(Some("/\\evil.example.com"), "/")]
    #[case(Some("/\\"), "/")]
    #[case(Some("/user/a\\b"), "/user/a\\b")]
    #[case(Some("https://evil.example.com"), "/")]
    #[case(None, "/")]
    fn test_safe_return_path(#[case] input: Option<&str>, #[case] expected: &str) {
        assert_eq!(safe_return_path(input.map(str::to_string)), expected);
    }
}
