use http::{HeaderMap, Method, header};

use crate::request::CacheRequest;

/// Derive the cache key for a request, or `None` when the request is never
/// cached (any method other than GET). The key is the blake3 hex digest of
/// the composed string; the hash is for compactness and uniformity only.
pub fn derive(request: &CacheRequest) -> Option<String> {
    compose(request).map(|composed| blake3::hash(composed.as_bytes()).to_hex().to_string())
}

/// The pre-hash composition: `[principal@]METHOD PATH[?sorted-query][+suffix]`.
/// Deterministic and idempotent; semantically equivalent requests compose to
/// the same string regardless of query-parameter order.
pub(crate) fn compose(request: &CacheRequest) -> Option<String> {
    if request.method() != &Method::GET {
        return None;
    }

    let mut composed = String::new();
    if let Some(principal) = principal_hint(request.headers()) {
        composed.push_str(&principal);
        composed.push('@');
    }
    composed.push_str(request.method().as_str());
    composed.push_str(request.path());
    if !request.query().is_empty() {
        composed.push('?');
        composed.push_str(&render_sorted_query(request.query()));
    }
    if let Some(suffix) = accept_suffix(request.headers()) {
        composed.push('+');
        composed.push_str(&suffix);
    }
    Some(composed)
}

/// Render query parameters with keys sorted lexicographically. Repeated
/// values for one key keep their original order.
fn render_sorted_query(pairs: &[(String, String)]) -> String {
    let mut keys: Vec<&str> = pairs.iter().map(|(key, _)| key.as_str()).collect();
    keys.sort_unstable();
    keys.dedup();

    let mut parts = Vec::with_capacity(pairs.len());
    for key in keys {
        for (candidate, value) in pairs {
            if candidate == key {
                parts.push(format!("{key}={value}"));
            }
        }
    }
    parts.join("&")
}

/// Map the first `Accept` media range to a compact key suffix. Recognized
/// types get short tokens, unrecognized concrete types are appended
/// verbatim, and wildcard ranges contribute nothing.
fn accept_suffix(headers: &HeaderMap) -> Option<String> {
    let value = headers.get(header::ACCEPT)?.to_str().ok()?;
    let media_type = value
        .split(',')
        .next()
        .unwrap_or("")
        .split(';')
        .next()
        .unwrap_or("")
        .trim()
        .to_ascii_lowercase();

    if media_type.is_empty() || media_type.contains('*') {
        return None;
    }
    let token = match media_type.as_str() {
        "text/csv" | "application/csv" => "csv",
        "application/json" | "text/json" => "json",
        "application/xml" | "text/xml" => "xml",
        other => other,
    };
    Some(token.to_string())
}

/// Read the credential identity from the authorization header without
/// verifying anything: strip a leading scheme token, then truncate at the
/// first `:` so `user:signature` shapes contribute only the user part.
fn principal_hint(headers: &HeaderMap) -> Option<String> {
    let value = headers.get(header::AUTHORIZATION)?.to_str().ok()?.trim();
    let credential = match value.split_once(' ') {
        Some((_scheme, rest)) => rest.trim(),
        None => value,
    };
    let principal = credential.split(':').next().unwrap_or("").trim();
    if principal.is_empty() {
        None
    } else {
        Some(principal.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::{compose, derive};
    use crate::request::CacheRequest;
    use http::Method;

    fn get(path: &str) -> CacheRequest {
        CacheRequest::new(Method::GET, path)
    }

    #[test]
    fn bare_get_composes_method_and_path() {
        assert_eq!(compose(&get("/somepath")).as_deref(), Some("GET/somepath"));
    }

    #[test]
    fn non_get_methods_have_no_key() {
        for method in [Method::POST, Method::PUT, Method::DELETE, Method::HEAD] {
            let request = CacheRequest::new(method, "/somepath");
            assert!(derive(&request).is_none());
        }
    }

    #[test]
    fn query_keys_are_sorted_values_keep_order() {
        let request = get("/r").query_string("foo=bar&a=b&123=c");
        assert_eq!(compose(&request).as_deref(), Some("GET/r?123=c&a=b&foo=bar"));

        let repeated = get("/r").query_string("x=2&a=1&x=1");
        assert_eq!(compose(&repeated).as_deref(), Some("GET/r?a=1&x=2&x=1"));
    }

    #[test]
    fn reordered_query_yields_identical_key() {
        let first = get("/r").query_string("foo=bar&a=b&123=c");
        let second = get("/r").query_string("123=c&a=b&foo=bar");
        assert_eq!(derive(&first), derive(&second));
    }

    #[test]
    fn recognized_accept_types_map_to_tokens() {
        for (accept, expected) in [
            ("application/json", "GET/r+json"),
            ("text/csv", "GET/r+csv"),
            ("text/xml", "GET/r+xml"),
        ] {
            let request = get("/r").header("accept", accept);
            assert_eq!(compose(&request).as_deref(), Some(expected));
        }
    }

    #[test]
    fn unrecognized_concrete_accept_type_is_verbatim() {
        let request = get("/r").header("accept", "application/vnd.custom");
        assert_eq!(
            compose(&request).as_deref(),
            Some("GET/r+application/vnd.custom")
        );
    }

    #[test]
    fn wildcard_accept_contributes_no_suffix() {
        let request = get("/r").header("accept", "*/*");
        assert_eq!(compose(&request).as_deref(), Some("GET/r"));
    }

    #[test]
    fn accept_parameters_are_ignored() {
        let request = get("/r").header("accept", "application/json; charset=utf-8, text/plain");
        assert_eq!(compose(&request).as_deref(), Some("GET/r+json"));
    }

    #[test]
    fn principal_hint_prefixes_the_key() {
        let request = get("/r").header("authorization", "alice:deadbeef");
        assert_eq!(compose(&request).as_deref(), Some("alice@GET/r"));

        let with_scheme = get("/r").header("authorization", "ApiKey bob:cafe");
        assert_eq!(compose(&with_scheme).as_deref(), Some("bob@GET/r"));
    }

    #[test]
    fn principal_changes_the_derived_key() {
        let anonymous = get("/r");
        let named = get("/r").header("authorization", "alice:deadbeef");
        assert_ne!(derive(&anonymous), derive(&named));
    }

    #[test]
    fn derived_key_is_deterministic() {
        let request = get("/somepath");
        let expected = blake3::hash(b"GET/somepath").to_hex().to_string();
        assert_eq!(derive(&request).as_deref(), Some(expected.as_str()));
        assert_eq!(derive(&request), derive(&request.clone()));
    }
}
