use http::{HeaderMap, Method, header};

/// The request view the cache consumes: method, path, query parameters and
/// the headers that influence keying and delivery. Transport framing and
/// body handling stay with the host.
#[derive(Debug, Clone)]
pub struct CacheRequest {
    method: Method,
    path: String,
    query: Vec<(String, String)>,
    headers: HeaderMap,
}

impl CacheRequest {
    pub fn new(method: Method, path: impl Into<String>) -> Self {
        Self {
            method,
            path: path.into(),
            query: Vec::new(),
            headers: HeaderMap::new(),
        }
    }

    pub fn query_param(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.query.push((key.into(), value.into()));
        self
    }

    /// Parse a raw query string (`a=1&b=2&b=3`) into parameters, preserving
    /// order. A parameter without `=` gets an empty value.
    pub fn query_string(mut self, raw: &str) -> Self {
        for pair in raw.split('&') {
            if pair.is_empty() {
                continue;
            }
            match pair.split_once('=') {
                Some((key, value)) => self.query.push((key.to_string(), value.to_string())),
                None => self.query.push((pair.to_string(), String::new())),
            }
        }
        self
    }

    /// Insert a header, silently skipping names or values that do not parse.
    pub fn header(mut self, name: &str, value: &str) -> Self {
        if let (Ok(name), Ok(value)) = (
            header::HeaderName::try_from(name),
            http::HeaderValue::from_str(value),
        ) {
            self.headers.insert(name, value);
        }
        self
    }

    pub fn with_headers(mut self, headers: HeaderMap) -> Self {
        self.headers = headers;
        self
    }

    pub fn method(&self) -> &Method {
        &self.method
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    pub fn query(&self) -> &[(String, String)] {
        &self.query
    }

    pub fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    /// Whether the requester advertises acceptance of the given content
    /// coding in `Accept-Encoding`. Absent advertisement counts as refusal;
    /// the coordinator then decompresses before responding.
    pub fn accepts_encoding(&self, encoding: &str) -> bool {
        let Some(value) = self.headers.get(header::ACCEPT_ENCODING) else {
            return false;
        };
        let Ok(value) = value.to_str() else {
            return false;
        };
        for part in value.split(',') {
            let mut pieces = part.trim().split(';');
            let token = pieces.next().unwrap_or("").trim();
            let refused = pieces.any(|param| {
                param
                    .trim()
                    .strip_prefix("q=")
                    .and_then(|q| q.trim().parse::<f32>().ok())
                    .map(|q| q == 0.0)
                    .unwrap_or(false)
            });
            if refused {
                continue;
            }
            if token == "*" || token.eq_ignore_ascii_case(encoding) {
                return true;
            }
        }
        false
    }
}
