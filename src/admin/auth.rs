use std::sync::Arc;

use axum::{
    body::Body,
    extract::State,
    http::{header, Request, StatusCode},
    middleware::Next,
    response::Response,
};

/// Expected `Authorization: Bearer <key>` value.
#[derive(Debug, Clone)]
pub struct ApiKey(Arc<str>);

impl ApiKey {
    pub fn new(key: &str) -> Self {
        Self(Arc::from(format!("Bearer {key}")))
    }

    /// Compare a presented `Authorization` value in constant time.
    ///
    /// Always walks the longer of the two inputs.
    pub fn matches(&self, presented: &str) -> bool {
        let expected = self.0.as_bytes();
        let presented = presented.as_bytes();
        let mut diff = u8::from(expected.len() != presented.len());
        for i in 0..expected.len().max(presented.len()) {
            let a = expected.get(i).copied().unwrap_or(0);
            let b = presented.get(i).copied().unwrap_or(0);
            diff |= a ^ b;
        }
        diff == 0
    }
}

pub async fn admin_auth_middleware(
    State(expected): State<ApiKey>,
    request: Request<Body>,
    next: Next,
) -> Result<Response, StatusCode> {
    let auth_header = request
        .headers()
        .get(header::AUTHORIZATION)
        .and_then(|h| h.to_str().ok());

    if let Some(auth_val) = auth_header {
        if expected.matches(auth_val) {
            return Ok(next.run(request).await);
        }
    }

    tracing::warn!(path = %request.uri().path(), "Rejected unauthenticated admin request");
    Err(StatusCode::UNAUTHORIZED)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn matches_only_the_exact_header() {
        let key = ApiKey::new("secret");
        assert!(key.matches("Bearer secret"));
        assert!(!key.matches("Bearer secreT"));
        assert!(!key.matches("Bearer secret2"));
        assert!(!key.matches("Bearer secre"));
        assert!(!key.matches("secret"));
        assert!(!key.matches(""));
    }
}
