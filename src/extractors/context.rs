//! Per-call context: caller identity, request path and client address.

use async_trait::async_trait;
use axum::{
    extract::{ConnectInfo, FromRequestParts, Request},
    http::request::Parts,
    middleware::Next,
    response::Response,
};
use std::net::SocketAddr;

/// Development header carrying the caller's subject id when the server is told to trust it.
pub const SUBJECT_ID_HEADER: &str = "X-Subject-Id";
const FORWARDED_FOR_HEADER: &str = "X-Forwarded-For";

/// Decoded caller identity. Authentication layers insert it as a request extension.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CallerIdentity {
    pub subject_id: String,
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct CallContext {
    pub identity: Option<CallerIdentity>,
    pub path: String,
    pub client_ip: Option<String>,
}

#[async_trait]
impl<S> FromRequestParts<S> for CallContext
where
    S: Send + Sync,
{
    type Rejection = std::convert::Infallible;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let identity = parts.extensions.get::<CallerIdentity>().cloned();
        let forwarded = parts
            .headers
            .get(FORWARDED_FOR_HEADER)
            .and_then(|v| v.to_str().ok())
            .and_then(|s| s.split(',').next())
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty());
        let client_ip = forwarded.or_else(|| {
            parts
                .extensions
                .get::<ConnectInfo<SocketAddr>>()
                .map(|ConnectInfo(addr)| addr.ip().to_string())
        });
        Ok(CallContext {
            identity,
            path: parts.uri.path().to_string(),
            client_ip,
        })
    }
}

/// Middleware accepting `X-Subject-Id` as the caller identity. Development only.
pub async fn trust_subject_header(mut req: Request, next: Next) -> Response {
    let subject = req
        .headers()
        .get(SUBJECT_ID_HEADER)
        .and_then(|v| v.to_str().ok())
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty());
    if let Some(subject_id) = subject {
        req.extensions_mut().insert(CallerIdentity { subject_id });
    }
    next.run(req).await
}
