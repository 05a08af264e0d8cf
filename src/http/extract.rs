//! Request extractors: admin authentication, client address, and path, query
//! and JSON bodies whose rejections render as API errors.

use std::convert::Infallible;
use std::net::{IpAddr, SocketAddr};

use axum::async_trait;
use axum::extract::{ConnectInfo, FromRequest, FromRequestParts, Request};
use axum::http::header::AUTHORIZATION;
use axum::http::request::Parts;
use serde::de::DeserializeOwned;
use tracing::warn;
use validator::Validate;

use super::error::ApiError;
use super::AppState;

/// Present on handlers that require `Authorization: Bearer <ADMIN_API_TOKEN>`.
#[derive(Debug, Clone, Copy)]
pub struct AdminGuard;

#[async_trait]
impl FromRequestParts<AppState> for AdminGuard {
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, Self::Rejection> {
        let token = parts
            .headers
            .get(AUTHORIZATION)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.strip_prefix("Bearer "))
            .map(str::trim)
            .filter(|t| !t.is_empty())
            .ok_or_else(ApiError::unauthorized)?;
        let expected = state.config.admin_api_token.as_bytes();
        #[allow(deprecated)]
        let matches = ring::constant_time::verify_slices_are_equal(token.as_bytes(), expected).is_ok();
        if !matches {
            warn!(path = %parts.uri.path(), "admin request with wrong token");
            return Err(ApiError::forbidden());
        }
        Ok(AdminGuard)
    }
}

/// `Path` whose rejection renders as an [`ApiError`].
#[derive(Debug, FromRequestParts)]
#[from_request(via(axum::extract::Path), rejection(ApiError))]
pub struct ApiPath<T>(pub T);

/// `Query` whose rejection renders as an [`ApiError`].
#[derive(Debug, FromRequestParts)]
#[from_request(via(axum::extract::Query), rejection(ApiError))]
pub struct ApiQuery<T>(pub T);

/// `Json` whose rejection renders as an [`ApiError`] with status 400.
#[derive(Debug, FromRequest)]
#[from_request(via(axum::Json), rejection(ApiError))]
pub struct ApiJson<T>(pub T);

/// JSON body that has passed its `validator` rules.
#[derive(Debug)]
pub struct ValidatedJson<T>(pub T);

#[async_trait]
impl<T, S> FromRequest<S> for ValidatedJson<T>
where
    T: DeserializeOwned + Validate,
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        let ApiJson(value) = ApiJson::<T>::from_request(req, state).await?;
        value.validate()?;
        Ok(Self(value))
    }
}

/// Rate-limit key for the calling client.
///
/// The TCP peer address, unless the peer is a configured trusted proxy: then
/// the rightmost `X-Forwarded-For` hop that is not itself a trusted proxy.
/// Hops a client writes itself sit to the left of that and are never used.
#[derive(Debug, Clone)]
pub struct ClientAddr(pub String);

#[async_trait]
impl FromRequestParts<AppState> for ClientAddr {
    type Rejection = Infallible;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, Self::Rejection> {
        let peer = parts.extensions.get::<ConnectInfo<SocketAddr>>().map(|ConnectInfo(addr)| addr.ip());
        let forwarded = parts.headers.get("x-forwarded-for").and_then(|v| v.to_str().ok());
        Ok(Self(client_key(peer, forwarded, &state.config.trusted_proxies)))
    }
}

fn client_key(peer: Option<IpAddr>, forwarded: Option<&str>, trusted: &[IpAddr]) -> String {
    let Some(peer) = peer else { return "unknown".to_string() };
    if !trusted.contains(&peer) {
        return peer.to_string();
    }
    let mut client = peer;
    for hop in forwarded.unwrap_or_default().rsplit(',').map(str::trim) {
        match hop.parse::<IpAddr>() {
            Ok(ip) if trusted.contains(&ip) => client = ip,
            Ok(ip) => return ip.to_string(),
            Err(_) => break,
        }
    }
    client.to_string()
}
