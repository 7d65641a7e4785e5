use crate::server::ServerError;
use axum::{
    extract::{ConnectInfo, FromRequestParts},
    http::{HeaderMap, request::Parts},
};
use std::net::{IpAddr, SocketAddr};

const X_FORWARDED_FOR: &str = "x-forwarded-for";
const X_REAL_IP: &str = "x-real-ip";

/// The address a request is attributed to.
///
/// Proxy headers win over the socket peer: the first `X-Forwarded-For` entry, then `X-Real-IP`.
/// Values that are not IP addresses are ignored. IPv4-mapped IPv6 addresses are reported as IPv4.
#[derive(Copy, Clone, Eq, PartialEq, Debug, Hash)]
pub struct ClientIp(pub IpAddr);

impl<S: Send + Sync> FromRequestParts<S> for ClientIp {
    type Rejection = ServerError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let peer = parts
            .extensions
            .get::<ConnectInfo<SocketAddr>>()
            .map(|ConnectInfo(addr)| addr.ip());

        resolve(&parts.headers, peer)
            .map(ClientIp)
            .ok_or(ServerError::UnknownClientIp)
    }
}

fn resolve(headers: &HeaderMap, peer: Option<IpAddr>) -> Option<IpAddr> {
    forwarded_for(headers)
        .or_else(|| header_ip(headers, X_REAL_IP))
        .or(peer)
        .map(|ip| ip.to_canonical())
}

fn forwarded_for(headers: &HeaderMap) -> Option<IpAddr> {
    let value = headers.get(X_FORWARDED_FOR)?.to_str().ok()?;
    value.split(',').next()?.trim().parse().ok()
}

fn header_ip(headers: &HeaderMap, name: &str) -> Option<IpAddr> {
    headers.get(name)?.to_str().ok()?.trim().parse().ok()
}
