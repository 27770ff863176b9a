//! Extract the client address from a request (X-Forwarded-For, else the socket peer).

use async_trait::async_trait;
use axum::{
    extract::{ConnectInfo, FromRequestParts},
    http::request::Parts,
};
use serde::Serialize;
use std::net::{IpAddr, SocketAddr};

/// Header consulted first. Only its first hop is used.
pub const FORWARDED_FOR_HEADER: &str = "X-Forwarded-For";

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize)]
pub struct ClientAddr(pub Option<IpAddr>);

impl ClientAddr {
    pub fn from_parts(parts: &Parts) -> Self {
        let forwarded = parts
            .headers
            .get(FORWARDED_FOR_HEADER)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.split(',').next())
            .and_then(|hop| hop.trim().parse::<IpAddr>().ok());
        if forwarded.is_some() {
            return ClientAddr(forwarded);
        }
        let peer = parts
            .extensions
            .get::<ConnectInfo<SocketAddr>>()
            .map(|ConnectInfo(addr)| addr.ip());
        ClientAddr(peer)
    }

    pub fn ip(&self) -> Option<IpAddr> {
        self.0
    }
}

#[async_trait]
impl<S> FromRequestParts<S> for ClientAddr
where
    S: Send + Sync,
{
    type Rejection = std::convert::Infallible;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        Ok(ClientAddr::from_parts(parts))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::Request;

    fn parts(builder: axum::http::request::Builder) -> Parts {
        builder.body(()).unwrap().into_parts().0
    }

    #[test]
    fn first_forwarded_hop_wins() {
        let p = parts(Request::builder().header(FORWARDED_FOR_HEADER, "203.0.113.7, 10.0.0.1"));
        assert_eq!(ClientAddr::from_parts(&p).ip(), Some("203.0.113.7".parse().unwrap()));
    }

    #[test]
    fn falls_back_to_peer_address() {
        let mut p = parts(Request::builder());
        p.extensions
            .insert(ConnectInfo("192.0.2.10:4431".parse::<SocketAddr>().unwrap()));
        assert_eq!(ClientAddr::from_parts(&p).ip(), Some("192.0.2.10".parse().unwrap()));
    }

    #[test]
    fn unknown_without_either() {
        assert_eq!(ClientAddr::from_parts(&parts(Request::builder())), ClientAddr(None));
    }
}
