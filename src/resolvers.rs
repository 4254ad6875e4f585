//! Client id and client IP resolution.
//!
//! Resolvers are tried in order; the first non-empty answer wins.

use axum::extract::ConnectInfo;
use axum::http::request::Parts;
use std::net::SocketAddr;

pub trait ClientResolver: Send + Sync {
    fn resolve_client(&self, parts: &Parts) -> Option<String>;
}

pub trait IpResolver: Send + Sync {
    fn resolve_ip(&self, parts: &Parts) -> Option<String>;
}

impl<F> ClientResolver for F
where
    F: Fn(&Parts) -> Option<String> + Send + Sync,
{
    fn resolve_client(&self, parts: &Parts) -> Option<String> {
        self(parts)
    }
}

impl<F> IpResolver for F
where
    F: Fn(&Parts) -> Option<String> + Send + Sync,
{
    fn resolve_ip(&self, parts: &Parts) -> Option<String> {
        self(parts)
    }
}

fn header_value(parts: &Parts, name: &str) -> Option<String> {
    parts
        .headers
        .get(name)
        .and_then(|value| value.to_str().ok())
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
}

/// Client id taken verbatim from a request header.
#[derive(Debug, Clone)]
pub struct ClientHeaderResolver {
    header: String,
}

impl ClientHeaderResolver {
    pub fn new(header: impl Into<String>) -> Self {
        Self {
            header: header.into(),
        }
    }
}

impl ClientResolver for ClientHeaderResolver {
    fn resolve_client(&self, parts: &Parts) -> Option<String> {
        header_value(parts, &self.header)
    }
}

/// Client IP from a header such as `X-Real-IP` or `X-Forwarded-For`.
///
/// For comma separated chains the first (originating) entry is used.
#[derive(Debug, Clone)]
pub struct IpHeaderResolver {
    header: String,
}

impl IpHeaderResolver {
    pub fn new(header: impl Into<String>) -> Self {
        Self {
            header: header.into(),
        }
    }
}

impl IpResolver for IpHeaderResolver {
    fn resolve_ip(&self, parts: &Parts) -> Option<String> {
        header_value(parts, &self.header)?
            .split(',')
            .next()
            .map(|ip| ip.trim().to_string())
            .filter(|ip| !ip.is_empty())
    }
}

/// Peer address of the connection, when the server records it.
#[derive(Debug, Clone, Default)]
pub struct ConnectionIpResolver;

impl IpResolver for ConnectionIpResolver {
    fn resolve_ip(&self, parts: &Parts) -> Option<String> {
        parts
            .extensions
            .get::<ConnectInfo<SocketAddr>>()
            .map(|ConnectInfo(addr)| addr.ip().to_string())
    }
}

pub fn first_client(resolvers: &[Box<dyn ClientResolver>], parts: &Parts) -> Option<String> {
    resolvers
        .iter()
        .find_map(|resolver| resolver.resolve_client(parts).filter(|id| !id.is_empty()))
}

pub fn first_ip(resolvers: &[Box<dyn IpResolver>], parts: &Parts) -> Option<String> {
    resolvers
        .iter()
        .find_map(|resolver| resolver.resolve_ip(parts).filter(|ip| !ip.is_empty()))
}
