use std::net::{IpAddr, SocketAddr};

use actix_governor::{KeyExtractor, SimpleKeyExtractionError};
use actix_web::{
    FromRequest, HttpRequest,
    dev::{Payload, ServiceRequest},
    http::StatusCode,
    web::Data,
};
use futures::future::{Ready, ready};

use crate::config::Config;

/// Source address of the request, if one can be determined.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ClientIp(pub Option<IpAddr>);

fn parse_host(value: &str) -> Option<IpAddr> {
    let value = value.trim();
    value
        .parse::<IpAddr>()
        .ok()
        .or_else(|| value.parse::<SocketAddr>().ok().map(|s| s.ip()))
        .or_else(|| {
            value
                .strip_prefix('[')
                .and_then(|v| v.split(']').next())
                .and_then(|v| v.parse::<IpAddr>().ok())
        })
        .map(|ip| ip.to_canonical())
}

/// Uses the socket peer unless proxy headers are trusted.
pub fn source_ip(req: &HttpRequest, trust_proxy_headers: bool) -> Option<IpAddr> {
    if trust_proxy_headers {
        if let Some(ip) = req.connection_info().realip_remote_addr().and_then(parse_host) {
            return Some(ip);
        }
    }
    req.peer_addr().map(|addr| addr.ip().to_canonical())
}

impl FromRequest for ClientIp {
    type Error = actix_web::Error;
    type Future = Ready<Result<Self, Self::Error>>;

    fn from_request(req: &HttpRequest, _: &mut Payload) -> Self::Future {
        let trust = req
            .app_data::<Data<Config>>()
            .is_some_and(|c| c.trust_proxy_headers);
        ready(Ok(ClientIp(source_ip(req, trust))))
    }
}

/// Rate-limit key: the same address `source_ip` resolves, so clients behind a
/// trusted proxy get a bucket each.
#[derive(Debug, Clone, Copy)]
pub struct ClientIpKeyExtractor {
    trust_proxy_headers: bool,
}

impl ClientIpKeyExtractor {
    pub fn new(trust_proxy_headers: bool) -> Self {
        Self {
            trust_proxy_headers,
        }
    }
}

impl KeyExtractor for ClientIpKeyExtractor {
    type Key = IpAddr;
    type KeyExtractionError = SimpleKeyExtractionError<&'static str>;

    fn extract(&self, req: &ServiceRequest) -> Result<Self::Key, Self::KeyExtractionError> {
        source_ip(req.request(), self.trust_proxy_headers).ok_or_else(|| {
            SimpleKeyExtractionError::new("Could not determine client address")
                .set_status_code(StatusCode::BAD_REQUEST)
        })
    }
}
