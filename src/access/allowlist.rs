use std::net::IpAddr;
use std::sync::Arc;

use serde::Serialize;
use tracing::info;
use utoipa::ToSchema;

use crate::error::AppError;
use crate::model::{role::Role, user::User};
use crate::store::Store;

/// Network requirement attached to an action.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NetworkGate {
    /// Any source address.
    Open,
    /// Office network for everyone, plus a bound device for employees.
    Registration,
}

#[derive(Debug, Clone, PartialEq, Serialize, ToSchema)]
pub struct AllowlistSnapshot {
    #[serde(rename = "allowedIPs")]
    #[schema(example = json!(["192.168.1.10", "192.168.1.11"]))]
    pub allowed_ips: Vec<String>,
    #[schema(example = 2)]
    pub count: usize,
}

impl From<Vec<String>> for AllowlistSnapshot {
    fn from(allowed_ips: Vec<String>) -> Self {
        let count = allowed_ips.len();
        Self { allowed_ips, count }
    }
}

/// Parses an IP literal; IPv4-mapped IPv6 addresses collapse to IPv4.
pub fn parse_ip(raw: &str) -> Result<IpAddr, AppError> {
    let raw = raw.trim();
    raw.parse::<IpAddr>()
        .map(|ip| ip.to_canonical())
        .map_err(|_| AppError::validation(format!("Invalid IP address: {}", raw)))
}

/// Canonical, deduplicated list of IP literals, original order kept.
pub fn normalize_ips(raw: &[String]) -> Result<Vec<String>, AppError> {
    let mut out: Vec<String> = Vec::with_capacity(raw.len());
    for entry in raw.iter().filter(|e| !e.trim().is_empty()) {
        let ip = parse_ip(entry)?.to_string();
        if !out.contains(&ip) {
            out.push(ip);
        }
    }
    Ok(out)
}

fn contains(list: &[String], source: IpAddr) -> bool {
    let source = source.to_canonical();
    list.iter()
        .filter_map(|entry| entry.parse::<IpAddr>().ok())
        .any(|ip| ip.to_canonical() == source)
}

/// The pure decision: may a subject with `role` and device bindings
/// `allowed_ips` act from `source` under `gate`, given the office list `global`.
pub fn is_authorized(
    role: Role,
    allowed_ips: &[String],
    global: &[String],
    source: IpAddr,
    gate: NetworkGate,
) -> bool {
    match gate {
        NetworkGate::Open => true,
        NetworkGate::Registration => {
            let on_office_network = contains(global, source);
            if role.is_staff() {
                on_office_network
            } else {
                on_office_network && contains(allowed_ips, source)
            }
        }
    }
}

/// Owner of the global (office network) allowlist.
#[derive(Clone)]
pub struct IpAllowlist {
    store: Arc<dyn Store>,
}

impl IpAllowlist {
    pub fn new(store: Arc<dyn Store>) -> Self {
        Self { store }
    }

    pub async fn snapshot(&self) -> Result<AllowlistSnapshot, AppError> {
        Ok(self.store.global_allowlist().await?.into())
    }

    /// Validates and inserts `raw`; adding a present IP changes nothing.
    pub async fn add_ip(&self, raw: &str) -> Result<AllowlistSnapshot, AppError> {
        let ip = parse_ip(raw)?;
        let list = self.store.add_global_ip(&ip.to_string()).await?;
        info!(ip = %ip, count = list.len(), "Global allowlist updated");
        Ok(list.into())
    }

    pub async fn on_office_network(&self, source: IpAddr) -> Result<bool, AppError> {
        Ok(contains(&self.store.global_allowlist().await?, source))
    }

    pub async fn check(
        &self,
        user: &User,
        role: Role,
        source: IpAddr,
        gate: NetworkGate,
    ) -> Result<bool, AppError> {
        if gate == NetworkGate::Open {
            return Ok(true);
        }
        let global = self.store.global_allowlist().await?;
        Ok(is_authorized(role, &user.allowed_ips, &global, source, gate))
    }
}
