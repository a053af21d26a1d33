//! Subdomain resolution: maps a `Host` header to a tenant.
//!
//! Pure function of its inputs. Anything ambiguous resolves to the primary
//! domain rather than guessing a tenant.

use edge_protocol::TenantResolution;

/// Hosts that indicate local development without DNS.
const LOOPBACK_MARKERS: [&str; 2] = ["localhost", "127.0.0.1"];

/// Resolve the tenant for `host`.
///
/// `marketing_alias` is the label (normally `www`) that maps to the primary
/// domain instead of a tenant.
pub fn resolve_subdomain(
    host: &str,
    primary_domain: Option<&str>,
    marketing_alias: &str,
) -> TenantResolution {
    let host = host.trim().to_ascii_lowercase();
    if host.is_empty() {
        return TenantResolution::primary();
    }

    let hostname = strip_port(&host);

    if LOOPBACK_MARKERS.iter().any(|m| host.contains(m)) {
        return match loopback_tenant(hostname) {
            Some(label) => TenantResolution::tenant(label),
            None => TenantResolution::primary(),
        };
    }

    let Some(primary) = primary_domain.map(str::to_ascii_lowercase) else {
        return TenantResolution::primary();
    };

    if hostname == primary {
        return TenantResolution::primary();
    }

    let labels: Vec<&str> = hostname.split('.').collect();
    if hostname.ends_with(&format!(".{primary}")) && labels.len() >= 3 {
        let first = labels[0];
        if first.is_empty() || first == marketing_alias {
            return TenantResolution::primary();
        }
        return TenantResolution::tenant(first);
    }

    TenantResolution::primary()
}

/// `ktg.localhost` / `ktg.127.0.0.1` → `ktg`. Bare loopback hosts have no tenant.
fn loopback_tenant(hostname: &str) -> Option<&str> {
    let is_subdomain = LOOPBACK_MARKERS
        .iter()
        .any(|m| hostname.ends_with(&format!(".{m}")));
    if !is_subdomain {
        return None;
    }
    hostname.split('.').next().filter(|label| !label.is_empty())
}

/// Drop a trailing `:port`. IPv6 literals are left alone.
pub fn strip_port(host: &str) -> &str {
    if host.starts_with('[') {
        return host;
    }
    match host.rsplit_once(':') {
        Some((name, port)) if port.chars().all(|c| c.is_ascii_digit()) => name,
        _ => host,
    }
}

/// The `:port` suffix of `host`, including the colon, or `""`.
pub fn port_suffix(host: &str) -> &str {
    let name = strip_port(host);
    &host[name.len()..]
}
