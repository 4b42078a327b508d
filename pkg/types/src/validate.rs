use anyhow::{Result, bail};
use std::net::IpAddr;

use crate::endpointslice::AddressType;

/// Validate a `generate_name` prefix such as `my-service-`.
/// Trailing hyphens are allowed since the store appends a random suffix;
/// the remainder must be a DNS subdomain (`[a-z0-9.-]`, max 253 chars,
/// alphanumeric at both ends).
pub fn validate_generate_name_prefix(prefix: &str) -> Result<()> {
    let trimmed = prefix.trim_end_matches('-');
    if trimmed.is_empty() {
        bail!("prefix '{}' must contain at least one alphanumeric character", prefix);
    }
    if trimmed.len() > 253 {
        bail!("prefix '{}' exceeds 253 characters (got {})", prefix, trimmed.len());
    }
    let alnum = |c: char| c.is_ascii_lowercase() || c.is_ascii_digit();
    if !trimmed.starts_with(alnum) || !trimmed.ends_with(alnum) {
        bail!("prefix '{}' must start and end with an alphanumeric character", prefix);
    }
    if !trimmed.chars().all(|c| alnum(c) || c == '-' || c == '.') {
        bail!(
            "prefix '{}' must contain only lowercase letters, digits, '-' and '.'",
            prefix
        );
    }
    Ok(())
}

/// Parse an endpoint address, rejecting anything that is not a literal IP.
pub fn validate_ip(ip: &str) -> Result<IpAddr> {
    match ip.parse::<IpAddr>() {
        Ok(addr) => Ok(addr),
        Err(_) => bail!("'{}' is not a valid IP address", ip),
    }
}

/// Address family of `ip`, or `None` if it is not a valid IP.
pub fn address_type(ip: &str) -> Option<AddressType> {
    match validate_ip(ip).ok()? {
        IpAddr::V4(_) => Some(AddressType::IPv4),
        IpAddr::V6(_) => Some(AddressType::IPv6),
    }
}
