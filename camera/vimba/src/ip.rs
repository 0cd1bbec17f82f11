//! Conversion between dotted IPv4 text and the host-order integers GigE
//! features such as `GevCurrentIPAddress` use.

use std::net::Ipv4Addr;

use crate::{Error, Result};

/// Parse `addr` and return it as an integer in host byte order.
///
/// `"192.168.0.1"` gives `0xC0A8_0001` on every platform.
pub fn ip_address_to_host_u32(addr: &str) -> Result<u32> {
    let parsed: Ipv4Addr = addr.trim().parse().map_err(|source| Error::InvalidIpAddress {
        addr: addr.to_string(),
        source,
    })?;
    Ok(u32::from(parsed))
}

pub fn host_u32_to_ip_address(value: u32) -> Ipv4Addr {
    Ipv4Addr::from(value)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_to_host_order() {
        assert_eq!(ip_address_to_host_u32("192.168.0.1").unwrap(), 0xC0A8_0001);
        assert_eq!(ip_address_to_host_u32(" 10.0.0.254 ").unwrap(), 0x0A00_00FE);
        assert_eq!(
            host_u32_to_ip_address(0xC0A8_0001),
            Ipv4Addr::new(192, 168, 0, 1)
        );
    }

    #[test]
    fn rejects_bad_text() {
        for bad in ["", "192.168.0", "256.1.1.1", "camera-1", "::1"] {
            match ip_address_to_host_u32(bad) {
                Err(Error::InvalidIpAddress { addr, .. }) => assert_eq!(addr, bad),
                other => panic!("expected InvalidIpAddress for {bad:?}, got {other:?}"),
            }
        }
    }
}
