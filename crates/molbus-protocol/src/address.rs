use std::fmt;

use crate::error::AddressError;

/// A parsed `inet:<host>[:<port>[:<interface>]]` address string (§6).
///
/// Any component may be empty (`inet::9001:` is valid and means "any host,
/// port 9001, default interface").
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Address {
    pub host: String,
    pub port: Option<u16>,
    pub interface: Option<String>,
}

const PREFIX: &str = "inet:";

impl Address {
    pub fn parse(s: &str) -> Result<Self, AddressError> {
        if !s.starts_with(PREFIX) {
            return Err(AddressError {
                position: 0,
                reason: "address must start with \"inet:\"",
            });
        }
        let rest = &s[PREFIX.len()..];
        let mut parts = rest.splitn(3, ':');
        let host = parts.next().unwrap_or("").to_owned();
        let port = match parts.next() {
            None | Some("") => None,
            Some(p) => Some(p.parse::<u16>().map_err(|_| AddressError {
                position: PREFIX.len() + host.len() + 1,
                reason: "port must be a valid u16",
            })?),
        };
        let interface = match parts.next() {
            None | Some("") => None,
            Some(i) => Some(i.to_owned()),
        };
        Ok(Self { host, port, interface })
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "inet:{}", self.host)?;
        if let Some(port) = self.port {
            write!(f, ":{port}")?;
            if let Some(iface) = &self.interface {
                write!(f, ":{iface}")?;
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_full_address() {
        let addr = Address::parse("inet:239.1.1.1:9001:eth0").unwrap();
        assert_eq!(addr.host, "239.1.1.1");
        assert_eq!(addr.port, Some(9001));
        assert_eq!(addr.interface.as_deref(), Some("eth0"));
        assert_eq!(addr.to_string(), "inet:239.1.1.1:9001:eth0");
    }

    #[test]
    fn empty_components_are_allowed() {
        let addr = Address::parse("inet::9001:").unwrap();
        assert_eq!(addr.host, "");
        assert_eq!(addr.port, Some(9001));
        assert_eq!(addr.interface, None);
    }

    #[test]
    fn host_only() {
        let addr = Address::parse("inet:localhost").unwrap();
        assert_eq!(addr.host, "localhost");
        assert_eq!(addr.port, None);
        assert_eq!(addr.to_string(), "inet:localhost");
    }

    #[test]
    fn missing_prefix_reports_position_zero() {
        let err = Address::parse("239.1.1.1:9001").unwrap_err();
        assert_eq!(err.position, 0);
    }

    #[test]
    fn bad_port_reports_byte_position() {
        let err = Address::parse("inet:host:notaport").unwrap_err();
        assert_eq!(err.position, PREFIX.len() + "host".len() + 1);
    }
}
