use std::{fmt::Display, str::FromStr};

use secrecy::{ExposeSecret, Secret};

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum AddressError {
    #[error("address {0:?} is not of the form host:port")]
    MissingPort(String),

    #[error("address {0:?} has an empty host")]
    EmptyHost(String),

    #[error("address {address:?} has an invalid port {port:?}")]
    InvalidPort { address: String, port: String },
}

/// A `host:port` server address.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Address {
    host: String,
    port: u16,
}

impl Address {
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
        }
    }

    pub fn host(&self) -> &str {
        &self.host
    }

    pub fn port(&self) -> u16 {
        self.port
    }
}

impl FromStr for Address {
    type Err = AddressError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (host, port) = s
            .rsplit_once(':')
            .ok_or_else(|| AddressError::MissingPort(s.to_string()))?;
        let host = host.trim_start_matches('[').trim_end_matches(']');
        if host.is_empty() {
            return Err(AddressError::EmptyHost(s.to_string()));
        }
        let port = port
            .parse::<u16>()
            .ok()
            .filter(|p| *p != 0)
            .ok_or_else(|| AddressError::InvalidPort {
                address: s.to_string(),
                port: port.to_string(),
            })?;
        Ok(Self::new(host, port))
    }
}

impl Display for Address {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.host.contains(':') {
            write!(f, "[{}]:{}", self.host, self.port)
        } else {
            write!(f, "{}:{}", self.host, self.port)
        }
    }
}

/// The user a connection logs in as.
#[derive(Debug, Clone)]
pub struct Credentials {
    user_id: String,
    password: Secret<String>,
}

impl Credentials {
    pub fn new(user_id: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            user_id: user_id.into(),
            password: Secret::new(password.into()),
        }
    }

    pub fn user_id(&self) -> &str {
        &self.user_id
    }

    pub fn password(&self) -> &Secret<String> {
        &self.password
    }

    /// Whether `user_id` and `password` match these credentials.
    pub fn matches(&self, user_id: &str, password: &str) -> bool {
        self.user_id == user_id && self.password.expose_secret() == password
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_address() {
        let addr: Address = "localhost:8848".parse().unwrap();
        assert_eq!(addr, Address::new("localhost", 8848));
        assert_eq!(addr.to_string(), "localhost:8848");

        let v6: Address = "[::1]:8900".parse().unwrap();
        assert_eq!(v6.host(), "::1");
        assert_eq!(v6.to_string(), "[::1]:8900");
    }

    #[test]
    fn reject_malformed_addresses() {
        assert!(matches!(
            "localhost".parse::<Address>(),
            Err(AddressError::MissingPort(_))
        ));
        assert!(matches!(
            ":-4".parse::<Address>(),
            Err(AddressError::EmptyHost(_))
        ));
        assert!(matches!(
            "localhost:-4".parse::<Address>(),
            Err(AddressError::InvalidPort { port, .. }) if port == "-4"
        ));
        assert!(matches!(
            "localhost:0".parse::<Address>(),
            Err(AddressError::InvalidPort { .. })
        ));
    }

    #[test]
    fn password_is_redacted() {
        let credentials = Credentials::new("admin", "123456");
        assert!(!format!("{credentials:?}").contains("123456"));
        assert!(credentials.matches("admin", "123456"));
        assert!(!credentials.matches("admin", "654321"));
    }
}
