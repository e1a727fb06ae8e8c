use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use super::Aid;
use crate::error::ActorError;

/// A `host:port` pair naming a remote process.
#[derive(Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "EndpointRepr", into = "EndpointRepr")]
pub struct Endpoint {
    host: Arc<str>,
    port: u16,
}

#[derive(Serialize, Deserialize)]
struct EndpointRepr {
    host: String,
    port: u32,
}

impl Endpoint {
    pub fn new(host: impl AsRef<str>, port: u16) -> Result<Self, ActorError> {
        let host = host.as_ref().trim();
        if host.is_empty() {
            return Err(ActorError::InvalidAddress(format!("{host}:{port}")));
        }
        if port == 0 {
            return Err(ActorError::PortOutOfRange(port.to_string()));
        }
        Ok(Self {
            host: Arc::from(host),
            port,
        })
    }

    pub fn host(&self) -> &str {
        &self.host
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    fn checked_port(text: &str) -> Result<u16, ActorError> {
        let port: u64 = text
            .trim()
            .parse()
            .map_err(|_| ActorError::InvalidAddress(format!("port '{text}' is not numeric")))?;
        match u16::try_from(port) {
            Ok(port) if port > 0 => Ok(port),
            _ => Err(ActorError::PortOutOfRange(text.to_string())),
        }
    }
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.host, self.port)
    }
}

impl fmt::Debug for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Endpoint({self})")
    }
}

impl FromStr for Endpoint {
    type Err = ActorError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (host, port) = s
            .trim()
            .rsplit_once(':')
            .ok_or_else(|| ActorError::InvalidAddress(s.to_string()))?;
        let port = Self::checked_port(port)?;
        Self::new(host, port)
    }
}

impl TryFrom<EndpointRepr> for Endpoint {
    type Error = ActorError;

    fn try_from(repr: EndpointRepr) -> Result<Self, Self::Error> {
        let port = Self::checked_port(&repr.port.to_string())?;
        Self::new(repr.host, port)
    }
}

impl From<Endpoint> for EndpointRepr {
    fn from(endpoint: Endpoint) -> Self {
        EndpointRepr {
            host: endpoint.host.to_string(),
            port: u32::from(endpoint.port),
        }
    }
}

/// Identifies a mailbox living in another process.
#[derive(Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RemoteAddress {
    endpoint: Endpoint,
    actor: Aid,
}

impl RemoteAddress {
    pub fn new(endpoint: Endpoint, actor: Aid) -> Self {
        Self { endpoint, actor }
    }

    pub fn endpoint(&self) -> &Endpoint {
        &self.endpoint
    }

    pub fn actor(&self) -> &Aid {
        &self.actor
    }
}

impl fmt::Display for RemoteAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.endpoint, self.actor)
    }
}

impl fmt::Debug for RemoteAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "RemoteAddress({self})")
    }
}

impl FromStr for RemoteAddress {
    /// `host:port/system/actor`
    type Err = ActorError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (endpoint, actor) = s
            .trim()
            .split_once('/')
            .ok_or_else(|| ActorError::InvalidAddress(s.to_string()))?;
        Ok(Self::new(endpoint.parse()?, actor.parse()?))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_endpoint_parse() {
        let ep: Endpoint = "127.0.0.1:17777".parse().unwrap();
        assert_eq!(ep.host(), "127.0.0.1");
        assert_eq!(ep.port(), 17777);
        assert_eq!(ep.to_string(), "127.0.0.1:17777");
    }

    #[test]
    fn test_endpoint_port_range() {
        assert!(matches!(
            "host:0".parse::<Endpoint>(),
            Err(ActorError::PortOutOfRange(_))
        ));
        assert!(matches!(
            "host:65536".parse::<Endpoint>(),
            Err(ActorError::PortOutOfRange(_))
        ));
        assert!(matches!(
            "host:http".parse::<Endpoint>(),
            Err(ActorError::InvalidAddress(_))
        ));
        assert!("host:65535".parse::<Endpoint>().is_ok());
        assert!(matches!(Endpoint::new("", 80), Err(ActorError::InvalidAddress(_))));
    }

    #[test]
    fn test_endpoint_deserialize_validates() {
        let err = serde_json::from_str::<Endpoint>(r#"{"host":"h","port":70000}"#);
        assert!(err.is_err());
        let ok: Endpoint = serde_json::from_str(r#"{"host":"h","port":7000}"#).unwrap();
        assert_eq!(ok.port(), 7000);
    }

    #[test]
    fn test_remote_address_parse() {
        let addr: RemoteAddress = "10.0.0.1:9000/billing/ledger".parse().unwrap();
        assert_eq!(addr.endpoint().port(), 9000);
        assert_eq!(addr.actor(), &Aid::new("billing", "ledger"));
        assert_eq!(addr.to_string(), "10.0.0.1:9000/billing/ledger");
        assert!("10.0.0.1:9000".parse::<RemoteAddress>().is_err());
        assert!("10.0.0.1:9000/billing".parse::<RemoteAddress>().is_err());
    }
}
