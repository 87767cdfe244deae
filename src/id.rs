use std::convert::TryInto;
use std::fmt;
use std::net::SocketAddr;
use std::str::FromStr;

use base58check::{FromBase58Check, ToBase58Check};
use blake2::digest::{Update, VariableOutput};
use blake2::Blake2bVar;

/// Identity of a remote endpoint, unique per live connection.
#[derive(Hash, Eq, PartialEq, Ord, PartialOrd, Copy, Clone, Serialize, Deserialize, Default)]
pub struct Id(pub [u8; 32]);

impl std::fmt::Debug for Id {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self.0.to_base58check(0))
    }
}

impl std::fmt::Display for Id {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self.0.to_base58check(0))
    }
}

impl FromStr for Id {
    type Err = crate::Error;

    /// Converts a base58check encoded string to bytes of an Id
    fn from_str(id_str: &str) -> Result<Self, crate::Error> {
        let (vsn, bytes) =
            id_str.from_base58check().map_err(|_| crate::Error::TryFromStringError)?;
        if vsn != 0 {
            return Err(crate::Error::TryFromStringError);
        }
        let bytes: [u8; 32] =
            bytes.as_slice().try_into().map_err(|_| crate::Error::TryFromStringError)?;
        Ok(Id(bytes))
    }
}

impl Id {
    /// By default a new id is created by hashing an input byte slice
    pub fn new(bytes: &[u8]) -> Id {
        Id(hash(bytes))
    }

    /// Converts a `SocketAddr` into an *untrusted* identity.
    pub fn from_ip(ip: &SocketAddr) -> Id {
        Id::new(format!("{:?}", ip).as_bytes())
    }

    pub fn zero() -> Id {
        Id([0u8; 32])
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }
}

/// Parse a peer description from the format `IP` or `ID@IP` to its ID and address.
pub fn parse_peer(s: &str) -> crate::Result<(Id, SocketAddr)> {
    let parts: Vec<&str> = s.split('@').collect();
    match parts.as_slice() {
        [ip] => {
            let ip: SocketAddr = ip.parse().map_err(|_| crate::Error::PeerParseError)?;
            Ok((Id::from_ip(&ip), ip))
        }
        [id, ip] => {
            let id: Id = id.parse().map_err(|_| crate::Error::PeerParseError)?;
            let ip: SocketAddr = ip.parse().map_err(|_| crate::Error::PeerParseError)?;
            Ok((id, ip))
        }
        _ => Err(crate::Error::PeerParseError),
    }
}

fn hash(input: &[u8]) -> [u8; 32] {
    // 32 is a valid blake2b output size, neither call can fail
    let mut hasher = Blake2bVar::new(32).unwrap();
    hasher.update(input);
    let mut buf = [0u8; 32];
    hasher.finalize_variable(&mut buf).unwrap();
    buf
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_id_from_ip_is_stable() {
        let ip: SocketAddr = "127.0.0.1:1234".parse().unwrap();
        assert_eq!(Id::from_ip(&ip), Id::from_ip(&ip));
        let other: SocketAddr = "127.0.0.1:1235".parse().unwrap();
        assert_ne!(Id::from_ip(&ip), Id::from_ip(&other));
    }

    #[test]
    fn test_display_parses_back() {
        let id = Id::new(b"peer");
        let s = format!("{}", id);
        assert_eq!(s.parse::<Id>().unwrap(), id);
    }

    #[test]
    fn test_parse_peer() {
        let (id, ip) = parse_peer("127.0.0.1:7500").unwrap();
        assert_eq!(ip, "127.0.0.1:7500".parse().unwrap());
        assert_eq!(id, Id::from_ip(&ip));

        let expected = Id::new(b"remote");
        let (id, _) = parse_peer(&format!("{}@127.0.0.1:7500", expected)).unwrap();
        assert_eq!(id, expected);

        assert!(matches!(parse_peer("not-an-ip"), Err(crate::Error::PeerParseError)));
        assert!(matches!(parse_peer("a@b@c"), Err(crate::Error::PeerParseError)));
    }
}
