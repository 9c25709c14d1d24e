//! Entity identifiers: `shard.realm.num` triples, account aliases and fixed-size hashes.

use std::{fmt, str::FromStr};

use serde::{de, Deserialize, Deserializer, Serialize, Serializer};

use crate::{error::ValidationError, key::PublicKey};

macro_rules! impl_fixed_bytes_id {
    ($name:ident, $len:expr) => {
        #[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
        pub struct $name([u8; $len]);

        impl $name {
            pub const LEN: usize = $len;

            pub const fn new(bytes: [u8; $len]) -> Self {
                Self(bytes)
            }

            pub fn from_slice(bytes: &[u8]) -> Result<Self, ValidationError> {
                if bytes.len() != Self::LEN {
                    return Err(ValidationError::InvalidLength {
                        kind: stringify!($name),
                        expected: Self::LEN,
                        actual: bytes.len(),
                    });
                }
                let mut out = [0u8; Self::LEN];
                out.copy_from_slice(bytes);
                Ok(Self(out))
            }

            pub fn from_hex(input: &str) -> Result<Self, ValidationError> {
                let raw = input.strip_prefix("0x").unwrap_or(input);
                let bytes =
                    hex::decode(raw).map_err(|err| ValidationError::InvalidHex(err.to_string()))?;
                Self::from_slice(&bytes)
            }

            pub const fn as_bytes(&self) -> &[u8; $len] {
                &self.0
            }

            pub fn to_hex(&self) -> String {
                hex::encode(self.0)
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.to_hex())
            }
        }

        impl fmt::Debug for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}({})", stringify!($name), self)
            }
        }

        impl AsRef<[u8]> for $name {
            fn as_ref(&self) -> &[u8] {
                &self.0
            }
        }

        impl From<[u8; $len]> for $name {
            fn from(value: [u8; $len]) -> Self {
                Self::new(value)
            }
        }

        impl TryFrom<&[u8]> for $name {
            type Error = ValidationError;

            fn try_from(value: &[u8]) -> Result<Self, Self::Error> {
                Self::from_slice(value)
            }
        }

        impl_string_serde!($name);
    };
}

/// Serializes a type through its `Display` / `FromStr` pair.
macro_rules! impl_string_serde {
    ($name:ident) => {
        impl Serialize for $name {
            fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
                serializer.collect_str(self)
            }
        }

        impl<'de> Deserialize<'de> for $name {
            fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
                let raw = String::deserialize(deserializer)?;
                raw.parse().map_err(de::Error::custom)
            }
        }
    };
}

impl_fixed_bytes_id!(EvmAddress, 20);
impl_fixed_bytes_id!(TransactionHash, 48);

impl FromStr for EvmAddress {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::from_hex(s)
    }
}

impl FromStr for TransactionHash {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::from_hex(s)
    }
}

/// Splits `shard.realm.rest`, dropping a trailing `-checksum` suffix.
fn split_entity<'a>(
    kind: &'static str,
    input: &'a str,
) -> Result<(u64, u64, &'a str), ValidationError> {
    let parse_err = || ValidationError::Parse {
        kind,
        input: input.to_string(),
    };
    let without_checksum = match input.split_once('-') {
        Some((head, checksum))
            if checksum.len() == 5 && checksum.chars().all(|c| c.is_ascii_lowercase()) =>
        {
            head
        }
        Some(_) => return Err(parse_err()),
        None => input,
    };
    let mut parts = without_checksum.splitn(3, '.');
    let (Some(shard), Some(realm), Some(rest)) = (parts.next(), parts.next(), parts.next()) else {
        return Err(parse_err());
    };
    let shard = shard.parse().map_err(|_| parse_err())?;
    let realm = realm.parse().map_err(|_| parse_err())?;
    Ok((shard, realm, rest))
}

macro_rules! impl_entity_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
        pub struct $name {
            pub shard: u64,
            pub realm: u64,
            pub num: u64,
        }

        impl $name {
            pub const fn new(shard: u64, realm: u64, num: u64) -> Self {
                Self { shard, realm, num }
            }

            pub const fn from_num(num: u64) -> Self {
                Self::new(0, 0, num)
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}.{}.{}", self.shard, self.realm, self.num)
            }
        }

        impl fmt::Debug for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}({})", stringify!($name), self)
            }
        }

        impl FromStr for $name {
            type Err = ValidationError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                let (shard, realm, num) = split_entity(stringify!($name), s)?;
                let num = num.parse().map_err(|_| ValidationError::Parse {
                    kind: stringify!($name),
                    input: s.to_string(),
                })?;
                Ok(Self::new(shard, realm, num))
            }
        }

        impl_string_serde!($name);
    };
}

impl_entity_id!(
    /// Consensus topic identifier.
    TopicId
);
impl_entity_id!(
    /// File service identifier.
    FileId
);
impl_entity_id!(TokenId);
impl_entity_id!(ContractId);
impl_entity_id!(ScheduleId);

/// Alternative forms an account may be addressed by instead of its number.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Debug)]
pub enum AccountAlias {
    Key(PublicKey),
    Evm(EvmAddress),
}

/// Account identifier. When `alias` is set the number is not meaningful and is kept at zero.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct AccountId {
    pub shard: u64,
    pub realm: u64,
    pub num: u64,
    pub alias: Option<AccountAlias>,
}

impl AccountId {
    pub const fn new(shard: u64, realm: u64, num: u64) -> Self {
        Self {
            shard,
            realm,
            num,
            alias: None,
        }
    }

    pub const fn from_num(num: u64) -> Self {
        Self::new(0, 0, num)
    }

    pub const fn from_alias(shard: u64, realm: u64, alias: AccountAlias) -> Self {
        Self {
            shard,
            realm,
            num: 0,
            alias: Some(alias),
        }
    }

    pub fn evm_address(&self) -> Option<EvmAddress> {
        match self.alias {
            Some(AccountAlias::Evm(address)) => Some(address),
            _ => None,
        }
    }
}

impl fmt::Display for AccountId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.alias {
            None => write!(f, "{}.{}.{}", self.shard, self.realm, self.num),
            Some(AccountAlias::Key(key)) => write!(f, "{}.{}.{}", self.shard, self.realm, key),
            Some(AccountAlias::Evm(address)) => {
                write!(f, "{}.{}.{}", self.shard, self.realm, address)
            }
        }
    }
}

impl fmt::Debug for AccountId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "AccountId({self})")
    }
}

impl FromStr for AccountId {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (shard, realm, rest) = split_entity("AccountId", s)?;
        if let Ok(num) = rest.parse::<u64>() {
            return Ok(Self::new(shard, realm, num));
        }
        let alias = match rest.len() {
            40 => AccountAlias::Evm(EvmAddress::from_hex(rest)?),
            _ => AccountAlias::Key(rest.parse()?),
        };
        Ok(Self::from_alias(shard, realm, alias))
    }
}

impl_string_serde!(AccountId);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn checksum_suffix_does_not_affect_equality() {
        let plain: AccountId = "0.0.123".parse().expect("plain id");
        let checked: AccountId = "0.0.123-vfmkw".parse().expect("checksummed id");
        assert_eq!(plain, checked);
        assert_eq!(checked.to_string(), "0.0.123");
    }

    #[test]
    fn parses_evm_alias() {
        let id: AccountId = "0.0.302a300506032b6570032100114e6abc371b82da"
            .parse()
            .expect("evm alias");
        assert!(id.evm_address().is_some());
        assert_eq!(id.num, 0);
    }

    #[test]
    fn rejects_malformed_entity() {
        assert!("0.0".parse::<TopicId>().is_err());
        assert!("0.0.x".parse::<FileId>().is_err());
        assert!("0.0.5-ABCDE".parse::<TokenId>().is_err());
    }

    #[test]
    fn entity_ids_serialize_as_strings() {
        let topic = TopicId::new(0, 0, 1001);
        let json = serde_json::to_string(&topic).expect("serialize");
        assert_eq!(json, "\"0.0.1001\"");
        let back: TopicId = serde_json::from_str(&json).expect("deserialize");
        assert_eq!(back, topic);
    }
}
