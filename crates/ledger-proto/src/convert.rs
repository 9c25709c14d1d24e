use std::time::Duration;

use ledger_types::{
    AccountAlias, AccountId, ContractId, EvmAddress, FileId, Key, PublicKey, ScheduleId,
    Timestamp, TokenId, TopicId, TransactionId, ValidationError,
};

use crate::v1;

impl From<Timestamp> for v1::Timestamp {
    fn from(value: Timestamp) -> Self {
        Self {
            seconds: value.seconds,
            nanos: value.nanos as i32,
        }
    }
}

impl From<v1::Timestamp> for Timestamp {
    fn from(value: v1::Timestamp) -> Self {
        Self::new(value.seconds, value.nanos.max(0) as u32)
    }
}

impl From<Duration> for v1::Duration {
    fn from(value: Duration) -> Self {
        Self {
            seconds: value.as_secs() as i64,
        }
    }
}

impl From<v1::Duration> for Duration {
    fn from(value: v1::Duration) -> Self {
        Duration::from_secs(value.seconds.max(0) as u64)
    }
}

impl From<AccountId> for v1::AccountId {
    fn from(value: AccountId) -> Self {
        let account = match value.alias {
            None => v1::account_id::Account::AccountNum(value.num as i64),
            Some(AccountAlias::Key(key)) => v1::account_id::Account::Alias(key.as_bytes().to_vec()),
            Some(AccountAlias::Evm(address)) => {
                v1::account_id::Account::EvmAddress(address.as_bytes().to_vec())
            }
        };
        Self {
            shard_num: value.shard as i64,
            realm_num: value.realm as i64,
            account: Some(account),
        }
    }
}

impl TryFrom<v1::AccountId> for AccountId {
    type Error = ValidationError;

    fn try_from(value: v1::AccountId) -> Result<Self, Self::Error> {
        let shard = value.shard_num as u64;
        let realm = value.realm_num as u64;
        match value.account {
            Some(v1::account_id::Account::AccountNum(num)) => {
                Ok(Self::new(shard, realm, num as u64))
            }
            Some(v1::account_id::Account::Alias(bytes)) => {
                let key = PublicKey::from_bytes(&bytes)
                    .map_err(|_| ValidationError::InvalidField("account_id.alias"))?;
                Ok(Self::from_alias(shard, realm, AccountAlias::Key(key)))
            }
            Some(v1::account_id::Account::EvmAddress(bytes)) => Ok(Self::from_alias(
                shard,
                realm,
                AccountAlias::Evm(EvmAddress::from_slice(&bytes)?),
            )),
            None => Err(ValidationError::MissingField("account_id.account")),
        }
    }
}

macro_rules! impl_entity_conversions {
    ($($name:ident),+) => {
        $(
            impl From<$name> for v1::EntityId {
                fn from(value: $name) -> Self {
                    Self {
                        shard_num: value.shard as i64,
                        realm_num: value.realm as i64,
                        num: value.num as i64,
                    }
                }
            }

            impl From<v1::EntityId> for $name {
                fn from(value: v1::EntityId) -> Self {
                    Self::new(
                        value.shard_num as u64,
                        value.realm_num as u64,
                        value.num as u64,
                    )
                }
            }
        )+
    };
}

impl_entity_conversions!(TopicId, FileId, TokenId, ContractId, ScheduleId);

impl From<TransactionId> for v1::TransactionId {
    fn from(value: TransactionId) -> Self {
        Self {
            transaction_valid_start: Some(value.valid_start.into()),
            account_id: Some(value.account_id.into()),
            scheduled: value.scheduled,
            nonce: value.nonce.unwrap_or_default(),
        }
    }
}

impl TryFrom<v1::TransactionId> for TransactionId {
    type Error = ValidationError;

    fn try_from(value: v1::TransactionId) -> Result<Self, Self::Error> {
        let account_id = value
            .account_id
            .ok_or(ValidationError::MissingField("transaction_id.account_id"))?
            .try_into()?;
        let valid_start = value
            .transaction_valid_start
            .ok_or(ValidationError::MissingField(
                "transaction_id.transaction_valid_start",
            ))?
            .into();
        Ok(Self {
            account_id,
            valid_start,
            scheduled: value.scheduled,
            nonce: (value.nonce != 0).then_some(value.nonce),
        })
    }
}

impl From<PublicKey> for v1::Key {
    fn from(value: PublicKey) -> Self {
        let key = match value {
            PublicKey::Ed25519(bytes) => v1::key::Key::Ed25519(bytes.to_vec()),
            PublicKey::EcdsaSecp256k1(bytes) => v1::key::Key::EcdsaSecp256k1(bytes.to_vec()),
        };
        Self { key: Some(key) }
    }
}

impl From<&Key> for v1::Key {
    fn from(value: &Key) -> Self {
        match value {
            Key::Single(key) => (*key).into(),
            Key::KeyList { keys, threshold } => {
                let list = v1::KeyList {
                    keys: keys.iter().map(Into::into).collect(),
                };
                let key = match threshold {
                    Some(threshold) => v1::key::Key::ThresholdKey(v1::ThresholdKey {
                        threshold: *threshold,
                        keys: Some(list),
                    }),
                    None => v1::key::Key::KeyList(list),
                };
                Self { key: Some(key) }
            }
        }
    }
}

impl TryFrom<v1::Key> for Key {
    type Error = ValidationError;

    fn try_from(value: v1::Key) -> Result<Self, Self::Error> {
        let invalid = |_| ValidationError::InvalidField("key");
        match value.key.ok_or(ValidationError::MissingField("key"))? {
            v1::key::Key::Ed25519(bytes) => {
                Ok(Key::Single(PublicKey::from_ed25519(&bytes).map_err(invalid)?))
            }
            v1::key::Key::EcdsaSecp256k1(bytes) => {
                Ok(Key::Single(PublicKey::from_ecdsa(&bytes).map_err(invalid)?))
            }
            v1::key::Key::KeyList(list) => Ok(Key::list(decode_key_list(list)?)),
            v1::key::Key::ThresholdKey(threshold) => Ok(Key::threshold(
                threshold.threshold,
                decode_key_list(threshold.keys.unwrap_or_default())?,
            )),
        }
    }
}

fn decode_key_list(list: v1::KeyList) -> Result<Vec<Key>, ValidationError> {
    list.keys.into_iter().map(Key::try_from).collect()
}

pub fn signature_pair(public_key: &PublicKey, signature: &[u8]) -> v1::SignaturePair {
    let signature = match public_key {
        PublicKey::Ed25519(_) => v1::signature_pair::Signature::Ed25519(signature.to_vec()),
        PublicKey::EcdsaSecp256k1(_) => {
            v1::signature_pair::Signature::EcdsaSecp256k1(signature.to_vec())
        }
    };
    v1::SignaturePair {
        pub_key_prefix: public_key.as_bytes().to_vec(),
        signature: Some(signature),
    }
}

pub fn decode_signature_pair(
    pair: &v1::SignaturePair,
) -> Result<(PublicKey, Vec<u8>), ValidationError> {
    let invalid = |_| ValidationError::InvalidField("sig_pair.pub_key_prefix");
    match &pair.signature {
        Some(v1::signature_pair::Signature::Ed25519(signature)) => Ok((
            PublicKey::from_ed25519(&pair.pub_key_prefix).map_err(invalid)?,
            signature.clone(),
        )),
        Some(v1::signature_pair::Signature::EcdsaSecp256k1(signature)) => Ok((
            PublicKey::from_ecdsa(&pair.pub_key_prefix).map_err(invalid)?,
            signature.clone(),
        )),
        None => Err(ValidationError::MissingField("sig_pair.signature")),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn threshold_key_survives_conversion() {
        let key = Key::threshold(
            1,
            vec![
                Key::Single(PublicKey::Ed25519([1; 32])),
                Key::list(vec![Key::Single(PublicKey::Ed25519([2; 32]))]),
            ],
        );
        let proto: v1::Key = (&key).into();
        assert_eq!(Key::try_from(proto).expect("decode key"), key);
    }

    #[test]
    fn alias_account_ids_convert() {
        let id = AccountId::from_alias(0, 0, AccountAlias::Evm(EvmAddress::new([9; 20])));
        let proto: v1::AccountId = id.into();
        assert_eq!(AccountId::try_from(proto).expect("decode account"), id);
    }

    #[test]
    fn transaction_id_requires_payer() {
        let proto = v1::TransactionId {
            transaction_valid_start: Some(v1::Timestamp {
                seconds: 1,
                nanos: 0,
            }),
            account_id: None,
            scheduled: false,
            nonce: 0,
        };
        let err = TransactionId::try_from(proto).expect_err("missing payer");
        assert_eq!(
            err,
            ValidationError::MissingField("transaction_id.account_id")
        );
    }
}
