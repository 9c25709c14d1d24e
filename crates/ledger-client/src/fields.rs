//! Kind-specific request fields, kept as a name -> value table.

use std::time::Duration;

use ledger_proto::v1::{self, field_value::Value};
use ledger_types::{
    AccountId, ContractId, FileId, Hbar, Key, ScheduleId, TokenId, TopicId, TransactionId,
    ValidationError,
};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FieldValue {
    Uint(u64),
    Int(i64),
    Bytes(Vec<u8>),
    Text(String),
    Flag(bool),
    Account(AccountId),
    /// Any shard.realm.num entity other than an account.
    Entity { shard: u64, realm: u64, num: u64 },
    Key(Key),
    Transfers(Vec<(AccountId, Hbar)>),
    TransactionId(TransactionId),
    Duration(Duration),
}

macro_rules! entity_field {
    ($($name:ident),+) => {
        $(
            impl From<$name> for FieldValue {
                fn from(id: $name) -> Self {
                    Self::Entity {
                        shard: id.shard,
                        realm: id.realm,
                        num: id.num,
                    }
                }
            }
        )+
    };
}

entity_field!(TopicId, FileId, TokenId, ContractId, ScheduleId);

impl From<AccountId> for FieldValue {
    fn from(id: AccountId) -> Self {
        Self::Account(id)
    }
}

impl From<Key> for FieldValue {
    fn from(key: Key) -> Self {
        Self::Key(key)
    }
}

impl From<TransactionId> for FieldValue {
    fn from(id: TransactionId) -> Self {
        Self::TransactionId(id)
    }
}

impl From<Hbar> for FieldValue {
    fn from(amount: Hbar) -> Self {
        Self::Int(amount.to_tinybars())
    }
}

impl From<bool> for FieldValue {
    fn from(flag: bool) -> Self {
        Self::Flag(flag)
    }
}

impl From<&str> for FieldValue {
    fn from(text: &str) -> Self {
        Self::Text(text.to_string())
    }
}

impl From<FieldValue> for v1::FieldValue {
    fn from(value: FieldValue) -> Self {
        let value = match value {
            FieldValue::Uint(v) => Value::Uint(v),
            FieldValue::Int(v) => Value::Int(v),
            FieldValue::Bytes(v) => Value::Bytes(v),
            FieldValue::Text(v) => Value::Text(v),
            FieldValue::Flag(v) => Value::Flag(v),
            FieldValue::Account(id) => Value::Account(id.into()),
            FieldValue::Entity { shard, realm, num } => Value::Entity(v1::EntityId {
                shard_num: shard as i64,
                realm_num: realm as i64,
                num: num as i64,
            }),
            FieldValue::Key(key) => Value::Key((&key).into()),
            FieldValue::Transfers(transfers) => Value::Transfers(v1::TransferList {
                account_amounts: transfers
                    .into_iter()
                    .map(|(account, amount)| v1::AccountAmount {
                        account_id: Some(account.into()),
                        amount: amount.to_tinybars(),
                    })
                    .collect(),
            }),
            FieldValue::TransactionId(id) => Value::TransactionId(id.into()),
            FieldValue::Duration(duration) => Value::Duration(duration.into()),
        };
        Self { value: Some(value) }
    }
}

impl TryFrom<v1::FieldValue> for FieldValue {
    type Error = ValidationError;

    fn try_from(value: v1::FieldValue) -> Result<Self, Self::Error> {
        Ok(match value.value.ok_or(ValidationError::MissingField("field.value"))? {
            Value::Uint(v) => Self::Uint(v),
            Value::Int(v) => Self::Int(v),
            Value::Bytes(v) => Self::Bytes(v),
            Value::Text(v) => Self::Text(v),
            Value::Flag(v) => Self::Flag(v),
            Value::Account(id) => Self::Account(id.try_into()?),
            Value::Entity(id) => Self::Entity {
                shard: id.shard_num as u64,
                realm: id.realm_num as u64,
                num: id.num as u64,
            },
            Value::Key(key) => Self::Key(key.try_into()?),
            Value::Transfers(list) => Self::Transfers(
                list.account_amounts
                    .into_iter()
                    .map(|amount| {
                        let account: AccountId = amount
                            .account_id
                            .ok_or(ValidationError::MissingField("account_amount.account_id"))?
                            .try_into()?;
                        Ok((account, Hbar::from_tinybars(amount.amount)))
                    })
                    .collect::<Result<_, ValidationError>>()?,
            ),
            Value::TransactionId(id) => Self::TransactionId(id.try_into()?),
            Value::Duration(duration) => Self::Duration(duration.into()),
        })
    }
}

#[cfg(test)]
mod tests {
    use ledger_types::PublicKey;

    use super::*;

    #[test]
    fn converts_through_the_wire_form() {
        let key = Key::threshold(
            1,
            vec![
                PublicKey::from_ed25519(&[1; 32]).expect("key").into(),
                PublicKey::from_ed25519(&[2; 32]).expect("key").into(),
            ],
        );
        let values = vec![
            FieldValue::from(TopicId::from_num(7)),
            FieldValue::from(key),
            FieldValue::Transfers(vec![
                (AccountId::from_num(2), Hbar::new(-1)),
                (AccountId::from_num(3), Hbar::new(1)),
            ]),
            FieldValue::Duration(Duration::from_secs(7_776_000)),
            FieldValue::from("memo"),
        ];
        for value in values {
            let wire = v1::FieldValue::from(value.clone());
            assert_eq!(FieldValue::try_from(wire).expect("decode"), value);
        }
    }
}
