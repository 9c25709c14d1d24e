//! Wire messages. Field numbers are part of the network contract and must not be reused.

use std::collections::BTreeMap;

#[derive(Clone, Copy, PartialEq, ::prost::Message)]
pub struct Timestamp {
    #[prost(int64, tag = "1")]
    pub seconds: i64,
    #[prost(int32, tag = "2")]
    pub nanos: i32,
}

#[derive(Clone, Copy, PartialEq, ::prost::Message)]
pub struct Duration {
    #[prost(int64, tag = "1")]
    pub seconds: i64,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct AccountId {
    #[prost(int64, tag = "1")]
    pub shard_num: i64,
    #[prost(int64, tag = "2")]
    pub realm_num: i64,
    #[prost(oneof = "account_id::Account", tags = "3, 4, 5")]
    pub account: Option<account_id::Account>,
}

pub mod account_id {
    #[derive(Clone, PartialEq, ::prost::Oneof)]
    pub enum Account {
        #[prost(int64, tag = "3")]
        AccountNum(i64),
        #[prost(bytes, tag = "4")]
        Alias(Vec<u8>),
        #[prost(bytes, tag = "5")]
        EvmAddress(Vec<u8>),
    }
}

/// Topic, file, token, contract and schedule ids share this shape.
#[derive(Clone, Copy, PartialEq, ::prost::Message)]
pub struct EntityId {
    #[prost(int64, tag = "1")]
    pub shard_num: i64,
    #[prost(int64, tag = "2")]
    pub realm_num: i64,
    #[prost(int64, tag = "3")]
    pub num: i64,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct TransactionId {
    #[prost(message, optional, tag = "1")]
    pub transaction_valid_start: Option<Timestamp>,
    #[prost(message, optional, tag = "2")]
    pub account_id: Option<AccountId>,
    #[prost(bool, tag = "3")]
    pub scheduled: bool,
    #[prost(int32, tag = "4")]
    pub nonce: i32,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct ChunkInfo {
    #[prost(message, optional, tag = "1")]
    pub initial_transaction_id: Option<TransactionId>,
    #[prost(int32, tag = "2")]
    pub total: i32,
    /// Zero-based position of this chunk.
    #[prost(int32, tag = "3")]
    pub index: i32,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct Key {
    #[prost(oneof = "key::Key", tags = "1, 2, 3, 4")]
    pub key: Option<key::Key>,
}

pub mod key {
    #[derive(Clone, PartialEq, ::prost::Oneof)]
    pub enum Key {
        #[prost(bytes, tag = "1")]
        Ed25519(Vec<u8>),
        #[prost(bytes, tag = "2")]
        EcdsaSecp256k1(Vec<u8>),
        #[prost(message, tag = "3")]
        KeyList(super::KeyList),
        #[prost(message, tag = "4")]
        ThresholdKey(super::ThresholdKey),
    }
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct KeyList {
    #[prost(message, repeated, tag = "1")]
    pub keys: Vec<Key>,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct ThresholdKey {
    #[prost(uint32, tag = "1")]
    pub threshold: u32,
    #[prost(message, optional, tag = "2")]
    pub keys: Option<KeyList>,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct AccountAmount {
    #[prost(message, optional, tag = "1")]
    pub account_id: Option<AccountId>,
    #[prost(sint64, tag = "2")]
    pub amount: i64,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct TransferList {
    #[prost(message, repeated, tag = "1")]
    pub account_amounts: Vec<AccountAmount>,
}

/// One value in the schema-described field table of a body or query.
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct FieldValue {
    #[prost(oneof = "field_value::Value", tags = "1, 2, 3, 4, 5, 6, 7, 8, 9, 10, 11")]
    pub value: Option<field_value::Value>,
}

pub mod field_value {
    #[derive(Clone, PartialEq, ::prost::Oneof)]
    pub enum Value {
        #[prost(uint64, tag = "1")]
        Uint(u64),
        #[prost(sint64, tag = "2")]
        Int(i64),
        #[prost(bytes, tag = "3")]
        Bytes(Vec<u8>),
        #[prost(string, tag = "4")]
        Text(String),
        #[prost(bool, tag = "5")]
        Flag(bool),
        #[prost(message, tag = "6")]
        Account(super::AccountId),
        #[prost(message, tag = "7")]
        Entity(super::EntityId),
        #[prost(message, tag = "8")]
        Key(super::Key),
        #[prost(message, tag = "9")]
        Transfers(super::TransferList),
        #[prost(message, tag = "10")]
        TransactionId(super::TransactionId),
        #[prost(message, tag = "11")]
        Duration(super::Duration),
    }
}

/// Generic transaction body: a kind tag plus its field table.
///
/// Fields are kept in a `BTreeMap` so encoding is deterministic.
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct TransactionBody {
    #[prost(message, optional, tag = "1")]
    pub transaction_id: Option<TransactionId>,
    #[prost(message, optional, tag = "2")]
    pub node_account_id: Option<AccountId>,
    #[prost(uint64, tag = "3")]
    pub transaction_fee: u64,
    #[prost(message, optional, tag = "4")]
    pub transaction_valid_duration: Option<Duration>,
    #[prost(string, tag = "5")]
    pub memo: String,
    #[prost(string, tag = "6")]
    pub kind: String,
    #[prost(btree_map = "string, message", tag = "7")]
    pub fields: BTreeMap<String, FieldValue>,
    #[prost(message, optional, tag = "8")]
    pub chunk_info: Option<ChunkInfo>,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct SignaturePair {
    /// Always the full public key.
    #[prost(bytes = "vec", tag = "1")]
    pub pub_key_prefix: Vec<u8>,
    #[prost(oneof = "signature_pair::Signature", tags = "2, 3")]
    pub signature: Option<signature_pair::Signature>,
}

pub mod signature_pair {
    #[derive(Clone, PartialEq, ::prost::Oneof)]
    pub enum Signature {
        #[prost(bytes, tag = "2")]
        Ed25519(Vec<u8>),
        #[prost(bytes, tag = "3")]
        EcdsaSecp256k1(Vec<u8>),
    }
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct SignatureMap {
    #[prost(message, repeated, tag = "1")]
    pub sig_pair: Vec<SignaturePair>,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct SignedTransaction {
    #[prost(bytes = "vec", tag = "1")]
    pub body_bytes: Vec<u8>,
    #[prost(message, optional, tag = "2")]
    pub sig_map: Option<SignatureMap>,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct Transaction {
    #[prost(bytes = "vec", tag = "1")]
    pub signed_transaction_bytes: Vec<u8>,
}

/// Serialized form of a frozen request: one entry per (chunk, node) pair.
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct TransactionList {
    #[prost(message, repeated, tag = "1")]
    pub transaction_list: Vec<Transaction>,
}

#[derive(Clone, Copy, PartialEq, ::prost::Message)]
pub struct TransactionResponse {
    #[prost(int32, tag = "1")]
    pub node_transaction_precheck_code: i32,
    #[prost(uint64, tag = "2")]
    pub cost: u64,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, ::prost::Enumeration)]
#[repr(i32)]
pub enum ResponseType {
    AnswerOnly = 0,
    AnswerStateProof = 1,
    CostAnswer = 2,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct QueryHeader {
    #[prost(message, optional, tag = "1")]
    pub payment: Option<Transaction>,
    #[prost(enumeration = "ResponseType", tag = "2")]
    pub response_type: i32,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct Query {
    #[prost(message, optional, tag = "1")]
    pub header: Option<QueryHeader>,
    #[prost(string, tag = "2")]
    pub kind: String,
    #[prost(btree_map = "string, message", tag = "3")]
    pub fields: BTreeMap<String, FieldValue>,
}

#[derive(Clone, Copy, PartialEq, ::prost::Message)]
pub struct ResponseHeader {
    #[prost(int32, tag = "1")]
    pub node_transaction_precheck_code: i32,
    #[prost(enumeration = "ResponseType", tag = "2")]
    pub response_type: i32,
    #[prost(uint64, tag = "3")]
    pub cost: u64,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct TransactionReceipt {
    #[prost(int32, tag = "1")]
    pub status: i32,
    #[prost(message, optional, tag = "2")]
    pub account_id: Option<AccountId>,
    #[prost(message, optional, tag = "3")]
    pub file_id: Option<EntityId>,
    #[prost(message, optional, tag = "4")]
    pub contract_id: Option<EntityId>,
    #[prost(message, optional, tag = "5")]
    pub topic_id: Option<EntityId>,
    #[prost(message, optional, tag = "6")]
    pub token_id: Option<EntityId>,
    #[prost(message, optional, tag = "7")]
    pub schedule_id: Option<EntityId>,
    #[prost(uint64, tag = "8")]
    pub topic_sequence_number: u64,
    #[prost(bytes = "vec", tag = "9")]
    pub topic_running_hash: Vec<u8>,
    #[prost(message, optional, tag = "10")]
    pub scheduled_transaction_id: Option<TransactionId>,
    #[prost(int64, repeated, tag = "11")]
    pub serial_numbers: Vec<i64>,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct TransactionRecord {
    #[prost(message, optional, tag = "1")]
    pub receipt: Option<TransactionReceipt>,
    #[prost(bytes = "vec", tag = "2")]
    pub transaction_hash: Vec<u8>,
    #[prost(message, optional, tag = "3")]
    pub consensus_timestamp: Option<Timestamp>,
    #[prost(message, optional, tag = "4")]
    pub transaction_id: Option<TransactionId>,
    #[prost(string, tag = "5")]
    pub memo: String,
    #[prost(uint64, tag = "6")]
    pub transaction_fee: u64,
    #[prost(message, optional, tag = "7")]
    pub transfer_list: Option<TransferList>,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct Response {
    #[prost(message, optional, tag = "1")]
    pub header: Option<ResponseHeader>,
    #[prost(message, optional, tag = "2")]
    pub receipt: Option<TransactionReceipt>,
    #[prost(message, repeated, tag = "3")]
    pub child_receipts: Vec<TransactionReceipt>,
    #[prost(message, repeated, tag = "4")]
    pub duplicate_receipts: Vec<TransactionReceipt>,
    #[prost(message, optional, tag = "5")]
    pub record: Option<TransactionRecord>,
    #[prost(btree_map = "string, message", tag = "6")]
    pub fields: BTreeMap<String, FieldValue>,
}
