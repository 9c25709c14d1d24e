//! Ledger client request execution engine.
//!
//! This crate exposes:
//! - network topology with per-node health and backoff (`Network`),
//! - transport abstractions (`Transport`, `GrpcTransport`, `MockTransport`),
//! - transaction construction, chunking and per-node signing (`TransactionBuilder`,
//!   `FrozenTransaction`),
//! - the retry loop every request runs through (`ExecutionReport` describes what it did),
//! - query cost negotiation and payment (`Query`),
//! - receipt and record polling (`TransactionResponse`),
//! - the client context and its JSON configuration (`Client`, `ClientConfig`).

pub mod client;
pub mod config;
pub mod error;
pub mod execute;
pub mod fields;
pub mod grpc;
pub mod network;
pub mod policy;
pub mod query;
pub mod receipt;
pub mod signing;
pub mod transaction;
pub mod transport;

pub use client::{Client, Operator};
pub use config::{ClientConfig, ExecutionConfig, NetworkConfig, OperatorConfig};
pub use error::{BuildError, Error};
pub use execute::{Attempt, AttemptOutcome, Deadline, ExecutionReport};
pub use fields::FieldValue;
pub use grpc::GrpcTransport;
pub use network::{BackoffConfig, Network, NetworkName, Node, NodeHealth};
pub use policy::{PrecheckClass, StatusPolicy, DEFAULT_RETRYABLE};
pub use query::{Query, QueryKind, QueryResponse};
pub use receipt::{
    poll_receipt, ChunkSubmission, TransactionReceipt, TransactionRecord, TransactionResponse,
};
pub use signing::SignedBody;
pub use transaction::{
    ChunkInfo, FrozenTransaction, OperationKind, TransactionBuilder, DEFAULT_CHUNK_SIZE,
    DEFAULT_MAX_CHUNKS,
};
pub use transport::{MockTransport, Transport, TransportError};
