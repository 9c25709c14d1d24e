//! Transactions: an open builder, and the frozen form that is signed and executed.
//!
//! Freezing materializes one body per chunk. Each body is then addressed to
//! every candidate node, and each (chunk, node) pair keeps its own signed
//! bytes and signature collection.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use ledger_proto::{fields as field_names, service, v1, ServiceMethod};
use ledger_types::{
    AccountId, FileId, Hbar, Key, PublicKey, Signer, Status, TopicId, TransactionHash,
    TransactionId, ValidationError,
};
use prost::Message;
use tracing::{debug, warn};

use crate::client::Client;
use crate::error::{BuildError, Error};
use crate::execute::{execute, Deadline, Execute, ExecutionReport, Verdict};
use crate::fields::FieldValue;
use crate::policy::{PrecheckClass, StatusPolicy};
use crate::receipt::{ChunkSubmission, TransactionResponse};
use crate::signing::SignedBody;

pub const DEFAULT_CHUNK_SIZE: usize = 1024;
pub const DEFAULT_MAX_CHUNKS: usize = 20;
pub const DEFAULT_VALID_DURATION: Duration = Duration::from_secs(120);
pub const DEFAULT_MAX_TRANSACTION_FEE: Hbar = Hbar::new(2);

/// A transaction kind: its name in the body envelope, its RPC, and for
/// payload-bounded kinds the field the payload chunks go into.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct OperationKind {
    pub name: &'static str,
    pub method: ServiceMethod,
    pub payload_field: Option<&'static str>,
}

impl OperationKind {
    pub const CRYPTO_TRANSFER: Self = Self::new("cryptoTransfer", service::CRYPTO_TRANSFER);
    pub const ACCOUNT_CREATE: Self =
        Self::new("cryptoCreateAccount", service::CRYPTO_CREATE_ACCOUNT);
    pub const ACCOUNT_UPDATE: Self =
        Self::new("cryptoUpdateAccount", service::CRYPTO_UPDATE_ACCOUNT);
    pub const TOPIC_CREATE: Self =
        Self::new("consensusCreateTopic", service::CONSENSUS_CREATE_TOPIC);
    pub const TOPIC_MESSAGE_SUBMIT: Self = Self::chunked(
        "consensusSubmitMessage",
        service::CONSENSUS_SUBMIT_MESSAGE,
        field_names::MESSAGE,
    );
    pub const FILE_CREATE: Self = Self::new("fileCreate", service::FILE_CREATE);
    pub const FILE_APPEND: Self =
        Self::chunked("fileAppend", service::FILE_APPEND, field_names::CONTENTS);
    pub const TOKEN_MINT: Self = Self::new("tokenMint", service::TOKEN_MINT);
    pub const SCHEDULE_SIGN: Self = Self::new("scheduleSign", service::SCHEDULE_SIGN);

    const ALL: &'static [Self] = &[
        Self::CRYPTO_TRANSFER,
        Self::ACCOUNT_CREATE,
        Self::ACCOUNT_UPDATE,
        Self::TOPIC_CREATE,
        Self::TOPIC_MESSAGE_SUBMIT,
        Self::FILE_CREATE,
        Self::FILE_APPEND,
        Self::TOKEN_MINT,
        Self::SCHEDULE_SIGN,
    ];

    const fn new(name: &'static str, method: ServiceMethod) -> Self {
        Self {
            name,
            method,
            payload_field: None,
        }
    }

    const fn chunked(name: &'static str, method: ServiceMethod, field: &'static str) -> Self {
        Self {
            name,
            method,
            payload_field: Some(field),
        }
    }

    pub fn lookup(name: &str) -> Option<Self> {
        Self::ALL.iter().copied().find(|kind| kind.name == name)
    }

    pub const fn is_chunked(&self) -> bool {
        self.payload_field.is_some()
    }
}

impl fmt::Display for OperationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name)
    }
}

/// Position of one chunk within its request and the node it is first sent to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChunkInfo {
    pub index: usize,
    pub total: usize,
    pub initial_transaction_id: TransactionId,
    pub transaction_id: TransactionId,
    pub node_account_id: AccountId,
}

/// Open transaction: every field may still change.
#[derive(Debug, Clone)]
pub struct TransactionBuilder {
    kind: OperationKind,
    fields: BTreeMap<String, FieldValue>,
    transfers: Vec<(AccountId, Hbar)>,
    /// Set when an account's running total left the `i64` range.
    transfer_overflow: bool,
    payload: Vec<u8>,
    payer: Option<AccountId>,
    transaction_id: Option<TransactionId>,
    generated_transaction_id: bool,
    node_account_ids: Option<Vec<AccountId>>,
    valid_duration: Duration,
    memo: String,
    max_transaction_fee: Option<Hbar>,
    chunk_size: usize,
    max_chunks: usize,
    regenerate_transaction_id: Option<bool>,
    max_attempts: Option<usize>,
}

impl TransactionBuilder {
    pub fn new(kind: OperationKind) -> Self {
        Self {
            kind,
            fields: BTreeMap::new(),
            transfers: Vec::new(),
            transfer_overflow: false,
            payload: Vec::new(),
            payer: None,
            transaction_id: None,
            generated_transaction_id: false,
            node_account_ids: None,
            valid_duration: DEFAULT_VALID_DURATION,
            memo: String::new(),
            max_transaction_fee: None,
            chunk_size: DEFAULT_CHUNK_SIZE,
            max_chunks: DEFAULT_MAX_CHUNKS,
            regenerate_transaction_id: None,
            max_attempts: None,
        }
    }

    pub fn transfer() -> Self {
        Self::new(OperationKind::CRYPTO_TRANSFER)
    }

    pub fn account_create(key: Key, initial_balance: Hbar) -> Self {
        Self::new(OperationKind::ACCOUNT_CREATE)
            .with_field(field_names::KEY, key)
            .with_field(field_names::INITIAL_BALANCE, initial_balance)
    }

    pub fn topic_create() -> Self {
        Self::new(OperationKind::TOPIC_CREATE)
    }

    pub fn topic_message_submit(topic_id: TopicId, message: impl Into<Vec<u8>>) -> Self {
        Self::new(OperationKind::TOPIC_MESSAGE_SUBMIT)
            .with_field(field_names::TOPIC_ID, topic_id)
            .with_payload(message)
    }

    pub fn file_append(file_id: FileId, contents: impl Into<Vec<u8>>) -> Self {
        Self::new(OperationKind::FILE_APPEND)
            .with_field(field_names::FILE_ID, file_id)
            .with_payload(contents)
    }

    pub fn kind(&self) -> OperationKind {
        self.kind
    }

    pub fn transaction_id(&self) -> Option<TransactionId> {
        self.transaction_id
    }

    pub fn with_field(mut self, name: &str, value: impl Into<FieldValue>) -> Self {
        self.fields.insert(name.to_string(), value.into());
        self
    }

    /// Adds `amount` to `account`'s side of the transfer list (negative to debit).
    pub fn with_hbar_transfer(mut self, account: AccountId, amount: Hbar) -> Self {
        match self.transfers.iter_mut().find(|(id, _)| *id == account) {
            Some((_, total)) => match total.checked_add(amount) {
                Some(sum) => *total = sum,
                None => self.transfer_overflow = true,
            },
            None => self.transfers.push((account, amount)),
        }
        self
    }

    /// Opaque payload split into chunks by payload-bounded kinds.
    pub fn with_payload(mut self, payload: impl Into<Vec<u8>>) -> Self {
        self.payload = payload.into();
        self
    }

    /// Payer used when generating the transaction id; defaults to the client operator.
    pub fn with_payer(mut self, payer: AccountId) -> Self {
        self.payer = Some(payer);
        if self.generated_transaction_id {
            self.transaction_id = None;
            self.generated_transaction_id = false;
        }
        self
    }

    /// Explicit transaction id. Explicit ids are never regenerated.
    pub fn with_transaction_id(mut self, transaction_id: TransactionId) -> Self {
        self.transaction_id = Some(transaction_id);
        self.generated_transaction_id = false;
        self
    }

    /// Restricts submission to these nodes; chunks rotate over them in order.
    pub fn with_node_account_ids(mut self, node_account_ids: Vec<AccountId>) -> Self {
        self.node_account_ids = Some(node_account_ids);
        self
    }

    pub fn with_valid_duration(mut self, valid_duration: Duration) -> Self {
        self.valid_duration = valid_duration;
        self
    }

    pub fn with_memo(mut self, memo: impl Into<String>) -> Self {
        self.memo = memo.into();
        self
    }

    pub fn with_max_transaction_fee(mut self, fee: Hbar) -> Self {
        self.max_transaction_fee = Some(fee);
        self
    }

    pub fn with_chunk_size(mut self, chunk_size: usize) -> Self {
        self.chunk_size = chunk_size;
        self
    }

    pub fn with_max_chunks(mut self, max_chunks: usize) -> Self {
        self.max_chunks = max_chunks;
        self
    }

    pub fn with_regenerate_transaction_id(mut self, regenerate: bool) -> Self {
        self.regenerate_transaction_id = Some(regenerate);
        self
    }

    pub fn with_max_attempts(mut self, max_attempts: usize) -> Self {
        self.max_attempts = Some(max_attempts);
        self
    }

    /// Freezes without a client: the node list and the payer (or transaction id) must be set.
    pub fn freeze(&mut self) -> Result<FrozenTransaction, BuildError> {
        self.freeze_inner(None, None, DEFAULT_MAX_TRANSACTION_FEE)
    }

    /// Freezes using the client's operator as default payer and its network as default nodes.
    pub fn freeze_with(&mut self, client: &Client) -> Result<FrozenTransaction, BuildError> {
        let operator = client.operator().map(|operator| operator.account_id);
        let nodes = client.network().node_ids();
        let default_fee = client.config().default_max_transaction_fee;
        let frozen = self.freeze_inner(operator, Some(nodes), default_fee)?;
        if let Some(unknown) = frozen
            .node_account_ids
            .iter()
            .find(|id| !client.network().contains(id))
        {
            return Err(BuildError::UnknownNode(*unknown));
        }
        Ok(frozen)
    }

    fn freeze_inner(
        &mut self,
        default_payer: Option<AccountId>,
        network_nodes: Option<Vec<AccountId>>,
        default_fee: Hbar,
    ) -> Result<FrozenTransaction, BuildError> {
        let explicit_nodes = self.node_account_ids.is_some();
        let node_account_ids = match &self.node_account_ids {
            Some(ids) => ids.clone(),
            None => network_nodes.ok_or(BuildError::NoNodes)?,
        };
        if node_account_ids.is_empty() {
            return Err(BuildError::NoNodes);
        }

        let payloads = self.split_payload()?;
        self.check_transfers()?;
        let fee = self.max_transaction_fee.unwrap_or(default_fee);
        let transaction_fee = u64::try_from(fee.to_tinybars())
            .map_err(|_| ValidationError::InvalidField("max_transaction_fee"))?;

        let initial = match self.transaction_id {
            Some(id) => id,
            None => {
                let payer = self.payer.or(default_payer).ok_or(BuildError::MissingPayer)?;
                let id = TransactionId::generate(payer);
                self.transaction_id = Some(id);
                self.generated_transaction_id = true;
                id
            }
        };

        let base = v1::TransactionBody {
            transaction_id: None,
            node_account_id: None,
            transaction_fee,
            transaction_valid_duration: Some(self.valid_duration.into()),
            memo: self.memo.clone(),
            kind: self.kind.name.to_string(),
            fields: self.wire_fields(),
            chunk_info: None,
        };

        let total = payloads.as_ref().map_or(1, Vec::len);
        let chunks = (0..total)
            .map(|index| {
                let transaction_id = initial.with_nanos_offset(index as u64);
                let mut body = base.clone();
                body.transaction_id = Some(transaction_id.into());
                if let (Some(field), Some(payloads)) = (self.kind.payload_field, &payloads) {
                    body.fields.insert(
                        field.to_string(),
                        FieldValue::Bytes(payloads[index].clone()).into(),
                    );
                    body.chunk_info = Some(v1::ChunkInfo {
                        initial_transaction_id: Some(initial.into()),
                        total: total as i32,
                        index: index as i32,
                    });
                }
                Chunk::new(transaction_id, body, &node_account_ids)
            })
            .collect();

        debug!(
            kind = %self.kind,
            transaction_id = %initial,
            chunks = total,
            nodes = node_account_ids.len(),
            "transaction frozen"
        );
        Ok(FrozenTransaction {
            kind: self.kind,
            initial_transaction_id: initial,
            node_account_ids,
            explicit_nodes,
            chunks,
            signers: Vec::new(),
            generated_transaction_id: self.generated_transaction_id,
            regenerate_transaction_id: self.regenerate_transaction_id,
            max_attempts: self.max_attempts,
            executed: false,
            resubmission_allowed: false,
        })
    }

    /// Payload chunks for payload-bounded kinds; `None` for the rest.
    fn split_payload(&self) -> Result<Option<Vec<Vec<u8>>>, BuildError> {
        if !self.kind.is_chunked() {
            if !self.payload.is_empty() {
                return Err(BuildError::UnexpectedPayload(self.kind.name));
            }
            return Ok(None);
        }
        if self.chunk_size == 0 {
            return Err(BuildError::ZeroChunkSize);
        }
        let required = self.payload.len().div_ceil(self.chunk_size).max(1);
        if required > self.max_chunks {
            return Err(BuildError::ChunkLimitExceeded {
                required,
                max: self.max_chunks,
            });
        }
        if self.payload.is_empty() {
            return Ok(Some(vec![Vec::new()]));
        }
        Ok(Some(self.payload.chunks(self.chunk_size).map(<[u8]>::to_vec).collect()))
    }

    /// Transfers must balance to zero without overflowing along the way.
    fn check_transfers(&self) -> Result<(), BuildError> {
        let invalid = || BuildError::from(ValidationError::InvalidField(field_names::TRANSFERS));
        if self.transfer_overflow {
            return Err(invalid());
        }
        let sum = self
            .transfers
            .iter()
            .try_fold(Hbar::ZERO, |sum, (_, amount)| sum.checked_add(*amount))
            .ok_or_else(invalid)?;
        if sum != Hbar::ZERO {
            return Err(invalid());
        }
        Ok(())
    }

    fn wire_fields(&self) -> BTreeMap<String, v1::FieldValue> {
        let mut fields: BTreeMap<String, v1::FieldValue> = self
            .fields
            .iter()
            .map(|(name, value)| (name.clone(), value.clone().into()))
            .collect();
        if !self.transfers.is_empty() {
            fields.insert(
                field_names::TRANSFERS.to_string(),
                FieldValue::Transfers(self.transfers.clone()).into(),
            );
        }
        fields
    }
}

#[derive(Debug, Clone)]
struct Chunk {
    transaction_id: TransactionId,
    /// Body without a node id.
    body: v1::TransactionBody,
    /// One per candidate node, in candidate order.
    signed: Vec<SignedBody>,
}

impl Chunk {
    fn new(transaction_id: TransactionId, body: v1::TransactionBody, nodes: &[AccountId]) -> Self {
        let signed = nodes.iter().map(|node| SignedBody::new(&body, *node)).collect();
        Self {
            transaction_id,
            body,
            signed,
        }
    }
}

/// A frozen transaction: bodies are fixed, signatures may still be added.
#[derive(Clone)]
pub struct FrozenTransaction {
    kind: OperationKind,
    initial_transaction_id: TransactionId,
    node_account_ids: Vec<AccountId>,
    explicit_nodes: bool,
    chunks: Vec<Chunk>,
    signers: Vec<Arc<dyn Signer>>,
    generated_transaction_id: bool,
    regenerate_transaction_id: Option<bool>,
    max_attempts: Option<usize>,
    executed: bool,
    resubmission_allowed: bool,
}

impl fmt::Debug for FrozenTransaction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let signers: Vec<PublicKey> = self.signers.iter().map(|s| s.public_key()).collect();
        f.debug_struct("FrozenTransaction")
            .field("kind", &self.kind.name)
            .field("transaction_id", &self.initial_transaction_id)
            .field("node_account_ids", &self.node_account_ids)
            .field("chunks", &self.chunks.len())
            .field("signers", &signers)
            .field("executed", &self.executed)
            .finish()
    }
}

impl FrozenTransaction {
    pub fn kind(&self) -> OperationKind {
        self.kind
    }

    /// Id of the first chunk; receipts of a chunked request are looked up with it.
    pub fn transaction_id(&self) -> TransactionId {
        self.initial_transaction_id
    }

    pub fn node_account_ids(&self) -> &[AccountId] {
        &self.node_account_ids
    }

    pub fn chunk_count(&self) -> usize {
        self.chunks.len()
    }

    pub fn chunks(&self) -> Vec<ChunkInfo> {
        let total = self.chunks.len();
        self.chunks
            .iter()
            .enumerate()
            .map(|(index, chunk)| ChunkInfo {
                index,
                total,
                initial_transaction_id: self.initial_transaction_id,
                transaction_id: chunk.transaction_id,
                node_account_id: self.node_account_ids[index % self.node_account_ids.len()],
            })
            .collect()
    }

    /// Canonical body bytes of every chunk, before a node id is filled in.
    pub fn chunk_bodies(&self) -> Vec<Vec<u8>> {
        self.chunks
            .iter()
            .map(|chunk| chunk.body.encode_to_vec())
            .collect()
    }

    /// Signed bytes of `chunk` as addressed to `node`.
    pub fn signed_body(&self, chunk: usize, node: &AccountId) -> Option<&SignedBody> {
        let position = self.node_position(node)?;
        self.chunks.get(chunk).map(|chunk| &chunk.signed[position])
    }

    pub fn is_executed(&self) -> bool {
        self.executed
    }

    /// Permits another `execute` with the same transaction ids.
    pub fn allow_resubmission(&mut self) -> &mut Self {
        self.resubmission_allowed = true;
        self
    }

    /// Signs every (chunk, node) pair with `signer`. Signing again with the same key is a no-op.
    pub fn sign(&mut self, signer: Arc<dyn Signer>) -> Result<&mut Self, BuildError> {
        for chunk in &mut self.chunks {
            for signed in &mut chunk.signed {
                signed.sign_with(signer.as_ref())?;
            }
        }
        let public_key = signer.public_key();
        if !self.signers.iter().any(|s| s.public_key() == public_key) {
            self.signers.push(signer);
        }
        Ok(self)
    }

    /// Signs with each of `signers` whose public key appears in `key`. Returns how many matched.
    pub fn sign_for_key(
        &mut self,
        key: &Key,
        signers: &[Arc<dyn Signer>],
    ) -> Result<usize, BuildError> {
        let mut matched = 0;
        for signer in signers {
            if key.contains(&signer.public_key()) {
                self.sign(Arc::clone(signer))?;
                matched += 1;
            }
        }
        Ok(matched)
    }

    /// Attaches an externally produced signature. Only valid for a transaction
    /// with a single node and a single chunk, since the signature covers one node's bytes.
    pub fn add_signature(
        &mut self,
        public_key: PublicKey,
        signature: Vec<u8>,
    ) -> Result<&mut Self, BuildError> {
        if self.chunks.len() != 1 || self.node_account_ids.len() != 1 {
            return Err(BuildError::AmbiguousSignatureTarget);
        }
        let node = self.node_account_ids[0];
        self.add_signature_for(0, &node, public_key, signature)
    }

    /// Attaches an externally produced signature over the bytes of (`chunk`, `node`).
    pub fn add_signature_for(
        &mut self,
        chunk: usize,
        node: &AccountId,
        public_key: PublicKey,
        signature: Vec<u8>,
    ) -> Result<&mut Self, BuildError> {
        let position = self
            .node_position(node)
            .ok_or(BuildError::UnknownNode(*node))?;
        let chunk = self
            .chunks
            .get_mut(chunk)
            .ok_or(BuildError::AmbiguousSignatureTarget)?;
        chunk.signed[position].add_signature(public_key, signature)?;
        // A regenerated id would invalidate a signature this transaction cannot reproduce.
        self.regenerate_transaction_id = Some(false);
        Ok(self)
    }

    /// Per chunk, per node: the signatures collected so far.
    pub fn signatures(&self) -> Vec<BTreeMap<AccountId, BTreeMap<PublicKey, Vec<u8>>>> {
        self.chunks
            .iter()
            .map(|chunk| {
                chunk
                    .signed
                    .iter()
                    .map(|signed| {
                        let signatures = signed
                            .signatures()
                            .iter()
                            .map(|(key, signature)| (*key, signature.to_vec()))
                            .collect();
                        (signed.node_account_id(), signatures)
                    })
                    .collect()
            })
            .collect()
    }

    /// Hash of the first chunk as it would be submitted to each node.
    pub fn transaction_hash_per_node(&self) -> BTreeMap<AccountId, TransactionHash> {
        self.chunks
            .first()
            .map(|chunk| {
                chunk
                    .signed
                    .iter()
                    .map(|signed| (signed.node_account_id(), signed.transaction_hash()))
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Every (chunk, node) signed transaction, chunk-major, as a `TransactionList`.
    pub fn to_bytes(&self) -> Vec<u8> {
        v1::TransactionList {
            transaction_list: self
                .chunks
                .iter()
                .flat_map(|chunk| chunk.signed.iter().map(SignedBody::to_transaction))
                .collect(),
        }
        .encode_to_vec()
    }

    /// Restores a transaction produced by `to_bytes`. The node list becomes
    /// explicit and the transaction id is never regenerated.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, BuildError> {
        let list = v1::TransactionList::decode(bytes)
            .map_err(|err| BuildError::Decode(err.to_string()))?;

        let mut chunks: Vec<Chunk> = Vec::new();
        for transaction in list.transaction_list {
            let signed_bytes = transaction.signed_transaction_bytes.as_slice();
            let signed = v1::SignedTransaction::decode(signed_bytes)
                .map_err(|err| BuildError::Decode(err.to_string()))?;
            let (signed_body, mut body) = SignedBody::decode(signed)?;
            let transaction_id: TransactionId = body
                .transaction_id
                .clone()
                .ok_or(BuildError::MissingField("transaction_id"))?
                .try_into()?;
            body.node_account_id = None;
            match chunks.last_mut() {
                Some(chunk) if chunk.transaction_id == transaction_id => {
                    chunk.signed.push(signed_body);
                }
                _ => chunks.push(Chunk {
                    transaction_id,
                    body,
                    signed: vec![signed_body],
                }),
            }
        }

        let first = chunks
            .first()
            .ok_or_else(|| BuildError::Decode("empty transaction list".to_string()))?;
        let node_account_ids: Vec<AccountId> =
            first.signed.iter().map(SignedBody::node_account_id).collect();
        let same_nodes = chunks.iter().all(|chunk| {
            chunk
                .signed
                .iter()
                .map(SignedBody::node_account_id)
                .eq(node_account_ids.iter().copied())
        });
        if !same_nodes {
            return Err(BuildError::Decode("chunks target different nodes".to_string()));
        }
        let kind = OperationKind::lookup(&first.body.kind)
            .ok_or_else(|| BuildError::Decode(format!("unknown kind `{}`", first.body.kind)))?;
        let initial_transaction_id = first.transaction_id;

        Ok(Self {
            kind,
            initial_transaction_id,
            node_account_ids,
            explicit_nodes: true,
            chunks,
            signers: Vec::new(),
            generated_transaction_id: false,
            regenerate_transaction_id: Some(false),
            max_attempts: None,
            executed: false,
            resubmission_allowed: false,
        })
    }

    pub async fn execute(&mut self, client: &Client) -> Result<TransactionResponse, Error> {
        self.execute_with_timeout(client, client.config().request_timeout)
            .await
    }

    /// Submits every chunk in order; a chunk that is not accepted aborts the rest.
    pub async fn execute_with_timeout(
        &mut self,
        client: &Client,
        timeout: Duration,
    ) -> Result<TransactionResponse, Error> {
        if self.executed && !self.resubmission_allowed {
            return Err(BuildError::AlreadyExecuted.into());
        }
        if let Some(unknown) = self
            .node_account_ids
            .iter()
            .find(|id| !client.network().contains(id))
        {
            return Err(BuildError::UnknownNode(*unknown).into());
        }
        if let Some(operator) = client.operator() {
            self.sign(Arc::clone(&operator.signer))?;
        }

        self.executed = true;
        let regenerate = self
            .regenerate_transaction_id
            .unwrap_or(client.config().regenerate_transaction_id);
        let deadline = Deadline::after(timeout);
        let mut report = ExecutionReport::default();
        let mut submissions = Vec::with_capacity(self.chunks.len());

        for index in 0..self.chunks.len() {
            let mut chunk = ChunkExecution {
                transaction: self,
                index,
                regenerate,
            };
            match execute(client, &mut chunk, deadline, &mut report).await {
                Ok((submission, _)) => submissions.push(submission),
                Err(err) => {
                    warn!(
                        kind = %self.kind,
                        transaction_id = %self.initial_transaction_id,
                        chunk = index,
                        error = %err,
                        "chunk not accepted, aborting remaining chunks"
                    );
                    return Err(err);
                }
            }
        }
        let first = submissions
            .first()
            .copied()
            .ok_or(BuildError::MissingField("chunks"))?;
        Ok(TransactionResponse::new(first, submissions, report))
    }

    fn node_position(&self, node: &AccountId) -> Option<usize> {
        self.node_account_ids.iter().position(|id| id == node)
    }

    /// Replaces the id of a single-chunk transaction and re-signs every node's bytes.
    fn replace_transaction_id(&mut self, transaction_id: TransactionId) -> Result<(), BuildError> {
        let [chunk] = self.chunks.as_mut_slice() else {
            return Err(BuildError::AmbiguousSignatureTarget);
        };
        let mut body = chunk.body.clone();
        body.transaction_id = Some(transaction_id.into());
        *chunk = Chunk::new(transaction_id, body, &self.node_account_ids);
        for signer in &self.signers {
            for signed in &mut chunk.signed {
                signed.sign_with(signer.as_ref())?;
            }
        }
        self.initial_transaction_id = transaction_id;
        Ok(())
    }
}

/// One chunk of a frozen transaction, driven by the retry loop.
struct ChunkExecution<'a> {
    transaction: &'a mut FrozenTransaction,
    index: usize,
    regenerate: bool,
}

impl ChunkExecution<'_> {
    fn chunk(&self) -> &Chunk {
        &self.transaction.chunks[self.index]
    }
}

impl Execute for ChunkExecution<'_> {
    type Output = ChunkSubmission;

    fn method(&self) -> ServiceMethod {
        self.transaction.kind.method
    }

    fn candidates(&self) -> &[AccountId] {
        &self.transaction.node_account_ids
    }

    fn explicit_nodes(&self) -> bool {
        self.transaction.explicit_nodes
    }

    fn preassigned_node(&self) -> Option<AccountId> {
        let nodes = &self.transaction.node_account_ids;
        nodes.get(self.index % nodes.len()).copied()
    }

    fn transaction_id(&self) -> Option<TransactionId> {
        Some(self.chunk().transaction_id)
    }

    fn make_request(&mut self, node: AccountId) -> Result<Vec<u8>, Error> {
        let signed = self
            .transaction
            .signed_body(self.index, &node)
            .ok_or(BuildError::UnknownNode(node))?;
        Ok(signed.to_transaction().encode_to_vec())
    }

    fn classify(
        &mut self,
        node: AccountId,
        response: &[u8],
        policy: &StatusPolicy,
    ) -> Verdict<ChunkSubmission> {
        let transaction_id = self.chunk().transaction_id;
        let code = match v1::TransactionResponse::decode(response) {
            Ok(response) => response.node_transaction_precheck_code,
            Err(err) => return Verdict::Fatal(err.into()),
        };
        let Ok(status) = Status::try_from(code) else {
            return Verdict::Fatal(Error::UnrecognizedStatus(code));
        };
        match policy.classify_precheck(status) {
            PrecheckClass::Accepted => {
                let transaction_hash = self
                    .transaction
                    .signed_body(self.index, &node)
                    .map(SignedBody::transaction_hash)
                    .unwrap_or_else(|| TransactionHash::new([0; 48]));
                Verdict::Accepted(ChunkSubmission {
                    index: self.index,
                    transaction_id,
                    node_account_id: node,
                    transaction_hash,
                })
            }
            PrecheckClass::Retryable => Verdict::Retry(Error::RetryablePrecheck {
                status,
                transaction_id: Some(transaction_id),
            }),
            PrecheckClass::TransactionExpired => Verdict::Expired(Error::PrecheckStatus {
                status,
                transaction_id: Some(transaction_id),
            }),
            PrecheckClass::Fatal => Verdict::Fatal(Error::PrecheckStatus {
                status,
                transaction_id: Some(transaction_id),
            }),
        }
    }

    fn regenerate_transaction_id(&mut self) -> bool {
        let transaction = &mut *self.transaction;
        let single_chunk = transaction.chunks.len() == 1;
        if !self.regenerate || !transaction.generated_transaction_id || !single_chunk {
            return false;
        }
        let payer = transaction.initial_transaction_id.account_id;
        transaction
            .replace_transaction_id(TransactionId::generate(payer))
            .is_ok()
    }

    fn max_attempts(&self) -> Option<usize> {
        self.transaction.max_attempts
    }
}

#[cfg(test)]
mod tests {
    use ledger_crypto::{EcdsaPrivateKey, Ed25519PrivateKey};
    use ledger_types::Timestamp;

    use super::*;

    fn nodes(count: u64) -> Vec<AccountId> {
        (0..count).map(|i| AccountId::from_num(3 + i)).collect()
    }

    fn fixed_id() -> TransactionId {
        TransactionId::new(AccountId::from_num(2), Timestamp::new(1_700_000_000, 0))
    }

    fn message_submit(len: usize) -> TransactionBuilder {
        TransactionBuilder::topic_message_submit(TopicId::from_num(1_001), vec![7u8; len])
            .with_transaction_id(fixed_id())
            .with_node_account_ids(nodes(3))
    }

    #[test]
    fn small_payload_freezes_to_one_chunk() {
        let frozen = message_submit(100).freeze().expect("freeze");
        assert_eq!(frozen.chunk_count(), 1);
        let info = frozen.chunks()[0];
        assert_eq!((info.index, info.total), (0, 1));
        assert_eq!(info.transaction_id, fixed_id());
    }

    #[test]
    fn large_payload_splits_into_ordered_chunks() {
        let frozen = message_submit(10 * 1024).freeze().expect("freeze");
        let chunks = frozen.chunks();
        assert_eq!(chunks.len(), 10);
        for (index, info) in chunks.iter().enumerate() {
            assert_eq!(info.index, index);
            assert_eq!(info.total, 10);
            assert_eq!(info.initial_transaction_id, fixed_id());
            assert_eq!(info.transaction_id, fixed_id().with_nanos_offset(index as u64));
            assert_eq!(info.node_account_id, nodes(3)[index % 3]);
        }
    }

    #[test]
    fn chunk_ceiling_is_a_construction_error() {
        let err = message_submit(5_000)
            .with_chunk_size(100)
            .with_max_chunks(20)
            .freeze()
            .expect_err("too many chunks");
        assert_eq!(err, BuildError::ChunkLimitExceeded { required: 50, max: 20 });
        assert_eq!(
            message_submit(10).with_chunk_size(0).freeze().expect_err("zero"),
            BuildError::ZeroChunkSize
        );
    }

    #[test]
    fn freeze_is_idempotent_and_rederives_after_mutation() {
        let mut builder = TransactionBuilder::transfer()
            .with_payer(AccountId::from_num(2))
            .with_node_account_ids(nodes(2))
            .with_hbar_transfer(AccountId::from_num(2), Hbar::new(-1))
            .with_hbar_transfer(AccountId::from_num(9), Hbar::new(1));
        let first = builder.freeze().expect("freeze");
        let second = builder.freeze().expect("freeze");
        assert_eq!(first.chunk_bodies(), second.chunk_bodies());
        assert_eq!(first.transaction_id(), second.transaction_id());

        let mut builder = builder.with_memo("changed");
        let third = builder.freeze().expect("freeze");
        assert_ne!(first.chunk_bodies(), third.chunk_bodies());
        assert_eq!(first.transaction_id(), third.transaction_id());
    }

    fn transfer_to(node_count: u64) -> TransactionBuilder {
        TransactionBuilder::transfer()
            .with_transaction_id(fixed_id())
            .with_node_account_ids(nodes(node_count))
    }

    #[test]
    fn overflowing_transfers_are_rejected() {
        let transfers = BuildError::from(ValidationError::InvalidField(field_names::TRANSFERS));

        let mut same_account = transfer_to(1)
            .with_hbar_transfer(AccountId::from_num(2), Hbar::from_tinybars(i64::MAX))
            .with_hbar_transfer(AccountId::from_num(2), Hbar::from_tinybars(1));
        assert_eq!(same_account.freeze().expect_err("overflow"), transfers);

        let mut across_accounts = transfer_to(1)
            .with_hbar_transfer(AccountId::from_num(2), Hbar::from_tinybars(i64::MAX))
            .with_hbar_transfer(AccountId::from_num(9), Hbar::from_tinybars(1));
        assert_eq!(across_accounts.freeze().expect_err("overflow"), transfers);

        let mut extremes_that_balance = transfer_to(1)
            .with_hbar_transfer(AccountId::from_num(2), Hbar::from_tinybars(-i64::MAX))
            .with_hbar_transfer(AccountId::from_num(9), Hbar::from_tinybars(i64::MAX));
        assert!(extremes_that_balance.freeze().is_ok());
    }

    #[test]
    fn negative_fee_ceiling_is_rejected() {
        let mut builder = transfer_to(1).with_max_transaction_fee(Hbar::from_tinybars(-1));
        assert_eq!(
            builder.freeze().expect_err("negative fee"),
            BuildError::Validation(ValidationError::InvalidField("max_transaction_fee"))
        );

        let frozen = transfer_to(1)
            .with_max_transaction_fee(Hbar::from_tinybars(500_000))
            .freeze()
            .expect("freeze");
        let body = v1::TransactionBody::decode(frozen.chunk_bodies()[0].as_slice()).expect("body");
        assert_eq!(body.transaction_fee, 500_000);
    }

    #[test]
    fn missing_payer_and_nodes_are_construction_errors() {
        let mut no_payer = TransactionBuilder::transfer().with_node_account_ids(nodes(1));
        assert_eq!(no_payer.freeze().expect_err("payer"), BuildError::MissingPayer);

        let mut no_nodes = TransactionBuilder::transfer().with_transaction_id(fixed_id());
        assert_eq!(no_nodes.freeze().expect_err("nodes"), BuildError::NoNodes);

        let mut unbalanced = TransactionBuilder::transfer()
            .with_transaction_id(fixed_id())
            .with_node_account_ids(nodes(1))
            .with_hbar_transfer(AccountId::from_num(2), Hbar::new(-1));
        assert!(matches!(
            unbalanced.freeze(),
            Err(BuildError::Validation(ValidationError::InvalidField(_)))
        ));

        let mut stray_payload = TransactionBuilder::transfer()
            .with_transaction_id(fixed_id())
            .with_node_account_ids(nodes(1))
            .with_payload(b"x".to_vec());
        assert_eq!(
            stray_payload.freeze().expect_err("payload"),
            BuildError::UnexpectedPayload("cryptoTransfer")
        );
    }

    #[test]
    fn signing_is_idempotent_per_key() {
        let key: Arc<dyn Signer> = Arc::new(Ed25519PrivateKey::from_seed([5; 32]));
        let mut frozen = message_submit(3_000).freeze().expect("freeze");
        frozen.sign(Arc::clone(&key)).expect("sign");
        let once = frozen.signatures();
        frozen.sign(Arc::clone(&key)).expect("sign");
        assert_eq!(frozen.signatures(), once);
        for chunk in &once {
            assert_eq!(chunk.len(), 3);
            assert!(chunk.values().all(|signatures| signatures.len() == 1));
        }
    }

    #[test]
    fn signatures_are_node_specific() {
        let key = Ed25519PrivateKey::from_seed([5; 32]);
        let mut frozen = message_submit(10).freeze().expect("freeze");
        frozen.sign(Arc::new(key.clone())).expect("sign");

        let audit = frozen.signatures();
        let per_node = &audit[0];
        let (a, b) = (nodes(3)[0], nodes(3)[1]);
        let sig_a = &per_node[&a][&key.public_key()];
        let sig_b = &per_node[&b][&key.public_key()];
        assert_ne!(sig_a, sig_b);

        let bytes_b = frozen.signed_body(0, &b).expect("node b").body_bytes();
        assert!(ledger_crypto::verify(&key.public_key(), bytes_b, sig_a).is_err());
        assert!(ledger_crypto::verify(&key.public_key(), bytes_b, sig_b).is_ok());
    }

    #[test]
    fn sign_for_key_uses_only_matching_signers() {
        let a = Ed25519PrivateKey::from_seed([1; 32]);
        let b = EcdsaPrivateKey::from_slice(&[2; 32]).expect("scalar");
        let outsider = Ed25519PrivateKey::from_seed([3; 32]);
        let key = Key::threshold(
            1,
            vec![a.public_key().into(), Key::list(vec![b.public_key().into()])],
        );
        let signers: Vec<Arc<dyn Signer>> =
            vec![Arc::new(a), Arc::new(b), Arc::new(outsider.clone())];

        let mut frozen = message_submit(10).freeze().expect("freeze");
        assert_eq!(frozen.sign_for_key(&key, &signers).expect("sign"), 2);
        let audit = frozen.signatures();
        assert!(audit[0]
            .values()
            .all(|signatures| signatures.len() == 2
                && !signatures.contains_key(&outsider.public_key())));
    }

    #[test]
    fn manual_signature_needs_a_single_target() {
        let key = Ed25519PrivateKey::from_seed([4; 32]);
        let mut multi = message_submit(10).freeze().expect("freeze");
        assert_eq!(
            multi.add_signature(key.public_key(), vec![0; 64]).map(|_| ()),
            Err(BuildError::AmbiguousSignatureTarget)
        );

        let mut single = TransactionBuilder::transfer()
            .with_transaction_id(fixed_id())
            .with_node_account_ids(nodes(1))
            .freeze()
            .expect("freeze");
        let bytes = single
            .signed_body(0, &nodes(1)[0])
            .expect("body")
            .body_bytes()
            .to_vec();
        let signature = key.sign(&bytes).expect("sign");
        single
            .add_signature(key.public_key(), signature)
            .expect("valid signature");
        assert_eq!(single.signatures()[0][&nodes(1)[0]].len(), 1);
        assert!(single
            .add_signature(Ed25519PrivateKey::from_seed([8; 32]).public_key(), vec![1; 64])
            .is_err());
    }

    #[test]
    fn bytes_round_trip() {
        let key = Ed25519PrivateKey::from_seed([6; 32]);
        let mut frozen = message_submit(2_500)
            .with_memo("round trip")
            .freeze()
            .expect("freeze");
        frozen.sign(Arc::new(key)).expect("sign");

        let bytes = frozen.to_bytes();
        let restored = FrozenTransaction::from_bytes(&bytes).expect("decode");
        assert_eq!(restored.to_bytes(), bytes);
        assert_eq!(restored.kind(), OperationKind::TOPIC_MESSAGE_SUBMIT);
        assert_eq!(restored.transaction_id(), frozen.transaction_id());
        assert_eq!(restored.node_account_ids(), frozen.node_account_ids());
        assert_eq!(restored.chunks(), frozen.chunks());
        assert_eq!(restored.signatures(), frozen.signatures());
        assert_eq!(restored.chunk_bodies(), frozen.chunk_bodies());
    }

    #[test]
    fn from_bytes_rejects_garbage() {
        assert!(matches!(
            FrozenTransaction::from_bytes(&[0xff, 0x01]),
            Err(BuildError::Decode(_))
        ));
        assert!(matches!(
            FrozenTransaction::from_bytes(&[]),
            Err(BuildError::Decode(_))
        ));
    }

    #[test]
    fn hash_differs_per_node() {
        let frozen = message_submit(10).freeze().expect("freeze");
        let hashes = frozen.transaction_hash_per_node();
        assert_eq!(hashes.len(), 3);
        let distinct: std::collections::BTreeSet<_> = hashes.values().collect();
        assert_eq!(distinct.len(), 3);
    }
}
