//! MockNode: one scripted consensus node and the log of what it was sent.

use std::collections::VecDeque;

use ledger_proto::ServiceMethod;
use ledger_types::{AccountId, PublicKey, Status, TransactionId};

/// Canned reaction consumed by the next call to a node, before normal processing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Scripted {
    /// Answer with this precheck status without looking at the request.
    Precheck(Status),
    Unavailable,
    Timeout,
}

/// Transport-level failure reported instead of a response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MockFault {
    Unavailable(String),
    Timeout,
    Unimplemented(String),
}

/// A transaction (or query payment) as the node saw it.
#[derive(Debug, Clone)]
pub struct Submission {
    pub method: ServiceMethod,
    pub transaction_id: TransactionId,
    pub node_account_id: AccountId,
    /// `(index, total)` when the body carried chunk info.
    pub chunk: Option<(i32, i32)>,
    pub body_bytes: Vec<u8>,
    pub signers: Vec<PublicKey>,
    pub status: Status,
}

#[derive(Debug, Clone)]
pub struct MockNode {
    account_id: AccountId,
    script: VecDeque<Scripted>,
    down: bool,
    pub calls: u64,
    pub submissions: Vec<Submission>,
}

impl MockNode {
    pub fn new(account_id: AccountId) -> Self {
        Self {
            account_id,
            script: VecDeque::new(),
            down: false,
            calls: 0,
            submissions: Vec::new(),
        }
    }

    pub fn account_id(&self) -> AccountId {
        self.account_id
    }

    pub fn push_script(&mut self, step: Scripted) {
        self.script.push_back(step);
    }

    pub fn extend_script(&mut self, steps: impl IntoIterator<Item = Scripted>) {
        self.script.extend(steps);
    }

    /// A down node fails every call with `Unavailable` until brought back up.
    pub fn set_down(&mut self, down: bool) {
        self.down = down;
    }

    pub fn is_down(&self) -> bool {
        self.down
    }

    pub fn accepted(&self) -> impl Iterator<Item = &Submission> {
        self.submissions
            .iter()
            .filter(|submission| submission.status == Status::Ok)
    }

    pub(crate) fn next_step(&mut self) -> Option<Scripted> {
        self.calls += 1;
        if self.down {
            return Some(Scripted::Unavailable);
        }
        self.script.pop_front()
    }
}
