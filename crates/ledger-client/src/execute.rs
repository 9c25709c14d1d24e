//! The retry loop shared by transactions, queries and receipt polling.
//!
//! One call drives a single request (one chunk, one query) to a definitive
//! outcome: accepted, fatally rejected, or exhausted. Every attempt selects a
//! node through `Network::select_node`, asks the request for the bytes meant
//! for that node, and sends them with a per-attempt deadline that never
//! outlives the overall one.

use std::time::Duration;

use ledger_proto::ServiceMethod;
use ledger_types::{AccountId, TransactionId};
use rand::Rng;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::client::Client;
use crate::error::Error;
use crate::network::Network;
use crate::policy::StatusPolicy;
use crate::transport::TransportError;

/// Overall deadline of one `execute` call, observed by every blocking step.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Deadline(Instant);

impl Deadline {
    pub fn after(timeout: Duration) -> Self {
        Self(Instant::now() + timeout)
    }

    pub fn remaining(&self) -> Duration {
        self.0.saturating_duration_since(Instant::now())
    }

    pub fn is_elapsed(&self) -> bool {
        self.remaining().is_zero()
    }
}

/// Classification of one node response.
#[derive(Debug)]
pub(crate) enum Verdict<T> {
    Accepted(T),
    /// Node-side transient failure: the node is penalized and the request retried.
    Retry(Error),
    /// The answer is not final yet: poll again after a fixed interval.
    NotReady(Error),
    /// The transaction id is no longer valid.
    Expired(Error),
    Fatal(Error),
}

/// A request the retry loop can drive.
pub(crate) trait Execute {
    type Output;

    fn method(&self) -> ServiceMethod;

    /// Node allow-list; empty means any node of the network.
    fn candidates(&self) -> &[AccountId];

    /// Whether the caller pinned the node list, in which case every attempt
    /// prefers the pre-assigned node.
    fn explicit_nodes(&self) -> bool;

    fn preassigned_node(&self) -> Option<AccountId>;

    fn transaction_id(&self) -> Option<TransactionId>;

    /// Wire bytes meant for `node`.
    fn make_request(&mut self, node: AccountId) -> Result<Vec<u8>, Error>;

    fn classify(
        &mut self,
        node: AccountId,
        response: &[u8],
        policy: &StatusPolicy,
    ) -> Verdict<Self::Output>;

    /// Replaces the transaction id after an `Expired` verdict. Returns whether it did.
    fn regenerate_transaction_id(&mut self) -> bool {
        false
    }

    fn max_attempts(&self) -> Option<usize> {
        None
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AttemptOutcome {
    Accepted,
    Retryable,
    NotReady,
    Expired,
    Fatal,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Attempt {
    pub node: AccountId,
    pub outcome: AttemptOutcome,
}

/// What one or more runs of the retry loop did, attempt by attempt.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExecutionReport {
    pub attempts: Vec<Attempt>,
    /// Every sleep taken between attempts, in order.
    pub sleeps: Vec<Duration>,
}

impl ExecutionReport {
    pub fn attempt_count(&self) -> usize {
        self.attempts.len()
    }

    pub fn count(&self, outcome: AttemptOutcome) -> usize {
        self.attempts
            .iter()
            .filter(|attempt| attempt.outcome == outcome)
            .count()
    }

    pub fn total_sleep(&self) -> Duration {
        self.sleeps.iter().sum()
    }

    pub fn nodes(&self) -> Vec<AccountId> {
        self.attempts.iter().map(|attempt| attempt.node).collect()
    }

    fn record(&mut self, node: AccountId, outcome: AttemptOutcome) {
        self.attempts.push(Attempt { node, outcome });
    }

    pub(crate) fn extend(&mut self, other: ExecutionReport) {
        self.attempts.extend(other.attempts);
        self.sleeps.extend(other.sleeps);
    }
}

/// Drives `request` until it is accepted, rejected or out of budget.
/// Returns the accepted output and the node that produced it.
pub(crate) async fn execute<E>(
    client: &Client,
    request: &mut E,
    deadline: Deadline,
    report: &mut ExecutionReport,
) -> Result<(E::Output, AccountId), Error>
where
    E: Execute + Send,
{
    let network = client.network();
    let config = client.config();
    let policy = config.status_policy();
    let max_attempts = request.max_attempts().unwrap_or(config.max_attempts);
    let method = request.method();

    let mut attempt = 0usize;
    let mut charged = 0usize;
    let mut last_node: Option<AccountId> = None;
    let mut last_error: Option<Error> = None;

    loop {
        if charged >= max_attempts {
            return Err(exhausted(attempt, last_error));
        }
        if deadline.is_elapsed() {
            return Err(match last_error {
                None => Error::TimedOut,
                last_error => exhausted(attempt, last_error),
            });
        }

        let preferred = match last_node {
            Some(last) if !request.explicit_nodes() => {
                next_candidate(network, request.candidates(), last)
            }
            _ => request.preassigned_node(),
        };
        let node = network.select_node(request.candidates(), preferred)?;
        let node_id = node.account_id();
        let bytes = request.make_request(node_id)?;
        attempt += 1;
        last_node = Some(node_id);

        let timeout = config.grpc_deadline.min(deadline.remaining());
        debug!(
            node = %node_id,
            %method,
            attempt,
            transaction_id = ?request.transaction_id(),
            timeout_ms = timeout.as_millis() as u64,
            "sending request"
        );
        let call = client.transport().call(node, method, bytes, timeout);
        let verdict = match tokio::time::timeout(timeout, call).await {
            Ok(Ok(response)) => request.classify(node_id, &response, &policy),
            Ok(Err(err)) if err.is_retryable() => Verdict::Retry(err.into()),
            Ok(Err(err)) => Verdict::Fatal(err.into()),
            Err(_) => Verdict::Retry(TransportError::Timeout.into()),
        };

        match verdict {
            Verdict::Accepted(output) => {
                report.record(node_id, AttemptOutcome::Accepted);
                network.record_success(&node_id);
                debug!(node = %node_id, %method, attempt, "request accepted");
                return Ok((output, node_id));
            }
            Verdict::Fatal(err) => {
                report.record(node_id, AttemptOutcome::Fatal);
                warn!(node = %node_id, %method, attempt, error = %err, "request rejected");
                return Err(err);
            }
            Verdict::Expired(err) => {
                report.record(node_id, AttemptOutcome::Expired);
                charged += 1;
                if !request.regenerate_transaction_id() {
                    warn!(node = %node_id, %method, attempt, "transaction expired");
                    return Err(err);
                }
                info!(
                    node = %node_id,
                    %method,
                    transaction_id = ?request.transaction_id(),
                    "transaction expired, regenerated transaction id"
                );
                last_error = Some(err);
            }
            Verdict::Retry(err) => {
                report.record(node_id, AttemptOutcome::Retryable);
                charged += 1;
                let backoff = network.record_failure(&node_id, &config.backoff);
                let delay = backoff + jitter(config.backoff.jitter);
                debug!(
                    node = %node_id,
                    %method,
                    attempt,
                    error = %err,
                    backoff_ms = delay.as_millis() as u64,
                    "retryable failure"
                );
                last_error = Some(err);
                if charged >= max_attempts {
                    return Err(exhausted(attempt, last_error));
                }
                sleep_within(delay, deadline, report, attempt, &mut last_error).await?;
            }
            Verdict::NotReady(err) => {
                report.record(node_id, AttemptOutcome::NotReady);
                debug!(node = %node_id, %method, attempt, error = %err, "not final yet");
                last_error = Some(err);
                let interval = config.receipt_poll_interval;
                sleep_within(interval, deadline, report, attempt, &mut last_error).await?;
            }
        }
    }
}

/// Candidate after `last` in rotation order, so a retry does not go back to the same node.
fn next_candidate(
    network: &Network,
    candidates: &[AccountId],
    last: AccountId,
) -> Option<AccountId> {
    let all;
    let rotation = if candidates.is_empty() {
        all = network.node_ids();
        &all
    } else {
        candidates
    };
    let position = rotation.iter().position(|id| *id == last)?;
    rotation.get((position + 1) % rotation.len()).copied()
}

fn jitter(max: Duration) -> Duration {
    let max_ms = max.as_millis() as u64;
    if max_ms == 0 {
        return Duration::ZERO;
    }
    Duration::from_millis(rand::thread_rng().gen_range(0..=max_ms))
}

async fn sleep_within(
    delay: Duration,
    deadline: Deadline,
    report: &mut ExecutionReport,
    attempt: usize,
    last_error: &mut Option<Error>,
) -> Result<(), Error> {
    if delay > deadline.remaining() {
        return Err(exhausted(attempt, last_error.take()));
    }
    report.sleeps.push(delay);
    tokio::time::sleep(delay).await;
    Ok(())
}

fn exhausted(attempts: usize, last_error: Option<Error>) -> Error {
    Error::Exhausted {
        attempts,
        last_error: last_error.map(Box::new),
    }
}

#[cfg(test)]
mod tests {
    use std::collections::VecDeque;
    use std::sync::Arc;

    use async_trait::async_trait;
    use ledger_proto::service;
    use ledger_types::Status;

    use super::*;
    use crate::config::ExecutionConfig;
    use crate::network::Node;
    use crate::transport::Transport;

    struct EchoTransport;

    #[async_trait]
    impl Transport for EchoTransport {
        async fn call(
            &self,
            _node: &Node,
            _method: ServiceMethod,
            request: Vec<u8>,
            _timeout: Duration,
        ) -> Result<Vec<u8>, TransportError> {
            Ok(request)
        }
    }

    enum Step {
        Accept,
        Retry,
        NotReady,
        Fatal,
    }

    struct Scripted {
        steps: VecDeque<Step>,
        candidates: Vec<AccountId>,
        explicit: bool,
    }

    impl Scripted {
        fn new(steps: impl IntoIterator<Item = Step>) -> Self {
            Self {
                steps: steps.into_iter().collect(),
                candidates: Vec::new(),
                explicit: false,
            }
        }
    }

    impl Execute for Scripted {
        type Output = ();

        fn method(&self) -> ServiceMethod {
            service::CRYPTO_GET_BALANCE
        }

        fn candidates(&self) -> &[AccountId] {
            &self.candidates
        }

        fn explicit_nodes(&self) -> bool {
            self.explicit
        }

        fn preassigned_node(&self) -> Option<AccountId> {
            self.candidates.first().copied()
        }

        fn transaction_id(&self) -> Option<TransactionId> {
            None
        }

        fn make_request(&mut self, _node: AccountId) -> Result<Vec<u8>, Error> {
            Ok(Vec::new())
        }

        fn classify(
            &mut self,
            _node: AccountId,
            _response: &[u8],
            _policy: &StatusPolicy,
        ) -> Verdict<()> {
            let status = |status| Error::RetryablePrecheck {
                status,
                transaction_id: None,
            };
            match self.steps.pop_front() {
                Some(Step::Accept) | None => Verdict::Accepted(()),
                Some(Step::Retry) => Verdict::Retry(status(Status::Busy)),
                Some(Step::NotReady) => Verdict::NotReady(status(Status::Unknown)),
                Some(Step::Fatal) => Verdict::Fatal(Error::PrecheckStatus {
                    status: Status::InvalidSignature,
                    transaction_id: None,
                }),
            }
        }
    }

    fn minute() -> Deadline {
        Deadline::after(Duration::from_secs(60))
    }

    fn client(nodes: u64) -> Client {
        let network = Network::new(
            (0..nodes).map(|i| (AccountId::from_num(3 + i), vec![format!("node{i}:50211")])),
        );
        Client::new(network, Arc::new(EchoTransport))
    }

    #[tokio::test(start_paused = true)]
    async fn sleeps_match_elapsed_time() {
        let client = client(1);
        let mut request = Scripted::new([Step::Retry, Step::Retry, Step::Accept]);
        let mut report = ExecutionReport::default();
        let started = Instant::now();

        execute(&client, &mut request, minute(), &mut report)
            .await
            .expect("accepted");

        assert_eq!(report.attempt_count(), 3);
        assert_eq!(report.count(AttemptOutcome::Retryable), 2);
        assert_eq!(report.sleeps.len(), 2);
        assert_eq!(started.elapsed(), report.total_sleep());
    }

    #[tokio::test(start_paused = true)]
    async fn not_ready_polls_at_fixed_interval_without_penalty() {
        let client = client(1);
        let mut request = Scripted::new([Step::NotReady, Step::NotReady, Step::Accept]);
        let mut report = ExecutionReport::default();

        execute(&client, &mut request, minute(), &mut report)
            .await
            .expect("accepted");

        let interval = ExecutionConfig::default().receipt_poll_interval;
        assert_eq!(report.sleeps, vec![interval, interval]);
        let health = client
            .network()
            .health(&AccountId::from_num(3))
            .expect("node");
        assert_eq!(health.total_failures, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn fatal_returns_without_sleeping() {
        let client = client(2);
        let mut request = Scripted::new([Step::Fatal]);
        let mut report = ExecutionReport::default();

        let err = execute(&client, &mut request, minute(), &mut report)
            .await
            .expect_err("fatal");
        assert_eq!(err.status(), Some(Status::InvalidSignature));
        assert_eq!(report.attempt_count(), 1);
        assert!(report.sleeps.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn stops_at_max_attempts() {
        let client = client(3).with_execution_config(ExecutionConfig {
            max_attempts: 4,
            ..ExecutionConfig::default()
        });
        let mut request = Scripted::new((0..10).map(|_| Step::Retry));
        let mut report = ExecutionReport::default();

        let err = execute(&client, &mut request, minute(), &mut report)
            .await
            .expect_err("exhausted");
        assert!(matches!(err, Error::Exhausted { attempts: 4, .. }));
        assert_eq!(err.status(), Some(Status::Busy));
        assert_eq!(report.sleeps.len(), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn backoff_beyond_deadline_exhausts_without_sleeping() {
        let client = client(1);
        let mut request = Scripted::new((0..10).map(|_| Step::Retry));
        let mut report = ExecutionReport::default();
        let deadline = Deadline::after(Duration::from_millis(100));

        let err = execute(&client, &mut request, deadline, &mut report)
            .await
            .expect_err("exhausted");
        assert!(matches!(err, Error::Exhausted { attempts: 1, .. }));
        assert!(report.sleeps.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn retries_rotate_away_from_the_failed_node() {
        let client = client(3);
        let mut request = Scripted::new([Step::Retry, Step::Accept]);
        let mut report = ExecutionReport::default();

        execute(&client, &mut request, minute(), &mut report)
            .await
            .expect("accepted");
        let nodes = report.nodes();
        assert_eq!(nodes.len(), 2);
        assert_ne!(nodes[0], nodes[1]);
    }

    #[tokio::test]
    async fn elapsed_deadline_is_timed_out() {
        let client = client(1);
        let mut request = Scripted::new([Step::Accept]);
        let mut report = ExecutionReport::default();

        let err = execute(&client, &mut request, Deadline::after(Duration::ZERO), &mut report)
            .await
            .expect_err("no time left");
        assert_eq!(err, Error::TimedOut);
    }
}
