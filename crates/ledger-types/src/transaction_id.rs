//! Transaction identifiers: payer account plus valid-start timestamp.

use std::{fmt, str::FromStr, time::Duration};

use rand::Rng;

use crate::{error::ValidationError, ids::AccountId, time::Timestamp};

/// Valid-start is back-dated by a random amount in this range so that a
/// client clock running slightly ahead of the network is still accepted.
const BACKDATE_MIN_NANOS: u64 = 5_000_000_000;
const BACKDATE_MAX_NANOS: u64 = 8_000_000_000;

/// Identifies a transaction network-wide. Doubles as the idempotency key for
/// resubmission: the network rejects a second transaction with the same id.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct TransactionId {
    pub account_id: AccountId,
    pub valid_start: Timestamp,
    pub scheduled: bool,
    pub nonce: Option<i32>,
}

impl TransactionId {
    pub const fn new(account_id: AccountId, valid_start: Timestamp) -> Self {
        Self {
            account_id,
            valid_start,
            scheduled: false,
            nonce: None,
        }
    }

    /// Fresh id for `payer` with a back-dated valid start.
    pub fn generate(payer: AccountId) -> Self {
        let backdate = rand::thread_rng().gen_range(BACKDATE_MIN_NANOS..BACKDATE_MAX_NANOS);
        Self::new(payer, Timestamp::now().minus(Duration::from_nanos(backdate)))
    }

    /// Id of the `offset`-th derived transaction (used for chunk `offset` of a chunked request).
    pub fn with_nanos_offset(&self, offset: u64) -> Self {
        Self {
            valid_start: self.valid_start.plus_nanos(offset),
            ..*self
        }
    }

    pub fn scheduled(mut self, scheduled: bool) -> Self {
        self.scheduled = scheduled;
        self
    }

    pub fn with_nonce(mut self, nonce: i32) -> Self {
        self.nonce = Some(nonce);
        self
    }
}

impl fmt::Display for TransactionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}@{}", self.account_id, self.valid_start)?;
        if self.scheduled {
            f.write_str("?scheduled")?;
        }
        if let Some(nonce) = self.nonce {
            write!(f, "/{nonce}")?;
        }
        Ok(())
    }
}

impl fmt::Debug for TransactionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "TransactionId({self})")
    }
}

impl FromStr for TransactionId {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let parse_err = || ValidationError::Parse {
            kind: "TransactionId",
            input: s.to_string(),
        };
        let (rest, nonce) = match s.rsplit_once('/') {
            Some((rest, nonce)) => (rest, Some(nonce.parse().map_err(|_| parse_err())?)),
            None => (s, None),
        };
        let (rest, scheduled) = match rest.strip_suffix("?scheduled") {
            Some(rest) => (rest, true),
            None => (rest, false),
        };
        let (account, start) = rest.split_once('@').ok_or_else(parse_err)?;
        let (seconds, nanos) = start.split_once('.').ok_or_else(parse_err)?;
        let valid_start = Timestamp::new(
            seconds.parse().map_err(|_| parse_err())?,
            nanos.parse().map_err(|_| parse_err())?,
        );
        Ok(Self {
            account_id: account.parse()?,
            valid_start,
            scheduled,
            nonce,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_and_parse_agree() {
        let id = TransactionId::new(AccountId::from_num(2), Timestamp::new(1_700_000_000, 42))
            .scheduled(true)
            .with_nonce(3);
        let text = id.to_string();
        assert_eq!(text, "0.0.2@1700000000.000000042?scheduled/3");
        assert_eq!(text.parse::<TransactionId>().expect("parse"), id);
    }

    #[test]
    fn generated_ids_are_backdated() {
        let before = Timestamp::now();
        let id = TransactionId::generate(AccountId::from_num(2));
        assert!(id.valid_start < before);
        assert!(id.valid_start > before.minus(Duration::from_secs(9)));
    }

    #[test]
    fn nanos_offset_keeps_payer_and_flags() {
        let id = TransactionId::new(AccountId::from_num(7), Timestamp::new(5, 0));
        let chunk = id.with_nanos_offset(3);
        assert_eq!(chunk.account_id, id.account_id);
        assert_eq!(chunk.valid_start, Timestamp::new(5, 3));
        assert_ne!(chunk, id);
    }
}
