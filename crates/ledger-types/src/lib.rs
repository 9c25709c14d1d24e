pub mod error;
pub mod hbar;
pub mod ids;
pub mod key;
pub mod status;
pub mod time;
pub mod traits;
pub mod transaction_id;

pub use error::{CryptoError, ValidationError};
pub use hbar::{Hbar, TINYBARS_PER_HBAR};
pub use ids::{
    AccountAlias, AccountId, ContractId, EvmAddress, FileId, ScheduleId, TokenId, TopicId,
    TransactionHash,
};
pub use key::{Key, KeyAlgorithm, PublicKey};
pub use status::Status;
pub use time::Timestamp;
pub use traits::Signer;
pub use transaction_id::TransactionId;
