//! Names of the entries in the field tables of bodies, queries and responses.

pub const TRANSFERS: &str = "transfers";
pub const MESSAGE: &str = "message";
pub const CONTENTS: &str = "contents";
pub const TOPIC_ID: &str = "topic_id";
pub const FILE_ID: &str = "file_id";
pub const TOKEN_ID: &str = "token_id";
pub const SCHEDULE_ID: &str = "schedule_id";
pub const ACCOUNT_ID: &str = "account_id";
pub const KEY: &str = "key";
pub const AMOUNT: &str = "amount";
pub const INITIAL_BALANCE: &str = "initial_balance";
pub const AUTO_RENEW_PERIOD: &str = "auto_renew_period";
pub const TRANSACTION_ID: &str = "transaction_id";
pub const INCLUDE_CHILDREN: &str = "include_children";
pub const INCLUDE_DUPLICATES: &str = "include_duplicates";
pub const BALANCE: &str = "balance";
