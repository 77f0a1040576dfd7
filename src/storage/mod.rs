mod repository;
mod scope;

pub use repository::*;
pub use scope::*;

/// SQL migration for accounts
pub const MIGRATION_001_ACCOUNTS: &str = include_str!("migrations/001_accounts.sql");

/// SQL migration for transactions and the sequence counter
pub const MIGRATION_002_TRANSACTIONS: &str = include_str!("migrations/002_transactions.sql");
