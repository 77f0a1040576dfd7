use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

pub type AccountId = Uuid;

/// The holder of a set of transactions. Settlement only uses its id as a scan key.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Account {
    pub id: AccountId,
    pub name: String,
    /// Identity document of the holder, unique across accounts
    pub document_number: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Account {
    pub fn new(name: impl Into<String>, document_number: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            name: name.into(),
            document_number: document_number.into(),
            created_at: now,
            updated_at: now,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_account() {
        let account = Account::new("Ada Lovelace", "12121231232323");

        assert_eq!(account.name, "Ada Lovelace");
        assert_eq!(account.document_number, "12121231232323");
        assert_eq!(account.created_at, account.updated_at);
    }
}
