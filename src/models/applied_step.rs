use chrono::Utc;
use serde::{Deserialize, Serialize};

/// One row of the migrations ledger.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AppliedStep {
    #[serde(rename = "_id")]
    pub id: String,

    pub description: String,
    pub applied_at: i64,
}

impl AppliedStep {
    pub fn now(id: &str, description: &str) -> Self {
        AppliedStep {
            id: id.to_string(),
            description: description.to_string(),
            applied_at: Utc::now().timestamp(),
        }
    }
}
