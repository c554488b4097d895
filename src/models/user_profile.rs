use mongodb::bson::{oid::ObjectId, Document};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserProfile {
    #[serde(rename = "_id", default, skip_serializing_if = "Option::is_none")]
    pub id: Option<ObjectId>,

    // matches the relational user id, stored as a 32-bit int
    pub user_id: i32,

    pub preferences: Preferences,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub listening_history_summary: Option<Vec<Document>>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Preferences {
    pub preferred_genres: Vec<String>,
    pub autoplay_enabled: bool,
}

impl UserProfile {
    pub fn new(user_id: i32, preferred_genres: Vec<String>, autoplay_enabled: bool) -> Self {
        UserProfile {
            id: None,
            user_id,
            preferences: Preferences {
                preferred_genres,
                autoplay_enabled,
            },
            listening_history_summary: None,
        }
    }
}
