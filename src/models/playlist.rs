use mongodb::bson::{oid::ObjectId, Document};
use serde::{Deserialize, Serialize};

/// Playlists carry no validator; only `owner_id` and `tags` are indexed.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Playlist {
    #[serde(rename = "_id", default, skip_serializing_if = "Option::is_none")]
    pub id: Option<ObjectId>,

    pub owner_id: i32,

    #[serde(default)]
    pub name: Option<String>,

    #[serde(default)]
    pub tags: Vec<String>,

    // nested track entries, shape left to the application
    #[serde(default)]
    pub tracks: Vec<Document>,
}
