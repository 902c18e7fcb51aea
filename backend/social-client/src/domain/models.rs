use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::{ClientError, ClientResult};

/// Generic record as returned by the remote document store
///
/// Relationship attributes come back either as a bare id string or as the
/// embedded related document; the accessors below accept both.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Document {
    #[serde(rename = "$id")]
    pub id: String,
    #[serde(rename = "$collectionId", default)]
    pub collection_id: String,
    #[serde(rename = "$createdAt", default)]
    pub created_at: DateTime<Utc>,
    #[serde(rename = "$updatedAt", default)]
    pub updated_at: DateTime<Utc>,
    #[serde(flatten)]
    pub fields: Map<String, Value>,
}

impl Document {
    pub fn str_field(&self, name: &str) -> Option<&str> {
        self.fields.get(name).and_then(Value::as_str)
    }

    /// String attribute that must be present
    pub fn required_str(&self, name: &str) -> ClientResult<String> {
        self.str_field(name).map(str::to_string).ok_or_else(|| {
            ClientError::InvalidDocument(format!(
                "document {} is missing attribute '{}'",
                self.id, name
            ))
        })
    }

    pub fn string_list(&self, name: &str) -> Vec<String> {
        match self.fields.get(name) {
            Some(Value::Array(items)) => items
                .iter()
                .filter_map(|v| v.as_str().map(str::to_string))
                .collect(),
            _ => Vec::new(),
        }
    }

    /// Id of a to-one relationship
    pub fn relation_id(&self, name: &str) -> Option<String> {
        self.fields.get(name).and_then(related_id)
    }

    /// Ids of a to-many relationship, in stored order
    pub fn relation_ids(&self, name: &str) -> Vec<String> {
        match self.fields.get(name) {
            Some(Value::Array(items)) => items.iter().filter_map(related_id).collect(),
            _ => Vec::new(),
        }
    }

    /// Embedded documents of a to-many relationship; bare ids are skipped
    pub fn related_documents(&self, name: &str) -> Vec<Document> {
        match self.fields.get(name) {
            Some(Value::Array(items)) => items
                .iter()
                .filter(|v| v.is_object())
                .filter_map(|v| serde_json::from_value(v.clone()).ok())
                .collect(),
            _ => Vec::new(),
        }
    }
}

/// Extract the id from a relationship value: `"id"` or `{"$id": "id", ...}`
pub fn related_id(value: &Value) -> Option<String> {
    match value {
        Value::String(id) => Some(id.clone()),
        Value::Object(map) => map.get("$id").and_then(Value::as_str).map(str::to_string),
        _ => None,
    }
}

/// Set of user ids that liked a post
///
/// Keeps first-like order for display; a user id appears at most once.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct LikerSet(Vec<String>);

impl LikerSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn contains(&self, user_id: &str) -> bool {
        self.0.iter().any(|id| id == user_id)
    }

    /// Returns false if the user was already present
    pub fn insert(&mut self, user_id: &str) -> bool {
        if self.contains(user_id) {
            return false;
        }
        self.0.push(user_id.to_string());
        true
    }

    /// Returns false if the user was not present
    pub fn remove(&mut self, user_id: &str) -> bool {
        let before = self.0.len();
        self.0.retain(|id| id != user_id);
        self.0.len() != before
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &String> {
        self.0.iter()
    }

    pub fn to_vec(&self) -> Vec<String> {
        self.0.clone()
    }
}

impl FromIterator<String> for LikerSet {
    fn from_iter<I: IntoIterator<Item = String>>(iter: I) -> Self {
        let mut set = LikerSet::new();
        for id in iter {
            set.insert(&id);
        }
        set
    }
}

impl<'a> FromIterator<&'a str> for LikerSet {
    fn from_iter<I: IntoIterator<Item = &'a str>>(iter: I) -> Self {
        iter.into_iter().map(str::to_string).collect()
    }
}

/// Post entity
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Post {
    pub id: String,
    pub creator_id: String,
    pub caption: String,
    pub image_id: String,
    pub image_url: String,
    pub location: Option<String>,
    pub tags: Vec<String>,
    pub likes: LikerSet,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl TryFrom<Document> for Post {
    type Error = ClientError;

    fn try_from(doc: Document) -> ClientResult<Self> {
        let creator_id = doc.relation_id("creator").ok_or_else(|| {
            ClientError::InvalidDocument(format!("post {} has no creator", doc.id))
        })?;

        Ok(Post {
            creator_id,
            caption: doc.str_field("caption").unwrap_or_default().to_string(),
            image_id: doc.required_str("imageId")?,
            image_url: doc.str_field("imageUrl").unwrap_or_default().to_string(),
            location: doc
                .str_field("location")
                .filter(|l| !l.is_empty())
                .map(str::to_string),
            tags: doc.string_list("tags"),
            likes: doc.relation_ids("likes").into_iter().collect(),
            created_at: doc.created_at,
            updated_at: doc.updated_at,
            id: doc.id,
        })
    }
}

/// Bookmark linking one user to one post
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SaveRelation {
    pub id: String,
    pub user_id: String,
    pub post_id: String,
}

impl TryFrom<Document> for SaveRelation {
    type Error = ClientError;

    fn try_from(doc: Document) -> ClientResult<Self> {
        let user_id = doc
            .relation_id("user")
            .ok_or_else(|| ClientError::InvalidDocument(format!("save {} has no user", doc.id)))?;
        let post_id = doc
            .relation_id("post")
            .ok_or_else(|| ClientError::InvalidDocument(format!("save {} has no post", doc.id)))?;

        Ok(SaveRelation {
            id: doc.id,
            user_id,
            post_id,
        })
    }
}

/// User profile document, with the save relations embedded in it
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UserProfile {
    pub id: String,
    pub account_id: String,
    pub name: String,
    pub username: String,
    pub email: String,
    pub image_url: String,
    pub bio: String,
    pub saves: Vec<SaveRelation>,
    pub liked_post_ids: Vec<String>,
}

impl UserProfile {
    /// The save relation for a post, if this user bookmarked it
    pub fn saved_relation(&self, post_id: &str) -> Option<&SaveRelation> {
        self.saves.iter().find(|s| s.post_id == post_id)
    }
}

impl TryFrom<Document> for UserProfile {
    type Error = ClientError;

    fn try_from(doc: Document) -> ClientResult<Self> {
        let user_id = doc.id.clone();
        let saves = doc
            .related_documents("save")
            .into_iter()
            .map(|mut save| {
                // the back-reference is usually omitted when embedded under its user
                if save.relation_id("user").is_none() {
                    save.fields
                        .insert("user".to_string(), Value::String(user_id.clone()));
                }
                SaveRelation::try_from(save)
            })
            .collect::<ClientResult<Vec<_>>>()?;

        Ok(UserProfile {
            account_id: doc.str_field("accountId").unwrap_or_default().to_string(),
            name: doc.str_field("name").unwrap_or_default().to_string(),
            username: doc.str_field("username").unwrap_or_default().to_string(),
            email: doc.str_field("email").unwrap_or_default().to_string(),
            image_url: doc.str_field("imageUrl").unwrap_or_default().to_string(),
            bio: doc.str_field("bio").unwrap_or_default().to_string(),
            liked_post_ids: doc.relation_ids("liked"),
            saves,
            id: doc.id,
        })
    }
}

/// Uploaded file as returned by the file store
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileRef {
    #[serde(rename = "$id")]
    pub id: String,
    #[serde(rename = "bucketId")]
    pub bucket_id: String,
    pub name: String,
    #[serde(rename = "sizeOriginal", default)]
    pub size: u64,
    #[serde(rename = "mimeType", default)]
    pub mime_type: String,
}

/// Binary payload picked by the user for a post
///
/// Serializes without its bytes, so validation errors can name the file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ImageUpload {
    pub name: String,
    #[serde(rename = "mimeType")]
    pub mime_type: String,
    #[serde(skip)]
    pub bytes: Vec<u8>,
}
