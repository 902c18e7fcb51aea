pub mod models;
pub mod validation;

pub use models::{
    related_id, Document, FileRef, ImageUpload, LikerSet, Post, SaveRelation, UserProfile,
};
pub use validation::{parse_tags, NewPost, PostUpdate};
