//! Validated inputs for post writes

use validator::{Validate, ValidationError};

use super::models::ImageUpload;

/// Input for publishing a new post
#[derive(Debug, Clone, Validate)]
pub struct NewPost {
    #[validate(length(min = 1))]
    pub creator_id: String,
    #[validate(length(min = 5, max = 2200))]
    pub caption: String,
    /// Exactly the first file is uploaded
    #[validate(custom(function = "validate_files"))]
    pub files: Vec<ImageUpload>,
    #[validate(length(min = 2, max = 100))]
    pub location: Option<String>,
    /// Raw comma separated tag input, e.g. "art, travel"
    pub tags: String,
}

/// Input for editing an existing post
#[derive(Debug, Clone, Validate)]
pub struct PostUpdate {
    #[validate(length(min = 1))]
    pub post_id: String,
    #[validate(length(min = 5, max = 2200))]
    pub caption: String,
    /// Empty keeps the current image
    #[validate(custom(function = "validate_optional_files"))]
    pub files: Vec<ImageUpload>,
    #[validate(length(min = 1))]
    pub image_id: String,
    pub image_url: String,
    #[validate(length(min = 2, max = 100))]
    pub location: Option<String>,
    pub tags: String,
}

impl NewPost {
    pub fn parsed_tags(&self) -> Vec<String> {
        parse_tags(&self.tags)
    }
}

impl PostUpdate {
    pub fn parsed_tags(&self) -> Vec<String> {
        parse_tags(&self.tags)
    }

    pub fn replaces_image(&self) -> bool {
        !self.files.is_empty()
    }
}

/// Split tag input on commas after removing all whitespace; empty tags are dropped
pub fn parse_tags(raw: &str) -> Vec<String> {
    let compact: String = raw.chars().filter(|c| !c.is_whitespace()).collect();
    compact
        .split(',')
        .filter(|tag| !tag.is_empty())
        .map(str::to_string)
        .collect()
}

fn validate_files(files: &[ImageUpload]) -> Result<(), ValidationError> {
    match files.first() {
        None => Err(ValidationError::new("file_required")),
        Some(file) if file.bytes.is_empty() => Err(ValidationError::new("file_empty")),
        Some(_) => Ok(()),
    }
}

fn validate_optional_files(files: &[ImageUpload]) -> Result<(), ValidationError> {
    if files.is_empty() {
        return Ok(());
    }
    validate_files(files)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn image() -> ImageUpload {
        ImageUpload {
            name: "cat.png".into(),
            mime_type: "image/png".into(),
            bytes: vec![1, 2, 3],
        }
    }

    fn new_post() -> NewPost {
        NewPost {
            creator_id: "u1".into(),
            caption: "A quiet morning".into(),
            files: vec![image()],
            location: Some("Lisbon".into()),
            tags: "art, travel".into(),
        }
    }

    #[test]
    fn test_parse_tags() {
        assert_eq!(parse_tags("art, travel ,  food"), vec!["art", "travel", "food"]);
        assert_eq!(parse_tags("new york,la"), vec!["newyork", "la"]);
        assert_eq!(parse_tags(" , ,"), Vec::<String>::new());
        assert!(parse_tags("").is_empty());
    }

    #[test]
    fn test_valid_new_post() {
        assert!(new_post().validate().is_ok());
        assert_eq!(new_post().parsed_tags(), vec!["art", "travel"]);
    }

    #[test]
    fn test_caption_bounds() {
        let mut post = new_post();
        post.caption = "hey".into();
        let errors = post.validate().unwrap_err();
        assert!(errors.field_errors().contains_key("caption"));

        post.caption = "x".repeat(2201);
        assert!(post.validate().is_err());

        post.caption = "x".repeat(2200);
        assert!(post.validate().is_ok());
    }

    #[test]
    fn test_file_is_required() {
        let mut post = new_post();
        post.files.clear();
        let errors = post.validate().unwrap_err();
        assert!(errors.field_errors().contains_key("files"));

        post.files = vec![ImageUpload {
            bytes: Vec::new(),
            ..image()
        }];
        assert!(post.validate().is_err());
    }

    #[test]
    fn test_file_errors_carry_metadata_without_bytes() {
        let mut post = new_post();
        post.files = vec![ImageUpload {
            bytes: Vec::new(),
            ..image()
        }];

        let errors = post.validate().unwrap_err();
        let field = &errors.field_errors()["files"][0];
        assert_eq!(field.code, "file_empty");
        let value = &field.params["value"][0];
        assert_eq!(value["name"], "cat.png");
        assert!(value.get("bytes").is_none());

        post.files.clear();
        let errors = post.validate().unwrap_err();
        assert_eq!(errors.field_errors()["files"][0].code, "file_required");
    }

    #[test]
    fn test_location_is_optional_but_bounded() {
        let mut post = new_post();
        post.location = None;
        assert!(post.validate().is_ok());

        post.location = Some("x".repeat(101));
        assert!(post.validate().is_err());
    }

    #[test]
    fn test_update_without_new_file() {
        let update = PostUpdate {
            post_id: "p1".into(),
            caption: "Edited caption".into(),
            files: Vec::new(),
            image_id: "f1".into(),
            image_url: "https://cdn/f1".into(),
            location: None,
            tags: String::new(),
        };

        assert!(update.validate().is_ok());
        assert!(!update.replaces_image());
    }
}
