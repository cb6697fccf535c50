//! Form schemas for the two user-submitted bodies of text.
//!
//! Both forms share one rule: text that is empty after trimming is rejected
//! with a user-facing message. Group and image references are checked against
//! the database / declared content type by the handlers.

pub const EMPTY_POST_ERROR: &str = "What is an empty post for?";
pub const EMPTY_COMMENT_ERROR: &str = "What is an empty comment for?";

/// Shared rule: stripped, lower-cased text equal to "" is invalid.
fn validate_text(raw: &str, message: &'static str) -> Result<String, &'static str> {
    let text = raw.trim();
    if text.to_lowercase().is_empty() {
        Err(message)
    } else {
        Ok(text.to_string())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PostForm {
    pub text: String,
    /// Group id as submitted; existence is checked against the database.
    pub group_id: Option<String>,
}

impl PostForm {
    pub fn validate(text: &str, group_id: Option<String>) -> Result<Self, &'static str> {
        let text = validate_text(text, EMPTY_POST_ERROR)?;
        let group_id = group_id.filter(|g| !g.trim().is_empty());
        Ok(Self { text, group_id })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommentForm {
    pub text: String,
}

impl CommentForm {
    pub fn validate(text: &str) -> Result<Self, &'static str> {
        let text = validate_text(text, EMPTY_COMMENT_ERROR)?;
        Ok(Self { text })
    }
}

/// An uploaded file qualifies as an image if either the declared multipart
/// content type or the type guessed from the file name is `image/*`.
pub fn is_image_upload(content_type: Option<&str>, file_name: &str) -> bool {
    if let Some(ct) = content_type {
        if ct.starts_with("image/") {
            return true;
        }
    }
    mime_guess::from_path(file_name)
        .first()
        .map(|m| m.type_() == mime_guess::mime::IMAGE)
        .unwrap_or(false)
}
