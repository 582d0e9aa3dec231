//! Contact form request and response types.

use serde::{Deserialize, Serialize};
use validator::Validate;

use crate::email::ContactMessage;

/// Contact form submission.
#[derive(Debug, Clone, Deserialize, Validate)]
pub struct ContactForm {
    #[validate(length(min = 1, max = 100, message = "Name is required (max 100 characters)"))]
    pub name: String,
    #[validate(email(message = "A valid email address is required"))]
    pub email: String,
    #[validate(length(min = 1, max = 5000, message = "Message is required (max 5000 characters)"))]
    pub message: String,
}

impl ContactForm {
    /// Trims surrounding whitespace from every field.
    #[must_use]
    pub fn trimmed(self) -> Self {
        Self {
            name: self.name.trim().to_string(),
            email: self.email.trim().to_string(),
            message: self.message.trim().to_string(),
        }
    }
}

impl From<ContactForm> for ContactMessage {
    fn from(form: ContactForm) -> Self {
        Self {
            name: form.name,
            email: form.email,
            message: form.message,
        }
    }
}

/// Successful submission response.
#[derive(Debug, Serialize)]
pub struct ContactResponse {
    pub success: bool,
    pub message: &'static str,
}
