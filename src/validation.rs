//! Local input validation
//!
//! Sign-in, sign-up and group forms are checked here before anything is
//! sent to the backend. A form that fails validation never produces a request.

use crate::api::{CreateGroupRequest, SignInRequest, SignUpRequest};
use thiserror::Error;

/// Length limits applied to user input, counted in characters after trimming
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InputLimits {
    /// Maximum email length
    pub max_email_len: usize,
    /// Maximum password length (also applies to the confirmation field)
    pub max_password_len: usize,
    /// Maximum display name length
    pub max_name_len: usize,
    /// Minimum password length on sign-up
    pub min_password_len: usize,
}

impl Default for InputLimits {
    fn default() -> Self {
        Self {
            max_email_len: 40,
            max_password_len: 30,
            max_name_len: 30,
            min_password_len: 7,
        }
    }
}

/// Validation failures, surfaced locally and never sent to the backend
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ValidationError {
    /// A required field was empty after trimming
    #[error("{0} is required")]
    Missing(&'static str),

    /// A field exceeded its configured maximum
    #[error("Maximum input length exceeded")]
    InputTooLong {
        /// Name of the offending field
        field: &'static str,
    },

    /// Password and confirmation differ
    #[error("Passwords do not match")]
    PasswordMismatch,

    /// Password is shorter than the configured minimum
    #[error("Password must be at least {min} characters long")]
    PasswordTooShort {
        /// Minimum accepted length
        min: usize,
    },

    /// A group needs more members than were selected
    #[error("A group needs at least {min} other members")]
    NotEnoughMembers {
        /// Minimum number of members besides the creator
        min: usize,
    },
}

/// Raw sign-in form input
#[derive(Debug, Clone, Default)]
pub struct SignInForm {
    /// Email as typed
    pub email: String,
    /// Password as typed
    pub password: String,
}

/// Raw sign-up form input
#[derive(Debug, Clone, Default)]
pub struct SignUpForm {
    /// Display name as typed
    pub name: String,
    /// Email as typed
    pub email: String,
    /// Password as typed
    pub password: String,
    /// Password confirmation as typed
    pub confirm_password: String,
}

/// Raw group creation input
#[derive(Debug, Clone, Default)]
pub struct GroupForm {
    /// Group name as typed
    pub name: String,
    /// Ids of the members to add besides the creator
    pub member_ids: Vec<String>,
}

/// Minimum number of members (besides the creator) in a new group
pub const MIN_GROUP_MEMBERS: usize = 2;

fn check_len(value: &str, max: usize, field: &'static str) -> Result<(), ValidationError> {
    if value.chars().count() > max {
        Err(ValidationError::InputTooLong { field })
    } else {
        Ok(())
    }
}

fn require(value: &str, field: &'static str) -> Result<(), ValidationError> {
    if value.is_empty() {
        Err(ValidationError::Missing(field))
    } else {
        Ok(())
    }
}

impl SignInForm {
    /// Trim and validate the form, producing the request to send
    pub fn validate(&self, limits: &InputLimits) -> Result<SignInRequest, ValidationError> {
        let email = self.email.trim();
        let password = self.password.trim();

        check_len(password, limits.max_password_len, "password")?;
        check_len(email, limits.max_email_len, "email")?;
        require(email, "Email")?;
        require(password, "Password")?;

        Ok(SignInRequest {
            email: email.to_string(),
            password: password.to_string(),
        })
    }
}

impl SignUpForm {
    /// Trim and validate the form, producing the request to send
    ///
    /// Checks run in a fixed order: lengths, confirmation match, then
    /// minimum password length.
    pub fn validate(&self, limits: &InputLimits) -> Result<SignUpRequest, ValidationError> {
        let name = self.name.trim();
        let email = self.email.trim();
        let password = self.password.trim();
        let confirm = self.confirm_password.trim();

        check_len(password, limits.max_password_len, "password")?;
        check_len(email, limits.max_email_len, "email")?;
        check_len(name, limits.max_name_len, "name")?;
        check_len(confirm, limits.max_password_len, "confirm_password")?;

        require(name, "Name")?;
        require(email, "Email")?;

        if password != confirm {
            return Err(ValidationError::PasswordMismatch);
        }
        if password.chars().count() < limits.min_password_len {
            return Err(ValidationError::PasswordTooShort {
                min: limits.min_password_len,
            });
        }

        Ok(SignUpRequest {
            name: name.to_string(),
            email: email.to_string(),
            password: password.to_string(),
        })
    }
}

impl GroupForm {
    /// Trim and validate the form, producing the request to send
    pub fn validate(&self, limits: &InputLimits) -> Result<CreateGroupRequest, ValidationError> {
        let name = self.name.trim();
        require(name, "Group name")?;
        check_len(name, limits.max_name_len, "group name")?;

        let mut member_ids: Vec<String> = Vec::with_capacity(self.member_ids.len());
        for id in &self.member_ids {
            let id = id.trim();
            if !id.is_empty() && !member_ids.iter().any(|m| m == id) {
                member_ids.push(id.to_string());
            }
        }
        if member_ids.len() < MIN_GROUP_MEMBERS {
            return Err(ValidationError::NotEnoughMembers {
                min: MIN_GROUP_MEMBERS,
            });
        }

        Ok(CreateGroupRequest {
            name: name.to_string(),
            member_ids,
        })
    }
}
