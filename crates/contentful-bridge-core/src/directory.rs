//! # Contentful Directory Interfaces
//!
//! Lookups against the Contentful organization directory: space display
//! names and user emails.
//!
//! Both are point-to-point calls with no retry and no fallback. A failure
//! aborts the request before any analytics row is written.

use async_trait::async_trait;

/// Resolves a space identifier to the space's display name
#[async_trait]
pub trait SpaceDirectory: Send + Sync {
    /// # Errors
    /// - `DirectoryError::SpaceLookupFailed` - unknown space or failed call
    async fn space_name(&self, space_id: &str) -> Result<String, DirectoryError>;
}

/// Resolves a user identifier to a human-readable identity (email)
#[async_trait]
pub trait IdentityResolver: Send + Sync {
    /// # Errors
    /// - `DirectoryError::UserLookupFailed` - unknown organization, unknown
    ///   user, or failed call
    async fn resolve_email(
        &self,
        organization_id: &str,
        user_id: &str,
    ) -> Result<String, DirectoryError>;
}

/// Errors returned by directory lookups
#[derive(Debug, thiserror::Error)]
pub enum DirectoryError {
    #[error("Space lookup failed for {space_id}: {message}")]
    SpaceLookupFailed {
        space_id: String,
        status: Option<u16>,
        message: String,
    },

    #[error("User lookup failed for {user_id} in organization {organization_id}: {message}")]
    UserLookupFailed {
        organization_id: String,
        user_id: String,
        status: Option<u16>,
        message: String,
    },
}

impl DirectoryError {
    /// HTTP status returned by the directory, when the call got that far
    pub fn status(&self) -> Option<u16> {
        match self {
            Self::SpaceLookupFailed { status, .. } | Self::UserLookupFailed { status, .. } => {
                *status
            }
        }
    }
}
