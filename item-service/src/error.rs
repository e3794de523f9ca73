//! Error types for the item service

use bytes::Bytes;
use http_body_util::Full;
use hyper::{Response, StatusCode};
use thiserror::Error;
use tracing::error;

use platform_core::{response, CoreError};

#[derive(Error, Debug)]
pub enum ItemError {
    #[error("Item not found")]
    ItemNotFound,

    #[error("Item not owned by caller")]
    ItemNotOwned,

    #[error("Field '{0}' is read-only")]
    ReadOnlyField(String),

    #[error("{0}")]
    Validation(String),

    #[error("Bad request: {0}")]
    BadRequest(String),

    #[error("Unknown link type '{0}'")]
    UnknownLinkType(String),

    #[error("Link type '{0}' is an inverse and cannot be created directly")]
    InverseLinkType(String),

    #[error("Link target not found")]
    LinkTargetNotFound,

    #[error("Item type '{0}' is not allowed as origin of this link type")]
    BadLinkOriginType(String),

    #[error("Item type '{0}' is not allowed as target of this link type")]
    BadLinkTargetType(String),

    #[error("Link type '{0}' allows only one link per origin")]
    LinkTypeRequiresUniqueOrigin(String),

    #[error("Link not found")]
    LinkNotFound,

    #[error("Link type '{0}' is not allowed for this item type")]
    DisallowedLinkType(String),

    #[error("Item collection not found")]
    ItemCollectionNotFound,

    #[error("Item collection not owned by caller")]
    ItemCollectionNotOwned,

    #[error("Item is not in this collection")]
    ItemNotInCollection,

    #[error("Ownership claim not found")]
    ClaimNotFound,

    #[error("Unauthorized")]
    Unauthorized,

    #[error("Forbidden")]
    Forbidden,

    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Could not allocate a unique slug for '{0}'")]
    SlugExhausted(String),

    #[error("Schema error: {0}")]
    Schema(String),

    #[error("Database error: {0}")]
    Database(String),

    #[error(transparent)]
    Core(#[from] CoreError),
}

impl From<diesel::result::Error> for ItemError {
    fn from(e: diesel::result::Error) -> Self {
        use diesel::result::{DatabaseErrorKind, Error};
        match e {
            Error::DatabaseError(DatabaseErrorKind::UniqueViolation, info) => {
                ItemError::Conflict(info.message().to_string())
            }
            other => ItemError::Database(other.to_string()),
        }
    }
}

impl From<serde_json::Error> for ItemError {
    fn from(e: serde_json::Error) -> Self {
        ItemError::BadRequest(format!("Invalid JSON: {}", e))
    }
}

/// Map an error to a `{"message": ...}` response
pub fn error_response(err: ItemError) -> Response<Full<Bytes>> {
    match &err {
        ItemError::ItemNotFound
        | ItemError::LinkNotFound
        | ItemError::ItemCollectionNotFound
        | ItemError::ItemNotInCollection
        | ItemError::ClaimNotFound
        | ItemError::LinkTargetNotFound => response::not_found(&err.to_string()),
        ItemError::Core(CoreError::NotFound(msg)) => response::not_found(msg),

        ItemError::ItemNotOwned | ItemError::ItemCollectionNotOwned | ItemError::Forbidden => {
            response::forbidden(&err.to_string())
        }
        ItemError::Unauthorized => response::unauthorized(),

        ItemError::Validation(msg) | ItemError::BadRequest(msg) | ItemError::Conflict(msg) => {
            response::bad_request(msg)
        }
        ItemError::Core(CoreError::BadRequest(msg)) => response::bad_request(msg),
        ItemError::Core(CoreError::Json(_))
        | ItemError::ReadOnlyField(_)
        | ItemError::UnknownLinkType(_)
        | ItemError::InverseLinkType(_)
        | ItemError::BadLinkOriginType(_)
        | ItemError::BadLinkTargetType(_)
        | ItemError::LinkTypeRequiresUniqueOrigin(_)
        | ItemError::DisallowedLinkType(_) => response::bad_request(&err.to_string()),

        ItemError::Core(CoreError::Upstream { .. }) => {
            error!(error = %err, "Upstream failure");
            response::message(StatusCode::BAD_GATEWAY, "Upstream service error")
        }
        _ => {
            error!(error = %err, "Request failed");
            response::internal_error("Internal server error")
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_mapping() {
        assert_eq!(error_response(ItemError::ItemNotFound).status(), StatusCode::NOT_FOUND);
        assert_eq!(error_response(ItemError::ItemNotOwned).status(), StatusCode::FORBIDDEN);
        assert_eq!(
            error_response(ItemError::ReadOnlyField("slug".into())).status(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            error_response(ItemError::Conflict("duplicate".into())).status(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            error_response(ItemError::SlugExhausted("x".into())).status(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }
}
