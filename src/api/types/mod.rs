//! Request and response types shared by the API handlers

pub mod error;
pub mod json;

pub use error::{ApiError, ApiErrorCode, ApiErrorDetail, ApiErrorResponse};
pub use json::{Json, ValidatedJson};
