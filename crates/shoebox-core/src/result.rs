//! Application result alias.

use crate::error::AppError;

/// Result type used throughout Shoebox.
pub type AppResult<T> = Result<T, AppError>;
