//! Mediarelay-Common: Shared types, constants, and utilities.
//!
//! This crate provides common functionality used across mediarelay:
//!
//! - **Error Taxonomy**: The [`Error`] type every layer funnels failures into,
//!   including the `Throttled` condition with its reset hint
//! - **Typed IDs**: Catalog identifiers for videos and image series
//! - **Asset Types**: [`AssetKind`] and [`AssetHandle`]
//! - **Path Utilities**: Recognised image/video extensions and MIME inference
//! - **Natural Ordering**: Numeric-aware name comparison used for page order
//!
//! # Examples
//!
//! ```
//! use mediarelay_common::{AssetKind, Error, Result};
//! use mediarelay_common::natural::natural_cmp;
//! use mediarelay_common::paths::is_image_name;
//! use std::cmp::Ordering;
//!
//! assert!(is_image_name("page2.jpg"));
//! assert_eq!(natural_cmp("page2.jpg", "page10.jpg"), Ordering::Less);
//!
//! fn example() -> Result<()> {
//!     Err(Error::throttled(120))
//! }
//! assert_eq!(example().unwrap_err().http_status(), 429);
//! assert_eq!(AssetKind::Video.as_str(), "video");
//! ```

pub mod error;
pub mod ids;
pub mod natural;
pub mod paths;
pub mod types;

pub use error::{Error, Result, UpstreamError};
pub use ids::*;
pub use types::*;
