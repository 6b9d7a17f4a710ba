//! Query construction under platform constraints
//!
//! - **QueryBuilder**: renders keywords and filters into query strings within
//!   the OR-term and length limits
//! - **filters**: non-fatal validation and sanitizing of filter settings

pub mod builder;
pub mod filters;

pub use builder::{render_filters, BuiltQuery, QueryBuilder};
pub use filters::{sanitize_filters, validate_filters, FilterWarning, WarningKind};
