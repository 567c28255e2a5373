//! URL handling for the validator
//!
//! Document identifiers are URLs. This module turns them into dedup keys and
//! inspects them for protocol violations.

mod normalize;
mod query;

pub use normalize::{is_tls, normalize_url};
pub use query::{reserved_params, RESERVED_QUERY_PARAMS};
