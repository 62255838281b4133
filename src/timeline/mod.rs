//! Longitudinal lab trends across a patient's documents.
//!
//! Pure and synchronous: the caller loads the documents, this module groups
//! their numeric lab values by canonical test name and orders them by the
//! date each document resolves to.

mod aggregates;
pub mod dates;
mod types;

pub use aggregates::*;
pub use dates::{find_date_in_text, parse_date};
pub use types::*;
