//! stats
#![deny(missing_docs)]

mod mutual_info;
pub use mutual_info::{adjusted_mutual_info, entropy, expected_mutual_info, mutual_info};
