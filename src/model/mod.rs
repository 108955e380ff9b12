//! Data model shared by the collection engine
//!
//! - [`RequestDescriptor`]: immutable template for one page request
//! - [`Page`]: one fetched page of records
//! - [`Accumulator`]: per-partition record sequences for one collection run
//! - [`ResultSet`]: deduplicated records ordered by rank

mod descriptor;
mod page;
mod record;

pub use descriptor::{PagingParams, RequestDescriptor};
pub use page::{total_pages, Page};
pub use record::{Accumulator, AddressRecord, DuplicatePolicy, Record, ResultSet};
