// File I/O: source retrieval, survey extracts, boundaries, census tables, exports

pub mod ancillary;
pub mod boundary;
pub mod export;
pub mod extract;
pub mod fetch;

pub use fetch::{Fetch, FetchFailure, FsFetch, MemoryFetch};
