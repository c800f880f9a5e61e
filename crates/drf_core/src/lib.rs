pub mod chunking;
pub mod error;
pub mod formats;
pub mod index;
pub mod snapshot;
