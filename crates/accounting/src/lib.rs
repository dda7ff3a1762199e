//! Parcel accounting: per-parcel object-ownership counts derived from the live scene.
//!
//! # Invariants
//! - For every parcel, owner + group + others equals the part count of the live,
//!   non-attachment, non-temporary object groups positioned inside it.
//! - Readers never observe a partially rebuilt table: the taint flag and the
//!   rebuild share one lock.
//! - A tainted cache is never read without a full rebuild first.

mod cache;
mod counts;

pub use cache::{ParcelAccountingCache, PrimCounts};
pub use counts::{Bucket, ParcelCounts, classify};
