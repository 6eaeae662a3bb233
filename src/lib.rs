//! Workspace umbrella crate.
//!
//! Exposes feature flags that map onto the individual workspace crates so a
//! host application can depend on `delivery-workspace` and pick the bridges it
//! needs (`desktop-shims`) without wiring each crate by hand.

#[cfg(feature = "desktop-shims")]
pub use core_service::*;
