//! Client-side connection driver.

pub mod client;
