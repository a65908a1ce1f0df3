//! Group application backup worker
//!
//! Snapshots every service of an application group: build artifacts
//! (slugs and images), persistent data and plugin images, archived locally
//! or pushed to a remote transfer endpoint and image hub.

pub mod core;
pub mod utils;
