//! Canopy: a hierarchical content router.
//!
//! Paths are resolved segment by segment through nested directories and the
//! features they host, then handed to a generic dispatcher that runs one of
//! a fixed set of actions against whatever was found.

pub mod access;
pub mod api;
pub mod db;
pub mod dispatch;
pub mod models;
pub mod registry;
pub mod router;
pub mod tree;
