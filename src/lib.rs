#![deny(missing_docs)]

//! Ordered map [`collections::RbMap`], a red-black tree whose nodes are also threaded on a
//! doubly-linked list in key order, so stepping to the next or previous entry is O(1).

//!# Features
//!
//! This crate supports the following cargo features:
//! - `serde` : enables serialisation of [`collections::RbMap`] via serde crate.
//! - `unsafe-optim` : Enable unsafe optimisations in release mode.
//! - `cap` : tests count allocated memory using the cap crate instead of using mimalloc.

/// Containers.
pub mod collections;
