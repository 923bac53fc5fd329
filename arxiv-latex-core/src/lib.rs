#![doc = "arxiv-latex-core: core pipeline for arxiv-latex."]

//! This crate turns bulk arXiv source shards into one flattened LaTeX record
//! per qualifying project. All pipeline logic, data models and errors live
//! here; the `arxiv-latex` binary only adds CLI glue.
//!
//! # Flow
//! shards → entries ([`shard`]) → loaded projects ([`loader`], [`flatten`])
//! → records ([`record`]) → newline-delimited JSON ([`output`]), driven by
//! [`pipeline`] and [`coordinator`]. [`acquire`] decides which shards to feed
//! in.

pub mod acquire;
pub mod config;
pub mod contract;
pub mod coordinator;
pub mod error;
pub mod flatten;
pub mod loader;
pub mod macros;
pub mod output;
pub mod pipeline;
pub mod progress;
pub mod record;
pub mod shard;
mod walk;
