#![doc = "upr-core: core logic library for upr."]

//! Everything `upr` does besides argument parsing and talking to GitHub lives here: collecting
//! files, the S3 and Swift object stores, the concurrent upload scheduler, comment rendering,
//! pull request resolution and the two publishing pipelines.
//!
//! # Usage
//! The `upr` binary builds a [`config::CommentConfig`] or [`config::StatusConfig`], provides a
//! [`contract::SourceHost`] and hands both to [`pipeline`].

pub mod collect;
pub mod comment;
pub mod config;
pub mod contract;
pub mod expiry;
pub mod pipeline;
pub mod resolve;
pub mod schedule;
pub mod store;
