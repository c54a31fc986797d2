//! medallion: bronze/silver/gold PDF pipeline feeding a managed vector search index
//!
//! Stages:
//! - [`volume`] scans the source volume into the bronze table
//! - [`parse`] extracts PDF text into the silver table
//! - [`chunk`] splits text into token-bounded chunks for the gold table
//! - [`databricks`] syncs the index and drives the chain model lifecycle

pub mod chunk;
pub mod commands;
pub mod config;
pub mod databricks;
pub mod error;
pub mod parse;
pub mod progress;
pub mod tables;
pub mod volume;
