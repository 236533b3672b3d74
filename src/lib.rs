//! # blocksaver: save or run code blocks from chat transcripts
//!
//! Chat transcripts are full of code blocks with no metadata attached. This
//! crate discovers those blocks, guesses a destination filename for each one
//! from weak signals in the surrounding text, and after a human confirms the
//! guess writes the block to disk or runs it as a shell script.
//!
//! ## Architecture
//!
//! - **[`config`]**: configuration loading, validation and defaults
//! - **[`document`]**: arena document model (HTML via scraper, Markdown via pulldown-cmark) with mutation notifications
//! - **[`detection`]**: content classification, executable check and the filename inference cascade
//! - **[`scan`]**: idempotent block discovery, affordance injection and file watching
//! - **[`action`]**: confirmation surfaces and the activation flow
//! - **[`host`]**: native-messaging host that performs saves and executions

pub mod action;
pub mod config;
pub mod detection;
pub mod document;
pub mod host;
pub mod scan;
