// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

//! Idempotent managed blocks for user-owned configuration files.
//!
//! Dotblock keeps tool-owned regions of files like `.zshrc`, `.zprofile`, or
//! `kitty.conf` in sync with a source-of-truth, without clobbering anything
//! the user wrote around them. Every mutation is preceded by a timestamped
//! backup and lands through an atomic rename.

pub mod block;
pub mod config;
pub mod install;
pub mod path;
pub mod setup;

pub use block::{
    ensure_managed_block, ensure_managed_content, marker::Markers, replace_section, Action,
    MergeError,
};
