// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

//! Finder sidebar editor.
//!
//! Finder keeps its sidebar in __shared file list stores__: keyed archives
//! of ordered items, each pointing at a location through opaque bookmark
//! data, or naming a system provided entry through a special identifier.
//! This crate reads those stores, edits them without disturbing anything it
//! does not understand, writes them back atomically, and asks the system to
//! reload them.
//!
//! # Layers
//!
//! - [`archive`] turns keyed archives into a plain [`archive::Node`] tree and
//!   back.
//! - [`bookmark`] creates and resolves bookmark data.
//! - [`store`] models stores and their items, and holds editing operations.
//! - [`reload`] restarts the processes that render the sidebar.
//! - [`config`] and [`path`] supply settings and default locations.

pub mod archive;
pub mod bookmark;
pub mod config;
pub mod path;
pub mod reload;
pub mod store;
