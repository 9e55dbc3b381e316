// SPDX-FileCopyrightText: 2026 Tally Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! SQLite persistence layer for the Tally expense pipeline.
//!
//! Opens the database with the PRAGMAs the service relies on, applies the
//! embedded migrations, and implements [`tally_core::RecordStore`] on top of
//! a single `tokio-rusqlite` connection.

pub mod adapter;
pub mod database;
pub mod migrations;
pub mod queries;

pub use adapter::SqliteRecordStore;
pub use database::Database;
