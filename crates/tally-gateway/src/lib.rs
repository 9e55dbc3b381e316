// SPDX-FileCopyrightText: 2026 Tally Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! HTTP gateway for the expense pipeline.
//!
//! Analysis requests are answered with a Server-Sent Events stream of
//! `delta` events followed by exactly one `done` or `error`. Record reads
//! and mutations are plain JSON endpoints. Every `/v1` route is scoped to
//! the owner named by the `X-User-ID` header.

pub mod auth;
pub mod error;
pub mod handlers;
pub mod owner;
pub mod server;
pub mod sse;

pub use auth::AuthConfig;
pub use error::ApiError;
pub use owner::OwnerId;
pub use server::{build_router, start_server, GatewayState, HealthState, ServerConfig};
