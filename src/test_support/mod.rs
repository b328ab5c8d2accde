//! Helpers shared by in-crate unit tests.
#![allow(clippy::unwrap_used, clippy::expect_used)]

pub(crate) mod fake_connection;
pub(crate) mod socket_guard;
