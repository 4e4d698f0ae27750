//! Chat integration tests
//!
//! Multi-participant rooms over the in-process live hub, plus Postgres-backed
//! tests that require a database (ignored by default).

mod common;
mod persistence;
mod sessions;
mod threading;
