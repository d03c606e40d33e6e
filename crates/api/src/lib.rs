//! Careerak notifications HTTP API.
//!
//! Staff routes live under `/api/admin`, user routes under `/api/notifications`.
//! Every route except `/health` requires a Bearer JWT issued by the platform.

pub mod middleware;
pub mod routes;
pub mod state;
