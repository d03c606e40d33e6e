//! Shared configuration, storage pools, error type and domain types.

pub mod config;
pub mod db;
pub mod error;
pub mod quiet_hours;
pub mod redis_pool;
pub mod types;
