//! Digest scheduler: a cron-style loop that delivers batched notifications.

pub mod ticker;
