//! HTTP handlers for petmatch-api.

pub mod admin;
pub mod notifications;
pub mod records;
pub mod search;
