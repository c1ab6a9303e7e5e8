//! tokenrelay: polls platform pages for token balances and relays them
//! to an ingest endpoint.

pub mod config;
pub mod pipeline;
