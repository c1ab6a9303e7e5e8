//! Core library for tokenrelay.
//!
//! Samples numeric balances from platform pages ([`balance`], [`page`]),
//! polls them on a fixed cadence ([`monitor`]) and relays each reading to
//! an HTTP ingest endpoint ([`relay`]) tagged with the room id held in the
//! configuration store ([`store`]).

pub mod balance;
pub mod monitor;
pub mod page;
pub mod platform;
pub mod relay;
pub mod store;
