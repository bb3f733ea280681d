//! The five queue-driven engines (spec §4.3, §4.5–§4.8). The Query
//! Engine (§4.4) is not a unit: the Transport Front-End calls it
//! synchronously, per spec §4.8.

pub mod authquery;
pub mod delegation_sync;
pub mod notifier;
pub mod query_engine;
pub mod refresh_engine;
pub mod transport;
pub mod update_pipeline;
