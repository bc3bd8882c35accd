//! Library crate for lan-sweep: subnet enumeration, host and port probing,
//! MAC vendor resolution and the shared live-scan state.
pub mod config;
pub mod discovery;
pub mod export;
pub mod logging;
pub mod netdetect;
pub mod pool;
pub mod ports;
pub mod probe;
pub mod scanner;
pub mod search;
pub mod server;
pub mod state;
pub mod types;
pub mod vendor;
