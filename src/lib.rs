pub mod clock;
pub mod codec;
pub mod config;
pub mod dlq;
pub mod domain;
pub mod engine;
pub mod ingestion;
pub mod manager;
pub mod memory_store;
pub mod sweep;
pub mod telemetry;

pub use clock::{ManualClock, SystemClock};
pub use config::Settings;
pub use domain::{Account, Error, PartialFailure, Reservation};
pub use manager::{LogHook, QuotaManager, ReclaimReport, Reclaimed};
pub use memory_store::MemoryStore;
pub use sweep::{StaleFilter, SweepPolicy};
