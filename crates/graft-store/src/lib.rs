pub mod durable;
pub mod lock;
pub mod provenance;
pub mod registry;

pub use durable::DurableStore;
pub use lock::FileLock;
pub use provenance::{ProvenanceRecord, ProvenanceStore};
pub use registry::{Registry, RegistryConfig, RegistryStore};
