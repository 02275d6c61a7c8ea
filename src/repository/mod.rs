pub mod facts;
pub mod git;
pub mod importer;
pub mod index;
pub mod pool;
pub mod shabam;

pub use facts::{DescriptorBlob, Fact, FactStore, TouchPoint};
pub use git::Git;
pub use importer::{ImportOutcome, Importer};
pub use index::{RepoIndex, SCHEMA_VERSION};
pub use pool::{IndexedRepo, RepoPool, RepoReport};
pub use shabam::Shabam;
