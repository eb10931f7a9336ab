//! vecload-index
//!
//! Vector index service adapters (`pinecone`, `memory`) and the provisioner
//! that reconciles a remote index with the desired descriptor.

pub mod memory;
pub mod pinecone;
pub mod provision;

pub use memory::InMemoryIndexClient;
pub use pinecone::PineconeClient;
pub use provision::{IndexProvisioner, Reconciliation};
