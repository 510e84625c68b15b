//! Imports locally built disk images as compute templates.
//!
//! An import runs three steps over one shared context:
//!
//! 1. **upload** streams the disk image into an S3-compatible bucket
//! 2. **register** asks the compute API to create a template from the object
//!    and polls the resulting operation until it settles
//! 3. **delete** removes the temporary object again
//!
//! When a step fails or the run is cancelled, the steps that already
//! completed are rolled back in reverse order. A registered template is never
//! rolled back; it can be removed explicitly with [`Importer::destroy`].
//!
//! ```text
//! ┌──────────┐    ┌──────────┐    ┌──────────┐
//! │  Upload  │───▶│ Register │───▶│  Delete  │
//! └──────────┘    └──────────┘    └──────────┘
//!      │               │
//!      ▼               ▼
//!  ┌────────┐    ┌───────────┐
//!  │   S3   │    │  Compute  │
//!  └────────┘    └───────────┘
//! ```

#![forbid(unsafe_code)]

pub mod compute;
pub mod config;
pub mod error;
mod importer;
pub mod report;
pub mod runner;
pub mod state;
pub mod step;
pub mod steps;
pub mod storage;
pub mod types;

// Re-export the entry point
pub use importer::Importer;

// Re-export configuration types
pub use config::{ImportConfig, RegistrationConfig, StorageConfig, TemplateConfig};

// Re-export error types
pub use error::{ImportError, ImportResult};

// Re-export core types
pub use types::{Artifact, ObjectRef, Producer, Template, TemplateId, UploadedObject};

// Re-export provider seams
pub use compute::{ComputeClient, ComputeProvider, MemoryCompute, RegistrationBehaviour};
pub use report::{Redactor, Reporter, TracingReporter};
pub use state::{ProviderHandles, SharedContext};
pub use storage::{DeleteOutcome, MemoryStorage, ObjectStorage, S3Storage};
