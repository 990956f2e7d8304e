//! Content SDK
//!
//! Loading, packaging and validation of XSOAR-style content packs.
//!
//! ## Features
//!
//! - **Lazy Documents**: YAML and JSON content files are read on first access
//! - **Faithful Round Trips**: untouched files are copied byte for byte, edited
//!   YAML keeps its comments and quoting
//! - **Unify**: code, image and description are folded into one deployable file
//! - **Atomic Dumps**: outputs are staged and renamed into place, never half written
//! - **Validators**: a registry of rules keyed by stable error codes
//!
//! ## Layout
//!
//! ```text
//! Packs/
//! └── Acme/
//!     ├── pack_metadata.json
//!     ├── README.md
//!     ├── Integrations/
//!     │   └── AcmeApi/
//!     │       ├── AcmeApi.yml
//!     │       ├── AcmeApi.py
//!     │       ├── AcmeApi.png
//!     │       ├── AcmeApi.md
//!     │       ├── AcmeApi_README.md
//!     │       └── AcmeApi_CHANGELOG.md
//!     └── Playbooks/
//!         └── playbook-Triage.yml
//! ```

pub mod config;
pub mod deadline;
pub mod document;
pub mod dump;
pub mod error;
pub mod git;
pub mod item;
pub mod kind;
pub mod pack;
pub mod paths;
pub mod staging;
pub mod unify;
pub mod validate;
pub mod version;

pub use config::{string_to_bool, ContentConfig};
pub use deadline::Deadline;
pub use document::{DocumentFormat, DocumentOptions, StructuredDocument};
pub use dump::{DumpEngine, DumpOptions, DumpReport};
pub use error::{ContentError, ErrorKind, Result};
pub use git::{ContentRoot, GitStatus, GitStatuses};
pub use item::{ContentItem, ScriptType};
pub use kind::ContentKind;
pub use pack::{Pack, PackMetadata};
pub use paths::Companion;
pub use unify::UnifyOptions;
pub use validate::{ValidationReport, ValidationResult, Validator, ValidatorRegistry};
pub use version::ContentVersion;
