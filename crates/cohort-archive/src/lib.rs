//! Metadata archives.
//!
//! An archive bundles TypeDefs, TypeDef patches and instances so a
//! repository can be seeded with content at start-up. [`ArchiveBuilder`]
//! assembles archives with GUIDs kept stable across builds by an
//! [`ArchiveGuidMap`]; [`ArchiveLoader`] loads them idempotently.

pub mod archive;
pub mod audit_codes;
pub mod builder;
pub mod error;
pub mod guid_map;
pub mod loader;

pub use archive::ArchiveInstanceStore;
pub use archive::ArchiveProperties;
pub use archive::ArchiveType;
pub use archive::ArchiveTypeStore;
pub use archive::MetadataArchive;
pub use archive::read_archive_file;
pub use archive::write_archive_file;
pub use builder::ArchiveBuilder;
pub use error::ArchiveError;
pub use guid_map::ArchiveGuidMap;
pub use loader::ArchiveLoader;
pub use loader::LoadReport;
