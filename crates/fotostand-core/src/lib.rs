//! # fotostand-core
//!
//! Gallery allocation and storage for the Fotostand photo booth.
//!
//! - [`security`]: path-safety guard and constant-time upload token check
//! - [`allocator`]: derived / random / hybrid gallery id allocation
//! - [`store`]: the file-backed gallery store, sole owner of the data root
//! - [`upload`]: authenticated, size- and type-checked uploads
//! - [`watcher`]: turns photos dropped into the input directory into galleries

pub mod allocator;
pub mod config;
pub mod locks;
pub mod metadata;
pub mod naming;
pub mod security;
pub mod store;
pub mod upload;
pub mod watcher;

mod error;

pub use allocator::{IdAllocator, WordList};
pub use config::{Config, IdMode, UploadLimits};
pub use error::{GalleryError, Result};
pub use metadata::GalleryMetadata;
pub use store::{Gallery, GalleryArchive, GalleryFile, GalleryStore, IncomingFile, ResolvedFile};
pub use upload::{UploadGateway, UploadReceipt, UploadedFile};
pub use watcher::{GalleryCreated, Watcher};
