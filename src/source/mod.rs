//! Source resolution and caching

pub mod cache;
pub mod resolver;

pub use cache::{Artifact, ArtifactKind, CacheManager};
pub use resolver::{
    decode_base64, read_path, resolve_base64, resolve_cache, resolve_path, ResolvedPdf,
};
