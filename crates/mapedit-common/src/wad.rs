// wad.rs — texture archive seam
//
// WAD parsing lives outside this workspace. The renderer only needs to ask
// an opened archive whether it holds a texture and to read the raw miptex
// record back, so that is the whole contract.

use std::path::PathBuf;

use thiserror::Error;

use crate::bspfile::MIP_LEVELS;

#[derive(Debug, Error)]
pub enum WadError {
    #[error("failed to open archive {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("corrupt archive {path}: {detail}")]
    Corrupt { path: PathBuf, detail: String },
    #[error("texture {0} not present in archive")]
    NoSuchTexture(String),
}

/// A texture record read from an archive.
///
/// `data` starts immediately after the 40-byte miptex header, but `offsets`
/// are kept header-relative the way the archive stores them. Consumers
/// subtract `MIPTEX_HEADER_LEN` when indexing into `data`.
#[derive(Debug, Clone)]
pub struct WadTex {
    pub name: String,
    pub width: u32,
    pub height: u32,
    pub offsets: [i32; MIP_LEVELS],
    pub data: Vec<u8>,
}

/// An opened texture archive.
///
/// Implementations are expected to be cheap to query; `read_texture` may do
/// file IO. Archives only live for the duration of a level load.
pub trait TextureArchive {
    /// Lookup by miptex name.
    fn has_texture(&self, name: &str) -> bool;

    fn read_texture(&self, name: &str) -> Result<WadTex, WadError>;
}
