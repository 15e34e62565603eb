use std::fs::File;
use std::io::{ErrorKind, Read};
use std::path::{Path, PathBuf};

use sha2::{Digest, Sha256};
use thiserror::Error;

/// Read size used when folding a file into its digest.
pub const HASH_CHUNK_SIZE: usize = 8 * 1024;

#[derive(Error, Debug)]
pub enum HashError {
    #[error("Cannot hash {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl HashError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            HashError::Io { source, .. } => source.kind(),
        }
    }
}

/// Compute the SHA-256 content hash of a file as lowercase hex.
/// The file is streamed in `HASH_CHUNK_SIZE` chunks, never loaded whole.
pub fn hash_file(path: &Path) -> Result<String, HashError> {
    let io_err = |source| HashError::Io {
        path: path.to_path_buf(),
        source,
    };
    let file = File::open(path).map_err(io_err)?;
    hash_reader(file).map_err(io_err)
}

/// Fold an arbitrary byte stream into a SHA-256 hex digest.
pub fn hash_reader<R: Read>(mut reader: R) -> std::io::Result<String> {
    let mut hasher = Sha256::new();
    let mut buf = [0u8; HASH_CHUNK_SIZE];

    loop {
        let read = match reader.read(&mut buf) {
            Ok(0) => break,
            Ok(n) => n,
            Err(e) if e.kind() == ErrorKind::Interrupted => continue,
            Err(e) => return Err(e),
        };
        hasher.update(&buf[..read]);
    }

    Ok(format!("{:x}", hasher.finalize()))
}

/// Digest of a whole training corpus.
///
/// Per-file digests are sorted before folding, so the result depends only on
/// file contents, not on the order the paths are listed in.
pub fn hash_corpus<P: AsRef<Path>>(paths: &[P]) -> Result<String, HashError> {
    let mut digests = paths
        .iter()
        .map(|p| hash_file(p.as_ref()))
        .collect::<Result<Vec<_>, _>>()?;
    digests.sort_unstable();

    let mut hasher = Sha256::new();
    for digest in &digests {
        hasher.update(digest.as_bytes());
        hasher.update(b"\n");
    }

    tracing::debug!(files = digests.len(), "Hashed training corpus");
    Ok(format!("{:x}", hasher.finalize()))
}
