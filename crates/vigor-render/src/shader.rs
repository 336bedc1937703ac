// SPDX-License-Identifier: CEPL-1.0
use std::io;
use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ShaderError {
    #[error("shader file not found: {}", .0.display())]
    NotFound(PathBuf),
    #[error("failed to read shader {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

/// Reads a compiled shader blob. The bytes are handed to the backend as-is.
pub fn read_shader_bytes(path: impl AsRef<Path>) -> Result<Vec<u8>, ShaderError> {
    let path = path.as_ref();
    std::fs::read(path).map_err(|source| {
        if source.kind() == io::ErrorKind::NotFound {
            ShaderError::NotFound(path.to_path_buf())
        } else {
            ShaderError::Io {
                path: path.to_path_buf(),
                source,
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_file_is_not_found() {
        let p = std::env::temp_dir().join("vigor-render-does-not-exist.spv");
        match read_shader_bytes(&p) {
            Err(ShaderError::NotFound(got)) => assert_eq!(got, p),
            other => panic!("unexpected: {other:?}"),
        }
    }

    #[test]
    fn reads_bytes_verbatim() {
        let p = std::env::temp_dir().join(format!("vigor-shader-{}.spv", std::process::id()));
        let blob = [0x03u8, 0x02, 0x23, 0x07, 0xAA, 0xBB, 0xCC, 0xDD];
        std::fs::write(&p, blob).unwrap();
        let got = read_shader_bytes(&p).unwrap();
        let _ = std::fs::remove_file(&p);
        assert_eq!(got, blob);
    }

    #[test]
    fn directory_is_an_io_error() {
        let dir = std::env::temp_dir();
        assert!(matches!(
            read_shader_bytes(&dir),
            Err(ShaderError::Io { .. })
        ));
    }
}
