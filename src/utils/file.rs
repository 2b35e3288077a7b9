use std::fs::File;
use std::io::{self, Read};
use std::path::{Path, PathBuf};

/// Detects gzip input by magic bytes. Files shorter than the magic are
/// plain by definition.
pub fn is_gzipped(path: &Path) -> io::Result<bool> {
    let mut file = File::open(path)?;
    let mut buffer = [0u8; 2];
    let mut read = 0;
    while read < 2 {
        let n = file.read(&mut buffer[read..])?;
        if n == 0 {
            return Ok(false);
        }
        read += n;
    }
    Ok(buffer == [0x1F, 0x8B]) // Gzip magic bytes
}

/// Resolves a possibly-relative path against the working directory.
pub fn absolutize(path: &Path, cwd: &Path) -> PathBuf {
    if path.is_absolute() {
        path.to_path_buf()
    } else {
        cwd.join(path)
    }
}

/// Appends an extension to a path without replacing the existing one:
/// `genome.fa` + `fai` -> `genome.fa.fai`.
pub fn append_ext(path: &Path, ext: &str) -> PathBuf {
    let mut os_string = path.as_os_str().to_os_string();
    os_string.push(".");
    os_string.push(ext);
    PathBuf::from(os_string)
}
