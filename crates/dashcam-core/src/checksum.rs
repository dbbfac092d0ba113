use crc32fast::Hasher;
use std::fs::File;
use std::io::{self, BufReader, Read};
use std::path::Path;

/// Compute CRC32 checksum of a byte slice
pub fn compute_crc32(bytes: &[u8]) -> u32 {
    let mut hasher = Hasher::new();
    hasher.update(bytes);
    hasher.finalize()
}

/// Stream a file through CRC32. Returns the checksum and the byte count.
pub fn file_crc32(path: &Path) -> io::Result<(u32, u64)> {
    let mut reader = BufReader::new(File::open(path)?);
    let mut hasher = Hasher::new();
    let mut buf = [0u8; 64 * 1024];
    let mut total = 0u64;

    loop {
        let n = reader.read(&mut buf)?;
        if n == 0 {
            break;
        }
        hasher.update(&buf[..n]);
        total += n as u64;
    }

    Ok((hasher.finalize(), total))
}
