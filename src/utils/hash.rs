use std::fs::File;
use std::io::{self, BufReader, Read};
use std::path::Path;
use sha2::{Sha256, Digest};

use crate::constants::HASH_BUFFER_SIZE;

/// Calculate the SHA-256 of everything readable from `reader`, returning the
/// hex digest and the number of bytes hashed
pub fn sha256_reader(mut reader: impl Read) -> io::Result<(String, u64)> {
    let mut hasher = Sha256::new();
    let mut buffer = vec![0; HASH_BUFFER_SIZE];
    let mut total = 0u64;

    loop {
        let bytes_read = reader.read(&mut buffer)?;
        if bytes_read == 0 {
            break;
        }
        hasher.update(&buffer[..bytes_read]);
        total += bytes_read as u64;
    }

    Ok((format!("{:x}", hasher.finalize()), total))
}

/// Calculate the SHA-256 of a file
pub fn calculate_sha256(path: &Path) -> io::Result<String> {
    let file = File::open(path)?;
    sha256_reader(BufReader::new(file)).map(|(digest, _)| digest)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn test_sha256_of_known_input() {
        let (digest, len) = sha256_reader(&b"abc"[..]).unwrap();
        assert_eq!(digest, "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad");
        assert_eq!(len, 3);
    }

    #[test]
    fn test_sha256_of_empty_input() {
        let (digest, len) = sha256_reader(io::empty()).unwrap();
        assert_eq!(digest, "e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855");
        assert_eq!(len, 0);
    }

    #[test]
    fn test_calculate_sha256_of_file() {
        let mut file = NamedTempFile::new().unwrap();
        file.write_all(b"abc").unwrap();
        file.flush().unwrap();

        assert_eq!(
            calculate_sha256(file.path()).unwrap(),
            "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
        );
    }

    #[test]
    fn test_calculate_sha256_missing_file() {
        assert!(calculate_sha256(Path::new("/nonexistent/file.bin")).is_err());
    }
}
