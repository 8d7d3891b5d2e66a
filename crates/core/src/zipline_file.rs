//! The framed on-disk/on-wire container for compiled module bytecode.

use bytes::{Buf, BufMut, Bytes, BytesMut};

/// Magic number at the start of every container file ("ZIPL").
pub const ZIPLINE_FILE_MAGIC: u32 = 0x5A49_504C;

/// Container format version written by this implementation.
pub const ZIPLINE_FILE_VERSION: u32 = 1;

/// A compiled module container: a version tag plus engine-specific bytecode.
///
/// Layout: 4-byte big-endian magic, 4-byte big-endian version, 4-byte
/// big-endian bytecode length, then the bytecode itself.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ZiplineFile {
    /// Container format version.
    pub version: u32,
    /// Engine-specific compiled code; opaque at this layer.
    pub bytecode: Bytes,
}

impl ZiplineFile {
    /// Wrap bytecode in a container at the current format version.
    pub fn new(bytecode: Bytes) -> Self {
        Self {
            version: ZIPLINE_FILE_VERSION,
            bytecode,
        }
    }

    /// Serialize to the framed layout.
    pub fn encode(&self) -> Bytes {
        let mut buf = BytesMut::with_capacity(12 + self.bytecode.len());
        buf.put_u32(ZIPLINE_FILE_MAGIC);
        buf.put_u32(self.version);
        buf.put_u32(self.bytecode.len() as u32);
        buf.put_slice(&self.bytecode);
        buf.freeze()
    }

    /// Parse a container from raw bytes.
    ///
    /// Rejects unknown magic and short reads with
    /// [`Error::MalformedZiplineFile`], and unknown versions with
    /// [`Error::UnsupportedFileVersion`].
    ///
    /// [`Error::MalformedZiplineFile`]: crate::Error::MalformedZiplineFile
    /// [`Error::UnsupportedFileVersion`]: crate::Error::UnsupportedFileVersion
    pub fn decode(bytes: &[u8]) -> crate::Result<Self> {
        let mut buf = bytes;
        if buf.remaining() < 12 {
            return Err(crate::Error::MalformedZiplineFile(format!(
                "header truncated at {} bytes",
                buf.remaining()
            )));
        }
        let magic = buf.get_u32();
        if magic != ZIPLINE_FILE_MAGIC {
            return Err(crate::Error::MalformedZiplineFile(format!(
                "bad magic {magic:#010x}"
            )));
        }
        let version = buf.get_u32();
        if version != ZIPLINE_FILE_VERSION {
            return Err(crate::Error::UnsupportedFileVersion(version));
        }
        let len = buf.get_u32() as usize;
        if buf.remaining() < len {
            return Err(crate::Error::MalformedZiplineFile(format!(
                "bytecode truncated: expected {len} bytes, found {}",
                buf.remaining()
            )));
        }
        if buf.remaining() > len {
            return Err(crate::Error::MalformedZiplineFile(format!(
                "{} trailing bytes after bytecode",
                buf.remaining() - len
            )));
        }
        Ok(Self {
            version,
            bytecode: Bytes::copy_from_slice(buf),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn encode_decode_roundtrip() {
        let file = ZiplineFile::new(Bytes::from_static(b"compiled bytecode"));
        let decoded = ZiplineFile::decode(&file.encode()).unwrap();
        assert_eq!(decoded, file);
    }

    #[test]
    fn empty_bytecode_roundtrip() {
        let file = ZiplineFile::new(Bytes::new());
        let decoded = ZiplineFile::decode(&file.encode()).unwrap();
        assert!(decoded.bytecode.is_empty());
    }

    #[test]
    fn rejects_bad_magic() {
        let mut encoded = ZiplineFile::new(Bytes::from_static(b"x")).encode().to_vec();
        encoded[0] ^= 0xff;
        match ZiplineFile::decode(&encoded) {
            Err(crate::Error::MalformedZiplineFile(_)) => {}
            other => panic!("expected MalformedZiplineFile, got {other:?}"),
        }
    }

    #[test]
    fn rejects_unknown_version() {
        let mut buf = BytesMut::new();
        buf.put_u32(ZIPLINE_FILE_MAGIC);
        buf.put_u32(999);
        buf.put_u32(0);
        match ZiplineFile::decode(&buf) {
            Err(crate::Error::UnsupportedFileVersion(999)) => {}
            other => panic!("expected UnsupportedFileVersion, got {other:?}"),
        }
    }

    #[test]
    fn rejects_short_read() {
        let encoded = ZiplineFile::new(Bytes::from_static(b"payload")).encode();
        for cut in [0, 4, 11, encoded.len() - 1] {
            match ZiplineFile::decode(&encoded[..cut]) {
                Err(crate::Error::MalformedZiplineFile(_)) => {}
                other => panic!("expected MalformedZiplineFile at cut {cut}, got {other:?}"),
            }
        }
    }

    #[test]
    fn rejects_trailing_bytes() {
        let mut encoded = ZiplineFile::new(Bytes::from_static(b"payload")).encode().to_vec();
        encoded.push(0);
        match ZiplineFile::decode(&encoded) {
            Err(crate::Error::MalformedZiplineFile(msg)) => {
                assert!(msg.contains("trailing"));
            }
            other => panic!("expected MalformedZiplineFile, got {other:?}"),
        }
    }
}
