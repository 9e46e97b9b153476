// Copyright © 2026 The Guest VMM Authors
//
// SPDX-License-Identifier: Apache-2.0
//

//! Read-only boot archives holding the guest images.

use std::collections::BTreeMap;
use std::fs;
use std::io;
use std::path::Path;
use std::str;

use thiserror::Error;

// SVR4 "newc" magic, without and with checksums.
const NEWC_MAGIC: &[u8; 6] = b"070701";
const NEWC_CRC_MAGIC: &[u8; 6] = b"070702";
const NEWC_HEADER_SIZE: usize = 110;
const NEWC_FIELD_SIZE: usize = 8;
// Field indexes after the magic.
const NEWC_FILESIZE_FIELD: usize = 6;
const NEWC_NAMESIZE_FIELD: usize = 11;
const NEWC_TRAILER: &str = "TRAILER!!!";

#[derive(Debug, Error)]
pub enum ArchiveError {
    #[error("Cannot read archive file")]
    Open(#[source] io::Error),

    #[error("Bad cpio magic at offset 0x{0:x}")]
    InvalidMagic(usize),

    #[error("Truncated cpio header at offset 0x{0:x}")]
    TruncatedHeader(usize),

    #[error("Invalid hex field in cpio header at offset 0x{0:x}")]
    InvalidField(usize),

    #[error("Entry at offset 0x{0:x} runs past the end of the archive")]
    TruncatedData(usize),

    #[error("Archive has no trailer entry")]
    MissingTrailer,
}

pub type Result<T> = std::result::Result<T, ArchiveError>;

/// Lookup contract for the blobs the monitor boots from.
pub trait BootArchive {
    /// Returns the contents of the entry called `name`.
    fn find(&self, name: &str) -> Option<&[u8]>;

    /// Entry names and sizes, in archive order.
    fn entries(&self) -> Vec<(&str, usize)>;
}

struct CpioEntry {
    name: String,
    offset: usize,
    len: usize,
}

/// A cpio archive in the SVR4 "newc" format.
pub struct CpioArchive {
    data: Vec<u8>,
    entries: Vec<CpioEntry>,
}

fn align4(v: usize) -> usize {
    (v + 3) & !3
}

fn parse_field(header: &[u8], index: usize, offset: usize) -> Result<usize> {
    let start = NEWC_MAGIC.len() + index * NEWC_FIELD_SIZE;
    let field = &header[start..start + NEWC_FIELD_SIZE];
    // from_str_radix also takes a sign, which newc never has.
    if !field.iter().all(u8::is_ascii_hexdigit) {
        return Err(ArchiveError::InvalidField(offset));
    }
    str::from_utf8(field)
        .ok()
        .and_then(|s| usize::from_str_radix(s, 16).ok())
        .ok_or(ArchiveError::InvalidField(offset))
}

impl CpioArchive {
    pub fn new(data: Vec<u8>) -> Result<Self> {
        let mut entries = Vec::new();
        let mut offset = 0;

        loop {
            let header = data
                .get(offset..offset + NEWC_HEADER_SIZE)
                .ok_or(if offset >= data.len() {
                    ArchiveError::MissingTrailer
                } else {
                    ArchiveError::TruncatedHeader(offset)
                })?;
            if &header[..6] != NEWC_MAGIC && &header[..6] != NEWC_CRC_MAGIC {
                return Err(ArchiveError::InvalidMagic(offset));
            }

            let file_size = parse_field(header, NEWC_FILESIZE_FIELD, offset)?;
            let name_size = parse_field(header, NEWC_NAMESIZE_FIELD, offset)?;

            let name_start = offset + NEWC_HEADER_SIZE;
            // The name size includes the terminating NUL.
            let name_bytes = data
                .get(name_start..name_start + name_size.saturating_sub(1))
                .ok_or(ArchiveError::TruncatedData(offset))?;
            let name = String::from_utf8_lossy(name_bytes).into_owned();

            let data_start = align4(name_start + name_size);
            let data_end = data_start
                .checked_add(file_size)
                .filter(|end| *end <= data.len())
                .ok_or(ArchiveError::TruncatedData(offset))?;

            if name == NEWC_TRAILER {
                break;
            }

            entries.push(CpioEntry {
                name: name.trim_start_matches("./").to_owned(),
                offset: data_start,
                len: file_size,
            });
            offset = align4(data_end);
        }

        Ok(CpioArchive { data, entries })
    }

    pub fn from_file(path: &Path) -> Result<Self> {
        let data = fs::read(path).map_err(ArchiveError::Open)?;
        Self::new(data)
    }
}

impl BootArchive for CpioArchive {
    fn find(&self, name: &str) -> Option<&[u8]> {
        self.entries
            .iter()
            .find(|e| e.name == name)
            .map(|e| &self.data[e.offset..e.offset + e.len])
    }

    fn entries(&self) -> Vec<(&str, usize)> {
        self.entries
            .iter()
            .map(|e| (e.name.as_str(), e.len))
            .collect()
    }
}

/// Archive kept entirely in memory, for embedders that already hold the blobs.
#[derive(Default)]
pub struct MemoryArchive {
    blobs: BTreeMap<String, Vec<u8>>,
}

impl MemoryArchive {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, name: impl Into<String>, blob: Vec<u8>) -> &mut Self {
        self.blobs.insert(name.into(), blob);
        self
    }
}

impl BootArchive for MemoryArchive {
    fn find(&self, name: &str) -> Option<&[u8]> {
        self.blobs.get(name).map(|b| b.as_slice())
    }

    fn entries(&self) -> Vec<(&str, usize)> {
        self.blobs
            .iter()
            .map(|(name, blob)| (name.as_str(), blob.len()))
            .collect()
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use std::io::Write;

    use vmm_sys_util::tempfile::TempFile;

    use super::*;

    fn newc_entry(out: &mut Vec<u8>, name: &str, data: &[u8]) {
        out.extend_from_slice(NEWC_MAGIC);
        let fields = [
            0, // ino
            0o100644, // mode
            0,
            0,
            1, // nlink
            0,
            data.len(),
            0,
            0,
            0,
            0,
            name.len() + 1,
            0, // check
        ];
        for f in fields {
            out.extend_from_slice(format!("{f:08x}").as_bytes());
        }
        out.extend_from_slice(name.as_bytes());
        out.push(0);
        out.resize(align4(out.len()), 0);
        out.extend_from_slice(data);
        out.resize(align4(out.len()), 0);
    }

    pub fn newc_archive(files: &[(&str, &[u8])]) -> Vec<u8> {
        let mut out = Vec::new();
        for (name, data) in files {
            newc_entry(&mut out, name, data);
        }
        newc_entry(&mut out, NEWC_TRAILER, &[]);
        out
    }

    #[test]
    fn test_cpio_find() {
        let raw = newc_archive(&[("linux", &[0xaa; 4097]), ("./linux-dtb", b"dtb")]);
        let archive = CpioArchive::new(raw).unwrap();

        assert_eq!(archive.find("linux").unwrap(), &[0xaa; 4097][..]);
        assert_eq!(archive.find("linux-dtb").unwrap(), b"dtb");
        assert!(archive.find("initrd").is_none());
        assert_eq!(archive.entries(), vec![("linux", 4097), ("linux-dtb", 3)]);
    }

    #[test]
    fn test_cpio_bad_magic() {
        let mut raw = newc_archive(&[("linux", b"x")]);
        raw[0] = b'1';
        assert!(matches!(
            CpioArchive::new(raw),
            Err(ArchiveError::InvalidMagic(0))
        ));
    }

    #[test]
    fn test_cpio_truncated() {
        let raw = newc_archive(&[("linux", &[1; 64])]);
        assert!(matches!(
            CpioArchive::new(raw[..150].to_vec()),
            Err(ArchiveError::TruncatedData(0))
        ));
        assert!(matches!(
            CpioArchive::new(raw[..50].to_vec()),
            Err(ArchiveError::TruncatedHeader(0))
        ));
    }

    #[test]
    fn test_cpio_missing_trailer() {
        let mut raw = Vec::new();
        newc_entry(&mut raw, "linux", b"abcd");
        assert!(matches!(
            CpioArchive::new(raw),
            Err(ArchiveError::MissingTrailer)
        ));
    }

    #[test]
    fn test_cpio_invalid_field() {
        let mut raw = newc_archive(&[("linux", b"abcd")]);
        // First byte of the filesize field.
        raw[6 + NEWC_FILESIZE_FIELD * NEWC_FIELD_SIZE] = b'z';
        assert!(matches!(
            CpioArchive::new(raw),
            Err(ArchiveError::InvalidField(0))
        ));
    }

    #[test]
    fn test_cpio_signed_field() {
        let mut raw = newc_archive(&[("linux", b"abcd")]);
        let start = 6 + NEWC_FILESIZE_FIELD * NEWC_FIELD_SIZE;
        raw[start..start + NEWC_FIELD_SIZE].copy_from_slice(b"+0000004");
        assert!(matches!(
            CpioArchive::new(raw),
            Err(ArchiveError::InvalidField(0))
        ));
    }

    #[test]
    fn test_cpio_from_file() {
        let file = TempFile::new().unwrap();
        file.as_file()
            .write_all(&newc_archive(&[("linux-dtb", b"tree")]))
            .unwrap();
        let archive = CpioArchive::from_file(file.as_path()).unwrap();
        assert_eq!(archive.find("linux-dtb").unwrap(), b"tree");
    }

    #[test]
    fn test_memory_archive() {
        let mut archive = MemoryArchive::new();
        archive.insert("linux", vec![0; 16]).insert("linux-dtb", vec![1; 8]);
        assert_eq!(archive.find("linux").map(|b| b.len()), Some(16));
        assert_eq!(archive.entries().len(), 2);
    }
}
