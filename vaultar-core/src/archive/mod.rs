//! A thin streaming layer over `tar::Builder`/`tar::Archive` wrapping an
//! optional compression filter chain (`none|gzip|bzip2|xz|lz4`).

use std::fs::File;
use std::io::{self, Read, Write};
use std::path::Path;

use crate::error::{Result, VaultarError};
use crate::options::Compression;

pub const LOGICAL_CHECKSUMS: &str = "/checksums";
pub const LOGICAL_REMOVED: &str = "/removed";

pub fn logical_file_path(abs_path: &Path) -> String {
    format!("/files{}", abs_path.display())
}

enum Encoder<W: Write> {
    None(W),
    Gzip(flate2::write::GzEncoder<W>),
    Bzip2(bzip2::write::BzEncoder<W>),
    Xz(xz2::write::XzEncoder<W>),
    Lz4(lz4_flex::frame::FrameEncoder<W>),
}

impl<W: Write> Write for Encoder<W> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        match self {
            Encoder::None(w) => w.write(buf),
            Encoder::Gzip(w) => w.write(buf),
            Encoder::Bzip2(w) => w.write(buf),
            Encoder::Xz(w) => w.write(buf),
            Encoder::Lz4(w) => w.write(buf),
        }
    }
    fn flush(&mut self) -> io::Result<()> {
        match self {
            Encoder::None(w) => w.flush(),
            Encoder::Gzip(w) => w.flush(),
            Encoder::Bzip2(w) => w.flush(),
            Encoder::Xz(w) => w.flush(),
            Encoder::Lz4(w) => w.flush(),
        }
    }
}

impl<W: Write> Encoder<W> {
    fn finish(self) -> io::Result<W> {
        match self {
            Encoder::None(w) => Ok(w),
            Encoder::Gzip(w) => w.finish(),
            Encoder::Bzip2(w) => w.finish(),
            Encoder::Xz(w) => w.finish(),
            Encoder::Lz4(w) => w
                .finish()
                .map_err(|e| io::Error::new(io::ErrorKind::Other, e)),
        }
    }
}

fn wrap_writer(inner: File, compression: Compression, level: Option<u32>) -> Encoder<File> {
    match compression {
        Compression::None => Encoder::None(inner),
        Compression::Gzip => {
            let lvl = flate2::Compression::new(level.unwrap_or(6));
            Encoder::Gzip(flate2::write::GzEncoder::new(inner, lvl))
        }
        Compression::Bzip2 => {
            let lvl = bzip2::Compression::new(level.unwrap_or(6));
            Encoder::Bzip2(bzip2::write::BzEncoder::new(inner, lvl))
        }
        Compression::Xz => Encoder::Xz(xz2::write::XzEncoder::new(inner, level.unwrap_or(6))),
        Compression::Lz4 => Encoder::Lz4(lz4_flex::frame::FrameEncoder::new(inner)),
    }
}

fn wrap_reader(inner: File, compression: Compression) -> Box<dyn Read> {
    match compression {
        Compression::None => Box::new(inner),
        Compression::Gzip => Box::new(flate2::read::GzDecoder::new(inner)),
        Compression::Bzip2 => Box::new(bzip2::read::BzDecoder::new(inner)),
        Compression::Xz => Box::new(xz2::read::XzDecoder::new(inner)),
        Compression::Lz4 => Box::new(lz4_flex::frame::FrameDecoder::new(inner)),
    }
}

/// Metadata carried alongside a stream being added to the archive (spec
/// §4.6 header fields).
#[derive(Clone, Debug)]
pub struct EntryMetadata {
    pub size: u64,
    pub mode: u32,
    pub mtime: u64,
    pub uid: u32,
    pub gid: u32,
    pub uname: Option<String>,
    pub gname: Option<String>,
}

impl EntryMetadata {
    /// Build metadata for a real file, masking the mode to `0o1777` as the
    /// spec requires, and resolving owner/group names where possible.
    #[cfg(unix)]
    pub fn from_fs_metadata(metadata: &std::fs::Metadata) -> Self {
        use std::os::unix::fs::MetadataExt;
        let uid = metadata.uid();
        let gid = metadata.gid();
        EntryMetadata {
            size: metadata.size(),
            mode: metadata.mode() & 0o1777,
            mtime: metadata
                .modified()
                .ok()
                .and_then(|t| t.duration_since(std::time::UNIX_EPOCH).ok())
                .map(|d| d.as_secs())
                .unwrap_or(0),
            uid,
            gid,
            uname: users::get_user_by_uid(uid).map(|u| u.name().to_string_lossy().into_owned()),
            gname: users::get_group_by_gid(gid).map(|g| g.name().to_string_lossy().into_owned()),
        }
    }

    /// Synthetic metadata for a generated manifest stream (`/checksums`,
    /// `/removed`), owned by the running process.
    pub fn synthetic(size: u64) -> Self {
        EntryMetadata {
            size,
            mode: 0o644,
            mtime: std::time::SystemTime::now()
                .duration_since(std::time::UNIX_EPOCH)
                .map(|d| d.as_secs())
                .unwrap_or(0),
            uid: 0,
            gid: 0,
            uname: None,
            gname: None,
        }
    }
}

/// Wraps `tar::Builder` over the chosen compression filter. Must have
/// `close()` called on every exit path or the tar trailer (and any
/// compressor trailer) never gets written, leaving a truncated archive.
pub struct ArchiveWriter {
    builder: tar::Builder<Encoder<File>>,
}

impl ArchiveWriter {
    pub fn create(out_path: &Path, compression: Compression, level: Option<u32>) -> Result<Self> {
        let file = File::create(out_path)?;
        let encoder = wrap_writer(file, compression, level);
        Ok(Self {
            builder: tar::Builder::new(encoder),
        })
    }

    /// Streams `reader` into the archive under `logical_path`, in
    /// `BUF_SIZE` chunks, with a header derived from `metadata`.
    pub fn add_stream(
        &mut self,
        reader: &mut impl Read,
        logical_path: &str,
        metadata: &EntryMetadata,
    ) -> Result<()> {
        let mut header = tar::Header::new_gnu();
        header.set_size(metadata.size);
        header.set_mode(metadata.mode);
        header.set_mtime(metadata.mtime);
        header.set_uid(metadata.uid as u64);
        header.set_gid(metadata.gid as u64);
        if let Some(uname) = &metadata.uname {
            let _ = header.set_username(uname);
        }
        if let Some(gname) = &metadata.gname {
            let _ = header.set_groupname(gname);
        }
        header.set_cksum();

        self.builder
            .append_data(&mut header, logical_path, BoundedCopy(reader))?;
        Ok(())
    }

    pub fn close(mut self) -> Result<()> {
        let encoder = self.builder.into_inner()?;
        let file = encoder.finish()?;
        file.sync_all()?;
        Ok(())
    }
}

/// `tar::Builder::append_data` takes any `Read`; this wrapper exists only
/// to document that payload copies happen in the digest module's
/// `BUF_SIZE` chunks via the underlying `io::copy` inside the `tar` crate,
/// not materialized whole.
struct BoundedCopy<'a, R: Read>(&'a mut R);
impl<'a, R: Read> Read for BoundedCopy<'a, R> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.0.read(buf)
    }
}

/// Reads a finished archive back out, for prior-run extraction (spec
/// §4.8 step 3) and for the restore path.
pub struct ArchiveReader;

impl ArchiveReader {
    /// Scans headers and writes the first entry whose path equals
    /// `logical_path` to `out_path`; stops at the first match. The
    /// archive's compression must be known by the caller — it was chosen
    /// at `create` time and is not self-describing in this container.
    pub fn extract_one(
        archive_path: &Path,
        compression: Compression,
        logical_path: &str,
        out_path: &Path,
    ) -> Result<()> {
        let file = File::open(archive_path)?;
        let reader = wrap_reader(file, compression);
        Self::scan_and_extract(reader, logical_path, out_path)
    }

    fn scan_and_extract(reader: Box<dyn Read>, logical_path: &str, out_path: &Path) -> Result<()> {
        let mut archive = tar::Archive::new(reader);
        for entry in archive.entries()? {
            let mut entry = entry?;
            let path = entry.path()?.to_string_lossy().into_owned();
            if path == logical_path.trim_start_matches('/') || path == logical_path {
                let mut out = File::create(out_path)?;
                io::copy(&mut entry, &mut out)?;
                return Ok(());
            }
        }
        Err(VaultarError::Format(format!(
            "archive member not found: {logical_path}"
        )))
    }

    /// Extracts every `/files/...` member to its recorded absolute path
    /// under `dest_root`, preserving the relative structure beneath
    /// `/files`. The restore path itself sits outside this pipeline's
    /// core contract; this is the thin mechanical half of it, reusing the
    /// same container reader the backup side writes.
    pub fn unpack_files(archive_path: &Path, compression: Compression, dest_root: &Path) -> Result<u64> {
        let file = File::open(archive_path)?;
        let reader = wrap_reader(file, compression);
        let mut archive = tar::Archive::new(reader);
        let mut count = 0u64;

        for entry in archive.entries()? {
            let mut entry = entry?;
            let path = entry.path()?.to_string_lossy().into_owned();
            let Some(rel) = path.strip_prefix("files/").or_else(|| path.strip_prefix("/files/")) else {
                continue;
            };
            let dest = dest_root.join(rel);
            if let Some(parent) = dest.parent() {
                std::fs::create_dir_all(parent)?;
            }
            let mut out = File::create(&dest)?;
            io::copy(&mut entry, &mut out)?;
            #[cfg(unix)]
            {
                use std::os::unix::fs::PermissionsExt;
                let mode = entry.header().mode().unwrap_or(0o644);
                let _ = std::fs::set_permissions(&dest, std::fs::Permissions::from_mode(mode));
            }
            count += 1;
        }
        Ok(count)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    #[test]
    fn round_trips_a_single_member_uncompressed() {
        let dir = tempfile::tempdir().unwrap();
        let archive_path = dir.path().join("out.tar");

        let mut writer = ArchiveWriter::create(&archive_path, Compression::None, None).unwrap();
        let payload = b"hello\n";
        writer
            .add_stream(
                &mut Cursor::new(payload.to_vec()),
                LOGICAL_CHECKSUMS,
                &EntryMetadata::synthetic(payload.len() as u64),
            )
            .unwrap();
        writer.close().unwrap();

        let out_path = dir.path().join("checksums.out");
        ArchiveReader::extract_one(
            &archive_path,
            Compression::None,
            LOGICAL_CHECKSUMS,
            &out_path,
        )
        .unwrap();

        let got = std::fs::read(&out_path).unwrap();
        assert_eq!(got, payload);
    }

    #[test]
    fn round_trips_through_gzip() {
        let dir = tempfile::tempdir().unwrap();
        let archive_path = dir.path().join("out.tar.gz");

        let mut writer = ArchiveWriter::create(&archive_path, Compression::Gzip, None).unwrap();
        let payload = b"world";
        writer
            .add_stream(
                &mut Cursor::new(payload.to_vec()),
                LOGICAL_REMOVED,
                &EntryMetadata::synthetic(payload.len() as u64),
            )
            .unwrap();
        writer.close().unwrap();

        let out_path = dir.path().join("removed.out");
        ArchiveReader::extract_one(&archive_path, Compression::Gzip, LOGICAL_REMOVED, &out_path)
            .unwrap();

        let got = std::fs::read(&out_path).unwrap();
        assert_eq!(got, payload);
    }

    #[test]
    fn logical_file_path_is_prefixed_with_files() {
        let p = Path::new("/home/alice/docs/a.txt");
        assert_eq!(logical_file_path(p), "/files/home/alice/docs/a.txt");
    }
}
