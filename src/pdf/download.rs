//! Fetching remote documents into the local downloads directory

use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use log::info;

use super::error::ViewerError;

/// Copies a remote document to a local file
pub trait Downloader: Send + Sync {
    fn fetch(&self, url: &str, dest: &Path) -> Result<(), ViewerError>;
}

/// Local file name for a remote document: `<md5(url)>.pdf`
#[must_use]
pub fn download_path(downloads_dir: &Path, url: &str) -> PathBuf {
    let digest = md5::compute(url.as_bytes());
    downloads_dir.join(format!("{digest:x}.pdf"))
}

/// Write `reader` to `dest` through a temp file in the same directory so a
/// partial download never appears under the final name
pub fn persist_stream(reader: &mut dyn io::Read, dest: &Path) -> io::Result<u64> {
    let dir = dest.parent().unwrap_or_else(|| Path::new("."));
    fs::create_dir_all(dir)?;
    let mut tmp = tempfile::NamedTempFile::new_in(dir)?;
    let written = io::copy(reader, &mut tmp)?;
    tmp.flush()?;
    tmp.persist(dest).map_err(|e| e.error)?;
    Ok(written)
}

/// Blocking HTTP(S) downloader
#[derive(Clone, Debug, Default)]
pub struct HttpDownloader;

impl Downloader for HttpDownloader {
    fn fetch(&self, url: &str, dest: &Path) -> Result<(), ViewerError> {
        let download_err = |detail: String| ViewerError::Download {
            url: url.to_string(),
            detail,
        };

        let response = ureq::get(url)
            .call()
            .map_err(|e| download_err(e.to_string()))?;
        let mut body = response.into_reader();
        let written = persist_stream(&mut body, dest).map_err(|e| download_err(e.to_string()))?;
        info!("Downloaded {url} ({written} bytes) to {dest:?}");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn download_path_is_md5_of_url() {
        let dir = Path::new("/tmp/downloads");
        let path = download_path(dir, "https://example.com/a.pdf");
        let expected = format!("{:x}.pdf", md5::compute(b"https://example.com/a.pdf"));
        assert_eq!(path, dir.join(expected));
    }

    #[test]
    fn persist_stream_writes_complete_file() {
        let dir = tempfile::tempdir().unwrap();
        let dest = dir.path().join("nested").join("doc.pdf");
        let mut data: &[u8] = b"%PDF-1.4 body";

        let written = persist_stream(&mut data, &dest).unwrap();

        assert_eq!(written, 13);
        assert_eq!(fs::read(&dest).unwrap(), b"%PDF-1.4 body");
        let leftovers: Vec<_> = fs::read_dir(dest.parent().unwrap())
            .unwrap()
            .filter_map(Result::ok)
            .filter(|e| e.path() != dest)
            .collect();
        assert!(leftovers.is_empty());
    }
}
