//! Dump location, download and storage directories.
use std::fs::File;
use std::io::{BufWriter, ErrorKind, Read, Write};
use std::path::{Path, PathBuf};
use std::time::Duration;

use log::{debug, info, warn};
use url::Url;

use crate::config::Config;
use crate::error::Error;
use crate::pipelines::CancellationToken;

const BASE_URL: &str = "https://dumps.wikimedia.org/";
const CHUNK_SIZE: usize = 1 << 20;

/// Latest multistream articles dump of `wiki` (e.g. `enwiki`).
pub fn latest_dump_url(wiki: &str) -> String {
    format!(
        "{BASE_URL}{wiki}/latest/{wiki}-latest-pages-articles-multistream.xml.bz2"
    )
}

/// The four storage directories of a run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Directories {
    pub raw: PathBuf,
    pub intermediate: PathBuf,
    pub corpus: PathBuf,
    pub test: PathBuf,
}

impl Directories {
    pub fn from_config(config: &Config) -> Self {
        Self {
            raw: config.raw_data_dir.clone(),
            intermediate: config.intermediate_data_dir.clone(),
            corpus: config.corpus_dir.clone(),
            test: config.test_data_dir.clone(),
        }
    }

    /// Create missing directories. Existing ones are left untouched.
    pub fn prepare(&self) -> Result<(), Error> {
        for dir in [&self.raw, &self.intermediate, &self.corpus, &self.test] {
            debug!("creating {:?}", dir);
            std::fs::create_dir_all(dir)?;
        }
        Ok(())
    }
}

/// Resolves the dump to a local file, downloading it if needed.
pub struct DumpLocator {
    url: Url,
    raw_data_dir: PathBuf,
    check_url: bool,
    cancel: CancellationToken,
}

impl DumpLocator {
    pub fn new(url: &str, raw_data_dir: PathBuf, check_url: bool) -> Result<Self, Error> {
        let url = Url::parse(url)
            .map_err(|e| Error::Configuration(vec![format!("invalid dump url {url:?}: {e}")]))?;
        Ok(Self {
            url,
            raw_data_dir,
            check_url,
            cancel: CancellationToken::new(),
        })
    }

    /// Stop downloading once `cancel` is set.
    pub fn with_cancel(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    pub fn from_config(config: &Config) -> Result<Self, Error> {
        let url = config
            .xml_file_url
            .clone()
            .unwrap_or_else(|| latest_dump_url(&config.wiki));
        Self::new(&url, config.raw_data_dir.clone(), config.check_url)
    }

    pub fn url(&self) -> &Url {
        &self.url
    }

    /// Local file name, taken from the last segment of the url path.
    pub fn file_name(&self) -> Result<String, Error> {
        self.url
            .path_segments()
            .and_then(|mut segments| segments.next_back())
            .filter(|name| !name.is_empty())
            .map(String::from)
            .ok_or_else(|| {
                Error::Configuration(vec![format!("dump url {} does not name a file", self.url)])
            })
    }

    pub fn local_path(&self) -> Result<PathBuf, Error> {
        Ok(self.raw_data_dir.join(self.file_name()?))
    }

    fn client() -> Result<reqwest::blocking::Client, Error> {
        // dumps are tens of gigabytes: no overall timeout
        Ok(reqwest::blocking::Client::builder()
            .timeout(None::<Duration>)
            .connect_timeout(Duration::from_secs(30))
            .build()?)
    }

    /// Check that the dump url answers.
    pub fn check(&self) -> Result<(), Error> {
        debug!("checking {}", self.url);
        Self::client()?
            .head(self.url.clone())
            .send()?
            .error_for_status()?;
        Ok(())
    }

    /// Local path of the dump, downloading it first if it is not already in the raw data directory.
    pub fn locate(&self) -> Result<PathBuf, Error> {
        let path = self.local_path()?;
        if path.is_file() {
            info!("using existing dump {:?}", path);
            return Ok(path);
        }
        if self.cancel.is_cancelled() {
            return Err(Error::Cancelled);
        }
        if self.check_url {
            self.check()?;
        }
        self.download_to(&path)?;
        Ok(path)
    }

    /// Stream the dump into `<dst>.part`, renamed to `dst` once complete.
    fn download_to(&self, dst: &Path) -> Result<(), Error> {
        info!("downloading {} to {:?}", self.url, dst);

        let response = Self::client()?
            .get(self.url.clone())
            .send()?
            .error_for_status()?;
        if let Some(len) = response.content_length() {
            info!("dump size: {} MiB", len / (1 << 20));
        }
        save(response, dst, &self.cancel)
    }
}

/// Write `src` to `<dst>.part`, then rename it to `dst`.
/// The partial file is removed if anything goes wrong, cancellation included.
fn save(mut src: impl Read, dst: &Path, cancel: &CancellationToken) -> Result<(), Error> {
    let mut partial = dst.as_os_str().to_owned();
    partial.push(".part");
    let partial = PathBuf::from(partial);

    let written = File::create(&partial)
        .map_err(Error::from)
        .and_then(|file| {
            let mut out = BufWriter::new(file);
            let copied = copy_until_cancelled(&mut src, &mut out, cancel)?;
            out.flush()?;
            Ok(copied)
        })
        .and_then(|copied| {
            std::fs::rename(&partial, dst)?;
            Ok(copied)
        });

    match written {
        Ok(copied) => {
            debug!("downloaded {} bytes", copied);
            Ok(())
        }
        Err(e) => {
            warn!("download of {:?} failed, removing {:?}", dst, partial);
            if let Err(rm) = std::fs::remove_file(&partial) {
                if rm.kind() != ErrorKind::NotFound {
                    warn!("could not remove {:?}: {}", partial, rm);
                }
            }
            Err(e)
        }
    }
}

/// [std::io::copy], checking `cancel` between chunks.
fn copy_until_cancelled<R: Read, W: Write>(
    src: &mut R,
    dst: &mut W,
    cancel: &CancellationToken,
) -> Result<u64, Error> {
    let mut buf = vec![0; CHUNK_SIZE];
    let mut copied = 0;
    loop {
        if cancel.is_cancelled() {
            return Err(Error::Cancelled);
        }
        let n = match src.read(&mut buf) {
            Ok(0) => return Ok(copied),
            Ok(n) => n,
            Err(e) if e.kind() == ErrorKind::Interrupted => continue,
            Err(e) => return Err(e.into()),
        };
        dst.write_all(&buf[..n])?;
        copied += n as u64;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn latest_url() {
        assert_eq!(
            latest_dump_url("enwiki"),
            "https://dumps.wikimedia.org/enwiki/latest/enwiki-latest-pages-articles-multistream.xml.bz2"
        );
    }

    #[test]
    fn file_name_from_url() {
        let locator = DumpLocator::new(
            "https://dumps.wikimedia.org/frwiki/20240101/frwiki-20240101-pages-articles-multistream.xml.bz2",
            PathBuf::from("raw"),
            true,
        )
        .unwrap();
        assert_eq!(
            locator.local_path().unwrap(),
            PathBuf::from("raw/frwiki-20240101-pages-articles-multistream.xml.bz2")
        );

        let dir_url = DumpLocator::new("https://dumps.wikimedia.org/", PathBuf::from("raw"), true)
            .unwrap();
        assert!(matches!(dir_url.file_name(), Err(Error::Configuration(_))));
    }

    #[test]
    fn existing_dump_is_reused() {
        let tmp = tempfile::tempdir().unwrap();
        let dump = tmp.path().join("dump.xml.bz2");
        std::fs::write(&dump, b"BZh9").unwrap();

        // an unreachable host: locate must not touch the network
        let locator = DumpLocator::new(
            "http://invalid.invalid/dump.xml.bz2",
            tmp.path().to_path_buf(),
            true,
        )
        .unwrap();
        assert_eq!(locator.locate().unwrap(), dump);
    }

    /// Hands out `chunks` chunks, then cancels the run.
    struct CancellingReader {
        chunks: usize,
        cancel: CancellationToken,
    }

    impl Read for CancellingReader {
        fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
            if self.chunks == 0 {
                self.cancel.cancel();
            } else {
                self.chunks -= 1;
            }
            buf[0] = b'x';
            Ok(1)
        }
    }

    struct FailingReader;

    impl Read for FailingReader {
        fn read(&mut self, _: &mut [u8]) -> std::io::Result<usize> {
            Err(std::io::Error::new(ErrorKind::ConnectionReset, "reset"))
        }
    }

    #[test]
    fn save_renames_complete_download() {
        let tmp = tempfile::tempdir().unwrap();
        let dst = tmp.path().join("dump.xml.bz2");
        save(&b"BZh9 data"[..], &dst, &CancellationToken::new()).unwrap();
        assert_eq!(std::fs::read(&dst).unwrap(), b"BZh9 data");
        assert!(!tmp.path().join("dump.xml.bz2.part").exists());
    }

    #[test]
    fn cancelled_download_leaves_nothing() {
        let tmp = tempfile::tempdir().unwrap();
        let dst = tmp.path().join("dump.xml.bz2");
        let cancel = CancellationToken::new();
        let src = CancellingReader {
            chunks: 3,
            cancel: cancel.clone(),
        };

        assert!(matches!(save(src, &dst, &cancel), Err(Error::Cancelled)));
        assert!(!dst.exists());
        assert_eq!(std::fs::read_dir(tmp.path()).unwrap().count(), 0);
    }

    #[test]
    fn failed_download_leaves_nothing() {
        let tmp = tempfile::tempdir().unwrap();
        let dst = tmp.path().join("dump.xml.bz2");
        assert!(matches!(
            save(FailingReader, &dst, &CancellationToken::new()),
            Err(Error::Io(_))
        ));
        assert_eq!(std::fs::read_dir(tmp.path()).unwrap().count(), 0);
    }

    #[test]
    fn cancelled_locate_does_not_download() {
        let tmp = tempfile::tempdir().unwrap();
        let cancel = CancellationToken::new();
        cancel.cancel();
        let locator = DumpLocator::new(
            "http://127.0.0.1:9/dump.xml.bz2",
            tmp.path().to_path_buf(),
            false,
        )
        .unwrap()
        .with_cancel(cancel);
        assert!(matches!(locator.locate(), Err(Error::Cancelled)));
        assert_eq!(std::fs::read_dir(tmp.path()).unwrap().count(), 0);
    }

    #[test]
    fn prepare_is_idempotent() {
        let tmp = tempfile::tempdir().unwrap();
        let config = Config {
            raw_data_dir: tmp.path().join("data/raw"),
            intermediate_data_dir: tmp.path().join("data/intermediate"),
            corpus_dir: tmp.path().join("data/corpus"),
            test_data_dir: tmp.path().join("data/test"),
            ..Default::default()
        };
        let dirs = Directories::from_config(&config);
        dirs.prepare().unwrap();
        std::fs::write(dirs.corpus.join("keep.txt"), b"x").unwrap();
        dirs.prepare().unwrap();
        assert!(dirs.corpus.join("keep.txt").is_file());
        assert!(dirs.test.is_dir());
    }
}
