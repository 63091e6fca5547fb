/*! Packaging of a finished run

Once every shard is in the corpus directory, we compute a sha384sum for each shard written during the run
and write them into a granularity-dependent file compatible with `sha384sum -c`.
The run report is written next to it as pretty JSON.
!*/
use std::fs::File;
use std::io;
use std::io::Write;
use std::path::{Path, PathBuf};

use log::{debug, info};
use rayon::prelude::*;
use sha2::Digest;
use sha2::Sha384;

use crate::config::DocumentType;
use crate::error::Error;
use crate::stats::{RunReport, ShardReport};

/// Create the checksum file for the given shards.
///
/// Hashes are computed in parallel, lines follow the shard order.
pub fn gen_checksum_file(
    corpus_dir: &Path,
    document_type: DocumentType,
    shards: &[ShardReport],
) -> Result<PathBuf, Error> {
    let hashes: Vec<Result<(String, String), Error>> = shards
        .par_iter()
        .map(|shard| {
            info!("[{}] hashing {:?}", document_type, shard.path);
            let hash = get_hash(&shard.path)?;
            let filename = shard
                .path
                .file_name()
                .map(|f| f.to_string_lossy().into_owned())
                .unwrap_or_default();
            Ok((hash, filename))
        })
        .collect();

    let checksum_filepath = corpus_dir.join(format!("{}_sha384.txt", document_type));
    debug!("writing hashes to: {:?}", checksum_filepath);
    let mut checksum_file = File::create(&checksum_filepath)?;

    // write filenames and hashes in sha384sum -c compatible format.
    for entry in hashes {
        let (hash, filename) = entry?;
        writeln!(&mut checksum_file, "{}  {}", hash, filename)?;
    }

    Ok(checksum_filepath)
}

/// compute the hash of the file pointed by the filepath by using [io::copy] between a file handler and the hasher.
#[inline]
fn get_hash(filepath: &Path) -> Result<String, Error> {
    let mut hasher = Sha384::new();
    let mut f = File::open(filepath)?;
    io::copy(&mut f, &mut hasher)?;
    Ok(format!("{:x}", hasher.finalize()))
}

/// Write the run report as `{granularity}_report.json`.
pub fn write_report(corpus_dir: &Path, report: &RunReport) -> Result<PathBuf, Error> {
    let path = corpus_dir.join(format!("{}_report.json", report.document_type));
    let file = File::create(&path)?;
    serde_json::to_writer_pretty(file, report)?;
    Ok(path)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stats::RunStats;

    #[test]
    fn checksum_format() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("sentence_corpus_00001.txt.gz");
        std::fs::write(&path, b"").unwrap();
        let shards = vec![ShardReport {
            sequence: 1,
            path,
            documents: 0,
        }];

        let checksums = gen_checksum_file(tmp.path(), DocumentType::Sentence, &shards).unwrap();
        assert_eq!(checksums, tmp.path().join("sentence_sha384.txt"));

        // sha384 of the empty string
        let expected = "38b060a751ac96384cd9327eb1b1e36a21fdb71114be07434c0cc7bf63f6e1da\
                        274edebfe76f65fbd51ad2f14898b95b  sentence_corpus_00001.txt.gz\n";
        assert_eq!(std::fs::read_to_string(checksums).unwrap(), expected);
    }

    #[test]
    fn report_is_json() {
        let tmp = tempfile::tempdir().unwrap();
        let report = RunReport {
            document_type: "paragraph".to_string(),
            stats: RunStats {
                pages_seen: 3,
                ..Default::default()
            },
            shards: vec![],
            sample: None,
            artifacts: vec![],
        };
        let path = write_report(tmp.path(), &report).unwrap();
        let value: serde_json::Value =
            serde_json::from_str(&std::fs::read_to_string(path).unwrap()).unwrap();
        assert_eq!(value["stats"]["pages_seen"], 3);
        assert_eq!(value["document_type"], "paragraph");
    }
}
