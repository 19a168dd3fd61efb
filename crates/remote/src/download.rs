//! Download pipeline: stream a zip, extract it, install the payload.
//!
//! One transfer runs at a time per client; the [`FlightPermit`] travels
//! with the task and releases the client when the task finishes, whatever
//! the outcome. Everything lands in a [`tempfile::TempDir`] first so a
//! failure at any stage leaves neither stray files nor store rows behind.

use crate::error::{ErrorKind, Result};
use crate::flight::FlightPermit;
use bcl_manifest::{Manifest, Record, RecordKind};
use bcl_store::Store;
use exn::ResultExt;
use futures::StreamExt;
use std::fs::{self, File};
use std::io::{self, Write};
use std::path::{Component, Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, warn};

/// Completion signal handed to the registered listener and returned from
/// `wait_for_download`. `installed` is `None` when any stage failed.
#[derive(Debug, Clone)]
pub struct DownloadOutcome {
    pub uid: String,
    pub installed: Option<Record>,
}

pub(crate) type Listener = Arc<dyn Fn(&DownloadOutcome) + Send + Sync>;

/// Body of the spawned download task.
pub(crate) async fn run(
    http: reqwest::Client,
    url: String,
    uid: String,
    store: Arc<Store>,
    listener: Option<Listener>,
    permit: FlightPermit,
) -> DownloadOutcome {
    let installed = match transfer_and_install(&http, &url, &uid, &store).await {
        Ok(record) => Some(record),
        Err(err) => {
            warn!(uid, error = %err, "download failed, local store untouched");
            None
        },
    };
    drop(permit);
    let outcome = DownloadOutcome { uid, installed };
    if let Some(listener) = listener {
        listener(&outcome);
    }
    outcome
}

async fn transfer_and_install(
    http: &reqwest::Client,
    url: &str,
    uid: &str,
    store: &Store,
) -> Result<Record> {
    // Dropping the TempDir removes it, so every exit path below cleans up.
    let temp = tempfile::tempdir().map_err(ErrorKind::from)?;
    let archive_path = temp.path().join("download.zip");

    let response = http
        .get(url)
        .query(&[("uids", uid)])
        .send()
        .await
        .or_raise(|| ErrorKind::Network)?
        .error_for_status()
        .or_raise(|| ErrorKind::Network)?;
    let mut file = File::create(&archive_path).map_err(ErrorKind::from)?;
    let mut body = response.bytes_stream();
    while let Some(chunk) = body.next().await {
        let chunk = chunk.or_raise(|| ErrorKind::Network)?;
        file.write_all(&chunk).map_err(ErrorKind::from)?;
    }
    file.flush().map_err(ErrorKind::from)?;
    drop(file);

    let extracted = temp.path().join("extracted");
    fs::create_dir(&extracted).map_err(ErrorKind::from)?;
    extract_archive(&archive_path, &extracted)?;

    let record = install_payload(store, &extracted).await?;
    if record.uid != uid {
        debug!(requested = uid, received = record.uid, "registry served a different uid");
    }
    Ok(record)
}

/// Extract a zip archive into `target`, skipping housekeeping entries and
/// anything whose name would escape the target directory.
pub(crate) fn extract_archive(archive_path: &Path, target: &Path) -> Result<()> {
    let file = File::open(archive_path).map_err(ErrorKind::from)?;
    let mut archive = zip::ZipArchive::new(file).or_raise(|| ErrorKind::Archive)?;
    for index in 0..archive.len() {
        let mut entry = archive.by_index(index).or_raise(|| ErrorKind::Archive)?;
        let Some(relative) = entry.enclosed_name() else {
            warn!(name = entry.name(), "skipping archive entry with unsafe path");
            continue;
        };
        if is_housekeeping(&relative) {
            continue;
        }
        let destination = target.join(&relative);
        if entry.is_dir() {
            fs::create_dir_all(&destination).map_err(ErrorKind::from)?;
        } else {
            if let Some(parent) = destination.parent() {
                fs::create_dir_all(parent).map_err(ErrorKind::from)?;
            }
            let mut output = File::create(&destination).map_err(ErrorKind::from)?;
            io::copy(&mut entry, &mut output).map_err(ErrorKind::from)?;
        }
    }
    Ok(())
}

/// Archive entries that are packaging noise rather than payload.
pub(crate) fn is_housekeeping(relative: &Path) -> bool {
    relative.components().any(|component| {
        let Component::Normal(name) = component else {
            return false;
        };
        let name = name.to_string_lossy();
        name == "__MACOSX" || name == ".DS_Store" || name == "DISCLAIMER.txt" || name.starts_with("._")
    })
}

/// Find the directory inside `root` that holds a manifest file.
///
/// Registry archives usually wrap the payload in one or two directory
/// levels, so the search is breadth-first from the extraction root and the
/// shallowest manifest wins.
pub(crate) fn locate_manifest(root: &Path) -> Result<(RecordKind, PathBuf)> {
    let mut frontier = vec![root.to_path_buf()];
    while !frontier.is_empty() {
        let mut next = Vec::new();
        for dir in frontier {
            for kind in [RecordKind::Component, RecordKind::Measure] {
                if dir.join(kind.manifest_filename()).is_file() {
                    return Ok((kind, dir));
                }
            }
            let entries = fs::read_dir(&dir).map_err(ErrorKind::from)?;
            for entry in entries {
                let path = entry.map_err(ErrorKind::from)?.path();
                if path.is_dir() {
                    next.push(path);
                }
            }
        }
        frontier = next;
    }
    exn::bail!(ErrorKind::Validation("archive contains no manifest file"))
}

/// Parse the manifest found under `extracted` and write the payload through
/// to the local store. A manifest the parser rejects leaves the store
/// untouched.
pub(crate) async fn install_payload(store: &Store, extracted: &Path) -> Result<Record> {
    let (kind, payload_dir) = locate_manifest(extracted)?;
    let xml = fs::read_to_string(payload_dir.join(kind.manifest_filename())).map_err(ErrorKind::from)?;
    let manifest =
        Manifest::parse(kind, &xml).or_raise(|| ErrorKind::Validation("manifest rejected by parser"))?;
    store.add(&manifest, &payload_dir).await.or_raise(|| ErrorKind::Store)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use std::ops::Deref;
    use zip::write::SimpleFileOptions;

    const COMPONENT_XML: &str = r#"<?xml version="1.0"?>
<component>
  <name>Test Wall</name>
  <uid>wall-uid</uid>
  <version_id>wall-v1</version_id>
  <description>A test wall.</description>
  <attributes>
    <attribute><name>Function</name><value>Envelope</value><datatype>string</datatype></attribute>
  </attributes>
  <files>
    <file><filename>wall.osc</filename><filetype>osc</filetype></file>
  </files>
</component>"#;

    fn build_archive(path: &Path, entries: &[(&str, &str)]) {
        let file = File::create(path).unwrap();
        let mut writer = zip::ZipWriter::new(file);
        let options = SimpleFileOptions::default();
        for (name, contents) in entries {
            writer.start_file(*name, options).unwrap();
            writer.write_all(contents.as_bytes()).unwrap();
        }
        writer.finish().unwrap();
    }

    #[test]
    fn test_extract_strips_housekeeping_and_unsafe_entries() {
        let temp = tempfile::tempdir().unwrap();
        let archive = temp.path().join("a.zip");
        build_archive(
            &archive,
            &[
                ("wall-uid/component.xml", COMPONENT_XML),
                ("wall-uid/wall.osc", "payload"),
                ("wall-uid/DISCLAIMER.txt", "legal"),
                ("__MACOSX/wall-uid/._component.xml", "resource fork"),
                ("wall-uid/.DS_Store", "finder"),
                ("../evil.txt", "escape attempt"),
            ],
        );
        let target = temp.path().join("out");
        fs::create_dir(&target).unwrap();
        extract_archive(&archive, &target).unwrap();

        assert!(target.join("wall-uid/component.xml").is_file());
        assert!(target.join("wall-uid/wall.osc").is_file());
        assert!(!target.join("wall-uid/DISCLAIMER.txt").exists());
        assert!(!target.join("__MACOSX").exists());
        assert!(!target.join("wall-uid/.DS_Store").exists());
        assert!(!temp.path().join("evil.txt").exists());
    }

    #[test]
    fn test_locate_manifest_prefers_shallowest() {
        let temp = tempfile::tempdir().unwrap();
        let nested = temp.path().join("outer/wall-uid");
        fs::create_dir_all(&nested).unwrap();
        fs::write(nested.join("component.xml"), COMPONENT_XML).unwrap();
        let (kind, dir) = locate_manifest(temp.path()).unwrap();
        assert_eq!(kind, RecordKind::Component);
        assert_eq!(dir, nested);
    }

    #[test]
    fn test_locate_manifest_missing_is_a_validation_error() {
        let temp = tempfile::tempdir().unwrap();
        let err = locate_manifest(temp.path()).unwrap_err();
        assert!(matches!(err.deref(), ErrorKind::Validation(_)));
    }

    #[tokio::test]
    async fn test_install_round_trip() {
        let temp = tempfile::tempdir().unwrap();
        let archive = temp.path().join("a.zip");
        build_archive(
            &archive,
            &[("wall-uid/component.xml", COMPONENT_XML), ("wall-uid/wall.osc", "payload")],
        );
        let extracted = temp.path().join("out");
        fs::create_dir(&extracted).unwrap();
        extract_archive(&archive, &extracted).unwrap();

        let store = Store::open(temp.path().join("library")).await.unwrap();
        let record = install_payload(&store, &extracted).await.unwrap();
        assert_eq!(record.uid, "wall-uid");
        assert_eq!(record.version_id, "wall-v1");

        let fetched = store
            .get(RecordKind::Component, "wall-uid", Some("wall-v1"))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(fetched.name, "Test Wall");
        assert!(store.directory_of(&fetched).join("wall.osc").is_file());
    }

    #[tokio::test]
    async fn test_bad_manifest_leaves_store_untouched() {
        let temp = tempfile::tempdir().unwrap();
        let extracted = temp.path().join("out/broken");
        fs::create_dir_all(&extracted).unwrap();
        fs::write(extracted.join("component.xml"), "<component><name>No uid</name></component>").unwrap();

        let store = Store::open(temp.path().join("library")).await.unwrap();
        let err = install_payload(&store, temp.path().join("out").as_path()).await.unwrap_err();
        assert!(matches!(err.deref(), ErrorKind::Validation(_)));
        assert!(store.search(RecordKind::Component, "").await.unwrap().is_empty());
    }
}
