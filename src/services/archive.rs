use std::fs::File;
use std::path::{Component, Path, PathBuf};

use zip::ZipArchive;

use crate::errors::{EngineError, Result};
use crate::models::{InstallationStatus, StatusCallback};

/// Unpack `archive_path` into `target_dir`, reporting percent-complete.
///
/// Returns the relative paths of every extracted file. Entries with
/// unsafe names and packaging junk are skipped. The zip backend handles
/// the legacy compression methods and non-UTF-8 (cp437/Cyrillic) entry
/// names that translation packages still ship with.
pub fn extract(
    archive_path: &Path,
    target_dir: &Path,
    on_status: Option<&StatusCallback>,
) -> Result<Vec<PathBuf>> {
    let archive_file = File::open(archive_path)?;
    let mut archive = ZipArchive::new(archive_file)
        .map_err(|e| EngineError::Extraction(format!("cannot open archive: {}", e)))?;

    let total_entries = archive.len();
    let mut extracted = Vec::new();

    for i in 0..total_entries {
        let mut file = archive
            .by_index(i)
            .map_err(|e| EngineError::Extraction(format!("cannot read archive entry: {}", e)))?;

        let Some(entry_path) = file.enclosed_name() else {
            tracing::warn!("skipping archive entry with unsafe path: {}", file.name());
            continue;
        };
        if is_ignored_archive_path(&entry_path) {
            continue;
        }

        let out_path = target_dir.join(&entry_path);

        if let Some(callback) = on_status {
            callback(InstallationStatus::with_percent(
                format!("Extracting {}", entry_path.display()),
                ((i + 1) as f64 / total_entries as f64) * 100.0,
            ));
        }

        if file.is_dir() {
            std::fs::create_dir_all(&out_path)?;
        } else {
            if let Some(parent) = out_path.parent() {
                std::fs::create_dir_all(parent)?;
            }
            let mut outfile = File::create(&out_path)?;
            std::io::copy(&mut file, &mut outfile)
                .map_err(|e| EngineError::Extraction(format!("cannot write {}: {}", entry_path.display(), e)))?;
            extracted.push(entry_path);
        }
    }

    Ok(extracted)
}

fn is_ignored_archive_path(path: &Path) -> bool {
    let first = path.components().find_map(|component| match component {
        Component::Normal(seg) => Some(seg.to_string_lossy().to_ascii_lowercase()),
        _ => None,
    });
    match first {
        Some(first) if first == "__macosx" => return true,
        None => return true,
        _ => {}
    }
    if let Some(name) = path.file_name() {
        let lower = name.to_string_lossy().to_ascii_lowercase();
        if lower == ".ds_store" || lower == "thumbs.db" {
            return true;
        }
    }
    false
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use std::sync::{Arc, Mutex};
    use tempfile::tempdir;
    use zip::write::SimpleFileOptions;
    use zip::ZipWriter;

    fn build_zip(path: &Path, entries: &[(&str, &[u8])]) {
        let file = File::create(path).unwrap();
        let mut writer = ZipWriter::new(file);
        let options = SimpleFileOptions::default();
        for (name, data) in entries {
            writer.start_file(*name, options).unwrap();
            writer.write_all(data).unwrap();
        }
        writer.finish().unwrap();
    }

    #[test]
    fn extracts_files_and_reports_relative_paths() {
        let dir = tempdir().unwrap();
        let archive = dir.path().join("pack.zip");
        build_zip(
            &archive,
            &[
                ("data.txt", b"localized".as_slice()),
                ("locale/ru.pak", b"\xd0\x9f\xd1\x80".as_slice()),
            ],
        );

        let out = dir.path().join("out");
        let mut files = extract(&archive, &out, None).unwrap();
        files.sort();

        assert_eq!(files, vec![PathBuf::from("data.txt"), PathBuf::from("locale/ru.pak")]);
        assert_eq!(std::fs::read(out.join("data.txt")).unwrap(), b"localized");
        assert!(out.join("locale/ru.pak").exists());
    }

    #[test]
    fn cyrillic_entry_names_survive_extraction() {
        let dir = tempdir().unwrap();
        let archive = dir.path().join("pack.zip");
        build_zip(&archive, &[("данные/текст.txt", b"abc".as_slice())]);

        let out = dir.path().join("out");
        let files = extract(&archive, &out, None).unwrap();

        assert_eq!(files, vec![PathBuf::from("данные/текст.txt")]);
        assert_eq!(std::fs::read(out.join("данные/текст.txt")).unwrap(), b"abc");
    }

    #[test]
    fn junk_entries_are_skipped() {
        let dir = tempdir().unwrap();
        let archive = dir.path().join("pack.zip");
        build_zip(
            &archive,
            &[
                ("__MACOSX/._data.txt", b"junk".as_slice()),
                ("Thumbs.db", b"junk".as_slice()),
                ("data.txt", b"keep".as_slice()),
            ],
        );

        let out = dir.path().join("out");
        let files = extract(&archive, &out, None).unwrap();

        assert_eq!(files, vec![PathBuf::from("data.txt")]);
        assert!(!out.join("__MACOSX").exists());
        assert!(!out.join("Thumbs.db").exists());
    }

    #[test]
    fn status_callback_reaches_full_percent() {
        let dir = tempdir().unwrap();
        let archive = dir.path().join("pack.zip");
        build_zip(&archive, &[("a.txt", b"a".as_slice()), ("b.txt", b"b".as_slice())]);

        let seen: Arc<Mutex<Vec<f64>>> = Arc::new(Mutex::new(Vec::new()));
        let seen_clone = seen.clone();
        let callback: StatusCallback = Arc::new(move |status: InstallationStatus| {
            if let Some(percent) = status.percent {
                seen_clone.lock().unwrap().push(percent);
            }
        });

        extract(&archive, &dir.path().join("out"), Some(&callback)).unwrap();

        let seen = seen.lock().unwrap();
        assert!(!seen.is_empty());
        assert!((seen.last().unwrap() - 100.0).abs() < f64::EPSILON);
    }
}
