use std::fs::{self, File};
use std::io;
use std::path::{Path, PathBuf};

#[cfg(target_os = "windows")]
use std::os::windows::process::CommandExt;

#[cfg(target_os = "windows")]
const CREATE_NO_WINDOW: u32 = 0x08000000;

pub fn write_atomic(path: &Path, contents: &[u8]) -> io::Result<()> {
    let temp_path = path.with_extension("tmp");
    if let Some(parent) = temp_path.parent() {
        fs::create_dir_all(parent)?;
    }
    let mut file = File::create(&temp_path)?;
    use std::io::Write;
    file.write_all(contents)?;
    file.sync_all()?;
    drop(file);
    fs::rename(temp_path, path)?;
    Ok(())
}

pub fn dir_size(path: &Path) -> io::Result<u64> {
    let mut total = 0;
    for entry in fs::read_dir(path)? {
        let entry = entry?;
        let metadata = entry.metadata()?;
        if metadata.is_dir() {
            total += dir_size(&entry.path())?;
        } else {
            total += metadata.len();
        }
    }
    Ok(total)
}

/// Collect every file under `root`, returned relative to `root`.
pub fn collect_files(root: &Path) -> io::Result<Vec<PathBuf>> {
    let mut files = Vec::new();
    collect_files_into(root, root, &mut files)?;
    Ok(files)
}

fn collect_files_into(root: &Path, dir: &Path, out: &mut Vec<PathBuf>) -> io::Result<()> {
    for entry in fs::read_dir(dir)? {
        let entry = entry?;
        let path = entry.path();
        if entry.metadata()?.is_dir() {
            collect_files_into(root, &path, out)?;
        } else if let Ok(relative) = path.strip_prefix(root) {
            out.push(relative.to_path_buf());
        }
    }
    Ok(())
}

pub fn copy_dir_recursive(source: &Path, target: &Path) -> io::Result<u32> {
    let mut copied = 0u32;
    fs::create_dir_all(target)?;
    for entry in fs::read_dir(source)? {
        let entry = entry?;
        let from = entry.path();
        let to = target.join(entry.file_name());
        if entry.metadata()?.is_dir() {
            copied += copy_dir_recursive(&from, &to)?;
        } else {
            if let Some(parent) = to.parent() {
                fs::create_dir_all(parent)?;
            }
            fs::copy(&from, &to)?;
            copied += 1;
        }
    }
    Ok(copied)
}

/// Remove now-empty directories from `start` up to (not including) `stop`.
pub fn prune_empty_parents(start: &Path, stop: &Path) {
    let mut current = start.to_path_buf();
    while current.starts_with(stop) && current != stop {
        match fs::read_dir(&current) {
            Ok(mut entries) => {
                if entries.next().is_some() {
                    break;
                }
            }
            Err(_) => break,
        }
        if fs::remove_dir(&current).is_err() {
            break;
        }
        if !current.pop() {
            break;
        }
    }
}

/// Mark a path hidden where the host filesystem supports it. Best-effort:
/// the dot-prefixed name already hides it on Unix.
pub fn hide_path(path: &Path) {
    #[cfg(target_os = "windows")]
    {
        let mut command = std::process::Command::new("attrib");
        command.arg("+h").arg(path);
        command.creation_flags(CREATE_NO_WINDOW);
        if let Err(err) = command.status() {
            tracing::debug!("could not hide {}: {}", path.display(), err);
        }
    }
    #[cfg(not(target_os = "windows"))]
    {
        let _ = path;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn collect_files_walks_nested_dirs() {
        let dir = tempdir().unwrap();
        fs::create_dir_all(dir.path().join("a/b")).unwrap();
        fs::write(dir.path().join("top.txt"), b"x").unwrap();
        fs::write(dir.path().join("a/b/deep.txt"), b"y").unwrap();

        let mut files = collect_files(dir.path()).unwrap();
        files.sort();
        assert_eq!(files, vec![PathBuf::from("a/b/deep.txt"), PathBuf::from("top.txt")]);
    }

    #[test]
    fn prune_stops_at_non_empty_and_at_root() {
        let dir = tempdir().unwrap();
        let root = dir.path();
        fs::create_dir_all(root.join("a/b/c")).unwrap();
        fs::write(root.join("a/keep.txt"), b"k").unwrap();

        prune_empty_parents(&root.join("a/b/c"), root);

        assert!(!root.join("a/b").exists());
        assert!(root.join("a").exists());
        assert!(root.join("a/keep.txt").exists());
    }

    #[test]
    fn copy_dir_recursive_reports_file_count() {
        let src = tempdir().unwrap();
        let dst = tempdir().unwrap();
        fs::create_dir_all(src.path().join("sub")).unwrap();
        fs::write(src.path().join("one.bin"), b"1").unwrap();
        fs::write(src.path().join("sub/two.bin"), b"2").unwrap();

        let copied = copy_dir_recursive(src.path(), dst.path()).unwrap();
        assert_eq!(copied, 2);
        assert_eq!(fs::read(dst.path().join("sub/two.bin")).unwrap(), b"2");
    }
}
