// Filesystem helpers shared by the store, fetcher and engine adapter.

use std::fs;
use std::io::{self, Cursor};
use std::path::Path;

use tracing::warn;
use walkdir::WalkDir;
use zip::ZipArchive;

use crate::error::Result;

/// Total size in bytes of all regular files below `path`.
pub fn dir_size(path: &Path) -> io::Result<u64> {
    let mut total = 0u64;
    for entry in WalkDir::new(path) {
        let entry = entry?;
        if entry.file_type().is_file() {
            total += entry.metadata()?.len();
        }
    }
    Ok(total)
}

/// Create `path` if missing, or empty it if it already exists.
pub fn reset_dir(path: &Path) -> io::Result<()> {
    match fs::remove_dir_all(path) {
        Ok(()) => {}
        Err(e) if e.kind() == io::ErrorKind::NotFound => {}
        Err(e) => return Err(e),
    }
    fs::create_dir_all(path)
}

/// Remove `path` and everything below it. Missing paths are not an error.
pub fn remove_tree(path: &Path) -> io::Result<()> {
    match fs::remove_dir_all(path) {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(e),
    }
}

/// Unpack a zip archive held in memory into `dest`.
///
/// Entries that fail to unpack, or whose names would land outside `dest`,
/// are logged and skipped. Returns the number of files written.
pub fn extract_zip(data: &[u8], dest: &Path) -> Result<usize> {
    let mut archive = ZipArchive::new(Cursor::new(data))?;
    let mut written = 0usize;

    for i in 0..archive.len() {
        let mut entry = match archive.by_index(i) {
            Ok(entry) => entry,
            Err(e) => {
                warn!(index = i, "skipping unreadable archive entry: {}", e);
                continue;
            }
        };

        let Some(relative) = entry.enclosed_name() else {
            warn!(name = entry.name(), "skipping archive entry outside extraction root");
            continue;
        };
        let target = dest.join(relative);

        if entry.is_dir() {
            if let Err(e) = fs::create_dir_all(&target) {
                warn!(path = %target.display(), "cannot create directory: {}", e);
            }
            continue;
        }

        if let Some(parent) = target.parent() {
            if let Err(e) = fs::create_dir_all(parent) {
                warn!(path = %parent.display(), "cannot create directory: {}", e);
                continue;
            }
        }

        let copied = fs::File::create(&target).and_then(|mut out| io::copy(&mut entry, &mut out));
        match copied {
            Ok(_) => written += 1,
            Err(e) => warn!(path = %target.display(), "cannot unpack file: {}", e),
        }
    }

    Ok(written)
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use zip::write::SimpleFileOptions;
    use zip::ZipWriter;

    use super::*;

    fn archive(files: &[(&str, &str)]) -> Vec<u8> {
        let mut writer = ZipWriter::new(Cursor::new(Vec::new()));
        for (name, body) in files {
            writer.start_file(*name, SimpleFileOptions::default()).unwrap();
            writer.write_all(body.as_bytes()).unwrap();
        }
        writer.finish().unwrap().into_inner()
    }

    #[test]
    fn dir_size_sums_nested_files() {
        let dir = tempfile::tempdir().unwrap();
        fs::create_dir_all(dir.path().join("a/b")).unwrap();
        fs::write(dir.path().join("top.txt"), vec![0u8; 100]).unwrap();
        fs::write(dir.path().join("a/b/deep.txt"), vec![0u8; 23]).unwrap();
        assert_eq!(dir_size(dir.path()).unwrap(), 123);
    }

    #[test]
    fn dir_size_of_single_file_and_missing_path() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("one.txt");
        fs::write(&file, vec![0u8; 7]).unwrap();
        assert_eq!(dir_size(&file).unwrap(), 7);
        assert!(dir_size(&dir.path().join("absent")).is_err());
    }

    #[test]
    fn extract_creates_nested_tree() {
        let dir = tempfile::tempdir().unwrap();
        let data = archive(&[("src/Program.cs", "class P {}"), ("README", "hi")]);
        let n = extract_zip(&data, dir.path()).unwrap();
        assert_eq!(n, 2);
        assert_eq!(
            fs::read_to_string(dir.path().join("src/Program.cs")).unwrap(),
            "class P {}"
        );
    }

    #[test]
    fn extract_skips_escaping_entries() {
        let dir = tempfile::tempdir().unwrap();
        let dest = dir.path().join("dest");
        fs::create_dir_all(&dest).unwrap();
        let data = archive(&[("../evil.txt", "x"), ("ok.txt", "y")]);
        let n = extract_zip(&data, &dest).unwrap();
        assert_eq!(n, 1);
        assert!(!dir.path().join("evil.txt").exists());
    }

    #[test]
    fn reset_dir_empties_existing_directory() {
        let dir = tempfile::tempdir().unwrap();
        let target = dir.path().join("w");
        fs::create_dir_all(&target).unwrap();
        fs::write(target.join("stale"), "old").unwrap();
        reset_dir(&target).unwrap();
        assert!(target.is_dir());
        assert_eq!(fs::read_dir(&target).unwrap().count(), 0);
    }
}
