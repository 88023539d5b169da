//! Deterministic zip packaging of a directory tree.

use std::ffi::OsString;
use std::fs::{self, File};
use std::io;
use std::path::{Path, PathBuf, StripPrefixError};
use zip::write::SimpleFileOptions;
use zip::ZipWriter;

/// Packages the entire contents of `src_dir` into a zip archive at `dest_file`.
///
/// Output is byte-identical for identical input trees regardless of filesystem
/// iteration order: entries are sorted by relative path and written with fixed
/// timestamps and permissions. Directory entries are included so empty
/// directories survive the round trip.
///
/// The archive is staged next to `dest_file` and only renamed into place after
/// it was written completely. A failure mid-archive removes the staging file
/// and never leaves a truncated archive at `dest_file`.
pub fn zip_directory(src_dir: impl AsRef<Path>, dest_file: impl AsRef<Path>) -> Result<(), Error> {
    let src_dir = src_dir.as_ref();
    let dest_file = dest_file.as_ref();

    if !src_dir.is_dir() {
        return Err(Error::SourceNotADirectory(src_dir.to_path_buf()));
    }

    let mut entries = Vec::new();
    collect_entries(src_dir, src_dir, &mut entries)?;
    entries.sort();

    let staging_file = staging_path(dest_file);
    match write_archive(&staging_file, src_dir, &entries) {
        Ok(()) => {
            fs::rename(&staging_file, dest_file)?;
            Ok(())
        }
        Err(error) => {
            let _ = fs::remove_file(&staging_file);
            Err(error)
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
struct Entry {
    relative_path: PathBuf,
    is_dir: bool,
}

fn collect_entries(root: &Path, dir: &Path, entries: &mut Vec<Entry>) -> Result<(), Error> {
    for dir_entry in fs::read_dir(dir)? {
        let dir_entry = dir_entry?;
        let path = dir_entry.path();
        let relative_path = path.strip_prefix(root)?.to_path_buf();

        if dir_entry.file_type()?.is_dir() {
            entries.push(Entry {
                relative_path,
                is_dir: true,
            });
            collect_entries(root, &path, entries)?;
        } else {
            entries.push(Entry {
                relative_path,
                is_dir: false,
            });
        }
    }

    Ok(())
}

fn write_archive(archive_path: &Path, src_dir: &Path, entries: &[Entry]) -> Result<(), Error> {
    let mut zip = ZipWriter::new(File::create(archive_path)?);

    // Fixed timestamps and permissions keep repeated packaging of identical
    // trees byte-identical.
    let file_options = SimpleFileOptions::default()
        .last_modified_time(zip::DateTime::default())
        .unix_permissions(0o644);
    let dir_options = SimpleFileOptions::default()
        .last_modified_time(zip::DateTime::default())
        .unix_permissions(0o755);

    for entry in entries {
        let name = entry_name(&entry.relative_path);
        if entry.is_dir {
            zip.add_directory(name, dir_options)?;
        } else {
            zip.start_file(name, file_options)?;
            let mut file = File::open(src_dir.join(&entry.relative_path))?;
            io::copy(&mut file, &mut zip)?;
        }
    }

    zip.finish()?;
    Ok(())
}

// Forward slashes regardless of platform, as required by the zip format.
fn entry_name(relative_path: &Path) -> String {
    relative_path
        .components()
        .map(|component| component.as_os_str().to_string_lossy())
        .collect::<Vec<_>>()
        .join("/")
}

fn staging_path(dest_file: &Path) -> PathBuf {
    let mut file_name = dest_file
        .file_name()
        .map_or_else(OsString::new, ToOwned::to_owned);
    file_name.push(".incomplete");
    dest_file.with_file_name(file_name)
}

#[derive(thiserror::Error, Debug)]
pub enum Error {
    #[error("Archive source {0} is not a directory")]
    SourceNotADirectory(PathBuf),

    #[error("Error stripping archive entry prefix: {0}")]
    Prefix(#[from] StripPrefixError),

    #[error("Error writing zip archive: {0}")]
    Zip(#[from] zip::result::ZipError),

    #[error("I/O error while packaging archive: {0}")]
    Io(#[from] io::Error),
}

#[cfg(test)]
mod test {
    use super::*;
    use std::io::Read;
    use tempfile::tempdir;
    use zip::ZipArchive;

    fn populate_tree(root: &Path, files: &[(&str, &str)]) {
        for (path, contents) in files {
            let path = root.join(path);
            if let Some(parent) = path.parent() {
                fs::create_dir_all(parent).unwrap();
            }
            fs::write(path, contents).unwrap();
        }
    }

    const TEST_TREE: &[(&str, &str)] = &[
        ("stub-application.jar", "jar bytes"),
        ("build/libs/app.jar", "built artifact"),
        ("settings.gradle", "rootProject.name = 'app'"),
    ];

    #[test]
    fn packages_nested_tree() {
        let src = tempdir().unwrap();
        let dest = tempdir().unwrap();
        populate_tree(src.path(), TEST_TREE);
        fs::create_dir(src.path().join("empty")).unwrap();

        let archive_path = dest.path().join("application.zip");
        zip_directory(src.path(), &archive_path).unwrap();

        let mut archive = ZipArchive::new(File::open(&archive_path).unwrap()).unwrap();

        let mut contents = String::new();
        archive
            .by_name("build/libs/app.jar")
            .unwrap()
            .read_to_string(&mut contents)
            .unwrap();
        assert_eq!(contents, "built artifact");

        assert!(archive.by_name("empty/").is_ok());
        assert!(archive.by_name("stub-application.jar").is_ok());
    }

    #[test]
    fn repeated_packaging_is_byte_identical() {
        let src_a = tempdir().unwrap();
        let src_b = tempdir().unwrap();
        let dest = tempdir().unwrap();
        populate_tree(src_a.path(), TEST_TREE);

        // Populate the second tree in reverse order so directory iteration has
        // every chance to differ.
        let mut reversed = TEST_TREE.to_vec();
        reversed.reverse();
        populate_tree(src_b.path(), &reversed);

        let archive_a = dest.path().join("a.zip");
        let archive_b = dest.path().join("b.zip");
        let archive_c = dest.path().join("c.zip");
        zip_directory(src_a.path(), &archive_a).unwrap();
        zip_directory(src_a.path(), &archive_b).unwrap();
        zip_directory(src_b.path(), &archive_c).unwrap();

        let bytes_a = fs::read(&archive_a).unwrap();
        assert_eq!(bytes_a, fs::read(&archive_b).unwrap());
        assert_eq!(bytes_a, fs::read(&archive_c).unwrap());
    }

    #[test]
    fn no_staging_file_left_behind() {
        let src = tempdir().unwrap();
        let dest = tempdir().unwrap();
        populate_tree(src.path(), TEST_TREE);

        let archive_path = dest.path().join("application.zip");
        zip_directory(src.path(), &archive_path).unwrap();

        assert!(archive_path.is_file());
        assert!(!staging_path(&archive_path).exists());
    }

    #[test]
    fn missing_source_is_an_error() {
        let dest = tempdir().unwrap();
        let archive_path = dest.path().join("application.zip");

        let result = zip_directory(dest.path().join("does-not-exist"), &archive_path);

        assert!(matches!(result, Err(Error::SourceNotADirectory(_))));
        assert!(!archive_path.exists());
        assert!(!staging_path(&archive_path).exists());
    }

    #[test]
    fn failure_discards_partial_archive() {
        let src = tempdir().unwrap();
        let dest = tempdir().unwrap();
        populate_tree(src.path(), TEST_TREE);

        let archive_path = dest.path().join("missing-dir").join("application.zip");

        // Destination directory doesn't exist, so creating the staging file fails.
        assert!(zip_directory(src.path(), &archive_path).is_err());
        assert!(!archive_path.exists());
        assert!(!staging_path(&archive_path).exists());
    }
}
