//! Log file rotation: archiving, collision handling, retention.
//!
//! Rotation renames the active file into a `history/` directory beside it,
//! under `<stem>-<first_timestamp>-<last_timestamp><ext>`. If that exact name
//! already exists (two generations rotated within the same microsecond), a
//! `-<seq>` suffix is appended with the smallest positive integer that makes
//! the name unique. Retention keeps the newest `max_backups` rotated files,
//! ordered by the rotation timestamps embedded in the names, never by
//! filesystem metadata.

use std::fs::{self, File};
use std::io;
use std::path::{Path, PathBuf};

/// Callback replacing the built-in rotation.
///
/// Receives the active path and the just-closed handle; must leave a
/// writable, empty stream at the same path and return it. Invoked on the
/// writer thread, strictly serialized with writes.
pub type RotationStrategy = Box<dyn FnMut(&Path, File) -> io::Result<File> + Send>;

/// File stem and dot-prefixed extension of the active path.
fn split_name(path: &Path) -> (String, String) {
    let stem = path
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| String::from("log"));
    let ext = path
        .extension()
        .map(|e| format!(".{}", e.to_string_lossy()))
        .unwrap_or_default();
    (stem, ext)
}

/// The `history/` directory beside the active file.
fn history_dir(path: &Path) -> PathBuf {
    let parent = path
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .unwrap_or_else(|| Path::new("."));
    parent.join("history")
}

/// First target name in `dir` that does not exist yet.
fn unique_target(dir: &Path, stem: &str, first: &str, last: &str, ext: &str) -> PathBuf {
    let base = format!("{stem}-{first}-{last}");
    let mut candidate = dir.join(format!("{base}{ext}"));
    let mut seq = 1u32;
    while candidate.exists() {
        candidate = dir.join(format!("{base}-{seq}{ext}"));
        seq += 1;
    }
    candidate
}

/// Moves the (closed) active file into `history/`, returning the archive path.
pub(crate) fn rotate_into_history(path: &Path, first: &str, last: &str) -> io::Result<PathBuf> {
    let history = history_dir(path);
    fs::create_dir_all(&history)?;
    let (stem, ext) = split_name(path);
    let target = unique_target(&history, &stem, first, last, &ext);
    fs::rename(path, &target)?;
    Ok(target)
}

/// Deletes the oldest rotated files beyond `max_backups`.
///
/// `max_backups == 0` disables trimming. Ordering is by the timestamp
/// interval embedded in the filename, which sorts lexicographically in
/// chronological order. Returns how many files were removed.
pub(crate) fn trim_history(path: &Path, max_backups: usize) -> io::Result<usize> {
    if max_backups == 0 {
        return Ok(0);
    }
    let history = history_dir(path);
    let (stem, _) = split_name(path);
    let prefix = format!("{stem}-");

    let mut rotated: Vec<(String, PathBuf)> = Vec::new();
    for entry in fs::read_dir(&history)? {
        let entry = entry?;
        let name = entry.file_name().to_string_lossy().into_owned();
        if name.starts_with(&prefix) {
            rotated.push((name, entry.path()));
        }
    }
    if rotated.len() <= max_backups {
        return Ok(0);
    }

    rotated.sort();
    let excess = rotated.len() - max_backups;
    for (_, path) in rotated.drain(..excess) {
        fs::remove_file(path)?;
    }
    Ok(excess)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::TempDir;

    const FIRST: &str = "2025_02_06-10_05_02.123456";
    const LAST: &str = "2025_02_06-10_30_00.654321";

    #[test]
    fn test_split_name() {
        let (stem, ext) = split_name(Path::new("logs/app.log"));
        assert_eq!(stem, "app");
        assert_eq!(ext, ".log");

        let (stem, ext) = split_name(Path::new("logs/app"));
        assert_eq!(stem, "app");
        assert_eq!(ext, "");
    }

    #[test]
    fn test_rotate_into_history_moves_file() {
        let dir = TempDir::new().unwrap();
        let active = dir.path().join("app.log");
        fs::write(&active, "line one\n").unwrap();

        let target = rotate_into_history(&active, FIRST, LAST).unwrap();

        assert!(!active.exists());
        assert_eq!(
            target,
            dir.path()
                .join("history")
                .join(format!("app-{FIRST}-{LAST}.log"))
        );
        assert_eq!(fs::read_to_string(&target).unwrap(), "line one\n");
    }

    #[test]
    fn test_collision_appends_sequence() {
        let dir = TempDir::new().unwrap();
        let history = dir.path().join("history");
        fs::create_dir_all(&history).unwrap();
        let base = format!("app-{FIRST}-{LAST}.log");
        File::create(history.join(&base)).unwrap();

        let target = unique_target(&history, "app", FIRST, LAST, ".log");
        assert_eq!(target, history.join(format!("app-{FIRST}-{LAST}-1.log")));

        File::create(&target).unwrap();
        let target = unique_target(&history, "app", FIRST, LAST, ".log");
        assert_eq!(target, history.join(format!("app-{FIRST}-{LAST}-2.log")));
    }

    #[test]
    fn test_trim_keeps_newest() {
        let dir = TempDir::new().unwrap();
        let active = dir.path().join("app.log");
        let history = dir.path().join("history");
        fs::create_dir_all(&history).unwrap();

        for hour in 0..7 {
            let name = format!("app-2025_02_06-{hour:02}_00_00.000000-2025_02_06-{hour:02}_59_59.999999.log");
            let mut file = File::create(history.join(name)).unwrap();
            writeln!(file, "gen {hour}").unwrap();
        }

        let removed = trim_history(&active, 5).unwrap();
        assert_eq!(removed, 2);

        let mut remaining: Vec<String> = fs::read_dir(&history)
            .unwrap()
            .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
            .collect();
        remaining.sort();
        assert_eq!(remaining.len(), 5);
        // The two oldest generations are gone.
        assert!(remaining[0].contains("02_00_00"));
    }

    #[test]
    fn test_trim_disabled_with_zero() {
        let dir = TempDir::new().unwrap();
        let active = dir.path().join("app.log");
        let history = dir.path().join("history");
        fs::create_dir_all(&history).unwrap();
        for hour in 0..3 {
            File::create(history.join(format!(
                "app-2025_02_06-{hour:02}_00_00.000000-2025_02_06-{hour:02}_59_59.999999.log"
            )))
            .unwrap();
        }

        assert_eq!(trim_history(&active, 0).unwrap(), 0);
        assert_eq!(fs::read_dir(&history).unwrap().count(), 3);
    }

    #[test]
    fn test_trim_ignores_unrelated_files() {
        let dir = TempDir::new().unwrap();
        let active = dir.path().join("app.log");
        let history = dir.path().join("history");
        fs::create_dir_all(&history).unwrap();
        File::create(history.join("other-2025_02_06-00_00_00.000000.log")).unwrap();
        for hour in 0..6 {
            File::create(history.join(format!(
                "app-2025_02_06-{hour:02}_00_00.000000-2025_02_06-{hour:02}_59_59.999999.log"
            )))
            .unwrap();
        }

        let removed = trim_history(&active, 5).unwrap();
        assert_eq!(removed, 1);
        assert!(history.join("other-2025_02_06-00_00_00.000000.log").exists());
    }
}
