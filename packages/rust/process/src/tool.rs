//! Executable lookup, done before any stage of a pipeline is started.

use std::path::{Path, PathBuf};

/// Find `program` the way the OS would when spawning it: paths with a
/// directory component are checked as given, bare names are searched on
/// `PATH`. The result is absolute, so it still names the same file for a
/// stage that runs in another directory.
pub fn locate(program: &Path) -> Option<PathBuf> {
    let found = if program.components().count() > 1 {
        is_executable(program).then(|| program.to_path_buf())
    } else {
        let path_var = std::env::var_os("PATH")?;
        std::env::split_paths(&path_var)
            .map(|dir| dir.join(program))
            .find(|candidate| is_executable(candidate))
    }?;
    std::path::absolute(&found).ok()
}

#[cfg(unix)]
fn is_executable(path: &Path) -> bool {
    use std::os::unix::fs::PermissionsExt;
    std::fs::metadata(path)
        .map(|m| m.is_file() && m.permissions().mode() & 0o111 != 0)
        .unwrap_or(false)
}

#[cfg(not(unix))]
fn is_executable(path: &Path) -> bool {
    path.is_file()
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;

    #[test]
    fn finds_shell_on_path() {
        let found = locate(Path::new("sh")).expect("sh on PATH");
        assert!(found.ends_with("sh"));
    }

    #[test]
    fn explicit_paths_are_checked_directly() {
        assert!(locate(Path::new("/bin/sh")).is_some());
        assert!(locate(Path::new("/nonexistent/kiln-tool")).is_none());
    }

    #[test]
    fn relative_paths_come_back_absolute() {
        // `../` up to the filesystem root, then down to /bin/sh.
        let cwd = std::env::current_dir().unwrap();
        let mut rel = PathBuf::new();
        for _ in 1..cwd.components().count() {
            rel.push("..");
        }
        rel.push("bin/sh");
        assert!(rel.is_relative());

        let found = locate(&rel).expect("relative path to sh");
        assert!(found.is_absolute());
        assert!(found.ends_with("bin/sh"));
    }

    #[test]
    fn non_executable_file_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("plain.txt");
        std::fs::write(&file, "not a program").unwrap();
        assert!(locate(&file).is_none());
    }
}
