use camino::Utf8PathBuf;
use tempfile::TempDir;

/// Create a scratch directory and return it with its UTF-8 path.
pub fn scratch_dir() -> (TempDir, Utf8PathBuf) {
    let dir = TempDir::new().unwrap_or_else(|err| {
        panic!("failed to create scratch directory: {err}");
    });
    let root = Utf8PathBuf::from_path_buf(dir.path().to_path_buf()).unwrap_or_else(|path| {
        panic!("scratch directory {path:?} is not valid UTF-8");
    });
    (dir, root)
}
