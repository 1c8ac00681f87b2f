use std::fs;
use std::io::Write;

use camino::Utf8Path;
use tempfile::NamedTempFile;

use crate::error::RefgetError;

pub fn ensure_dir(path: &Utf8Path) -> Result<(), RefgetError> {
    fs::create_dir_all(path.as_std_path())
        .map_err(|err| RefgetError::Filesystem(format!("create {path}: {err}")))
}

pub fn temp_sibling(path: &Utf8Path) -> Result<NamedTempFile, RefgetError> {
    let parent = path
        .parent()
        .ok_or_else(|| RefgetError::Filesystem(format!("invalid destination path {path}")))?;
    ensure_dir(parent)?;
    tempfile::Builder::new()
        .prefix(".refget-loader")
        .tempfile_in(parent.as_std_path())
        .map_err(|err| RefgetError::Filesystem(err.to_string()))
}

pub fn persist_atomic(temp: NamedTempFile, path: &Utf8Path) -> Result<(), RefgetError> {
    temp.as_file()
        .sync_all()
        .map_err(|err| RefgetError::Filesystem(err.to_string()))?;
    temp.persist(path.as_std_path())
        .map_err(|err| RefgetError::Filesystem(format!("persist {path}: {err}")))?;
    Ok(())
}

pub fn write_atomic(path: &Utf8Path, content: &[u8]) -> Result<(), RefgetError> {
    let mut temp = temp_sibling(path)?;
    temp.write_all(content)
        .map_err(|err| RefgetError::Filesystem(err.to_string()))?;
    persist_atomic(temp, path)
}

#[cfg(unix)]
pub fn make_executable(path: &Utf8Path) -> Result<(), RefgetError> {
    use std::os::unix::fs::PermissionsExt;

    fs::set_permissions(path.as_std_path(), fs::Permissions::from_mode(0o700))
        .map_err(|err| RefgetError::Filesystem(format!("chmod {path}: {err}")))
}

#[cfg(not(unix))]
pub fn make_executable(_path: &Utf8Path) -> Result<(), RefgetError> {
    Ok(())
}

#[cfg(unix)]
pub fn refresh_symlink(target: &Utf8Path, link: &Utf8Path) -> Result<(), RefgetError> {
    if fs::symlink_metadata(link.as_std_path()).is_ok() {
        fs::remove_file(link.as_std_path())
            .map_err(|err| RefgetError::Filesystem(format!("remove {link}: {err}")))?;
    }
    std::os::unix::fs::symlink(target.as_std_path(), link.as_std_path())
        .map_err(|err| RefgetError::Filesystem(format!("symlink {link}: {err}")))
}

#[cfg(not(unix))]
pub fn refresh_symlink(target: &Utf8Path, link: &Utf8Path) -> Result<(), RefgetError> {
    if link.as_std_path().exists() {
        fs::remove_file(link.as_std_path())
            .map_err(|err| RefgetError::Filesystem(format!("remove {link}: {err}")))?;
    }
    fs::copy(target.as_std_path(), link.as_std_path())
        .map(|_| ())
        .map_err(|err| RefgetError::Filesystem(format!("copy {link}: {err}")))
}

#[cfg(all(test, unix))]
mod tests {
    use camino::Utf8PathBuf;

    use super::*;

    #[test]
    fn symlink_replaces_stale_link() {
        let temp = tempfile::tempdir().unwrap();
        let root = Utf8PathBuf::from_path_buf(temp.path().to_path_buf()).unwrap();
        let old = root.join("old.dat");
        let new = root.join("new.dat");
        fs::write(&old, b"old").unwrap();
        fs::write(&new, b"new").unwrap();
        let link = root.join("link.dat");

        refresh_symlink(&old, &link).unwrap();
        refresh_symlink(&new, &link).unwrap();

        assert_eq!(fs::read_link(&link).unwrap(), new.as_std_path());
        assert_eq!(fs::read(&link).unwrap(), b"new");
    }

    #[test]
    fn write_atomic_creates_parents() {
        let temp = tempfile::tempdir().unwrap();
        let root = Utf8PathBuf::from_path_buf(temp.path().to_path_buf()).unwrap();
        let path = root.join("a/b/c.txt");
        write_atomic(&path, b"hello").unwrap();
        assert_eq!(fs::read_to_string(&path).unwrap(), "hello");
    }
}
