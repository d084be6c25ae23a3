use std::fs;
use std::io;
use std::path::{Component, Path, PathBuf};

/// Copy `item` (a file or a whole directory) from `src_dir` into `dest_root`,
/// keeping its relative path.
///
/// Returns `Ok(false)` when the source does not exist.
pub fn copy_item(src_dir: &Path, item: &str, dest_root: &Path) -> io::Result<bool> {
    // Path traversal protection: the item must stay inside both roots
    let Some(relative) = enclosed_path(item) else {
        return Err(io::Error::new(
            io::ErrorKind::InvalidInput,
            format!("refusing to copy path outside the sandbox: {}", item),
        ));
    };

    let source = src_dir.join(&relative);
    let dest = dest_root.join(&relative);

    if source.is_file() {
        if let Some(parent) = dest.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::copy(&source, &dest)?;
        Ok(true)
    } else if source.is_dir() {
        copy_dir_all(&source, &dest)?;
        Ok(true)
    } else {
        Ok(false)
    }
}

/// Recursively copy a directory tree
pub fn copy_dir_all(source: &Path, dest: &Path) -> io::Result<()> {
    fs::create_dir_all(dest)?;
    for entry in fs::read_dir(source)? {
        let entry = entry?;
        let target = dest.join(entry.file_name());
        if entry.file_type()?.is_dir() {
            copy_dir_all(&entry.path(), &target)?;
        } else {
            fs::copy(entry.path(), &target)?;
        }
    }
    Ok(())
}

/// Normalize a relative path, rejecting absolute paths and `..` components
pub fn enclosed_path(item: &str) -> Option<PathBuf> {
    let mut out = PathBuf::new();
    for component in Path::new(item).components() {
        match component {
            Component::Normal(part) => out.push(part),
            Component::CurDir => {}
            Component::ParentDir | Component::RootDir | Component::Prefix(_) => return None,
        }
    }
    if out.as_os_str().is_empty() {
        None
    } else {
        Some(out)
    }
}
