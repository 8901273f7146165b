//! Filesystem helpers used after writing renditions.

use std::io;
use std::path::Path;

/// Give a freshly written file its parent directory's read/write bits.
///
/// Execute bits are always stripped (`mode & 0o666`). No-op on non-Unix
/// platforms.
#[cfg(unix)]
pub fn normalize_permissions(path: &Path) -> io::Result<()> {
    use std::os::unix::fs::PermissionsExt;

    let parent = match path.parent() {
        Some(p) if !p.as_os_str().is_empty() => p,
        _ => Path::new("."),
    };
    let mode = std::fs::metadata(parent)?.permissions().mode() & 0o666;
    std::fs::set_permissions(path, std::fs::Permissions::from_mode(mode))
}

#[cfg(not(unix))]
pub fn normalize_permissions(_path: &Path) -> io::Result<()> {
    Ok(())
}
