//! Filesystem measurement and path helpers
//!
//! The volume monitor leans on these to keep its metrics fresh; the direct
//! provider uses [`file_name_from_url`] to name the streamed object.

use std::path::{Path, PathBuf};

/// Ensure a directory (and its parents) exists
pub async fn ensure_dir_exists(path: &Path) -> std::io::Result<()> {
    tokio::fs::create_dir_all(path).await?;
    tracing::debug!(path = %path.display(), "Ensured directory exists");
    Ok(())
}

/// Get available disk space for a given path
///
/// Uses platform-specific APIs to query filesystem statistics:
/// - Linux/macOS: statvfs
/// - Windows: GetDiskFreeSpaceExW
///
/// Returns the available space in bytes, or an IO error if the check fails.
pub fn available_space(path: &Path) -> std::io::Result<u64> {
    #[cfg(unix)]
    {
        use std::ffi::CString;
        use std::os::unix::ffi::OsStrExt;

        let c_path = CString::new(path.as_os_str().as_bytes())
            .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidInput, e))?;

        // SAFETY: c_path is a valid null-terminated C string, the statvfs
        // struct is zero-initialized before the call, the return value is
        // checked, and the struct is only read after a successful call.
        unsafe {
            let mut stat: libc::statvfs = std::mem::zeroed();
            if libc::statvfs(c_path.as_ptr(), &mut stat) != 0 {
                return Err(std::io::Error::last_os_error());
            }

            // f_bavail is blocks available to unprivileged users,
            // f_frsize the fragment size (preferred over f_bsize)
            Ok(stat.f_bavail.saturating_mul(stat.f_frsize))
        }
    }

    #[cfg(windows)]
    {
        use std::os::windows::ffi::OsStrExt;
        use winapi::um::fileapi::GetDiskFreeSpaceExW;

        let wide_path: Vec<u16> = path
            .as_os_str()
            .encode_wide()
            .chain(std::iter::once(0))
            .collect();

        // SAFETY: wide_path is a valid null-terminated wide string, all
        // output pointers are valid aligned u64s, the return value is
        // checked, and the outputs are only read after a successful call.
        unsafe {
            let mut free_bytes_available: u64 = 0;
            let mut _total_bytes: u64 = 0;
            let mut _total_free_bytes: u64 = 0;

            if GetDiskFreeSpaceExW(
                wide_path.as_ptr(),
                &mut free_bytes_available as *mut u64 as *mut _,
                &mut _total_bytes as *mut u64 as *mut _,
                &mut _total_free_bytes as *mut u64 as *mut _,
            ) == 0
            {
                return Err(std::io::Error::last_os_error());
            }

            Ok(free_bytes_available)
        }
    }

    #[cfg(not(any(unix, windows)))]
    {
        Err(std::io::Error::new(
            std::io::ErrorKind::Unsupported,
            "Disk space checking is not supported on this platform",
        ))
    }
}

/// Recursively measure the total size of files under a directory
///
/// Walks the tree iteratively so arbitrarily deep layouts don't recurse the
/// stack. Symlinks are not followed (`symlink_metadata` semantics of
/// `read_dir` entries apply: link targets outside the tree are not counted).
pub async fn directory_size(path: &Path) -> std::io::Result<u64> {
    let mut total: u64 = 0;
    let mut pending: Vec<PathBuf> = vec![path.to_path_buf()];

    while let Some(dir) = pending.pop() {
        let mut entries = tokio::fs::read_dir(&dir).await?;
        while let Some(entry) = entries.next_entry().await? {
            let file_type = entry.file_type().await?;
            if file_type.is_dir() {
                pending.push(entry.path());
            } else if file_type.is_file() {
                total = total.saturating_add(entry.metadata().await?.len());
            }
        }
    }

    Ok(total)
}

/// Extract a file name from a URL's final path segment
///
/// Falls back to `"download"` when the URL has no useful segment (e.g. a
/// bare host or a trailing slash).
pub fn file_name_from_url(raw_url: &str) -> String {
    if let Ok(parsed) = url::Url::parse(raw_url)
        && let Some(mut segments) = parsed.path_segments()
        && let Some(last) = segments.next_back()
        && !last.is_empty()
    {
        return last.to_string();
    }

    "download".to_string()
}
