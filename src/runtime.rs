//! Locating the external programs the binaries run (`kubectl`, the catalog
//! mutation scripts).

use anyhow::{Result, bail};
use std::env;
use std::path::{Path, PathBuf};

/// Returns true when a file exists and has any execute bit set.
pub fn is_executable(path: &Path) -> bool {
    if !path.is_file() {
        return false;
    }
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        if let Ok(meta) = std::fs::metadata(path) {
            return meta.permissions().mode() & 0o111 != 0;
        }
        false
    }
    #[cfg(not(unix))]
    {
        true
    }
}

/// Find an executable by name somewhere on PATH.
pub fn find_on_path(name: &str) -> Option<PathBuf> {
    let paths = env::var_os("PATH")?;
    env::split_paths(&paths)
        .map(|dir| dir.join(name))
        .find(|candidate| is_executable(candidate))
}

/// Resolve `program` to an executable path.
///
/// Bare names are searched on PATH; anything with a directory component must
/// point at an executable file as given.
pub fn resolve_program(program: &Path) -> Result<PathBuf> {
    if program.components().count() > 1 {
        if is_executable(program) {
            return Ok(program.to_path_buf());
        }
        bail!("{} is not an executable file", program.display());
    }
    let name = program.to_string_lossy();
    match find_on_path(&name) {
        Some(path) => Ok(path),
        None => bail!("{name} not found on PATH"),
    }
}
