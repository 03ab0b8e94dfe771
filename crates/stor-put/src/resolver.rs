//! Destination path resolution
//!
//! Writing to an existing directory means "put the file inside it", so the
//! source's base name is appended. Anything else is written as given.

use crate::ConfigError;
use stor_client::ExistenceProbe;

/// Decide the final object path from the requested path and a probe of it.
///
/// Fails when the destination is a directory and the source has no name
/// (standard input).
pub fn resolve_destination(
    path: &str,
    probe: &ExistenceProbe,
    source_name: Option<&str>,
) -> Result<String, ConfigError> {
    match probe {
        ExistenceProbe::NotFound | ExistenceProbe::ExistingObject(_) => Ok(path.to_string()),
        ExistenceProbe::ExistingDirectory => {
            let name = source_name
                .map(basename)
                .filter(|name| !name.is_empty())
                .ok_or_else(|| ConfigError::DirectoryTargetWithoutName {
                    path: path.to_string(),
                })?;
            Ok(join(path, name))
        }
    }
}

/// Last path segment, ignoring trailing separators
pub fn basename(path: &str) -> &str {
    path.trim_end_matches(['/', '\\'])
        .rsplit(['/', '\\'])
        .next()
        .unwrap_or("")
}

fn join(dir: &str, name: &str) -> String {
    format!("{}/{}", dir.trim_end_matches('/'), name)
}
