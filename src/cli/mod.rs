use std::path::PathBuf;

use anyhow::{Result, bail};
use cfod::utils::natural::sort_paths;

pub mod command;
pub mod convert;
pub mod info;
pub mod progress;

#[cfg(test)]
pub(crate) mod fixture;

/// Expands `pattern` into files sorted in natural order, so that
/// `chunk_10` follows `chunk_9`.
pub fn expand_glob(pattern: &str) -> Result<Vec<PathBuf>> {
    let mut paths = glob::glob(pattern)?.collect::<Result<Vec<_>, _>>()?;
    paths.retain(|p| p.is_file());
    if paths.is_empty() {
        bail!("No files match {pattern}");
    }
    sort_paths(&mut paths);
    Ok(paths)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn glob_sorts_naturally() -> Result<()> {
        let dir = tempfile::tempdir()?;
        for name in ["c_10.msgpack", "c_9.msgpack", "c_100.msgpack", "notes.txt"] {
            std::fs::write(dir.path().join(name), b"")?;
        }
        std::fs::create_dir(dir.path().join("d_1.msgpack"))?;

        let pattern = format!("{}/*.msgpack", dir.path().display());
        let names: Vec<_> = expand_glob(&pattern)?
            .iter()
            .filter_map(|p| p.file_name().map(|n| n.to_string_lossy().into_owned()))
            .collect();
        assert_eq!(names, ["c_9.msgpack", "c_10.msgpack", "c_100.msgpack"]);

        assert!(expand_glob(&format!("{}/*.fil", dir.path().display())).is_err());
        Ok(())
    }
}
