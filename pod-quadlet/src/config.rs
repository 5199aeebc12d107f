use std::path::{Path, PathBuf};

use crate::error::{Error, Result};

/// Definition file names looked for when none is given, in order.
pub const DEFINITION_FILE_NAMES: [&str; 2] = ["pod-quadlet.yaml", "pod-quadlet.yml"];

/// Everything an invocation needs to know about where things live.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Config {
    /// The stack definition file.
    pub definition: PathBuf,
    /// Where unit files are written, the directory Quadlet reads.
    pub unit_dir: PathBuf,
    /// Where snapshots are kept.
    pub data_dir: PathBuf,
    /// Log supervisor calls instead of making them.
    pub dry_run: bool,
}

impl Config {
    /// Configuration with the default unit and data directories of the
    /// current user.
    pub fn for_definition<P: Into<PathBuf>>(definition: P) -> Result<Config> {
        Ok(Config {
            definition: definition.into(),
            unit_dir: default_unit_dir()?,
            data_dir: default_data_dir()?,
            dry_run: false,
        })
    }

    /// The directory relative paths of the stack are resolved against.
    pub fn stack_dir(&self) -> &Path {
        match self.definition.parent() {
            Some(dir) if !dir.as_os_str().is_empty() => dir,
            _ => Path::new("."),
        }
    }

    /// Stacks are named after their definition file.
    pub fn stack_name(&self) -> Result<String> {
        crate::frontends::stack_name(&self.definition).ok_or_else(|| {
            Error::MalformedInput(format!(
                "cannot derive a stack name from {}",
                self.definition.display()
            ))
        })
    }
}

/// Looks for a definition file in `start` and then in each of its parents.
pub fn find_definition<P: AsRef<Path>>(start: P) -> Option<PathBuf> {
    for dir in start.as_ref().ancestors() {
        for name in DEFINITION_FILE_NAMES.iter() {
            let path = dir.join(name);
            if path.is_file() {
                return Some(path);
            }
        }
    }

    None
}

/// `~/.config/containers/systemd`, the user directory Quadlet scans.
pub fn default_unit_dir() -> Result<PathBuf> {
    dirs::config_dir()
        .map(|dir| dir.join("containers").join("systemd"))
        .ok_or_else(|| Error::MalformedInput("cannot determine the user config directory".into()))
}

/// `~/.local/share/pod-quadlet`.
pub fn default_data_dir() -> Result<PathBuf> {
    dirs::data_dir()
        .map(|dir| dir.join("pod-quadlet"))
        .ok_or_else(|| Error::MalformedInput("cannot determine the user data directory".into()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    #[test]
    fn finds_definitions_in_parent_directories() {
        let dir = TempDir::new().unwrap();
        let nested = dir.path().join("a").join("b");
        fs::create_dir_all(&nested).unwrap();
        fs::write(dir.path().join("pod-quadlet.yml"), "").unwrap();

        assert_eq!(
            find_definition(&nested),
            Some(dir.path().join("pod-quadlet.yml"))
        );
    }

    #[test]
    fn prefers_the_yaml_extension() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("pod-quadlet.yml"), "").unwrap();
        fs::write(dir.path().join("pod-quadlet.yaml"), "").unwrap();

        assert_eq!(
            find_definition(dir.path()),
            Some(dir.path().join("pod-quadlet.yaml"))
        );
    }

    #[test]
    fn stacks_are_named_after_their_file() {
        let config = Config {
            definition: "/srv/shop/storefront.yaml".into(),
            unit_dir: "/tmp/units".into(),
            data_dir: "/tmp/data".into(),
            dry_run: false,
        };

        assert_eq!(config.stack_name().unwrap(), "storefront");
        assert_eq!(config.stack_dir(), Path::new("/srv/shop"));
    }

    #[test]
    fn bare_file_names_live_in_the_current_directory() {
        let config = Config {
            definition: "stack.yml".into(),
            unit_dir: "/tmp/units".into(),
            data_dir: "/tmp/data".into(),
            dry_run: true,
        };

        assert_eq!(config.stack_dir(), Path::new("."));
    }
}
