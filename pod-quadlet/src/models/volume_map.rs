use once_cell::sync::Lazy;
use regex::Regex;
use std::{
    fmt,
    hash::{Hash, Hasher},
    path::Path,
    str::FromStr,
};

use crate::error::Error;

static VOLUME: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^([^:]+):([^:]+)(?::((?:rw|ro|z|Z)(?:,(?:rw|ro|z|Z))*))?$")
        .expect("invalid volume regex")
});

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum MountType {
    /// A named volume managed by podman.
    Volume,
    /// A host path mounted into the container.
    Bind,
}

/// A volume mount, `source:destination[:options]`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct VolumeMap {
    pub source: String,
    pub destination: String,
    pub options: Vec<String>,
    pub mount_type: MountType,
}

impl VolumeMap {
    pub fn parse(input: &str) -> Result<VolumeMap, Error> {
        let captures = VOLUME
            .captures(input)
            .ok_or_else(|| Error::MalformedInput(format!("invalid volume format: {}", input)))?;

        let options = captures
            .get(3)
            .map(|options| options.as_str().split(',').map(str::to_owned).collect())
            .unwrap_or_default();

        Ok(VolumeMap {
            source: captures[1].to_owned(),
            destination: captures[2].to_owned(),
            options,
            mount_type: MountType::Volume,
        })
    }

    /// Whether the source is written like a host path rather than a volume
    /// name.
    pub fn has_path_source(&self) -> bool {
        let source = Path::new(&self.source);
        source.is_absolute()
            || self.source.contains(std::path::MAIN_SEPARATOR)
            || self.source.contains('/')
            || self.source == "."
            || self.source == ".."
    }
}

impl FromStr for VolumeMap {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        VolumeMap::parse(s)
    }
}

impl fmt::Display for VolumeMap {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.source, self.destination)?;
        if !self.options.is_empty() {
            write!(f, ":{}", self.options.join(","))?;
        }
        Ok(())
    }
}

impl Hash for VolumeMap {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.to_string().hash(state);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_source_destination_and_options() {
        let volume = VolumeMap::parse("data:/var/lib/data:ro,Z").unwrap();
        assert_eq!(volume.source, "data");
        assert_eq!(volume.destination, "/var/lib/data");
        assert_eq!(volume.options, vec!["ro", "Z"]);
        assert_eq!(volume.mount_type, MountType::Volume);
    }

    #[test]
    fn renders_relative_bind_sources_unchanged() {
        let volume = VolumeMap::parse("./:/code").unwrap();
        assert_eq!(volume.to_string(), "./:/code");
        assert!(volume.has_path_source());
    }

    #[test]
    fn rejects_missing_destination_and_unknown_options() {
        assert!(VolumeMap::parse("data").is_err());
        assert!(VolumeMap::parse("data:/srv:rx").is_err());
        assert!(VolumeMap::parse("data:/srv:").is_err());
    }

    #[test]
    fn named_sources_are_not_paths() {
        assert!(!VolumeMap::parse("data:/srv").unwrap().has_path_source());
        assert!(VolumeMap::parse("/srv/data:/srv").unwrap().has_path_source());
    }
}
