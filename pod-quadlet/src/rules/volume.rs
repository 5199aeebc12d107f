use std::collections::HashSet;

use log::debug;

use super::{RuleContext, RuleError};
use crate::models::{MountType, Stack};

pub fn check_volume_names(stack: &mut Stack, _: &RuleContext) -> Vec<RuleError> {
    let mut names = HashSet::new();

    stack
        .volumes
        .iter()
        .filter(|volume| !names.insert(volume.name.as_str()))
        .map(|volume| RuleError::new(format!("Duplicate volume name '{}' found.", volume.name)))
        .collect()
}

/// Mount sources must be declared volumes or host paths that exist. Mounts
/// of host paths are turned into bind mounts.
pub fn check_volume_references(stack: &mut Stack, context: &RuleContext) -> Vec<RuleError> {
    let declared = stack
        .volumes
        .iter()
        .map(|volume| volume.name.clone())
        .collect::<HashSet<_>>();
    let mut errors = Vec::new();

    for container in &mut stack.containers {
        for mount in &mut container.volumes {
            if declared.contains(&mount.source) {
                continue;
            }

            if mount.has_path_source() && context.base_dir.join(&mount.source).exists() {
                debug!(
                    "mounting host path {:?} into container {:?}",
                    mount.source, container.name
                );
                mount.mount_type = MountType::Bind;
                continue;
            }

            errors.push(RuleError::new(format!(
                "Container '{}' references undefined volume '{}'.",
                container.name, mount.source
            )));
        }
    }

    errors
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Container, Volume, VolumeMap};
    use std::fs;
    use tempfile::TempDir;

    fn mounting(sources: &[&str]) -> Stack {
        let mut web = Container::placeholder("web");
        web.volumes = sources
            .iter()
            .enumerate()
            .map(|(i, source)| VolumeMap::parse(&format!("{}:/mnt/{}", source, i)).unwrap())
            .collect();

        Stack {
            name: "app".into(),
            containers: vec![web],
            volumes: vec![Volume::placeholder("data")],
            ..Default::default()
        }
    }

    #[test]
    fn repeated_volume_names_are_reported() {
        let mut stack = Stack {
            name: "app".into(),
            volumes: vec![Volume::placeholder("data"), Volume::placeholder("data")],
            ..Default::default()
        };
        let context = RuleContext {
            base_dir: ".".into(),
        };

        assert_eq!(
            check_volume_names(&mut stack, &context),
            vec![RuleError::new("Duplicate volume name 'data' found.")]
        );
    }

    #[test]
    fn existing_host_paths_become_bind_mounts() {
        let dir = TempDir::new().unwrap();
        fs::create_dir_all(dir.path().join("relative/path")).unwrap();
        let context = RuleContext {
            base_dir: dir.path().to_path_buf(),
        };

        let mut stack = mounting(&["data", "./relative/path"]);
        let errors = check_volume_references(&mut stack, &context);

        assert!(errors.is_empty());
        let mounts = &stack.containers[0].volumes;
        assert_eq!(mounts[0].mount_type, MountType::Volume);
        assert_eq!(mounts[1].mount_type, MountType::Bind);
    }

    #[test]
    fn missing_host_paths_are_undefined_volumes() {
        let dir = TempDir::new().unwrap();
        let context = RuleContext {
            base_dir: dir.path().to_path_buf(),
        };

        let mut stack = mounting(&["./relative/path", "cache"]);
        let errors = check_volume_references(&mut stack, &context);

        assert_eq!(
            errors,
            vec![
                RuleError::new("Container 'web' references undefined volume './relative/path'."),
                RuleError::new("Container 'web' references undefined volume 'cache'."),
            ]
        );
        assert_eq!(stack.containers[0].volumes[0].mount_type, MountType::Volume);
    }

    #[test]
    fn absolute_paths_ignore_the_base_directory() {
        let dir = TempDir::new().unwrap();
        let context = RuleContext {
            base_dir: "/nonexistent".into(),
        };

        let source = dir.path().to_string_lossy().into_owned();
        let mut stack = mounting(&[source.as_str()]);

        assert!(check_volume_references(&mut stack, &context).is_empty());
        assert_eq!(stack.containers[0].volumes[0].mount_type, MountType::Bind);
    }
}
