use std::collections::{HashMap, HashSet};

use super::{RuleContext, RuleError};
use crate::models::Stack;

pub fn check_container_names(stack: &mut Stack, _: &RuleContext) -> Vec<RuleError> {
    let mut names = HashSet::new();

    stack
        .containers
        .iter()
        .filter(|container| !names.insert(container.name.as_str()))
        .map(|container| {
            RuleError::new(format!(
                "Duplicate container name '{}' found.",
                container.name
            ))
        })
        .collect()
}

pub fn check_environment_keys(stack: &mut Stack, _: &RuleContext) -> Vec<RuleError> {
    let mut errors = Vec::new();

    for container in &stack.containers {
        let mut keys = HashSet::new();
        for (key, _) in container.environment.iter() {
            if !keys.insert(key) {
                errors.push(RuleError::new(format!(
                    "Duplicate environment variable '{}' found in container '{}'.",
                    key, container.name
                )));
            }
        }
    }

    errors
}

/// The unit file needs something to run.
pub fn check_container_image(stack: &mut Stack, _: &RuleContext) -> Vec<RuleError> {
    stack
        .containers
        .iter()
        .filter(|container| container.image.is_none() && container.build.is_none())
        .map(|container| {
            RuleError::new(format!(
                "Container '{}' defines neither an image nor a build.",
                container.name
            ))
        })
        .collect()
}

/// Every host port may be published by one container only. Ranges are
/// checked port by port, each clash is reported against the container that
/// claimed the port first.
pub fn check_port_conflicts(stack: &mut Stack, _: &RuleContext) -> Vec<RuleError> {
    let mut errors = Vec::new();
    let mut claimed: HashMap<u16, &str> = HashMap::new();

    for container in &stack.containers {
        for port in container.ports.iter().flat_map(|map| map.host.ports()) {
            match claimed.get(&port) {
                Some(owner) => errors.push(RuleError::new(format!(
                    "Port conflict on port {} between containers '{}' and '{}'.",
                    port, owner, container.name
                ))),
                None => {
                    claimed.insert(port, &container.name);
                }
            }
        }
    }

    errors
}

pub fn check_mount_points(stack: &mut Stack, _: &RuleContext) -> Vec<RuleError> {
    let mut errors = Vec::new();

    for container in &stack.containers {
        let mut destinations = HashSet::new();
        for volume in &container.volumes {
            if !destinations.insert(volume.destination.as_str()) {
                errors.push(RuleError::new(format!(
                    "Container '{}' has duplicate volume mount point '{}'.",
                    container.name, volume.destination
                )));
            }
        }
    }

    errors
}
