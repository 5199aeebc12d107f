use std::collections::HashSet;

use super::{RuleContext, RuleError};
use crate::models::Stack;

pub fn check_network_names(stack: &mut Stack, _: &RuleContext) -> Vec<RuleError> {
    let mut names = HashSet::new();

    stack
        .networks
        .iter()
        .filter(|network| !names.insert(network.name.as_str()))
        .map(|network| RuleError::new(format!("Duplicate network name '{}' found.", network.name)))
        .collect()
}

pub fn check_network_references(stack: &mut Stack, _: &RuleContext) -> Vec<RuleError> {
    let mut errors = Vec::new();

    for container in &stack.containers {
        for network in &container.networks {
            if stack.network(network).is_none() {
                errors.push(RuleError::new(format!(
                    "Container '{}' references undefined network '{}'.",
                    container.name, network
                )));
            }
        }
    }

    errors
}

/// Containers sharing the host network stack cannot publish ports.
pub fn check_host_network_ports(stack: &mut Stack, _: &RuleContext) -> Vec<RuleError> {
    stack
        .containers
        .iter()
        .filter(|container| !container.ports.is_empty())
        .filter(|container| {
            container
                .networks
                .iter()
                .filter_map(|name| stack.network(name))
                .any(|network| network.is_host())
        })
        .map(|container| {
            RuleError::new(format!(
                "Container '{}' uses host network and defines port mappings, which is a conflict.",
                container.name
            ))
        })
        .collect()
}
