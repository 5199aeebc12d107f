//! Structural checks run over a parsed stack before anything is generated.
//!
//! Every rule runs on every stack and the errors of all rules are collected,
//! a stack is only accepted when the list is empty.

use std::path::PathBuf;
use thiserror::Error;

use crate::models::Stack;

mod container;
mod dependency;
mod network;
mod volume;

pub use container::{
    check_container_image, check_container_names, check_environment_keys, check_mount_points,
    check_port_conflicts,
};
pub use dependency::{check_dependency_cycles, check_dependency_existence};
pub use network::{check_host_network_ports, check_network_names, check_network_references};
pub use volume::{check_volume_names, check_volume_references};

/// A single rule violation.
#[derive(Clone, Debug, PartialEq, Eq, Error)]
#[error("{0}")]
pub struct RuleError(String);

impl RuleError {
    pub fn new<M: Into<String>>(message: M) -> RuleError {
        RuleError(message.into())
    }

    pub fn message(&self) -> &str {
        &self.0
    }
}

/// What rules may know about the world outside the stack.
#[derive(Clone, Debug)]
pub struct RuleContext {
    /// Directory relative host paths are resolved against, normally the
    /// directory of the definition file.
    pub base_dir: PathBuf,
}

pub trait Rule {
    fn check(&self, stack: &mut Stack, context: &RuleContext) -> Vec<RuleError>;
}

impl<F> Rule for F
where
    F: Fn(&mut Stack, &RuleContext) -> Vec<RuleError>,
{
    fn check(&self, stack: &mut Stack, context: &RuleContext) -> Vec<RuleError> {
        self(stack, context)
    }
}

pub fn default_rules() -> Vec<Box<dyn Rule>> {
    vec![
        Box::new(check_container_names),
        Box::new(check_environment_keys),
        Box::new(check_network_names),
        Box::new(check_volume_names),
        Box::new(check_container_image),
        Box::new(check_network_references),
        Box::new(check_volume_references),
        Box::new(check_port_conflicts),
        Box::new(check_host_network_ports),
        Box::new(check_mount_points),
        Box::new(check_dependency_existence),
        Box::new(check_dependency_cycles),
    ]
}

pub struct Validator {
    context: RuleContext,
    rules: Vec<Box<dyn Rule>>,
}

impl Validator {
    pub fn new<P: Into<PathBuf>>(base_dir: P) -> Validator {
        Validator {
            context: RuleContext {
                base_dir: base_dir.into(),
            },
            rules: default_rules(),
        }
    }

    pub fn with_rules<P: Into<PathBuf>>(base_dir: P, rules: Vec<Box<dyn Rule>>) -> Validator {
        Validator {
            context: RuleContext {
                base_dir: base_dir.into(),
            },
            rules,
        }
    }

    /// Runs every rule and returns all violations. Bind mounts are
    /// reclassified in place.
    pub fn validate(&self, stack: &mut Stack) -> Vec<RuleError> {
        self.rules
            .iter()
            .flat_map(|rule| rule.check(stack, &self.context))
            .collect()
    }
}

/// Validates against the current working directory.
pub fn validate(stack: &mut Stack) -> Vec<RuleError> {
    Validator::new(".").validate(stack)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Container, Image, KeyValues, PortMap, Volume, VolumeMap};

    fn container(name: &str) -> Container {
        Container {
            name: name.into(),
            image: Some(Image::parse("alpine").unwrap()),
            ..Default::default()
        }
    }

    #[test]
    fn valid_stacks_have_no_errors() {
        let mut web = container("web");
        web.volumes.push(VolumeMap::parse("data:/data").unwrap());
        web.depends.push("db".into());

        let mut stack = Stack {
            name: "app".into(),
            containers: vec![web, container("db")],
            volumes: vec![Volume::placeholder("data")],
            ..Default::default()
        };

        assert!(validate(&mut stack).is_empty());
    }

    #[test]
    fn errors_of_every_rule_are_collected() {
        let mut web = container("web");
        web.environment = vec![("A", "1"), ("A", "2")].into_iter().collect::<KeyValues>();
        web.networks.push("missing".into());
        web.ports.push(PortMap::parse("8080:80").unwrap());

        let mut api = container("api");
        api.ports.push(PortMap::parse("8080:8080").unwrap());
        api.depends.push("ghost".into());

        let mut stack = Stack {
            name: "app".into(),
            containers: vec![web, api],
            ..Default::default()
        };

        let errors = validate(&mut stack)
            .into_iter()
            .map(|err| err.to_string())
            .collect::<Vec<_>>();

        assert_eq!(
            errors,
            vec![
                "Duplicate environment variable 'A' found in container 'web'.",
                "Container 'web' references undefined network 'missing'.",
                "Port conflict on port 8080 between containers 'web' and 'api'.",
                "Container 'api' has undefined dependency 'ghost'.",
            ]
        );
    }

    #[test]
    fn duplicate_names_do_not_hide_later_rules() {
        let mut worker = container("worker");
        worker.networks.push("back".into());

        let mut stack = Stack {
            name: "app".into(),
            containers: vec![worker, container("worker")],
            ..Default::default()
        };

        let errors = validate(&mut stack)
            .into_iter()
            .map(|err| err.to_string())
            .collect::<Vec<_>>();

        assert_eq!(
            errors,
            vec![
                "Duplicate container name 'worker' found.",
                "Container 'worker' references undefined network 'back'.",
            ]
        );
    }

    #[test]
    fn custom_rule_sets_only_run_their_rules() {
        let validator = Validator::with_rules(".", vec![Box::new(check_container_names)]);
        let mut stack = Stack {
            name: "app".into(),
            containers: vec![Container::placeholder("a"), Container::placeholder("a")],
            ..Default::default()
        };

        let errors = validator.validate(&mut stack);
        assert_eq!(errors, vec![RuleError::new("Duplicate container name 'a' found.")]);
    }
}
