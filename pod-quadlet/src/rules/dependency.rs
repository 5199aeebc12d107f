use super::{RuleContext, RuleError};
use crate::{graph::DependencyGraph, models::Stack};

pub fn check_dependency_existence(stack: &mut Stack, _: &RuleContext) -> Vec<RuleError> {
    let mut errors = Vec::new();

    for container in &stack.containers {
        for dependency in &container.depends {
            if stack.container(dependency).is_none() {
                errors.push(RuleError::new(format!(
                    "Container '{}' has undefined dependency '{}'.",
                    container.name, dependency
                )));
            }
        }
    }

    errors
}

pub fn check_dependency_cycles(stack: &mut Stack, _: &RuleContext) -> Vec<RuleError> {
    DependencyGraph::new(stack)
        .cycles()
        .into_iter()
        .map(|cycle| {
            RuleError::new(format!(
                "circular dependency detected: {}",
                cycle.join(" -> ")
            ))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Container;

    fn context() -> RuleContext {
        RuleContext {
            base_dir: ".".into(),
        }
    }

    fn depending(name: &str, depends: &[&str]) -> Container {
        Container {
            name: name.into(),
            depends: depends.iter().map(|d| d.to_string()).collect(),
            ..Default::default()
        }
    }

    #[test]
    fn undeclared_dependencies_are_reported() {
        let mut stack = Stack {
            name: "app".into(),
            containers: vec![depending("web", &["db", "cache"]), depending("db", &[])],
            ..Default::default()
        };

        assert_eq!(
            check_dependency_existence(&mut stack, &context()),
            vec![RuleError::new("Container 'web' has undefined dependency 'cache'.")]
        );
    }

    #[test]
    fn a_cycle_is_reported_once() {
        let mut stack = Stack {
            name: "app".into(),
            containers: vec![
                depending("A", &["B"]),
                depending("B", &["C"]),
                depending("C", &["A"]),
            ],
            ..Default::default()
        };

        assert_eq!(
            check_dependency_cycles(&mut stack, &context()),
            vec![RuleError::new("circular dependency detected: A -> B -> C -> A")]
        );
    }

    #[test]
    fn chains_are_accepted() {
        let mut stack = Stack {
            name: "app".into(),
            containers: vec![
                depending("A", &["B"]),
                depending("B", &["C"]),
                depending("C", &[]),
            ],
            ..Default::default()
        };

        assert!(check_dependency_cycles(&mut stack, &context()).is_empty());
    }
}
