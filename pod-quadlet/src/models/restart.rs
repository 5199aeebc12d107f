use std::hash::{Hash, Hasher};

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum RestartCondition {
    Always,
    No,
    OnFailure,
    UnlessStopped,
}

impl RestartCondition {
    pub fn as_str(self) -> &'static str {
        match self {
            RestartCondition::Always => "always",
            RestartCondition::No => "no",
            RestartCondition::OnFailure => "on-failure",
            RestartCondition::UnlessStopped => "unless-stopped",
        }
    }
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct RestartPolicy {
    pub condition: RestartCondition,
    /// Only meaningful for [`RestartCondition::OnFailure`].
    pub max_attempts: u32,
}

impl RestartPolicy {
    pub fn new(condition: RestartCondition) -> RestartPolicy {
        RestartPolicy {
            condition,
            max_attempts: 0,
        }
    }

    /// Parses `always`, `no`, `unless-stopped` and `on-failure[:N]`.
    /// Anything else is treated as `on-failure` without a retry limit.
    pub fn parse(policy: &str) -> RestartPolicy {
        match policy {
            "always" => RestartPolicy::new(RestartCondition::Always),
            "no" => RestartPolicy::new(RestartCondition::No),
            "unless-stopped" => RestartPolicy::new(RestartCondition::UnlessStopped),
            other => RestartPolicy {
                condition: RestartCondition::OnFailure,
                max_attempts: other
                    .strip_prefix("on-failure:")
                    .and_then(|attempts| attempts.trim().parse().ok())
                    .unwrap_or(0),
            },
        }
    }
}

impl Hash for RestartPolicy {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.condition.as_str().hash(state);
        if self.condition == RestartCondition::OnFailure {
            state.write_u32(self.max_attempts);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hasher::digest;

    #[test]
    fn parses_literal_conditions() {
        assert_eq!(RestartPolicy::parse("always").condition, RestartCondition::Always);
        assert_eq!(RestartPolicy::parse("no").condition, RestartCondition::No);
        assert_eq!(
            RestartPolicy::parse("unless-stopped").condition,
            RestartCondition::UnlessStopped
        );
    }

    #[test]
    fn parses_on_failure_attempts() {
        let policy = RestartPolicy::parse("on-failure:5");
        assert_eq!(policy.condition, RestartCondition::OnFailure);
        assert_eq!(policy.max_attempts, 5);

        assert_eq!(RestartPolicy::parse("on-failure").max_attempts, 0);
        assert_eq!(RestartPolicy::parse("on-failure:many").max_attempts, 0);
    }

    #[test]
    fn unknown_policies_fall_back_to_on_failure() {
        let policy = RestartPolicy::parse("sometimes");
        assert_eq!(policy.condition, RestartCondition::OnFailure);
        assert_eq!(policy.max_attempts, 0);
    }

    #[test]
    fn attempts_only_hash_for_on_failure() {
        let always = RestartPolicy::new(RestartCondition::Always);
        let always_with_attempts = RestartPolicy {
            max_attempts: 3,
            ..always
        };
        assert_eq!(digest(&always), digest(&always_with_attempts));

        assert_ne!(
            digest(&RestartPolicy::parse("on-failure:1")),
            digest(&RestartPolicy::parse("on-failure:2"))
        );
    }
}
