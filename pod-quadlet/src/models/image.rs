use once_cell::sync::Lazy;
use regex::Regex;
use std::{
    fmt,
    hash::{Hash, Hasher},
    str::FromStr,
};

use crate::error::Error;

static IMAGE_REFERENCE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(concat!(
        r"^(?:([a-zA-Z0-9.-]+(?::[0-9]+)?)/)?",
        r"([a-z0-9]+(?:[._-][a-z0-9]+)*(?:/[a-z0-9]+(?:[._-][a-z0-9]+)*)*)",
        r"(?::([A-Za-z0-9_][A-Za-z0-9_.-]{0,127})|@(sha256:[0-9a-f]{64}))?$",
    ))
    .expect("invalid image reference regex")
});

/// A container image reference, `[registry/][project/]image[:tag|@digest]`.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Image {
    pub registry: Option<String>,
    pub project: Option<String>,
    pub image: String,
    pub tag: Option<String>,
    pub digest: Option<String>,
    /// Whether the reference named a registry or a project path.
    pub fully_qualified: bool,
}

impl Image {
    pub fn parse(reference: &str) -> Result<Image, Error> {
        let captures = IMAGE_REFERENCE.captures(reference).ok_or_else(|| {
            Error::MalformedInput(format!("invalid image reference: {}", reference))
        })?;

        let mut registry = captures.get(1).map(|m| m.as_str().to_owned());
        let mut segments = captures[2].split('/').map(str::to_owned).collect::<Vec<_>>();

        // The leading segment only names a registry when it looks like a
        // host, or when there is still a project in front of the image.
        if let Some(candidate) = registry.take() {
            if is_host_like(&candidate) || segments.len() >= 2 {
                registry = Some(candidate);
            } else {
                segments.insert(0, candidate);
            }
        }

        let image = segments.pop().unwrap_or_default();
        let project = if segments.is_empty() {
            None
        } else {
            Some(segments.join("/"))
        };

        let fully_qualified = registry.is_some() || project.is_some();

        Ok(Image {
            registry,
            project,
            image,
            tag: captures.get(3).map(|m| m.as_str().to_owned()),
            digest: captures.get(4).map(|m| m.as_str().to_owned()),
            fully_qualified,
        })
    }

    /// A `localhost/<name>:latest` reference for locally built images.
    pub fn local(name: &str) -> Image {
        Image {
            registry: Some("localhost".into()),
            project: None,
            image: name.into(),
            tag: Some("latest".into()),
            digest: None,
            fully_qualified: true,
        }
    }
}

fn is_host_like(segment: &str) -> bool {
    segment.contains('.') || segment.contains(':') || segment == "localhost"
}

impl FromStr for Image {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Image::parse(s)
    }
}

impl fmt::Display for Image {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(registry) = &self.registry {
            write!(f, "{}/", registry)?;
        }
        if let Some(project) = &self.project {
            write!(f, "{}/", project)?;
        }
        f.write_str(&self.image)?;
        match (&self.tag, &self.digest) {
            (Some(tag), _) => write!(f, ":{}", tag),
            (None, Some(digest)) => write!(f, "@{}", digest),
            (None, None) => Ok(()),
        }
    }
}

impl Hash for Image {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.to_string().hash(state);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn registry_with_port_project_and_tag() {
        let image = Image::parse("myregistry.local:5000/test/image:tag").unwrap();
        assert!(image.fully_qualified);
        assert_eq!(image.registry.as_deref(), Some("myregistry.local:5000"));
        assert_eq!(image.project.as_deref(), Some("test"));
        assert_eq!(image.image, "image");
        assert_eq!(image.tag.as_deref(), Some("tag"));
        assert_eq!(image.digest, None);
    }

    #[test]
    fn bare_names_are_not_fully_qualified() {
        let redis = Image::parse("redis").unwrap();
        assert!(!redis.fully_qualified);
        assert_eq!(redis.image, "redis");
        assert_eq!(redis.tag, None);

        let nginx = Image::parse("nginx:latest").unwrap();
        assert!(!nginx.fully_qualified);
        assert_eq!(nginx.tag.as_deref(), Some("latest"));
    }

    #[test]
    fn single_plain_prefix_is_a_project() {
        let image = Image::parse("library/redis:7").unwrap();
        assert_eq!(image.registry, None);
        assert_eq!(image.project.as_deref(), Some("library"));
        assert_eq!(image.image, "redis");
        assert!(image.fully_qualified);
        assert_eq!(image.to_string(), "library/redis:7");
    }

    #[test]
    fn plain_prefix_with_nested_path_is_a_registry() {
        let image = Image::parse("quay/team/app").unwrap();
        assert_eq!(image.registry.as_deref(), Some("quay"));
        assert_eq!(image.project.as_deref(), Some("team"));
        assert_eq!(image.image, "app");
    }

    #[test]
    fn localhost_is_a_registry() {
        let image = Image::parse("localhost/app").unwrap();
        assert_eq!(image.registry.as_deref(), Some("localhost"));
        assert_eq!(image.project, None);
    }

    #[test]
    fn digest_references() {
        let reference = concat!(
            "myregistry.local/test/image@sha256:",
            "e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855"
        );
        let image = Image::parse(reference).unwrap();
        assert!(image.fully_qualified);
        assert_eq!(image.tag, None);
        assert!(image.digest.as_deref().unwrap().starts_with("sha256:"));
        assert_eq!(image.to_string(), reference);
    }

    #[test]
    fn invalid_references_are_rejected() {
        for reference in &["invalid image name", "another@invalid:image", "", "UPPER"] {
            assert!(
                matches!(Image::parse(reference), Err(Error::MalformedInput(_))),
                "{:?} should not parse",
                reference
            );
        }
    }

    #[test]
    fn local_images_live_on_localhost() {
        assert_eq!(Image::local("site_web").to_string(), "localhost/site_web:latest");
    }
}
