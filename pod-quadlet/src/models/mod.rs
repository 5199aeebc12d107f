use std::hash::{Hash, Hasher};

mod image;
mod port;
mod restart;
mod volume_map;

pub use image::Image;
pub use port::{PortMap, PortRange, Protocol};
pub use restart::{RestartCondition, RestartPolicy};
pub use volume_map::{MountType, VolumeMap};

/// Key/value pairs such as environment variables or labels.
///
/// Entries keep the order and the duplicates of the definition file so the
/// validator can report repeated keys. Hashing and rendering always go
/// through [`KeyValues::sorted`].
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct KeyValues(Vec<(String, String)>);

impl KeyValues {
    pub fn new() -> KeyValues {
        KeyValues(Vec::new())
    }

    pub fn push<K: Into<String>, V: Into<String>>(&mut self, key: K, value: V) {
        self.0.push((key.into(), value.into()));
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.0
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    /// Entries ordered by key. The sort is stable, duplicated keys keep
    /// their relative order.
    pub fn sorted(&self) -> Vec<(&str, &str)> {
        let mut entries = self.iter().collect::<Vec<_>>();
        entries.sort_by(|a, b| a.0.cmp(b.0));
        entries
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for KeyValues {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        KeyValues(
            iter.into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        )
    }
}

impl Hash for KeyValues {
    fn hash<H: Hasher>(&self, state: &mut H) {
        let sorted = self.sorted();
        state.write_usize(sorted.len());
        for (key, value) in sorted {
            key.hash(state);
            value.hash(state);
        }
    }
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Build {
    pub context: String,
    /// Path of the Containerfile relative to the context. Resolved at build
    /// time when empty.
    pub containerfile: Option<String>,
    pub tags: Vec<String>,
    pub args: KeyValues,
    pub target: Option<String>,
}

impl Hash for Build {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.context.hash(state);
        if let Some(containerfile) = &self.containerfile {
            containerfile.hash(state);
        }
        self.tags.hash(state);
        self.args.hash(state);
        if let Some(target) = &self.target {
            target.hash(state);
        }
    }
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Container {
    pub name: String,
    /// Space joined entrypoint, empty when not set.
    pub entrypoint: String,
    pub environment: KeyValues,
    pub image: Option<Image>,
    pub build: Option<Build>,
    pub init: bool,
    pub labels: KeyValues,
    pub networks: Vec<String>,
    pub ports: Vec<PortMap>,
    pub restart: Option<RestartPolicy>,
    pub volumes: Vec<VolumeMap>,
    pub depends: Vec<String>,
}

impl Container {
    /// A container known only by name, used for resources that have to be
    /// torn down.
    pub fn placeholder<N: Into<String>>(name: N) -> Container {
        Container {
            name: name.into(),
            ..Default::default()
        }
    }

    /// Tag used for images built from this container's `build` section.
    /// Image names are lowercase, whatever the stack and container are called.
    pub fn local_image(&self, stack_name: &str) -> Image {
        Image::local(&format!("{}_{}", stack_name, self.name).to_lowercase())
    }

    /// The image the unit file runs: the local build tag when the container
    /// is built, the declared image otherwise.
    pub fn effective_image(&self, stack_name: &str) -> Option<Image> {
        match (&self.build, &self.image) {
            (Some(_), _) => Some(self.local_image(stack_name)),
            (None, image) => image.clone(),
        }
    }
}

impl Hash for Container {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.name.hash(state);
        self.entrypoint.hash(state);
        self.environment.hash(state);
        // Built images are named after the stack, they are not part of the
        // container's identity.
        if self.build.is_none() {
            if let Some(image) = &self.image {
                image.hash(state);
            }
        }
        if let Some(build) = &self.build {
            build.hash(state);
        }
        state.write_u8(self.init as u8);
        self.labels.hash(state);
        self.networks.hash(state);
        self.ports.hash(state);
        if let Some(restart) = &self.restart {
            restart.hash(state);
        }
        self.volumes.hash(state);
        self.depends.hash(state);
    }
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Volume {
    pub name: String,
    pub persist_on_remove: bool,
}

impl Volume {
    pub fn placeholder<N: Into<String>>(name: N) -> Volume {
        Volume {
            name: name.into(),
            ..Default::default()
        }
    }
}

impl Hash for Volume {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.name.hash(state);
    }
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum NetworkDriver {
    Bridge,
    Host,
    Ipvlan,
    Macvlan,
}

impl NetworkDriver {
    /// Unknown drivers fall back to `bridge`.
    pub fn from_name(name: &str) -> NetworkDriver {
        match name {
            "host" => NetworkDriver::Host,
            "ipvlan" => NetworkDriver::Ipvlan,
            "macvlan" => NetworkDriver::Macvlan,
            _ => NetworkDriver::Bridge,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            NetworkDriver::Bridge => "bridge",
            NetworkDriver::Host => "host",
            NetworkDriver::Ipvlan => "ipvlan",
            NetworkDriver::Macvlan => "macvlan",
        }
    }
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Network {
    pub name: String,
    pub driver: Option<NetworkDriver>,
    pub persist_on_remove: bool,
}

impl Network {
    pub fn placeholder<N: Into<String>>(name: N) -> Network {
        Network {
            name: name.into(),
            ..Default::default()
        }
    }

    pub fn is_host(&self) -> bool {
        self.driver == Some(NetworkDriver::Host)
    }
}

impl Hash for Network {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.name.hash(state);
        if let Some(driver) = self.driver {
            driver.as_str().hash(state);
        }
    }
}

/// A parsed stack definition. Resources keep the order they were declared
/// in; lookups by name return the first declaration.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Stack {
    pub name: String,
    pub containers: Vec<Container>,
    pub volumes: Vec<Volume>,
    pub networks: Vec<Network>,
}

impl Stack {
    /// An empty stack sharing `name`.
    pub fn empty<N: Into<String>>(name: N) -> Stack {
        Stack {
            name: name.into(),
            ..Default::default()
        }
    }

    pub fn container(&self, name: &str) -> Option<&Container> {
        self.containers.iter().find(|c| c.name == name)
    }

    pub fn volume(&self, name: &str) -> Option<&Volume> {
        self.volumes.iter().find(|v| v.name == name)
    }

    pub fn network(&self, name: &str) -> Option<&Network> {
        self.networks.iter().find(|n| n.name == name)
    }

    pub fn is_empty(&self) -> bool {
        self.containers.is_empty() && self.volumes.is_empty() && self.networks.is_empty()
    }

    pub fn len(&self) -> usize {
        self.containers.len() + self.volumes.len() + self.networks.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn local_images_are_lowercase() {
        let container = Container::placeholder("API");
        assert_eq!(
            container.local_image("Shop").to_string(),
            "localhost/shop_api:latest"
        );

        let built = Container {
            build: Some(Build {
                context: ".".into(),
                ..Default::default()
            }),
            ..container
        };
        let image = built.effective_image("Shop").map(|image| image.to_string());
        assert_eq!(image.as_deref(), Some("localhost/shop_api:latest"));
    }
}
