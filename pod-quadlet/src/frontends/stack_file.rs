use log::debug;
use serde::{
    de::{self, value::MapAccessDeserializer, MapAccess, SeqAccess, Visitor},
    Deserialize, Deserializer,
};
use std::{fmt, fs, marker::PhantomData, path::Path};

use crate::{
    config::DEFINITION_FILE_NAMES,
    error::{Error, Result},
    models::{
        Build, Container, Image, KeyValues, Network, NetworkDriver, PortMap, PortRange,
        RestartCondition, RestartPolicy, Stack, Volume, VolumeMap,
    },
    services::StackFrontend,
};

#[derive(Debug, Default, Deserialize)]
struct StackDocument {
    #[serde(default)]
    containers: Option<Entries<Option<RawContainer>>>,

    #[serde(default)]
    volumes: Option<Entries<Option<RawVolume>>>,

    #[serde(default)]
    networks: Option<Entries<Option<RawNetwork>>>,
}

/// A mapping decoded into a list so repeated keys survive until
/// validation.
#[derive(Debug)]
struct Entries<T>(Vec<(String, T)>);

impl<T> Default for Entries<T> {
    fn default() -> Self {
        Entries(Vec::new())
    }
}

impl<'de, T: Deserialize<'de>> Deserialize<'de> for Entries<T> {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        struct EntriesVisitor<T>(PhantomData<T>);

        impl<'de, T: Deserialize<'de>> Visitor<'de> for EntriesVisitor<T> {
            type Value = Entries<T>;

            fn expecting(&self, f: &mut fmt::Formatter) -> fmt::Result {
                f.write_str("a mapping")
            }

            fn visit_map<A: MapAccess<'de>>(self, mut map: A) -> Result<Self::Value, A::Error> {
                let mut entries = Vec::new();
                while let Some(entry) = map.next_entry::<String, T>()? {
                    entries.push(entry);
                }
                Ok(Entries(entries))
            }
        }

        deserializer.deserialize_map(EntriesVisitor(PhantomData))
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct RawContainer {
    entrypoint: Option<StringList>,
    environment: Option<MapList>,
    image: Option<String>,
    build: Option<RawBuild>,
    init: bool,
    labels: Option<MapList>,
    networks: Option<StringList>,
    ports: Option<Vec<RawPort>>,
    restart: Option<RawRestart>,
    volumes: Option<Vec<String>>,
    #[serde(alias = "depends_on")]
    depends: Option<StringList>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct RawVolume {
    persist_on_remove: bool,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct RawNetwork {
    driver: Option<String>,
    persist_on_remove: bool,
}

/// A scalar or a list of scalars.
///
/// List entries are read as strings, which keeps their literal text. A lone
/// scalar can only be told apart from a list after YAML resolved it, so a
/// bare number is written back in its shortest form.
#[derive(Debug, Default)]
struct StringList(Vec<String>);

impl StringList {
    fn into_vec(self) -> Vec<String> {
        self.0
    }

    fn into_joined(self) -> String {
        self.0.join(" ")
    }
}

impl<'de> Deserialize<'de> for StringList {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        struct StringListVisitor;

        impl<'de> Visitor<'de> for StringListVisitor {
            type Value = StringList;

            fn expecting(&self, f: &mut fmt::Formatter) -> fmt::Result {
                f.write_str("a string or a list of strings")
            }

            fn visit_str<E: de::Error>(self, value: &str) -> Result<Self::Value, E> {
                Ok(StringList(vec![value.to_owned()]))
            }

            fn visit_bool<E: de::Error>(self, value: bool) -> Result<Self::Value, E> {
                Ok(StringList(vec![value.to_string()]))
            }

            fn visit_i64<E: de::Error>(self, value: i64) -> Result<Self::Value, E> {
                Ok(StringList(vec![value.to_string()]))
            }

            fn visit_u64<E: de::Error>(self, value: u64) -> Result<Self::Value, E> {
                Ok(StringList(vec![value.to_string()]))
            }

            fn visit_f64<E: de::Error>(self, value: f64) -> Result<Self::Value, E> {
                Ok(StringList(vec![value.to_string()]))
            }

            fn visit_seq<A: SeqAccess<'de>>(self, mut seq: A) -> Result<Self::Value, A::Error> {
                let mut values = Vec::new();
                while let Some(value) = seq.next_element::<String>()? {
                    values.push(value);
                }
                Ok(StringList(values))
            }
        }

        deserializer.deserialize_any(StringListVisitor)
    }
}

/// Key/value pairs written either as a mapping or as a list of `KEY=VALUE`
/// strings. Values are read as strings so `3.10` stays `3.10`.
#[derive(Debug, Default)]
struct MapList(KeyValues);

impl MapList {
    fn into_key_values(self) -> KeyValues {
        self.0
    }
}

impl<'de> Deserialize<'de> for MapList {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        struct MapListVisitor;

        impl<'de> Visitor<'de> for MapListVisitor {
            type Value = MapList;

            fn expecting(&self, f: &mut fmt::Formatter) -> fmt::Result {
                f.write_str("a mapping or a list of KEY=VALUE strings")
            }

            fn visit_map<A: MapAccess<'de>>(self, mut map: A) -> Result<Self::Value, A::Error> {
                let mut entries = KeyValues::new();
                while let Some(key) = map.next_key::<String>()? {
                    let value = map.next_value::<Option<String>>()?;
                    entries.push(key, value.unwrap_or_default());
                }
                Ok(MapList(entries))
            }

            fn visit_seq<A: SeqAccess<'de>>(self, mut seq: A) -> Result<Self::Value, A::Error> {
                let mut entries = KeyValues::new();
                while let Some(item) = seq.next_element::<String>()? {
                    // Entries without a `=` are dropped.
                    if let Some((key, value)) = item.split_once('=') {
                        entries.push(key, value);
                    }
                }
                Ok(MapList(entries))
            }
        }

        deserializer.deserialize_any(MapListVisitor)
    }
}

#[derive(Debug)]
enum RawBuild {
    Context(String),
    Extended(RawBuildOptions),
}

#[derive(Debug, Deserialize)]
struct RawBuildOptions {
    context: String,

    #[serde(default, alias = "dockerfile")]
    containerfile: Option<String>,

    #[serde(default)]
    tags: Option<StringList>,

    #[serde(default)]
    args: Option<MapList>,

    #[serde(default)]
    target: Option<String>,
}

impl<'de> Deserialize<'de> for RawBuild {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        struct RawBuildVisitor;

        impl<'de> Visitor<'de> for RawBuildVisitor {
            type Value = RawBuild;

            fn expecting(&self, f: &mut fmt::Formatter) -> fmt::Result {
                f.write_str("a build context or a build mapping")
            }

            fn visit_str<E: de::Error>(self, context: &str) -> Result<Self::Value, E> {
                Ok(RawBuild::Context(context.to_owned()))
            }

            fn visit_map<A: MapAccess<'de>>(self, map: A) -> Result<Self::Value, A::Error> {
                RawBuildOptions::deserialize(MapAccessDeserializer::new(map))
                    .map(RawBuild::Extended)
            }
        }

        deserializer.deserialize_any(RawBuildVisitor)
    }
}

impl RawBuild {
    fn into_build(self) -> Build {
        match self {
            RawBuild::Context(context) => Build {
                context,
                ..Default::default()
            },
            RawBuild::Extended(options) => Build {
                context: options.context,
                containerfile: options.containerfile.filter(|file| !file.is_empty()),
                tags: options.tags.map(StringList::into_vec).unwrap_or_default(),
                args: options.args.map(MapList::into_key_values).unwrap_or_default(),
                target: options.target,
            },
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum RawPort {
    Number(u16),
    Text(String),
}

impl RawPort {
    fn into_port_map(self) -> Result<PortMap> {
        match self {
            RawPort::Number(port) => Ok(PortMap {
                ip: "0.0.0.0".into(),
                host: PortRange::single(port),
                container: PortRange::single(port),
                protocol: crate::models::Protocol::Tcp,
            }),
            RawPort::Text(port) => PortMap::parse(&port),
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum RawRestart {
    Text(String),
    Flag(bool),
    Extended {
        condition: String,

        #[serde(default)]
        max_attempts: u32,
    },
}

impl RawRestart {
    fn into_policy(self) -> RestartPolicy {
        match self {
            RawRestart::Text(policy) => RestartPolicy::parse(&policy),
            RawRestart::Flag(true) => RestartPolicy::new(RestartCondition::Always),
            RawRestart::Flag(false) => RestartPolicy::new(RestartCondition::No),
            RawRestart::Extended {
                condition,
                max_attempts,
            } => {
                let mut policy = RestartPolicy::parse(&condition);
                if policy.condition == RestartCondition::OnFailure && max_attempts > 0 {
                    policy.max_attempts = max_attempts;
                }
                policy
            }
        }
    }
}

fn container(name: String, raw: RawContainer) -> Result<Container> {
    let in_container = |err: Error| match err {
        Error::MalformedInput(message) => {
            Error::MalformedInput(format!("container '{}': {}", name, message))
        }
        err => err,
    };

    let image = raw
        .image
        .as_deref()
        .map(Image::parse)
        .transpose()
        .map_err(in_container)?;

    let ports = raw
        .ports
        .unwrap_or_default()
        .into_iter()
        .map(RawPort::into_port_map)
        .collect::<Result<Vec<_>>>()
        .map_err(in_container)?;

    let volumes = raw
        .volumes
        .unwrap_or_default()
        .iter()
        .map(|volume| VolumeMap::parse(volume))
        .collect::<Result<Vec<_>>>()
        .map_err(in_container)?;

    Ok(Container {
        entrypoint: raw.entrypoint.map(StringList::into_joined).unwrap_or_default(),
        environment: raw.environment.map(MapList::into_key_values).unwrap_or_default(),
        image,
        build: raw.build.map(RawBuild::into_build),
        init: raw.init,
        labels: raw.labels.map(MapList::into_key_values).unwrap_or_default(),
        networks: raw.networks.map(StringList::into_vec).unwrap_or_default(),
        ports,
        restart: raw.restart.map(RawRestart::into_policy),
        volumes,
        depends: raw.depends.map(StringList::into_vec).unwrap_or_default(),
        name,
    })
}

/// Reads stack definition files.
pub struct StackFileFrontend;

impl StackFileFrontend {
    pub fn new() -> StackFileFrontend {
        StackFileFrontend
    }

    /// Parses a stack definition. Resource names always come from the
    /// mapping keys.
    pub fn parse(name: &str, source: &[u8]) -> Result<Stack> {
        let document = if source.iter().all(u8::is_ascii_whitespace) {
            StackDocument::default()
        } else {
            serde_yaml::from_slice::<Option<StackDocument>>(source)?.unwrap_or_default()
        };

        let containers = document
            .containers
            .unwrap_or_default()
            .0
            .into_iter()
            .map(|(name, raw)| container(name, raw.unwrap_or_default()))
            .collect::<Result<Vec<_>>>()?;

        let volumes = document
            .volumes
            .unwrap_or_default()
            .0
            .into_iter()
            .map(|(name, raw)| {
                let raw = raw.unwrap_or_default();
                Volume {
                    name,
                    persist_on_remove: raw.persist_on_remove,
                }
            })
            .collect();

        let networks = document
            .networks
            .unwrap_or_default()
            .0
            .into_iter()
            .map(|(name, raw)| {
                let raw = raw.unwrap_or_default();
                Network {
                    name,
                    driver: raw.driver.as_deref().map(NetworkDriver::from_name),
                    persist_on_remove: raw.persist_on_remove,
                }
            })
            .collect();

        let stack = Stack {
            name: name.to_owned(),
            containers,
            volumes,
            networks,
        };
        debug!(
            "parsed stack {:?} with {} resource(s)",
            stack.name,
            stack.len()
        );

        Ok(stack)
    }
}

impl Default for StackFileFrontend {
    fn default() -> Self {
        StackFileFrontend::new()
    }
}

/// The stack name is the file name without its extension. Files with one of
/// the default definition names are named after their directory instead.
pub fn stack_name(path: &Path) -> Option<String> {
    let is_default = path
        .file_name()
        .and_then(|name| name.to_str())
        .map_or(false, |name| DEFINITION_FILE_NAMES.contains(&name));

    let name = if is_default {
        path.parent().and_then(Path::file_name)
    } else {
        path.file_stem()
    };

    name.and_then(|name| name.to_str()).map(str::to_owned)
}

impl StackFrontend for StackFileFrontend {
    fn stack(&mut self, path: &Path) -> Result<Stack> {
        let source = fs::read(path).map_err(|err| Error::io(path, err))?;
        let name = stack_name(path).ok_or_else(|| {
            Error::MalformedInput(format!(
                "cannot derive a stack name from {}",
                path.display()
            ))
        })?;

        StackFileFrontend::parse(&name, &source)
    }
}
