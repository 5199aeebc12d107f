//! Change detection between a parsed stack and the last applied one.
//!
//! What was applied is remembered as a [`Snapshot`]: the content hash of
//! every resource, keyed by name. A resource whose hash moved is rendered
//! again, a name that disappeared is torn down.

use chrono::{DateTime, SubsecRound, Utc};
use log::{debug, info};
use serde::{Deserialize, Serialize};
use std::{
    collections::BTreeMap,
    fs, io,
    hash::Hash,
    path::PathBuf,
};

use crate::{
    error::{Error, Result},
    generate::write_atomic,
    hasher::digest,
    models::{Container, Network, Stack, Volume},
};

pub const SNAPSHOT_VERSION: u32 = 1;

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Snapshot {
    pub version: u32,
    pub generated_at: DateTime<Utc>,
    #[serde(default)]
    pub containers: BTreeMap<String, String>,
    #[serde(default)]
    pub volumes: BTreeMap<String, String>,
    #[serde(default)]
    pub networks: BTreeMap<String, String>,
}

impl Snapshot {
    /// Hashes every resource of `stack`, stamped with the current time.
    pub fn of(stack: &Stack) -> Snapshot {
        fn hashes<'a, T: Hash + 'a>(
            resources: impl Iterator<Item = (&'a str, &'a T)>,
        ) -> BTreeMap<String, String> {
            resources
                .map(|(name, resource)| (name.to_owned(), digest(resource)))
                .collect()
        }

        Snapshot {
            version: SNAPSHOT_VERSION,
            generated_at: Utc::now().trunc_subsecs(0),
            containers: hashes(stack.containers.iter().map(|c| (c.name.as_str(), c))),
            volumes: hashes(stack.volumes.iter().map(|v| (v.name.as_str(), v))),
            networks: hashes(stack.networks.iter().map(|n| (n.name.as_str(), n))),
        }
    }

    fn decode(source: &str) -> Result<Snapshot> {
        // The version is checked before the layout so an incompatible
        // snapshot is reported as such.
        let value = serde_yaml::from_str::<serde_yaml::Value>(source)?;
        let found = value
            .get("version")
            .and_then(serde_yaml::Value::as_u64)
            .ok_or_else(|| Error::MalformedInput("snapshot has no version".into()))?;

        if found != u64::from(SNAPSHOT_VERSION) {
            return Err(Error::SnapshotVersion {
                found: u32::try_from(found).unwrap_or(u32::MAX),
                expected: SNAPSHOT_VERSION,
            });
        }

        Ok(serde_yaml::from_value(value)?)
    }
}

/// One snapshot file per stack, `<dir>/<stack>.yaml`.
#[derive(Clone, Debug)]
pub struct SnapshotStore {
    dir: PathBuf,
}

impl SnapshotStore {
    pub fn new<P: Into<PathBuf>>(dir: P) -> SnapshotStore {
        SnapshotStore { dir: dir.into() }
    }

    pub fn path(&self, stack_name: &str) -> PathBuf {
        self.dir.join(format!("{}.yaml", stack_name))
    }

    /// The last saved snapshot, `None` when the stack was never applied.
    pub fn load(&self, stack_name: &str) -> Result<Option<Snapshot>> {
        let path = self.path(stack_name);
        let source = match fs::read_to_string(&path) {
            Ok(source) => source,
            Err(err) if err.kind() == io::ErrorKind::NotFound => {
                debug!("no snapshot at {:?}", path);
                return Ok(None);
            }
            Err(err) => return Err(Error::io(path, err)),
        };

        Snapshot::decode(&source).map(Some)
    }

    /// Replaces the snapshot of `stack` with its current hashes.
    pub fn save(&self, stack: &Stack) -> Result<Snapshot> {
        let snapshot = Snapshot::of(stack);
        let source = serde_yaml::to_string(&snapshot).map_err(Error::Serialize)?;

        let path = self.path(&stack.name);
        write_atomic(&path, source.as_bytes())?;
        info!("saved snapshot {:?}", path);

        Ok(snapshot)
    }

    pub fn remove(&self, stack_name: &str) -> Result<()> {
        let path = self.path(stack_name);
        match fs::remove_file(&path) {
            Ok(()) => Ok(()),
            Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(()),
            Err(err) => Err(Error::io(path, err)),
        }
    }
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum ChangeCount {
    /// The stack has never been applied.
    NoHistory,
    Changed(usize),
}

impl ChangeCount {
    /// `-1` for a stack without history.
    pub fn as_i64(self) -> i64 {
        match self {
            ChangeCount::NoHistory => -1,
            ChangeCount::Changed(count) => count as i64,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Changes {
    /// New and modified resources.
    pub modified: Stack,
    /// Resources that are gone from the definition, known by name only.
    pub deleted: Stack,
    pub count: ChangeCount,
}

impl Changes {
    pub fn detect(stack: &Stack, snapshot: Option<&Snapshot>) -> Changes {
        let snapshot = match snapshot {
            Some(snapshot) => snapshot,
            None => {
                return Changes {
                    modified: stack.clone(),
                    deleted: Stack::empty(stack.name.clone()),
                    count: ChangeCount::NoHistory,
                }
            }
        };

        let (containers, deleted_containers) = diff(
            &stack.containers,
            |c: &Container| &c.name,
            &snapshot.containers,
            |name: &str| Container::placeholder(name),
        );
        let (volumes, deleted_volumes) = diff(
            &stack.volumes,
            |v: &Volume| &v.name,
            &snapshot.volumes,
            |name: &str| Volume::placeholder(name),
        );
        let (networks, deleted_networks) = diff(
            &stack.networks,
            |n: &Network| &n.name,
            &snapshot.networks,
            |name: &str| Network::placeholder(name),
        );

        let modified = Stack {
            name: stack.name.clone(),
            containers,
            volumes,
            networks,
        };
        let deleted = Stack {
            name: stack.name.clone(),
            containers: deleted_containers,
            volumes: deleted_volumes,
            networks: deleted_networks,
        };
        let count = ChangeCount::Changed(modified.len() + deleted.len());

        Changes {
            modified,
            deleted,
            count,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.modified.is_empty() && self.deleted.is_empty()
    }
}

fn diff<T, N, P>(
    current: &[T],
    name: N,
    hashes: &BTreeMap<String, String>,
    placeholder: P,
) -> (Vec<T>, Vec<T>)
where
    T: Clone + Hash,
    N: Fn(&T) -> &String,
    P: Fn(&str) -> T,
{
    let mut modified = Vec::new();
    for resource in current {
        let changed = match hashes.get(name(resource)) {
            Some(hash) => *hash != digest(resource),
            None => true,
        };
        if changed {
            modified.push(resource.clone());
        }
    }

    let mut deleted = Vec::new();
    for known in hashes.keys() {
        if !current.iter().any(|resource| name(resource) == known) {
            deleted.push(placeholder(known.as_str()));
        }
    }

    (modified, deleted)
}
