use log::{debug, info};
use std::{
    collections::BTreeSet as Set,
    fmt,
    path::{Path, PathBuf},
};

use crate::{
    changes::{Changes, SnapshotStore},
    error::{Error, Result},
    generate::{generate, render},
    graph::DependencyGraph,
    models::{MountType, Stack},
    progress::Progress,
    quadlet::{absolute_path, QuadletGenerator},
    services::{ImageEngine, Supervisor},
};

#[derive(Copy, Clone, Debug, PartialEq, Eq, PartialOrd, Ord)]
pub enum ResourceKind {
    Container,
    Volume,
    Network,
}

impl ResourceKind {
    pub fn as_str(self) -> &'static str {
        match self {
            ResourceKind::Container => "container",
            ResourceKind::Volume => "volume",
            ResourceKind::Network => "network",
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Resource {
    pub kind: ResourceKind,
    pub name: String,
}

impl Resource {
    pub fn container<N: Into<String>>(name: N) -> Resource {
        Resource {
            kind: ResourceKind::Container,
            name: name.into(),
        }
    }

    pub fn volume<N: Into<String>>(name: N) -> Resource {
        Resource {
            kind: ResourceKind::Volume,
            name: name.into(),
        }
    }

    pub fn network<N: Into<String>>(name: N) -> Resource {
        Resource {
            kind: ResourceKind::Network,
            name: name.into(),
        }
    }

    /// The systemd service Quadlet generates for the resource.
    pub fn unit_name(&self) -> String {
        match self.kind {
            ResourceKind::Container => self.name.clone(),
            ResourceKind::Volume => format!("{}-volume", self.name),
            ResourceKind::Network => format!("{}-network", self.name),
        }
    }

    /// The unit file the resource is rendered to.
    pub fn unit_file(&self) -> String {
        format!("{}.{}", self.name, self.kind.as_str())
    }
}

impl fmt::Display for Resource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.kind.as_str(), self.name)
    }
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum SkipReason {
    /// A container of the stack still uses the volume or network.
    InUse,
    /// The definition asks for the resource to outlive the stack.
    Persistent,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Operation {
    Start,
    Restart,
    Stop,
    Remove,
    Skip(SkipReason),
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ImageRequest {
    /// Pull a registry image unless it is already present.
    Pull { reference: String },
    /// Build the image of a container and tag it locally.
    Build { container: String, tag: String },
}

impl fmt::Display for ImageRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ImageRequest::Pull { reference } => f.write_str(reference),
            ImageRequest::Build { tag, .. } => f.write_str(tag),
        }
    }
}

/// Converges the supervisor and the container engine on a validated stack.
pub struct Controller {
    engine: Box<dyn ImageEngine>,
    supervisor: Box<dyn Supervisor>,
    generator: QuadletGenerator,
    store: SnapshotStore,
    stack: Stack,
    stack_dir: PathBuf,
    unit_dir: PathBuf,
    active: Set<String>,
    dry_run: bool,
}

impl Controller {
    /// `stack_dir` is the absolute directory of the definition file.
    pub fn init<E, S>(
        stack: Stack,
        stack_dir: &Path,
        unit_dir: &Path,
        store: SnapshotStore,
        engine: E,
        supervisor: S,
    ) -> Result<Controller>
    where
        E: 'static + ImageEngine,
        S: 'static + Supervisor,
    {
        let mut supervisor = Box::new(supervisor);
        let active = supervisor.list_active_units()?.into_iter().collect();
        debug!("active units: {:?}", active);

        Ok(Controller {
            engine: Box::new(engine),
            supervisor,
            generator: QuadletGenerator::new(stack_dir),
            store,
            stack,
            stack_dir: stack_dir.to_path_buf(),
            unit_dir: unit_dir.to_path_buf(),
            active,
            dry_run: false,
        })
    }

    /// In a dry run no unit file or snapshot is written or removed. The
    /// backends are expected to be in dry-run mode as well.
    pub fn with_dry_run(mut self, dry_run: bool) -> Controller {
        self.dry_run = dry_run;
        self
    }

    pub fn stack(&self) -> &Stack {
        &self.stack
    }

    fn is_active(&self, unit: &str) -> bool {
        self.active.contains(unit)
    }

    fn refresh_active(&mut self) -> Result<()> {
        self.active = self.supervisor.list_active_units()?.into_iter().collect();
        Ok(())
    }

    /// Compares the stack with the last snapshot saved for it.
    pub fn detect_changes(&self) -> Result<Changes> {
        let snapshot = self.store.load(&self.stack.name)?;
        let changes = Changes::detect(&self.stack, snapshot.as_ref());
        info!("detected changes: {:?}", changes.count);
        Ok(changes)
    }

    /// Images the modified containers need, each one once.
    pub fn image_requests(&self, changes: &Changes) -> Vec<ImageRequest> {
        let mut requests = Vec::new();

        for container in &changes.modified.containers {
            let request = match (&container.build, &container.image) {
                (Some(_), _) => ImageRequest::Build {
                    container: container.name.clone(),
                    tag: container.local_image(&self.stack.name).to_string(),
                },
                (None, Some(image)) => ImageRequest::Pull {
                    reference: image.to_string(),
                },
                (None, None) => continue,
            };

            if !requests.contains(&request) {
                requests.push(request);
            }
        }

        requests
    }

    /// Starts acquiring an image. `None` when there is nothing to do.
    pub fn acquire_image(&mut self, request: &ImageRequest) -> Result<Option<Progress>> {
        match request {
            ImageRequest::Pull { reference } => {
                if self.engine.image_exists(reference)? {
                    debug!("image {} is present", reference);
                    return Ok(None);
                }
                self.engine.pull_image(reference).map(Some)
            }
            ImageRequest::Build { container, tag } => {
                let build = self
                    .stack
                    .container(container)
                    .and_then(|container| container.build.as_ref())
                    .ok_or_else(|| {
                        Error::MalformedInput(format!("container '{}' has no build", container))
                    })?;
                let context = absolute_path(&self.stack_dir, Path::new(&build.context));
                self.engine.build_image(build, &context, tag).map(Some)
            }
        }
    }

    /// Writes unit files for the new and modified resources. A dry run
    /// renders them and returns the paths they would be written to.
    pub fn generate(&self, changes: &Changes) -> Result<Vec<PathBuf>> {
        if !self.dry_run {
            return generate(
                &self.stack,
                &changes.modified,
                &self.unit_dir,
                &self.generator,
            );
        }

        let units = render(&self.stack, &changes.modified, &self.generator)?;
        Ok(units
            .into_iter()
            .map(|(file_name, _)| {
                let path = self.unit_dir.join(file_name);
                info!("dry run: would write {:?}", path);
                path
            })
            .collect())
    }

    fn in_use(&self, resource: &Resource) -> bool {
        self.stack.containers.iter().any(|container| match resource.kind {
            ResourceKind::Volume => container.volumes.iter().any(|mount| {
                mount.mount_type == MountType::Volume && mount.source == resource.name
            }),
            ResourceKind::Network => container.networks.contains(&resource.name),
            ResourceKind::Container => false,
        })
    }

    /// Removal of the resources that left the definition.
    pub fn teardown_plan(&self, changes: &Changes) -> Vec<(Resource, Operation)> {
        let containers = changes
            .deleted
            .containers
            .iter()
            .map(|container| (Resource::container(&container.name), Operation::Remove));

        let volumes = changes
            .deleted
            .volumes
            .iter()
            .map(|volume| Resource::volume(&volume.name));
        let networks = changes
            .deleted
            .networks
            .iter()
            .map(|network| Resource::network(&network.name));

        let shared = volumes.chain(networks).map(|resource| {
            let operation = if self.in_use(&resource) {
                Operation::Skip(SkipReason::InUse)
            } else {
                Operation::Remove
            };
            (resource, operation)
        });

        containers.chain(shared).collect()
    }

    pub fn reload(&mut self) -> Result<()> {
        self.supervisor.reload_daemon()?;
        self.refresh_active()
    }

    fn start_order(&self) -> Vec<String> {
        DependencyGraph::new(&self.stack)
            .start_order()
            .into_iter()
            .map(str::to_owned)
            .collect()
    }

    /// Containers to start, dependencies first. Running containers are only
    /// restarted when their unit file changed.
    pub fn start_plan(&self, changes: &Changes) -> Vec<(Resource, Operation)> {
        self.start_order()
            .into_iter()
            .filter_map(|name| {
                let modified = changes.modified.container(&name).is_some();
                let operation = match (self.is_active(&name), modified) {
                    (false, _) => Operation::Start,
                    (true, true) => Operation::Restart,
                    (true, false) => return None,
                };
                Some((Resource::container(name), operation))
            })
            .collect()
    }

    /// Running containers, dependents first.
    pub fn stop_plan(&self) -> Vec<(Resource, Operation)> {
        let mut order = self.start_order();
        order.reverse();

        order
            .into_iter()
            .filter(|name| self.is_active(name))
            .map(|name| (Resource::container(name), Operation::Stop))
            .collect()
    }

    /// Every resource of the stack, containers first.
    pub fn remove_plan(&self) -> Vec<(Resource, Operation)> {
        let mut order = self.start_order();
        order.reverse();

        let containers = order
            .into_iter()
            .map(|name| (Resource::container(name), Operation::Remove));

        let shared_operation = |persist_on_remove: bool| {
            if persist_on_remove {
                Operation::Skip(SkipReason::Persistent)
            } else {
                Operation::Remove
            }
        };
        let volumes = self.stack.volumes.iter().map(|volume| {
            (
                Resource::volume(&volume.name),
                shared_operation(volume.persist_on_remove),
            )
        });
        // Host networks only exist on the podman side.
        let networks = self
            .stack
            .networks
            .iter()
            .filter(|network| !network.is_host())
            .map(|network| {
                (
                    Resource::network(&network.name),
                    shared_operation(network.persist_on_remove),
                )
            });

        containers.chain(volumes).chain(networks).collect()
    }

    pub fn apply(&mut self, resource: &Resource, operation: Operation) -> Result<()> {
        let unit = resource.unit_name();
        debug!("{:?} {}", operation, resource);

        match operation {
            Operation::Start => self.supervisor.start_unit(&unit)?,
            Operation::Restart => self.supervisor.restart_unit(&unit)?,
            Operation::Stop => self.supervisor.stop_unit(&unit)?,
            Operation::Remove => {
                if self.is_active(&unit) {
                    self.supervisor.stop_unit(&unit)?;
                    self.active.remove(&unit);
                }
                self.supervisor.delete_unit_file(&resource.unit_file())?;

                match resource.kind {
                    ResourceKind::Container => {}
                    ResourceKind::Volume => self.engine.remove_volume(&resource.name)?,
                    ResourceKind::Network => self.engine.remove_network(&resource.name)?,
                }
            }
            Operation::Skip(reason) => info!("skipping {}: {:?}", resource, reason),
        }

        Ok(())
    }

    pub fn save_snapshot(&self) -> Result<()> {
        if self.dry_run {
            info!("dry run: not saving the snapshot of {}", self.stack.name);
            return Ok(());
        }
        self.store.save(&self.stack).map(|_| ())
    }

    pub fn remove_snapshot(&self) -> Result<()> {
        if self.dry_run {
            info!("dry run: not removing the snapshot of {}", self.stack.name);
            return Ok(());
        }
        self.store.remove(&self.stack.name)
    }

    /// Journal output of the named containers, or of the whole journal when
    /// `containers` is empty.
    pub fn logs(&mut self, containers: &[String]) -> Result<String> {
        self.supervisor.logs(containers)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn resources_name_their_units() {
        let volume = Resource::volume("data");
        assert_eq!(volume.unit_name(), "data-volume");
        assert_eq!(volume.unit_file(), "data.volume");
        assert_eq!(volume.to_string(), "volume data");

        let container = Resource::container("web");
        assert_eq!(container.unit_name(), "web");
        assert_eq!(container.unit_file(), "web.container");
    }
}
