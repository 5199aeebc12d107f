use std::path::Path;

use crate::{
    error::Result,
    models::{Build, Container, Network, Stack, Volume},
    progress::Progress,
};

pub trait StackFrontend {
    fn stack(&mut self, path: &Path) -> Result<Stack>;
}

/// The container engine that provides images and owns volumes and
/// networks once they exist.
pub trait ImageEngine {
    fn image_exists(&mut self, reference: &str) -> Result<bool>;

    fn pull_image(&mut self, reference: &str) -> Result<Progress>;

    /// Builds `build` with its context resolved to `context`, an absolute
    /// path, and tags the result as `tag`.
    fn build_image(&mut self, build: &Build, context: &Path, tag: &str) -> Result<Progress>;

    fn remove_volume(&mut self, name: &str) -> Result<()>;

    fn remove_network(&mut self, name: &str) -> Result<()>;
}

/// The process supervisor running the generated units.
///
/// Unit names are the artifact basenames without their extension, unit
/// files are addressed with the extension.
pub trait Supervisor {
    fn reload_daemon(&mut self) -> Result<()>;

    fn start_unit(&mut self, name: &str) -> Result<()>;

    fn stop_unit(&mut self, name: &str) -> Result<()>;

    fn restart_unit(&mut self, name: &str) -> Result<()>;

    fn delete_unit_file(&mut self, file_name: &str) -> Result<()>;

    fn list_active_units(&mut self) -> Result<Vec<String>>;

    /// Journal output for the given units, all of them when empty.
    fn logs(&mut self, units: &[String]) -> Result<String>;
}

/// Renders resources into unit file text.
pub trait UnitGenerator {
    fn container(&self, stack: &Stack, container: &Container) -> Result<String>;

    fn volume(&self, stack: &Stack, volume: &Volume) -> Result<String>;

    fn network(&self, stack: &Stack, network: &Network) -> Result<String>;
}
