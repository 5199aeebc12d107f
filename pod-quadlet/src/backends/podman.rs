use log::{debug, info};
use std::{
    ffi::OsString,
    io,
    path::{Path, PathBuf},
    process::{Command, Stdio},
};

use super::{command_line, run};
use crate::{
    error::{Error, Result},
    models::Build,
    progress::Progress,
    services::ImageEngine,
};

const PODMAN: &str = "podman";

/// Talks to podman through its command line.
///
/// In dry-run mode images are neither pulled nor built and nothing is
/// removed, the commands are only logged.
#[derive(Clone, Debug, Default)]
pub struct PodmanBackend {
    dry_run: bool,
}

impl PodmanBackend {
    pub fn new(dry_run: bool) -> PodmanBackend {
        PodmanBackend { dry_run }
    }

    fn exists(&self, kind: &str, name: &str) -> Result<bool> {
        let status = Command::new(PODMAN)
            .args(&[kind, "exists", name])
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .status()
            .map_err(|err| Error::io(PODMAN, err))?;

        // The `exists` subcommands answer with their exit code.
        Ok(status.success())
    }

    fn remove(&self, kind: &str, name: &str) -> Result<()> {
        let args = [kind, "rm", "-f", name];
        if self.dry_run {
            info!("dry run: {}", command_line(PODMAN, &args));
            return Ok(());
        }

        if !self.exists(kind, name)? {
            debug!("{} {} does not exist", kind, name);
            return Ok(());
        }

        run(PODMAN, &args).map(|_| ())
    }

    fn spawn(&self, args: Vec<OsString>) -> Result<Progress> {
        let line = command_line(PODMAN, &args);
        if self.dry_run {
            info!("dry run: {}", line);
            return Ok(Progress::from_lines(line, Vec::new()));
        }
        info!("running {}", line);

        let child = Command::new(PODMAN)
            .args(&args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|err| Error::io(PODMAN, err))?;

        Ok(Progress::from_child(line, child))
    }
}

/// The Containerfile of `build`: the declared one, otherwise `Containerfile`
/// or `Dockerfile` in the context.
pub fn resolve_containerfile(build: &Build, context: &Path) -> Result<PathBuf> {
    if !context.is_dir() {
        return Err(Error::io(
            context,
            io::Error::new(io::ErrorKind::NotFound, "build context does not exist"),
        ));
    }

    let candidates = match &build.containerfile {
        Some(containerfile) => vec![context.join(containerfile)],
        None => vec![context.join("Containerfile"), context.join("Dockerfile")],
    };

    for candidate in candidates.iter() {
        if candidate.is_file() {
            debug!("using containerfile {:?}", candidate);
            return Ok(candidate.clone());
        }
    }

    let missing = candidates
        .into_iter()
        .next()
        .unwrap_or_else(|| context.join("Containerfile"));
    Err(Error::io(
        missing,
        io::Error::new(io::ErrorKind::NotFound, "containerfile does not exist"),
    ))
}

/// Arguments of the `podman build` call for `build`.
pub fn build_args(build: &Build, context: &Path, containerfile: &Path, tag: &str) -> Vec<OsString> {
    let mut args: Vec<OsString> = vec![
        "build".into(),
        "-t".into(),
        tag.into(),
        "-f".into(),
        containerfile.into(),
    ];

    for (key, value) in build.args.sorted() {
        args.push("--build-arg".into());
        args.push(format!("{}={}", key, value).into());
    }
    for extra in &build.tags {
        args.push("-t".into());
        args.push(extra.into());
    }
    if let Some(target) = &build.target {
        args.push("--target".into());
        args.push(target.into());
    }

    args.push(context.into());
    args
}

impl ImageEngine for PodmanBackend {
    fn image_exists(&mut self, reference: &str) -> Result<bool> {
        self.exists("image", reference)
    }

    fn pull_image(&mut self, reference: &str) -> Result<Progress> {
        self.spawn(vec!["pull".into(), reference.into()])
    }

    fn build_image(&mut self, build: &Build, context: &Path, tag: &str) -> Result<Progress> {
        let containerfile = resolve_containerfile(build, context)?;
        self.spawn(build_args(build, context, &containerfile, tag))
    }

    fn remove_volume(&mut self, name: &str) -> Result<()> {
        self.remove("volume", name)
    }

    fn remove_network(&mut self, name: &str) -> Result<()> {
        self.remove("network", name)
    }
}
