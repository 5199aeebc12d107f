use log::debug;
use std::{
    fs,
    io::Write,
    path::{Path, PathBuf},
};
use tempfile::NamedTempFile;

use crate::{
    error::{Error, Result},
    models::Stack,
    services::UnitGenerator,
};

/// Replaces `path` with `contents` in one step. The temporary file lives in
/// the target directory so the final rename never crosses filesystems.
pub fn write_atomic(path: &Path, contents: &[u8]) -> Result<()> {
    let dir = match path.parent() {
        Some(dir) if !dir.as_os_str().is_empty() => dir,
        _ => Path::new("."),
    };
    fs::create_dir_all(dir).map_err(|err| Error::io(dir, err))?;

    let mut file = NamedTempFile::new_in(dir).map_err(|err| Error::io(dir, err))?;
    file.write_all(contents)
        .map_err(|err| Error::io(file.path(), err))?;
    file.persist(path)
        .map_err(|err| Error::io(path, err.error))?;

    Ok(())
}

/// Unit files for the resources in `modified`, as file names and their
/// contents. `stack` is the whole stack the resources belong to.
///
/// Host networks have no unit file, containers join them directly.
pub fn render<G: UnitGenerator + ?Sized>(
    stack: &Stack,
    modified: &Stack,
    generator: &G,
) -> Result<Vec<(String, String)>> {
    let mut units = Vec::new();

    for network in modified.networks.iter().filter(|n| !n.is_host()) {
        units.push((
            format!("{}.network", network.name),
            generator.network(stack, network)?,
        ));
    }

    for volume in &modified.volumes {
        units.push((
            format!("{}.volume", volume.name),
            generator.volume(stack, volume)?,
        ));
    }

    for container in &modified.containers {
        units.push((
            format!("{}.container", container.name),
            generator.container(stack, container)?,
        ));
    }

    Ok(units)
}

/// Writes the unit files of [`render`] into `out_dir` and returns their
/// paths.
pub fn generate<G: UnitGenerator + ?Sized>(
    stack: &Stack,
    modified: &Stack,
    out_dir: &Path,
    generator: &G,
) -> Result<Vec<PathBuf>> {
    render(stack, modified, generator)?
        .into_iter()
        .map(|(file_name, contents)| {
            let path = out_dir.join(file_name);
            write_atomic(&path, contents.as_bytes())?;
            debug!("wrote {:?}", path);
            Ok(path)
        })
        .collect()
}
