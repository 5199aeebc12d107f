use log::{debug, info};
use std::{fs, io, path::PathBuf};

use super::{command_line, run};
use crate::{
    error::{Error, Result},
    services::Supervisor,
};

const SYSTEMCTL: &str = "systemctl";
const JOURNALCTL: &str = "journalctl";

/// Drives the systemd user instance. Unit files live in `unit_dir`.
///
/// In dry-run mode nothing is started, stopped or deleted, the calls are
/// only logged.
#[derive(Clone, Debug)]
pub struct SystemdSupervisor {
    unit_dir: PathBuf,
    dry_run: bool,
}

impl SystemdSupervisor {
    pub fn new<P: Into<PathBuf>>(unit_dir: P, dry_run: bool) -> SystemdSupervisor {
        SystemdSupervisor {
            unit_dir: unit_dir.into(),
            dry_run,
        }
    }

    fn systemctl(&self, args: &[&str]) -> Result<()> {
        let mut user_args = vec!["--user"];
        user_args.extend_from_slice(args);

        if self.dry_run {
            info!("dry run: {}", command_line(SYSTEMCTL, &user_args));
            return Ok(());
        }

        run(SYSTEMCTL, &user_args).map(|_| ())
    }
}

/// Unit names from `systemctl list-units --plain --no-legend` output.
fn parse_unit_list(output: &str) -> Vec<String> {
    output
        .lines()
        .filter_map(|line| line.split_whitespace().next())
        .filter_map(|unit| unit.strip_suffix(".service"))
        .map(str::to_owned)
        .collect()
}

impl Supervisor for SystemdSupervisor {
    fn reload_daemon(&mut self) -> Result<()> {
        self.systemctl(&["daemon-reload"])
    }

    fn start_unit(&mut self, name: &str) -> Result<()> {
        self.systemctl(&["start", name])
    }

    fn stop_unit(&mut self, name: &str) -> Result<()> {
        self.systemctl(&["stop", name])
    }

    fn restart_unit(&mut self, name: &str) -> Result<()> {
        self.systemctl(&["restart", name])
    }

    fn delete_unit_file(&mut self, file_name: &str) -> Result<()> {
        let path = self.unit_dir.join(file_name);
        if self.dry_run {
            info!("dry run: rm {:?}", path);
            return Ok(());
        }

        match fs::remove_file(&path) {
            Ok(()) => {
                debug!("deleted {:?}", path);
                Ok(())
            }
            Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(()),
            Err(err) => Err(Error::io(path, err)),
        }
    }

    fn list_active_units(&mut self) -> Result<Vec<String>> {
        let output = run(
            SYSTEMCTL,
            &[
                "--user",
                "list-units",
                "--type=service",
                "--state=active",
                "--plain",
                "--no-legend",
            ],
        )?;

        Ok(parse_unit_list(&output))
    }

    fn logs(&mut self, units: &[String]) -> Result<String> {
        let mut args = vec!["--user".to_owned(), "--no-pager".to_owned()];
        for unit in units {
            args.push("-u".into());
            args.push(format!("{}.service", unit));
        }

        run(JOURNALCTL, &args)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn parses_active_services() {
        let output = "\
web.service       loaded active running web container
db.service        loaded active running db container
dbus.socket       loaded active running D-Bus User Message Bus Socket
";
        assert_eq!(parse_unit_list(output), vec!["web", "db"]);
    }

    #[test]
    fn deleting_missing_unit_files_succeeds() {
        let dir = TempDir::new().unwrap();
        let mut supervisor = SystemdSupervisor::new(dir.path(), false);
        assert!(supervisor.delete_unit_file("web.container").is_ok());
    }

    #[test]
    fn deletes_unit_files() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("web.container");
        fs::write(&path, "[Container]\n").unwrap();

        let mut supervisor = SystemdSupervisor::new(dir.path(), false);
        supervisor.delete_unit_file("web.container").unwrap();
        assert!(!path.exists());
    }

    #[test]
    fn dry_runs_touch_nothing() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("web.container");
        fs::write(&path, "[Container]\n").unwrap();

        let mut supervisor = SystemdSupervisor::new(dir.path(), true);
        supervisor.delete_unit_file("web.container").unwrap();
        supervisor.start_unit("web").unwrap();
        supervisor.reload_daemon().unwrap();
        assert!(path.exists());
    }
}
