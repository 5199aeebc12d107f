//! Rendering of stack resources into Podman Quadlet unit files.

use std::path::{Component, Path, PathBuf};

use crate::{
    error::{Error, Result},
    models::{Container, MountType, Network, RestartCondition, Stack, Volume},
    services::UnitGenerator,
};

const START_TIMEOUT_SECS: u32 = 900;
const WANTED_BY: &str = "multi-user.target default.target";

/// Unit file text, written one section at a time.
#[derive(Default)]
struct UnitFile {
    text: String,
}

impl UnitFile {
    fn section(&mut self, name: &str) -> &mut UnitFile {
        if !self.text.is_empty() {
            self.text.push('\n');
        }
        self.text.push('[');
        self.text.push_str(name);
        self.text.push_str("]\n");
        self
    }

    fn entry<V: AsRef<str>>(&mut self, key: &str, value: V) -> &mut UnitFile {
        self.text.push_str(key);
        self.text.push('=');
        self.text.push_str(value.as_ref());
        self.text.push('\n');
        self
    }

    fn finish(self) -> String {
        self.text
    }
}

/// Escapes systemd specifiers in `value` and double quotes it when systemd
/// would otherwise split it.
fn quote(value: &str) -> String {
    let value = value.replace('%', "%%");
    if !value.contains(|c: char| c.is_whitespace() || c == '"' || c == '\'') {
        return value;
    }

    let mut quoted = String::with_capacity(value.len() + 2);
    quoted.push('"');
    for c in value.chars() {
        if c == '"' || c == '\\' {
            quoted.push('\\');
        }
        quoted.push(c);
    }
    quoted.push('"');
    quoted
}

/// Joins `path` onto `base` and folds `.` and `..` without touching the
/// filesystem.
pub fn absolute_path(base: &Path, path: &Path) -> PathBuf {
    let mut resolved = PathBuf::new();
    for component in base.join(path).components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                resolved.pop();
            }
            other => resolved.push(other.as_os_str()),
        }
    }
    resolved
}

/// Renders Quadlet `.container`, `.volume` and `.network` files. Bind mount
/// sources are resolved against `base_dir`.
#[derive(Clone, Debug)]
pub struct QuadletGenerator {
    base_dir: PathBuf,
}

impl QuadletGenerator {
    pub fn new<P: Into<PathBuf>>(base_dir: P) -> QuadletGenerator {
        QuadletGenerator {
            base_dir: base_dir.into(),
        }
    }
}

impl UnitGenerator for QuadletGenerator {
    fn container(&self, stack: &Stack, container: &Container) -> Result<String> {
        let mut unit = UnitFile::default();

        unit.section("Unit")
            .entry("Description", format!("{} container", container.name));
        if !container.depends.is_empty() {
            let services = container
                .depends
                .iter()
                .map(|dependency| format!("{}.service", dependency))
                .collect::<Vec<_>>()
                .join(" ");
            unit.entry("Requires", &services).entry("After", &services);
        }

        let image = container.effective_image(&stack.name).ok_or_else(|| {
            Error::MalformedInput(format!(
                "container '{}' has neither an image nor a build",
                container.name
            ))
        })?;

        unit.section("Container")
            .entry("ContainerName", &container.name)
            .entry("Image", image.to_string());
        if !container.entrypoint.is_empty() {
            unit.entry("Entrypoint", &container.entrypoint);
        }
        if container.init {
            unit.entry("RunInit", "true");
        }
        for (key, value) in container.environment.sorted() {
            unit.entry("Environment", quote(&format!("{}={}", key, value)));
        }
        if !container.ports.is_empty() {
            let ports = container
                .ports
                .iter()
                .map(ToString::to_string)
                .collect::<Vec<_>>()
                .join(" ");
            unit.entry("PublishPort", ports);
        }
        for (key, value) in container.labels.sorted() {
            unit.entry("Label", quote(&format!("{}={}", key, value)));
        }

        let host_network = container
            .networks
            .iter()
            .filter_map(|name| stack.network(name))
            .any(Network::is_host);
        if host_network {
            unit.entry("Network", "host");
        } else {
            for network in &container.networks {
                unit.entry("Network", format!("{}.network", network));
            }
        }

        for mount in &container.volumes {
            let source = match mount.mount_type {
                MountType::Bind => absolute_path(&self.base_dir, Path::new(&mount.source))
                    .to_string_lossy()
                    .into_owned(),
                MountType::Volume => format!("{}.volume", mount.source),
            };
            let mut value = format!("{}:{}", source, mount.destination);
            if !mount.options.is_empty() {
                value.push(':');
                value.push_str(&mount.options.join(","));
            }
            unit.entry("Volume", value);
        }

        unit.section("Service")
            .entry("TimeoutStartSec", START_TIMEOUT_SECS.to_string());
        if let Some(restart) = &container.restart {
            match restart.condition {
                RestartCondition::UnlessStopped => {
                    unit.entry("Restart", "always")
                        .entry("RestartPreventExitStatus", "0 SIGKILL");
                }
                RestartCondition::OnFailure => {
                    unit.entry("Restart", "on-failure");
                    if restart.max_attempts > 0 {
                        unit.entry("StartLimitBurst", restart.max_attempts.to_string());
                    }
                }
                condition => {
                    unit.entry("Restart", condition.as_str());
                }
            }
        }

        unit.section("Install").entry("WantedBy", WANTED_BY);

        Ok(unit.finish())
    }

    fn volume(&self, _stack: &Stack, volume: &Volume) -> Result<String> {
        let mut unit = UnitFile::default();
        unit.section("Unit")
            .entry("Description", format!("{} volume", volume.name));
        unit.section("Volume").entry("VolumeName", &volume.name);
        Ok(unit.finish())
    }

    fn network(&self, _stack: &Stack, network: &Network) -> Result<String> {
        let mut unit = UnitFile::default();
        unit.section("Unit")
            .entry("Description", format!("{} network", network.name));
        unit.section("Network").entry("NetworkName", &network.name);
        match network.driver {
            Some(driver) if !network.is_host() => {
                unit.entry("Driver", driver.as_str());
            }
            _ => {}
        }
        Ok(unit.finish())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{
        Build, Image, KeyValues, NetworkDriver, PortMap, RestartPolicy, VolumeMap,
    };

    fn stack() -> Stack {
        Stack {
            name: "shop".into(),
            networks: vec![
                Network {
                    name: "front".into(),
                    driver: Some(NetworkDriver::Bridge),
                    persist_on_remove: false,
                },
                Network {
                    name: "host".into(),
                    driver: Some(NetworkDriver::Host),
                    persist_on_remove: false,
                },
            ],
            volumes: vec![Volume::placeholder("data")],
            ..Default::default()
        }
    }

    #[test]
    fn renders_a_full_container() {
        let mut bind = VolumeMap::parse("./static:/srv/static:ro").unwrap();
        bind.mount_type = MountType::Bind;

        let container = Container {
            name: "web".into(),
            entrypoint: "/bin/sh -c".into(),
            environment: vec![
                ("MODE", "production"),
                ("GREETING", "hello world"),
                ("THRESHOLD", "90%"),
            ]
            .into_iter()
            .collect::<KeyValues>(),
            image: Some(Image::parse("nginx:1.25").unwrap()),
            init: true,
            labels: vec![("tier", "frontend")].into_iter().collect::<KeyValues>(),
            networks: vec!["front".into()],
            ports: vec![
                PortMap::parse("8080:80").unwrap(),
                PortMap::parse("127.0.0.1:8443:443/tcp").unwrap(),
            ],
            restart: Some(RestartPolicy::parse("unless-stopped")),
            volumes: vec![VolumeMap::parse("data:/var/lib/data").unwrap(), bind],
            depends: vec!["api".into(), "db".into()],
            ..Default::default()
        };

        let unit = QuadletGenerator::new("/opt/shop")
            .container(&stack(), &container)
            .unwrap();

        assert_eq!(
            unit,
            "[Unit]\n\
             Description=web container\n\
             Requires=api.service db.service\n\
             After=api.service db.service\n\
             \n\
             [Container]\n\
             ContainerName=web\n\
             Image=nginx:1.25\n\
             Entrypoint=/bin/sh -c\n\
             RunInit=true\n\
             Environment=\"GREETING=hello world\"\n\
             Environment=MODE=production\n\
             Environment=THRESHOLD=90%%\n\
             PublishPort=0.0.0.0:8080:80/tcp 127.0.0.1:8443:443/tcp\n\
             Label=tier=frontend\n\
             Network=front.network\n\
             Volume=data.volume:/var/lib/data\n\
             Volume=/opt/shop/static:/srv/static:ro\n\
             \n\
             [Service]\n\
             TimeoutStartSec=900\n\
             Restart=always\n\
             RestartPreventExitStatus=0 SIGKILL\n\
             \n\
             [Install]\n\
             WantedBy=multi-user.target default.target\n"
        );
    }

    #[test]
    fn built_containers_run_their_local_tag() {
        let container = Container {
            name: "api".into(),
            image: Some(Image::parse("ignored").unwrap()),
            build: Some(Build {
                context: "./api".into(),
                ..Default::default()
            }),
            ..Default::default()
        };

        let unit = QuadletGenerator::new("/opt/shop")
            .container(&stack(), &container)
            .unwrap();
        assert!(unit.contains("Image=localhost/shop_api:latest\n"));
        assert!(!unit.contains("Requires="));
        assert!(!unit.contains("Restart="));
    }

    #[test]
    fn host_networks_replace_every_attachment() {
        let container = Container {
            name: "agent".into(),
            image: Some(Image::parse("agent").unwrap()),
            networks: vec!["front".into(), "host".into()],
            ..Default::default()
        };

        let unit = QuadletGenerator::new("/")
            .container(&stack(), &container)
            .unwrap();
        assert!(unit.contains("Network=host\n"));
        assert!(!unit.contains("front.network"));
    }

    #[test]
    fn on_failure_limits_start_bursts() {
        let mut container = Container {
            name: "worker".into(),
            image: Some(Image::parse("worker").unwrap()),
            restart: Some(RestartPolicy::parse("on-failure:4")),
            ..Default::default()
        };

        let generator = QuadletGenerator::new("/");
        let unit = generator.container(&stack(), &container).unwrap();
        assert!(unit.contains("Restart=on-failure\nStartLimitBurst=4\n"));

        container.restart = Some(RestartPolicy::parse("no"));
        let unit = generator.container(&stack(), &container).unwrap();
        assert!(unit.contains("Restart=no\n"));
        assert!(!unit.contains("StartLimitBurst"));
    }

    #[test]
    fn renders_volumes_and_networks() {
        let generator = QuadletGenerator::new("/");
        let stack = stack();

        assert_eq!(
            generator.volume(&stack, &stack.volumes[0]).unwrap(),
            "[Unit]\nDescription=data volume\n\n[Volume]\nVolumeName=data\n"
        );
        assert_eq!(
            generator.network(&stack, &stack.networks[0]).unwrap(),
            "[Unit]\nDescription=front network\n\n[Network]\nNetworkName=front\nDriver=bridge\n"
        );
        assert_eq!(
            generator.network(&stack, &Network::placeholder("plain")).unwrap(),
            "[Unit]\nDescription=plain network\n\n[Network]\nNetworkName=plain\n"
        );
    }

    #[test]
    fn host_networks_render_without_a_driver() {
        let host = Network {
            name: "edge".into(),
            driver: Some(NetworkDriver::Host),
            persist_on_remove: false,
        };

        let unit = QuadletGenerator::new("/").network(&stack(), &host).unwrap();
        assert_eq!(
            unit,
            "[Unit]\nDescription=edge network\n\n[Network]\nNetworkName=edge\n"
        );
        assert!(!unit.contains("Driver="));
    }

    #[test]
    fn quotes_values_systemd_would_split() {
        assert_eq!(quote("A=b"), "A=b");
        assert_eq!(quote("A=b c"), "\"A=b c\"");
        assert_eq!(quote(r#"A="b""#), r#""A=\"b\"""#);
        assert_eq!(quote("HOME_DIR=%h"), "HOME_DIR=%%h");
        assert_eq!(quote("RATIO=50 %"), "\"RATIO=50 %%\"");
    }

    #[test]
    fn resolves_relative_paths_lexically() {
        assert_eq!(
            absolute_path(Path::new("/opt/shop"), Path::new("./data/../static")),
            PathBuf::from("/opt/shop/static")
        );
        assert_eq!(
            absolute_path(Path::new("/opt/shop"), Path::new("/srv/data")),
            PathBuf::from("/srv/data")
        );
    }
}
