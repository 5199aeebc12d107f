use anyhow::{anyhow, bail, Context, Result};
use crossterm::{
    cursor,
    style::{self, Stylize},
    QueueableCommand,
};
use log::info;
use std::{
    env,
    io::{stderr, stdout, Write},
    path::PathBuf,
    process,
};
use structopt::StructOpt;

use pod_quadlet::{
    backends::{PodmanBackend, SystemdSupervisor},
    changes::{ChangeCount, SnapshotStore},
    config::{find_definition, Config},
    controller::{Controller, ImageRequest, Operation, Resource, ResourceKind, SkipReason},
    frontends::StackFileFrontend,
    models::Stack,
    rules::Validator,
    services::StackFrontend,
    Error,
};

#[derive(Debug, StructOpt)]
#[structopt(
    name = "pod-quadlet",
    about = "Runs container stacks as Podman Quadlet units under the systemd user instance."
)]
struct Opt {
    /// The stack definition, by default pod-quadlet.yaml in the current
    /// directory or one of its parents.
    #[structopt(short, long, global = true, parse(from_os_str))]
    file: Option<PathBuf>,

    /// Where unit files are written.
    #[structopt(long, global = true, parse(from_os_str))]
    unit_dir: Option<PathBuf>,

    /// Where applied stacks are remembered.
    #[structopt(long, global = true, parse(from_os_str))]
    data_dir: Option<PathBuf>,

    /// Print what would be done to systemd and podman without doing it.
    #[structopt(long, global = true)]
    dry_run: bool,

    #[structopt(subcommand)]
    command: Command,
}

#[derive(Debug, StructOpt)]
enum Command {
    /// Generates units for what changed and starts the stack.
    Start,
    /// Stops the running containers of the stack.
    Stop,
    /// Stops the stack and removes its units, volumes and networks.
    Remove,
    /// Shows the journal of the stack or of one container.
    Logs { container: Option<String> },
    /// Checks the stack definition without applying it.
    Validate,
    Version,
}

fn main() {
    pretty_env_logger::init_custom_env("LOG");

    let opt = Opt::from_args();

    if let Err(err) = run(opt) {
        let mut stderr = stderr();
        let _ = stderr
            .queue(style::PrintStyledContent("ERROR: ".red().bold()))
            .and_then(|stderr| stderr.queue(style::Print(format!("{:#}\n", err))))
            .and_then(|stderr| stderr.flush());
        process::exit(1);
    }
}

fn run(opt: Opt) -> Result<()> {
    if let Command::Version = opt.command {
        println!("pod-quadlet {}", env!("CARGO_PKG_VERSION"));
        return Ok(());
    }

    let config = config(&opt)?;
    info!("using {:?}", config);

    let mut stdout = stdout();
    let stack = load_stack(&config)?;

    if let Command::Validate = opt.command {
        print_info(
            &mut stdout,
            &format!("stack {} is valid ({} resources)", stack.name, stack.len()),
        )?;
        return Ok(());
    }

    let mut controller = Controller::init(
        stack,
        config.stack_dir(),
        &config.unit_dir,
        SnapshotStore::new(&config.data_dir),
        PodmanBackend::new(config.dry_run),
        SystemdSupervisor::new(&config.unit_dir, config.dry_run),
    )?
    .with_dry_run(config.dry_run);
    info!("created controller");

    match opt.command {
        Command::Start => start(&mut controller, &mut stdout)?,
        Command::Stop => {
            let plan = controller.stop_plan();
            if plan.is_empty() {
                print_info(&mut stdout, "no containers are running")?;
            }
            apply(&mut controller, &mut stdout, plan)?;
        }
        Command::Remove => {
            let plan = controller.remove_plan();
            apply(&mut controller, &mut stdout, plan)?;
            controller.reload()?;
            controller.remove_snapshot()?;
        }
        Command::Logs { container } => {
            let containers = match container {
                Some(name) if controller.stack().container(&name).is_none() => {
                    bail!("container '{}' is not part of stack {}", name, controller.stack().name)
                }
                Some(name) => vec![name],
                None => controller
                    .stack()
                    .containers
                    .iter()
                    .map(|container| container.name.clone())
                    .collect(),
            };
            print!("{}", controller.logs(&containers)?);
        }
        Command::Validate | Command::Version => {}
    }

    Ok(())
}

fn config(opt: &Opt) -> Result<Config> {
    let definition = match &opt.file {
        Some(file) => file.clone(),
        None => find_definition(env::current_dir()?).ok_or_else(|| {
            anyhow!(
                "Couldn't find a pod-quadlet.yaml file in the current working directory \
                 or any of its parents."
            )
        })?,
    };
    let definition = definition
        .canonicalize()
        .with_context(|| format!("Couldn't read {}", definition.display()))?;
    info!("found stack definition {:?}", definition);

    let mut config = Config::for_definition(definition)?;
    if let Some(unit_dir) = &opt.unit_dir {
        config.unit_dir = unit_dir.clone();
    }
    if let Some(data_dir) = &opt.data_dir {
        config.data_dir = data_dir.clone();
    }
    config.dry_run = opt.dry_run;

    Ok(config)
}

fn load_stack(config: &Config) -> Result<Stack> {
    let mut stack = StackFileFrontend::new().stack(&config.definition)?;

    let errors = Validator::new(config.stack_dir()).validate(&mut stack);
    if !errors.is_empty() {
        return Err(Error::Validation(errors).into());
    }
    info!("validated stack {:?}", stack.name);

    Ok(stack)
}

fn start(controller: &mut Controller, stdout: &mut impl Write) -> Result<()> {
    let changes = controller.detect_changes()?;
    match changes.count {
        ChangeCount::NoHistory => print_info(stdout, "no previous state found, starting fresh")?,
        ChangeCount::Changed(0) => print_info(stdout, "no changes detected")?,
        ChangeCount::Changed(count) => {
            print_info(stdout, &format!("detected {} change(s)", count))?
        }
    }

    for request in controller.image_requests(&changes) {
        acquire_image(controller, stdout, &request)?;
    }

    for path in controller.generate(&changes)? {
        info!("generated {:?}", path);
    }

    let teardown = controller.teardown_plan(&changes);
    apply(controller, stdout, teardown)?;

    controller.reload()?;

    let plan = controller.start_plan(&changes);
    apply(controller, stdout, plan)?;

    controller.save_snapshot()?;

    Ok(())
}

fn acquire_image(
    controller: &mut Controller,
    stdout: &mut impl Write,
    request: &ImageRequest,
) -> Result<()> {
    let verb = match request {
        ImageRequest::Pull { .. } => "Pulling",
        ImageRequest::Build { .. } => "Building",
    };

    let mut progress = match controller.acquire_image(request)? {
        Some(progress) => progress,
        None => {
            info!("image {} is present", request);
            return Ok(());
        }
    };

    stdout
        .queue(style::Print(format!("{} {} ...\n", verb, request)))?
        .flush()?;

    for line in &mut progress {
        stdout
            .queue(style::PrintStyledContent(" >  ".dark_grey()))?
            .queue(style::Print(format!("{}\n", line)))?
            .flush()?;
    }
    progress.finish()?;

    stdout
        .queue(style::Print(format!("{} {} ", verb, request)))?
        .queue(style::PrintStyledContent("done\n".green().bold()))?
        .flush()?;

    Ok(())
}

fn apply(
    controller: &mut Controller,
    stdout: &mut impl Write,
    operations: Vec<(Resource, Operation)>,
) -> Result<()> {
    fn operation_verb(operation: Operation) -> &'static str {
        match operation {
            Operation::Start => "Starting",
            Operation::Restart => "Restarting",
            Operation::Stop => "Stopping",
            Operation::Remove => "Removing",
            Operation::Skip(_) => "Keeping",
        }
    }

    if operations.is_empty() {
        return Ok(());
    }

    let lines = operations
        .iter()
        .map(|(resource, operation)| format!("{} {}", operation_verb(*operation), resource))
        .collect::<Vec<_>>();

    let longest_line = lines.iter().map(|line| line.len()).max().unwrap_or(0);

    for line in lines.iter() {
        stdout.queue(style::Print(line))?;

        let padding = longest_line - line.len() + 1;
        stdout
            .queue(cursor::MoveRight(padding as u16))?
            .queue(style::Print("...\n"))?;
    }

    stdout.flush()?;

    for (line, (resource, operation)) in operations.into_iter().enumerate() {
        controller
            .apply(&resource, operation)
            .with_context(|| failure_hint(&resource, operation))?;

        let status = match operation {
            Operation::Skip(SkipReason::InUse) => "still in use".yellow().bold(),
            Operation::Skip(SkipReason::Persistent) => "persisted".yellow().bold(),
            _ => "done".green().bold(),
        };

        stdout
            .queue(cursor::SavePosition)?
            .queue(cursor::MoveToPreviousLine((lines.len() - line) as u16))?
            .queue(cursor::MoveRight(longest_line as u16 + 5))?
            .queue(style::PrintStyledContent(status))?
            .queue(cursor::RestorePosition)?
            .flush()?;
    }

    Ok(())
}

fn failure_hint(resource: &Resource, operation: Operation) -> String {
    let action = match operation {
        Operation::Start => "start",
        Operation::Restart => "restart",
        Operation::Stop => "stop",
        Operation::Remove => "remove",
        Operation::Skip(_) => "keep",
    };

    match resource.kind {
        ResourceKind::Container => format!(
            "Failed to {} {}, check its logs with 'journalctl --user -xe -t {}'",
            action, resource, resource.name
        ),
        _ => format!("Failed to {} {}", action, resource),
    }
}

fn print_info(stdout: &mut impl Write, message: &str) -> Result<()> {
    stdout
        .queue(style::PrintStyledContent("INFO: ".cyan().bold()))?
        .queue(style::Print(format!("{}\n", message)))?
        .flush()?;

    Ok(())
}
