//! Create jobscripts for the PBS scheduler and submit them on a login host
//!
//! The login host, the working directory on the remote machine, and a
//! suffix for jobscripts are read from a plain text file (`~/pbsjob.dat`
//! by default). The executable named on the command line is copied to the
//! remote working directory, a jobscript is generated from the command
//! line options, and the jobscript is submitted with qsub.

use std::env;
use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use clap::Parser;
use log::info;

use crate::pbs::job_spec::{JobParams, JobSpec};
use crate::remote::SshTransport;
use crate::submit::StdinDecisions;

/// Read connection settings from the settings file
mod config;

/// Generate PBS jobscripts
mod pbs;

/// Run commands on the login host and copy files to it
mod remote;

/// Stage files on the login host and drive qsub
mod submit;

/// Name of the settings file looked up in the home directory.
const CONFIG_FILE_NAME: &str = "pbsjob.dat";

#[derive(Parser, Debug)]
#[command(
    version,
    about = "Create jobscripts for the PBS scheduler and submit them on a login host"
)]
struct Cli {
    /// Number of nodes
    #[arg(long)]
    nodes: Option<u32>,

    /// Number of processes per node
    #[arg(long)]
    ppn: Option<u32>,

    /// Job name
    #[arg(long)]
    name: Option<String>,

    /// Remove jobscripts on the remote and quit
    #[arg(long)]
    clean: bool,

    /// Write stdout to this file
    #[arg(long)]
    stdout: Option<String>,

    /// Write stderr to this file
    #[arg(long)]
    stderr: Option<String>,

    /// Share the nodes
    #[arg(long)]
    shared: bool,

    /// Walltime in hours
    #[arg(long, default_value_t = 100)]
    walltime: u32,

    /// Name of the queue to use
    #[arg(long, default_value = "parallel")]
    queue: String,

    /// Do not launch the executable through mpirun
    #[arg(long)]
    no_mpi: bool,

    /// Include the total CPU count in the jobscript
    #[arg(long)]
    ncpus: bool,

    /// Process priority
    #[arg(long, default_value_t = 0, allow_negative_numbers = true)]
    priority: i32,

    /// Settings file overriding ~/pbsjob.dat
    #[arg(long)]
    config: Option<PathBuf>,

    /// Print the generated jobscript instead of submitting it
    #[arg(long)]
    dry_run: bool,

    /// Executable to run on the cluster
    #[arg(required_unless_present = "clean")]
    executable: Option<PathBuf>,
}

fn main() -> Result<()> {
    env_logger::init();
    let cli = Cli::parse();

    let home = home::home_dir().context("could not determine the home directory")?;
    let config_path = cli.config.clone().unwrap_or_else(|| home.join(CONFIG_FILE_NAME));
    let current_dir = env::current_dir().context("could not determine the current directory")?;
    let config = config::load(&config_path, &current_dir)?;
    info!("Working in {}:{}", config.login_host, config.work_dir);

    let transport = SshTransport;
    let mut decisions = StdinDecisions;

    if cli.clean {
        submit::clean(&config, &transport, &mut decisions)?;
        return Ok(());
    }

    let dry_run = cli.dry_run;
    let spec = build_spec(cli)?;

    if dry_run {
        print!("{}", pbs::script::render(&spec));
        return Ok(());
    }

    let outcome = submit::submit(&spec, &config, &transport, &mut decisions)?;
    println!("Job submitted, using {} CPUs in total.", outcome.total_cpus);
    Ok(())
}

/// Check the executable locally and turn the command line into a validated
/// job specification.
fn build_spec(cli: Cli) -> Result<JobSpec> {
    let executable = match cli.executable {
        Some(path) => path,
        None => bail!("no executable given"),
    };
    if !executable.exists() {
        bail!("{} does not exist", executable.display());
    }
    if !is_executable(&executable) {
        bail!("{} is not executable", executable.display());
    }

    let params = JobParams {
        nodes: cli.nodes,
        processes_per_node: cli.ppn,
        job_name: cli.name,
        stdout_file: cli.stdout,
        stderr_file: cli.stderr,
        shared_nodes: cli.shared,
        walltime_hours: cli.walltime,
        queue: cli.queue,
        priority: cli.priority,
        use_mpi: !cli.no_mpi,
        include_ncpus: cli.ncpus,
        executable,
    };
    Ok(JobSpec::from_params(params)?)
}

#[cfg(unix)]
fn is_executable(path: &Path) -> bool {
    use std::os::unix::fs::PermissionsExt;

    std::fs::metadata(path)
        .map(|meta| meta.permissions().mode() & 0o111 != 0)
        .unwrap_or(false)
}

#[cfg(not(unix))]
fn is_executable(_path: &Path) -> bool {
    true
}
