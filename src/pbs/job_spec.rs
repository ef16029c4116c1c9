use std::fmt;
use std::path::PathBuf;

use log::info;

/// Raw job parameters as collected from the command line, before validation.
#[derive(Debug)]
pub struct JobParams {
    pub nodes: Option<u32>,
    pub processes_per_node: Option<u32>,
    pub job_name: Option<String>,
    pub stdout_file: Option<String>,
    pub stderr_file: Option<String>,
    pub shared_nodes: bool,
    pub walltime_hours: u32,
    pub queue: String,
    pub priority: i32,
    pub use_mpi: bool,
    pub include_ncpus: bool,
    pub executable: PathBuf,
}

/// A validated job specification, ready for rendering and submission.
#[derive(Debug, Clone)]
pub struct JobSpec {
    pub job_name: String,
    pub nodes: u32,
    pub processes_per_node: u32,
    pub walltime_hours: u32,
    pub queue: String,
    pub priority: i32,
    pub shared_nodes: bool,
    pub include_ncpus: bool,
    pub use_mpi: bool,
    pub stdout_file: String,
    pub stderr_file: String,
    pub executable: PathBuf,
}

#[derive(Debug, PartialEq, Eq)]
pub enum ValidationError {
    /// A required parameter was not supplied.
    MissingField(&'static str),
    /// A numeric parameter must be at least one.
    NotPositive(&'static str),
}

impl fmt::Display for ValidationError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            ValidationError::MissingField(name) => write!(f, "no {name} given"),
            ValidationError::NotPositive(name) => {
                write!(f, "the {name} must be a positive number")
            }
        }
    }
}

impl std::error::Error for ValidationError {}

impl JobSpec {
    /// Validate raw parameters and fill in defaults.
    ///
    /// The job name defaults to the executable's file name, stdout and
    /// stderr default to the job name with `.out`/`.err` appended. Each
    /// applied default is logged.
    pub fn from_params(params: JobParams) -> Result<JobSpec, ValidationError> {
        let nodes = params
            .nodes
            .ok_or(ValidationError::MissingField("number of nodes"))?;
        if nodes == 0 {
            return Err(ValidationError::NotPositive("number of nodes"));
        }
        let processes_per_node = params
            .processes_per_node
            .ok_or(ValidationError::MissingField("number of processes per node"))?;
        if processes_per_node == 0 {
            return Err(ValidationError::NotPositive("number of processes per node"));
        }
        if params.walltime_hours == 0 {
            return Err(ValidationError::NotPositive("walltime"));
        }

        let executable = params.executable;
        let basename = executable
            .file_name()
            .ok_or(ValidationError::MissingField("executable file name"))?
            .to_string_lossy()
            .into_owned();

        let job_name = match params.job_name {
            Some(name) => name,
            None => {
                info!("No job name given, using {basename} instead");
                basename
            }
        };
        let stdout_file = match params.stdout_file {
            Some(file) => file,
            None => {
                let file = format!("{job_name}.out");
                info!("No file for stdout given, will use {file} instead");
                file
            }
        };
        let stderr_file = match params.stderr_file {
            Some(file) => file,
            None => {
                let file = format!("{job_name}.err");
                info!("No file for stderr given, will use {file} instead");
                file
            }
        };

        Ok(JobSpec {
            job_name,
            nodes,
            processes_per_node,
            walltime_hours: params.walltime_hours,
            queue: params.queue,
            priority: params.priority,
            shared_nodes: params.shared_nodes,
            include_ncpus: params.include_ncpus,
            use_mpi: params.use_mpi,
            stdout_file,
            stderr_file,
            executable,
        })
    }

    /// Total requested CPU count.
    pub fn total_cpus(&self) -> u64 {
        u64::from(self.nodes) * u64::from(self.processes_per_node)
    }

    /// Final path component of the executable, used as its file name in the
    /// remote working directory. Always present on a validated spec.
    pub fn executable_name(&self) -> String {
        self.executable
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_default()
    }
}
