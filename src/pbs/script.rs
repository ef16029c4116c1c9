use serde::Serialize;
use tinytemplate::TinyTemplate;

use crate::pbs::job_spec::JobSpec;

/// Marker appended to the resource line when nodes may be shared.
const SHARED_MARKER: &str = "#shared";

/// Rendering context for the jobscript template.
#[derive(Serialize)]
struct ScriptContext {
    job_name: String,
    stdout_file: String,
    stderr_file: String,
    nodes: u32,
    processes_per_node: u32,
    shared_marker: String,
    walltime_hours: u32,
    ncpus_line: String,
    queue: String,
    priority: i32,
    command: String,
}

impl ScriptContext {
    fn new(spec: &JobSpec) -> ScriptContext {
        let shared_marker = match spec.shared_nodes {
            true => SHARED_MARKER.to_string(),
            false => String::new(),
        };
        // an empty string keeps the line in place, so the script layout is
        // identical whether or not ncpus is requested
        let ncpus_line = match spec.include_ncpus {
            true => format!("#PBS -l ncpus={}", spec.total_cpus()),
            false => String::new(),
        };
        let executable = spec.executable.display();
        let command = match spec.use_mpi {
            true => format!("mpirun {executable}"),
            false => executable.to_string(),
        };

        ScriptContext {
            job_name: spec.job_name.clone(),
            stdout_file: spec.stdout_file.clone(),
            stderr_file: spec.stderr_file.clone(),
            nodes: spec.nodes,
            processes_per_node: spec.processes_per_node,
            shared_marker,
            walltime_hours: spec.walltime_hours,
            ncpus_line,
            queue: spec.queue.clone(),
            priority: spec.priority,
            command,
        }
    }
}

/// Render the jobscript for `spec`.
///
/// Rendering is deterministic and the line structure is fixed: optional
/// content changes what a line holds, never whether it exists. Downstream
/// tooling that parses the directive block sees a stable layout.
pub fn render(spec: &JobSpec) -> String {
    /// included jobscript template
    static JOBSCRIPT: &str =
        include_str!(concat!(env!("CARGO_MANIFEST_DIR"), "/data/templates/jobscript.txt"));
    let mut tt = TinyTemplate::new();
    // jobscripts are shell text, values must not be HTML-escaped
    tt.set_default_formatter(&tinytemplate::format_unescaped);
    tt.add_template("jobscript", JOBSCRIPT).expect("Template");
    tt.render("jobscript", &ScriptContext::new(spec)).expect("Rendered jobscript")
}
