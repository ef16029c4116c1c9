//! Stage executables and jobscripts on the login host and submit them
//!
//! Each step is a blocking remote operation and the first failure aborts
//! the rest of the pipeline. Nothing is retried and already-copied files
//! are left in place.

use std::fmt;
use std::io::{self, Write};
use std::path::PathBuf;

use log::info;
use tempfile::NamedTempFile;

use crate::config::RemoteConfig;
use crate::pbs::job_spec::JobSpec;
use crate::pbs::script;
use crate::remote::{RemoteFailure, RemoteTransport};

/// Answers the yes/no questions the workflow asks the operator.
///
/// Non-interactive callers supply preset answers instead of blocking on a
/// terminal.
pub trait DecisionProvider {
    fn confirm(&mut self, question: &str) -> io::Result<bool>;
}

/// Interactive decisions read from stdin.
pub struct StdinDecisions;

impl DecisionProvider for StdinDecisions {
    fn confirm(&mut self, question: &str) -> io::Result<bool> {
        print!("{question} [y/n]? ");
        io::stdout().flush()?;
        let mut answer = String::new();
        io::stdin().read_line(&mut answer)?;
        Ok(is_affirmative(&answer))
    }
}

/// Accepts the usual spellings of yes, case-insensitively. Anything else
/// counts as no.
fn is_affirmative(answer: &str) -> bool {
    matches!(answer.trim().to_ascii_lowercase().as_str(), "y" | "yes")
}

/// Report returned after a successful submission.
#[derive(Debug)]
pub struct SubmissionOutcome {
    /// Total CPU count requested by the submitted job.
    pub total_cpus: u64,
}

#[derive(Debug)]
pub enum SubmitError {
    /// The existence check itself failed, nothing is known about the file.
    CheckInconclusive { host: String, path: String, cause: io::Error },
    CopyFailed { host: String, path: PathBuf, failure: RemoteFailure },
    UploadFailed { host: String, path: PathBuf, failure: RemoteFailure },
    SubmitFailed { host: String, script: String, failure: RemoteFailure },
    CleanFailed { host: String, pattern: String, failure: RemoteFailure },
    /// The jobscript could not be written to a local temporary file.
    StageFailed(io::Error),
    /// The operator's answer could not be read.
    PromptFailed(io::Error),
}

impl fmt::Display for SubmitError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            SubmitError::CheckInconclusive { host, path, cause } => {
                write!(f, "could not check whether {path} exists on {host}: {cause}")
            }
            SubmitError::CopyFailed { host, path, failure } => {
                write!(f, "copying {} to {host} failed ({failure})", path.display())
            }
            SubmitError::UploadFailed { host, path, failure } => {
                write!(f, "copying the jobscript {} to {host} failed ({failure})", path.display())
            }
            SubmitError::SubmitFailed { host, script, failure } => {
                write!(f, "submitting {script} on {host} failed ({failure})")
            }
            SubmitError::CleanFailed { host, pattern, failure } => {
                write!(f, "removing {pattern} on {host} failed ({failure})")
            }
            SubmitError::StageFailed(err) => {
                write!(f, "could not write the jobscript to a temporary file: {err}")
            }
            SubmitError::PromptFailed(err) => write!(f, "could not read an answer: {err}"),
        }
    }
}

impl std::error::Error for SubmitError {}

/// Stage the executable and jobscript of `spec` on the login host and
/// submit the jobscript with qsub.
///
/// When the executable already exists in the remote working directory the
/// operator decides whether to overwrite it; declining keeps the remote
/// copy and still submits.
pub fn submit(
    spec: &JobSpec,
    config: &RemoteConfig,
    transport: &dyn RemoteTransport,
    decisions: &mut dyn DecisionProvider,
) -> Result<SubmissionOutcome, SubmitError> {
    let host = &config.login_host;
    let executable_name = spec.executable_name();
    let remote_executable = format!("{}/{}", config.work_dir, executable_name);

    let already_there = transport.exists(host, &remote_executable).map_err(|cause| {
        SubmitError::CheckInconclusive {
            host: host.clone(),
            path: remote_executable.clone(),
            cause,
        }
    })?;

    let do_copy = match already_there {
        true => {
            let question = format!(
                "The file {executable_name} already exists in {host}:{}. \
                 Overwrite? Answering no will use the remote file as is.",
                config.work_dir
            );
            decisions.confirm(&question).map_err(SubmitError::PromptFailed)?
        }
        false => true,
    };

    if do_copy {
        info!("Copying {} to {host}:{}", spec.executable.display(), config.work_dir);
        let copied = transport.copy_to(host, &spec.executable, &config.work_dir);
        ensure_success(copied).map_err(|failure| SubmitError::CopyFailed {
            host: host.clone(),
            path: spec.executable.clone(),
            failure,
        })?;
    } else {
        info!("Keeping the remote copy of {executable_name}");
    }

    let script_file = stage_script(spec, &config.script_suffix).map_err(SubmitError::StageFailed)?;
    let script_name = script_file
        .path()
        .file_name()
        .expect("temporary file has a name")
        .to_string_lossy()
        .into_owned();

    info!("Copying jobscript to {host}:{}", config.work_dir);
    let uploaded = transport.copy_to(host, script_file.path(), &config.work_dir);
    ensure_success(uploaded).map_err(|failure| SubmitError::UploadFailed {
        host: host.clone(),
        path: script_file.path().to_path_buf(),
        failure,
    })?;

    let submitted = transport.run(host, &format!("cd {} && qsub {script_name}", config.work_dir));
    ensure_success(submitted).map_err(|failure| SubmitError::SubmitFailed {
        host: host.clone(),
        script: script_name.clone(),
        failure,
    })?;

    Ok(SubmissionOutcome { total_cpus: spec.total_cpus() })
}

/// Remove all jobscripts from the remote working directory.
///
/// Declining the confirmation leaves the remote side untouched and is not
/// an error.
pub fn clean(
    config: &RemoteConfig,
    transport: &dyn RemoteTransport,
    decisions: &mut dyn DecisionProvider,
) -> Result<(), SubmitError> {
    let host = &config.login_host;
    let pattern = format!("{}/*{}", config.work_dir, config.script_suffix);
    let question = format!("Remove *{} in {host}:{}", config.script_suffix, config.work_dir);
    if !decisions.confirm(&question).map_err(SubmitError::PromptFailed)? {
        info!("Leaving jobscripts in place");
        return Ok(());
    }

    let removed = transport.run(host, &format!("rm {pattern}"));
    ensure_success(removed).map_err(|failure| SubmitError::CleanFailed {
        host: host.clone(),
        pattern,
        failure,
    })
}

/// Render the jobscript and write it to a uniquely named temporary file
/// carrying the configured suffix.
///
/// The returned guard deletes the file when dropped, whichever way the
/// submission ends.
fn stage_script(spec: &JobSpec, suffix: &str) -> io::Result<NamedTempFile> {
    let mut file = tempfile::Builder::new().prefix("pbsjob").suffix(suffix).tempfile()?;
    file.write_all(script::render(spec).as_bytes())?;
    file.flush()?;
    Ok(file)
}

fn ensure_success(result: io::Result<i32>) -> Result<(), RemoteFailure> {
    match result {
        Ok(0) => Ok(()),
        Ok(status) => Err(RemoteFailure::Exit(status)),
        Err(err) => Err(RemoteFailure::Spawn(err)),
    }
}

#[cfg(test)]
mod tests {
    use std::cell::RefCell;
    use std::collections::VecDeque;
    use std::path::Path;

    use super::*;

    #[derive(Default)]
    struct SpyTransport {
        /// `None` makes the existence check fail outright.
        exists: Option<bool>,
        /// Exit statuses handed out to `copy_to` calls in order; further
        /// calls succeed.
        copy_statuses: RefCell<VecDeque<i32>>,
        run_status: i32,
        calls: RefCell<Vec<String>>,
    }

    impl SpyTransport {
        fn calls(&self) -> Vec<String> {
            self.calls.borrow().clone()
        }
    }

    impl RemoteTransport for SpyTransport {
        fn exists(&self, host: &str, path: &str) -> io::Result<bool> {
            self.calls.borrow_mut().push(format!("exists {host} {path}"));
            self.exists
                .ok_or_else(|| io::Error::new(io::ErrorKind::Other, "host unreachable"))
        }

        fn copy_to(&self, host: &str, local: &Path, remote_dir: &str) -> io::Result<i32> {
            self.calls
                .borrow_mut()
                .push(format!("copy {} {host}:{remote_dir}", local.display()));
            Ok(self.copy_statuses.borrow_mut().pop_front().unwrap_or(0))
        }

        fn run(&self, host: &str, command: &str) -> io::Result<i32> {
            self.calls.borrow_mut().push(format!("run {host} {command}"));
            Ok(self.run_status)
        }
    }

    struct PresetDecisions(VecDeque<bool>);

    impl PresetDecisions {
        fn answering(answers: &[bool]) -> PresetDecisions {
            PresetDecisions(answers.iter().copied().collect())
        }
    }

    impl DecisionProvider for PresetDecisions {
        fn confirm(&mut self, _question: &str) -> io::Result<bool> {
            Ok(self.0.pop_front().expect("unexpected confirmation prompt"))
        }
    }

    fn spec() -> JobSpec {
        JobSpec {
            job_name: "relax".to_string(),
            nodes: 2,
            processes_per_node: 16,
            walltime_hours: 100,
            queue: "parallel".to_string(),
            priority: 0,
            shared_nodes: false,
            include_ncpus: false,
            use_mpi: true,
            stdout_file: "relax.out".to_string(),
            stderr_file: "relax.err".to_string(),
            executable: PathBuf::from("target/relax"),
        }
    }

    fn config() -> RemoteConfig {
        RemoteConfig {
            login_host: "user@login.cluster".to_string(),
            work_dir: "/scratch/user".to_string(),
            script_suffix: ".jobscript".to_string(),
        }
    }

    #[test]
    fn test_submit_copies_uploads_and_submits() {
        let transport = SpyTransport { exists: Some(false), ..Default::default() };
        let mut decisions = PresetDecisions::answering(&[]);

        let outcome = submit(&spec(), &config(), &transport, &mut decisions).unwrap();
        assert_eq!(outcome.total_cpus, 32);

        let calls = transport.calls();
        assert_eq!(calls.len(), 4);
        assert_eq!(calls[0], "exists user@login.cluster /scratch/user/relax");
        assert!(calls[1].starts_with("copy target/relax user@login.cluster:/scratch/user"));
        assert!(calls[2].starts_with("copy "));
        assert!(calls[2].contains(".jobscript"));
        assert!(calls[3].starts_with("run user@login.cluster cd /scratch/user && qsub pbsjob"));
        assert!(calls[3].ends_with(".jobscript"));
    }

    #[test]
    fn test_declined_overwrite_keeps_the_remote_file() {
        let transport = SpyTransport { exists: Some(true), ..Default::default() };
        let mut decisions = PresetDecisions::answering(&[false]);

        submit(&spec(), &config(), &transport, &mut decisions).unwrap();

        // the executable copy is skipped, upload and submission still run
        let calls = transport.calls();
        assert_eq!(calls.len(), 3);
        assert!(calls[1].starts_with("copy "));
        assert!(calls[1].contains(".jobscript"));
        assert!(calls[2].starts_with("run "));
    }

    #[test]
    fn test_confirmed_overwrite_copies_again() {
        let transport = SpyTransport { exists: Some(true), ..Default::default() };
        let mut decisions = PresetDecisions::answering(&[true]);

        submit(&spec(), &config(), &transport, &mut decisions).unwrap();

        let calls = transport.calls();
        assert_eq!(calls.len(), 4);
        assert!(calls[1].starts_with("copy target/relax "));
    }

    #[test]
    fn test_inconclusive_check_aborts_everything() {
        let transport = SpyTransport::default();
        let mut decisions = PresetDecisions::answering(&[]);

        let err = submit(&spec(), &config(), &transport, &mut decisions).unwrap_err();
        assert!(matches!(err, SubmitError::CheckInconclusive { .. }));
        assert_eq!(transport.calls().len(), 1);
    }

    #[test]
    fn test_failed_copy_aborts_the_submission() {
        let transport = SpyTransport {
            exists: Some(false),
            copy_statuses: RefCell::new(VecDeque::from([1])),
            ..Default::default()
        };
        let mut decisions = PresetDecisions::answering(&[]);

        let err = submit(&spec(), &config(), &transport, &mut decisions).unwrap_err();
        assert!(matches!(err, SubmitError::CopyFailed { .. }));
        assert_eq!(transport.calls().len(), 2);
    }

    #[test]
    fn test_failed_upload_stops_before_qsub() {
        let transport = SpyTransport {
            exists: Some(false),
            copy_statuses: RefCell::new(VecDeque::from([0, 1])),
            ..Default::default()
        };
        let mut decisions = PresetDecisions::answering(&[]);

        let err = submit(&spec(), &config(), &transport, &mut decisions).unwrap_err();
        assert!(matches!(err, SubmitError::UploadFailed { .. }));
        assert!(!transport.calls().iter().any(|call| call.starts_with("run ")));
    }

    #[test]
    fn test_failed_qsub_reports_the_submission() {
        let transport =
            SpyTransport { exists: Some(false), run_status: 1, ..Default::default() };
        let mut decisions = PresetDecisions::answering(&[]);

        let err = submit(&spec(), &config(), &transport, &mut decisions).unwrap_err();
        assert!(matches!(err, SubmitError::SubmitFailed { .. }));
    }

    #[test]
    fn test_clean_removes_matching_scripts() {
        let transport = SpyTransport::default();
        let mut decisions = PresetDecisions::answering(&[true]);

        clean(&config(), &transport, &mut decisions).unwrap();

        let expected = "run user@login.cluster rm /scratch/user/*.jobscript".to_string();
        assert_eq!(transport.calls(), vec![expected]);
    }

    #[test]
    fn test_declined_clean_touches_nothing() {
        let transport = SpyTransport::default();
        let mut decisions = PresetDecisions::answering(&[false]);

        clean(&config(), &transport, &mut decisions).unwrap();
        assert!(transport.calls().is_empty());
    }

    #[test]
    fn test_failed_clean_surfaces_the_pattern() {
        let transport = SpyTransport { run_status: 1, ..Default::default() };
        let mut decisions = PresetDecisions::answering(&[true]);

        let err = clean(&config(), &transport, &mut decisions).unwrap_err();
        match err {
            SubmitError::CleanFailed { pattern, .. } => {
                assert_eq!(pattern, "/scratch/user/*.jobscript");
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_affirmative_spellings() {
        for answer in ["y", "Y", "yes", "Yes", "YES", " yes\n"] {
            assert!(is_affirmative(answer), "{answer:?} should count as yes");
        }
        for answer in ["n", "no", "", "yeah", "ja"] {
            assert!(!is_affirmative(answer), "{answer:?} should count as no");
        }
    }
}
