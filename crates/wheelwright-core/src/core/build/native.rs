use std::fs;
use std::path::PathBuf;

use tracing::{debug, info};

use super::{absolute_out_dir, locate_output, ArtifactBuilder, BuildError, BuildRequest};
use crate::core::wheel::Artifact;
use crate::process::run_command;

const STDERR_TAIL_LINES: usize = 20;

/// Runs the build on the host, either through the configured shell command or
/// `python{X.Y} -m build --wheel`.
pub struct NativeBuilder {
    command: Option<String>,
    source_dir: Option<PathBuf>,
}

impl NativeBuilder {
    #[must_use]
    pub fn new(command: Option<String>, source_dir: Option<PathBuf>) -> Self {
        Self {
            command,
            source_dir,
        }
    }

    fn invocation(&self, request: &BuildRequest<'_>) -> Result<(String, Vec<String>), BuildError> {
        if let Some(command) = &self.command {
            return Ok(("sh".to_string(), vec!["-c".to_string(), command.clone()]));
        }
        let interpreter = format!("python{}", request.target.runtime);
        let program = which::which(&interpreter)
            .map_err(|_| BuildError::Unavailable(format!("{interpreter} is not on PATH")))?;
        Ok((
            program.display().to_string(),
            vec![
                "-m".to_string(),
                "build".to_string(),
                "--wheel".to_string(),
                "--outdir".to_string(),
                request.out_dir.display().to_string(),
            ],
        ))
    }
}

impl ArtifactBuilder for NativeBuilder {
    fn name(&self) -> &'static str {
        "native"
    }

    fn build(&self, request: &BuildRequest<'_>) -> Result<Artifact, BuildError> {
        let out_dir = absolute_out_dir(request)?;
        let request = &BuildRequest {
            out_dir: &out_dir,
            ..*request
        };
        fs::create_dir_all(request.out_dir).map_err(|err| BuildError::Spawn(err.to_string()))?;
        let (program, args) = self.invocation(request)?;
        let cwd = match &self.source_dir {
            Some(dir) => dir.clone(),
            None => std::env::current_dir().map_err(|err| BuildError::Spawn(err.to_string()))?,
        };
        let envs = request.environment(&request.out_dir.display().to_string());
        info!(target = %request.target, backend = self.name(), "building");
        debug!(%program, ?args, cwd = %cwd.display(), "spawning build");
        let output = run_command(&program, &args, &envs, &cwd)
            .map_err(|err| BuildError::Spawn(format!("{err:#}")))?;
        if !output.succeeded() {
            return Err(BuildError::Failed {
                code: output.code,
                stderr: output.stderr_tail(STDERR_TAIL_LINES),
            });
        }
        locate_output(request)
    }
}
