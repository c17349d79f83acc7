//! FFmpeg command wrapper utilities

use std::ffi::OsString;
use std::path::Path;
use std::process::{Command, Output};
use thiserror::Error;
use tracing::debug;

#[derive(Debug, Error)]
pub enum FfmpegError {
    #[error("FFmpeg not found: {0}")]
    NotInstalled(String),

    #[error("FFmpeg could not be started: {0}")]
    SpawnFailed(String),

    #[error("FFmpeg exited with {code:?}: {stderr}")]
    ExecutionFailed { code: Option<i32>, stderr: String },
}

/// Builder for a single `ffmpeg` invocation.
///
/// Arguments are kept as `OsString` so non-UTF-8 paths survive untouched.
pub struct FfmpegCommand {
    program: OsString,
    args: Vec<OsString>,
}

impl FfmpegCommand {
    pub fn new() -> Self {
        Self::with_program("ffmpeg")
    }

    /// Use a specific decoder binary instead of `ffmpeg` from `PATH`.
    pub fn with_program(program: impl Into<OsString>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
        }
    }

    /// Replace existing output files without prompting (`-y`).
    pub fn overwrite(mut self) -> Self {
        self.args.push("-y".into());
        self
    }

    /// Only report errors on stderr.
    pub fn quiet(mut self) -> Self {
        self.args.push("-hide_banner".into());
        self.args.push("-loglevel".into());
        self.args.push("error".into());
        self
    }

    pub fn input(mut self, path: impl AsRef<Path>) -> Self {
        self.args.push("-i".into());
        self.args.push(path.as_ref().as_os_str().to_owned());
        self
    }

    /// Video filter graph (`-vf`).
    pub fn video_filter(mut self, filter: &str) -> Self {
        self.args.push("-vf".into());
        self.args.push(filter.into());
        self
    }

    pub fn output(mut self, path: impl AsRef<Path>) -> Self {
        self.args.push(path.as_ref().as_os_str().to_owned());
        self
    }

    pub fn args(mut self, args: &[&str]) -> Self {
        self.args.extend(args.iter().map(OsString::from));
        self
    }

    pub fn program(&self) -> &OsString {
        &self.program
    }

    pub fn arg_list(&self) -> &[OsString] {
        &self.args
    }

    pub fn execute(self) -> Result<Output, FfmpegError> {
        if !is_installed(&self.program) {
            return Err(FfmpegError::NotInstalled(
                self.program.to_string_lossy().into_owned(),
            ));
        }

        debug!("Running {:?} {:?}", self.program, self.args);

        let output = Command::new(&self.program)
            .args(&self.args)
            .output()
            .map_err(|e| FfmpegError::SpawnFailed(e.to_string()))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();
            return Err(FfmpegError::ExecutionFailed {
                code: output.status.code(),
                stderr,
            });
        }

        Ok(output)
    }
}

impl Default for FfmpegCommand {
    fn default() -> Self {
        Self::new()
    }
}

fn is_installed(program: &OsString) -> bool {
    Command::new(program)
        .arg("-version")
        .output()
        .map(|o| o.status.success())
        .unwrap_or(false)
}

/// Whether the system `ffmpeg` binary can be executed.
pub fn is_ffmpeg_installed() -> bool {
    is_installed(&OsString::from("ffmpeg"))
}
