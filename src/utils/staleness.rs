use crate::error::Result;
use std::path::{Path, PathBuf};
use std::time::SystemTime;

/// Why a stage has to run (or why it may be skipped)
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Freshness {
    UpToDate,
    Forced,
    MissingOutput(PathBuf),
    NewerInput(PathBuf),
    ParametersChanged,
}

impl Freshness {
    pub fn is_stale(&self) -> bool {
        !matches!(self, Freshness::UpToDate)
    }

    pub fn describe(&self) -> String {
        match self {
            Freshness::UpToDate => "outputs are up to date".to_string(),
            Freshness::Forced => "forced".to_string(),
            Freshness::MissingOutput(p) => format!("output {} is missing", p.display()),
            Freshness::NewerInput(p) => format!("input {} is newer than outputs", p.display()),
            Freshness::ParametersChanged => "stage parameters changed".to_string(),
        }
    }
}

fn modified(path: &Path) -> Result<SystemTime> {
    Ok(std::fs::metadata(path)?.modified()?)
}

/// Compare input and output modification times.
///
/// A stage is stale when any output is missing or any existing input was
/// modified after the oldest output. Inputs that do not exist are ignored
/// here; the stage itself reports them.
pub fn check_freshness(inputs: &[PathBuf], outputs: &[PathBuf]) -> Result<Freshness> {
    let mut oldest_output: Option<SystemTime> = None;
    for output in outputs {
        if !output.exists() {
            return Ok(Freshness::MissingOutput(output.clone()));
        }
        let m = modified(output)?;
        oldest_output = Some(oldest_output.map_or(m, |o| o.min(m)));
    }

    let Some(oldest_output) = oldest_output else {
        return Ok(Freshness::UpToDate);
    };

    for input in inputs.iter().filter(|p| p.exists()) {
        if modified(input)? > oldest_output {
            return Ok(Freshness::NewerInput(input.clone()));
        }
    }

    Ok(Freshness::UpToDate)
}
