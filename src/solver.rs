use crate::analyzer::{Stats, analyze};
use crate::data::{ClassId, Dataset, Grid, LessonPlacement, RoomId, class_rooms};
use crate::error::AppError;
use crate::validator::{is_ready, validate_with_grid};
use log::{info, trace, warn};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::io::{self, Write};
use std::process::{Command, Stdio};
use std::thread;
use std::time::Instant;
use thiserror::Error;

/// Everything the external solver gets to see.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SolverInput {
    #[serde(flatten)]
    pub dataset: Dataset,
    pub class_rooms: BTreeMap<ClassId, RoomId>,
    pub grid: Grid,
}

impl SolverInput {
    pub fn new(dataset: Dataset, grid: Grid) -> Self {
        let class_rooms = class_rooms(&dataset.classes, &dataset.rooms);
        Self {
            dataset,
            class_rooms,
            grid,
        }
    }
}

/// What the solver writes back: placements, or an error message.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
enum SolverOutput {
    Placements { placements: Vec<LessonPlacement> },
    Failed { error: String },
}

#[derive(Debug, Error)]
pub enum SolverError {
    #[error("could not run solver: {0}")]
    Io(#[from] io::Error),
    #[error("solver output is not valid JSON: {0}")]
    Json(#[from] serde_json::Error),
    #[error("solver exited with {status}: {stderr}")]
    Exit { status: String, stderr: String },
    #[error("no timetable found: {0}")]
    Infeasible(String),
}

/// Timetable generation, treated as a black box.
pub trait Solver: Send + Sync {
    fn solve(&self, input: &SolverInput) -> Result<Vec<LessonPlacement>, SolverError>;
}

/// Runs an external program that reads a [`SolverInput`] as JSON on stdin and
/// prints `{"placements": [...]}` or `{"error": "..."}` on stdout.
#[derive(Debug, Clone)]
pub struct CommandSolver {
    program: String,
    args: Vec<String>,
}

impl CommandSolver {
    pub fn new(program: impl Into<String>, args: Vec<String>) -> Self {
        Self {
            program: program.into(),
            args,
        }
    }

    /// Splits a command line on whitespace; `None` when it is blank.
    pub fn from_command_line(line: &str) -> Option<Self> {
        let mut parts = line.split_whitespace().map(str::to_string);
        let program = parts.next()?;
        Some(Self::new(program, parts.collect()))
    }
}

impl Solver for CommandSolver {
    fn solve(&self, input: &SolverInput) -> Result<Vec<LessonPlacement>, SolverError> {
        let payload = serde_json::to_vec(input)?;
        trace!("Spawning solver {} with {} bytes of input", self.program, payload.len());

        let mut child = Command::new(&self.program)
            .args(&self.args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()?;

        // stdin is fed from its own thread while stdout and stderr drain here
        let stdin = child.stdin.take();
        let writer = thread::Builder::new()
            .name("solver-stdin".to_string())
            .spawn(move || match stdin {
                Some(mut stdin) => stdin.write_all(&payload),
                None => Ok(()),
            });
        let writer = match writer {
            Ok(writer) => writer,
            Err(e) => {
                let _ = child.kill();
                let _ = child.wait();
                return Err(e.into());
            }
        };
        let output = child.wait_with_output()?;
        let written = writer
            .join()
            .unwrap_or_else(|_| Err(io::Error::other("solver stdin writer panicked")));

        if !output.status.success() {
            return Err(SolverError::Exit {
                status: output.status.to_string(),
                stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            });
        }
        if let Err(e) = written {
            warn!("Solver exited before reading its input: {e}");
            return Err(e.into());
        }
        match serde_json::from_slice(&output.stdout)? {
            SolverOutput::Placements { placements } => Ok(placements),
            SolverOutput::Failed { error } => Err(SolverError::Infeasible(error)),
        }
    }
}

/// A solved timetable together with its analysis.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Generated {
    pub placements: Vec<LessonPlacement>,
    pub stats: Stats,
}

/// Validates, solves and analyzes. The solver is never invoked on data with
/// blocking errors, and a failed solve is never analyzed.
pub fn generate(
    dataset: Dataset,
    grid: Grid,
    solver: &dyn Solver,
) -> Result<Generated, AppError> {
    let report = validate_with_grid(&dataset, grid);
    if !is_ready(&report) {
        warn!("Refusing to generate: {} blocking errors", report.errors.len());
        return Err(AppError::NotReady(report));
    }

    let start_time = Instant::now();
    info!(
        "Solving timetable for {} classes, {} subjects and {} rooms...",
        dataset.classes.len(),
        dataset.subjects.len(),
        dataset.rooms.len()
    );
    let input = SolverInput::new(dataset, grid);
    let placements = solver.solve(&input)?;
    info!(
        "Solver returned {} placements in {:.2?}",
        placements.len(),
        start_time.elapsed()
    );

    let stats = analyze(&placements, &input.dataset, grid);
    Ok(Generated { placements, stats })
}
