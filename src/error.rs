use crate::data::{Grid, MAX_DAYS, MAX_PERIODS};
use crate::registry::RegistryError;
use crate::solver::SolverError;
use crate::validator::Report;
use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use log::error;
use serde_json::json;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum AppError {
    #[error(transparent)]
    Registry(#[from] RegistryError),
    /// Validation found blocking errors; the report travels with the error.
    #[error("registration data is not ready: {} blocking errors", .0.errors.len())]
    NotReady(Report),
    #[error(
        "unsupported grid {}x{}: expected 1 to {} days of 1 to {} periods",
        .0.days, .0.periods, MAX_DAYS, MAX_PERIODS
    )]
    InvalidGrid(Grid),
    #[error(transparent)]
    Solver(#[from] SolverError),
    #[error("no solver configured")]
    NoSolver,
    #[error("internal error: {0}")]
    Internal(String),
}

impl AppError {
    pub fn status(&self) -> StatusCode {
        match self {
            AppError::Registry(RegistryError::NotFound { .. }) => StatusCode::NOT_FOUND,
            AppError::Registry(RegistryError::DuplicateName { .. })
            | AppError::Registry(RegistryError::SubjectTaken { .. }) => StatusCode::CONFLICT,
            AppError::Registry(_) | AppError::NotReady(_) | AppError::InvalidGrid(_) => {
                StatusCode::UNPROCESSABLE_ENTITY
            }
            AppError::Solver(_) => StatusCode::BAD_GATEWAY,
            AppError::NoSolver => StatusCode::SERVICE_UNAVAILABLE,
            AppError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            error!("{self}");
        }
        let body = match &self {
            AppError::NotReady(report) => json!({ "error": self.to_string(), "report": report }),
            _ => json!({ "error": self.to_string() }),
        };
        (status, Json(body)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_mapping() {
        let not_found = AppError::from(RegistryError::NotFound { kind: "room", id: 7 });
        assert_eq!(not_found.status(), StatusCode::NOT_FOUND);
        assert_eq!(not_found.to_string(), "room 7 not found");

        let taken = AppError::from(RegistryError::SubjectTaken {
            subject_id: 101,
            teacher_id: 201,
        });
        assert_eq!(taken.status(), StatusCode::CONFLICT);
        assert_eq!(
            AppError::from(RegistryError::EmptyLoad).status(),
            StatusCode::UNPROCESSABLE_ENTITY
        );
        assert_eq!(
            AppError::from(SolverError::Infeasible("x".into())).status(),
            StatusCode::BAD_GATEWAY
        );
        assert_eq!(AppError::NoSolver.status(), StatusCode::SERVICE_UNAVAILABLE);

        let grid = AppError::InvalidGrid(Grid { days: 9, periods: 6 });
        assert_eq!(grid.status(), StatusCode::UNPROCESSABLE_ENTITY);
        assert_eq!(
            grid.to_string(),
            "unsupported grid 9x6: expected 1 to 7 days of 1 to 24 periods"
        );
        assert_eq!(
            AppError::from(RegistryError::IdSpaceExhausted { kind: "class" }).status(),
            StatusCode::UNPROCESSABLE_ENTITY
        );
    }
}
