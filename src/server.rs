use crate::analyzer::{Stats, analyze};
use crate::config::Config;
use crate::data::{
    ClassId, Dataset, Grid, LessonPlacement, Room, RoomId, SchoolClass, Subject, Teacher,
};
use crate::error::AppError;
use crate::registry::{
    ClassEdit, NewClass, NewRoom, NewSubject, NewTeacher, Registry, RoomEdit, SubjectEdit,
    TeacherEdit,
};
use crate::solver::{CommandSolver, Generated, Solver, generate};
use crate::validator::{Report, validate_with_grid};
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::routing::{get, patch, post};
use axum::{Json, Router};
use log::{info, warn};
use serde::Deserialize;
use std::collections::BTreeMap;
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};
use tower::limit::ConcurrencyLimitLayer;

#[derive(Clone)]
pub struct AppState {
    registry: Arc<RwLock<Registry>>,
    solver: Option<Arc<dyn Solver>>,
}

impl AppState {
    pub fn new(registry: Registry, solver: Option<Arc<dyn Solver>>) -> Self {
        Self {
            registry: Arc::new(RwLock::new(registry)),
            solver,
        }
    }

    fn read(&self) -> Result<RwLockReadGuard<'_, Registry>, AppError> {
        self.registry
            .read()
            .map_err(|_| AppError::Internal("registry lock poisoned".to_string()))
    }

    fn write(&self) -> Result<RwLockWriteGuard<'_, Registry>, AppError> {
        self.registry
            .write()
            .map_err(|_| AppError::Internal("registry lock poisoned".to_string()))
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AnalyzeRequest {
    pub placements: Vec<LessonPlacement>,
    pub dataset: Dataset,
    pub grid: Option<Grid>,
}

type Created<T> = (StatusCode, Json<T>);

async fn get_registry(State(state): State<AppState>) -> Result<Json<Dataset>, AppError> {
    Ok(Json(state.read()?.snapshot()))
}

async fn import_registry(
    State(state): State<AppState>,
    Json(dataset): Json<Dataset>,
) -> Result<Json<Dataset>, AppError> {
    let mut registry = state.write()?;
    registry.import(dataset)?;
    Ok(Json(registry.snapshot()))
}

async fn validate_registry(State(state): State<AppState>) -> Result<Json<Report>, AppError> {
    let registry = state.read()?;
    Ok(Json(validate_with_grid(&registry.snapshot(), registry.grid())))
}

async fn registry_rooms(
    State(state): State<AppState>,
) -> Result<Json<BTreeMap<ClassId, RoomId>>, AppError> {
    Ok(Json(state.read()?.class_rooms()))
}

async fn add_class(
    State(state): State<AppState>,
    Json(new): Json<NewClass>,
) -> Result<Created<SchoolClass>, AppError> {
    let class = state.write()?.add_class(new)?;
    Ok((StatusCode::CREATED, Json(class)))
}

async fn edit_class(
    State(state): State<AppState>,
    Path(id): Path<u32>,
    Json(edit): Json<ClassEdit>,
) -> Result<Json<SchoolClass>, AppError> {
    Ok(Json(state.write()?.edit_class(id, edit)?))
}

async fn delete_class(
    State(state): State<AppState>,
    Path(id): Path<u32>,
) -> Result<Json<SchoolClass>, AppError> {
    Ok(Json(state.write()?.delete_class(id)?))
}

async fn add_subject(
    State(state): State<AppState>,
    Json(new): Json<NewSubject>,
) -> Result<Created<Subject>, AppError> {
    let subject = state.write()?.add_subject(new)?;
    Ok((StatusCode::CREATED, Json(subject)))
}

async fn edit_subject(
    State(state): State<AppState>,
    Path(id): Path<u32>,
    Json(edit): Json<SubjectEdit>,
) -> Result<Json<Subject>, AppError> {
    Ok(Json(state.write()?.edit_subject(id, edit)?))
}

async fn delete_subject(
    State(state): State<AppState>,
    Path(id): Path<u32>,
) -> Result<Json<Subject>, AppError> {
    Ok(Json(state.write()?.delete_subject(id)?))
}

async fn add_teacher(
    State(state): State<AppState>,
    Json(new): Json<NewTeacher>,
) -> Result<Created<Teacher>, AppError> {
    let teacher = state.write()?.add_teacher(new)?;
    Ok((StatusCode::CREATED, Json(teacher)))
}

async fn edit_teacher(
    State(state): State<AppState>,
    Path(id): Path<u32>,
    Json(edit): Json<TeacherEdit>,
) -> Result<Json<Teacher>, AppError> {
    Ok(Json(state.write()?.edit_teacher(id, edit)?))
}

async fn delete_teacher(
    State(state): State<AppState>,
    Path(id): Path<u32>,
) -> Result<Json<Teacher>, AppError> {
    Ok(Json(state.write()?.delete_teacher(id)?))
}

async fn add_room(
    State(state): State<AppState>,
    Json(new): Json<NewRoom>,
) -> Result<Created<Room>, AppError> {
    let room = state.write()?.add_room(new)?;
    Ok((StatusCode::CREATED, Json(room)))
}

async fn edit_room(
    State(state): State<AppState>,
    Path(id): Path<u32>,
    Json(edit): Json<RoomEdit>,
) -> Result<Json<Room>, AppError> {
    Ok(Json(state.write()?.edit_room(id, edit)?))
}

async fn delete_room(
    State(state): State<AppState>,
    Path(id): Path<u32>,
) -> Result<Json<Room>, AppError> {
    Ok(Json(state.write()?.delete_room(id)?))
}

async fn validate_handler(
    State(state): State<AppState>,
    Json(dataset): Json<Dataset>,
) -> Result<Json<Report>, AppError> {
    let grid = state.read()?.grid();
    Ok(Json(validate_with_grid(&dataset, grid)))
}

async fn analyze_handler(
    State(state): State<AppState>,
    Json(request): Json<AnalyzeRequest>,
) -> Result<Json<Stats>, AppError> {
    let grid = match request.grid {
        Some(grid) => grid,
        None => state.read()?.grid(),
    };
    if !grid.is_supported() {
        return Err(AppError::InvalidGrid(grid));
    }
    Ok(Json(analyze(&request.placements, &request.dataset, grid)))
}

async fn generate_handler(State(state): State<AppState>) -> Result<Json<Generated>, AppError> {
    let solver = state.solver.clone().ok_or(AppError::NoSolver)?;
    let (dataset, grid) = {
        let registry = state.read()?;
        (registry.snapshot(), registry.grid())
    };

    let generated = tokio::task::spawn_blocking(move || generate(dataset, grid, solver.as_ref()))
        .await
        .map_err(|e| AppError::Internal(format!("solver task failed: {e}")))??;
    if !generated.stats.is_consistent() {
        warn!("Solver produced a timetable with conflicts");
    }
    Ok(Json(generated))
}

pub fn router(state: AppState, max_solves: usize) -> Router {
    Router::new()
        .route("/v1/registry", get(get_registry).put(import_registry))
        .route("/v1/registry/validate", get(validate_registry))
        .route("/v1/registry/rooms", get(registry_rooms))
        .route("/v1/classes", post(add_class))
        .route("/v1/classes/:id", patch(edit_class).delete(delete_class))
        .route("/v1/subjects", post(add_subject))
        .route("/v1/subjects/:id", patch(edit_subject).delete(delete_subject))
        .route("/v1/teachers", post(add_teacher))
        .route("/v1/teachers/:id", patch(edit_teacher).delete(delete_teacher))
        .route("/v1/rooms", post(add_room))
        .route("/v1/rooms/:id", patch(edit_room).delete(delete_room))
        .route("/v1/validate", post(validate_handler))
        .route("/v1/analyze", post(analyze_handler))
        .route(
            "/v1/generate",
            post(generate_handler).layer(ConcurrencyLimitLayer::new(max_solves)),
        )
        .with_state(state)
}

pub async fn run_server(config: Config) -> Result<(), Box<dyn std::error::Error>> {
    let solver = config
        .solver
        .as_deref()
        .and_then(CommandSolver::from_command_line)
        .map(|s| Arc::new(s) as Arc<dyn Solver>);
    if solver.is_none() {
        warn!("TIMETABLE_SOLVER is not set; /v1/generate will be unavailable");
    }

    let state = AppState::new(Registry::new(config.grid), solver);
    let app = router(state, config.max_solves);

    let listener = tokio::net::TcpListener::bind(config.addr()?).await?;
    info!("Server running at http://{}", listener.local_addr()?);

    axum::serve(listener, app).await?;
    Ok(())
}
