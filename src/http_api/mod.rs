use std::{net::SocketAddr, sync::Arc};

use axum::{
    Json, Router,
    extract::{Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post, put},
};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::warn;

use crate::persistence::{self, PersistenceError, PlannerStore};
use crate::{
    CellEntry, CellKey, Document, EditError, HolidayOverview, HolidayService, ImportMode, IsoWeek,
    LegalHolidayMap, Plan, Planner, Special, Subject, Teacher, WeekView,
};

#[derive(Clone)]
pub struct AppState {
    planner: Arc<RwLock<Planner>>,
    holidays: Arc<HolidayService>,
    store: Option<Arc<dyn PlannerStore>>,
}

impl AppState {
    /// In-memory state; nothing is persisted.
    pub fn new(planner: Planner, holidays: HolidayService) -> Self {
        Self {
            planner: Arc::new(RwLock::new(planner)),
            holidays: Arc::new(holidays),
            store: None,
        }
    }

    /// Every mutation is saved to `store` before the response is sent.
    pub fn with_store(mut self, store: Arc<dyn PlannerStore>) -> Self {
        self.store = Some(store);
        self
    }

    pub fn planner(&self) -> Arc<RwLock<Planner>> {
        self.planner.clone()
    }

    fn persist(&self) -> Result<(), ApiError> {
        let Some(store) = &self.store else {
            return Ok(());
        };
        let mut planner = self.planner.write();
        if planner.take_dirty() {
            persistence::save_document(store.as_ref(), planner.document_for_save())?;
        }
        Ok(())
    }

    fn persist_caches(&self) {
        if let Some(store) = &self.store {
            if let Err(err) = persistence::save_holiday_caches(store.as_ref(), &self.holidays) {
                warn!(error = %err, "failed to persist holiday caches");
            }
        }
    }

    /// Public holidays for the years `iso` touches. Never moves the shared view.
    async fn legal_for(&self, iso: IsoWeek) -> LegalHolidayMap {
        let state_code = self.planner.read().view().state;
        let map = self
            .holidays
            .legal_map_for_week(state_code, &iso.dates())
            .await;
        self.persist_caches();
        map
    }

    /// Display `iso` and install its public holidays, unless another request
    /// moved the view in the meantime. Returns the holidays for `iso` either way.
    async fn show_week(&self, iso: IsoWeek) -> LegalHolidayMap {
        let state_code = {
            let mut planner = self.planner.write();
            planner.go_to(iso.year, i64::from(iso.week));
            planner.view().state
        };
        let years = iso.dates().years();
        let map = self.holidays.legal_map(state_code, &years).await;
        self.planner
            .write()
            .apply_legal_map(state_code, &years, map.clone());
        self.persist_caches();
        map
    }
}

#[derive(Debug, Serialize)]
struct ErrorBody<'a> {
    error: &'a str,
    message: String,
}

#[derive(Debug)]
enum ApiError {
    NotFound(String),
    Locked(String),
    Invalid(String),
    Unprocessable(String),
    Internal(String),
}

impl ApiError {
    fn invalid(message: impl Into<String>) -> Self {
        ApiError::Invalid(message.into())
    }
}

impl From<EditError> for ApiError {
    fn from(value: EditError) -> Self {
        match value {
            EditError::DayLocked { .. } => ApiError::Locked(value.to_string()),
            EditError::UnknownReference { .. } => ApiError::Unprocessable(value.to_string()),
            EditError::UnknownPlan(_) | EditError::UnknownEntity { .. } => {
                ApiError::NotFound(value.to_string())
            }
            EditError::InvalidCell { .. }
            | EditError::MissingField(_)
            | EditError::InvalidImport(_) => ApiError::Invalid(value.to_string()),
        }
    }
}

impl From<PersistenceError> for ApiError {
    fn from(value: PersistenceError) -> Self {
        ApiError::Internal(value.to_string())
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, error, message) = match self {
            ApiError::NotFound(message) => (StatusCode::NOT_FOUND, "not_found", message),
            ApiError::Locked(message) => (StatusCode::LOCKED, "day_locked", message),
            ApiError::Invalid(message) => (StatusCode::BAD_REQUEST, "invalid_request", message),
            ApiError::Unprocessable(message) => {
                (StatusCode::UNPROCESSABLE_ENTITY, "unknown_reference", message)
            }
            ApiError::Internal(message) => {
                (StatusCode::INTERNAL_SERVER_ERROR, "internal_error", message)
            }
        };
        (status, Json(ErrorBody { error, message })).into_response()
    }
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/document", get(export_document))
        .route("/import", post(import_document))
        .route("/save", post(save_now))
        .route("/week", get(current_week))
        .route("/weeks/:key", get(get_week).delete(clear_week))
        .route("/weeks/:key/notes", put(update_notes))
        .route("/weeks/:key/holidays", get(week_holidays))
        .route(
            "/weeks/:key/cells/:cell",
            get(get_cell).put(put_cell).delete(delete_cell),
        )
        .route("/plans", get(list_plans).post(create_plan))
        .route("/plans/:id", put(update_plan).delete(delete_plan))
        .route("/teachers", get(list_teachers).post(create_teacher))
        .route("/teachers/:id", put(update_teacher).delete(delete_teacher))
        .route("/subjects", get(list_subjects).post(create_subject))
        .route("/subjects/:id", put(update_subject).delete(delete_subject))
        .route("/specials", get(list_specials).post(create_special))
        .route("/specials/:id", put(update_special).delete(delete_special))
        .with_state(state)
}

pub async fn serve(addr: SocketAddr, state: AppState) -> std::io::Result<()> {
    let app = router(state);
    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await
}

fn parse_week(key: &str) -> Result<IsoWeek, ApiError> {
    key.parse::<IsoWeek>()
        .map_err(|err| ApiError::invalid(err.to_string()))
}

fn parse_cell(cell: &str) -> Result<CellKey, ApiError> {
    cell.parse::<CellKey>()
        .map_err(|_| ApiError::invalid(format!("'{cell}' is not a cell key like 1-0")))
}

async fn health() -> impl IntoResponse {
    Json(json!({ "status": "ok" }))
}

async fn export_document(State(state): State<AppState>) -> Json<Document> {
    let planner = state.planner();
    let doc = planner.read().document().clone();
    Json(doc)
}

#[derive(Debug, Deserialize)]
struct ImportParams {
    mode: Option<String>,
}

async fn import_document(
    State(state): State<AppState>,
    Query(params): Query<ImportParams>,
    body: String,
) -> Result<Json<Document>, ApiError> {
    let mode = match params.mode.as_deref() {
        Some(mode) => mode.parse::<ImportMode>().map_err(ApiError::invalid)?,
        None => return Err(ApiError::invalid("choose ?mode=replace or ?mode=merge")),
    };
    let doc = {
        let planner = state.planner();
        let mut guard = planner.write();
        guard.import_json(&body, mode)?;
        guard.document().clone()
    };
    state.persist()?;
    Ok(Json(doc))
}

async fn save_now(State(state): State<AppState>) -> Result<StatusCode, ApiError> {
    let Some(store) = state.store.clone() else {
        return Err(ApiError::invalid("no storage configured"));
    };
    {
        let planner = state.planner();
        let mut guard = planner.write();
        guard.take_dirty();
        persistence::save_document(store.as_ref(), guard.document_for_save())?;
    }
    Ok(StatusCode::NO_CONTENT)
}

async fn current_week(State(state): State<AppState>) -> Json<WeekView> {
    let iso = state.planner.read().view().iso;
    let legal = state.show_week(iso).await;
    Json(state.planner.read().week_view_at(iso, &legal))
}

async fn get_week(
    State(state): State<AppState>,
    Path(key): Path<String>,
) -> Result<Json<WeekView>, ApiError> {
    let iso = parse_week(&key)?;
    let legal = state.show_week(iso).await;
    Ok(Json(state.planner.read().week_view_at(iso, &legal)))
}

async fn clear_week(
    State(state): State<AppState>,
    Path(key): Path<String>,
) -> Result<StatusCode, ApiError> {
    let iso = parse_week(&key)?;
    let existed = state.planner.write().clear_week_at(iso)?;
    state.persist()?;
    if existed {
        Ok(StatusCode::NO_CONTENT)
    } else {
        Err(ApiError::NotFound(format!("no data stored for {key}")))
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct NotesPayload {
    note: Option<String>,
    class_reps: Option<String>,
    qn_owner: Option<String>,
}

async fn update_notes(
    State(state): State<AppState>,
    Path(key): Path<String>,
    Json(payload): Json<NotesPayload>,
) -> Result<Json<WeekView>, ApiError> {
    let iso = parse_week(&key)?;
    let legal = state.legal_for(iso).await;
    let view = {
        let mut planner = state.planner.write();
        if let Some(note) = payload.note {
            planner.set_note_at(iso, &note)?;
        }
        if let Some(class_reps) = payload.class_reps {
            planner.set_class_reps_at(iso, &class_reps)?;
        }
        if let Some(qn_owner) = payload.qn_owner {
            planner.set_qn_owner_at(iso, &qn_owner)?;
        }
        planner.week_view_at(iso, &legal)
    };
    state.persist()?;
    Ok(Json(view))
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct HolidaysBody {
    week: String,
    offline: bool,
    school: Option<HolidayOverview>,
    day_locks: Vec<Option<String>>,
}

async fn week_holidays(
    State(state): State<AppState>,
    Path(key): Path<String>,
) -> Result<Json<HolidaysBody>, ApiError> {
    let iso = parse_week(&key)?;
    let legal = state.show_week(iso).await;
    let state_code = state.planner.read().view().state;
    let school = match state.holidays.school_overview(state_code, iso).await {
        Ok(overview) => Some(overview),
        Err(err) => {
            warn!(week = %iso, error = %err, "school holidays offline");
            None
        }
    };
    state.persist_caches();
    let day_locks = legal.day_locks(&iso.dates()).to_vec();
    Ok(Json(HolidaysBody {
        week: iso.key(),
        offline: school.is_none(),
        school,
        day_locks,
    }))
}

async fn get_cell(
    State(state): State<AppState>,
    Path((key, cell)): Path<(String, String)>,
) -> Result<Json<CellEntry>, ApiError> {
    let iso = parse_week(&key)?;
    let cell = parse_cell(&cell)?;
    let planner = state.planner();
    let guard = planner.read();
    let entry = guard
        .store()
        .entry(guard.store().active_plan_id(), iso, cell);
    Ok(Json(entry))
}

async fn put_cell(
    State(state): State<AppState>,
    Path((key, cell)): Path<(String, String)>,
    Json(entry): Json<CellEntry>,
) -> Result<Json<WeekView>, ApiError> {
    let iso = parse_week(&key)?;
    let cell = parse_cell(&cell)?;
    let legal = state.legal_for(iso).await;
    let view = {
        let mut planner = state.planner.write();
        planner.set_entry_at(iso, cell, entry, &legal)?;
        planner.week_view_at(iso, &legal)
    };
    state.persist()?;
    Ok(Json(view))
}

async fn delete_cell(
    State(state): State<AppState>,
    Path((key, cell)): Path<(String, String)>,
) -> Result<StatusCode, ApiError> {
    let iso = parse_week(&key)?;
    let cell = parse_cell(&cell)?;
    let legal = state.legal_for(iso).await;
    state
        .planner
        .write()
        .set_entry_at(iso, cell, CellEntry::Empty, &legal)?;
    state.persist()?;
    Ok(StatusCode::NO_CONTENT)
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct PlanSummary {
    id: String,
    name: String,
    leader_id: String,
    weeks: usize,
    active: bool,
}

fn summarize(plan: &Plan, active_id: &str) -> PlanSummary {
    PlanSummary {
        id: plan.id.clone(),
        name: plan.name.clone(),
        leader_id: plan.leader_id.clone(),
        weeks: plan.weeks.len(),
        active: plan.id == active_id,
    }
}

async fn list_plans(State(state): State<AppState>) -> Json<Vec<PlanSummary>> {
    let planner = state.planner.read();
    let doc = planner.document();
    let active = doc.settings.active_plan_id.as_str();
    Json(doc.plans.values().map(|plan| summarize(plan, active)).collect())
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PlanPayload {
    name: Option<String>,
    leader_id: Option<String>,
    #[serde(default)]
    active: bool,
}

async fn create_plan(
    State(state): State<AppState>,
    Json(payload): Json<PlanPayload>,
) -> Result<(StatusCode, Json<PlanSummary>), ApiError> {
    let summary = {
        let mut planner = state.planner.write();
        let name = payload.name.as_deref().unwrap_or("");
        let leader = payload.leader_id.as_deref().unwrap_or("");
        let id = planner.edit(|store| store.create_plan(name, leader))?;
        let doc = planner.document();
        let plan = doc
            .plans
            .get(&id)
            .ok_or_else(|| ApiError::Internal(format!("plan {id} vanished")))?;
        summarize(plan, &doc.settings.active_plan_id)
    };
    state.persist()?;
    Ok((StatusCode::CREATED, Json(summary)))
}

async fn update_plan(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(payload): Json<PlanPayload>,
) -> Result<Json<PlanSummary>, ApiError> {
    let summary = {
        let mut planner = state.planner.write();
        planner.edit(|store| {
            store.update_plan(
                &id,
                payload.name.as_deref(),
                payload.leader_id.as_deref(),
                payload.active,
            )
        })?;
        let doc = planner.document();
        let plan = doc
            .plans
            .get(&id)
            .ok_or_else(|| ApiError::NotFound(format!("plan {id} not found")))?;
        summarize(plan, &doc.settings.active_plan_id)
    };
    state.persist()?;
    Ok(Json(summary))
}

async fn delete_plan(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<StatusCode, ApiError> {
    state.planner.write().edit(|store| store.delete_plan(&id))?;
    state.persist()?;
    Ok(StatusCode::NO_CONTENT)
}

#[derive(Debug, Deserialize)]
struct TeacherPayload {
    name: String,
    #[serde(default)]
    short: String,
}

async fn list_teachers(State(state): State<AppState>) -> Json<Vec<Teacher>> {
    Json(state.planner.read().document().teachers.clone())
}

async fn create_teacher(
    State(state): State<AppState>,
    Json(payload): Json<TeacherPayload>,
) -> Result<(StatusCode, Json<Teacher>), ApiError> {
    let teacher = {
        let mut planner = state.planner.write();
        let id = planner.edit(|store| store.add_teacher(&payload.name, &payload.short))?;
        planner.document().teacher(&id).cloned()
    };
    state.persist()?;
    let teacher = teacher.ok_or_else(|| ApiError::Internal("teacher vanished".to_string()))?;
    Ok((StatusCode::CREATED, Json(teacher)))
}

async fn update_teacher(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(payload): Json<TeacherPayload>,
) -> Result<Json<Teacher>, ApiError> {
    let teacher = {
        let mut planner = state.planner.write();
        planner.edit(|store| store.update_teacher(&id, &payload.name, &payload.short))?;
        planner.document().teacher(&id).cloned()
    };
    state.persist()?;
    teacher
        .map(Json)
        .ok_or_else(|| ApiError::NotFound(format!("teacher {id} not found")))
}

async fn delete_teacher(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<StatusCode, ApiError> {
    state.planner.write().edit(|store| store.delete_teacher(&id))?;
    state.persist()?;
    Ok(StatusCode::NO_CONTENT)
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SubjectPayload {
    name: String,
    #[serde(default)]
    color: String,
    #[serde(default)]
    default_teacher_id: String,
}

async fn list_subjects(State(state): State<AppState>) -> Json<Vec<Subject>> {
    Json(state.planner.read().document().subjects.clone())
}

async fn create_subject(
    State(state): State<AppState>,
    Json(payload): Json<SubjectPayload>,
) -> Result<(StatusCode, Json<Subject>), ApiError> {
    let subject = {
        let mut planner = state.planner.write();
        let id = planner.edit(|store| {
            store.add_subject(&payload.name, &payload.color, &payload.default_teacher_id)
        })?;
        planner.document().subject(&id).cloned()
    };
    state.persist()?;
    let subject = subject.ok_or_else(|| ApiError::Internal("subject vanished".to_string()))?;
    Ok((StatusCode::CREATED, Json(subject)))
}

async fn update_subject(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(payload): Json<SubjectPayload>,
) -> Result<Json<Subject>, ApiError> {
    let subject = {
        let mut planner = state.planner.write();
        planner.edit(|store| {
            store.update_subject(
                &id,
                &payload.name,
                &payload.color,
                &payload.default_teacher_id,
            )
        })?;
        planner.document().subject(&id).cloned()
    };
    state.persist()?;
    subject
        .map(Json)
        .ok_or_else(|| ApiError::NotFound(format!("subject {id} not found")))
}

async fn delete_subject(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<StatusCode, ApiError> {
    state.planner.write().edit(|store| store.delete_subject(&id))?;
    state.persist()?;
    Ok(StatusCode::NO_CONTENT)
}

#[derive(Debug, Deserialize)]
struct SpecialPayload {
    title: String,
    #[serde(default)]
    color: String,
}

async fn list_specials(State(state): State<AppState>) -> Json<Vec<Special>> {
    Json(state.planner.read().document().specials.clone())
}

async fn create_special(
    State(state): State<AppState>,
    Json(payload): Json<SpecialPayload>,
) -> Result<(StatusCode, Json<Special>), ApiError> {
    let special = {
        let mut planner = state.planner.write();
        let id = planner.edit(|store| store.add_special(&payload.title, &payload.color))?;
        planner.document().special(&id).cloned()
    };
    state.persist()?;
    let special = special.ok_or_else(|| ApiError::Internal("special vanished".to_string()))?;
    Ok((StatusCode::CREATED, Json(special)))
}

async fn update_special(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(payload): Json<SpecialPayload>,
) -> Result<Json<Special>, ApiError> {
    let special = {
        let mut planner = state.planner.write();
        planner.edit(|store| store.update_special(&id, &payload.title, &payload.color))?;
        planner.document().special(&id).cloned()
    };
    state.persist()?;
    special
        .map(Json)
        .ok_or_else(|| ApiError::NotFound(format!("special {id} not found")))
}

async fn delete_special(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<StatusCode, ApiError> {
    state.planner.write().edit(|store| store.delete_special(&id))?;
    state.persist()?;
    Ok(StatusCode::NO_CONTENT)
}
