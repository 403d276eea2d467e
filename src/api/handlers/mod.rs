use axum::{
    extract::{FromRequestParts, Path, Query, State},
    http::{request::Parts, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use crate::error::{ConflictError, Error};
use crate::models::*;
use crate::scheduling::Scheduler;

pub const USER_ID_HEADER: &str = "x-user-id";
pub const USER_ROLE_HEADER: &str = "x-user-role";

// ============================================================
// Error Handling
// ============================================================

/// JSON error body: `{ "error": ..., "kind": ..., "details": ... }`.
#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorBody {
    pub error: String,
    pub kind: String,
    #[serde(default, skip_serializing_if = "Value::is_null")]
    pub details: Value,
}

#[derive(Debug)]
pub enum ApiError {
    Domain(Error),
    MissingIdentity(String),
}

impl From<Error> for ApiError {
    fn from(e: Error) -> Self {
        Self::Domain(e)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, body) = match self {
            Self::MissingIdentity(message) => (
                StatusCode::UNAUTHORIZED,
                ErrorBody {
                    error: message,
                    kind: "missing_identity".to_string(),
                    details: Value::Null,
                },
            ),
            Self::Domain(e) => {
                let status = status_of(&e);
                let error = if status.is_server_error() {
                    // Integrity and storage faults are logged in full but not exposed.
                    tracing::error!("Internal error: {:#}", e);
                    "Internal server error".to_string()
                } else {
                    tracing::warn!("Request rejected ({}): {}", e.kind(), e);
                    e.to_string()
                };
                (
                    status,
                    ErrorBody {
                        error,
                        kind: e.kind().to_string(),
                        details: details_of(&e),
                    },
                )
            }
        };
        (status, Json(body)).into_response()
    }
}

fn status_of(e: &Error) -> StatusCode {
    match e {
        Error::Validation(_) | Error::InvalidTemplate { .. } => StatusCode::BAD_REQUEST,
        Error::AthleteNotVisible { .. } => StatusCode::FORBIDDEN,
        Error::NotFound { .. } | Error::UnknownSessionInstance(_) => StatusCode::NOT_FOUND,
        Error::Conflict(_) => StatusCode::CONFLICT,
        Error::Integrity(_) | Error::Storage(_) => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

fn details_of(e: &Error) -> Value {
    match e {
        Error::Conflict(ConflictError::Reconciliation { conflicts, .. }) => {
            serde_json::json!({ "conflicts": conflicts })
        }
        Error::Conflict(ConflictError::ConcurrentUpdate {
            stored_updated_at,
            attempted_at,
            ..
        }) => serde_json::json!({
            "stored_updated_at": stored_updated_at,
            "attempted_at": attempted_at,
        }),
        _ => Value::Null,
    }
}

type ApiResult<T> = Result<Json<T>, ApiError>;

// ============================================================
// Identity
// ============================================================

/// The caller, as asserted by the `x-user-id` and `x-user-role` headers.
impl<S: Send + Sync> FromRequestParts<S> for Actor {
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let user_id = header(parts, USER_ID_HEADER)
            .ok_or_else(|| ApiError::MissingIdentity(format!("{} header is required", USER_ID_HEADER)))?;
        let role = header(parts, USER_ROLE_HEADER)
            .ok_or_else(|| ApiError::MissingIdentity(format!("{} header is required", USER_ROLE_HEADER)))?;
        let role = Role::from_str(role)
            .ok_or_else(|| ApiError::MissingIdentity(format!("unknown role '{}'", role)))?;

        Ok(Actor::new(user_id, role))
    }
}

fn header<'a>(parts: &'a Parts, name: &str) -> Option<&'a str> {
    parts
        .headers
        .get(name)
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        .filter(|v| !v.is_empty())
}

// ============================================================
// Health
// ============================================================

pub async fn health() -> impl IntoResponse {
    Json(serde_json::json!({ "status": "ok" }))
}

// ============================================================
// Templates
// ============================================================

pub async fn list_templates(
    State(scheduler): State<Scheduler>,
    Query(query): Query<ListTemplatesQuery>,
) -> ApiResult<Vec<SessionTemplate>> {
    Ok(Json(scheduler.list_templates(query.include_archived)?))
}

pub async fn get_template(
    State(scheduler): State<Scheduler>,
    Path(id): Path<Uuid>,
) -> ApiResult<SessionTemplate> {
    Ok(Json(scheduler.get_template(id)?))
}

pub async fn create_template(
    State(scheduler): State<Scheduler>,
    actor: Actor,
    Json(input): Json<CreateTemplateInput>,
) -> Result<(StatusCode, Json<SessionTemplate>), ApiError> {
    let template = scheduler.create_template(&actor, input)?;
    Ok((StatusCode::CREATED, Json(template)))
}

pub async fn update_template(
    State(scheduler): State<Scheduler>,
    actor: Actor,
    Path(id): Path<Uuid>,
    Json(input): Json<UpdateTemplateInput>,
) -> ApiResult<SessionTemplate> {
    Ok(Json(scheduler.update_template(&actor, id, input)?))
}

pub async fn archive_template(
    State(scheduler): State<Scheduler>,
    _actor: Actor,
    Path(id): Path<Uuid>,
) -> ApiResult<SessionTemplate> {
    Ok(Json(scheduler.archive_template(id)?))
}

// ============================================================
// Schedules
// ============================================================

pub async fn materialize_week(
    State(scheduler): State<Scheduler>,
    actor: Actor,
    Json(input): Json<MaterializeWeekInput>,
) -> ApiResult<SessionSchedule> {
    Ok(Json(scheduler.materialize_week(&actor, input)?))
}

pub async fn list_schedules(
    State(scheduler): State<Scheduler>,
    Query(query): Query<ListSchedulesQuery>,
) -> ApiResult<Vec<SessionSchedule>> {
    Ok(Json(scheduler.list_schedules(query.week_start_date)?))
}

pub async fn get_schedule(
    State(scheduler): State<Scheduler>,
    Path((template_id, week)): Path<(Uuid, NaiveDate)>,
) -> ApiResult<SessionSchedule> {
    Ok(Json(scheduler.get_schedule(template_id, week)?))
}

pub async fn week_overview(
    State(scheduler): State<Scheduler>,
    actor: Actor,
    Path(week): Path<NaiveDate>,
) -> ApiResult<WeekOverview> {
    Ok(Json(scheduler.week_overview(&actor, week)?))
}

#[derive(Debug, Deserialize)]
pub struct WeekStartQuery {
    pub date: NaiveDate,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct WeekStartResponse {
    pub date: NaiveDate,
    pub week_start_date: NaiveDate,
}

pub async fn week_start(
    State(scheduler): State<Scheduler>,
    Query(query): Query<WeekStartQuery>,
) -> ApiResult<WeekStartResponse> {
    Ok(Json(WeekStartResponse {
        date: query.date,
        week_start_date: scheduler.week_start_for(query.date)?,
    }))
}

// ============================================================
// Session Instances
// ============================================================

pub async fn get_instance(
    State(scheduler): State<Scheduler>,
    Path(id): Path<Uuid>,
) -> ApiResult<SessionInstance> {
    Ok(Json(scheduler.get_instance(id)?))
}

pub async fn session_sheet(
    State(scheduler): State<Scheduler>,
    actor: Actor,
    Path(id): Path<Uuid>,
) -> ApiResult<SessionSheet> {
    Ok(Json(scheduler.session_sheet(&actor, id)?))
}

pub async fn get_feedback(
    State(scheduler): State<Scheduler>,
    Path(id): Path<Uuid>,
) -> ApiResult<SessionFeedback> {
    Ok(Json(scheduler.get_feedback(id)?))
}

pub async fn record_feedback(
    State(scheduler): State<Scheduler>,
    actor: Actor,
    Path(id): Path<Uuid>,
    Json(content): Json<FeedbackContent>,
) -> ApiResult<SessionFeedback> {
    Ok(Json(scheduler.record_feedback(&actor, id, content)?))
}

pub async fn apply_feedback_template(
    State(scheduler): State<Scheduler>,
    actor: Actor,
    Path(id): Path<Uuid>,
    Json(input): Json<ApplyFeedbackTemplateInput>,
) -> ApiResult<SessionFeedback> {
    Ok(Json(scheduler.apply_feedback_template(&actor, id, input.template_id)?))
}

// ============================================================
// Feedback Templates
// ============================================================

pub async fn list_feedback_templates(
    State(scheduler): State<Scheduler>,
) -> ApiResult<Vec<FeedbackTemplate>> {
    Ok(Json(scheduler.list_feedback_templates()?))
}

pub async fn create_feedback_template(
    State(scheduler): State<Scheduler>,
    actor: Actor,
    Json(input): Json<CreateFeedbackTemplateInput>,
) -> Result<(StatusCode, Json<FeedbackTemplate>), ApiError> {
    let template = scheduler.create_feedback_template(&actor, input)?;
    Ok((StatusCode::CREATED, Json(template)))
}

pub async fn delete_feedback_template(
    State(scheduler): State<Scheduler>,
    _actor: Actor,
    Path(id): Path<Uuid>,
) -> Result<StatusCode, ApiError> {
    scheduler.delete_feedback_template(id)?;
    Ok(StatusCode::NO_CONTENT)
}

// ============================================================
// Attendance
// ============================================================

pub async fn record_attendance(
    State(scheduler): State<Scheduler>,
    actor: Actor,
    Json(input): Json<RecordAttendanceInput>,
) -> ApiResult<AttendanceRecord> {
    Ok(Json(scheduler.record_attendance(&actor, input)?))
}

pub async fn get_attendance(
    State(scheduler): State<Scheduler>,
    actor: Actor,
    Query(filter): Query<AttendanceFilter>,
) -> ApiResult<Vec<AttendanceRecord>> {
    Ok(Json(scheduler.get_attendance(&actor, &filter)?))
}

// ============================================================
// Athletes
// ============================================================

pub async fn attendance_stats(
    State(scheduler): State<Scheduler>,
    actor: Actor,
    Path(athlete_id): Path<String>,
    Query(query): Query<StatsQuery>,
) -> ApiResult<AttendanceStats> {
    Ok(Json(scheduler.attendance_stats(&actor, &athlete_id, query.as_of)?))
}

pub async fn training_log(
    State(scheduler): State<Scheduler>,
    actor: Actor,
    Path(athlete_id): Path<String>,
) -> ApiResult<Vec<TrainingLogEntry>> {
    Ok(Json(scheduler.training_log(&actor, &athlete_id)?))
}
