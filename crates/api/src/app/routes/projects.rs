//! Project, expense and task writes. Derived project fields are filled in
//! by the consistency triggers before each write returns.

use std::sync::Arc;

use axum::{
    extract::{Extension, Path},
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post, put},
    Json, Router,
};

use ripple_core::{ExpenseId, ProjectId, TaskId};
use ripple_infra::{Expense, ServiceError};

use crate::app::dto::{
    CreateExpenseRequest, CreateProjectRequest, CreateTaskRequest, ProjectView, SetBudgetRequest,
    SetCompletedRequest, UpdateExpenseRequest,
};
use crate::app::routes::blocking;
use crate::app::{errors, services::AppServices};

pub fn router() -> Router {
    Router::new()
        .route("/projects", post(create_project))
        .route("/projects/:id", get(get_project))
        .route("/projects/:id/budget", put(set_budget))
        .route("/expenses", post(create_expense))
        .route("/expenses/:id", put(update_expense).delete(delete_expense))
        .route("/tasks", post(create_task))
        .route("/tasks/:id", axum::routing::delete(delete_task))
        .route("/tasks/:id/completed", put(set_completed))
}

fn project_response(services: &AppServices, id: ProjectId, status: StatusCode) -> axum::response::Response {
    match services.store.project(id) {
        Some(stored) => (status, Json(ProjectView::from(&stored))).into_response(),
        None => errors::json_error(StatusCode::NOT_FOUND, "not_found", format!("projects/{id} not found")),
    }
}

fn finish<T>(result: Result<Result<T, ServiceError>, axum::response::Response>) -> Result<T, axum::response::Response> {
    match result {
        Ok(Ok(value)) => Ok(value),
        Ok(Err(e)) => Err(errors::service_error_to_response(e)),
        Err(resp) => Err(resp),
    }
}

/// POST /projects
pub async fn create_project(
    Extension(services): Extension<Arc<AppServices>>,
    Json(body): Json<CreateProjectRequest>,
) -> axum::response::Response {
    let svc = services.clone();
    match finish(blocking(move || svc.projects.create_project(body.name, body.budget)).await) {
        Ok(project) => project_response(&services, project.id, StatusCode::CREATED),
        Err(resp) => resp,
    }
}

/// GET /projects/:id
pub async fn get_project(
    Extension(services): Extension<Arc<AppServices>>,
    Path(id): Path<String>,
) -> axum::response::Response {
    match errors::parse_id::<ProjectId>(&id) {
        Ok(id) => project_response(&services, id, StatusCode::OK),
        Err(resp) => resp,
    }
}

/// PUT /projects/:id/budget
pub async fn set_budget(
    Extension(services): Extension<Arc<AppServices>>,
    Path(id): Path<String>,
    Json(body): Json<SetBudgetRequest>,
) -> axum::response::Response {
    let id: ProjectId = match errors::parse_id(&id) {
        Ok(id) => id,
        Err(resp) => return resp,
    };
    let svc = services.clone();
    match finish(blocking(move || svc.projects.set_project_budget(id, body.budget)).await) {
        Ok(()) => project_response(&services, id, StatusCode::OK),
        Err(resp) => resp,
    }
}

/// POST /expenses
pub async fn create_expense(
    Extension(services): Extension<Arc<AppServices>>,
    Json(body): Json<CreateExpenseRequest>,
) -> axum::response::Response {
    match finish(blocking(move || services.projects.create_expense(body.project_id, body.amount)).await) {
        Ok(expense) => (StatusCode::CREATED, Json(expense)).into_response(),
        Err(resp) => resp,
    }
}

/// PUT /expenses/:id
pub async fn update_expense(
    Extension(services): Extension<Arc<AppServices>>,
    Path(id): Path<String>,
    Json(body): Json<UpdateExpenseRequest>,
) -> axum::response::Response {
    let id: ExpenseId = match errors::parse_id(&id) {
        Ok(id) => id,
        Err(resp) => return resp,
    };
    let expense = Expense {
        id,
        project_id: body.project_id,
        amount: body.amount,
    };
    let stored = expense.clone();
    match finish(blocking(move || services.projects.update_expense(expense)).await) {
        Ok(()) => (StatusCode::OK, Json(stored)).into_response(),
        Err(resp) => resp,
    }
}

/// DELETE /expenses/:id
pub async fn delete_expense(
    Extension(services): Extension<Arc<AppServices>>,
    Path(id): Path<String>,
) -> axum::response::Response {
    let id: ExpenseId = match errors::parse_id(&id) {
        Ok(id) => id,
        Err(resp) => return resp,
    };
    match finish(blocking(move || services.projects.delete_expense(id)).await) {
        Ok(_) => StatusCode::NO_CONTENT.into_response(),
        Err(resp) => resp,
    }
}

/// POST /tasks
pub async fn create_task(
    Extension(services): Extension<Arc<AppServices>>,
    Json(body): Json<CreateTaskRequest>,
) -> axum::response::Response {
    match finish(blocking(move || services.projects.create_task(body.project_id, body.completed)).await) {
        Ok(task) => (StatusCode::CREATED, Json(task)).into_response(),
        Err(resp) => resp,
    }
}

/// PUT /tasks/:id/completed
pub async fn set_completed(
    Extension(services): Extension<Arc<AppServices>>,
    Path(id): Path<String>,
    Json(body): Json<SetCompletedRequest>,
) -> axum::response::Response {
    let id: TaskId = match errors::parse_id(&id) {
        Ok(id) => id,
        Err(resp) => return resp,
    };
    match finish(blocking(move || services.projects.set_task_completed(id, body.completed)).await) {
        Ok(()) => StatusCode::NO_CONTENT.into_response(),
        Err(resp) => resp,
    }
}

/// DELETE /tasks/:id
pub async fn delete_task(
    Extension(services): Extension<Arc<AppServices>>,
    Path(id): Path<String>,
) -> axum::response::Response {
    let id: TaskId = match errors::parse_id(&id) {
        Ok(id) => id,
        Err(resp) => return resp,
    };
    match finish(blocking(move || services.projects.delete_task(id)).await) {
        Ok(_) => StatusCode::NO_CONTENT.into_response(),
        Err(resp) => resp,
    }
}
