//! REST surface mirroring the tool catalog.

use std::sync::Arc;

use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, patch, post, put};
use axum::{Json, Router};
use serde::Deserialize;
use serde_json::{json, Value};

use engram_core::dispatch::Dispatcher;
use engram_core::error::{EngramError, ErrorKind};
use engram_core::model::{
    Category, MemoryPatch, MemoryStatus, Priority, TaskDraft, TaskLevel, TaskPatch, TaskPriority,
    TaskStatus,
};
use engram_core::store::TaskFilter;
use engram_core::Engine;

#[derive(Clone)]
pub struct AppState {
    pub engine: Arc<Engine>,
    pub dispatcher: Arc<Dispatcher>,
    pub port: u16,
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/api/status", get(status))
        .route("/api/memories", get(list_memories).post(create_memory))
        .route(
            "/api/memories/{id}",
            put(update_memory).delete(delete_memory),
        )
        .route("/api/tasks", get(list_tasks).post(create_task))
        .route("/api/tasks/{id}", patch(update_task).delete(delete_task))
        .route("/api/mcp-tools/{name}", post(call_tool))
        .route("/ws", get(crate::ws::handler))
        .with_state(state)
}

/// `EngramError` → HTTP response with a stable error body.
pub struct ApiError(pub EngramError);

impl From<EngramError> for ApiError {
    fn from(e: EngramError) -> Self {
        ApiError(e)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let kind = self.0.kind();
        let status = match kind {
            ErrorKind::InvalidInput => StatusCode::BAD_REQUEST,
            ErrorKind::NotFound | ErrorKind::ToolNotFound => StatusCode::NOT_FOUND,
            ErrorKind::Conflict => StatusCode::CONFLICT,
            ErrorKind::Timeout => StatusCode::GATEWAY_TIMEOUT,
            ErrorKind::Unauthorized => StatusCode::FORBIDDEN,
            ErrorKind::Io | ErrorKind::Parse | ErrorKind::Internal => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        };
        let body = json!({
            "error": {
                "kind": kind.as_str(),
                "message": self.0.to_string(),
                "field": self.0.field(),
            }
        });
        (status, Json(body)).into_response()
    }
}

async fn status(State(state): State<AppState>) -> Json<Value> {
    Json(json!({
        "server": "Dashboard Bridge",
        "status": "ok",
        "memoryCount": state.engine.memories.count().await,
        "taskCount": state.engine.tasks.count().await,
        "port": state.port,
    }))
}

#[derive(Debug, Deserialize)]
struct MemoryListQuery {
    project: Option<String>,
    limit: Option<usize>,
}

async fn list_memories(
    State(state): State<AppState>,
    Query(query): Query<MemoryListQuery>,
) -> Result<Json<Value>, ApiError> {
    let memories = state
        .engine
        .memories
        .list(query.project.as_deref(), query.limit)
        .await?;
    Ok(Json(json!({ "memories": memories, "count": memories.len() })))
}

#[derive(Debug, Deserialize)]
struct CreateMemoryBody {
    content: String,
    project: Option<String>,
    category: Option<Category>,
    #[serde(default)]
    tags: Vec<String>,
    priority: Option<Priority>,
    status: Option<MemoryStatus>,
}

async fn create_memory(
    State(state): State<AppState>,
    Json(body): Json<CreateMemoryBody>,
) -> Result<(StatusCode, Json<Value>), ApiError> {
    let memory = state
        .engine
        .memories
        .add(
            body.content,
            body.project,
            body.category,
            body.tags,
            body.priority,
            body.status,
        )
        .await?;
    Ok((StatusCode::CREATED, Json(json!({ "memory": memory }))))
}

async fn update_memory(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(patch): Json<MemoryPatch>,
) -> Result<Json<Value>, ApiError> {
    let memory = state.engine.memories.update(&id, patch).await?;
    Ok(Json(json!({ "memory": memory })))
}

async fn delete_memory(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<StatusCode, ApiError> {
    state.engine.memories.delete(&id).await?;
    Ok(StatusCode::NO_CONTENT)
}

#[derive(Debug, Deserialize)]
struct TaskListQuery {
    project: Option<String>,
    status: Option<TaskStatus>,
    category: Option<Category>,
    parent_id: Option<String>,
    limit: Option<usize>,
}

async fn list_tasks(
    State(state): State<AppState>,
    Query(query): Query<TaskListQuery>,
) -> Result<Json<Value>, ApiError> {
    let tasks = state
        .engine
        .tasks
        .list(&TaskFilter {
            project: query.project,
            status: query.status,
            category: query.category,
            parent_id: query.parent_id,
            limit: query.limit,
        })
        .await?;
    Ok(Json(json!({ "tasks": tasks, "count": tasks.len() })))
}

#[derive(Debug, Deserialize)]
struct CreateTaskBody {
    title: String,
    #[serde(default)]
    description: String,
    project: String,
    category: Option<Category>,
    #[serde(default)]
    tags: Vec<String>,
    priority: Option<TaskPriority>,
    parent_id: Option<String>,
    level: Option<TaskLevel>,
}

async fn create_task(
    State(state): State<AppState>,
    Json(body): Json<CreateTaskBody>,
) -> Result<(StatusCode, Json<Value>), ApiError> {
    let task = state
        .engine
        .tasks
        .create(TaskDraft {
            title: body.title,
            description: body.description,
            project: body.project,
            category: body.category,
            tags: body.tags,
            priority: body.priority.unwrap_or_default(),
            parent_id: body.parent_id,
            level: body.level,
            memory_connections: Vec::new(),
        })
        .await?;
    Ok((StatusCode::CREATED, Json(json!({ "task": task }))))
}

async fn update_task(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(patch): Json<TaskPatch>,
) -> Result<Json<Value>, ApiError> {
    let task = state.engine.tasks.update(&id, patch).await?;
    Ok(Json(json!({ "task": task })))
}

#[derive(Debug, Deserialize)]
struct DeleteTaskQuery {
    cascade: Option<bool>,
}

async fn delete_task(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Query(query): Query<DeleteTaskQuery>,
) -> Result<StatusCode, ApiError> {
    state
        .engine
        .tasks
        .delete(&id, query.cascade.unwrap_or(false))
        .await?;
    Ok(StatusCode::NO_CONTENT)
}

/// Generic passthrough: POST a tool's arguments to run it by name, exactly
/// as the stdio client would.
async fn call_tool(
    State(state): State<AppState>,
    Path(name): Path<String>,
    Json(arguments): Json<Value>,
) -> Result<Json<Value>, ApiError> {
    let output = state.dispatcher.dispatch(&name, arguments).await?;
    Ok(Json(json!({ "text": output.text, "data": output.data })))
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::Request;
    use tempfile::TempDir;
    use tower::util::ServiceExt;

    async fn app(dir: &TempDir) -> Router {
        let engine = Arc::new(
            Engine::init_with(dir.path().to_path_buf(), false, false)
                .await
                .unwrap(),
        );
        let dispatcher = Arc::new(Dispatcher::new(engine.clone()));
        router(AppState {
            engine,
            dispatcher,
            port: 3001,
        })
    }

    async fn body_json(response: Response) -> Value {
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    fn json_request(method: &str, uri: &str, body: Value) -> Request<Body> {
        Request::builder()
            .method(method)
            .uri(uri)
            .header("content-type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    #[tokio::test]
    async fn status_reports_counts_and_port() {
        let dir = TempDir::new().unwrap();
        let app = app(&dir).await;
        let response = app
            .oneshot(Request::get("/api/status").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let body = body_json(response).await;
        assert_eq!(body["server"], "Dashboard Bridge");
        assert_eq!(body["status"], "ok");
        assert_eq!(body["memoryCount"], 0);
        assert_eq!(body["port"], 3001);
    }

    #[tokio::test]
    async fn memory_crud_over_http() {
        let dir = TempDir::new().unwrap();
        let app = app(&dir).await;

        let response = app
            .clone()
            .oneshot(json_request(
                "POST",
                "/api/memories",
                json!({ "content": "over http", "project": "web" }),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::CREATED);
        let id = body_json(response).await["memory"]["id"]
            .as_str()
            .unwrap()
            .to_string();

        let response = app
            .clone()
            .oneshot(
                Request::get("/api/memories?project=web")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        let body = body_json(response).await;
        assert_eq!(body["count"], 1);

        let response = app
            .clone()
            .oneshot(json_request(
                "PUT",
                &format!("/api/memories/{id}"),
                json!({ "priority": "high" }),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(body_json(response).await["memory"]["priority"], "high");

        let response = app
            .clone()
            .oneshot(
                Request::delete(&format!("/api/memories/{id}"))
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NO_CONTENT);

        let response = app
            .oneshot(
                Request::delete(&format!("/api/memories/{id}"))
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn task_conflicts_map_to_409() {
        let dir = TempDir::new().unwrap();
        let app = app(&dir).await;

        let response = app
            .clone()
            .oneshot(json_request(
                "POST",
                "/api/tasks",
                json!({ "title": "epic", "project": "p", "level": "epic",
                        "parent_id": "does-not-exist" }),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::CONFLICT);
        let body = body_json(response).await;
        assert_eq!(body["error"]["kind"], "conflict");
        assert_eq!(body["error"]["field"], "parent_id");
    }

    #[tokio::test]
    async fn tool_passthrough_runs_the_dispatcher() {
        let dir = TempDir::new().unwrap();
        let app = app(&dir).await;

        let response = app
            .clone()
            .oneshot(json_request(
                "POST",
                "/api/mcp-tools/add_memory",
                json!({ "content": "via passthrough" }),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let body = body_json(response).await;
        assert!(body["text"].as_str().unwrap().contains("✅"));

        let response = app
            .oneshot(json_request("POST", "/api/mcp-tools/no_such_tool", json!({})))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn invalid_body_is_bad_request() {
        let dir = TempDir::new().unwrap();
        let app = app(&dir).await;
        let response = app
            .oneshot(json_request("POST", "/api/memories", json!({ "content": "" })))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }
}
