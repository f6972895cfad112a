//! Route handlers.

use axum::{
    Form, Json,
    extract::{
        Multipart, Path, Query, State,
        rejection::{FormRejection, JsonRejection},
    },
    http::StatusCode,
    response::{IntoResponse, Response},
};
use bytes::Bytes;
use design_bridge_core::{InvocationResult, ToolArgs};
use design_bridge_llm::{ChatMessage, ContentPart};
use design_bridge_session::SessionError;
use serde_json::Value;
use tracing::{error, info, instrument, warn};

use crate::{
    AppState,
    error::ApiError,
    params::{coerce_for, merge_params},
    protocol::{
        ChatRequest, ChatResponse, HealthResponse, ToolInfo, ToolsResponse, image_data_url,
    },
};

/// Instruction leading every image chat turn.
pub const DESIGNER_INSTRUCTION: &str = "You are a helpful assistant skilled at designing UI/UX.";

/// Tool used by the root-frame text endpoint.
pub const CREATE_TEXT_TOOL: &str = "create_text";

const DEFAULT_IMAGE_MIME: &str = "image/png";

async fn run_turn(state: &AppState, conversation: Vec<ChatMessage>) -> Result<String, String> {
    let live = state.session.live().await.map_err(|e| e.to_string())?;
    let reply = live
        .agent()
        .run(conversation)
        .await
        .map_err(|e| e.to_string())?;
    Ok(reply.text)
}

/// `POST /chat`. Always 200; failures, including an unreadable body, are
/// reported in the response text.
#[instrument(skip_all)]
pub async fn chat(
    State(state): State<AppState>,
    request: Result<Json<ChatRequest>, JsonRejection>,
) -> Json<ChatResponse> {
    let outcome = match request {
        Ok(Json(request)) => run_turn(&state, request.into_messages()).await,
        Err(rejection) => Err(rejection.body_text()),
    };
    let response = match outcome {
        Ok(text) => text,
        Err(e) => {
            warn!(error = %e, "Chat turn failed");
            format!("Error: {e}")
        }
    };
    Json(ChatResponse { response })
}

/// `POST /chat-img`. Multipart with a required `message` field and an
/// optional `image` file.
#[instrument(skip_all)]
pub async fn chat_img(
    State(state): State<AppState>,
    mut multipart: Multipart,
) -> Result<Json<ChatResponse>, ApiError> {
    let mut message = None;
    let mut image: Option<(String, Bytes)> = None;

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| ApiError::new(e.status(), e.body_text()))?
    {
        let name = field.name().map(str::to_owned);
        match name.as_deref() {
            Some("message") => {
                message = Some(
                    field
                        .text()
                        .await
                        .map_err(|e| ApiError::new(e.status(), e.body_text()))?,
                );
            }
            Some("image") => {
                let mime = field
                    .content_type()
                    .unwrap_or(DEFAULT_IMAGE_MIME)
                    .to_string();
                let data = field
                    .bytes()
                    .await
                    .map_err(|e| ApiError::new(e.status(), e.body_text()))?;
                if !data.is_empty() {
                    image = Some((mime, data));
                }
            }
            _ => {}
        }
    }

    let message = message.ok_or_else(|| ApiError::unprocessable("Missing required field: message"))?;

    let mut parts = vec![ContentPart::text(message)];
    if let Some((mime, data)) = &image {
        info!(mime = %mime, size = data.len(), "Received image");
        parts.push(ContentPart::image_url(image_data_url(mime, data)));
    }
    // Deliberately a system message rather than a leading assistant turn.
    let conversation = vec![
        ChatMessage::system(DESIGNER_INSTRUCTION),
        ChatMessage::user_parts(parts),
    ];

    match run_turn(&state, conversation).await {
        Ok(response) => Ok(Json(ChatResponse { response })),
        Err(e) => {
            error!(error = %e, "Image chat turn failed");
            Err(ApiError::internal(e))
        }
    }
}

fn not_running(e: &SessionError) -> Response {
    (
        StatusCode::SERVICE_UNAVAILABLE,
        Json(InvocationResult::error(e.to_string())),
    )
        .into_response()
}

/// Form pairs, treating a request without a form body as empty.
fn form_pairs(
    form: Result<Form<Vec<(String, String)>>, FormRejection>,
) -> Result<Vec<(String, String)>, Response> {
    match form {
        Ok(Form(pairs)) => Ok(pairs),
        Err(FormRejection::InvalidFormContentType(_)) => Ok(Vec::new()),
        Err(rejection) => Err((
            rejection.status(),
            Json(InvocationResult::error(rejection.body_text())),
        )
            .into_response()),
    }
}

/// `POST /tool/{tool_name}`. Query and form parameters become arguments,
/// typed by the tool's input schema.
#[instrument(skip_all, fields(tool = %tool_name))]
pub async fn invoke_tool(
    State(state): State<AppState>,
    Path(tool_name): Path<String>,
    Query(query): Query<Vec<(String, String)>>,
    form: Result<Form<Vec<(String, String)>>, FormRejection>,
) -> Response {
    let form = match form_pairs(form) {
        Ok(pairs) => pairs,
        Err(response) => return response,
    };
    let live = match state.session.live().await {
        Ok(live) => live,
        Err(e) => return not_running(&e),
    };
    let schema = live
        .registry()
        .lookup(&tool_name)
        .ok()
        .map(|d| &d.spec().input_schema);
    let args = merge_params(query.into_iter().chain(form), schema);
    Json(live.invoker().invoke(&tool_name, args).await).into_response()
}

/// Optional form fields of the root-frame text endpoint and the tool
/// arguments they map to. `text` is passed through as a string.
const ROOT_TEXT_FIELDS: [(&str, &str); 5] = [
    ("x", "x"),
    ("y", "y"),
    ("font_size", "fontSize"),
    ("font_weight", "fontWeight"),
    ("name", "name"),
];

/// `POST /tool/create_text_in_root_frame`. Creates a text node inside the
/// session's root frame.
#[instrument(skip_all)]
pub async fn create_text_in_root_frame(
    State(state): State<AppState>,
    form: Result<Form<Vec<(String, String)>>, FormRejection>,
) -> Response {
    let form = match form_pairs(form) {
        Ok(pairs) => pairs,
        Err(response) => return response,
    };

    let live = match state.session.live().await {
        Ok(live) => live,
        Err(e) => return not_running(&e),
    };
    let Some(root_frame_id) = live.state().get_root_id() else {
        return Json(InvocationResult::error("No root frame has been created yet")).into_response();
    };

    let schema = live
        .registry()
        .lookup(CREATE_TEXT_TOOL)
        .ok()
        .map(|d| &d.spec().input_schema);
    let mut args = ToolArgs::new();
    args.insert("x".into(), Value::from(0));
    args.insert("y".into(), Value::from(0));
    for (field, value) in form {
        if field == "text" {
            args.insert("text".into(), Value::String(value));
        } else if let Some((_, arg)) = ROOT_TEXT_FIELDS.iter().find(|(f, _)| *f == field) {
            args.insert((*arg).to_string(), coerce_for(schema, arg, &value));
        }
    }
    if !args.contains_key("text") {
        return ApiError::unprocessable("Missing required field: text").into_response();
    }
    args.insert("parentId".into(), Value::String(root_frame_id));

    Json(live.invoker().invoke(CREATE_TEXT_TOOL, args).await).into_response()
}

/// `GET /tools`.
pub async fn list_tools(State(state): State<AppState>) -> Result<Json<ToolsResponse>, ApiError> {
    let live = state
        .session
        .live()
        .await
        .map_err(|e| ApiError::new(StatusCode::SERVICE_UNAVAILABLE, e.to_string()))?;
    let tools = live
        .registry()
        .descriptors()
        .map(|d| ToolInfo {
            name: d.spec().name.clone(),
            description: d.spec().description.clone(),
            input_schema: d.spec().input_schema.clone(),
        })
        .collect();
    Ok(Json(ToolsResponse { tools }))
}

async fn health_body(state: &AppState) -> HealthResponse {
    let live = state.session.live().await.ok();
    HealthResponse {
        phase: state.session.phase(),
        root_frame_id: live.as_ref().and_then(|l| l.state().get_root_id()),
        tool_count: live.as_ref().map_or(0, |l| l.registry().len()),
    }
}

/// `GET /health`.
pub async fn health(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(health_body(&state).await)
}

/// `POST /session/restart`.
#[instrument(skip_all)]
pub async fn restart_session(State(state): State<AppState>) -> Result<Json<HealthResponse>, ApiError> {
    state
        .session
        .restart()
        .await
        .map_err(|e| ApiError::internal(e.to_string()))?;
    Ok(Json(health_body(&state).await))
}
