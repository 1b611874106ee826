// Item HTTP routes
//
// All routes live behind the session middleware. Creation drives the file
// intake pipeline before the item record is persisted; the stored file is
// removed again if persistence fails.

use std::sync::Arc;

use axum::extract::{DefaultBodyLimit, Multipart, Path, State};
use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::{Extension, Json, Router};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;

use curio_storage::{CreateItem, ItemRow, ItemStore, UpdateItem};

use crate::auth::{require_session, AuthState, CurrentUser};
use crate::common::{ListResponse, MessageResponse};
use crate::error::{ApiError, ApiResult};
use crate::uploads::{FileIntake, StoredFile};

/// Public item shape. `file_path` is the bare generated filename; fetch
/// the bytes through the images endpoint.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct Item {
    pub id: Uuid,
    pub user_id: Uuid,
    pub title: String,
    pub description: String,
    pub file_path: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<ItemRow> for Item {
    fn from(row: ItemRow) -> Self {
        Self {
            id: row.id,
            user_id: row.user_id,
            title: row.title,
            description: row.description,
            file_path: row.file_path,
            created_at: row.created_at,
            updated_at: row.updated_at,
        }
    }
}

#[derive(Debug, Clone, Deserialize, ToSchema)]
pub struct UpdateItemRequest {
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
}

impl UpdateItemRequest {
    fn validate(&self) -> ApiResult<()> {
        if let Some(title) = &self.title {
            if title.trim().is_empty() {
                return Err(ApiError::validation("title cannot be empty"));
            }
        }
        Ok(())
    }
}

#[derive(Clone)]
pub struct AppState {
    pub items: Arc<dyn ItemStore>,
    pub intake: Arc<FileIntake>,
}

pub fn routes(state: AppState, mw_state: AuthState) -> Router {
    let body_limit = state.intake.max_body_bytes();
    Router::new()
        .route("/v1/items", get(list_items).post(create_item))
        .route(
            "/v1/items/:id",
            get(get_item).put(update_item).delete(delete_item),
        )
        .route("/v1/images/:filename", get(view_image))
        .layer(axum::middleware::from_fn_with_state(
            mw_state,
            require_session,
        ))
        .layer(DefaultBodyLimit::max(body_limit))
        .with_state(state)
}

/// Everything collected from the upload form.
struct UploadForm {
    file: StoredFile,
    title: String,
    description: String,
}

/// Walk the multipart fields, storing the file through the intake
/// pipeline and collecting the text fields. If anything fails after the
/// file was stored, the file is discarded before the error propagates.
async fn read_upload_form(intake: &FileIntake, mut multipart: Multipart) -> ApiResult<UploadForm> {
    let mut file: Option<StoredFile> = None;
    let mut title = String::new();
    let mut description = String::new();

    let collected: ApiResult<()> = async {
        while let Some(field) = multipart
            .next_field()
            .await
            .map_err(|e| ApiError::validation(format!("malformed multipart body: {e}")))?
        {
            match field.name() {
                Some("file") => {
                    if file.is_some() {
                        return Err(ApiError::validation("exactly one file field is allowed"));
                    }
                    file = Some(intake.store_field(field).await?);
                }
                Some("title") => {
                    title = field
                        .text()
                        .await
                        .map_err(|e| ApiError::validation(format!("invalid title field: {e}")))?;
                }
                Some("description") => {
                    description = field.text().await.map_err(|e| {
                        ApiError::validation(format!("invalid description field: {e}"))
                    })?;
                }
                _ => {}
            }
        }

        if title.trim().is_empty() {
            return Err(ApiError::validation("title is required"));
        }
        Ok(())
    }
    .await;

    match (collected, file) {
        (Ok(()), Some(file)) => Ok(UploadForm {
            file,
            title,
            description,
        }),
        (Ok(()), None) => Err(ApiError::validation("file is required")),
        (Err(e), stored) => {
            if let Some(stored) = stored {
                intake.discard(&stored.filename).await;
            }
            Err(e)
        }
    }
}

/// POST /v1/items - Upload an image and create an item
#[utoipa::path(
    post,
    path = "/v1/items",
    request_body(content = Vec<u8>, content_type = "multipart/form-data"),
    responses(
        (status = 201, description = "Item created", body = Item),
        (status = 400, description = "Missing file, oversized payload, or malformed form", body = crate::error::ErrorBody),
        (status = 401, description = "Not authenticated", body = crate::error::ErrorBody),
        (status = 403, description = "Disallowed extension or file content", body = crate::error::ErrorBody),
        (status = 500, description = "Storage failure", body = crate::error::ErrorBody)
    ),
    tag = "items"
)]
pub async fn create_item(
    State(state): State<AppState>,
    Extension(user): Extension<CurrentUser>,
    multipart: Multipart,
) -> ApiResult<(StatusCode, Json<Item>)> {
    let form = read_upload_form(&state.intake, multipart).await?;

    let created = state
        .items
        .create_item(CreateItem {
            user_id: user.id,
            title: form.title,
            description: form.description,
            file_path: form.file.filename.clone(),
        })
        .await;

    match created {
        Ok(row) => Ok((StatusCode::CREATED, Json(row.into()))),
        Err(e) => {
            // the record never existed; do not leave the file orphaned
            state.intake.discard(&form.file.filename).await;
            Err(e.into())
        }
    }
}

/// GET /v1/items - List items
#[utoipa::path(
    get,
    path = "/v1/items",
    responses(
        (status = 200, description = "List of items", body = ListResponse<Item>),
        (status = 401, description = "Not authenticated", body = crate::error::ErrorBody)
    ),
    tag = "items"
)]
pub async fn list_items(State(state): State<AppState>) -> ApiResult<Json<ListResponse<Item>>> {
    let items = state.items.list_items().await?;
    Ok(Json(ListResponse::new(
        items.into_iter().map(Item::from).collect(),
    )))
}

/// GET /v1/items/{id} - Get a single item
#[utoipa::path(
    get,
    path = "/v1/items/{id}",
    params(("id" = Uuid, Path, description = "Item ID")),
    responses(
        (status = 200, description = "The item", body = Item),
        (status = 404, description = "Unknown item", body = crate::error::ErrorBody)
    ),
    tag = "items"
)]
pub async fn get_item(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> ApiResult<Json<Item>> {
    let item = state
        .items
        .get_item(id)
        .await?
        .ok_or_else(|| ApiError::not_found("item not found"))?;
    Ok(Json(item.into()))
}

/// PUT /v1/items/{id} - Update item metadata (owner only)
#[utoipa::path(
    put,
    path = "/v1/items/{id}",
    params(("id" = Uuid, Path, description = "Item ID")),
    request_body = UpdateItemRequest,
    responses(
        (status = 200, description = "Updated item", body = Item),
        (status = 404, description = "Unknown item or not the owner", body = crate::error::ErrorBody)
    ),
    tag = "items"
)]
pub async fn update_item(
    State(state): State<AppState>,
    Extension(user): Extension<CurrentUser>,
    Path(id): Path<Uuid>,
    Json(req): Json<UpdateItemRequest>,
) -> ApiResult<Json<Item>> {
    req.validate()?;
    let updated = state
        .items
        .update_item(
            id,
            user.id,
            UpdateItem {
                title: req.title,
                description: req.description,
            },
        )
        .await?
        .ok_or_else(|| ApiError::not_found("item not found"))?;
    Ok(Json(updated.into()))
}

/// DELETE /v1/items/{id} - Delete an item (owner only)
///
/// The database record is the authoritative delete; removal of the
/// backing file is best-effort cleanup.
#[utoipa::path(
    delete,
    path = "/v1/items/{id}",
    params(("id" = Uuid, Path, description = "Item ID")),
    responses(
        (status = 200, description = "Item deleted", body = MessageResponse),
        (status = 404, description = "Unknown item or not the owner", body = crate::error::ErrorBody)
    ),
    tag = "items"
)]
pub async fn delete_item(
    State(state): State<AppState>,
    Extension(user): Extension<CurrentUser>,
    Path(id): Path<Uuid>,
) -> ApiResult<Json<MessageResponse>> {
    let item = state
        .items
        .get_item(id)
        .await?
        .ok_or_else(|| ApiError::not_found("item not found"))?;

    let deleted = state.items.delete_item(id, user.id).await?;
    if !deleted {
        return Err(ApiError::not_found("item not found"));
    }

    state.intake.discard(&item.file_path).await;
    Ok(Json(MessageResponse::new("item deleted")))
}

/// GET /v1/images/{filename} - Serve a stored image
#[utoipa::path(
    get,
    path = "/v1/images/{filename}",
    params(("filename" = String, Path, description = "Stored filename")),
    responses(
        (status = 200, description = "Image bytes", body = Vec<u8>, content_type = "image/png"),
        (status = 400, description = "Traversal sequence in filename", body = crate::error::ErrorBody),
        (status = 403, description = "Stored content is not an allowed image", body = crate::error::ErrorBody),
        (status = 404, description = "Unknown image", body = crate::error::ErrorBody)
    ),
    tag = "items"
)]
pub async fn view_image(
    State(state): State<AppState>,
    Path(filename): Path<String>,
) -> ApiResult<Response> {
    let served = state.intake.open(&filename).await?;
    Ok((
        [(header::CONTENT_TYPE, served.content_type)],
        served.bytes,
    )
        .into_response())
}
