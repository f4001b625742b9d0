//! Generic CRUD and search routes for the inventory entities
//!
//! Every resource gets the same surface:
//!
//! - `POST   {base}` create (201)
//! - `GET    {base}?page&size` list, with `X-Total-Count`
//! - `GET    {base}/:id`, `PUT`, `PATCH`, `DELETE` (204)
//! - `GET    {base}/_search`, `/_search/prefix`, `/_search/fuzzy`,
//!   `/_search/highlight`

use axum::{
    Extension, Json, Router,
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
    routing::get,
};

use super::paged;
use crate::api::{error::ApiResult, state::ApiState, types::ApiJson, types::ApiQuery, types::SearchParams};
use crate::model::{Actor, Entity, Id, PageRequest, Patchable, WithId};
use crate::search::SearchMode;
use crate::storage::{Repository, SqliteBackend};

/// Mounts the CRUD and search routes of `E` under `base`
pub fn routes<E>(router: Router<ApiState>, base: &str) -> Router<ApiState>
where
    E: Entity,
    SqliteBackend: Repository<E>,
{
    router
        .route(base, get(list::<E>).post(create::<E>))
        .route(&format!("{base}/_search"), get(search::<E>))
        .route(&format!("{base}/_search/prefix"), get(search_prefix::<E>))
        .route(&format!("{base}/_search/fuzzy"), get(search_fuzzy::<E>))
        .route(&format!("{base}/_search/highlight"), get(search_highlight::<E>))
        .route(
            &format!("{base}/:id"),
            get(get_one::<E>)
                .put(replace::<E>)
                .patch(patch::<E>)
                .delete(remove::<E>),
        )
}

pub async fn create<E>(
    State(state): State<ApiState>,
    Extension(actor): Extension<Actor>,
    ApiJson(fields): ApiJson<E::Fields>,
) -> ApiResult<(StatusCode, Json<E>)>
where
    E: Entity,
    SqliteBackend: Repository<E>,
{
    let entity: E = state.services.inventory.create(fields, &actor).await?;
    Ok((StatusCode::CREATED, Json(entity)))
}

pub async fn list<E>(
    State(state): State<ApiState>,
    ApiQuery(page): ApiQuery<PageRequest>,
) -> ApiResult<impl IntoResponse>
where
    E: Entity,
    SqliteBackend: Repository<E>,
{
    let page = state.services.inventory.list::<E>(page).await?;
    Ok(paged(page))
}

pub async fn get_one<E>(State(state): State<ApiState>, Path(id): Path<Id>) -> ApiResult<Json<E>>
where
    E: Entity,
    SqliteBackend: Repository<E>,
{
    Ok(Json(state.services.inventory.get(id).await?))
}

pub async fn replace<E>(
    State(state): State<ApiState>,
    Path(id): Path<Id>,
    Extension(actor): Extension<Actor>,
    ApiJson(body): ApiJson<WithId<E::Fields>>,
) -> ApiResult<Json<E>>
where
    E: Entity,
    SqliteBackend: Repository<E>,
{
    Ok(Json(state.services.inventory.replace(id, body, &actor).await?))
}

pub async fn patch<E>(
    State(state): State<ApiState>,
    Path(id): Path<Id>,
    Extension(actor): Extension<Actor>,
    ApiJson(patch): ApiJson<<E::Fields as Patchable>::Patch>,
) -> ApiResult<Json<E>>
where
    E: Entity,
    SqliteBackend: Repository<E>,
{
    Ok(Json(state.services.inventory.patch::<E>(id, patch, &actor).await?))
}

pub async fn remove<E>(
    State(state): State<ApiState>,
    Path(id): Path<Id>,
    Extension(actor): Extension<Actor>,
) -> ApiResult<StatusCode>
where
    E: Entity,
    SqliteBackend: Repository<E>,
{
    state.services.inventory.delete::<E>(id, &actor).await?;
    Ok(StatusCode::NO_CONTENT)
}

async fn search_with<E>(
    state: ApiState,
    params: SearchParams,
    page: PageRequest,
    mode: SearchMode,
) -> ApiResult<impl IntoResponse>
where
    E: Entity,
    SqliteBackend: Repository<E>,
{
    let page = state
        .services
        .inventory
        .search::<E>(&params.query, mode, page)
        .await?;
    Ok(paged(page))
}

pub async fn search<E>(
    State(state): State<ApiState>,
    ApiQuery(params): ApiQuery<SearchParams>,
    ApiQuery(page): ApiQuery<PageRequest>,
) -> ApiResult<impl IntoResponse>
where
    E: Entity,
    SqliteBackend: Repository<E>,
{
    search_with::<E>(state, params, page, SearchMode::FullText).await
}

pub async fn search_prefix<E>(
    State(state): State<ApiState>,
    ApiQuery(params): ApiQuery<SearchParams>,
    ApiQuery(page): ApiQuery<PageRequest>,
) -> ApiResult<impl IntoResponse>
where
    E: Entity,
    SqliteBackend: Repository<E>,
{
    search_with::<E>(state, params, page, SearchMode::Prefix).await
}

pub async fn search_fuzzy<E>(
    State(state): State<ApiState>,
    ApiQuery(params): ApiQuery<SearchParams>,
    ApiQuery(page): ApiQuery<PageRequest>,
) -> ApiResult<impl IntoResponse>
where
    E: Entity,
    SqliteBackend: Repository<E>,
{
    search_with::<E>(state, params, page, SearchMode::Fuzzy).await
}

/// Ranked hits with a highlighted snippet instead of full records
pub async fn search_highlight<E>(
    State(state): State<ApiState>,
    ApiQuery(params): ApiQuery<SearchParams>,
    ApiQuery(page): ApiQuery<PageRequest>,
) -> ApiResult<impl IntoResponse>
where
    E: Entity,
    SqliteBackend: Repository<E>,
{
    let hits = state
        .services
        .inventory
        .search_highlight::<E>(&params.query, page)
        .await?;
    Ok(paged(hits))
}
