/// Tenant user administration
///
/// # Endpoints
///
/// - `GET    /v1/tenants/:tenant_id/users` - requires `users:read`
/// - `DELETE /v1/tenants/:tenant_id/users/:user_id` - requires `users:delete`
///
/// The path tenant (and the `tenant_id` query or `X-Tenant-ID` header, if
/// sent) must match the caller's token tenant unless the caller is a super
/// admin.

use crate::{app::AppState, error::ApiResult, routes::ApiResponse};
use axum::{
    extract::{Path, Query, State},
    http::HeaderMap,
    Json,
};
use corebooks_identity::{
    auth::{
        authorization::{require_permission, resolve_tenant, tenant_from_headers, TenantScope},
        middleware::AuthContext,
    },
    models::user::User,
};
use serde::Deserialize;
use uuid::Uuid;

#[derive(Debug, Default, Deserialize)]
pub struct TenantQuery {
    pub tenant_id: Option<Uuid>,
}

fn scope(
    auth: &AuthContext,
    path_tenant: Uuid,
    query: &TenantQuery,
    headers: &HeaderMap,
) -> ApiResult<TenantScope> {
    let header_tenant = tenant_from_headers(headers)?;
    Ok(resolve_tenant(
        auth,
        std::iter::once(path_tenant)
            .chain(query.tenant_id)
            .chain(header_tenant),
    )?)
}

pub async fn list_users(
    State(state): State<AppState>,
    auth: AuthContext,
    headers: HeaderMap,
    Path(tenant_id): Path<Uuid>,
    Query(query): Query<TenantQuery>,
) -> ApiResult<Json<ApiResponse<Vec<User>>>> {
    require_permission(&state.permissions, &auth, "users", "read")?;
    let scope = scope(&auth, tenant_id, &query, &headers)?;

    let users = state.core.list_users(scope.tenant_id).await?;
    Ok(ApiResponse::ok("Users retrieved", users))
}

/// Soft-deletes a user and ends all of their sessions
pub async fn deactivate_user(
    State(state): State<AppState>,
    auth: AuthContext,
    headers: HeaderMap,
    Path((tenant_id, user_id)): Path<(Uuid, Uuid)>,
    Query(query): Query<TenantQuery>,
) -> ApiResult<Json<ApiResponse<()>>> {
    require_permission(&state.permissions, &auth, "users", "delete")?;
    let scope = scope(&auth, tenant_id, &query, &headers)?;

    state
        .core
        .deactivate_user(scope.tenant_id, user_id, auth.user_id)
        .await?;

    tracing::info!(
        actor_id = %auth.user_id,
        user_id = %user_id,
        tenant_id = %scope.tenant_id,
        overridden = scope.overridden,
        "User deactivated"
    );
    Ok(ApiResponse::done("User deactivated"))
}
