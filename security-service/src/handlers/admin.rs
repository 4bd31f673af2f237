//! Administrative handlers: RBAC mutations, audit/event queries, alert
//! review, anonymization and maintenance.

use axum::{
    extract::{Json, Path, Query, State},
    http::StatusCode,
};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;

use service_core::error::AppError;

use crate::middleware::SecurityContext;
use crate::models::{
    EventSeverity, Permission, Role, SecurityAction, SecurityAlert, SecurityAuditLog,
    SecurityEvent, SecurityEventType, SessionInfo,
};
use crate::services::CleanupReport;
use crate::store::{AuditLogFilter, SecurityEventFilter};
use crate::AppState;

// ============================================================================
// Request/Response DTOs
// ============================================================================

#[derive(Debug, Deserialize, ToSchema)]
pub struct AssignRoleRequest {
    pub role: Role,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct PermissionRequest {
    pub permission: Permission,
}

#[derive(Debug, Deserialize)]
pub struct AuditLogQuery {
    pub user_id: Option<Uuid>,
    pub action: Option<String>,
    pub limit: Option<i64>,
}

#[derive(Debug, Deserialize)]
pub struct SecurityEventQuery {
    pub user_id: Option<Uuid>,
    pub event_type: Option<String>,
    pub severity: Option<String>,
    pub limit: Option<i64>,
}

const DEFAULT_QUERY_LIMIT: i64 = 100;
const MAX_QUERY_LIMIT: i64 = 1000;

fn clamp_limit(limit: Option<i64>) -> i64 {
    limit.unwrap_or(DEFAULT_QUERY_LIMIT).clamp(1, MAX_QUERY_LIMIT)
}

// ============================================================================
// RBAC
// ============================================================================

/// Assign a role to a user; audited against the calling administrator.
///
/// PUT /admin/users/{user_id}/role
#[utoipa::path(
    put,
    path = "/admin/users/{user_id}/role",
    params(("user_id" = Uuid, Path, description = "Target user")),
    request_body = AssignRoleRequest,
    responses(
        (status = 204, description = "Role assigned"),
        (status = 403, description = "Missing capability")
    ),
    tag = "Admin"
)]
pub async fn assign_role(
    State(state): State<AppState>,
    context: SecurityContext,
    Path(user_id): Path<Uuid>,
    Json(req): Json<AssignRoleRequest>,
) -> Result<StatusCode, AppError> {
    state
        .rbac
        .assign_role(
            user_id,
            req.role,
            context.user_id,
            &context.audit_ip(),
            &context.audit_user_agent(),
        )
        .await
        .map_err(AppError::from)?;
    Ok(StatusCode::NO_CONTENT)
}

/// Grant a permission beyond the target's role defaults.
///
/// POST /admin/users/{user_id}/permissions
#[utoipa::path(
    post,
    path = "/admin/users/{user_id}/permissions",
    params(("user_id" = Uuid, Path, description = "Target user")),
    request_body = PermissionRequest,
    responses(
        (status = 204, description = "Permission granted"),
        (status = 403, description = "Missing capability")
    ),
    tag = "Admin"
)]
pub async fn grant_permission(
    State(state): State<AppState>,
    context: SecurityContext,
    Path(user_id): Path<Uuid>,
    Json(req): Json<PermissionRequest>,
) -> Result<StatusCode, AppError> {
    state
        .rbac
        .grant_permission(
            user_id,
            req.permission,
            context.user_id,
            &context.audit_ip(),
            &context.audit_user_agent(),
        )
        .await
        .map_err(AppError::from)?;
    Ok(StatusCode::NO_CONTENT)
}

/// Revoke a permission; overrides role defaults via an explicit denial.
///
/// DELETE /admin/users/{user_id}/permissions/{permission}
#[utoipa::path(
    delete,
    path = "/admin/users/{user_id}/permissions/{permission}",
    params(
        ("user_id" = Uuid, Path, description = "Target user"),
        ("permission" = String, Path, description = "Permission key")
    ),
    responses(
        (status = 204, description = "Permission revoked"),
        (status = 400, description = "Unknown permission"),
        (status = 403, description = "Missing capability")
    ),
    tag = "Admin"
)]
pub async fn revoke_permission(
    State(state): State<AppState>,
    context: SecurityContext,
    Path((user_id, permission)): Path<(Uuid, String)>,
) -> Result<StatusCode, AppError> {
    let permission = Permission::parse(&permission).ok_or_else(|| {
        AppError::BadRequest(anyhow::anyhow!("Unknown permission '{}'", permission))
    })?;
    state
        .rbac
        .revoke_permission(
            user_id,
            permission,
            context.user_id,
            &context.audit_ip(),
            &context.audit_user_agent(),
        )
        .await
        .map_err(AppError::from)?;
    Ok(StatusCode::NO_CONTENT)
}

// ============================================================================
// Audit & events
// ============================================================================

/// Query audit logs, newest first.
///
/// GET /admin/audit-logs
#[utoipa::path(
    get,
    path = "/admin/audit-logs",
    params(
        ("user_id" = Option<Uuid>, Query, description = "Filter by acting user"),
        ("action" = Option<String>, Query, description = "Filter by action code"),
        ("limit" = Option<i64>, Query, description = "Result limit")
    ),
    responses(
        (status = 200, description = "Audit log entries", body = [SecurityAuditLog]),
        (status = 403, description = "Missing capability")
    ),
    tag = "Admin"
)]
pub async fn get_audit_logs(
    State(state): State<AppState>,
    Query(query): Query<AuditLogQuery>,
) -> Result<Json<Vec<SecurityAuditLog>>, AppError> {
    let action = query
        .action
        .as_deref()
        .map(|s| {
            SecurityAction::parse(s)
                .ok_or_else(|| AppError::BadRequest(anyhow::anyhow!("Unknown action '{}'", s)))
        })
        .transpose()?;

    let filter = AuditLogFilter {
        user_id: query.user_id,
        action,
        limit: Some(clamp_limit(query.limit)),
    };
    let logs = state
        .audit
        .get_audit_logs(&filter)
        .await
        .map_err(AppError::from)?;
    Ok(Json(logs))
}

/// Query security events, newest first.
///
/// GET /admin/security-events
#[utoipa::path(
    get,
    path = "/admin/security-events",
    params(
        ("user_id" = Option<Uuid>, Query, description = "Filter by attributed user"),
        ("event_type" = Option<String>, Query, description = "Filter by event type"),
        ("severity" = Option<String>, Query, description = "Filter by severity"),
        ("limit" = Option<i64>, Query, description = "Result limit")
    ),
    responses(
        (status = 200, description = "Security events", body = [SecurityEvent]),
        (status = 403, description = "Missing capability")
    ),
    tag = "Admin"
)]
pub async fn get_security_events(
    State(state): State<AppState>,
    Query(query): Query<SecurityEventQuery>,
) -> Result<Json<Vec<SecurityEvent>>, AppError> {
    let event_type = query
        .event_type
        .as_deref()
        .map(|s| {
            SecurityEventType::parse(s)
                .ok_or_else(|| AppError::BadRequest(anyhow::anyhow!("Unknown event type '{}'", s)))
        })
        .transpose()?;
    let severity = query
        .severity
        .as_deref()
        .map(|s| {
            EventSeverity::parse(s)
                .ok_or_else(|| AppError::BadRequest(anyhow::anyhow!("Unknown severity '{}'", s)))
        })
        .transpose()?;

    let filter = SecurityEventFilter {
        user_id: query.user_id,
        event_type,
        severity,
        limit: Some(clamp_limit(query.limit)),
    };
    let events = state
        .audit
        .get_security_events(&filter)
        .await
        .map_err(AppError::from)?;
    Ok(Json(events))
}

/// Run the suspicious-session heuristics for a user; logs a high-severity
/// event when anything is implicated.
///
/// GET /admin/users/{user_id}/suspicious-sessions
#[utoipa::path(
    get,
    path = "/admin/users/{user_id}/suspicious-sessions",
    params(("user_id" = Uuid, Path, description = "Target user")),
    responses(
        (status = 200, description = "Implicated sessions", body = [SessionInfo]),
        (status = 403, description = "Missing capability")
    ),
    tag = "Admin"
)]
pub async fn suspicious_sessions(
    State(state): State<AppState>,
    Path(user_id): Path<Uuid>,
) -> Result<Json<Vec<SessionInfo>>, AppError> {
    let flagged = state
        .sessions
        .report_suspicious_activity(user_id)
        .await
        .map_err(AppError::from)?;
    Ok(Json(flagged.into_iter().map(SessionInfo::from).collect()))
}

// ============================================================================
// Alerts
// ============================================================================

/// Unacknowledged operator alerts, newest first.
///
/// GET /admin/alerts
#[utoipa::path(
    get,
    path = "/admin/alerts",
    responses(
        (status = 200, description = "Open alerts", body = [SecurityAlert]),
        (status = 403, description = "Missing capability")
    ),
    tag = "Admin"
)]
pub async fn open_alerts(
    State(state): State<AppState>,
) -> Result<Json<Vec<SecurityAlert>>, AppError> {
    let alerts = state
        .audit
        .unacknowledged_alerts(DEFAULT_QUERY_LIMIT)
        .await
        .map_err(AppError::from)?;
    Ok(Json(alerts))
}

/// Acknowledge an alert.
///
/// POST /admin/alerts/{alert_id}/acknowledge
#[utoipa::path(
    post,
    path = "/admin/alerts/{alert_id}/acknowledge",
    params(("alert_id" = Uuid, Path, description = "Alert id")),
    responses(
        (status = 204, description = "Acknowledged"),
        (status = 404, description = "Unknown alert")
    ),
    tag = "Admin"
)]
pub async fn acknowledge_alert(
    State(state): State<AppState>,
    Path(alert_id): Path<Uuid>,
) -> Result<StatusCode, AppError> {
    let found = state
        .audit
        .acknowledge_alert(alert_id)
        .await
        .map_err(AppError::from)?;
    if !found {
        return Err(AppError::NotFound(anyhow::anyhow!("Unknown alert")));
    }
    Ok(StatusCode::NO_CONTENT)
}

// ============================================================================
// Lifecycle
// ============================================================================

/// Anonymize a user: PII scrubbed, audit trail preserved. Never a hard
/// delete.
///
/// POST /admin/users/{user_id}/anonymize (super-admin)
#[utoipa::path(
    post,
    path = "/admin/users/{user_id}/anonymize",
    params(("user_id" = Uuid, Path, description = "Target user")),
    responses(
        (status = 204, description = "User anonymized"),
        (status = 403, description = "Requires the super-admin role")
    ),
    tag = "Admin"
)]
pub async fn anonymize_user(
    State(state): State<AppState>,
    context: SecurityContext,
    Path(user_id): Path<Uuid>,
) -> Result<StatusCode, AppError> {
    state
        .maintenance
        .anonymize_user(
            user_id,
            context.user_id,
            &context.audit_ip(),
            &context.audit_user_agent(),
        )
        .await
        .map_err(AppError::from)?;
    Ok(StatusCode::NO_CONTENT)
}

/// Trigger a maintenance sweep outside the recurring schedule.
///
/// POST /admin/maintenance/cleanup (super-admin)
#[utoipa::path(
    post,
    path = "/admin/maintenance/cleanup",
    responses(
        (status = 200, description = "Cleanup counts", body = CleanupReport),
        (status = 403, description = "Requires the super-admin role")
    ),
    tag = "Admin"
)]
pub async fn run_cleanup(
    State(state): State<AppState>,
) -> Result<Json<CleanupReport>, AppError> {
    let report = state
        .maintenance
        .run_cleanup()
        .await
        .map_err(AppError::from)?;
    Ok(Json(report))
}
