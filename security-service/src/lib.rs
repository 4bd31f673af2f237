pub mod config;
pub mod db;
pub mod handlers;
pub mod middleware;
pub mod models;
pub mod services;
pub mod store;
pub mod totp;

use axum::{
    middleware::{from_fn, from_fn_with_state},
    routing::{delete, get, post, put},
    Router,
};
use metrics_exporter_prometheus::PrometheusHandle;
use std::sync::Arc;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use utoipa::{
    openapi::security::{ApiKey, ApiKeyValue, SecurityScheme},
    Modify, OpenApi,
};
use utoipa_swagger_ui::SwaggerUi;

use service_core::error::AppError;
use service_core::middleware::{
    metrics::metrics_middleware, security_headers::security_headers_middleware,
    tracing::request_id_middleware,
};

use crate::config::{SecurityServiceConfig, SwaggerMode};
use crate::middleware::{
    internal_auth_middleware, rate_limit::rate_limit_middleware, require_authentication,
    require_consent, require_mfa, require_permission, require_role, RateLimiters,
};
use crate::models::{ConsentPurpose, Permission, Role};
use crate::services::{
    AlertSink, AuditLogger, ConsentService, MaintenanceService, MfaService, RbacResolver,
    SessionManager,
};
use crate::services::maintenance::RetentionPolicy;
use crate::store::SecurityStore;
use crate::totp::{crypto::SecretCipher, Totp};

#[derive(OpenApi)]
#[openapi(
    paths(
        health_check,
        handlers::auth::create_session,
        handlers::auth::record_login_failure,
        handlers::auth::record_password_change,
        handlers::auth::record_security_action,
        handlers::auth::logout,
        handlers::auth::logout_all,
        handlers::auth::extend_session,
        handlers::auth::list_sessions,
        handlers::mfa::setup,
        handlers::mfa::enable,
        handlers::mfa::challenge,
        handlers::mfa::disable,
        handlers::mfa::regenerate_backup_codes,
        handlers::me::get_me,
        handlers::me::export_data,
        handlers::consent::list_consents,
        handlers::consent::grant_consent,
        handlers::consent::revoke_consent,
        handlers::admin::assign_role,
        handlers::admin::grant_permission,
        handlers::admin::revoke_permission,
        handlers::admin::get_audit_logs,
        handlers::admin::get_security_events,
        handlers::admin::suspicious_sessions,
        handlers::admin::open_alerts,
        handlers::admin::acknowledge_alert,
        handlers::admin::anonymize_user,
        handlers::admin::run_cleanup,
    ),
    components(
        schemas(
            handlers::auth::CreateSessionRequest,
            handlers::auth::CreateSessionResponse,
            handlers::auth::LoginFailureRequest,
            handlers::auth::PasswordChangeRequest,
            handlers::auth::RecordActionRequest,
            handlers::auth::RecordActionResponse,
            handlers::auth::LogoutAllResponse,
            handlers::auth::ExtendSessionRequest,
            handlers::auth::ExtendSessionResponse,
            handlers::mfa::MfaSetupRequest,
            handlers::mfa::MfaSetupResponse,
            handlers::mfa::MfaEnableRequest,
            handlers::mfa::BackupCodesResponse,
            handlers::mfa::MfaChallengeRequest,
            handlers::mfa::MfaChallengeResponse,
            handlers::me::MeResponse,
            handlers::me::ConsentSummary,
            handlers::me::DataExportResponse,
            handlers::consent::GrantConsentRequest,
            handlers::consent::ConsentResponse,
            handlers::admin::AssignRoleRequest,
            handlers::admin::PermissionRequest,
            services::CleanupReport,
            models::Role,
            models::Permission,
            models::SecurityAction,
            models::RiskLevel,
            models::AuditDetails,
            models::MfaMethod,
            models::SecurityAuditLog,
            models::SecurityEventType,
            models::EventSeverity,
            models::EventDetails,
            models::SecurityEvent,
            models::SecurityAlert,
            models::ConsentPurpose,
            models::SessionInfo,
        )
    ),
    modifiers(&SecurityAddon),
    tags(
        (name = "Sessions", description = "Session lifecycle"),
        (name = "MFA", description = "Multi-factor authentication"),
        (name = "Profile", description = "Caller-facing security profile"),
        (name = "Consent", description = "Data-processing consent"),
        (name = "Admin", description = "Administrative operations"),
        (name = "Observability", description = "Service health and monitoring"),
    )
)]
pub struct ApiDoc;

struct SecurityAddon;

impl Modify for SecurityAddon {
    fn modify(&self, openapi: &mut utoipa::openapi::OpenApi) {
        if let Some(components) = openapi.components.as_mut() {
            components.add_security_scheme(
                "internal_api_key",
                SecurityScheme::ApiKey(ApiKey::Header(ApiKeyValue::new(
                    middleware::internal::INTERNAL_API_KEY_HEADER,
                ))),
            );
            components.add_security_scheme(
                "session_cookie",
                SecurityScheme::ApiKey(ApiKey::Cookie(ApiKeyValue::new(
                    middleware::SESSION_COOKIE,
                ))),
            );
        }
    }
}

#[derive(Clone)]
pub struct AppState {
    pub config: SecurityServiceConfig,
    pub store: Arc<dyn SecurityStore>,
    pub audit: AuditLogger,
    pub sessions: SessionManager,
    pub rbac: RbacResolver,
    pub mfa: MfaService,
    pub consent: ConsentService,
    pub maintenance: MaintenanceService,
    pub rate_limiters: RateLimiters,
    pub metrics: PrometheusHandle,
}

impl AppState {
    /// Wire the service graph over a store and alert sink.
    pub fn build(
        config: SecurityServiceConfig,
        store: Arc<dyn SecurityStore>,
        alerts: Arc<dyn AlertSink>,
        metrics: PrometheusHandle,
    ) -> Result<Self, AppError> {
        let cipher = SecretCipher::from_hex_key(&config.security.mfa_encryption_key)
            .map_err(|e| AppError::ConfigError(anyhow::anyhow!(e)))?;
        let totp = Totp::new(config.security.mfa_issuer.clone());

        let audit = AuditLogger::new(store.clone(), alerts);
        let sessions = SessionManager::new(store.clone(), audit.clone());
        let rbac = RbacResolver::new(store.clone(), audit.clone());
        let mfa = MfaService::new(store.clone(), audit.clone(), totp, cipher);
        let consent = ConsentService::new(store.clone());
        let rate_limiters = RateLimiters::from_config(&config.rate_limit);
        let maintenance = MaintenanceService::new(
            store.clone(),
            sessions.clone(),
            audit.clone(),
            rate_limiters.clone(),
            RetentionPolicy {
                audit_log_days: config.retention.audit_log_days,
                security_event_days: config.retention.security_event_days,
            },
        );

        Ok(Self {
            config,
            store,
            audit,
            sessions,
            rbac,
            mfa,
            consent,
            maintenance,
            rate_limiters,
            metrics,
        })
    }
}

pub async fn build_router(state: AppState) -> Result<Router, AppError> {
    // Internal routes: the outer application reports authentication
    // outcomes here with the shared service key.
    let session_limiter = state.rate_limiters.session_create.clone();
    let failure_limiter = state.rate_limiters.login_failure.clone();
    let internal_routes = Router::new()
        .route(
            "/internal/sessions",
            post(handlers::auth::create_session).layer(from_fn_with_state(
                (state.clone(), session_limiter),
                rate_limit_middleware,
            )),
        )
        .route(
            "/internal/login-failures",
            post(handlers::auth::record_login_failure).layer(from_fn_with_state(
                (state.clone(), failure_limiter),
                rate_limit_middleware,
            )),
        )
        .route(
            "/internal/password-changes",
            post(handlers::auth::record_password_change),
        )
        .route(
            "/internal/audit-events",
            post(handlers::auth::record_security_action),
        )
        .layer(from_fn_with_state(
            state.clone(),
            internal_auth_middleware,
        ));

    // MFA challenge gets its own limiter: code guessing is the obvious
    // abuse vector on an authenticated surface.
    let mfa_limiter = state.rate_limiters.mfa_challenge.clone();
    let mfa_challenge_route = Router::new().route(
        "/auth/mfa/challenge",
        post(handlers::mfa::challenge).layer(from_fn_with_state(
            (state.clone(), mfa_limiter),
            rate_limit_middleware,
        )),
    );

    // Routes that additionally require an MFA-verified session.
    let mfa_verified_routes = Router::new()
        .route("/auth/mfa/disable", post(handlers::mfa::disable))
        .route(
            "/auth/mfa/backup-codes",
            post(handlers::mfa::regenerate_backup_codes),
        )
        .layer(from_fn(require_mfa));

    // Data export sits behind an active data-processing consent.
    let export_route = Router::new()
        .route("/me/export", get(handlers::me::export_data))
        .layer(from_fn_with_state(
            (state.clone(), ConsentPurpose::DataProcessing),
            require_consent,
        ));

    let authenticated_routes = Router::new()
        .route("/auth/logout", post(handlers::auth::logout))
        .route("/auth/logout-all", post(handlers::auth::logout_all))
        .route("/auth/sessions", get(handlers::auth::list_sessions))
        .route("/auth/sessions/extend", post(handlers::auth::extend_session))
        .route("/auth/mfa/setup", post(handlers::mfa::setup))
        .route("/auth/mfa/enable", post(handlers::mfa::enable))
        .route("/me", get(handlers::me::get_me))
        .route(
            "/consents",
            get(handlers::consent::list_consents).post(handlers::consent::grant_consent),
        )
        .route("/consents/:purpose", delete(handlers::consent::revoke_consent))
        .merge(mfa_challenge_route)
        .merge(mfa_verified_routes)
        .merge(export_route)
        .layer(from_fn_with_state(state.clone(), require_authentication));

    // Admin surface, capability-guarded per route group.
    let role_admin = Router::new()
        .route("/admin/users/:user_id/role", put(handlers::admin::assign_role))
        .layer(from_fn_with_state(
            (state.clone(), Permission::ManageRoles),
            require_permission,
        ));

    let user_admin = Router::new()
        .route(
            "/admin/users/:user_id/permissions",
            post(handlers::admin::grant_permission),
        )
        .route(
            "/admin/users/:user_id/permissions/:permission",
            delete(handlers::admin::revoke_permission),
        )
        .layer(from_fn_with_state(
            (state.clone(), Permission::ManageUsers),
            require_permission,
        ));

    let audit_read = Router::new()
        .route("/admin/audit-logs", get(handlers::admin::get_audit_logs))
        .layer(from_fn_with_state(
            (state.clone(), Permission::ViewAuditLogs),
            require_permission,
        ));

    let event_read = Router::new()
        .route(
            "/admin/security-events",
            get(handlers::admin::get_security_events),
        )
        .route(
            "/admin/users/:user_id/suspicious-sessions",
            get(handlers::admin::suspicious_sessions),
        )
        .route("/admin/alerts", get(handlers::admin::open_alerts))
        .route(
            "/admin/alerts/:alert_id/acknowledge",
            post(handlers::admin::acknowledge_alert),
        )
        .layer(from_fn_with_state(
            (state.clone(), Permission::ViewSecurityEvents),
            require_permission,
        ));

    let super_admin = Router::new()
        .route(
            "/admin/users/:user_id/anonymize",
            post(handlers::admin::anonymize_user),
        )
        .route(
            "/admin/maintenance/cleanup",
            post(handlers::admin::run_cleanup),
        )
        .layer(from_fn_with_state(
            (state.clone(), Role::SuperAdmin),
            require_role,
        ));

    let admin_routes = Router::new()
        .merge(role_admin)
        .merge(user_admin)
        .merge(audit_read)
        .merge(event_read)
        .merge(super_admin)
        .layer(from_fn_with_state(state.clone(), require_authentication));

    let mut app = Router::new()
        .route("/health", get(health_check))
        .route("/metrics", get(handlers::metrics::metrics));

    let swagger_enabled = match state.config.environment {
        crate::config::Environment::Dev => true,
        crate::config::Environment::Prod => state.config.swagger.enabled == SwaggerMode::Public,
    };
    if swagger_enabled {
        app =
            app.merge(SwaggerUi::new("/docs").url("/.well-known/openapi.json", ApiDoc::openapi()));
    } else {
        app = app.route(
            "/.well-known/openapi.json",
            get(|| async { axum::Json(ApiDoc::openapi()) }),
        );
    }

    let app = app
        .merge(internal_routes)
        .merge(authenticated_routes)
        .merge(admin_routes)
        .with_state(state.clone())
        .layer(from_fn(metrics_middleware))
        .layer(TraceLayer::new_for_http().make_span_with(
            |request: &axum::http::Request<_>| {
                let request_id = request
                    .headers()
                    .get("x-request-id")
                    .and_then(|value| value.to_str().ok())
                    .unwrap_or("-");

                tracing::info_span!(
                    "http_request",
                    request_id = %request_id,
                    method = %request.method(),
                    uri = %request.uri(),
                    version = ?request.version(),
                )
            },
        ))
        .layer(from_fn(request_id_middleware))
        .layer(from_fn(security_headers_middleware))
        .layer(
            CorsLayer::new()
                .allow_origin(
                    state
                        .config
                        .security
                        .allowed_origins
                        .iter()
                        .map(|o| {
                            o.parse::<axum::http::HeaderValue>().unwrap_or_else(|e| {
                                tracing::error!(
                                    "Invalid CORS origin '{}': {}. Using fallback.",
                                    o,
                                    e
                                );
                                axum::http::HeaderValue::from_static("*")
                            })
                        })
                        .collect::<Vec<axum::http::HeaderValue>>(),
                )
                .allow_methods([
                    axum::http::Method::GET,
                    axum::http::Method::POST,
                    axum::http::Method::PUT,
                    axum::http::Method::DELETE,
                    axum::http::Method::OPTIONS,
                ])
                .allow_headers([
                    axum::http::header::AUTHORIZATION,
                    axum::http::header::CONTENT_TYPE,
                    axum::http::header::HeaderName::from_static("x-internal-api-key"),
                    axum::http::header::HeaderName::from_static("x-request-id"),
                ]),
        );

    Ok(app)
}

/// Service health check
#[utoipa::path(
    get,
    path = "/health",
    responses(
        (status = 200, description = "Service is healthy"),
        (status = 503, description = "Service is unhealthy")
    ),
    tag = "Observability"
)]
pub async fn health_check(
    axum::extract::State(state): axum::extract::State<AppState>,
) -> Result<axum::Json<serde_json::Value>, AppError> {
    state.store.health_check().await.map_err(|e| {
        tracing::error!(error = %e, "Store health check failed");
        AppError::ServiceUnavailable
    })?;

    Ok(axum::Json(serde_json::json!({
        "status": "healthy",
        "service": state.config.service_name,
        "version": state.config.service_version,
        "environment": format!("{:?}", state.config.environment),
        "checks": {
            "store": "up"
        }
    })))
}
