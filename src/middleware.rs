use actix_web::dev::{forward_ready, Payload, Service, ServiceRequest, ServiceResponse, Transform};
use actix_web::http::header;
use actix_web::{web, Error, FromRequest, HttpRequest};
use diesel::prelude::*;
use futures_util::future::LocalBoxFuture;
use log::{debug, error, info, warn};
use std::future::{ready, Future, Ready};
use std::pin::Pin;
use std::rc::Rc;

use crate::config::{AppConfig, DbPool};
use crate::errors::ApiError;
use crate::models::Role;
use crate::services::AuthService;

// Logger middleware to log all requests and responses
pub struct RequestLogger;

impl<S, B> Transform<S, ServiceRequest> for RequestLogger
where
    S: Service<ServiceRequest, Response = ServiceResponse<B>, Error = Error> + 'static,
    S::Future: 'static,
    B: 'static,
{
    type Response = ServiceResponse<B>;
    type Error = Error;
    type Transform = RequestLoggerMiddleware<S>;
    type InitError = ();
    type Future = Ready<Result<Self::Transform, Self::InitError>>;

    fn new_transform(&self, service: S) -> Self::Future {
        ready(Ok(RequestLoggerMiddleware {
            service: Rc::new(service),
        }))
    }
}

pub struct RequestLoggerMiddleware<S> {
    service: Rc<S>,
}

impl<S, B> Service<ServiceRequest> for RequestLoggerMiddleware<S>
where
    S: Service<ServiceRequest, Response = ServiceResponse<B>, Error = Error> + 'static,
    S::Future: 'static,
    B: 'static,
{
    type Response = ServiceResponse<B>;
    type Error = Error;
    type Future = Pin<Box<dyn Future<Output = Result<Self::Response, Self::Error>> + 'static>>;

    forward_ready!(service);

    fn call(&self, req: ServiceRequest) -> Self::Future {
        let method = req.method().clone();
        let path = req.path().to_owned();
        let client_ip = req.connection_info().realip_remote_addr()
            .map(|s| s.to_owned())
            .unwrap_or_else(|| String::from("unknown"));

        info!(
            "→ Request: \x1B[1;34m{} {}\x1B[0m from IP: {}",
            method, path, client_ip
        );

        let service = self.service.clone();

        Box::pin(async move {
            let start = std::time::Instant::now();
            let res = service.call(req).await?;
            let elapsed = start.elapsed();

            let status = res.status();

            if status.is_success() {
                info!(
                    "← Response: \x1B[1;32m{}\x1B[0m for {} {} completed in {:.2?}",
                    status, method, path, elapsed
                );
            } else if status.is_client_error() {
                warn!(
                    "← Response: \x1B[1;33m{}\x1B[0m for {} {} completed in {:.2?}",
                    status, method, path, elapsed
                );
            } else {
                error!(
                    "← Response: \x1B[1;31m{}\x1B[0m for {} {} completed in {:.2?}",
                    status, method, path, elapsed
                );
            }

            Ok(res)
        })
    }
}

/// Identity attached to every authenticated request. The role has already
/// been parsed into the closed enum and re-checked against the store.
#[derive(Debug, Clone)]
pub struct AuthUser {
    pub user_id: i32,
    pub name: String,
    pub email: String,
    pub role: Role,
    pub department_id: Option<i32>,
}

/// Pulls the token out of a standard `Authorization: Bearer <token>` header.
pub fn extract_bearer_token(header_value: Option<&str>) -> Result<String, ApiError> {
    match header_value.and_then(|v| v.strip_prefix("Bearer ")) {
        Some(token) if !token.is_empty() => Ok(token.to_string()),
        _ => Err(ApiError::AuthError(
            "Access denied. No token provided.".to_string(),
        )),
    }
}

impl FromRequest for AuthUser {
    type Error = ApiError;
    type Future = LocalBoxFuture<'static, Result<Self, Self::Error>>;

    fn from_request(req: &HttpRequest, _payload: &mut Payload) -> Self::Future {
        let pool = req.app_data::<web::Data<DbPool>>().cloned();
        let config = req.app_data::<web::Data<AppConfig>>().cloned();
        let header_value = req
            .headers()
            .get(header::AUTHORIZATION)
            .and_then(|v| v.to_str().ok())
            .map(str::to_owned);

        Box::pin(async move {
            let pool = pool.ok_or_else(|| {
                ApiError::InternalError("Database pool is not configured".to_string())
            })?;
            let config = config.ok_or_else(|| {
                ApiError::InternalError("Application config is not configured".to_string())
            })?;

            let token = extract_bearer_token(header_value.as_deref())?;
            let claims = AuthService::decode_token(&token, &config)?;

            // Re-read the account so tokens for deleted users (or users whose
            // role changed) die immediately instead of at token expiry
            let conn = pool.get().map_err(|e| {
                error!("Failed to get database connection: {}", e);
                ApiError::DatabaseError(e.to_string())
            })?;

            let token_user_id = claims.user_id;
            let account = web::block(move || {
                use crate::schema::users::dsl::*;
                let mut conn = conn;
                users
                    .find(token_user_id)
                    .select((user_id, name, email, role, department_id))
                    .first::<(i32, String, String, String, Option<i32>)>(&mut conn)
                    .optional()
            })
            .await
            .map_err(|e| {
                error!("Database operation error: {}", e);
                ApiError::DatabaseError(e.to_string())
            })?
            .map_err(|e| {
                error!("Failed to load authenticated user: {}", e);
                ApiError::DatabaseError(e.to_string())
            })?;

            let (user_id, name, email, role_name, department_id) =
                account.ok_or_else(|| {
                    debug!("Token references missing user {}", token_user_id);
                    ApiError::AuthError("Token is not valid. User not found.".to_string())
                })?;

            let role = role_name.parse::<Role>().map_err(|_| {
                ApiError::ForbiddenError(format!("Access denied. Unknown role: {}", role_name))
            })?;

            debug!("User authenticated: {} ({})", name, role);

            Ok(AuthUser { user_id, name, email, role, department_id })
        })
    }
}

/// Secondary gate for role-restricted operations. Runs against an already
/// verified identity.
pub fn require_role(user: &AuthUser, allowed: &[Role]) -> Result<(), ApiError> {
    if allowed.contains(&user.role) {
        return Ok(());
    }

    let required = allowed
        .iter()
        .map(|r| r.as_str())
        .collect::<Vec<_>>()
        .join(", ");

    Err(ApiError::ForbiddenError(format!(
        "Access denied. Required roles: {}. Your role: {}",
        required, user.role
    )))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn user_with_role(role: Role) -> AuthUser {
        AuthUser {
            user_id: 1,
            name: "Test".to_string(),
            email: "test@x.com".to_string(),
            role,
            department_id: None,
        }
    }

    #[test]
    fn bearer_extraction_requires_the_scheme() {
        assert!(extract_bearer_token(None).is_err());
        assert!(extract_bearer_token(Some("abc123")).is_err());
        assert!(extract_bearer_token(Some("Basic abc123")).is_err());
        assert!(extract_bearer_token(Some("Bearer ")).is_err());
        assert_eq!(
            extract_bearer_token(Some("Bearer abc123")).unwrap(),
            "abc123"
        );
    }

    #[test]
    fn missing_token_message_asks_for_login() {
        let err = extract_bearer_token(None).unwrap_err();
        match err {
            ApiError::AuthError(msg) => {
                assert_eq!(msg, "Access denied. No token provided.")
            }
            other => panic!("unexpected error: {:?}", other),
        }
    }

    #[test]
    fn require_role_admits_listed_roles() {
        let staff = user_with_role(Role::OfficeStaff);
        assert!(require_role(&staff, &[Role::Admin, Role::OfficeStaff]).is_ok());

        let admin = user_with_role(Role::Admin);
        assert!(require_role(&admin, &[Role::Admin]).is_ok());
    }

    #[test]
    fn require_role_names_both_sides_on_denial() {
        let student = user_with_role(Role::Student);
        let err = require_role(&student, &[Role::Admin, Role::OfficeStaff]).unwrap_err();
        match err {
            ApiError::ForbiddenError(msg) => {
                assert!(msg.contains("admin, office_staff"));
                assert!(msg.contains("Your role: student"));
            }
            other => panic!("unexpected error: {:?}", other),
        }
    }
}
