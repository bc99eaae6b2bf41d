use actix_cors::Cors;
use actix_files::Files;
use actix_multipart::Multipart;
use actix_web::http::header;
use actix_web::{delete, get, post, put, web, App, HttpResponse, HttpServer, Responder};
use diesel::connection::SimpleConnection;
use diesel::pg::PgConnection;
use diesel::r2d2::{self, ConnectionManager};
use diesel::Connection;
use futures_util::TryStreamExt;
use log::{debug, error, info};
use serde_json::json;
use std::env;
use uuid::Uuid;

// Import types from the crate (lib.rs)
use frms::config::{AppConfig, DbPool, DB_INIT_SQL, MAX_PHOTO_BYTES, POOL_MAX_SIZE};
use frms::errors::ApiError;
use frms::logger::setup_logger;
use frms::middleware::{require_role, AuthUser, RequestLogger};
use frms::models::{
    LoginRequest, LoginResponse, NewUser, ProfileChanges, PublicUser, RegisterRequest,
    ResourceFields, ResourceFilter, ResourceRequest, ResourceType, Role, UpdateProfileRequest,
};
use frms::services::{AuthService, DashboardService, ResourceService, UserService};

fn non_empty(value: Option<&str>) -> Option<&str> {
    value.map(str::trim).filter(|v| !v.is_empty())
}

fn validate_resource(data: ResourceRequest) -> Result<ResourceFields, ApiError> {
    let (Some(name), Some(type_name), Some(location)) = (
        non_empty(data.name.as_deref()),
        non_empty(data.resource_type.as_deref()),
        non_empty(data.location.as_deref()),
    ) else {
        return Err(ApiError::ValidationError(
            "Please provide name, type, and location".to_string(),
        ));
    };

    let resource_type = type_name.parse::<ResourceType>().map_err(|_| {
        ApiError::ValidationError(format!("Unknown resource type: {}", type_name))
    })?;

    Ok(ResourceFields {
        name: name.to_string(),
        resource_type: resource_type.as_str().to_string(),
        location: location.to_string(),
        capacity: data.capacity,
        description: data.description,
        department_id: data.department_id,
        availability: data.availability.unwrap_or(true),
    })
}

#[get("/health")]
async fn health_check() -> impl Responder {
    HttpResponse::Ok().json(json!({
        "status": "ok",
        "version": env!("CARGO_PKG_VERSION"),
        "timestamp": chrono::Utc::now().to_rfc3339()
    }))
}

#[post("/auth/register")]
async fn register(
    pool: web::Data<DbPool>,
    data: web::Json<RegisterRequest>,
) -> Result<HttpResponse, ApiError> {
    let data = data.into_inner();

    let (Some(name), Some(email), Some(password)) = (
        non_empty(data.name.as_deref()),
        non_empty(data.email.as_deref()),
        non_empty(data.password.as_deref()),
    ) else {
        return Err(ApiError::ValidationError(
            "Please provide all required fields: name, email, password".to_string(),
        ));
    };

    // Least-privileged default when the caller does not pick a role
    let role = match non_empty(data.role.as_deref()) {
        None => Role::Student,
        Some(r) => r
            .parse::<Role>()
            .map_err(|_| ApiError::ValidationError(format!("Unknown role: {}", r)))?,
    };

    if UserService::find_by_email(email, &pool).await?.is_some() {
        debug!("Registration failed: email already exists {}", email);
        return Err(ApiError::ConflictError(
            "User with this email already exists".to_string(),
        ));
    }

    let password_hash = AuthService::hash_password(password)?;
    let new_user = NewUser {
        name: name.to_string(),
        email: email.to_string(),
        password: password_hash,
        role: role.as_str().to_string(),
        department_id: data.department_id,
        registration_number: data.registration_number,
        national_id: data.national_id,
        academic_year: data.academic_year,
        address: data.address,
        contact_number: data.contact_number,
        birthday: data.birthday,
        religion: data.religion,
        district: data.district,
    };

    let user_id = UserService::create_user(new_user, &pool).await?;
    info!("New user registered: {} ({})", email, role);

    Ok(HttpResponse::Created().json(json!({
        "message": "User registered successfully",
        "userId": user_id
    })))
}

#[post("/auth/login")]
async fn login(
    pool: web::Data<DbPool>,
    config: web::Data<AppConfig>,
    data: web::Json<LoginRequest>,
) -> Result<HttpResponse, ApiError> {
    let (Some(email), Some(password)) = (
        non_empty(data.email.as_deref()),
        non_empty(data.password.as_deref()),
    ) else {
        return Err(ApiError::ValidationError(
            "Please provide email and password".to_string(),
        ));
    };

    // Same message for unknown email and wrong password
    let user = UserService::find_by_email(email, &pool).await?.ok_or_else(|| {
        debug!("Login failed: user not found with email {}", email);
        ApiError::AuthError("Invalid email or password".to_string())
    })?;

    if !AuthService::verify_password(password, &user.password)? {
        debug!("Login failed: invalid password for user {}", email);
        return Err(ApiError::AuthError("Invalid email or password".to_string()));
    }

    let token = AuthService::generate_token(user.user_id, &user.email, &user.role, &config)?;

    info!("User logged in: {} ({})", user.email, user.role);

    Ok(HttpResponse::Ok().json(LoginResponse {
        message: "Login successful".to_string(),
        token,
        role: user.role.clone(),
        user: PublicUser {
            id: user.user_id,
            name: user.name,
            email: user.email,
            role: user.role,
            department_id: user.department_id,
        },
    }))
}

#[get("/auth/me")]
async fn current_user(pool: web::Data<DbPool>, auth: AuthUser) -> Result<HttpResponse, ApiError> {
    let profile = UserService::get_profile(auth.user_id, &pool).await?;
    Ok(HttpResponse::Ok().json(json!({ "user": profile })))
}

#[put("/auth/me")]
async fn edit_profile(
    pool: web::Data<DbPool>,
    auth: AuthUser,
    data: web::Json<UpdateProfileRequest>,
) -> Result<HttpResponse, ApiError> {
    let data = data.into_inner();

    // A supplied password is re-hashed; everything else passes through as-is
    let password_hash = match non_empty(data.password.as_deref()) {
        Some(pw) => Some(AuthService::hash_password(pw)?),
        None => None,
    };

    let changes = ProfileChanges {
        name: data.name,
        email: data.email,
        password: password_hash,
        department_id: data.department_id,
        registration_number: data.registration_number,
        national_id: data.national_id,
        academic_year: data.academic_year,
        address: data.address,
        contact_number: data.contact_number,
        birthday: data.birthday,
        religion: data.religion,
        district: data.district,
    };

    let profile = UserService::update_profile(auth.user_id, changes, &pool).await?;
    info!("Profile updated for user {}", auth.user_id);

    Ok(HttpResponse::Ok().json(json!({
        "message": "Profile updated successfully",
        "user": profile
    })))
}

#[post("/auth/me/upload-photo")]
async fn upload_photo(
    pool: web::Data<DbPool>,
    config: web::Data<AppConfig>,
    auth: AuthUser,
    mut payload: Multipart,
) -> Result<HttpResponse, ApiError> {
    let mut uploaded: Option<(&'static str, Vec<u8>)> = None;

    while let Some(mut field) = payload.try_next().await.map_err(|e| {
        ApiError::ValidationError(format!("Invalid multipart payload: {}", e))
    })? {
        if field.name() != "photo" {
            continue;
        }

        let extension = field
            .content_type()
            .and_then(|m| UserService::photo_extension(m.essence_str()))
            .ok_or_else(|| {
                ApiError::ValidationError(
                    "Only JPEG, PNG and GIF images are allowed".to_string(),
                )
            })?;

        let mut buffer: Vec<u8> = Vec::new();
        while let Some(chunk) = field.try_next().await.map_err(|e| {
            ApiError::ValidationError(format!("Failed to read upload: {}", e))
        })? {
            if buffer.len() + chunk.len() > MAX_PHOTO_BYTES {
                return Err(ApiError::ValidationError(
                    "Image exceeds the 5 MB upload limit".to_string(),
                ));
            }
            buffer.extend_from_slice(&chunk);
        }

        uploaded = Some((extension, buffer));
    }

    let (extension, bytes) = uploaded.ok_or_else(|| {
        ApiError::ValidationError("No photo file provided".to_string())
    })?;

    let file_name = format!("user-{}-{}.{}", auth.user_id, Uuid::new_v4(), extension);
    let disk_path = std::path::Path::new(&config.upload_dir).join(&file_name);

    web::block(move || std::fs::write(disk_path, bytes))
        .await
        .map_err(|e| {
            error!("Blocking operation error: {}", e);
            ApiError::InternalError(e.to_string())
        })?
        .map_err(|e| {
            error!("Failed to store uploaded photo: {}", e);
            ApiError::InternalError("Failed to store uploaded photo".to_string())
        })?;

    let profile = UserService::set_photo(auth.user_id, format!("/uploads/{}", file_name), &pool)
        .await?;
    info!("Photo updated for user {}", auth.user_id);

    Ok(HttpResponse::Ok().json(json!({
        "message": "Photo uploaded successfully",
        "user": profile
    })))
}

#[get("/resources")]
async fn list_resources(
    pool: web::Data<DbPool>,
    _auth: AuthUser,
    query: web::Query<ResourceFilter>,
) -> Result<HttpResponse, ApiError> {
    let resources = ResourceService::list(query.into_inner(), &pool).await?;
    Ok(HttpResponse::Ok().json(resources))
}

#[get("/resources/types")]
async fn resource_types(_auth: AuthUser) -> Result<HttpResponse, ApiError> {
    let types: Vec<_> = ResourceType::all()
        .iter()
        .map(|t| json!({ "value": t.as_str(), "label": t.label() }))
        .collect();
    Ok(HttpResponse::Ok().json(types))
}

#[get("/resources/{id}")]
async fn get_resource(
    pool: web::Data<DbPool>,
    _auth: AuthUser,
    path: web::Path<i32>,
) -> Result<HttpResponse, ApiError> {
    let resource = ResourceService::get(path.into_inner(), &pool).await?;
    Ok(HttpResponse::Ok().json(resource))
}

#[post("/resources")]
async fn create_resource(
    pool: web::Data<DbPool>,
    auth: AuthUser,
    data: web::Json<ResourceRequest>,
) -> Result<HttpResponse, ApiError> {
    require_role(&auth, &[Role::Admin, Role::OfficeStaff])?;

    let fields = validate_resource(data.into_inner())?;
    let resource_name = fields.name.clone();
    let resource_id = ResourceService::create(fields, &pool).await?;

    info!("Resource created: {} (ID: {})", resource_name, resource_id);

    Ok(HttpResponse::Created().json(json!({
        "message": "Resource created successfully",
        "resourceId": resource_id
    })))
}

#[put("/resources/{id}")]
async fn update_resource(
    pool: web::Data<DbPool>,
    auth: AuthUser,
    path: web::Path<i32>,
    data: web::Json<ResourceRequest>,
) -> Result<HttpResponse, ApiError> {
    require_role(&auth, &[Role::Admin, Role::OfficeStaff])?;

    let id = path.into_inner();
    let fields = validate_resource(data.into_inner())?;
    ResourceService::update(id, fields, &pool).await?;

    Ok(HttpResponse::Ok().json(json!({ "message": "Resource updated successfully" })))
}

#[delete("/resources/{id}")]
async fn delete_resource(
    pool: web::Data<DbPool>,
    auth: AuthUser,
    path: web::Path<i32>,
) -> Result<HttpResponse, ApiError> {
    require_role(&auth, &[Role::Admin])?;

    ResourceService::delete(path.into_inner(), &pool).await?;

    Ok(HttpResponse::Ok().json(json!({ "message": "Resource deleted successfully" })))
}

#[get("/dashboard/stats")]
async fn dashboard_stats(
    pool: web::Data<DbPool>,
    auth: AuthUser,
) -> Result<HttpResponse, ApiError> {
    match auth.role {
        Role::Student => {
            let stats = DashboardService::student_stats(auth.user_id, &pool).await?;
            Ok(HttpResponse::Ok().json(stats))
        }
        Role::Lecturer => {
            let stats = DashboardService::lecturer_stats(auth.user_id, &pool).await?;
            Ok(HttpResponse::Ok().json(stats))
        }
        Role::OfficeStaff => {
            let stats = DashboardService::office_staff_stats(&pool).await?;
            Ok(HttpResponse::Ok().json(stats))
        }
        Role::Admin => {
            let stats = DashboardService::admin_stats(&pool).await?;
            Ok(HttpResponse::Ok().json(stats))
        }
    }
}

#[get("/dashboard/recent-bookings")]
async fn recent_bookings(
    pool: web::Data<DbPool>,
    auth: AuthUser,
) -> Result<HttpResponse, ApiError> {
    match auth.role {
        Role::Admin | Role::OfficeStaff => {
            let bookings = DashboardService::recent_for_staff(&pool).await?;
            Ok(HttpResponse::Ok().json(bookings))
        }
        Role::Student | Role::Lecturer => {
            let bookings = DashboardService::recent_for_user(auth.user_id, &pool).await?;
            Ok(HttpResponse::Ok().json(bookings))
        }
    }
}

async fn not_found() -> HttpResponse {
    HttpResponse::NotFound().json(json!({ "message": "Route not found" }))
}

#[actix_web::main]
async fn main() -> std::io::Result<()> {
    // Load environment variables and initialize logger
    dotenvy::dotenv().ok();
    setup_logger();

    // Get host and port from environment or use defaults
    let host = env::var("HOST").unwrap_or_else(|_| "0.0.0.0".to_string());
    let port = env::var("PORT")
        .unwrap_or_else(|_| "5000".to_string())
        .parse::<u16>()
        .expect("PORT must be a number");

    // Connecting to database
    let db_url = env::var("DATABASE_URL").expect("DATABASE_URL must be set");
    info!("Connecting to database");

    // Initialize database schema
    let mut conn = PgConnection::establish(&db_url)
        .expect("Failed to establish connection for schema bootstrap");
    conn.batch_execute(DB_INIT_SQL)
        .expect("Failed to execute database initialization script");
    info!("Database initialization complete.");

    // Set up database connection pool
    let manager = ConnectionManager::<PgConnection>::new(db_url);
    let pool = r2d2::Pool::builder()
        .max_size(POOL_MAX_SIZE)
        .build(manager)
        .expect("Failed to create database connection pool");

    // Load and validate configuration
    let config = AppConfig::from_env();
    if let Err(e) = config.validate() {
        error!("Configuration validation error: {}", e);
        panic!("Invalid configuration: {}", e);
    }

    // Uploaded photos land here and are served back under /uploads
    std::fs::create_dir_all(&config.upload_dir)
        .expect("Failed to create upload directory");

    info!("Starting HTTP server at http://{}:{}", host, port);

    let server_config = config.clone();

    // Start HTTP server
    HttpServer::new(move || {
        let cors = Cors::default()
            .allowed_origin(&server_config.cors_origin)
            .allowed_methods(vec!["GET", "POST", "PUT", "DELETE"])
            .allowed_headers(vec![header::CONTENT_TYPE, header::AUTHORIZATION])
            .supports_credentials();

        App::new()
            // Enable request logger middleware
            .wrap(RequestLogger)
            .wrap(cors)
            // Register app data
            .app_data(web::Data::new(pool.clone()))
            .app_data(web::Data::new(server_config.clone()))
            // Static files for uploads
            .service(Files::new("/uploads", &server_config.upload_dir))
            // API routes
            .service(
                web::scope("/api")
                    .service(health_check)
                    .service(register)
                    .service(login)
                    .service(current_user)
                    .service(edit_profile)
                    .service(upload_photo)
                    // Registered before /resources/{id} so "types" is not
                    // parsed as an id
                    .service(resource_types)
                    .service(list_resources)
                    .service(create_resource)
                    .service(get_resource)
                    .service(update_resource)
                    .service(delete_resource)
                    .service(dashboard_stats)
                    .service(recent_bookings)
            )
            .default_service(web::route().to(not_found))
    })
    .workers(2) // Specify number of workers
    .keep_alive(std::time::Duration::from_secs(75)) // Configure keep-alive
    .shutdown_timeout(30) // Graceful shutdown timeout in seconds
    .bind((host, port))?
    .run()
    .await
}

#[cfg(test)]
mod tests {
    use super::*;
    use actix_web::test;

    #[actix_web::test]
    async fn health_endpoint_reports_ok() {
        let app = test::init_service(
            App::new().service(web::scope("/api").service(health_check)),
        )
        .await;

        let req = test::TestRequest::get().uri("/api/health").to_request();
        let resp = test::call_service(&app, req).await;
        assert!(resp.status().is_success());

        let body: serde_json::Value = test::read_body_json(resp).await;
        assert_eq!(body["status"], "ok");
        assert!(body["version"].as_str().is_some());
    }

    #[actix_web::test]
    async fn unmatched_routes_get_a_json_404() {
        let app = test::init_service(
            App::new()
                .service(web::scope("/api").service(health_check))
                .default_service(web::route().to(not_found)),
        )
        .await;

        let req = test::TestRequest::get().uri("/api/no-such-route").to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), actix_web::http::StatusCode::NOT_FOUND);

        let body: serde_json::Value = test::read_body_json(resp).await;
        assert_eq!(body["message"], "Route not found");
    }

    #[::core::prelude::v1::test]
    fn non_empty_trims_and_filters() {
        assert_eq!(non_empty(Some("  a@x.com ")), Some("a@x.com"));
        assert_eq!(non_empty(Some("   ")), None);
        assert_eq!(non_empty(Some("")), None);
        assert_eq!(non_empty(None), None);
    }

    fn resource_request(
        name: Option<&str>,
        type_name: Option<&str>,
        location: Option<&str>,
    ) -> ResourceRequest {
        ResourceRequest {
            name: name.map(String::from),
            resource_type: type_name.map(String::from),
            location: location.map(String::from),
            capacity: None,
            description: None,
            department_id: None,
            availability: None,
        }
    }

    #[::core::prelude::v1::test]
    fn resource_validation_requires_the_core_fields() {
        for request in [
            resource_request(None, Some("lab"), Some("Block B")),
            resource_request(Some("Physics Lab"), None, Some("Block B")),
            resource_request(Some("Physics Lab"), Some("lab"), None),
            resource_request(Some(""), Some("lab"), Some("Block B")),
        ] {
            match validate_resource(request) {
                Err(ApiError::ValidationError(msg)) => {
                    assert_eq!(msg, "Please provide name, type, and location")
                }
                other => panic!("unexpected result: {:?}", other),
            }
        }
    }

    #[::core::prelude::v1::test]
    fn resource_validation_rejects_unknown_types() {
        let request = resource_request(Some("Physics Lab"), Some("classroom"), Some("Block B"));
        match validate_resource(request) {
            Err(ApiError::ValidationError(msg)) => {
                assert!(msg.contains("Unknown resource type"))
            }
            other => panic!("unexpected result: {:?}", other),
        }
    }

    #[::core::prelude::v1::test]
    fn resource_validation_defaults_availability_to_true() {
        let fields =
            validate_resource(resource_request(Some("Physics Lab"), Some("lab"), Some("Block B")))
                .unwrap();
        assert!(fields.availability);
        assert_eq!(fields.resource_type, "lab");
        assert_eq!(fields.capacity, None);
    }
}
