use crate::config::{AppConfig, DbPool};
use crate::errors::ApiError;
use crate::models::*;
use actix_web::web;
use bcrypt::{hash, verify, DEFAULT_COST};
use chrono::{Duration, Utc};
use diesel::prelude::*;
use diesel::result::{DatabaseErrorInformation, DatabaseErrorKind};
use diesel::sql_query;
use diesel::sql_types::Integer;
use jsonwebtoken::errors::ErrorKind;
use jsonwebtoken::{decode, encode, DecodingKey, EncodingKey, Header, Validation};
use log::{debug, error, info};

pub struct AuthService;

impl AuthService {
    pub fn hash_password(password: &str) -> Result<String, ApiError> {
        hash(password, DEFAULT_COST)
            .map_err(|e| {
                error!("Failed to hash password: {}", e);
                ApiError::InternalError("Failed to hash password".to_string())
            })
    }

    pub fn verify_password(password: &str, hash: &str) -> Result<bool, ApiError> {
        verify(password, hash)
            .map_err(|e| {
                error!("Failed to verify password: {}", e);
                ApiError::InternalError("Failed to verify password".to_string())
            })
    }

    pub fn generate_token(
        user_id: i32,
        email: &str,
        role: &str,
        config: &AppConfig,
    ) -> Result<String, ApiError> {
        let now = Utc::now();
        let iat = now.timestamp() as usize;
        let exp = (now + Duration::hours(config.jwt_expiry)).timestamp() as usize;

        let claims = Claims {
            sub: user_id.to_string(),
            exp,
            iat,
            user_id,
            email: email.to_string(),
            role: role.to_string(),
        };

        encode(
            &Header::default(),
            &claims,
            &EncodingKey::from_secret(config.jwt_secret.as_bytes())
        )
        .map_err(|e| {
            error!("Failed to generate token: {}", e);
            ApiError::InternalError("Failed to generate token".to_string())
        })
    }

    /// Expired tokens are reported distinctly from malformed or re-signed
    /// ones so clients know a fresh login will fix it.
    pub fn decode_token(token: &str, config: &AppConfig) -> Result<Claims, ApiError> {
        decode::<Claims>(
            token,
            &DecodingKey::from_secret(config.jwt_secret.as_bytes()),
            &Validation::default(),
        )
        .map(|data| data.claims)
        .map_err(|e| match e.kind() {
            ErrorKind::ExpiredSignature => {
                ApiError::AuthError("Token has expired. Please login again.".to_string())
            }
            _ => {
                debug!("Token rejected: {}", e);
                ApiError::AuthError("Invalid token. Please login again.".to_string())
            }
        })
    }
}

pub struct UserService;

impl UserService {
    pub async fn find_by_email(email_addr: &str, pool: &DbPool) -> Result<Option<UserAccount>, ApiError> {
        let email_copy = email_addr.to_string();
        let conn = pool.get()
            .map_err(|e| {
                error!("Failed to get database connection: {}", e);
                ApiError::DatabaseError(e.to_string())
            })?;

        let user = web::block(move || {
            use crate::schema::users::dsl::*;
            let mut conn = conn;
            users
                .filter(email.eq(email_copy))
                .first::<UserAccount>(&mut conn)
                .optional()
        })
        .await
        .map_err(|e| {
            error!("Database operation error: {}", e);
            ApiError::DatabaseError(e.to_string())
        })?
        .map_err(|e| {
            error!("Error finding user by email: {}", e);
            ApiError::DatabaseError(e.to_string())
        })?;

        Ok(user)
    }

    pub async fn create_user(new_user: NewUser, pool: &DbPool) -> Result<i32, ApiError> {
        let email_copy = new_user.email.clone();
        let conn = pool.get()
            .map_err(|e| {
                error!("Failed to get database connection: {}", e);
                ApiError::DatabaseError(e.to_string())
            })?;

        let created_id = web::block(move || {
            use crate::schema::users::dsl::*;
            let mut conn = conn;
            diesel::insert_into(users)
                .values(&new_user)
                .returning(user_id)
                .get_result::<i32>(&mut conn)
        })
        .await
        .map_err(|e| {
            error!("Database operation error: {}", e);
            ApiError::DatabaseError(e.to_string())
        })?
        .map_err(|e| match e {
            // The pre-insert existence check is advisory; the unique
            // constraint is what actually decides a registration race
            diesel::result::Error::DatabaseError(DatabaseErrorKind::UniqueViolation, info) => {
                debug!("Registration hit a uniqueness constraint for {}", email_copy);
                if info.constraint_name().map_or(false, |c| c.contains("registration_number")) {
                    ApiError::ConflictError("Registration number already in use".to_string())
                } else {
                    ApiError::ConflictError("User with this email already exists".to_string())
                }
            }
            other => {
                error!("Failed to create user: {}", other);
                ApiError::DatabaseError(other.to_string())
            }
        })?;

        info!("Created new user with ID: {}", created_id);
        Ok(created_id)
    }

    pub async fn get_profile(id: i32, pool: &DbPool) -> Result<UserProfile, ApiError> {
        let conn = pool.get()
            .map_err(|e| {
                error!("Failed to get database connection: {}", e);
                ApiError::DatabaseError(e.to_string())
            })?;

        let profile = web::block(move || {
            use crate::schema::users::dsl::*;
            let mut conn = conn;
            users
                .find(id)
                .select((
                    user_id,
                    name,
                    email,
                    role,
                    department_id,
                    registration_number,
                    national_id,
                    academic_year,
                    photo,
                    address,
                    contact_number,
                    birthday,
                    religion,
                    district,
                    created_at,
                ))
                .first::<UserProfile>(&mut conn)
                .optional()
        })
        .await
        .map_err(|e| {
            error!("Database operation error: {}", e);
            ApiError::DatabaseError(e.to_string())
        })?
        .map_err(|e| {
            error!("Failed to load profile: {}", e);
            ApiError::DatabaseError(e.to_string())
        })?;

        profile.ok_or_else(|| {
            debug!("User not found with ID {}", id);
            ApiError::NotFoundError("User not found".to_string())
        })
    }

    pub async fn update_profile(
        user_id_param: i32,
        changes: ProfileChanges,
        pool: &DbPool,
    ) -> Result<UserProfile, ApiError> {
        if changes.is_empty() {
            debug!("Empty profile update for user {}", user_id_param);
            return Self::get_profile(user_id_param, pool).await;
        }

        let conn = pool.get()
            .map_err(|e| {
                error!("Failed to get database connection: {}", e);
                ApiError::DatabaseError(e.to_string())
            })?;

        let updated = web::block(move || {
            use crate::schema::users::dsl::*;
            let mut conn = conn;
            diesel::update(users.find(user_id_param))
                .set(&changes)
                .execute(&mut conn)
        })
        .await
        .map_err(|e| {
            error!("Database operation error: {}", e);
            ApiError::DatabaseError(e.to_string())
        })?
        .map_err(|e| match e {
            diesel::result::Error::DatabaseError(DatabaseErrorKind::UniqueViolation, _) => {
                debug!("Profile update for user {} hit a uniqueness constraint", user_id_param);
                ApiError::ConflictError(
                    "Email or registration number already in use".to_string(),
                )
            }
            other => {
                error!("Failed to update profile: {}", other);
                ApiError::DatabaseError(other.to_string())
            }
        })?;

        if updated == 0 {
            return Err(ApiError::NotFoundError("User not found".to_string()));
        }

        Self::get_profile(user_id_param, pool).await
    }

    pub async fn set_photo(
        user_id_param: i32,
        photo_path: String,
        pool: &DbPool,
    ) -> Result<UserProfile, ApiError> {
        let conn = pool.get()
            .map_err(|e| {
                error!("Failed to get database connection: {}", e);
                ApiError::DatabaseError(e.to_string())
            })?;

        let updated = web::block(move || {
            use crate::schema::users::dsl::*;
            let mut conn = conn;
            diesel::update(users.find(user_id_param))
                .set(photo.eq(Some(photo_path)))
                .execute(&mut conn)
        })
        .await
        .map_err(|e| {
            error!("Database operation error: {}", e);
            ApiError::DatabaseError(e.to_string())
        })?
        .map_err(|e| {
            error!("Failed to store photo reference: {}", e);
            ApiError::DatabaseError(e.to_string())
        })?;

        if updated == 0 {
            return Err(ApiError::NotFoundError("User not found".to_string()));
        }

        Self::get_profile(user_id_param, pool).await
    }

    /// Allow-list of accepted photo content types, mapped to the stored file
    /// extension.
    pub fn photo_extension(content_type: &str) -> Option<&'static str> {
        match content_type {
            "image/jpeg" => Some("jpg"),
            "image/png" => Some("png"),
            "image/gif" => Some("gif"),
            _ => None,
        }
    }
}

pub struct ResourceService;

impl ResourceService {
    pub async fn list(
        filter: ResourceFilter,
        pool: &DbPool,
    ) -> Result<Vec<ResourceWithDepartment>, ApiError> {
        let conn = pool.get()
            .map_err(|e| {
                error!("Failed to get database connection: {}", e);
                ApiError::DatabaseError(e.to_string())
            })?;

        let rows = web::block(move || {
            use crate::schema::{departments, resources};
            let mut conn = conn;

            let mut query = resources::table
                .left_join(departments::table)
                .select((resources::all_columns, departments::name.nullable()))
                .into_boxed();

            if let Some(type_filter) = filter.resource_type {
                query = query.filter(resources::type_.eq(type_filter));
            }
            if let Some(availability_filter) = filter.availability {
                query = query.filter(resources::availability.eq(availability_filter));
            }

            query
                .order(resources::created_at.desc())
                .load::<(Resource, Option<String>)>(&mut conn)
        })
        .await
        .map_err(|e| {
            error!("Database operation error: {}", e);
            ApiError::DatabaseError(e.to_string())
        })?
        .map_err(|e| {
            error!("Failed to list resources: {}", e);
            ApiError::DatabaseError(e.to_string())
        })?;

        debug!("Listed {} resources", rows.len());
        Ok(rows
            .into_iter()
            .map(|(resource, department_name)| ResourceWithDepartment { resource, department_name })
            .collect())
    }

    pub async fn get(id: i32, pool: &DbPool) -> Result<ResourceWithDepartment, ApiError> {
        let conn = pool.get()
            .map_err(|e| {
                error!("Failed to get database connection: {}", e);
                ApiError::DatabaseError(e.to_string())
            })?;

        let row = web::block(move || {
            use crate::schema::{departments, resources};
            let mut conn = conn;
            resources::table
                .left_join(departments::table)
                .select((resources::all_columns, departments::name.nullable()))
                .filter(resources::resource_id.eq(id))
                .first::<(Resource, Option<String>)>(&mut conn)
                .optional()
        })
        .await
        .map_err(|e| {
            error!("Database operation error: {}", e);
            ApiError::DatabaseError(e.to_string())
        })?
        .map_err(|e| {
            error!("Failed to load resource: {}", e);
            ApiError::DatabaseError(e.to_string())
        })?;

        row.map(|(resource, department_name)| ResourceWithDepartment { resource, department_name })
            .ok_or_else(|| {
                debug!("Resource not found with ID {}", id);
                ApiError::NotFoundError("Resource not found".to_string())
            })
    }

    pub async fn create(fields: ResourceFields, pool: &DbPool) -> Result<i32, ApiError> {
        let conn = pool.get()
            .map_err(|e| {
                error!("Failed to get database connection: {}", e);
                ApiError::DatabaseError(e.to_string())
            })?;

        let created_id = web::block(move || {
            use crate::schema::resources::dsl::*;
            let mut conn = conn;
            diesel::insert_into(resources)
                .values(&fields)
                .returning(resource_id)
                .get_result::<i32>(&mut conn)
        })
        .await
        .map_err(|e| {
            error!("Database operation error: {}", e);
            ApiError::DatabaseError(e.to_string())
        })?
        .map_err(|e| {
            error!("Failed to create resource: {}", e);
            ApiError::DatabaseError(e.to_string())
        })?;

        info!("Resource created with ID: {}", created_id);
        Ok(created_id)
    }

    /// Full-field overwrite: the caller supplies the complete resource and
    /// absent optional fields become NULL.
    pub async fn update(id: i32, fields: ResourceFields, pool: &DbPool) -> Result<(), ApiError> {
        let conn = pool.get()
            .map_err(|e| {
                error!("Failed to get database connection: {}", e);
                ApiError::DatabaseError(e.to_string())
            })?;

        let updated = web::block(move || {
            use crate::schema::resources::dsl::*;
            let mut conn = conn;
            diesel::update(resources.find(id))
                .set(&fields)
                .execute(&mut conn)
        })
        .await
        .map_err(|e| {
            error!("Database operation error: {}", e);
            ApiError::DatabaseError(e.to_string())
        })?
        .map_err(|e| {
            error!("Failed to update resource: {}", e);
            ApiError::DatabaseError(e.to_string())
        })?;

        if updated == 0 {
            debug!("Resource not found with ID {}", id);
            return Err(ApiError::NotFoundError("Resource not found".to_string()));
        }

        info!("Resource updated: ID {}", id);
        Ok(())
    }

    pub async fn delete(id: i32, pool: &DbPool) -> Result<(), ApiError> {
        let conn = pool.get()
            .map_err(|e| {
                error!("Failed to get database connection: {}", e);
                ApiError::DatabaseError(e.to_string())
            })?;

        let exists = web::block(move || {
            use crate::schema::resources::dsl::*;
            let mut conn = conn;
            resources
                .find(id)
                .select(resource_id)
                .first::<i32>(&mut conn)
                .optional()
        })
        .await
        .map_err(|e| {
            error!("Database operation error: {}", e);
            ApiError::DatabaseError(e.to_string())
        })?
        .map_err(|e| {
            error!("Failed to check resource: {}", e);
            ApiError::DatabaseError(e.to_string())
        })?;

        if exists.is_none() {
            debug!("Resource not found with ID {}", id);
            return Err(ApiError::NotFoundError("Resource not found".to_string()));
        }

        let conn = pool.get()
            .map_err(|e| {
                error!("Failed to get database connection: {}", e);
                ApiError::DatabaseError(e.to_string())
            })?;

        let approved_count = web::block(move || {
            use crate::schema::bookings::dsl::*;
            let mut conn = conn;
            bookings
                .filter(resource_id.eq(id))
                .filter(status.eq(BookingStatus::Approved.as_str()))
                .count()
                .get_result::<i64>(&mut conn)
        })
        .await
        .map_err(|e| {
            error!("Database operation error: {}", e);
            ApiError::DatabaseError(e.to_string())
        })?
        .map_err(|e| {
            error!("Failed to count bookings for resource: {}", e);
            ApiError::DatabaseError(e.to_string())
        })?;

        if approved_count > 0 {
            debug!("Delete blocked: resource {} has {} approved bookings", id, approved_count);
            return Err(ApiError::ConflictError(
                "Cannot delete resource with active bookings. Please cancel bookings first."
                    .to_string(),
            ));
        }

        let conn = pool.get()
            .map_err(|e| {
                error!("Failed to get database connection: {}", e);
                ApiError::DatabaseError(e.to_string())
            })?;

        web::block(move || {
            use crate::schema::resources::dsl::*;
            let mut conn = conn;
            diesel::delete(resources.find(id)).execute(&mut conn)
        })
        .await
        .map_err(|e| {
            error!("Database operation error: {}", e);
            ApiError::DatabaseError(e.to_string())
        })?
        .map_err(|e| {
            error!("Failed to delete resource: {}", e);
            ApiError::DatabaseError(e.to_string())
        })?;

        info!("Resource deleted: ID {}", id);
        Ok(())
    }
}

/// Read-only aggregates, recomputed in full on every call.
pub struct DashboardService;

impl DashboardService {
    pub async fn student_stats(user_id_param: i32, pool: &DbPool) -> Result<StudentStats, ApiError> {
        let conn = pool.get()
            .map_err(|e| {
                error!("Failed to get database connection: {}", e);
                ApiError::DatabaseError(e.to_string())
            })?;

        type StudentRows = (OwnBookingCounts, Vec<UpcomingBooking>, CountRow);
        let (counts, upcoming, available) =
            web::block(move || -> diesel::QueryResult<StudentRows> {
                let mut conn = conn;
                let counts = sql_query(
                    "SELECT COUNT(*) AS total_bookings, \
                     COUNT(*) FILTER (WHERE status = 'pending') AS pending_bookings, \
                     COUNT(*) FILTER (WHERE status = 'approved') AS approved_bookings \
                     FROM bookings WHERE user_id = $1",
                )
                .bind::<Integer, _>(user_id_param)
                .get_result::<OwnBookingCounts>(&mut conn)?;

                let upcoming = sql_query(
                    "SELECT b.booking_id, b.resource_id, b.start_time, b.end_time, b.status, \
                     r.name AS resource_name, r.type AS resource_type, r.location \
                     FROM bookings b \
                     JOIN resources r ON b.resource_id = r.resource_id \
                     WHERE b.user_id = $1 AND b.start_time > NOW() AND b.status = 'approved' \
                     ORDER BY b.start_time LIMIT 5",
                )
                .bind::<Integer, _>(user_id_param)
                .load::<UpcomingBooking>(&mut conn)?;

                let available = sql_query(
                    "SELECT COUNT(*) AS count FROM resources WHERE availability = TRUE",
                )
                .get_result::<CountRow>(&mut conn)?;

                Ok((counts, upcoming, available))
            })
            .await
            .map_err(|e| {
                error!("Database operation error: {}", e);
                ApiError::DatabaseError(e.to_string())
            })?
            .map_err(|e| {
                error!("Failed to compute student stats: {}", e);
                ApiError::DatabaseError(e.to_string())
            })?;

        Ok(StudentStats {
            total_bookings: counts.total_bookings,
            pending_bookings: counts.pending_bookings,
            approved_bookings: counts.approved_bookings,
            upcoming_bookings: upcoming,
            available_resources: available.count,
        })
    }

    pub async fn lecturer_stats(user_id_param: i32, pool: &DbPool) -> Result<LecturerStats, ApiError> {
        let conn = pool.get()
            .map_err(|e| {
                error!("Failed to get database connection: {}", e);
                ApiError::DatabaseError(e.to_string())
            })?;

        type LecturerRows = (OwnBookingCounts, Vec<UpcomingBooking>);
        let (counts, upcoming) = web::block(move || -> diesel::QueryResult<LecturerRows> {
            let mut conn = conn;
            let counts = sql_query(
                "SELECT COUNT(*) AS total_bookings, \
                 COUNT(*) FILTER (WHERE status = 'pending') AS pending_bookings, \
                 COUNT(*) FILTER (WHERE status = 'approved') AS approved_bookings \
                 FROM bookings WHERE user_id = $1",
            )
            .bind::<Integer, _>(user_id_param)
            .get_result::<OwnBookingCounts>(&mut conn)?;

            let upcoming = sql_query(
                "SELECT b.booking_id, b.resource_id, b.start_time, b.end_time, b.status, \
                 r.name AS resource_name, r.type AS resource_type, r.location \
                 FROM bookings b \
                 JOIN resources r ON b.resource_id = r.resource_id \
                 WHERE b.user_id = $1 AND b.start_time > NOW() AND b.status = 'approved' \
                 ORDER BY b.start_time LIMIT 5",
            )
            .bind::<Integer, _>(user_id_param)
            .load::<UpcomingBooking>(&mut conn)?;

            Ok((counts, upcoming))
        })
        .await
        .map_err(|e| {
            error!("Database operation error: {}", e);
            ApiError::DatabaseError(e.to_string())
        })?
        .map_err(|e| {
            error!("Failed to compute lecturer stats: {}", e);
            ApiError::DatabaseError(e.to_string())
        })?;

        Ok(LecturerStats {
            total_bookings: counts.total_bookings,
            approved_bookings: counts.approved_bookings,
            upcoming_bookings: upcoming,
        })
    }

    pub async fn office_staff_stats(pool: &DbPool) -> Result<OfficeStaffStats, ApiError> {
        let conn = pool.get()
            .map_err(|e| {
                error!("Failed to get database connection: {}", e);
                ApiError::DatabaseError(e.to_string())
            })?;

        type StaffRows = (Vec<BookingRecord>, BookingStatusTotals, Vec<ResourceUtilization>);
        let (pending, totals, utilization) =
            web::block(move || -> diesel::QueryResult<StaffRows> {
                let mut conn = conn;
                let pending = sql_query(
                    "SELECT b.booking_id, b.user_id, b.resource_id, b.start_time, b.end_time, \
                     b.status, b.created_at, r.name AS resource_name, u.name AS user_name \
                     FROM bookings b \
                     JOIN resources r ON b.resource_id = r.resource_id \
                     JOIN users u ON b.user_id = u.user_id \
                     WHERE b.status = 'pending' \
                     ORDER BY b.created_at DESC \
                     LIMIT 10",
                )
                .load::<BookingRecord>(&mut conn)?;

                let totals = sql_query(
                    "SELECT COUNT(*) AS total_bookings, \
                     COUNT(*) FILTER (WHERE status = 'pending') AS pending_count, \
                     COUNT(*) FILTER (WHERE status = 'approved') AS approved_count, \
                     COUNT(*) FILTER (WHERE status = 'rejected') AS rejected_count \
                     FROM bookings",
                )
                .get_result::<BookingStatusTotals>(&mut conn)?;

                let utilization = sql_query(
                    "SELECT r.name, r.type AS resource_type, COUNT(b.booking_id) AS booking_count \
                     FROM resources r \
                     JOIN bookings b ON r.resource_id = b.resource_id \
                     WHERE b.status = 'approved' AND b.start_time >= NOW() - INTERVAL '30 days' \
                     GROUP BY r.resource_id, r.name, r.type \
                     ORDER BY booking_count DESC \
                     LIMIT 5",
                )
                .load::<ResourceUtilization>(&mut conn)?;

                Ok((pending, totals, utilization))
            })
            .await
            .map_err(|e| {
                error!("Database operation error: {}", e);
                ApiError::DatabaseError(e.to_string())
            })?
            .map_err(|e| {
                error!("Failed to compute office staff stats: {}", e);
                ApiError::DatabaseError(e.to_string())
            })?;

        Ok(OfficeStaffStats {
            pending_approvals: pending,
            booking_stats: totals,
            resource_utilization: utilization,
        })
    }

    pub async fn admin_stats(pool: &DbPool) -> Result<AdminStats, ApiError> {
        let conn = pool.get()
            .map_err(|e| {
                error!("Failed to get database connection: {}", e);
                ApiError::DatabaseError(e.to_string())
            })?;

        type AdminRows = (SystemOverview, Vec<RoleCount>, Vec<BookingRecord>);
        let (overview, by_role, recent) =
            web::block(move || -> diesel::QueryResult<AdminRows> {
                let mut conn = conn;
                let overview = sql_query(
                    "SELECT \
                     (SELECT COUNT(*) FROM users) AS total_users, \
                     (SELECT COUNT(*) FROM resources) AS total_resources, \
                     (SELECT COUNT(*) FROM bookings) AS total_bookings, \
                     (SELECT COUNT(*) FROM bookings WHERE status = 'pending') AS pending_bookings",
                )
                .get_result::<SystemOverview>(&mut conn)?;

                let by_role = sql_query(
                    "SELECT role, COUNT(*) AS count FROM users GROUP BY role ORDER BY role",
                )
                .load::<RoleCount>(&mut conn)?;

                let recent = sql_query(
                    "SELECT b.booking_id, b.user_id, b.resource_id, b.start_time, b.end_time, \
                     b.status, b.created_at, r.name AS resource_name, u.name AS user_name \
                     FROM bookings b \
                     JOIN resources r ON b.resource_id = r.resource_id \
                     JOIN users u ON b.user_id = u.user_id \
                     ORDER BY b.created_at DESC \
                     LIMIT 10",
                )
                .load::<BookingRecord>(&mut conn)?;

                Ok((overview, by_role, recent))
            })
            .await
            .map_err(|e| {
                error!("Database operation error: {}", e);
                ApiError::DatabaseError(e.to_string())
            })?
            .map_err(|e| {
                error!("Failed to compute admin stats: {}", e);
                ApiError::DatabaseError(e.to_string())
            })?;

        Ok(AdminStats {
            system_overview: overview,
            users_by_role: by_role,
            recent_activity: recent,
        })
    }

    pub async fn recent_for_staff(pool: &DbPool) -> Result<Vec<BookingRecord>, ApiError> {
        let conn = pool.get()
            .map_err(|e| {
                error!("Failed to get database connection: {}", e);
                ApiError::DatabaseError(e.to_string())
            })?;

        let rows = web::block(move || {
            let mut conn = conn;
            sql_query(
                "SELECT b.booking_id, b.user_id, b.resource_id, b.start_time, b.end_time, \
                 b.status, b.created_at, r.name AS resource_name, u.name AS user_name \
                 FROM bookings b \
                 JOIN resources r ON b.resource_id = r.resource_id \
                 JOIN users u ON b.user_id = u.user_id \
                 ORDER BY b.created_at DESC \
                 LIMIT 20",
            )
            .load::<BookingRecord>(&mut conn)
        })
        .await
        .map_err(|e| {
            error!("Database operation error: {}", e);
            ApiError::DatabaseError(e.to_string())
        })?
        .map_err(|e| {
            error!("Failed to list recent bookings: {}", e);
            ApiError::DatabaseError(e.to_string())
        })?;

        Ok(rows)
    }

    pub async fn recent_for_user(
        user_id_param: i32,
        pool: &DbPool,
    ) -> Result<Vec<OwnBookingRecord>, ApiError> {
        let conn = pool.get()
            .map_err(|e| {
                error!("Failed to get database connection: {}", e);
                ApiError::DatabaseError(e.to_string())
            })?;

        let rows = web::block(move || {
            let mut conn = conn;
            sql_query(
                "SELECT b.booking_id, b.user_id, b.resource_id, b.start_time, b.end_time, \
                 b.status, b.created_at, r.name AS resource_name \
                 FROM bookings b \
                 JOIN resources r ON b.resource_id = r.resource_id \
                 WHERE b.user_id = $1 \
                 ORDER BY b.created_at DESC \
                 LIMIT 10",
            )
            .bind::<Integer, _>(user_id_param)
            .load::<OwnBookingRecord>(&mut conn)
        })
        .await
        .map_err(|e| {
            error!("Database operation error: {}", e);
            ApiError::DatabaseError(e.to_string())
        })?
        .map_err(|e| {
            error!("Failed to list recent bookings: {}", e);
            ApiError::DatabaseError(e.to_string())
        })?;

        Ok(rows)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_config() -> AppConfig {
        AppConfig {
            jwt_secret: "test-secret".to_string(),
            jwt_expiry: 1,
            upload_dir: "uploads".to_string(),
            cors_origin: "http://localhost:3000".to_string(),
        }
    }

    #[test]
    fn password_hash_round_trips() {
        let hashed = AuthService::hash_password("pw123456").unwrap();
        assert_ne!(hashed, "pw123456");
        assert!(AuthService::verify_password("pw123456", &hashed).unwrap());
        assert!(!AuthService::verify_password("pw123457", &hashed).unwrap());
    }

    #[test]
    fn token_round_trips_identity_and_role() {
        let config = test_config();
        let token = AuthService::generate_token(7, "a@x.com", "lecturer", &config).unwrap();
        let claims = AuthService::decode_token(&token, &config).unwrap();
        assert_eq!(claims.user_id, 7);
        assert_eq!(claims.sub, "7");
        assert_eq!(claims.email, "a@x.com");
        assert_eq!(claims.role, "lecturer");
        assert!(claims.exp > claims.iat);
    }

    #[test]
    fn expired_token_is_rejected_distinctly() {
        let config = test_config();
        let now = Utc::now();
        let claims = Claims {
            sub: "7".to_string(),
            exp: (now - Duration::hours(2)).timestamp() as usize,
            iat: (now - Duration::hours(3)).timestamp() as usize,
            user_id: 7,
            email: "a@x.com".to_string(),
            role: "student".to_string(),
        };
        let token = encode(
            &Header::default(),
            &claims,
            &EncodingKey::from_secret(config.jwt_secret.as_bytes()),
        )
        .unwrap();

        match AuthService::decode_token(&token, &config) {
            Err(ApiError::AuthError(msg)) => {
                assert_eq!(msg, "Token has expired. Please login again.")
            }
            other => panic!("unexpected result: {:?}", other),
        }
    }

    #[test]
    fn tampered_token_is_invalid() {
        let config = test_config();
        let token = AuthService::generate_token(7, "a@x.com", "student", &config).unwrap();
        let tampered = format!("{}x", token);

        match AuthService::decode_token(&tampered, &config) {
            Err(ApiError::AuthError(msg)) => {
                assert_eq!(msg, "Invalid token. Please login again.")
            }
            other => panic!("unexpected result: {:?}", other),
        }
    }

    #[test]
    fn token_signed_with_another_secret_is_invalid() {
        let config = test_config();
        let mut other = test_config();
        other.jwt_secret = "another-secret".to_string();

        let token = AuthService::generate_token(7, "a@x.com", "student", &other).unwrap();
        match AuthService::decode_token(&token, &config) {
            Err(ApiError::AuthError(msg)) => {
                assert_eq!(msg, "Invalid token. Please login again.")
            }
            other => panic!("unexpected result: {:?}", other),
        }
    }

    #[test]
    fn photo_extension_admits_only_the_allow_list() {
        assert_eq!(UserService::photo_extension("image/jpeg"), Some("jpg"));
        assert_eq!(UserService::photo_extension("image/png"), Some("png"));
        assert_eq!(UserService::photo_extension("image/gif"), Some("gif"));
        assert_eq!(UserService::photo_extension("image/webp"), None);
        assert_eq!(UserService::photo_extension("text/plain"), None);
        assert_eq!(UserService::photo_extension(""), None);
    }
}
