use diesel::r2d2::{self, ConnectionManager};
use diesel::pg::PgConnection;
use std::env;
use log::warn;
use rand::{thread_rng, Rng};
use rand::distributions::Alphanumeric;

// Type aliases
pub type DbPool = r2d2::Pool<ConnectionManager<PgConnection>>;

/// Upper bound on concurrent database connections; callers queue on the pool
/// (with its timeout) when all are checked out.
pub const POOL_MAX_SIZE: u32 = 10;

/// Hard ceiling for uploaded profile photos.
pub const MAX_PHOTO_BYTES: usize = 5 * 1024 * 1024;

// Database initialization SQL - idempotent, runs on every startup
pub const DB_INIT_SQL: &str = r#"
-- Create tables if they don't exist
CREATE TABLE IF NOT EXISTS departments (
    department_id SERIAL PRIMARY KEY,
    name VARCHAR(100) UNIQUE NOT NULL
);

CREATE TABLE IF NOT EXISTS users (
    user_id SERIAL PRIMARY KEY,
    name VARCHAR(100) NOT NULL,
    email VARCHAR(255) UNIQUE NOT NULL,
    password VARCHAR(255) NOT NULL,
    role VARCHAR(50) NOT NULL DEFAULT 'student',
    department_id INTEGER,
    registration_number VARCHAR(50) UNIQUE,
    national_id VARCHAR(50),
    academic_year VARCHAR(20),
    photo VARCHAR(255),
    address VARCHAR(255),
    contact_number VARCHAR(50),
    birthday DATE,
    religion VARCHAR(50),
    district VARCHAR(100),
    created_at TIMESTAMP NOT NULL DEFAULT NOW()
);

CREATE TABLE IF NOT EXISTS resources (
    resource_id SERIAL PRIMARY KEY,
    name VARCHAR(100) NOT NULL,
    type VARCHAR(50) NOT NULL,
    location VARCHAR(255) NOT NULL,
    capacity INTEGER,
    description TEXT,
    department_id INTEGER,
    availability BOOLEAN NOT NULL DEFAULT TRUE,
    created_at TIMESTAMP NOT NULL DEFAULT NOW()
);

CREATE TABLE IF NOT EXISTS bookings (
    booking_id SERIAL PRIMARY KEY,
    user_id INTEGER NOT NULL,
    resource_id INTEGER NOT NULL,
    start_time TIMESTAMP NOT NULL,
    end_time TIMESTAMP NOT NULL,
    status VARCHAR(20) NOT NULL DEFAULT 'pending',
    created_at TIMESTAMP NOT NULL DEFAULT NOW()
);

-- Add foreign keys if not exist
DO $$
BEGIN
    IF NOT EXISTS (
        SELECT 1 FROM pg_constraint WHERE conname = 'fk_users_department'
    ) THEN
        ALTER TABLE users ADD CONSTRAINT fk_users_department
        FOREIGN KEY (department_id) REFERENCES departments(department_id) ON DELETE SET NULL;
    END IF;

    IF NOT EXISTS (
        SELECT 1 FROM pg_constraint WHERE conname = 'fk_resources_department'
    ) THEN
        ALTER TABLE resources ADD CONSTRAINT fk_resources_department
        FOREIGN KEY (department_id) REFERENCES departments(department_id) ON DELETE SET NULL;
    END IF;

    IF NOT EXISTS (
        SELECT 1 FROM pg_constraint WHERE conname = 'fk_bookings_user'
    ) THEN
        ALTER TABLE bookings ADD CONSTRAINT fk_bookings_user
        FOREIGN KEY (user_id) REFERENCES users(user_id) ON DELETE CASCADE;
    END IF;

    IF NOT EXISTS (
        SELECT 1 FROM pg_constraint WHERE conname = 'fk_bookings_resource'
    ) THEN
        ALTER TABLE bookings ADD CONSTRAINT fk_bookings_resource
        FOREIGN KEY (resource_id) REFERENCES resources(resource_id) ON DELETE CASCADE;
    END IF;
END $$;

-- Dashboard queries aggregate by status and by owner
CREATE INDEX IF NOT EXISTS idx_bookings_status ON bookings (status);
CREATE INDEX IF NOT EXISTS idx_bookings_user ON bookings (user_id);

-- Insert initial departments if not exist
INSERT INTO departments (name)
VALUES
    ('Computer Science'),
    ('Engineering'),
    ('Science'),
    ('Business')
ON CONFLICT (name) DO NOTHING;
"#;

// Config
#[derive(Clone, Debug)]
pub struct AppConfig {
    pub jwt_secret: String,
    pub jwt_expiry: i64, // In hours
    pub upload_dir: String,
    pub cors_origin: String,
}

impl AppConfig {
    pub fn from_env() -> Self {
        dotenvy::dotenv().ok();

        let jwt_secret = match env::var("JWT_SECRET") {
            Ok(val) => val,
            Err(e) => {
                warn!("Failed to load JWT_SECRET: {}", e);
                warn!("Using a generated secret - tokens will not survive a restart!");
                Self::generate_secure_secret()
            }
        };

        let jwt_expiry = env::var("JWT_EXPIRY_HOURS")
            .ok()
            .and_then(|v| v.parse::<i64>().ok())
            .unwrap_or(24);

        let upload_dir = env::var("UPLOAD_DIR").unwrap_or_else(|_| "uploads".to_string());

        let cors_origin =
            env::var("CORS_ORIGIN").unwrap_or_else(|_| "http://localhost:3000".to_string());

        Self { jwt_secret, jwt_expiry, upload_dir, cors_origin }
    }

    pub fn validate(&self) -> Result<(), String> {
        if self.jwt_secret.is_empty() {
            return Err("JWT_SECRET must not be empty".to_string());
        }

        if self.jwt_expiry <= 0 {
            return Err("JWT_EXPIRY_HOURS must be positive".to_string());
        }

        if self.upload_dir.is_empty() {
            return Err("UPLOAD_DIR must not be empty".to_string());
        }

        Ok(())
    }

    pub fn generate_secure_secret() -> String {
        thread_rng()
            .sample_iter(&Alphanumeric)
            .take(32)
            .map(char::from)
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_config() -> AppConfig {
        AppConfig {
            jwt_secret: "test-secret".to_string(),
            jwt_expiry: 24,
            upload_dir: "uploads".to_string(),
            cors_origin: "http://localhost:3000".to_string(),
        }
    }

    #[test]
    fn validate_accepts_sane_settings() {
        assert!(test_config().validate().is_ok());
    }

    #[test]
    fn validate_rejects_non_positive_expiry() {
        let mut config = test_config();
        config.jwt_expiry = 0;
        assert!(config.validate().is_err());
        config.jwt_expiry = -4;
        assert!(config.validate().is_err());
    }

    #[test]
    fn validate_rejects_empty_secret_and_upload_dir() {
        let mut config = test_config();
        config.jwt_secret = String::new();
        assert!(config.validate().is_err());

        let mut config = test_config();
        config.upload_dir = String::new();
        assert!(config.validate().is_err());
    }

    #[test]
    fn generated_secret_is_long_alphanumeric() {
        let secret = AppConfig::generate_secure_secret();
        assert_eq!(secret.len(), 32);
        assert!(secret.chars().all(|c| c.is_ascii_alphanumeric()));
        // Two draws colliding would mean the generator is broken
        assert_ne!(secret, AppConfig::generate_secure_secret());
    }
}
