pub const MAX_MESSAGE_LENGTH: usize = 140;
pub const FEED_LIMIT: i64 = 100;
pub const MAX_BIO_LENGTH: usize = 500;
pub const MAX_LOCATION_LENGTH: usize = 100;
pub const MIN_USERNAME_LENGTH: usize = 3;
pub const MAX_USERNAME_LENGTH: usize = 50;
pub const MIN_PASSWORD_LENGTH: usize = 6;

pub const DEFAULT_IMAGE_URL: &str = "/static/images/default-pic.png";
pub const DEFAULT_HEADER_IMAGE_URL: &str = "/static/images/default-header.jpg";

pub fn database_url() -> String {
    std::env::var("CHIRP_DATABASE_URL").unwrap_or_else(|_| "sqlite:chirp.db".to_string())
}

pub fn bind_address() -> String {
    std::env::var("CHIRP_BIND_ADDRESS").unwrap_or_else(|_| "0.0.0.0:8080".to_string())
}

pub fn token_expiration_hours() -> i64 {
    std::env::var("CHIRP_TOKEN_EXPIRATION_HOURS")
        .ok()
        .and_then(|v| v.parse::<i64>().ok())
        .unwrap_or(24)
}

/// CSRF checking is on unless explicitly disabled for local tooling.
pub fn csrf_enforced() -> bool {
    !matches!(
        std::env::var("CHIRP_CSRF_DISABLED").as_deref(),
        Ok("1") | Ok("true")
    )
}
