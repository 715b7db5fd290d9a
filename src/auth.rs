use actix_web::{web, HttpRequest, HttpResponse};
use sqlx::SqlitePool;
use uuid::Uuid;

use crate::config;
use crate::core::errors::{ApiError, Result};
use crate::core::helpers::now_iso;
use crate::models::models::Session;
use crate::users;

pub async fn create_session(pool: &SqlitePool, user_id: &str) -> Result<Session> {
    let session = Session {
        token: Uuid::new_v4().to_string(),
        user_id: user_id.to_string(),
        csrf_token: Uuid::new_v4().to_string(),
        created_at: now_iso(),
    };

    sqlx::query("INSERT INTO sessions (token, user_id, csrf_token, created_at) VALUES (?1, ?2, ?3, ?4)")
        .bind(&session.token)
        .bind(&session.user_id)
        .bind(&session.csrf_token)
        .bind(&session.created_at)
        .execute(pool)
        .await?;

    Ok(session)
}

fn bearer_token(req: &HttpRequest) -> Option<&str> {
    req.headers()
        .get("Authorization")?
        .to_str()
        .ok()?
        .strip_prefix("Bearer ")
}

/// Resolve the session behind the request's bearer token, if any.
///
/// Expired tokens resolve to no session. A session row can only reference a
/// live user; account deletion cascades its rows away.
pub async fn session_for_request(pool: &SqlitePool, req: &HttpRequest) -> Result<Option<Session>> {
    let token = match bearer_token(req) {
        Some(t) => t,
        None => return Ok(None),
    };

    let session = sqlx::query_as::<_, Session>(
        "SELECT token, user_id, csrf_token, created_at FROM sessions WHERE token = ?1",
    )
    .bind(token)
    .fetch_optional(pool)
    .await?;

    let session = match session {
        Some(s) => s,
        None => return Ok(None),
    };

    if let Ok(created) = chrono::DateTime::parse_from_rfc3339(&session.created_at) {
        let now = chrono::Utc::now();
        let age_hours = (now - created.with_timezone(&chrono::Utc)).num_hours();
        if age_hours > config::token_expiration_hours() {
            return Ok(None);
        }
    }

    Ok(Some(session))
}

pub async fn require_session(pool: &SqlitePool, req: &HttpRequest) -> Result<Session> {
    session_for_request(pool, req)
        .await?
        .ok_or(ApiError::Unauthorized)
}

/// State-changing requests must echo the CSRF token issued with the session.
pub fn verify_csrf(session: &Session, req: &HttpRequest) -> Result<()> {
    if !config::csrf_enforced() {
        return Ok(());
    }

    let supplied = req
        .headers()
        .get("X-CSRF-Token")
        .and_then(|v| v.to_str().ok());

    if supplied == Some(session.csrf_token.as_str()) {
        Ok(())
    } else {
        Err(ApiError::Forbidden)
    }
}

// === HTTP Handlers ===

pub async fn login_user(
    pool: web::Data<SqlitePool>,
    body: web::Json<serde_json::Value>,
) -> Result<HttpResponse> {
    let username = body["username"].as_str().unwrap_or_default();
    let password = body["password"].as_str().unwrap_or_default();

    match users::authenticate(&pool, username, password).await? {
        Some(user) => {
            let session = create_session(&pool, &user.id).await?;
            Ok(HttpResponse::Ok().json(serde_json::json!({
                "token": session.token,
                "csrf_token": session.csrf_token,
                "user_id": user.id,
            })))
        }
        None => Err(ApiError::Unauthorized),
    }
}

pub async fn logout_user(pool: web::Data<SqlitePool>, req: HttpRequest) -> Result<HttpResponse> {
    let session = require_session(&pool, &req).await?;
    verify_csrf(&session, &req)?;

    sqlx::query("DELETE FROM sessions WHERE token = ?1")
        .bind(&session.token)
        .execute(pool.get_ref())
        .await?;

    Ok(HttpResponse::Ok().json(serde_json::json!({
        "message": "Logged out successfully"
    })))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::db::connect_memory;

    #[tokio::test]
    async fn session_rows_cascade_with_user() {
        let pool = connect_memory().await.unwrap();
        let user = users::signup(&pool, "cascade", "cascade@x.com", "password", None)
            .await
            .unwrap();
        let session = create_session(&pool, &user.id).await.unwrap();

        users::delete_user(&pool, &user.id).await.unwrap();

        let remaining: bool =
            sqlx::query_scalar("SELECT EXISTS(SELECT 1 FROM sessions WHERE token = ?1)")
                .bind(&session.token)
                .fetch_one(&pool)
                .await
                .unwrap();
        assert!(!remaining);
    }
}
