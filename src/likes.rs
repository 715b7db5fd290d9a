use actix_web::{web, HttpRequest, HttpResponse};
use sqlx::SqlitePool;

use crate::auth::{require_session, verify_csrf};
use crate::core::errors::{ApiError, Result};
use crate::core::helpers::{now_iso, validate_uuid};
use crate::models::models::{Message, User};
use crate::users::build_user_json;

/// Insert a like edge. A second like of the same message is an error, not a
/// silent duplicate.
pub async fn like_message(pool: &SqlitePool, user_id: &str, message_id: &str) -> Result<()> {
    let result = sqlx::query(
        "INSERT INTO likes (user_id, message_id, created_at) VALUES (?1, ?2, ?3)
         ON CONFLICT (user_id, message_id) DO NOTHING",
    )
    .bind(user_id)
    .bind(message_id)
    .bind(now_iso())
    .execute(pool)
    .await?;

    if result.rows_affected() == 0 {
        return Err(ApiError::AlreadyLiked);
    }

    Ok(())
}

/// Remove a like edge; exactly one row must match.
pub async fn unlike_message(pool: &SqlitePool, user_id: &str, message_id: &str) -> Result<()> {
    let result = sqlx::query("DELETE FROM likes WHERE user_id = ?1 AND message_id = ?2")
        .bind(user_id)
        .bind(message_id)
        .execute(pool)
        .await?;

    if result.rows_affected() == 0 {
        return Err(ApiError::NotFound("like"));
    }

    Ok(())
}

pub async fn has_liked(pool: &SqlitePool, user_id: &str, message_id: &str) -> Result<bool> {
    let exists: bool = sqlx::query_scalar(
        "SELECT EXISTS(SELECT 1 FROM likes WHERE user_id = ?1 AND message_id = ?2)",
    )
    .bind(user_id)
    .bind(message_id)
    .fetch_one(pool)
    .await?;

    Ok(exists)
}

/// Messages this user liked, most recently liked first.
pub async fn list_liked_messages(pool: &SqlitePool, user_id: &str) -> Result<Vec<Message>> {
    let messages = sqlx::query_as::<_, Message>(
        "SELECT m.id, m.user_id, m.text, m.created_at FROM messages m
         JOIN likes l ON l.message_id = m.id
         WHERE l.user_id = ?1
         ORDER BY l.created_at DESC, m.id DESC",
    )
    .bind(user_id)
    .fetch_all(pool)
    .await?;

    Ok(messages)
}

pub async fn list_likers(pool: &SqlitePool, message_id: &str) -> Result<Vec<User>> {
    let users = sqlx::query_as::<_, User>(
        "SELECT u.* FROM users u
         JOIN likes l ON l.user_id = u.id
         WHERE l.message_id = ?1
         ORDER BY u.username",
    )
    .bind(message_id)
    .fetch_all(pool)
    .await?;

    Ok(users)
}

// === HTTP Handlers ===

async fn resolve_message_id(
    pool: &SqlitePool,
    path: web::Path<String>,
) -> Result<String> {
    let message_id = path.into_inner();
    if !validate_uuid(&message_id) {
        return Err(ApiError::Validation("Invalid message id".to_string()));
    }
    if crate::messages::get_message(pool, &message_id).await?.is_none() {
        return Err(ApiError::NotFound("message"));
    }
    Ok(message_id)
}

pub async fn handle_like(
    pool: web::Data<SqlitePool>,
    req: HttpRequest,
    path: web::Path<String>,
) -> Result<HttpResponse> {
    let session = require_session(&pool, &req).await?;
    verify_csrf(&session, &req)?;

    let message_id = resolve_message_id(&pool, path).await?;
    like_message(&pool, &session.user_id, &message_id).await?;

    Ok(HttpResponse::Ok().json(serde_json::json!({"status": "liked"})))
}

pub async fn handle_unlike(
    pool: web::Data<SqlitePool>,
    req: HttpRequest,
    path: web::Path<String>,
) -> Result<HttpResponse> {
    let session = require_session(&pool, &req).await?;
    verify_csrf(&session, &req)?;

    let message_id = resolve_message_id(&pool, path).await?;
    unlike_message(&pool, &session.user_id, &message_id).await?;

    Ok(HttpResponse::Ok().json(serde_json::json!({"status": "unliked"})))
}

pub async fn get_message_likers(
    pool: web::Data<SqlitePool>,
    req: HttpRequest,
    path: web::Path<String>,
) -> Result<HttpResponse> {
    require_session(&pool, &req).await?;

    let message_id = resolve_message_id(&pool, path).await?;
    let likers = list_likers(&pool, &message_id).await?;
    let listing: Vec<serde_json::Value> = likers.iter().map(build_user_json).collect();

    Ok(HttpResponse::Ok().json(listing))
}

pub async fn get_user_likes(
    pool: web::Data<SqlitePool>,
    req: HttpRequest,
    path: web::Path<String>,
) -> Result<HttpResponse> {
    require_session(&pool, &req).await?;

    let user_id = path.into_inner();
    if crate::users::get_user(&pool, &user_id).await?.is_none() {
        return Err(ApiError::NotFound("user"));
    }

    let messages = list_liked_messages(&pool, &user_id).await?;

    Ok(HttpResponse::Ok().json(messages))
}
