use actix_web::{web, HttpRequest, HttpResponse};
use sqlx::SqlitePool;
use uuid::Uuid;

use crate::auth::{require_session, verify_csrf};
use crate::config::MAX_MESSAGE_LENGTH;
use crate::core::errors::{ApiError, Result};
use crate::core::helpers::{now_iso, sanitize_text, validate_uuid};
use crate::models::models::Message;

pub async fn create_message(pool: &SqlitePool, author_id: &str, text: &str) -> Result<Message> {
    if text.is_empty() || text.len() > MAX_MESSAGE_LENGTH {
        return Err(ApiError::Validation(format!(
            "Message text must be 1-{} characters",
            MAX_MESSAGE_LENGTH
        )));
    }

    let message = Message {
        id: Uuid::new_v4().to_string(),
        user_id: author_id.to_string(),
        text: sanitize_text(text),
        created_at: now_iso(),
    };

    sqlx::query("INSERT INTO messages (id, user_id, text, created_at) VALUES (?1, ?2, ?3, ?4)")
        .bind(&message.id)
        .bind(&message.user_id)
        .bind(&message.text)
        .bind(&message.created_at)
        .execute(pool)
        .await?;

    Ok(message)
}

pub async fn get_message(pool: &SqlitePool, message_id: &str) -> Result<Option<Message>> {
    let message = sqlx::query_as::<_, Message>(
        "SELECT id, user_id, text, created_at FROM messages WHERE id = ?1",
    )
    .bind(message_id)
    .fetch_optional(pool)
    .await?;

    Ok(message)
}

/// Only the author may delete a message. Like edges cascade away.
pub async fn delete_message(pool: &SqlitePool, message_id: &str, requester_id: &str) -> Result<()> {
    let message = get_message(pool, message_id)
        .await?
        .ok_or(ApiError::NotFound("message"))?;

    if message.user_id != requester_id {
        return Err(ApiError::Forbidden);
    }

    sqlx::query("DELETE FROM messages WHERE id = ?1")
        .bind(message_id)
        .execute(pool)
        .await?;

    Ok(())
}

pub async fn list_user_messages(pool: &SqlitePool, user_id: &str) -> Result<Vec<Message>> {
    let messages = sqlx::query_as::<_, Message>(
        "SELECT id, user_id, text, created_at FROM messages
         WHERE user_id = ?1
         ORDER BY created_at DESC, id DESC",
    )
    .bind(user_id)
    .fetch_all(pool)
    .await?;

    Ok(messages)
}

// === HTTP Handlers ===

pub async fn handle_create(
    pool: web::Data<SqlitePool>,
    req: HttpRequest,
    body: web::Json<serde_json::Value>,
) -> Result<HttpResponse> {
    let session = require_session(&pool, &req).await?;
    verify_csrf(&session, &req)?;

    let text = body["text"].as_str().unwrap_or_default();
    let message = create_message(&pool, &session.user_id, text).await?;

    Ok(HttpResponse::Created().json(message))
}

pub async fn handle_show(
    pool: web::Data<SqlitePool>,
    path: web::Path<String>,
) -> Result<HttpResponse> {
    let message_id = path.into_inner();
    if !validate_uuid(&message_id) {
        return Err(ApiError::Validation("Invalid message id".to_string()));
    }

    match get_message(&pool, &message_id).await? {
        Some(message) => Ok(HttpResponse::Ok().json(message)),
        None => Err(ApiError::NotFound("message")),
    }
}

pub async fn handle_delete(
    pool: web::Data<SqlitePool>,
    req: HttpRequest,
    path: web::Path<String>,
) -> Result<HttpResponse> {
    let session = require_session(&pool, &req).await?;
    verify_csrf(&session, &req)?;

    let message_id = path.into_inner();
    if !validate_uuid(&message_id) {
        return Err(ApiError::Validation("Invalid message id".to_string()));
    }

    delete_message(&pool, &message_id, &session.user_id).await?;

    Ok(HttpResponse::NoContent().finish())
}

pub async fn get_user_messages(
    pool: web::Data<SqlitePool>,
    path: web::Path<String>,
) -> Result<HttpResponse> {
    let user_id = path.into_inner();
    if crate::users::get_user(&pool, &user_id).await?.is_none() {
        return Err(ApiError::NotFound("user"));
    }

    let messages = list_user_messages(&pool, &user_id).await?;

    Ok(HttpResponse::Ok().json(messages))
}
