use actix_web::{web, HttpRequest, HttpResponse};
use sqlx::SqlitePool;

use crate::auth::session_for_request;
use crate::config::FEED_LIMIT;
use crate::core::errors::Result;
use crate::models::models::Message;

/// The home feed: the user's own messages plus those of everyone they
/// follow, newest first, capped. Ties on the timestamp break on id so the
/// order is deterministic.
pub async fn home_feed(pool: &SqlitePool, user_id: &str) -> Result<Vec<Message>> {
    let messages = sqlx::query_as::<_, Message>(
        "SELECT id, user_id, text, created_at FROM messages
         WHERE user_id IN (
             SELECT followee_id FROM follows WHERE follower_id = ?1
             UNION
             SELECT ?1
         )
         ORDER BY created_at DESC, id DESC
         LIMIT ?2",
    )
    .bind(user_id)
    .bind(FEED_LIMIT)
    .fetch_all(pool)
    .await?;

    Ok(messages)
}

// === HTTP Handlers ===

/// Anonymous viewers get an empty feed rather than an error.
pub async fn get_feed(pool: web::Data<SqlitePool>, req: HttpRequest) -> Result<HttpResponse> {
    let messages = match session_for_request(&pool, &req).await? {
        Some(session) => home_feed(&pool, &session.user_id).await?,
        None => Vec::new(),
    };

    Ok(HttpResponse::Ok().json(messages))
}
