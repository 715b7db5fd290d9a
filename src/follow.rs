use actix_web::{web, HttpRequest, HttpResponse};
use sqlx::SqlitePool;

use crate::auth::{require_session, verify_csrf};
use crate::core::errors::{ApiError, Result};
use crate::core::helpers::{now_iso, validate_uuid};
use crate::models::models::User;
use crate::users::{build_user_json, get_user};

/// Insert a follow edge. Duplicate follows are a no-op.
pub async fn follow_user(pool: &SqlitePool, follower_id: &str, followee_id: &str) -> Result<()> {
    sqlx::query(
        "INSERT INTO follows (follower_id, followee_id, created_at) VALUES (?1, ?2, ?3)
         ON CONFLICT (follower_id, followee_id) DO NOTHING",
    )
    .bind(follower_id)
    .bind(followee_id)
    .bind(now_iso())
    .execute(pool)
    .await?;

    Ok(())
}

pub async fn unfollow_user(pool: &SqlitePool, follower_id: &str, followee_id: &str) -> Result<()> {
    let result = sqlx::query("DELETE FROM follows WHERE follower_id = ?1 AND followee_id = ?2")
        .bind(follower_id)
        .bind(followee_id)
        .execute(pool)
        .await?;

    if result.rows_affected() == 0 {
        return Err(ApiError::NotFound("follow"));
    }

    Ok(())
}

pub async fn is_following(pool: &SqlitePool, follower_id: &str, followee_id: &str) -> Result<bool> {
    let exists: bool = sqlx::query_scalar(
        "SELECT EXISTS(SELECT 1 FROM follows WHERE follower_id = ?1 AND followee_id = ?2)",
    )
    .bind(follower_id)
    .bind(followee_id)
    .fetch_one(pool)
    .await?;

    Ok(exists)
}

pub async fn is_followed_by(pool: &SqlitePool, user_id: &str, other_id: &str) -> Result<bool> {
    is_following(pool, other_id, user_id).await
}

/// Users this user follows.
pub async fn get_followings(pool: &SqlitePool, user_id: &str) -> Result<Vec<User>> {
    let users = sqlx::query_as::<_, User>(
        "SELECT u.* FROM users u
         JOIN follows f ON f.followee_id = u.id
         WHERE f.follower_id = ?1
         ORDER BY u.username",
    )
    .bind(user_id)
    .fetch_all(pool)
    .await?;

    Ok(users)
}

/// Users following this user.
pub async fn get_followers(pool: &SqlitePool, user_id: &str) -> Result<Vec<User>> {
    let users = sqlx::query_as::<_, User>(
        "SELECT u.* FROM users u
         JOIN follows f ON f.follower_id = u.id
         WHERE f.followee_id = ?1
         ORDER BY u.username",
    )
    .bind(user_id)
    .fetch_all(pool)
    .await?;

    Ok(users)
}

// === HTTP Handlers ===

pub async fn handle_follow(
    pool: web::Data<SqlitePool>,
    req: HttpRequest,
    path: web::Path<String>,
) -> Result<HttpResponse> {
    let session = require_session(&pool, &req).await?;
    verify_csrf(&session, &req)?;

    let target_user_id = path.into_inner();
    if !validate_uuid(&target_user_id) || target_user_id == session.user_id {
        return Err(ApiError::Validation("Invalid target user".to_string()));
    }

    // Verify target user exists
    if get_user(&pool, &target_user_id).await?.is_none() {
        return Err(ApiError::NotFound("user"));
    }

    follow_user(&pool, &session.user_id, &target_user_id).await?;

    Ok(HttpResponse::Ok().json(serde_json::json!({"status": "followed"})))
}

pub async fn handle_unfollow(
    pool: web::Data<SqlitePool>,
    req: HttpRequest,
    path: web::Path<String>,
) -> Result<HttpResponse> {
    let session = require_session(&pool, &req).await?;
    verify_csrf(&session, &req)?;

    let target_user_id = path.into_inner();
    if !validate_uuid(&target_user_id) {
        return Err(ApiError::Validation("Invalid target user".to_string()));
    }

    unfollow_user(&pool, &session.user_id, &target_user_id).await?;

    Ok(HttpResponse::Ok().json(serde_json::json!({"status": "unfollowed"})))
}

pub async fn get_followings_list(
    pool: web::Data<SqlitePool>,
    req: HttpRequest,
    path: web::Path<String>,
) -> Result<HttpResponse> {
    require_session(&pool, &req).await?;

    let user_id = path.into_inner();
    if get_user(&pool, &user_id).await?.is_none() {
        return Err(ApiError::NotFound("user"));
    }

    let followings = get_followings(&pool, &user_id).await?;
    let listing: Vec<serde_json::Value> = followings.iter().map(build_user_json).collect();

    Ok(HttpResponse::Ok().json(listing))
}

pub async fn get_followers_list(
    pool: web::Data<SqlitePool>,
    req: HttpRequest,
    path: web::Path<String>,
) -> Result<HttpResponse> {
    require_session(&pool, &req).await?;

    let user_id = path.into_inner();
    if get_user(&pool, &user_id).await?.is_none() {
        return Err(ApiError::NotFound("user"));
    }

    let followers = get_followers(&pool, &user_id).await?;
    let listing: Vec<serde_json::Value> = followers.iter().map(build_user_json).collect();

    Ok(HttpResponse::Ok().json(listing))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::db::connect_memory;
    use crate::users::signup;

    async fn two_users(pool: &SqlitePool) -> (User, User) {
        let u1 = signup(pool, "alice", "a@x.com", "password1", None)
            .await
            .unwrap();
        let u2 = signup(pool, "bob", "b@x.com", "password2", None)
            .await
            .unwrap();
        (u1, u2)
    }

    #[tokio::test]
    async fn follow_flips_both_directions() {
        let pool = connect_memory().await.unwrap();
        let (u1, u2) = two_users(&pool).await;

        follow_user(&pool, &u1.id, &u2.id).await.unwrap();
        assert!(is_following(&pool, &u1.id, &u2.id).await.unwrap());
        assert!(is_followed_by(&pool, &u2.id, &u1.id).await.unwrap());
        assert!(!is_following(&pool, &u2.id, &u1.id).await.unwrap());
        assert!(!is_followed_by(&pool, &u1.id, &u2.id).await.unwrap());

        unfollow_user(&pool, &u1.id, &u2.id).await.unwrap();
        assert!(!is_following(&pool, &u1.id, &u2.id).await.unwrap());
        assert!(!is_followed_by(&pool, &u2.id, &u1.id).await.unwrap());
    }

    #[tokio::test]
    async fn duplicate_follow_is_noop() {
        let pool = connect_memory().await.unwrap();
        let (u1, u2) = two_users(&pool).await;

        follow_user(&pool, &u1.id, &u2.id).await.unwrap();
        follow_user(&pool, &u1.id, &u2.id).await.unwrap();

        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM follows")
            .fetch_one(&pool)
            .await
            .unwrap();
        assert_eq!(count, 1);
    }

    #[tokio::test]
    async fn unfollow_missing_edge_is_not_found() {
        let pool = connect_memory().await.unwrap();
        let (u1, u2) = two_users(&pool).await;

        assert!(matches!(
            unfollow_user(&pool, &u1.id, &u2.id).await,
            Err(ApiError::NotFound("follow"))
        ));
    }

    #[tokio::test]
    async fn listings_return_counterpart_users() {
        let pool = connect_memory().await.unwrap();
        let (u1, u2) = two_users(&pool).await;
        follow_user(&pool, &u1.id, &u2.id).await.unwrap();

        let followings = get_followings(&pool, &u1.id).await.unwrap();
        assert_eq!(followings.len(), 1);
        assert_eq!(followings[0].username, "bob");

        let followers = get_followers(&pool, &u2.id).await.unwrap();
        assert_eq!(followers.len(), 1);
        assert_eq!(followers[0].username, "alice");

        assert!(get_followers(&pool, &u1.id).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn edges_cascade_when_either_endpoint_is_deleted() {
        let pool = connect_memory().await.unwrap();
        let (u1, u2) = two_users(&pool).await;
        follow_user(&pool, &u1.id, &u2.id).await.unwrap();
        follow_user(&pool, &u2.id, &u1.id).await.unwrap();

        crate::users::delete_user(&pool, &u2.id).await.unwrap();

        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM follows")
            .fetch_one(&pool)
            .await
            .unwrap();
        assert_eq!(count, 0);
    }
}
