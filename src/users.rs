use actix_web::{web, HttpRequest, HttpResponse};
use serde::Deserialize;
use sqlx::SqlitePool;
use uuid::Uuid;

use crate::auth::{require_session, verify_csrf};
use crate::config::*;
use crate::core::errors::{ApiError, Result};
use crate::core::helpers::{
    hash_password, now_iso, sanitize_text, valid_email, validate_uuid, verify_password,
};
use crate::models::models::User;

/// Profile fields a user may change about themselves. `None` leaves the
/// stored value untouched.
#[derive(Default)]
pub struct ProfileChanges<'a> {
    pub username: Option<&'a str>,
    pub email: Option<&'a str>,
    pub image_url: Option<&'a str>,
    pub header_image_url: Option<&'a str>,
    pub bio: Option<&'a str>,
    pub location: Option<&'a str>,
}

fn validate_username(username: &str) -> Result<String> {
    if username.is_empty() {
        return Err(ApiError::Validation("Username is required".to_string()));
    }
    if username.len() < MIN_USERNAME_LENGTH || username.len() > MAX_USERNAME_LENGTH {
        return Err(ApiError::Validation(format!(
            "Username must be {}-{} characters",
            MIN_USERNAME_LENGTH, MAX_USERNAME_LENGTH
        )));
    }

    // Sanitize at input time
    let sanitized = sanitize_text(username);
    if sanitized.len() < MIN_USERNAME_LENGTH {
        return Err(ApiError::Validation("Invalid username".to_string()));
    }
    Ok(sanitized)
}

fn validate_email_field(email: &str) -> Result<()> {
    if email.is_empty() {
        return Err(ApiError::Validation("Email is required".to_string()));
    }
    if !valid_email(email) {
        return Err(ApiError::Validation("Invalid email address".to_string()));
    }
    Ok(())
}

pub async fn signup(
    pool: &SqlitePool,
    username: &str,
    email: &str,
    password: &str,
    image_url: Option<&str>,
) -> Result<User> {
    let username = validate_username(username)?;
    validate_email_field(email)?;
    if password.is_empty() {
        return Err(ApiError::Validation("Password is required".to_string()));
    }
    if password.len() < MIN_PASSWORD_LENGTH {
        return Err(ApiError::Validation(format!(
            "Password must be at least {} characters",
            MIN_PASSWORD_LENGTH
        )));
    }

    let user = User {
        id: Uuid::new_v4().to_string(),
        username,
        email: email.to_string(),
        password_hash: hash_password(password)?,
        image_url: image_url
            .filter(|u| !u.is_empty())
            .unwrap_or(DEFAULT_IMAGE_URL)
            .to_string(),
        header_image_url: None,
        bio: None,
        location: None,
        created_at: now_iso(),
    };

    // Uniqueness is checked inside the insert transaction so a collision maps
    // to a field-specific error and nothing partial persists.
    let mut tx = pool.begin().await?;

    let username_taken: bool =
        sqlx::query_scalar("SELECT EXISTS(SELECT 1 FROM users WHERE username = ?1)")
            .bind(&user.username)
            .fetch_one(&mut *tx)
            .await?;
    if username_taken {
        return Err(ApiError::UsernameTaken);
    }

    let email_taken: bool =
        sqlx::query_scalar("SELECT EXISTS(SELECT 1 FROM users WHERE email = ?1)")
            .bind(&user.email)
            .fetch_one(&mut *tx)
            .await?;
    if email_taken {
        return Err(ApiError::EmailTaken);
    }

    sqlx::query(
        "INSERT INTO users (id, username, email, password_hash, image_url, header_image_url, bio, location, created_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
    )
    .bind(&user.id)
    .bind(&user.username)
    .bind(&user.email)
    .bind(&user.password_hash)
    .bind(&user.image_url)
    .bind(&user.header_image_url)
    .bind(&user.bio)
    .bind(&user.location)
    .bind(&user.created_at)
    .execute(&mut *tx)
    .await?;

    tx.commit().await?;

    Ok(user)
}

/// `None` on any mismatch, including an unknown username.
pub async fn authenticate(
    pool: &SqlitePool,
    username: &str,
    password: &str,
) -> Result<Option<User>> {
    match find_by_username(pool, username).await? {
        Some(user) if verify_password(password, &user.password_hash) => Ok(Some(user)),
        _ => Ok(None),
    }
}

pub async fn get_user(pool: &SqlitePool, user_id: &str) -> Result<Option<User>> {
    let user = sqlx::query_as::<_, User>("SELECT * FROM users WHERE id = ?1")
        .bind(user_id)
        .fetch_optional(pool)
        .await?;
    Ok(user)
}

pub async fn find_by_username(pool: &SqlitePool, username: &str) -> Result<Option<User>> {
    let user = sqlx::query_as::<_, User>("SELECT * FROM users WHERE username = ?1")
        .bind(username)
        .fetch_optional(pool)
        .await?;
    Ok(user)
}

/// All users, or those whose username contains `q`.
pub async fn search_users(pool: &SqlitePool, q: Option<&str>) -> Result<Vec<User>> {
    let users = match q.filter(|q| !q.is_empty()) {
        Some(q) => {
            sqlx::query_as::<_, User>(
                "SELECT * FROM users WHERE username LIKE '%' || ?1 || '%' ORDER BY username",
            )
            .bind(q)
            .fetch_all(pool)
            .await?
        }
        None => {
            sqlx::query_as::<_, User>("SELECT * FROM users ORDER BY username")
                .fetch_all(pool)
                .await?
        }
    };
    Ok(users)
}

/// Re-authenticates with the current password before applying any change.
pub async fn update_user(
    pool: &SqlitePool,
    user_id: &str,
    current_password: &str,
    changes: ProfileChanges<'_>,
) -> Result<User> {
    let mut user = get_user(pool, user_id)
        .await?
        .ok_or(ApiError::NotFound("user"))?;

    if !verify_password(current_password, &user.password_hash) {
        return Err(ApiError::Unauthorized);
    }

    if let Some(username) = changes.username {
        user.username = validate_username(username)?;
    }
    if let Some(email) = changes.email {
        validate_email_field(email)?;
        user.email = email.to_string();
    }
    if let Some(image_url) = changes.image_url {
        user.image_url = if image_url.is_empty() {
            DEFAULT_IMAGE_URL.to_string()
        } else {
            image_url.to_string()
        };
    }
    if let Some(header_image_url) = changes.header_image_url {
        user.header_image_url = if header_image_url.is_empty() {
            None
        } else {
            Some(header_image_url.to_string())
        };
    }
    if let Some(bio) = changes.bio {
        if bio.len() > MAX_BIO_LENGTH {
            return Err(ApiError::Validation(format!(
                "Bio too long (max {} chars)",
                MAX_BIO_LENGTH
            )));
        }
        let sanitized = sanitize_text(bio);
        user.bio = if sanitized.is_empty() {
            None
        } else {
            Some(sanitized)
        };
    }
    if let Some(location) = changes.location {
        if location.len() > MAX_LOCATION_LENGTH {
            return Err(ApiError::Validation("Location too long".to_string()));
        }
        let sanitized = sanitize_text(location);
        user.location = if sanitized.is_empty() {
            None
        } else {
            Some(sanitized)
        };
    }

    let mut tx = pool.begin().await?;

    let username_taken: bool = sqlx::query_scalar(
        "SELECT EXISTS(SELECT 1 FROM users WHERE username = ?1 AND id != ?2)",
    )
    .bind(&user.username)
    .bind(&user.id)
    .fetch_one(&mut *tx)
    .await?;
    if username_taken {
        return Err(ApiError::UsernameTaken);
    }

    let email_taken: bool =
        sqlx::query_scalar("SELECT EXISTS(SELECT 1 FROM users WHERE email = ?1 AND id != ?2)")
            .bind(&user.email)
            .bind(&user.id)
            .fetch_one(&mut *tx)
            .await?;
    if email_taken {
        return Err(ApiError::EmailTaken);
    }

    sqlx::query(
        "UPDATE users SET username = ?1, email = ?2, image_url = ?3, header_image_url = ?4,
                bio = ?5, location = ?6 WHERE id = ?7",
    )
    .bind(&user.username)
    .bind(&user.email)
    .bind(&user.image_url)
    .bind(&user.header_image_url)
    .bind(&user.bio)
    .bind(&user.location)
    .bind(&user.id)
    .execute(&mut *tx)
    .await?;

    tx.commit().await?;

    Ok(user)
}

/// Deletes the account, its messages, and (via cascade) its follow edges,
/// likes, and sessions, all in one transaction.
pub async fn delete_user(pool: &SqlitePool, user_id: &str) -> Result<()> {
    let mut tx = pool.begin().await?;

    sqlx::query("DELETE FROM messages WHERE user_id = ?1")
        .bind(user_id)
        .execute(&mut *tx)
        .await?;

    let result = sqlx::query("DELETE FROM users WHERE id = ?1")
        .bind(user_id)
        .execute(&mut *tx)
        .await?;
    if result.rows_affected() == 0 {
        return Err(ApiError::NotFound("user"));
    }

    tx.commit().await?;

    Ok(())
}

pub fn build_user_json(user: &User) -> serde_json::Value {
    serde_json::json!({
        "id": user.id,
        "username": user.username,
        "image_url": user.image_url,
        "header_image_url": user
            .header_image_url
            .as_deref()
            .unwrap_or(DEFAULT_HEADER_IMAGE_URL),
        "bio": user.bio,
        "location": user.location,
        "created_at": user.created_at,
    })
}

// === HTTP Handlers ===

#[derive(Deserialize)]
pub struct UserSearchQuery {
    q: Option<String>,
}

pub async fn create_user(
    pool: web::Data<SqlitePool>,
    body: web::Json<serde_json::Value>,
) -> Result<HttpResponse> {
    let username = body["username"].as_str().unwrap_or("");
    let email = body["email"].as_str().unwrap_or("");
    let password = body["password"].as_str().unwrap_or("");
    let image_url = body["image_url"].as_str();

    let user = signup(&pool, username, email, password, image_url).await?;

    // Signup logs the new user in
    let session = crate::auth::create_session(&pool, &user.id).await?;

    Ok(HttpResponse::Created().json(serde_json::json!({
        "user": user,
        "token": session.token,
        "csrf_token": session.csrf_token,
    })))
}

pub async fn get_profile(pool: web::Data<SqlitePool>, req: HttpRequest) -> Result<HttpResponse> {
    let session = require_session(&pool, &req).await?;

    let user = get_user(&pool, &session.user_id)
        .await?
        .ok_or(ApiError::NotFound("user"))?;

    Ok(HttpResponse::Ok().json(user))
}

pub async fn update_profile(
    pool: web::Data<SqlitePool>,
    req: HttpRequest,
    body: web::Json<serde_json::Value>,
) -> Result<HttpResponse> {
    let session = require_session(&pool, &req).await?;
    verify_csrf(&session, &req)?;

    let current_password = body["password"].as_str().unwrap_or("");
    let changes = ProfileChanges {
        username: body["username"].as_str(),
        email: body["email"].as_str(),
        image_url: body["image_url"].as_str(),
        header_image_url: body["header_image_url"].as_str(),
        bio: body["bio"].as_str(),
        location: body["location"].as_str(),
    };

    let user = update_user(&pool, &session.user_id, current_password, changes).await?;

    Ok(HttpResponse::Ok().json(user))
}

pub async fn delete_profile(pool: web::Data<SqlitePool>, req: HttpRequest) -> Result<HttpResponse> {
    let session = require_session(&pool, &req).await?;
    verify_csrf(&session, &req)?;

    delete_user(&pool, &session.user_id).await?;

    Ok(HttpResponse::NoContent().finish())
}

pub async fn list_users(
    pool: web::Data<SqlitePool>,
    query: web::Query<UserSearchQuery>,
) -> Result<HttpResponse> {
    let users = search_users(&pool, query.q.as_deref()).await?;
    let listing: Vec<serde_json::Value> = users.iter().map(build_user_json).collect();

    Ok(HttpResponse::Ok().json(listing))
}

pub async fn get_user_details(
    pool: web::Data<SqlitePool>,
    path: web::Path<String>,
) -> Result<HttpResponse> {
    let user_id = path.into_inner();
    if !validate_uuid(&user_id) {
        return Err(ApiError::Validation("Invalid user id".to_string()));
    }

    match get_user(&pool, &user_id).await? {
        Some(user) => Ok(HttpResponse::Ok().json(build_user_json(&user))),
        None => Err(ApiError::NotFound("user")),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::db::connect_memory;

    #[tokio::test]
    async fn signup_then_authenticate() {
        let pool = connect_memory().await.unwrap();
        let user = signup(&pool, "alice", "a@x.com", "password1", None)
            .await
            .unwrap();
        assert_eq!(user.image_url, DEFAULT_IMAGE_URL);

        let found = authenticate(&pool, "alice", "password1").await.unwrap();
        assert_eq!(found.unwrap().id, user.id);

        assert!(authenticate(&pool, "alice", "wrong")
            .await
            .unwrap()
            .is_none());
        assert!(authenticate(&pool, "nobody", "password1")
            .await
            .unwrap()
            .is_none());
    }

    #[tokio::test]
    async fn password_is_never_stored_in_plaintext() {
        let pool = connect_memory().await.unwrap();
        let user = signup(&pool, "alice", "a@x.com", "password1", None)
            .await
            .unwrap();
        assert_ne!(user.password_hash, "password1");

        let json = serde_json::to_value(&user).unwrap();
        assert!(json.get("password_hash").is_none());
    }

    #[tokio::test]
    async fn duplicate_signup_fails_field_specifically() {
        let pool = connect_memory().await.unwrap();
        signup(&pool, "alice", "a@x.com", "password1", None)
            .await
            .unwrap();

        let err = signup(&pool, "alice", "other@x.com", "password2", None)
            .await
            .unwrap_err();
        assert!(matches!(err, ApiError::UsernameTaken));

        let err = signup(&pool, "alice2", "a@x.com", "password2", None)
            .await
            .unwrap_err();
        assert!(matches!(err, ApiError::EmailTaken));

        // First account is unaffected
        assert!(authenticate(&pool, "alice", "password1")
            .await
            .unwrap()
            .is_some());
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM users")
            .fetch_one(&pool)
            .await
            .unwrap();
        assert_eq!(count, 1);
    }

    #[tokio::test]
    async fn signup_validation() {
        let pool = connect_memory().await.unwrap();
        assert!(matches!(
            signup(&pool, "", "a@x.com", "password1", None).await,
            Err(ApiError::Validation(_))
        ));
        assert!(matches!(
            signup(&pool, "alice", "not-an-email", "password1", None).await,
            Err(ApiError::Validation(_))
        ));
        assert!(matches!(
            signup(&pool, "alice", "a@x.com", "pw", None).await,
            Err(ApiError::Validation(_))
        ));
    }

    #[tokio::test]
    async fn update_requires_current_password_and_uniqueness() {
        let pool = connect_memory().await.unwrap();
        let alice = signup(&pool, "alice", "a@x.com", "password1", None)
            .await
            .unwrap();
        signup(&pool, "bob", "b@x.com", "password2", None)
            .await
            .unwrap();

        let err = update_user(
            &pool,
            &alice.id,
            "wrong",
            ProfileChanges {
                bio: Some("hi"),
                ..Default::default()
            },
        )
        .await
        .unwrap_err();
        assert!(matches!(err, ApiError::Unauthorized));

        let err = update_user(
            &pool,
            &alice.id,
            "password1",
            ProfileChanges {
                username: Some("bob"),
                ..Default::default()
            },
        )
        .await
        .unwrap_err();
        assert!(matches!(err, ApiError::UsernameTaken));

        let updated = update_user(
            &pool,
            &alice.id,
            "password1",
            ProfileChanges {
                bio: Some("<b>hello</b> there"),
                location: Some("Berlin"),
                ..Default::default()
            },
        )
        .await
        .unwrap();
        assert_eq!(updated.bio.as_deref(), Some("hello there"));
        assert_eq!(updated.location.as_deref(), Some("Berlin"));
    }

    #[tokio::test]
    async fn delete_user_removes_messages() {
        let pool = connect_memory().await.unwrap();
        let alice = signup(&pool, "alice", "a@x.com", "password1", None)
            .await
            .unwrap();
        let m1 = crate::messages::create_message(&pool, &alice.id, "one")
            .await
            .unwrap();
        let m2 = crate::messages::create_message(&pool, &alice.id, "two")
            .await
            .unwrap();

        delete_user(&pool, &alice.id).await.unwrap();

        assert!(crate::messages::get_message(&pool, &m1.id)
            .await
            .unwrap()
            .is_none());
        assert!(crate::messages::get_message(&pool, &m2.id)
            .await
            .unwrap()
            .is_none());
        assert!(matches!(
            delete_user(&pool, &alice.id).await,
            Err(ApiError::NotFound("user"))
        ));
    }

    #[tokio::test]
    async fn search_matches_substring() {
        let pool = connect_memory().await.unwrap();
        signup(&pool, "alice", "a@x.com", "password1", None)
            .await
            .unwrap();
        signup(&pool, "bob", "b@x.com", "password2", None)
            .await
            .unwrap();

        let hits = search_users(&pool, Some("lic")).await.unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].username, "alice");

        let all = search_users(&pool, None).await.unwrap();
        assert_eq!(all.len(), 2);
    }
}
