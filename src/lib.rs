use actix_web::web;

pub mod auth;
pub mod config;
pub mod core;
pub mod feed;
pub mod follow;
pub mod likes;
pub mod messages;
pub mod models;
pub mod users;

/// Route table, shared by the server binary and the test harness.
pub fn configure_routes(cfg: &mut web::ServiceConfig) {
    cfg.route("/signup", web::post().to(users::create_user))
        .route("/login", web::post().to(auth::login_user))
        .route("/logout", web::post().to(auth::logout_user))
        .route("/profile", web::get().to(users::get_profile))
        .route("/profile", web::put().to(users::update_profile))
        .route("/profile", web::delete().to(users::delete_profile))
        .route("/users", web::get().to(users::list_users))
        .route("/users/follow/{id}", web::post().to(follow::handle_follow))
        .route(
            "/users/stop-following/{id}",
            web::post().to(follow::handle_unfollow),
        )
        .route("/users/{id}", web::get().to(users::get_user_details))
        .route(
            "/users/{id}/following",
            web::get().to(follow::get_followings_list),
        )
        .route(
            "/users/{id}/followers",
            web::get().to(follow::get_followers_list),
        )
        .route("/users/{id}/likes", web::get().to(likes::get_user_likes))
        .route(
            "/users/{id}/messages",
            web::get().to(messages::get_user_messages),
        )
        .route("/messages", web::post().to(messages::handle_create))
        .route("/messages/{id}", web::get().to(messages::handle_show))
        .route("/messages/{id}", web::delete().to(messages::handle_delete))
        .route("/messages/{id}/like", web::post().to(likes::handle_like))
        .route(
            "/messages/{id}/unlike",
            web::post().to(likes::handle_unlike),
        )
        .route(
            "/messages/{id}/likes",
            web::get().to(likes::get_message_likers),
        )
        .route("/feed", web::get().to(feed::get_feed));
}
