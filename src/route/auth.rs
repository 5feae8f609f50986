use std::sync::Arc;

use chrono::Utc;
use rocket::http::CookieJar;
use rocket::serde::json::Json;
use rocket::{Route, State};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::config::Config;
use crate::data::user::db::{
    create_user, problem as user_problem, validate_email, validate_password, UserLoginData,
    UserSignupData,
};
use crate::data::user::{reset_token_digest, PasswordHash, UserResponse};
use crate::data::Store;
use crate::mail::{template, Mailer};
use crate::resp::envelope::{Envelope, Reply};
use crate::resp::jwt::{clear_cookie, issue_cookie, Principal};
use crate::role::Role;
use crate::security::Security;

pub mod problem {
    use crate::resp::problem::Problem;
    use rocket::http::Status;

    #[inline]
    pub fn unknown_email() -> Problem {
        Problem::new(Status::NotFound, "User not found with this email")
    }

    #[inline]
    pub fn bad_reset_token() -> Problem {
        Problem::new(
            Status::BadRequest,
            "Invalid or expired password reset token",
        )
    }

    #[inline]
    pub fn password_mismatch() -> Problem {
        Problem::new(Status::BadRequest, "Passwords do not match")
    }

    #[inline]
    pub fn mail_failed(detail: impl ToString) -> Problem {
        Problem::new(Status::InternalServerError, "Failed to send email")
            .detail(detail)
            .to_owned()
    }
}

#[derive(Debug, Serialize, ToSchema)]
pub struct UserData {
    pub user: UserResponse,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct ForgotPasswordData {
    #[serde(default)]
    #[schema(format = "email")]
    pub email: String,
}

#[derive(Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct ResetPasswordData {
    #[serde(default)]
    #[schema(format = "password")]
    pub password: String,
    #[serde(default)]
    #[schema(format = "password")]
    pub confirm_password: String,
}

impl std::fmt::Debug for ResetPasswordData {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("ResetPasswordData")
    }
}

/// Create an account of any role
#[utoipa::path(
    post,
    path = "/auth/register",
    request_body = UserSignupData,
    responses(
        (status = 201, description = "User registered", body = UserData),
        (status = 400, description = "Missing or invalid fields", body = Problem),
        (status = 403, description = "Caller is not an admin", body = Problem),
    ),
    security(("jwt" = []))
)]
#[post("/register", data = "<data>")]
#[tracing::instrument(skip(store, security))]
pub async fn register(
    principal: Principal,
    data: Json<UserSignupData>,
    store: &State<Arc<dyn Store>>,
    security: &State<Security>,
) -> Reply<UserData> {
    principal.require(&[Role::Admin])?;

    let data = data.into_inner();
    data.require_fields(false, false)?;
    let role = data.role.ok_or_else(user_problem::missing_fields)?;

    let user = create_user(store.inner().as_ref(), security, data, role).await?;
    tracing::info!("Admin {} registered {} {}", principal.id(), role, user.id);

    Ok(Envelope::created(UserData { user: user.into() }).message("User registered successfully"))
}

/// Log in and receive the auth cookie
#[utoipa::path(
    post,
    path = "/auth/login",
    request_body = UserLoginData,
    responses(
        (status = 200, description = "Logged in", body = UserData),
        (status = 401, description = "Invalid credentials", body = Problem),
    )
)]
#[post("/login", data = "<data>")]
#[tracing::instrument(skip(store, security, config, cookies))]
pub async fn login(
    data: Json<UserLoginData>,
    cookies: &CookieJar<'_>,
    store: &State<Arc<dyn Store>>,
    security: &State<Security>,
    config: &State<Config>,
) -> Reply<UserData> {
    let role = match data.role {
        Some(role) if !data.email.trim().is_empty() && !data.password.is_empty() => role,
        _ => return Err(user_problem::missing_fields()),
    };
    let email = data.email.trim().to_lowercase();

    let user = match store.find_user_by_email(&email).await? {
        Some(user) if user.role == role => user,
        _ => return Err(user_problem::bad_login()),
    };
    if !user.password_hash.verify(&data.password, security) {
        return Err(user_problem::bad_login());
    }

    issue_cookie(cookies, &user, security, config)?;
    tracing::debug!("{} {} logged in", user.role, user.id);

    Ok(Envelope::ok(UserData { user: user.into() }).message("Login successful"))
}

/// Clear the auth cookie
#[utoipa::path(
    post,
    path = "/auth/logout",
    responses((status = 200, description = "Logged out")),
    security(("jwt" = []))
)]
#[post("/logout")]
#[tracing::instrument(skip(cookies))]
pub async fn logout(principal: Principal, cookies: &CookieJar<'_>) -> Reply<()> {
    clear_cookie(cookies);
    tracing::debug!("User {} logged out", principal.id());
    Ok(Envelope::ok(()).message("Logged out successfully"))
}

/// The authenticated user
#[utoipa::path(
    get,
    path = "/auth/me",
    responses(
        (status = 200, description = "Current user", body = UserData),
        (status = 401, description = "Not logged in", body = Problem),
    ),
    security(("jwt" = []))
)]
#[get("/me")]
#[tracing::instrument]
pub async fn me(principal: Principal) -> Reply<UserData> {
    Ok(Envelope::ok(UserData {
        user: principal.user.into(),
    }))
}

/// Mail a password reset link
#[utoipa::path(
    post,
    path = "/auth/password/forgot",
    request_body = ForgotPasswordData,
    responses(
        (status = 200, description = "Reset link sent"),
        (status = 404, description = "Unknown email", body = Problem),
        (status = 500, description = "Mail delivery failed", body = Problem),
    )
)]
#[post("/password/forgot", data = "<data>")]
#[tracing::instrument(skip(store, mailer, config))]
pub async fn forgot_password(
    data: Json<ForgotPasswordData>,
    store: &State<Arc<dyn Store>>,
    mailer: &State<Arc<dyn Mailer>>,
    config: &State<Config>,
) -> Reply<()> {
    let email = validate_email(&data.email)?;
    let mut user = store
        .find_user_by_email(&email)
        .await?
        .ok_or_else(problem::unknown_email)?;

    let token = user.issue_reset_token(crate::util::now());
    store.save_user(&user).await?;

    let reset_url = format!(
        "{}/reset-password/{}",
        config.frontend_url.trim_end_matches('/'),
        token
    );
    if let Err(e) = mailer
        .send(template::password_recovery(&user.email, &reset_url))
        .await
    {
        tracing::error!("Unable to send password recovery mail to {}: {}", user.id, e);
        user.clear_reset_token();
        store.save_user(&user).await?;
        return Err(problem::mail_failed(e));
    }

    Ok(Envelope::ok(()).message(format!("Email sent to {} successfully", user.email)))
}

/// Set a new password with a reset token
#[utoipa::path(
    put,
    path = "/auth/password/reset/{token}",
    params(("token" = String, Path, description = "Token from the reset link")),
    request_body = ResetPasswordData,
    responses(
        (status = 200, description = "Password changed", body = UserData),
        (status = 400, description = "Invalid token or passwords", body = Problem),
    )
)]
#[put("/password/reset/<token>", data = "<data>")]
#[tracing::instrument(skip(token, data, store, security, config, cookies))]
pub async fn reset_password(
    token: &str,
    data: Json<ResetPasswordData>,
    cookies: &CookieJar<'_>,
    store: &State<Arc<dyn Store>>,
    security: &State<Security>,
    config: &State<Config>,
) -> Reply<UserData> {
    let mut user = store
        .find_user_by_reset_token(&reset_token_digest(token), Utc::now())
        .await?
        .ok_or_else(problem::bad_reset_token)?;

    if data.password.is_empty() || data.confirm_password.is_empty() {
        return Err(user_problem::missing_fields());
    }
    if data.password != data.confirm_password {
        return Err(problem::password_mismatch());
    }
    validate_password(&data.password)?;

    user.password_hash = PasswordHash::new(&data.password, security)?;
    user.clear_reset_token();
    user.updated_at = crate::util::now();
    store.save_user(&user).await?;
    tracing::info!("Password of user {} was reset", user.id);

    issue_cookie(cookies, &user, security, config)?;
    Ok(Envelope::ok(UserData { user: user.into() }).message("Password reset successful"))
}

pub fn routes() -> Vec<Route> {
    routes![
        register,
        login,
        logout,
        me,
        forgot_password,
        reset_password
    ]
}

#[cfg(test)]
mod tests {
    use rocket::http::Status;
    use serde_json::{json, Value};

    use crate::route::testing::{TestApp, PASSWORD};
    use crate::role::Role;

    #[rocket::async_test]
    async fn login_sets_cookie_for_matching_role() {
        let app = TestApp::new().await;
        let user = app.user("Sam", Role::Student).await;

        let response = app
            .client
            .post("/api/v1/auth/login")
            .json(&json!({"email": user.email, "password": PASSWORD, "role": "Student"}))
            .dispatch()
            .await;
        assert_eq!(response.status(), Status::Ok);
        assert!(response.cookies().get("token").is_some());
        let body: Value = response.into_json().await.expect("json body");
        assert_eq!(body["success"], true);
        assert_eq!(body["data"]["user"]["email"], user.email.as_str());
        assert!(body["data"]["user"].get("passwordHash").is_none());

        let wrong_role = app
            .client
            .post("/api/v1/auth/login")
            .json(&json!({"email": user.email, "password": PASSWORD, "role": "Teacher"}))
            .dispatch()
            .await;
        assert_eq!(wrong_role.status(), Status::Unauthorized);
        let body: Value = wrong_role.into_json().await.expect("json body");
        assert_eq!(body["success"], false);
        assert_eq!(body["message"], "Invalid email or password");
    }

    #[rocket::async_test]
    async fn me_requires_a_cookie() {
        let app = TestApp::new().await;
        let response = app.client.get("/api/v1/auth/me").dispatch().await;
        assert_eq!(response.status(), Status::Unauthorized);
        let body: Value = response.into_json().await.expect("json body");
        assert_eq!(body["message"], "Not authorized to access this route");

        let user = app.user("Sam", Role::Student).await;
        let response = app
            .client
            .get("/api/v1/auth/me")
            .cookie(app.cookie(&user))
            .dispatch()
            .await;
        assert_eq!(response.status(), Status::Ok);
        let body: Value = response.into_json().await.expect("json body");
        assert_eq!(body["data"]["user"]["id"], user.id.to_string());
    }

    #[rocket::async_test]
    async fn only_admins_register_users() {
        let app = TestApp::new().await;
        let admin = app.user("Ada", Role::Admin).await;
        let student = app.user("Sam", Role::Student).await;
        let payload = json!({
            "name": "Tess",
            "email": "tess@example.com",
            "password": "long enough",
            "role": "Teacher"
        });

        let forbidden = app
            .client
            .post("/api/v1/auth/register")
            .cookie(app.cookie(&student))
            .json(&payload)
            .dispatch()
            .await;
        assert_eq!(forbidden.status(), Status::Forbidden);
        let body: Value = forbidden.into_json().await.expect("json body");
        assert_eq!(
            body["message"],
            "Role (Student) is not authorized to access this resource"
        );

        let created = app
            .client
            .post("/api/v1/auth/register")
            .cookie(app.cookie(&admin))
            .json(&payload)
            .dispatch()
            .await;
        assert_eq!(created.status(), Status::Created);
        let body: Value = created.into_json().await.expect("json body");
        assert_eq!(body["data"]["user"]["role"], "Teacher");
    }

    #[rocket::async_test]
    async fn password_reset_flow() {
        let app = TestApp::new().await;
        let user = app.user("Sam", Role::Student).await;

        let response = app
            .client
            .post("/api/v1/auth/password/forgot")
            .json(&json!({"email": user.email}))
            .dispatch()
            .await;
        assert_eq!(response.status(), Status::Ok);

        let sent = app.mailer.sent();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].subject, "Password Recovery");
        let marker = "/reset-password/";
        let start = sent[0].html.find(marker).expect("link in mail") + marker.len();
        let token: String = sent[0].html[start..]
            .chars()
            .take_while(|c| *c != '"')
            .collect();

        let mismatch = app
            .client
            .put(format!("/api/v1/auth/password/reset/{}", token))
            .json(&json!({"password": "new password", "confirmPassword": "other password"}))
            .dispatch()
            .await;
        assert_eq!(mismatch.status(), Status::BadRequest);

        let reset = app
            .client
            .put(format!("/api/v1/auth/password/reset/{}", token))
            .json(&json!({"password": "new password", "confirmPassword": "new password"}))
            .dispatch()
            .await;
        assert_eq!(reset.status(), Status::Ok);
        assert!(reset.cookies().get("token").is_some());

        let reused = app
            .client
            .put(format!("/api/v1/auth/password/reset/{}", token))
            .json(&json!({"password": "new password", "confirmPassword": "new password"}))
            .dispatch()
            .await;
        assert_eq!(reused.status(), Status::BadRequest);
        let body: Value = reused.into_json().await.expect("json body");
        assert_eq!(body["message"], "Invalid or expired password reset token");
    }

    #[rocket::async_test]
    async fn unknown_email_cannot_reset() {
        let app = TestApp::new().await;
        let response = app
            .client
            .post("/api/v1/auth/password/forgot")
            .json(&json!({"email": "nobody@example.com"}))
            .dispatch()
            .await;
        assert_eq!(response.status(), Status::NotFound);
    }

    #[rocket::async_test]
    async fn malformed_json_is_a_bad_request() {
        let app = TestApp::new().await;
        let response = app
            .client
            .post("/api/v1/auth/login")
            .header(rocket::http::ContentType::JSON)
            .body("{not json")
            .dispatch()
            .await;
        assert_eq!(response.status(), Status::BadRequest);
        let body: Value = response.into_json().await.expect("json body");
        assert_eq!(body["success"], false);
    }
}
