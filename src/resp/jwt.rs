use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use rocket::http::{Cookie, CookieJar, SameSite, Status};
use rocket::outcome::Outcome;
use rocket::request::{self, FromRequest, Request};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::config::Config;
use crate::data::user::User;
use crate::data::Store;
use crate::resp::problem::{problems, Problem};
use crate::role::Role;
use crate::security::Security;

pub static AUTH_COOKIE_NAME: &str = "token";

pub const DEFAULT_TOKEN_DAYS: i64 = 7;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserRoleToken {
    #[serde(with = "jwt_numeric_date")]
    iat: DateTime<Utc>,
    #[serde(with = "jwt_numeric_date")]
    exp: DateTime<Utc>,
    pub user: Uuid,
    pub role: Role,
}

impl UserRoleToken {
    pub fn new(user: &User, valid_days: i64) -> UserRoleToken {
        let now = Utc::now();
        UserRoleToken {
            iat: now,
            exp: now + Duration::days(valid_days),
            user: user.id,
            role: user.role,
        }
    }

    pub fn expires(&self) -> DateTime<Utc> {
        self.exp
    }

    pub fn encode_jwt(&self, private_key: impl AsRef<[u8]>) -> Result<String, Problem> {
        let header = Header::new(Algorithm::PS256);
        let key = EncodingKey::from_rsa_pem(private_key.as_ref()).map_err(|e| {
            tracing::error!("user_auth private key isn't valid: {}", e);
            problems::server_error()
        })?;

        Ok(encode(&header, &self, &key)?)
    }

    pub fn cookie(&self, private_key: impl AsRef<[u8]>) -> Result<Cookie<'static>, Problem> {
        let max_age = (self.exp - self.iat).num_seconds();
        Ok(Cookie::build((AUTH_COOKIE_NAME, self.encode_jwt(private_key)?))
            .secure(true)
            .http_only(true)
            .same_site(SameSite::Lax)
            .path("/")
            .max_age(rocket::time::Duration::seconds(max_age))
            .build())
    }
}

/// Signs a token for `user` and stores it in the auth cookie.
pub fn issue_cookie(
    cookies: &CookieJar<'_>,
    user: &User,
    security: &Security,
    config: &Config,
) -> Result<(), Problem> {
    let token = UserRoleToken::new(user, config.cookie_expiry_days);
    cookies.add(token.cookie(&security.jwt_keys.private)?);
    Ok(())
}

pub fn clear_cookie(cookies: &CookieJar<'_>) {
    cookies.remove(Cookie::build(AUTH_COOKIE_NAME).path("/").build());
}

pub fn decode_token(token: &str, public_key: impl AsRef<[u8]>) -> Result<UserRoleToken, Problem> {
    let key = DecodingKey::from_rsa_pem(public_key.as_ref()).map_err(|e| {
        tracing::error!("user_auth public key isn't valid: {}", e);
        problems::server_error()
    })?;

    Ok(decode::<UserRoleToken>(token, &key, &Validation::new(Algorithm::PS256))?.claims)
}

pub fn extract_claims(
    cookies: &CookieJar<'_>,
    public_key: impl AsRef<[u8]>,
) -> Result<UserRoleToken, Problem> {
    let token = match cookies.get(AUTH_COOKIE_NAME) {
        Some(jwt) => jwt.value().to_owned(),
        None => return Err(problems::unauthenticated()),
    };
    tracing::debug!("extracted jwt auth from cookie");

    let claims = decode_token(&token, public_key)?;
    tracing::debug!("decoded user roles token for user: {}", claims.user);

    Ok(claims)
}

#[rocket::async_trait]
impl<'r> FromRequest<'r> for UserRoleToken {
    type Error = Problem;

    async fn from_request(req: &'r Request<'_>) -> request::Outcome<Self, Self::Error> {
        let security = match req.rocket().state::<Security>() {
            Some(it) => it,
            None => {
                return problems::server_error().fail_guard(req, Status::InternalServerError)
            }
        };

        tracing::trace!("extracting user roles token from request cookies");
        match extract_claims(req.cookies(), &security.jwt_keys.public) {
            Ok(claims) => Outcome::Success(claims),
            Err(e) => {
                tracing::debug!("unable to extract claims from cookies: {}", e);
                e.fail_guard(req, Status::Unauthorized)
            }
        }
    }
}

/// The authenticated user, loaded fresh from the store on every request.
#[derive(Clone)]
pub struct Principal {
    pub user: User,
}

impl std::fmt::Debug for Principal {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Principal:{}:{}", self.user.role, self.user.id)
    }
}

impl Principal {
    pub fn id(&self) -> Uuid {
        self.user.id
    }

    pub fn role(&self) -> Role {
        self.user.role
    }

    /// Fails with 403 unless the user has one of `roles`.
    pub fn require(&self, roles: &[Role]) -> Result<(), Problem> {
        if roles.contains(&self.user.role) {
            Ok(())
        } else {
            Err(problems::forbidden_role(self.user.role))
        }
    }
}

#[rocket::async_trait]
impl<'r> FromRequest<'r> for Principal {
    type Error = Problem;

    async fn from_request(req: &'r Request<'_>) -> request::Outcome<Self, Self::Error> {
        let claims = match req.guard::<UserRoleToken>().await {
            Outcome::Success(it) => it,
            Outcome::Error(e) => return Outcome::Error(e),
            Outcome::Forward(s) => return Outcome::Forward(s),
        };

        let store = match req.rocket().state::<Arc<dyn Store>>() {
            Some(it) => it,
            None => {
                return problems::server_error().fail_guard(req, Status::InternalServerError)
            }
        };

        match store.get_user(claims.user).await {
            Ok(Some(user)) => Outcome::Success(Principal { user }),
            Ok(None) => {
                tracing::debug!("token refers to missing user {}", claims.user);
                problems::unauthenticated().fail_guard(req, Status::Unauthorized)
            }
            Err(e) => {
                let problem = Problem::from(e);
                let status = problem.status;
                problem.fail_guard(req, status)
            }
        }
    }
}

mod jwt_numeric_date {
    //! Serializes DateTime<Utc> as a JWT "Numeric Date" (RFC 7519 section 2).
    use chrono::{DateTime, TimeZone, Utc};
    use serde::{self, Deserialize, Deserializer, Serializer};

    pub fn serialize<S>(date: &DateTime<Utc>, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_i64(date.timestamp())
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<DateTime<Utc>, D::Error>
    where
        D: Deserializer<'de>,
    {
        Utc.timestamp_opt(i64::deserialize(deserializer)?, 0)
            .single()
            .ok_or_else(|| serde::de::Error::custom("Invalid Unix timestamp value."))
    }
}

pub mod doc {
    use utoipa::openapi::security::*;

    #[derive(Clone, Copy)]
    pub struct JWTAuth;

    impl From<JWTAuth> for SecurityScheme {
        fn from(_: JWTAuth) -> Self {
            SecurityScheme::ApiKey(ApiKey::Cookie(ApiKeyValue::new(super::AUTH_COOKIE_NAME)))
        }
    }

    impl utoipa::Modify for JWTAuth {
        fn modify(&self, openapi: &mut utoipa::openapi::OpenApi) {
            if let Some(c) = openapi.components.as_mut() {
                c.add_security_scheme("jwt", *self)
            }
        }
    }
}


#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::user::PasswordHash;
    use crate::security::testing::SECURITY;
    use chrono::SubsecRound;

    #[test]
    fn jwt_configured_properly() {
        let now = Utc::now().round_subsecs(0);
        let user = Uuid::new_v4();

        let urt = UserRoleToken {
            iat: now,
            exp: now + Duration::weeks(1),
            user,
            role: Role::Admin,
        };

        let token = urt
            .encode_jwt(&SECURITY.jwt_keys.private)
            .expect("encoding should work for example");
        let decoded = decode_token(&token, &SECURITY.jwt_keys.public)
            .expect("unable to decode encoded token");

        assert_eq!(now, decoded.iat);
        assert_eq!(now + Duration::weeks(1), decoded.exp);
        assert_eq!(user, decoded.user);
        assert_eq!(decoded.role, Role::Admin);
    }

    #[test]
    fn expired_tokens_are_reported() {
        let now = Utc::now();
        let urt = UserRoleToken {
            iat: now - Duration::days(8),
            exp: now - Duration::days(1),
            user: Uuid::new_v4(),
            role: Role::Student,
        };
        let token = urt
            .encode_jwt(&SECURITY.jwt_keys.private)
            .expect("encoding works");

        let problem = decode_token(&token, &SECURITY.jwt_keys.public).expect_err("expired");
        assert_eq!(problem.status, Status::BadRequest);
        assert_eq!(problem.message, "JSON Web Token is expired, try again");

        let garbage = decode_token("not.a.jwt", &SECURITY.jwt_keys.public).expect_err("invalid");
        assert_eq!(garbage.message, "JSON Web Token is invalid, try again");
    }

    #[test]
    fn roles_are_enforced() {
        let principal = Principal {
            user: User::new(
                "S",
                "s@example.com",
                PasswordHash::new_unchecked("x"),
                Role::Student,
            ),
        };
        assert!(principal.require(&[Role::Student, Role::Admin]).is_ok());
        let problem = principal.require(&[Role::Teacher]).expect_err("forbidden");
        assert_eq!(problem.status, Status::Forbidden);
    }

    #[test]
    fn principal_debug_prints_only_identity() {
        let hash = PasswordHash::new("password123", &SECURITY).expect("hashing works");
        let principal = Principal {
            user: User::new("S", "s@example.com", hash, Role::Student),
        };

        let printed = format!("{:?}", principal);
        assert!(!printed.contains("argon2"));
        assert!(!printed.contains("s@example.com"));
        assert_eq!(printed, format!("Principal:Student:{}", principal.id()));
    }

    #[test]
    fn cookie_is_http_only() {
        let user = User::new(
            "S",
            "s@example.com",
            PasswordHash::new_unchecked("x"),
            Role::Student,
        );
        let cookie = UserRoleToken::new(&user, 7)
            .cookie(&SECURITY.jwt_keys.private)
            .expect("cookie builds");
        assert_eq!(cookie.name(), AUTH_COOKIE_NAME);
        assert_eq!(cookie.http_only(), Some(true));
        assert_eq!(cookie.secure(), Some(true));
    }
}
