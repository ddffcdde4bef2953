use axum::extract::FromRequestParts;
use axum::http::header::AUTHORIZATION;
use axum::http::request::Parts;
use chrono::{DateTime, Duration, Utc};
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{info, warn};
use uuid::Uuid;
use validator::Validate;

use crate::api::AppState;
use crate::clock::Clock;
use crate::config::AdminSeed;
use crate::error::{CrmError, CrmResult};
use crate::models::user::{AuthResponse, LoginRequest, RegisterUser, UserResponse};
use crate::models::{Role, User};
use crate::store::{OwnerScope, UserStore};

/// Claims carried inside every access token.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    /// Subject - the user's UUID as a string.
    pub sub: String,
    pub role: Role,
    pub exp: usize,
}

/// HS256 signing and verification keys.
#[derive(Clone)]
pub struct JwtKeys {
    encoding: EncodingKey,
    decoding: DecodingKey,
    ttl: Duration,
}

impl JwtKeys {
    pub fn new(secret: &str, ttl_hours: i64) -> Self {
        Self {
            encoding: EncodingKey::from_secret(secret.as_bytes()),
            decoding: DecodingKey::from_secret(secret.as_bytes()),
            ttl: Duration::hours(ttl_hours),
        }
    }

    pub fn issue(&self, user_id: Uuid, role: Role, now: DateTime<Utc>) -> CrmResult<String> {
        let claims = Claims {
            sub: user_id.to_string(),
            role,
            exp: (now + self.ttl).timestamp().max(0) as usize,
        };
        encode(&Header::new(Algorithm::HS256), &claims, &self.encoding)
            .map_err(|e| CrmError::Internal(anyhow::anyhow!("Failed to sign token: {}", e)))
    }

    /// Checks the signature and that the token has not expired as of `now`.
    ///
    /// Expiry is judged against `now`, not the system time.
    ///
    /// # Errors
    ///
    /// `Unauthorized("Token expired")` once `exp <= now`, and
    /// `Unauthorized("Please authenticate")` for any other decoding failure.
    pub fn verify(&self, token: &str, now: DateTime<Utc>) -> CrmResult<CurrentUser> {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.validate_exp = false;

        let claims = decode::<Claims>(token, &self.decoding, &validation)
            .map_err(|_| CrmError::unauthorized("Please authenticate"))?
            .claims;

        if claims.exp as i64 <= now.timestamp() {
            return Err(CrmError::unauthorized("Token expired"));
        }

        let id = Uuid::parse_str(&claims.sub)
            .map_err(|_| CrmError::unauthorized("Please authenticate"))?;
        Ok(CurrentUser {
            id,
            role: claims.role,
        })
    }
}

/// Pulls the token out of an `Authorization: Bearer ...` header value.
pub fn bearer_token(header: &str) -> Option<&str> {
    header
        .strip_prefix("Bearer ")
        .map(str::trim)
        .filter(|t| !t.is_empty())
}

/// The authenticated caller.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CurrentUser {
    pub id: Uuid,
    pub role: Role,
}

impl CurrentUser {
    pub fn is_admin(&self) -> bool {
        self.role.is_admin()
    }

    /// Records this caller may see in owner-scoped collections.
    pub fn scope(&self) -> OwnerScope {
        if self.is_admin() {
            OwnerScope::All
        } else {
            OwnerScope::Owner(self.id)
        }
    }
}

#[axum::async_trait]
impl FromRequestParts<AppState> for CurrentUser {
    type Rejection = CrmError;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, Self::Rejection> {
        if let Some(user) = parts.extensions.get::<CurrentUser>() {
            return Ok(*user);
        }

        let header = parts
            .headers
            .get(AUTHORIZATION)
            .and_then(|v| v.to_str().ok())
            .ok_or_else(|| CrmError::unauthorized("No token provided"))?;
        let token =
            bearer_token(header).ok_or_else(|| CrmError::unauthorized("No token provided"))?;

        let user = state.auth.keys().verify(token, state.clock.now()).map_err(|e| {
            warn!("Rejected token for {}: {}", parts.uri, e);
            e
        })?;
        parts.extensions.insert(user);
        Ok(user)
    }
}

/// A caller whose role is `admin`; anyone else gets 403.
#[derive(Debug, Clone, Copy)]
pub struct RequireAdmin(pub CurrentUser);

#[axum::async_trait]
impl FromRequestParts<AppState> for RequireAdmin {
    type Rejection = CrmError;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, Self::Rejection> {
        let user = CurrentUser::from_request_parts(parts, state).await?;
        if !user.is_admin() {
            return Err(CrmError::forbidden("Access denied. Admin only."));
        }
        Ok(RequireAdmin(user))
    }
}

pub async fn hash_password(password: String) -> CrmResult<String> {
    tokio::task::spawn_blocking(move || bcrypt::hash(password, bcrypt::DEFAULT_COST))
        .await
        .map_err(|e| CrmError::Internal(e.into()))?
        .map_err(|e| CrmError::Internal(e.into()))
}

pub async fn verify_password(password: String, hash: String) -> CrmResult<bool> {
    tokio::task::spawn_blocking(move || bcrypt::verify(password, &hash))
        .await
        .map_err(|e| CrmError::Internal(e.into()))?
        .map_err(|e| CrmError::Internal(e.into()))
}

/// Login, registration and token verification.
#[derive(Clone)]
pub struct AuthService {
    users: Arc<dyn UserStore>,
    keys: JwtKeys,
    clock: Arc<dyn Clock>,
}

impl AuthService {
    pub fn new(users: Arc<dyn UserStore>, keys: JwtKeys, clock: Arc<dyn Clock>) -> Self {
        Self { users, keys, clock }
    }

    pub fn keys(&self) -> &JwtKeys {
        &self.keys
    }

    pub async fn login(&self, request: LoginRequest) -> CrmResult<AuthResponse> {
        let user = self
            .users
            .find_by_email(&request.email)
            .await?
            .ok_or_else(|| CrmError::unauthorized("Invalid credentials"))?;

        if !user.is_active {
            return Err(CrmError::unauthorized("Account is deactivated"));
        }
        if !verify_password(request.password, user.password_hash.clone()).await? {
            warn!("Failed login for {}", user.email);
            return Err(CrmError::unauthorized("Invalid credentials"));
        }

        let now = self.clock.now();
        self.users.record_login(user.id, now).await?;
        let token = self.keys.issue(user.id, user.role, now)?;
        info!("Login successful for {}", user.email);

        Ok(AuthResponse {
            message: "Login successful".to_string(),
            token,
            user: user.into(),
        })
    }

    pub async fn register(&self, request: RegisterUser) -> CrmResult<AuthResponse> {
        request.validate()?;
        let now = self.clock.now();
        let hash = hash_password(request.password).await?;
        let user = User::new(
            request.name.trim().to_string(),
            &request.email,
            hash,
            request.role.unwrap_or(Role::CallingStaff),
            now,
        );

        let user = self.users.insert(user).await?;
        let token = self.keys.issue(user.id, user.role, now)?;
        info!("Registered {} as {:?}", user.email, user.role);

        Ok(AuthResponse {
            message: "User created successfully".to_string(),
            token,
            user: user.into(),
        })
    }

    pub async fn verify(&self, caller: CurrentUser) -> CrmResult<UserResponse> {
        self.users
            .find_by_id(caller.id)
            .await?
            .map(UserResponse::from)
            .ok_or(CrmError::NotFound("User"))
    }

    /// Creates the configured administrator unless that email already exists.
    pub async fn seed_admin(&self, seed: &AdminSeed) -> CrmResult<()> {
        if self.users.find_by_email(&seed.email).await?.is_some() {
            info!("Admin {} already exists", seed.email);
            return Ok(());
        }

        let hash = hash_password(seed.password.clone()).await?;
        let admin = User::new(seed.name.clone(), &seed.email, hash, Role::Admin, self.clock.now());
        self.users.insert(admin).await?;
        info!("Seeded admin account {}", seed.email);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::SystemClock;
    use crate::store::MemoryStore;
    use chrono::TimeZone;

    fn service() -> AuthService {
        AuthService::new(
            Arc::new(MemoryStore::new()),
            JwtKeys::new("test-secret", 1),
            Arc::new(SystemClock),
        )
    }

    fn register(email: &str, role: Option<Role>) -> RegisterUser {
        RegisterUser {
            name: "Ravi".to_string(),
            email: email.to_string(),
            password: "hunter22".to_string(),
            role,
        }
    }

    #[test]
    fn test_token_round_trip() {
        let keys = JwtKeys::new("test-secret", 168);
        let id = Uuid::new_v4();
        let now = Utc::now();
        let token = keys.issue(id, Role::Admin, now).unwrap();
        let user = keys.verify(&token, now).unwrap();
        assert_eq!(user.id, id);
        assert_eq!(user.scope(), OwnerScope::All);

        let other = JwtKeys::new("another-secret", 168);
        assert!(matches!(other.verify(&token, now), Err(CrmError::Unauthorized(_))));
    }

    #[test]
    fn test_expired_token_is_rejected() {
        let keys = JwtKeys::new("test-secret", 1);
        let now = Utc::now();
        let token = keys
            .issue(Uuid::new_v4(), Role::CallingStaff, now - Duration::hours(3))
            .unwrap();
        assert!(matches!(
            keys.verify(&token, now),
            Err(CrmError::Unauthorized(msg)) if msg == "Token expired"
        ));
    }

    #[test]
    fn test_expiry_follows_injected_time() {
        let keys = JwtKeys::new("test-secret", 168);
        let issued = Utc.with_ymd_and_hms(2024, 7, 9, 5, 0, 0).unwrap();
        let token = keys.issue(Uuid::new_v4(), Role::Admin, issued).unwrap();

        assert!(keys.verify(&token, issued).is_ok());
        assert!(keys
            .verify(&token, issued + Duration::hours(168) - Duration::seconds(1))
            .is_ok());
        assert!(matches!(
            keys.verify(&token, issued + Duration::hours(168)),
            Err(CrmError::Unauthorized(msg)) if msg == "Token expired"
        ));
    }

    #[test]
    fn test_bearer_token() {
        assert_eq!(bearer_token("Bearer abc"), Some("abc"));
        assert_eq!(bearer_token("Bearer "), None);
        assert_eq!(bearer_token("Basic abc"), None);
    }

    #[tokio::test]
    async fn test_register_then_login() {
        let auth = service();
        let registered = auth
            .register(register("Ravi@Example.com", None))
            .await
            .unwrap();
        assert_eq!(registered.user.role, Role::CallingStaff);
        assert_eq!(registered.user.email, "ravi@example.com");

        let login = auth
            .login(LoginRequest {
                email: "ravi@example.com".to_string(),
                password: "hunter22".to_string(),
            })
            .await
            .unwrap();
        let caller = auth.keys().verify(&login.token, Utc::now()).unwrap();
        assert_eq!(caller.id, registered.user.id);
        assert_eq!(caller.scope(), OwnerScope::Owner(caller.id));

        let verified = auth.verify(caller).await.unwrap();
        assert_eq!(verified.email, "ravi@example.com");
    }

    #[tokio::test]
    async fn test_bad_credentials() {
        let auth = service();
        auth.register(register("ravi@example.com", None)).await.unwrap();

        let wrong = auth
            .login(LoginRequest {
                email: "ravi@example.com".to_string(),
                password: "nope-nope".to_string(),
            })
            .await;
        assert!(matches!(wrong, Err(CrmError::Unauthorized(_))));

        let unknown = auth
            .login(LoginRequest {
                email: "ghost@example.com".to_string(),
                password: "hunter22".to_string(),
            })
            .await;
        assert!(matches!(unknown, Err(CrmError::Unauthorized(_))));
    }

    #[tokio::test]
    async fn test_register_validation_and_conflict() {
        let auth = service();
        let mut short = register("a@example.com", None);
        short.password = "123".to_string();
        assert!(matches!(auth.register(short).await, Err(CrmError::Validation(_))));

        auth.register(register("a@example.com", None)).await.unwrap();
        assert!(matches!(
            auth.register(register("A@example.com", None)).await,
            Err(CrmError::Conflict(_))
        ));
    }

    #[tokio::test]
    async fn test_seed_admin_is_idempotent() {
        let auth = service();
        let seed = AdminSeed {
            name: "Admin User".to_string(),
            email: "admin@example.com".to_string(),
            password: "admin123".to_string(),
        };
        auth.seed_admin(&seed).await.unwrap();
        auth.seed_admin(&seed).await.unwrap();

        let login = auth
            .login(LoginRequest {
                email: seed.email.clone(),
                password: seed.password.clone(),
            })
            .await
            .unwrap();
        assert_eq!(login.user.role, Role::Admin);
    }
}
