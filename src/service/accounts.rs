use std::sync::Arc;

use serde::{Deserialize, Serialize};
use time::{Date, OffsetDateTime};
use tracing::{info, warn};

use crate::domain::role::USER;
use crate::domain::user::{NewUser, ProfileUpdate, ProfileView, User, UserId};
use crate::error::{ApiError, FieldErrors};
use crate::infra::users::{RoleStore, UserStore};
use crate::security::jwt::JwtManager;
use crate::security::password::PasswordHasher;

const MAX_USERNAME_LEN: usize = 64;
const MAX_EMAIL_LEN: usize = 255;
const MAX_TEXT_LEN: usize = 256;

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RegisterRequest {
    pub username: String,
    pub email: String,
    pub password: String,
    pub full_name: Option<String>,
    pub address: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LoginRequest {
    /// Either the username or the email address.
    #[serde(alias = "username")]
    pub username_or_email: String,
    pub password: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LoginResponse {
    pub token: String,
    #[serde(with = "time::serde::rfc3339")]
    pub expiration: OffsetDateTime,
    pub user_id: UserId,
    pub username: String,
    pub full_name: Option<String>,
    pub email: String,
    pub roles: Vec<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateProfileRequest {
    pub full_name: Option<String>,
    pub birth_date: Option<Date>,
    pub address: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChangePasswordRequest {
    pub current_password: String,
    pub new_password: String,
}

/// Registration, login and self-service account flows.
#[derive(Clone)]
pub struct AccountService {
    users: Arc<dyn UserStore>,
    roles: Arc<dyn RoleStore>,
    hasher: PasswordHasher,
    jwt: JwtManager,
}

impl AccountService {
    pub fn new(
        users: Arc<dyn UserStore>,
        roles: Arc<dyn RoleStore>,
        hasher: PasswordHasher,
        jwt: JwtManager,
    ) -> Self {
        Self {
            users,
            roles,
            hasher,
            jwt,
        }
    }

    /// Nothing touches the store until the request and the password pass validation.
    pub async fn register(&self, req: RegisterRequest) -> Result<UserId, ApiError> {
        validate_registration(&req)?;
        self.hasher.policy().check(&req.password)?;

        if self.users.find_by_email(&req.email).await?.is_some() {
            return Err(ApiError::DuplicateEmail);
        }
        if self.users.find_by_username(&req.username).await?.is_some() {
            return Err(ApiError::DuplicateUsername);
        }

        let password_hash = self.hasher.hash(&req.password).await?;
        let new = NewUser {
            username: req.username,
            email: req.email,
            password_hash,
            full_name: req.full_name.filter(|v| !v.is_empty()),
            address: req.address.filter(|v| !v.is_empty()),
        };
        // Concurrent registrations that slip past the pre-check are caught by
        // the unique constraints inside create_user.
        let user = self.users.create_user(new, USER).await?;
        info!(user_id = %user.id, username = %user.username, "user registered");
        Ok(user.id)
    }

    /// Unknown account and wrong password produce the same error.
    pub async fn login(&self, req: LoginRequest) -> Result<LoginResponse, ApiError> {
        if req.username_or_email.is_empty() || req.password.is_empty() {
            self.hasher.verify_dummy(&req.password).await?;
            warn!("login failed: empty identifier or password");
            return Err(ApiError::InvalidCredentials);
        }

        // Usernames may look like email addresses, so the identifier can name
        // two different accounts. Each one gets a chance to match.
        let mut candidates: Vec<User> = Vec::with_capacity(2);
        candidates.extend(self.users.find_by_username(&req.username_or_email).await?);
        if let Some(user) = self.users.find_by_email(&req.username_or_email).await? {
            if candidates.iter().all(|c| c.id != user.id) {
                candidates.push(user);
            }
        }
        if candidates.is_empty() {
            self.hasher.verify_dummy(&req.password).await?;
            warn!("login failed: unknown account");
            return Err(ApiError::InvalidCredentials);
        }

        let mut matched = None;
        for candidate in candidates {
            if self
                .hasher
                .verify(&req.password, &candidate.password_hash)
                .await?
            {
                matched = Some(candidate);
                break;
            }
        }
        let Some(user) = matched else {
            warn!("login failed: wrong password");
            return Err(ApiError::InvalidCredentials);
        };

        let now = OffsetDateTime::now_utc();
        self.users.record_login(user.id, now).await?;
        let roles = self.roles.roles_of(user.id).await?;
        let issued = self.jwt.issue_at(&user, roles.clone(), now)?;
        info!(user_id = %user.id, "login succeeded");

        Ok(LoginResponse {
            token: issued.token,
            expiration: issued.expires_at,
            user_id: user.id,
            username: user.username,
            full_name: user.full_name,
            email: user.email,
            roles,
        })
    }

    pub async fn profile(&self, user_id: UserId) -> Result<ProfileView, ApiError> {
        let user = self.load(user_id).await?;
        let roles = self.roles.roles_of(user_id).await?;
        Ok(ProfileView::new(user, roles))
    }

    pub async fn update_profile(
        &self,
        user_id: UserId,
        req: UpdateProfileRequest,
    ) -> Result<ProfileView, ApiError> {
        let mut fields = FieldErrors::new();
        check_text(&mut fields, "fullName", req.full_name.as_deref());
        check_text(&mut fields, "address", req.address.as_deref());
        if !fields.is_empty() {
            return Err(ApiError::Validation(fields));
        }

        let user = self
            .users
            .update_profile(
                user_id,
                ProfileUpdate {
                    full_name: req.full_name,
                    birth_date: req.birth_date,
                    address: req.address,
                },
            )
            .await?;
        let roles = self.roles.roles_of(user_id).await?;
        Ok(ProfileView::new(user, roles))
    }

    /// Tokens issued before the change stay valid until they expire.
    pub async fn change_password(
        &self,
        user_id: UserId,
        req: ChangePasswordRequest,
    ) -> Result<(), ApiError> {
        let user = self.load(user_id).await?;
        if !self
            .hasher
            .verify(&req.current_password, &user.password_hash)
            .await?
        {
            return Err(ApiError::WrongCurrentPassword);
        }
        let hash = self.hasher.hash(&req.new_password).await?;
        self.users.set_password_hash(user_id, &hash).await?;
        info!(user_id = %user_id, "password changed");
        Ok(())
    }

    async fn load(&self, user_id: UserId) -> Result<User, ApiError> {
        self.users
            .find_by_id(user_id)
            .await?
            .ok_or(ApiError::NotFound("user"))
    }
}

fn validate_registration(req: &RegisterRequest) -> Result<(), ApiError> {
    let mut fields = FieldErrors::new();

    if req.username.is_empty() {
        push(&mut fields, "username", "is required");
    } else if req.username.chars().count() > MAX_USERNAME_LEN {
        push(
            &mut fields,
            "username",
            &format!("must be at most {MAX_USERNAME_LEN} characters"),
        );
    } else if !req.username.chars().all(is_username_char) {
        push(
            &mut fields,
            "username",
            "may only contain letters, digits and - . _ @ +",
        );
    }

    if !is_valid_email(&req.email) {
        push(&mut fields, "email", "is not a valid email address");
    }

    if req.password.is_empty() {
        push(&mut fields, "password", "is required");
    }

    check_text(&mut fields, "fullName", req.full_name.as_deref());
    check_text(&mut fields, "address", req.address.as_deref());

    if fields.is_empty() {
        Ok(())
    } else {
        Err(ApiError::Validation(fields))
    }
}

fn is_username_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || matches!(c, '-' | '.' | '_' | '@' | '+')
}

fn is_valid_email(email: &str) -> bool {
    if email.len() > MAX_EMAIL_LEN || email.chars().any(char::is_whitespace) {
        return false;
    }
    match email.split_once('@') {
        Some((local, domain)) => !local.is_empty() && !domain.is_empty() && !domain.contains('@'),
        None => false,
    }
}

fn check_text(fields: &mut FieldErrors, name: &str, value: Option<&str>) {
    if let Some(v) = value {
        if v.chars().count() > MAX_TEXT_LEN {
            push(fields, name, &format!("must be at most {MAX_TEXT_LEN} characters"));
        }
    }
}

fn push(fields: &mut FieldErrors, name: &str, message: &str) {
    fields
        .entry(name.to_string())
        .or_default()
        .push(message.to_string());
}
