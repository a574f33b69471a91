/// Authentication flow
///
/// Login, refresh rotation, logout and password change on top of the
/// password verifier, the refresh token store and the access token blacklist.
/// Failures that involve credentials are reported uniformly so callers cannot
/// tell an unknown account from a wrong password.

use lazy_static::lazy_static;
use serde::Serialize;
use std::sync::Arc;
use uuid::Uuid;

use crate::auth::blacklist::AccessTokenBlacklist;
use crate::auth::claims::Claims;
use crate::auth::jwt::{generate_access_token, validate_access_token};
use crate::auth::password::{hash_password, validate_password_strength, verify_password};
use crate::auth::refresh_token::{generate_refresh_token, RefreshTokenStore};
use crate::clock::Clock;
use crate::configuration::JwtSettings;
use crate::error::{AppError, AuthError, DatabaseError};
use crate::models::{Account, StaffRole};
use crate::storage::AccountRepository;
use crate::validators::{is_valid_email, is_valid_name};

lazy_static! {
    // Verified against when the email is unknown so both paths cost one bcrypt run
    static ref UNKNOWN_ACCOUNT_DIGEST: String =
        hash_password("unknown-account-placeholder").unwrap_or_default();
}

/// Tokens handed to the client after login, registration or refresh
#[derive(Debug, Clone, Serialize)]
pub struct TokenPair {
    pub user_id: Uuid,
    pub access_token: String,
    pub refresh_token: String,
    pub token_type: String,
    pub expires_in: i64,
}

#[derive(Debug, Clone)]
pub struct NewAccount {
    pub email: String,
    pub name: String,
    pub password: String,
    pub role: StaffRole,
}

#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq)]
pub struct CleanupReport {
    pub refresh_tokens_deleted: u64,
    pub blacklist_entries_deleted: u64,
}

#[derive(Clone)]
pub struct AuthService {
    accounts: Arc<dyn AccountRepository>,
    refresh_tokens: RefreshTokenStore,
    blacklist: AccessTokenBlacklist,
    clock: Arc<dyn Clock>,
    jwt: JwtSettings,
}

impl AuthService {
    pub fn new(
        accounts: Arc<dyn AccountRepository>,
        refresh_tokens: RefreshTokenStore,
        blacklist: AccessTokenBlacklist,
        clock: Arc<dyn Clock>,
        jwt: JwtSettings,
    ) -> Self {
        Self {
            accounts,
            refresh_tokens,
            blacklist,
            clock,
            jwt,
        }
    }

    pub fn refresh_tokens(&self) -> &RefreshTokenStore {
        &self.refresh_tokens
    }

    pub fn blacklist(&self) -> &AccessTokenBlacklist {
        &self.blacklist
    }

    /// Store a new staff account with the given role.
    pub async fn create_account(&self, new_account: NewAccount) -> Result<Account, AppError> {
        let email = is_valid_email(&new_account.email)?;
        let name = is_valid_name("name", &new_account.name)?;
        validate_password_strength(&new_account.password)?;

        let now = self.clock.now();
        let account = Account {
            id: Uuid::new_v4(),
            email,
            name,
            password_hash: hash_password(&new_account.password)?,
            role: new_account.role,
            is_active: true,
            created_at: now,
            updated_at: now,
        };

        self.accounts.insert_account(&account).await?;
        tracing::info!(user_id = %account.id, role = account.role.as_str(), "Staff account created");
        Ok(account)
    }

    /// Self-service sign-up. Always creates a receptionist; other roles are
    /// granted by an admin through `create_account`.
    pub async fn register(
        &self,
        email: String,
        name: String,
        password: String,
    ) -> Result<(Account, TokenPair), AppError> {
        let account = self
            .create_account(NewAccount {
                email,
                name,
                password,
                role: StaffRole::Receptionist,
            })
            .await?;
        let tokens = self.issue_tokens(&account).await?;
        Ok((account, tokens))
    }

    /// Create the configured admin account unless the email is already taken.
    /// Returns the existing account untouched in that case.
    pub async fn ensure_admin(&self, email: &str, name: &str, password: &str) -> Result<Account, AppError> {
        let normalized = is_valid_email(email)?;
        if let Some(existing) = self.accounts.find_account_by_email(&normalized).await? {
            if existing.role != StaffRole::Admin {
                tracing::warn!(user_id = %existing.id, "Bootstrap admin email belongs to a non-admin account");
            }
            return Ok(existing);
        }

        self.create_account(NewAccount {
            email: normalized,
            name: name.to_string(),
            password: password.to_string(),
            role: StaffRole::Admin,
        })
        .await
    }

    /// Verify credentials and issue a token pair.
    pub async fn login(&self, email: &str, password: &str) -> Result<(Account, TokenPair), AppError> {
        let email = is_valid_email(email).map_err(|_| AuthError::InvalidCredentials)?;

        let account = match self.accounts.find_account_by_email(&email).await? {
            Some(account) => account,
            None => {
                let _ = verify_password(password, &UNKNOWN_ACCOUNT_DIGEST);
                return Err(AuthError::InvalidCredentials.into());
            }
        };

        let password_valid = verify_password(password, &account.password_hash)?;
        if !password_valid || !account.is_active {
            return Err(AuthError::InvalidCredentials.into());
        }

        let tokens = self.issue_tokens(&account).await?;
        tracing::info!(user_id = %account.id, "Staff member logged in");
        Ok((account, tokens))
    }

    /// Rotate a refresh token into a new pair.
    ///
    /// Presenting a token that was already rotated or revoked revokes every
    /// refresh token of the account before the request is rejected.
    pub async fn refresh(&self, account_id: Uuid, refresh_token: &str) -> Result<TokenPair, AppError> {
        let rotated = match self
            .refresh_tokens
            .rotate(account_id, refresh_token, self.jwt.refresh_token_ttl_days)
            .await
        {
            Ok(rotated) => rotated,
            Err(AppError::Auth(AuthError::TokenReuseDetected)) => {
                self.refresh_tokens.revoke_all(account_id).await?;
                tracing::warn!(user_id = %account_id, "Refresh token reuse, all sessions revoked");
                return Err(AuthError::TokenReuseDetected.into());
            }
            Err(e) => return Err(e),
        };

        let account = match self.accounts.find_account_by_id(account_id).await? {
            Some(account) if account.is_active => account,
            _ => {
                self.refresh_tokens.revoke_all(account_id).await?;
                return Err(AuthError::InvalidCredentials.into());
            }
        };

        let access_token = generate_access_token(&account, &self.jwt, self.clock.now())?;
        Ok(self.token_pair(account.id, access_token, rotated.token))
    }

    /// Validate an access token and make sure it was not logged out.
    pub async fn authenticate(&self, access_token: &str) -> Result<Claims, AppError> {
        let claims = validate_access_token(access_token, &self.jwt, self.clock.now())?;
        if self.blacklist.is_blacklisted(access_token).await? {
            return Err(AuthError::TokenRevoked.into());
        }
        Ok(claims)
    }

    /// Blacklist the presented access token until it expires and revoke every
    /// refresh token of the account. Returns the number of refresh tokens revoked.
    pub async fn logout(&self, access_token: &str, claims: &Claims) -> Result<u64, AppError> {
        let account_id = claims.user_id()?;
        self.blacklist.blacklist(access_token, claims.expires_at()).await?;
        let revoked = self.refresh_tokens.revoke_all(account_id).await?;

        tracing::info!(user_id = %account_id, "Staff member logged out");
        Ok(revoked)
    }

    /// Replace the password digest and end all existing sessions.
    pub async fn change_password(
        &self,
        account_id: Uuid,
        current_password: &str,
        new_password: &str,
    ) -> Result<u64, AppError> {
        let account = self
            .accounts
            .find_account_by_id(account_id)
            .await?
            .ok_or(AuthError::InvalidCredentials)?;

        if !verify_password(current_password, &account.password_hash)? {
            return Err(AuthError::InvalidCredentials.into());
        }
        validate_password_strength(new_password)?;

        let digest = hash_password(new_password)?;
        if !self
            .accounts
            .update_password_hash(account_id, &digest, self.clock.now())
            .await?
        {
            return Err(DatabaseError::NotFound("account".to_string()).into());
        }

        let revoked = self.refresh_tokens.revoke_all(account_id).await?;
        tracing::info!(user_id = %account_id, "Password changed");
        Ok(revoked)
    }

    pub async fn current_account(&self, account_id: Uuid) -> Result<Account, AppError> {
        match self.accounts.find_account_by_id(account_id).await? {
            Some(account) if account.is_active => Ok(account),
            _ => Err(AuthError::TokenInvalid.into()),
        }
    }

    /// Housekeeping for both token tables.
    pub async fn cleanup(&self) -> Result<CleanupReport, AppError> {
        let report = CleanupReport {
            refresh_tokens_deleted: self.refresh_tokens.cleanup().await?,
            blacklist_entries_deleted: self.blacklist.cleanup_expired().await?,
        };

        tracing::info!(
            refresh_tokens_deleted = report.refresh_tokens_deleted,
            blacklist_entries_deleted = report.blacklist_entries_deleted,
            "Token cleanup finished"
        );
        Ok(report)
    }

    async fn issue_tokens(&self, account: &Account) -> Result<TokenPair, AppError> {
        let access_token = generate_access_token(account, &self.jwt, self.clock.now())?;
        let refresh_token = generate_refresh_token();
        self.refresh_tokens
            .issue(account.id, &refresh_token, self.jwt.refresh_token_ttl_days)
            .await?;

        Ok(self.token_pair(account.id, access_token, refresh_token))
    }

    fn token_pair(&self, user_id: Uuid, access_token: String, refresh_token: String) -> TokenPair {
        TokenPair {
            user_id,
            access_token,
            refresh_token,
            token_type: "Bearer".to_string(),
            expires_in: self.jwt.access_token_expiry,
        }
    }
}
