// SPDX-License-Identifier: MIT OR Apache-2.0
//! Account management: registration, login, email verification, invite
//! completion.
//!
//! Passwords are PBKDF2-HMAC-SHA256; sessions are HS256 access tokens
//! signed with the process secret. The resend-verification cooldown
//! engages on the attempt — the timestamp is written before the mail is
//! handed to the transport, so a failing provider cannot be used to
//! hammer the send path.

#![deny(unsafe_code)]
#![warn(missing_docs)]

pub mod password;
pub mod token;

use chrono::Duration;
use qto_core::{Clock, EmailVerification, Invitation, User, UserId, UserRole};
use qto_error::{Error, Result};
use qto_mail::{Mail, Mailer};
use qto_store::Store;
use std::sync::Arc;
use tracing::{info, warn};
use uuid::Uuid;

/// Minimum accepted password length.
pub const MIN_PASSWORD_LEN: usize = 8;

/// Knobs the service needs from the deployment settings.
#[derive(Clone)]
pub struct AuthConfig {
    /// HMAC secret for access tokens.
    pub secret: Vec<u8>,
    /// Access-token lifetime in seconds.
    pub token_ttl_secs: u64,
    /// Cooldown between verification-mail attempts, per user.
    pub resend_cooldown_secs: u64,
    /// Credits granted on registration.
    pub signup_credits: u64,
    /// PBKDF2 iteration count.
    pub pbkdf2_iterations: u32,
}

/// The account service and its collaborators.
pub struct AuthService {
    store: Store,
    mailer: Arc<dyn Mailer>,
    clock: Arc<dyn Clock>,
    config: AuthConfig,
}

impl AuthService {
    /// Wire the service.
    pub fn new(
        store: Store,
        mailer: Arc<dyn Mailer>,
        clock: Arc<dyn Clock>,
        config: AuthConfig,
    ) -> Self {
        Self {
            store,
            mailer,
            clock,
            config,
        }
    }

    /// Register a new account and kick off email verification.
    pub fn register(&self, email: &str, password: &str, full_name: &str) -> Result<User> {
        let email = normalize_email(email)?;
        if password.len() < MIN_PASSWORD_LEN {
            return Err(Error::validation_field(
                "password",
                format!("password must be at least {MIN_PASSWORD_LEN} characters"),
            ));
        }

        let now = self.clock.now();
        let user = self.store.user_insert(User {
            id: Uuid::new_v4(),
            email: email.clone(),
            password_hash: password::hash_password(password, self.config.pbkdf2_iterations),
            role: UserRole::User,
            email_verified: false,
            credits_balance: self.config.signup_credits,
            full_name: full_name.trim().to_string(),
            created_at: now,
            last_verification_sent_at: Some(now),
            deactivated: false,
        })?;

        self.send_verification_mail(&user);
        info!(user_id = %user.id, "account registered");
        Ok(user)
    }

    /// Authenticate by credentials; returns the account and a fresh
    /// access token. Unknown addresses and wrong passwords are
    /// indistinguishable to the caller.
    pub fn login(&self, email: &str, password: &str) -> Result<(User, String)> {
        let generic = || Error::Unauthenticated("invalid email or password".into());
        let user = self
            .store
            .user_by_email(email.trim())
            .ok_or_else(generic)?;
        if !password::verify_password(password, &user.password_hash) {
            return Err(generic());
        }
        if !user.is_active() {
            return Err(Error::Unauthenticated("account is deactivated".into()));
        }
        let token = self.issue_token(user.id)?;
        Ok((user, token))
    }

    /// Issue an access token for an already-authenticated account.
    pub fn issue_token(&self, user_id: UserId) -> Result<String> {
        token::issue_access_token(
            &self.config.secret,
            user_id,
            self.config.token_ttl_secs,
            self.clock.as_ref(),
        )
    }

    /// Resolve a bearer token to an active account.
    pub fn authenticate(&self, bearer: &str) -> Result<User> {
        let user_id = token::verify_access_token(&self.config.secret, bearer)?;
        let user = self
            .store
            .user_get(user_id)
            .map_err(|_| Error::Unauthenticated("unknown account".into()))?;
        if !user.is_active() {
            return Err(Error::Unauthenticated("account is deactivated".into()));
        }
        Ok(user)
    }

    /// Consume a verification token.
    pub fn verify_email(&self, raw_token: &str) -> Result<User> {
        self.store
            .email_verification_consume(&token::token_hash(raw_token))
    }

    /// Re-send the verification mail, at most once per cooldown window.
    pub fn resend_verification(&self, user_id: UserId) -> Result<()> {
        let user = self.store.user_get(user_id)?;
        if user.email_verified {
            return Err(Error::validation("email is already verified"));
        }

        let now = self.clock.now();
        if let Some(last) = user.last_verification_sent_at {
            let cooldown = Duration::seconds(self.config.resend_cooldown_secs as i64);
            let elapsed = now - last;
            if elapsed < cooldown {
                return Err(Error::RateLimited {
                    retry_after_secs: (cooldown - elapsed).num_seconds().max(1) as u64,
                });
            }
        }

        // Stamp before sending: the cooldown throttles attempts, not
        // successful deliveries.
        let user = self
            .store
            .user_update(user_id, |u| u.last_verification_sent_at = Some(now))?;
        self.send_verification_mail(&user);
        Ok(())
    }

    /// Complete an invitation: create (or find) the account for the
    /// invited address, then accept the invitation, all against the same
    /// token.
    pub fn complete_invite(
        &self,
        raw_token: &str,
        password: &str,
        full_name: &str,
    ) -> Result<(User, Invitation, String)> {
        let hash = token::token_hash(raw_token);
        let invitation = self
            .store
            .invitation_by_token_hash(&hash)
            .ok_or_else(|| Error::not_found("invitation"))?;

        let user = match self.store.user_by_email(&invitation.email) {
            Some(existing) => existing,
            None => {
                if password.len() < MIN_PASSWORD_LEN {
                    return Err(Error::validation_field(
                        "password",
                        format!("password must be at least {MIN_PASSWORD_LEN} characters"),
                    ));
                }
                // Invited addresses arrive via that very mailbox, so the
                // account starts out verified.
                self.store.user_insert(User {
                    id: Uuid::new_v4(),
                    email: invitation.email.clone(),
                    password_hash: password::hash_password(
                        password,
                        self.config.pbkdf2_iterations,
                    ),
                    role: UserRole::User,
                    email_verified: true,
                    credits_balance: self.config.signup_credits,
                    full_name: full_name.trim().to_string(),
                    created_at: self.clock.now(),
                    last_verification_sent_at: None,
                    deactivated: false,
                })?
            }
        };

        let (invitation, _collab) = self.store.invitation_accept(&hash, user.id)?;
        let token = self.issue_token(user.id)?;
        Ok((user, invitation, token))
    }

    /// Admin-only credit grant.
    pub fn grant_credits(&self, actor_id: UserId, target: UserId, amount: u64) -> Result<u64> {
        let actor = self.store.user_get(actor_id)?;
        if !actor.is_admin() {
            return Err(Error::Forbidden("credit grants require an admin".into()));
        }
        let balance = self.store.credits_credit(target, amount)?;
        info!(actor = %actor_id, target = %target, amount, "credits granted");
        Ok(balance)
    }

    fn send_verification_mail(&self, user: &User) {
        let raw = token::random_token();
        let verification = EmailVerification {
            user_id: user.id,
            token_hash: token::token_hash(&raw),
            created_at: self.clock.now(),
        };
        if let Err(err) = self.store.email_verification_upsert(verification) {
            warn!(user_id = %user.id, error = %err, "could not store verification token");
            return;
        }
        let mail = Mail {
            to: user.email.clone(),
            subject: "Verify your email".into(),
            body: format!(
                "Hello {},\n\nConfirm your address with this token: {raw}\n",
                user.full_name
            ),
        };
        if let Err(err) = self.mailer.send(mail) {
            warn!(user_id = %user.id, error = %err, "verification mail not delivered");
        }
    }
}

fn normalize_email(email: &str) -> Result<String> {
    let email = email.trim().to_ascii_lowercase();
    let valid = email
        .split_once('@')
        .is_some_and(|(local, domain)| !local.is_empty() && domain.contains('.'));
    if !valid {
        return Err(Error::validation_field("email", "invalid email address"));
    }
    Ok(email)
}
