// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! # Identity Use Cases
//!
//! Composes the OTP store, the token issuer, the revocation registry and the
//! user repository into the login, registration, refresh and logout flows.
//!
//! ## Mobile register-or-login
//!
//! 1. Validate the OTP; any OTP error is returned unchanged
//! 2. If a user owns the mobile number, issue tokens for it unless the
//!    account is disabled
//! 3. Otherwise create the user (username = mobile number, random
//!    placeholder password) together with its default role assignment in a
//!    single transaction, reload it with roles and issue tokens
//!
//! Creation failures on that path surface as `Internal`: the OTP was valid,
//! so the client did nothing wrong.

mod error;

pub use error::ServiceError;

use std::sync::Arc;

use secrecy::ExposeSecret;
use tracing::{error, info, warn};

use crate::auth::{
    extract_bearer_token, extractor::ensure_not_revoked, password, AuthError, IdentityClaims,
    PasswordPolicy, RevocationRegistry, TokenIssuer,
};
use crate::config::{AdminSeed, AppConfig};
use crate::models::{
    LoginByUsernameRequest, RegisterByUsernameRequest, RegisterLoginByMobileRequest, TokenDetail,
};
use crate::otp::{generate_otp, OtpSender, OtpStore};
use crate::storage::{
    AuditActor, AuthDatabase, NewUser, StorageError, UserRepository, UserWithRoles,
};

pub struct IdentityService {
    db: Arc<AuthDatabase>,
    otp: OtpStore,
    tokens: Arc<TokenIssuer>,
    blacklist: RevocationRegistry,
    sender: Arc<dyn OtpSender>,
    otp_digits: u32,
    password_policy: PasswordPolicy,
    bcrypt_cost: u32,
    default_role_name: String,
    admin_role_name: String,
}

impl IdentityService {
    pub fn new(
        db: Arc<AuthDatabase>,
        otp: OtpStore,
        tokens: Arc<TokenIssuer>,
        blacklist: RevocationRegistry,
        sender: Arc<dyn OtpSender>,
        config: &AppConfig,
    ) -> Self {
        Self {
            db,
            otp,
            tokens,
            blacklist,
            sender,
            otp_digits: config.otp_digits,
            password_policy: config.password_policy.clone(),
            bcrypt_cost: config.bcrypt_cost,
            default_role_name: config.default_role_name.clone(),
            admin_role_name: config.admin_role_name.clone(),
        }
    }

    fn users(&self) -> UserRepository<'_> {
        UserRepository::new(&self.db)
    }

    fn issue_for(&self, user: &UserWithRoles) -> Result<TokenDetail, ServiceError> {
        Ok(self.tokens.issue(&IdentityClaims::from(user))?)
    }

    /// Generate, store and deliver a code for `mobile_number`.
    ///
    /// Delivery happens only after the code is stored, and a failed delivery
    /// does not fail the call.
    pub fn send_otp(&self, mobile_number: &str) -> Result<(), ServiceError> {
        let code = generate_otp(self.otp_digits);
        self.otp.issue(mobile_number, &code)?;

        if let Err(e) = self.sender.send(mobile_number, &code) {
            warn!(mobile_number, error = %e, "OTP delivery failed");
        }
        Ok(())
    }

    /// Password login. An unknown username and a wrong password are
    /// indistinguishable to the caller.
    pub fn login_by_username(&self, req: &LoginByUsernameRequest) -> Result<TokenDetail, ServiceError> {
        let user = self
            .users()
            .find_user_by_username(&req.username)?
            .ok_or(ServiceError::InvalidCredentials)?;

        if !password::verify_password(&req.password, &user.user.password_hash) {
            return Err(ServiceError::InvalidCredentials);
        }
        if !user.user.enabled {
            return Err(ServiceError::PermissionDenied);
        }

        info!(user_id = user.user.id, "User logged in by username");
        self.issue_for(&user)
    }

    /// Create an account with the default role.
    pub fn register_by_username(
        &self,
        req: &RegisterByUsernameRequest,
        actor: AuditActor,
    ) -> Result<(), ServiceError> {
        let users = self.users();
        if let Some(email) = req.email.as_deref() {
            if users.exists_by_email(email)? {
                return Err(ServiceError::EmailExists);
            }
        }
        if users.exists_by_username(&req.username)? {
            return Err(ServiceError::UsernameExists);
        }

        let password_hash = password::hash_password(&req.password, self.bcrypt_cost)?;
        let role_id = users.default_role_id(&self.default_role_name)?;

        let created = users
            .create_user_with_default_role(
                NewUser {
                    username: req.username.clone(),
                    first_name: req.first_name.clone(),
                    last_name: req.last_name.clone(),
                    mobile_number: None,
                    email: req.email.clone(),
                    password_hash,
                },
                role_id,
                actor,
            )
            .map_err(|e| match e {
                // Lost a race with a concurrent registration.
                StorageError::Conflict("email") => ServiceError::EmailExists,
                StorageError::Conflict("username") => ServiceError::UsernameExists,
                StorageError::Conflict("mobile_number") => ServiceError::MobileNumberExists,
                other => {
                    error!(error = %other, "User creation rolled back");
                    ServiceError::from(other)
                }
            })?;

        info!(user_id = created.id, created_by = created.created_by, "User registered by username");
        Ok(())
    }

    /// Validate the OTP, then log the owner of the number in, creating the
    /// account first if there is none.
    pub fn register_login_by_mobile(
        &self,
        req: &RegisterLoginByMobileRequest,
        actor: AuditActor,
    ) -> Result<TokenDetail, ServiceError> {
        self.otp.validate(&req.mobile_number, &req.otp)?;

        let users = self.users();
        if let Some(user) = users.find_user_by_mobile(&req.mobile_number)? {
            if !user.user.enabled {
                return Err(ServiceError::PermissionDenied);
            }
            info!(user_id = user.user.id, "User logged in by mobile");
            return self.issue_for(&user);
        }

        let user_id = self.create_mobile_user(&users, &req.mobile_number, actor)?;
        let user = users
            .find_user_by_id(user_id)?
            .ok_or_else(|| ServiceError::Internal(format!("user {user_id} vanished after creation")))?;

        info!(user_id, "User registered by mobile");
        self.issue_for(&user)
    }

    fn create_mobile_user(
        &self,
        users: &UserRepository<'_>,
        mobile_number: &str,
        actor: AuditActor,
    ) -> Result<u64, ServiceError> {
        let internal = |stage: &str, detail: String| {
            error!(mobile_number, stage, error = %detail, "Mobile user creation failed");
            ServiceError::Internal(format!("{stage}: {detail}"))
        };

        let placeholder = password::generate_password(&self.password_policy);
        let password_hash = password::hash_password(&placeholder, self.bcrypt_cost)
            .map_err(|e| internal("hash_password", format!("{e:?}")))?;
        let role_id = users
            .default_role_id(&self.default_role_name)
            .map_err(|e| internal("default_role", e.to_string()))?;

        let created = users
            .create_user_with_default_role(
                NewUser {
                    username: mobile_number.to_string(),
                    first_name: String::new(),
                    last_name: String::new(),
                    mobile_number: Some(mobile_number.to_string()),
                    email: None,
                    password_hash,
                },
                role_id,
                actor,
            )
            .map_err(|e| internal("create_user", e.to_string()))?;
        Ok(created.id)
    }

    /// Exchange a refresh token for a new pair. The presented refresh token
    /// is revoked for the rest of its lifetime.
    pub fn refresh(&self, refresh_token: &str) -> Result<TokenDetail, ServiceError> {
        let claims = self.tokens.verify_refresh(refresh_token)?;
        ensure_not_revoked(&self.blacklist, refresh_token)?;

        let user = self
            .users()
            .find_user_by_id(claims.user_id)?
            .ok_or(AuthError::TokenInvalid)?;
        if !user.user.enabled {
            return Err(ServiceError::PermissionDenied);
        }

        // Only the caller that moves the token onto the list gets a new pair.
        if !self.blacklist.claim_until(refresh_token, claims.exp)? {
            return Err(AuthError::TokenRevoked.into());
        }
        let detail = self.issue_for(&user)?;
        info!(user_id = claims.user_id, "Token pair refreshed");
        Ok(detail)
    }

    /// Revoke the bearer access token and the given refresh token.
    ///
    /// Both tokens are verified before either is revoked. The first failing
    /// revocation is reported.
    pub fn logout(&self, authorization: Option<&str>, refresh_token: &str) -> Result<(), ServiceError> {
        let access_token = extract_bearer_token(authorization)?;
        let access = self.tokens.verify_access(access_token)?;
        let refresh = self.tokens.verify_refresh(refresh_token)?;

        self.blacklist.revoke_until(access_token, access.exp)?;
        self.blacklist.revoke_until(refresh_token, refresh.exp)?;

        info!(user_id = access.user_id, "User logged out");
        Ok(())
    }

    pub fn find_user(&self, username: &str) -> Result<UserWithRoles, ServiceError> {
        self.users()
            .find_user_by_username(username)?
            .ok_or(ServiceError::RecordNotFound)
    }

    /// Make sure the admin and default roles exist and create the configured
    /// admin account, if any.
    pub fn seed(&self, admin: Option<&AdminSeed>) -> Result<(), ServiceError> {
        let users = self.users();
        let admin_role = users.ensure_role(&self.admin_role_name, AuditActor::UNKNOWN)?;
        users.ensure_role(&self.default_role_name, AuditActor::UNKNOWN)?;

        let Some(admin) = admin else {
            return Ok(());
        };
        let password_hash = password::hash_password(admin.password.expose_secret(), self.bcrypt_cost)?;
        let seeded = users.seed_admin(
            NewUser {
                username: admin.username.clone(),
                first_name: admin.first_name.clone(),
                last_name: admin.last_name.clone(),
                mobile_number: admin.mobile_number.clone(),
                email: admin.email.clone(),
                password_hash,
            },
            admin_role,
        )?;
        if let Some(user) = seeded {
            info!(user_id = user.id, username = %user.username, "Admin user seeded");
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::sync::{Barrier, Mutex};

    use redb::ReadableTable;

    use super::*;
    use crate::otp::{DeliveryError, OtpError};
    use crate::storage::{database::USERS, KvStore, UserRecord};
    use secrecy::SecretString;

    const MOBILE: &str = "09123456789";

    /// Captures delivered codes so tests can log in with them.
    #[derive(Default)]
    struct CapturingSender {
        sent: Mutex<Vec<(String, String)>>,
        fail: bool,
    }

    impl CapturingSender {
        fn last_code(&self) -> String {
            self.sent.lock().unwrap().last().unwrap().1.clone()
        }
    }

    impl OtpSender for CapturingSender {
        fn send(&self, mobile_number: &str, code: &str) -> Result<(), DeliveryError> {
            self.sent
                .lock()
                .unwrap()
                .push((mobile_number.to_string(), code.to_string()));
            if self.fail {
                return Err(DeliveryError("gateway down".into()));
            }
            Ok(())
        }
    }

    struct Fixture {
        service: IdentityService,
        sender: Arc<CapturingSender>,
        blacklist: RevocationRegistry,
        tokens: Arc<TokenIssuer>,
        db: Arc<AuthDatabase>,
    }

    fn fixture_with(sender: CapturingSender, admin: Option<AdminSeed>) -> Fixture {
        let config = AppConfig::for_tests();
        let db = Arc::new(AuthDatabase::in_memory().unwrap());
        let kv = KvStore::new(db.clone());
        let otp = OtpStore::new(kv.clone(), config.otp_key_prefix.clone(), config.otp_expire);
        let tokens = Arc::new(TokenIssuer::new(
            &config.jwt_secret,
            &config.jwt_refresh_secret,
            config.access_token_ttl,
            config.refresh_token_ttl,
        ));
        let blacklist = RevocationRegistry::new(kv);
        let sender = Arc::new(sender);
        let service = IdentityService::new(
            db.clone(),
            otp,
            tokens.clone(),
            blacklist.clone(),
            sender.clone(),
            &config,
        );
        service.seed(admin.as_ref()).unwrap();
        Fixture {
            service,
            sender,
            blacklist,
            tokens,
            db,
        }
    }

    fn fixture() -> Fixture {
        fixture_with(CapturingSender::default(), None)
    }

    fn mobile_login(f: &Fixture) -> Result<TokenDetail, ServiceError> {
        f.service.send_otp(MOBILE).unwrap();
        f.service.register_login_by_mobile(
            &RegisterLoginByMobileRequest {
                mobile_number: MOBILE.to_string(),
                otp: f.sender.last_code(),
            },
            AuditActor::UNKNOWN,
        )
    }

    fn disable_user(f: &Fixture, user_id: u64) {
        let txn = f.db.inner().begin_write().unwrap();
        {
            let mut users = txn.open_table(USERS).unwrap();
            let mut record: UserRecord = {
                let raw = users.get(user_id).unwrap().unwrap();
                serde_json::from_slice(raw.value()).unwrap()
            };
            record.enabled = false;
            let json = serde_json::to_vec(&record).unwrap();
            users.insert(user_id, json.as_slice()).unwrap();
        }
        txn.commit().unwrap();
    }

    fn register_request(username: &str, email: Option<&str>) -> RegisterByUsernameRequest {
        RegisterByUsernameRequest {
            first_name: "Ada".to_string(),
            last_name: "Lovelace".to_string(),
            username: username.to_string(),
            email: email.map(str::to_string),
            password: "engine1843".to_string(),
        }
    }

    #[test]
    fn send_otp_twice_conflicts() {
        let f = fixture();
        f.service.send_otp(MOBILE).unwrap();
        assert!(matches!(
            f.service.send_otp(MOBILE),
            Err(ServiceError::Otp(OtpError::Exists))
        ));
        assert_eq!(f.sender.sent.lock().unwrap().len(), 1);
    }

    #[test]
    fn delivery_failure_does_not_fail_send_otp() {
        let f = fixture_with(
            CapturingSender {
                fail: true,
                ..Default::default()
            },
            None,
        );
        assert!(f.service.send_otp(MOBILE).is_ok());
    }

    #[test]
    fn mobile_login_creates_user_with_default_role() {
        let f = fixture();
        let detail = mobile_login(&f).unwrap();

        let claims = f.tokens.verify_access(&detail.access_token).unwrap();
        assert_eq!(claims.mobile_number.as_deref(), Some(MOBILE));
        assert_eq!(claims.username, MOBILE);
        assert_eq!(claims.roles, vec!["default".to_string()]);

        let repo = UserRepository::new(&f.db);
        let stored = repo.find_user_by_mobile(MOBILE).unwrap().unwrap();
        assert_eq!(stored.user.id, claims.user_id);
        assert_eq!(stored.user.created_by, crate::storage::UNKNOWN_ACTOR);
        assert_eq!(repo.role_assignment_count().unwrap(), 1);
    }

    #[test]
    fn mobile_login_reuses_existing_user() {
        let f = fixture();
        let repo = UserRepository::new(&f.db);
        let role_id = repo.default_role_id("default").unwrap();
        let existing = repo
            .create_user_with_default_role(
                NewUser {
                    username: "grace_h".to_string(),
                    first_name: "Grace".to_string(),
                    last_name: "Hopper".to_string(),
                    mobile_number: Some(MOBILE.to_string()),
                    email: None,
                    password_hash: "unused".to_string(),
                },
                role_id,
                AuditActor::UNKNOWN,
            )
            .unwrap();

        let detail = mobile_login(&f).unwrap();
        let claims = f.tokens.verify_access(&detail.access_token).unwrap();
        assert_eq!(claims.user_id, existing.id);
        assert_eq!(claims.username, "grace_h");
        assert_eq!(repo.role_assignment_count().unwrap(), 1);
    }

    #[test]
    fn mobile_login_with_wrong_code_surfaces_otp_error() {
        let f = fixture();
        f.service.send_otp(MOBILE).unwrap();
        let wrong = if f.sender.last_code() == "111111" { "222222" } else { "111111" };

        let result = f.service.register_login_by_mobile(
            &RegisterLoginByMobileRequest {
                mobile_number: MOBILE.to_string(),
                otp: wrong.to_string(),
            },
            AuditActor::UNKNOWN,
        );
        assert!(matches!(result, Err(ServiceError::Otp(OtpError::NotValid))));
        assert!(!UserRepository::new(&f.db).exists_by_mobile_number(MOBILE).unwrap());
    }

    #[test]
    fn mobile_login_without_code_is_not_found() {
        let f = fixture();
        let result = f.service.register_login_by_mobile(
            &RegisterLoginByMobileRequest {
                mobile_number: MOBILE.to_string(),
                otp: "123456".to_string(),
            },
            AuditActor::UNKNOWN,
        );
        assert!(matches!(result, Err(ServiceError::Otp(OtpError::NotFound))));
    }

    #[test]
    fn register_then_login_by_username() {
        let f = fixture();
        f.service
            .register_by_username(&register_request("ada_l", Some("ada@example.com")), AuditActor(Some(9)))
            .unwrap();

        let detail = f
            .service
            .login_by_username(&LoginByUsernameRequest {
                username: "ada_l".to_string(),
                password: "engine1843".to_string(),
            })
            .unwrap();
        let claims = f.tokens.verify_access(&detail.access_token).unwrap();
        assert_eq!(claims.email.as_deref(), Some("ada@example.com"));

        let stored = f.service.find_user("ada_l").unwrap();
        assert_eq!(stored.user.created_by, 9);
    }

    #[test]
    fn register_conflicts() {
        let f = fixture();
        f.service
            .register_by_username(&register_request("ada_l", Some("ada@example.com")), AuditActor::UNKNOWN)
            .unwrap();

        assert!(matches!(
            f.service.register_by_username(
                &register_request("someone_else", Some("ADA@example.com")),
                AuditActor::UNKNOWN
            ),
            Err(ServiceError::EmailExists)
        ));
        assert!(matches!(
            f.service
                .register_by_username(&register_request("ada_l", None), AuditActor::UNKNOWN),
            Err(ServiceError::UsernameExists)
        ));
    }

    #[test]
    fn wrong_password_and_unknown_user_look_the_same() {
        let f = fixture();
        f.service
            .register_by_username(&register_request("ada_l", None), AuditActor::UNKNOWN)
            .unwrap();

        let wrong_password = f.service.login_by_username(&LoginByUsernameRequest {
            username: "ada_l".to_string(),
            password: "nope123".to_string(),
        });
        let unknown_user = f.service.login_by_username(&LoginByUsernameRequest {
            username: "nobody".to_string(),
            password: "engine1843".to_string(),
        });
        assert!(matches!(wrong_password, Err(ServiceError::InvalidCredentials)));
        assert!(matches!(unknown_user, Err(ServiceError::InvalidCredentials)));
    }

    #[test]
    fn logout_revokes_both_tokens() {
        let f = fixture();
        let detail = mobile_login(&f).unwrap();

        f.service
            .logout(Some(&format!("Bearer {}", detail.access_token)), &detail.refresh_token)
            .unwrap();

        assert!(f.blacklist.is_revoked(&detail.access_token).unwrap());
        assert!(f.blacklist.is_revoked(&detail.refresh_token).unwrap());
        // Signature alone would still pass.
        assert!(f.tokens.verify_access(&detail.access_token).is_ok());
    }

    #[test]
    fn logout_requires_bearer_and_valid_refresh() {
        let f = fixture();
        let detail = mobile_login(&f).unwrap();

        assert!(matches!(
            f.service.logout(None, &detail.refresh_token),
            Err(ServiceError::Auth(AuthError::MissingAuthHeader))
        ));
        assert!(matches!(
            f.service.logout(Some(&detail.access_token), &detail.access_token),
            Err(ServiceError::Auth(AuthError::TokenInvalid))
        ));
        // Nothing was revoked by the failed attempts.
        assert!(!f.blacklist.is_revoked(&detail.access_token).unwrap());
    }

    #[test]
    fn refresh_rotates_the_refresh_token() {
        let f = fixture();
        let detail = mobile_login(&f).unwrap();

        let renewed = f.service.refresh(&detail.refresh_token).unwrap();
        assert!(f.tokens.verify_access(&renewed.access_token).is_ok());
        assert!(f.blacklist.is_revoked(&detail.refresh_token).unwrap());

        assert!(matches!(
            f.service.refresh(&detail.refresh_token),
            Err(ServiceError::Auth(AuthError::TokenRevoked))
        ));
    }

    #[test]
    fn concurrent_refresh_with_one_token_succeeds_once() {
        let f = fixture();
        let detail = mobile_login(&f).unwrap();
        let barrier = Barrier::new(8);

        let successes = std::thread::scope(|s| {
            let handles: Vec<_> = (0..8)
                .map(|_| {
                    s.spawn(|| {
                        barrier.wait();
                        f.service.refresh(&detail.refresh_token).is_ok()
                    })
                })
                .collect();
            handles
                .into_iter()
                .map(|h| h.join().unwrap())
                .filter(|ok| *ok)
                .count()
        });
        assert_eq!(successes, 1);
    }

    #[test]
    fn disabled_user_cannot_log_in_by_mobile() {
        let f = fixture();
        let repo = UserRepository::new(&f.db);
        let role_id = repo.default_role_id("default").unwrap();
        let existing = repo
            .create_user_with_default_role(
                NewUser {
                    username: "grace_h".to_string(),
                    first_name: "Grace".to_string(),
                    last_name: "Hopper".to_string(),
                    mobile_number: Some(MOBILE.to_string()),
                    email: None,
                    password_hash: "unused".to_string(),
                },
                role_id,
                AuditActor::UNKNOWN,
            )
            .unwrap();
        disable_user(&f, existing.id);

        assert!(matches!(mobile_login(&f), Err(ServiceError::PermissionDenied)));
    }

    #[test]
    fn disabled_user_cannot_refresh() {
        let f = fixture();
        let detail = mobile_login(&f).unwrap();
        let user_id = f.tokens.verify_access(&detail.access_token).unwrap().user_id;
        disable_user(&f, user_id);

        assert!(matches!(
            f.service.refresh(&detail.refresh_token),
            Err(ServiceError::PermissionDenied)
        ));
        assert!(!f.blacklist.is_revoked(&detail.refresh_token).unwrap());
    }

    #[test]
    fn seed_creates_roles_and_admin() {
        let admin = AdminSeed {
            username: "administrator".to_string(),
            first_name: "Admin".to_string(),
            last_name: "User".to_string(),
            mobile_number: None,
            email: Some("admin@example.com".to_string()),
            password: SecretString::from("adminpass1"),
        };
        let f = fixture_with(CapturingSender::default(), Some(admin));

        let detail = f
            .service
            .login_by_username(&LoginByUsernameRequest {
                username: "administrator".to_string(),
                password: "adminpass1".to_string(),
            })
            .unwrap();
        let claims = f.tokens.verify_access(&detail.access_token).unwrap();
        assert_eq!(claims.roles, vec!["admin".to_string()]);

        // Seeding again is harmless.
        f.service.seed(None).unwrap();
    }
}
