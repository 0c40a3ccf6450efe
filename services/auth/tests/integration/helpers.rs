#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use chrono::{DateTime, Duration, Utc};
use uuid::Uuid;

use cermont_auth::domain::repository::{
    AuditLogRepository, EventPublisher, OneTimeCodeRepository, SessionRepository, SideEffect,
    TaskSpawner, TokenDenylist, UserCache, UserRepository,
};
use cermont_auth::domain::types::{
    AuditAction, AuditEntry, LoginAttempts, NewUser, OneTimeCode, OutboxEvent, RefreshSession,
    UserRecord,
};
use cermont_auth::error::AuthServiceError;
use cermont_auth::infra::password::PasswordHasher;
use cermont_auth::usecase::account::{ChangePasswordUseCase, GetCurrentUserUseCase, RegisterUseCase};
use cermont_auth::usecase::guard::AuthenticateUseCase;
use cermont_auth::usecase::login::LoginUseCase;
use cermont_auth::usecase::logout::LogoutUseCase;
use cermont_auth::usecase::refresh::RefreshUseCase;
use cermont_auth::usecase::two_factor::OneTimeCodeService;
use cermont_auth_types::identity::Principal;
use cermont_auth_types::token::TokenSigner;
use cermont_domain::id::FamilyId;
use cermont_domain::user::UserRole;

pub const TEST_JWT_SECRET: &str = "integration-test-secret";
pub const TEST_PASSWORD: &str = "correct horse battery";

pub fn signer() -> TokenSigner {
    TokenSigner::new(TEST_JWT_SECRET, 900)
}

pub fn hasher() -> PasswordHasher {
    PasswordHasher::insecure_fast()
}

// ── Fixtures ─────────────────────────────────────────────────────────────────

pub async fn user_with_role(email: &str, role: UserRole) -> UserRecord {
    UserRecord {
        id: Uuid::now_v7(),
        email: email.to_owned(),
        password_hash: hasher().hash(TEST_PASSWORD).await.unwrap(),
        name: "Test User".to_owned(),
        role,
        active: true,
        failed_login_attempts: 0,
        locked_until: None,
        two_factor_enabled: false,
        last_login_at: None,
        created_at: Utc::now(),
    }
}

pub async fn technician(email: &str) -> UserRecord {
    user_with_role(email, UserRole::Technician).await
}

pub async fn admin_with_two_factor(email: &str) -> UserRecord {
    let mut user = user_with_role(email, UserRole::Admin).await;
    user.two_factor_enabled = true;
    user
}

// ── MockUserRepo ─────────────────────────────────────────────────────────────

#[derive(Clone, Default)]
pub struct MockUserRepo {
    pub users: Arc<Mutex<Vec<UserRecord>>>,
    pub fail_last_login: Arc<AtomicBool>,
}

impl MockUserRepo {
    pub fn new(users: Vec<UserRecord>) -> Self {
        Self {
            users: Arc::new(Mutex::new(users)),
            fail_last_login: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn get(&self, id: Uuid) -> UserRecord {
        self.users
            .lock()
            .unwrap()
            .iter()
            .find(|u| u.id == id)
            .cloned()
            .expect("user present")
    }

    pub fn update(&self, id: Uuid, f: impl FnOnce(&mut UserRecord)) {
        let mut users = self.users.lock().unwrap();
        let user = users.iter_mut().find(|u| u.id == id).expect("user present");
        f(user);
    }
}

impl UserRepository for MockUserRepo {
    async fn find_by_email(&self, email: &str) -> Result<Option<UserRecord>, AuthServiceError> {
        Ok(self
            .users
            .lock()
            .unwrap()
            .iter()
            .find(|u| u.email == email)
            .cloned())
    }

    async fn find_by_id(&self, id: Uuid) -> Result<Option<UserRecord>, AuthServiceError> {
        Ok(self
            .users
            .lock()
            .unwrap()
            .iter()
            .find(|u| u.id == id)
            .cloned())
    }

    async fn create(&self, user: &NewUser) -> Result<UserRecord, AuthServiceError> {
        let mut users = self.users.lock().unwrap();
        if users.iter().any(|u| u.email == user.email) {
            return Err(AuthServiceError::Conflict);
        }
        let record = UserRecord {
            id: user.id,
            email: user.email.clone(),
            password_hash: user.password_hash.clone(),
            name: user.name.clone(),
            role: user.role,
            active: true,
            failed_login_attempts: 0,
            locked_until: None,
            two_factor_enabled: false,
            last_login_at: None,
            created_at: Utc::now(),
        };
        users.push(record.clone());
        Ok(record)
    }

    async fn increment_login_attempts(
        &self,
        user_id: Uuid,
        max_attempts: i32,
        lock_until: DateTime<Utc>,
    ) -> Result<LoginAttempts, AuthServiceError> {
        let mut users = self.users.lock().unwrap();
        let user = users
            .iter_mut()
            .find(|u| u.id == user_id)
            .ok_or(AuthServiceError::UserNotFound)?;
        let locked = user.failed_login_attempts + 1 >= max_attempts;
        if locked {
            user.locked_until = Some(lock_until);
            user.failed_login_attempts = 0;
        } else {
            user.failed_login_attempts += 1;
        }
        Ok(LoginAttempts {
            attempts: user.failed_login_attempts,
            locked_until: user.locked_until,
            locked,
        })
    }

    async fn reset_login_attempts(&self, user_id: Uuid) -> Result<(), AuthServiceError> {
        self.update(user_id, |u| {
            u.failed_login_attempts = 0;
            u.locked_until = None;
        });
        Ok(())
    }

    async fn update_last_login(
        &self,
        user_id: Uuid,
        at: DateTime<Utc>,
    ) -> Result<(), AuthServiceError> {
        if self.fail_last_login.load(Ordering::SeqCst) {
            return Err(anyhow::anyhow!("users table unavailable").into());
        }
        self.update(user_id, |u| u.last_login_at = Some(at));
        Ok(())
    }

    async fn update_password_hash(
        &self,
        user_id: Uuid,
        password_hash: &str,
    ) -> Result<(), AuthServiceError> {
        self.update(user_id, |u| u.password_hash = password_hash.to_owned());
        Ok(())
    }
}

// ── MockSessionRepo ──────────────────────────────────────────────────────────

#[derive(Clone, Default)]
pub struct MockSessionRepo {
    pub sessions: Arc<Mutex<Vec<RefreshSession>>>,
    /// Simulates a concurrent rotation that revokes the row first.
    pub lose_next_revoke: Arc<AtomicBool>,
}

impl MockSessionRepo {
    pub fn all(&self) -> Vec<RefreshSession> {
        self.sessions.lock().unwrap().clone()
    }

    pub fn in_family(&self, family: FamilyId) -> Vec<RefreshSession> {
        self.all()
            .into_iter()
            .filter(|s| s.family == family)
            .collect()
    }

    pub fn live(&self) -> Vec<RefreshSession> {
        self.all().into_iter().filter(|s| !s.revoked).collect()
    }

    pub fn expire(&self, token_hash: &str) {
        let mut sessions = self.sessions.lock().unwrap();
        if let Some(s) = sessions.iter_mut().find(|s| s.token_hash == token_hash) {
            s.expires_at = Utc::now() - Duration::seconds(1);
        }
    }
}

fn revoke(session: &mut RefreshSession) -> bool {
    if session.revoked {
        return false;
    }
    session.revoked = true;
    session.revoked_at = Some(Utc::now());
    true
}

impl SessionRepository for MockSessionRepo {
    async fn create_refresh_token(
        &self,
        session: &RefreshSession,
    ) -> Result<(), AuthServiceError> {
        self.sessions.lock().unwrap().push(session.clone());
        Ok(())
    }

    async fn find_session_by_token(
        &self,
        token_hash: &str,
    ) -> Result<Option<RefreshSession>, AuthServiceError> {
        Ok(self
            .sessions
            .lock()
            .unwrap()
            .iter()
            .find(|s| s.token_hash == token_hash)
            .cloned())
    }

    async fn revoke_session(&self, token_hash: &str) -> Result<bool, AuthServiceError> {
        let mut sessions = self.sessions.lock().unwrap();
        let Some(session) = sessions.iter_mut().find(|s| s.token_hash == token_hash) else {
            return Ok(false);
        };
        if self.lose_next_revoke.swap(false, Ordering::SeqCst) {
            revoke(session);
            return Ok(false);
        }
        Ok(revoke(session))
    }

    async fn revoke_session_family(&self, family: FamilyId) -> Result<u64, AuthServiceError> {
        let mut sessions = self.sessions.lock().unwrap();
        Ok(sessions
            .iter_mut()
            .filter(|s| s.family == family)
            .map(revoke)
            .filter(|revoked| *revoked)
            .count() as u64)
    }

    async fn revoke_user_sessions(&self, user_id: Uuid) -> Result<u64, AuthServiceError> {
        let mut sessions = self.sessions.lock().unwrap();
        Ok(sessions
            .iter_mut()
            .filter(|s| s.user_id == user_id)
            .map(revoke)
            .filter(|revoked| *revoked)
            .count() as u64)
    }
}

// ── MockOneTimeCodeRepo ──────────────────────────────────────────────────────

#[derive(Clone, Default)]
pub struct MockOneTimeCodeRepo {
    pub codes: Arc<Mutex<Vec<OneTimeCode>>>,
}

impl MockOneTimeCodeRepo {
    pub fn all(&self) -> Vec<OneTimeCode> {
        self.codes.lock().unwrap().clone()
    }

    /// The pending code for a user, as the delivery subsystem would see it.
    pub fn pending_code(&self, user_id: Uuid) -> Option<String> {
        self.all()
            .into_iter()
            .find(|c| c.user_id == user_id && !c.verified)
            .map(|c| c.code)
    }

    pub fn expire_all(&self) {
        for code in self.codes.lock().unwrap().iter_mut() {
            code.expires_at = Utc::now() - Duration::seconds(1);
        }
    }
}

impl OneTimeCodeRepository for MockOneTimeCodeRepo {
    async fn replace_unverified(&self, code: &OneTimeCode) -> Result<(), AuthServiceError> {
        let mut codes = self.codes.lock().unwrap();
        codes.retain(|c| c.user_id != code.user_id || c.verified);
        codes.push(code.clone());
        Ok(())
    }

    async fn find_unverified(
        &self,
        user_id: Uuid,
    ) -> Result<Option<OneTimeCode>, AuthServiceError> {
        Ok(self
            .codes
            .lock()
            .unwrap()
            .iter()
            .find(|c| c.user_id == user_id && !c.verified)
            .cloned())
    }

    async fn record_failed_attempt(&self, id: Uuid) -> Result<i32, AuthServiceError> {
        let mut codes = self.codes.lock().unwrap();
        let code = codes
            .iter_mut()
            .find(|c| c.id == id)
            .ok_or_else(|| anyhow::anyhow!("code {id} vanished"))?;
        code.attempts += 1;
        Ok(code.attempts)
    }

    async fn invalidate(&self, id: Uuid) -> Result<(), AuthServiceError> {
        self.codes.lock().unwrap().retain(|c| c.id != id);
        Ok(())
    }

    async fn mark_verified(&self, id: Uuid) -> Result<bool, AuthServiceError> {
        let mut codes = self.codes.lock().unwrap();
        match codes.iter_mut().find(|c| c.id == id && !c.verified) {
            Some(code) => {
                code.verified = true;
                Ok(true)
            }
            None => Ok(false),
        }
    }
}

// ── MockAuditLog / MockEventPublisher ────────────────────────────────────────

#[derive(Clone, Default)]
pub struct MockAuditLog {
    pub entries: Arc<Mutex<Vec<AuditEntry>>>,
}

impl MockAuditLog {
    pub fn actions(&self) -> Vec<AuditAction> {
        self.entries.lock().unwrap().iter().map(|e| e.action).collect()
    }
}

impl AuditLogRepository for MockAuditLog {
    async fn create_audit_log(&self, entry: AuditEntry) -> Result<(), AuthServiceError> {
        self.entries.lock().unwrap().push(entry);
        Ok(())
    }
}

#[derive(Clone, Default)]
pub struct MockEventPublisher {
    pub events: Arc<Mutex<Vec<OutboxEvent>>>,
}

impl MockEventPublisher {
    pub fn kinds(&self) -> Vec<String> {
        self.events
            .lock()
            .unwrap()
            .iter()
            .map(|e| e.kind.clone())
            .collect()
    }

    pub fn last(&self) -> Option<OutboxEvent> {
        self.events.lock().unwrap().last().cloned()
    }
}

impl EventPublisher for MockEventPublisher {
    async fn publish(&self, event: OutboxEvent) -> Result<(), AuthServiceError> {
        self.events.lock().unwrap().push(event);
        Ok(())
    }
}

// ── MockUserCache / MockDenylist ─────────────────────────────────────────────

#[derive(Clone, Default)]
pub struct MockUserCache {
    pub entries: Arc<Mutex<HashMap<Uuid, Principal>>>,
    pub fail_reads: Arc<AtomicBool>,
}

impl UserCache for MockUserCache {
    async fn get(&self, user_id: Uuid) -> Result<Option<Principal>, AuthServiceError> {
        if self.fail_reads.load(Ordering::SeqCst) {
            return Err(anyhow::anyhow!("cache unreachable").into());
        }
        Ok(self.entries.lock().unwrap().get(&user_id).cloned())
    }

    async fn put(&self, principal: &Principal) -> Result<(), AuthServiceError> {
        self.entries
            .lock()
            .unwrap()
            .insert(principal.user_id, principal.clone());
        Ok(())
    }
}

#[derive(Clone, Default)]
pub struct MockDenylist {
    /// jti -> ttl seconds.
    pub denied: Arc<Mutex<HashMap<String, u64>>>,
    pub fail_writes: Arc<AtomicBool>,
}

impl TokenDenylist for MockDenylist {
    async fn deny(&self, jti: &str, ttl_secs: u64) -> Result<(), AuthServiceError> {
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(anyhow::anyhow!("denylist unreachable").into());
        }
        self.denied.lock().unwrap().insert(jti.to_owned(), ttl_secs);
        Ok(())
    }

    async fn is_denied(&self, jti: &str) -> Result<bool, AuthServiceError> {
        Ok(self.denied.lock().unwrap().contains_key(jti))
    }
}

// ── RecordingSpawner ─────────────────────────────────────────────────────────

/// Holds side effects instead of running them, so tests can observe that the
/// primary result came back first.
#[derive(Default)]
pub struct RecordingSpawner {
    tasks: Mutex<Vec<(&'static str, SideEffect)>>,
}

impl RecordingSpawner {
    pub fn labels(&self) -> Vec<&'static str> {
        self.tasks.lock().unwrap().iter().map(|(l, _)| *l).collect()
    }

    pub fn pending(&self) -> usize {
        self.tasks.lock().unwrap().len()
    }

    /// Run every held task in submission order and return their results.
    pub async fn run_all(&self) -> Vec<Result<(), AuthServiceError>> {
        let tasks: Vec<_> = self.tasks.lock().unwrap().drain(..).collect();
        let mut results = Vec::with_capacity(tasks.len());
        for (_, task) in tasks {
            results.push(task.await);
        }
        results
    }
}

impl TaskSpawner for RecordingSpawner {
    fn spawn(&self, label: &'static str, task: SideEffect) {
        self.tasks.lock().unwrap().push((label, task));
    }
}

// ── Harness ──────────────────────────────────────────────────────────────────

/// One set of in-memory stores shared by every use case built from it.
#[derive(Clone, Default)]
pub struct Harness {
    pub users: MockUserRepo,
    pub sessions: MockSessionRepo,
    pub codes: MockOneTimeCodeRepo,
    pub audit: MockAuditLog,
    pub events: MockEventPublisher,
    pub cache: MockUserCache,
    pub denylist: MockDenylist,
    pub spawner: Arc<RecordingSpawner>,
}

impl Harness {
    pub fn with_users(users: Vec<UserRecord>) -> Self {
        Self {
            users: MockUserRepo::new(users),
            ..Self::default()
        }
    }

    fn spawner(&self) -> Arc<dyn TaskSpawner> {
        self.spawner.clone()
    }

    pub fn one_time_codes(
        &self,
    ) -> OneTimeCodeService<MockUserRepo, MockOneTimeCodeRepo, MockEventPublisher> {
        OneTimeCodeService {
            users: self.users.clone(),
            codes: self.codes.clone(),
            events: self.events.clone(),
            spawner: self.spawner(),
        }
    }

    pub fn login(
        &self,
    ) -> LoginUseCase<
        MockUserRepo,
        MockSessionRepo,
        MockOneTimeCodeRepo,
        MockAuditLog,
        MockEventPublisher,
    > {
        LoginUseCase {
            users: self.users.clone(),
            sessions: self.sessions.clone(),
            audit: self.audit.clone(),
            one_time_codes: self.one_time_codes(),
            signer: signer(),
            hasher: hasher(),
            spawner: self.spawner(),
        }
    }

    pub fn refresh(
        &self,
    ) -> RefreshUseCase<MockUserRepo, MockSessionRepo, MockAuditLog, MockEventPublisher> {
        RefreshUseCase {
            users: self.users.clone(),
            sessions: self.sessions.clone(),
            audit: self.audit.clone(),
            events: self.events.clone(),
            signer: signer(),
            spawner: self.spawner(),
        }
    }

    pub fn logout(
        &self,
    ) -> LogoutUseCase<MockSessionRepo, MockAuditLog, MockEventPublisher, MockDenylist> {
        LogoutUseCase {
            sessions: self.sessions.clone(),
            audit: self.audit.clone(),
            events: self.events.clone(),
            denylist: self.denylist.clone(),
            spawner: self.spawner(),
        }
    }

    pub fn guard(&self) -> AuthenticateUseCase<MockUserRepo, MockUserCache, MockDenylist> {
        AuthenticateUseCase {
            users: self.users.clone(),
            cache: self.cache.clone(),
            denylist: self.denylist.clone(),
            signer: signer(),
        }
    }

    pub fn register(&self) -> RegisterUseCase<MockUserRepo, MockSessionRepo, MockAuditLog> {
        RegisterUseCase {
            users: self.users.clone(),
            sessions: self.sessions.clone(),
            audit: self.audit.clone(),
            signer: signer(),
            hasher: hasher(),
            spawner: self.spawner(),
        }
    }

    pub fn current_user(&self) -> GetCurrentUserUseCase<MockUserRepo> {
        GetCurrentUserUseCase {
            users: self.users.clone(),
        }
    }

    pub fn change_password(
        &self,
    ) -> ChangePasswordUseCase<MockUserRepo, MockSessionRepo, MockAuditLog> {
        ChangePasswordUseCase {
            users: self.users.clone(),
            sessions: self.sessions.clone(),
            audit: self.audit.clone(),
            hasher: hasher(),
            spawner: self.spawner(),
        }
    }
}
