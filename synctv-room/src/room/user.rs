use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicI64, AtomicU64, Ordering};
use std::sync::{Arc, OnceLock, Weak};

use super::Room;
use crate::auth::{hash_password, verify_password};
use crate::config::PasswordConfig;
use crate::error::{Result, ValidationError};
use crate::models::now_millis;

/// Construction-time tweak applied to a user before it is shared
pub struct UserOption(Box<dyn FnOnce(&mut User) + Send>);

impl UserOption {
    #[must_use]
    pub fn admin(admin: bool) -> Self {
        Self(Box::new(move |u| u.admin = AtomicBool::new(admin)))
    }

    #[must_use]
    pub fn version(version: u64) -> Self {
        Self(Box::new(move |u| u.version = AtomicU64::new(version)))
    }
}

/// A participant known to a room.
///
/// The room reference is weak: a user never keeps its room alive.
pub struct User {
    name: String,
    password: Option<String>,
    admin: AtomicBool,
    version: AtomicU64,
    last_act: AtomicI64,
    room: OnceLock<Weak<Room>>,
}

impl User {
    /// Empty passwords are stored as "no credential"; admins must have one.
    pub async fn new(
        name: impl Into<String>,
        password: &str,
        password_config: &PasswordConfig,
        options: impl IntoIterator<Item = UserOption>,
    ) -> Result<Self> {
        let name = name.into();
        if name.is_empty() {
            return Err(ValidationError::EmptyUsername.into());
        }

        let mut user = Self {
            name,
            password: None,
            admin: AtomicBool::new(false),
            version: AtomicU64::new(1),
            last_act: AtomicI64::new(now_millis()),
            room: OnceLock::new(),
        };
        for option in options {
            (option.0)(&mut user);
        }

        if password.is_empty() {
            if user.is_admin() {
                return Err(ValidationError::AdminPasswordEmpty.into());
            }
        } else {
            user.password = Some(hash_password(password, password_config).await?);
        }
        Ok(user)
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[must_use]
    pub fn is_admin(&self) -> bool {
        self.admin.load(Ordering::Acquire)
    }

    pub fn set_admin(&self, admin: bool) {
        self.admin.store(admin, Ordering::Release);
    }

    #[must_use]
    pub const fn has_password(&self) -> bool {
        self.password.is_some()
    }

    /// A user without a credential accepts any password
    pub async fn check_password(&self, password: &str) -> bool {
        match &self.password {
            None => true,
            Some(hash) => verify_password(password, hash).await,
        }
    }

    #[must_use]
    pub fn version(&self) -> u64 {
        self.version.load(Ordering::Acquire)
    }

    #[must_use]
    pub fn check_version(&self, version: u64) -> bool {
        self.version() == version
    }

    pub fn update_act(&self) {
        self.last_act.store(now_millis(), Ordering::Release);
    }

    #[must_use]
    pub fn last_act(&self) -> i64 {
        self.last_act.load(Ordering::Acquire)
    }

    /// Owning room, if it has been bound and is still alive
    #[must_use]
    pub fn room(&self) -> Option<Arc<Room>> {
        self.room.get().and_then(Weak::upgrade)
    }

    /// First binding wins; returns false if already bound elsewhere
    pub(crate) fn bind_room(&self, room: Weak<Room>) -> bool {
        if self.room.set(room.clone()).is_ok() {
            return true;
        }
        self.room.get().is_some_and(|r| r.ptr_eq(&room))
    }
}

impl fmt::Debug for User {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("User")
            .field("name", &self.name)
            .field("admin", &self.is_admin())
            .field("has_password", &self.has_password())
            .field("version", &self.version())
            .finish_non_exhaustive()
    }
}

/// Listing view of a user
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct UserInfo {
    pub name: String,
    pub admin: bool,
    pub last_act: i64,
}

impl From<&User> for UserInfo {
    fn from(user: &User) -> Self {
        Self {
            name: user.name.clone(),
            admin: user.is_admin(),
            last_act: user.last_act(),
        }
    }
}
