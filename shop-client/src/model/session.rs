//! Session store
//!
//! Keeps the authenticated user, its credential and the financial totals derived from them. The
//! authentication part is mirrored in the durable storage, so the session survives restarts.

use std::sync::Arc;

use thiserror::Error;
use tokio::sync::broadcast::{self, error::RecvError};
use tokio::sync::{OnceCell, RwLock};
use tokio::task::JoinHandle;
use tracing::{debug, info, instrument, warn};

use crate::model::api::{self, ApiClient};
use crate::model::auth::Credential;
use crate::model::storage::{self, Storage};
use crate::model::totals::Totals;
use crate::model::users::{FieldErrors, Registration, User};


/// Storage key of the serialized user record
pub const USER_KEY: &str = "user";
/// Storage key of the bearer credential
pub const TOKEN_KEY: &str = "token";
/// Credential key written by older clients. Read as a fallback, removed on logout.
pub const LEGACY_TOKEN_KEY: &str = "access_token";

const SESSION_KEYS: &[&str] = &[USER_KEY, TOKEN_KEY, LEGACY_TOKEN_KEY];

const EVENTS_CAPACITY: usize = 16;

#[derive(Debug, Error)]
pub enum Error {
    #[error("Invalid credentials")]
    InvalidCredentials,
    #[error("Server error: {0}")]
    ServerError(String),
    #[error("Not logged in")]
    Unauthenticated,
    #[error("Session expired, log in again")]
    SessionExpired,
    #[error("Validation failed: {0}")]
    ValidationFailed(FieldErrors),
    #[error("Credential changed while the request was in flight")]
    CredentialChanged,
    #[error("Cannot serialize user record: {0}")]
    Record(#[from] serde_json::Error),
    #[error(transparent)]
    Storage(#[from] storage::Error),
}

impl Error {
    fn server(err: api::Error) -> Self {
        Self::ServerError(err.to_string())
    }
}

/// Session change notifications
#[derive(Debug, Clone, PartialEq)]
pub enum SessionEvent {
    /// A credential became active, either restored from storage or after a login
    CredentialSet,
    /// Totals were refreshed
    TotalsUpdated(Totals),
    /// The session was cleared
    Cleared,
}

/// Authenticated part of the session
#[derive(Debug, Clone, PartialEq)]
pub struct Authenticated {
    pub user: User,
    pub credential: Credential,
}

/// Session state snapshot
#[derive(Debug, Clone, PartialEq, Default)]
pub struct SessionState {
    /// User and credential, set and cleared together
    pub auth: Option<Authenticated>,
    /// Valid only while authenticated, zeroed otherwise
    pub totals: Totals,
}

impl SessionState {
    pub fn user(&self) -> Option<&User> {
        self.auth.as_ref().map(|auth| &auth.user)
    }

    pub fn credential(&self) -> Option<&Credential> {
        self.auth.as_ref().map(|auth| &auth.credential)
    }

    pub fn is_authenticated(&self) -> bool {
        self.auth.is_some()
    }
}

struct SessionInner {
    state: RwLock<SessionState>,
    storage: Storage,
    api: ApiClient,
    /// Avatar service for users without one
    avatar_base_url: String,
    events: broadcast::Sender<SessionEvent>,
    hydrated: OnceCell<()>,
}

/// Session store handle
///
/// Cloning is cheap, all clones share the same state.
#[derive(Clone)]
pub struct Session(Arc<SessionInner>);

impl Session {
    pub fn new(storage: Storage, api: ApiClient, avatar_base_url: impl Into<String>) -> Self {
        let (events, _) = broadcast::channel(EVENTS_CAPACITY);

        Self(Arc::new(SessionInner {
            state: RwLock::default(),
            storage,
            api,
            avatar_base_url: avatar_base_url.into(),
            events,
            hydrated: OnceCell::new(),
        }))
    }

    /// Subscribes for session events
    pub fn subscribe(&self) -> broadcast::Receiver<SessionEvent> {
        self.0.events.subscribe()
    }

    fn notify(&self, event: SessionEvent) {
        // Nobody listening is fine
        let _ = self.0.events.send(event);
    }

    /// Current state snapshot
    pub async fn state(&self) -> SessionState {
        self.0.state.read().await.clone()
    }

    pub async fn user(&self) -> Option<User> {
        self.0.state.read().await.user().cloned()
    }

    pub async fn credential(&self) -> Option<Credential> {
        self.0.state.read().await.credential().cloned()
    }

    pub async fn totals(&self) -> Totals {
        self.0.state.read().await.totals
    }

    /// Restores the session persisted by a previous run
    ///
    /// Restoring happens once per store, later calls are no-ops. Restored data is not
    /// re-validated with the server. Incomplete or malformed records are dropped from the
    /// storage, leaving the session logged out.
    pub async fn hydrate(&self) -> Result<(), Error> {
        self.0.hydrated.get_or_try_init(|| self.restore()).await?;
        Ok(())
    }

    #[instrument(skip(self))]
    async fn restore(&self) -> Result<(), Error> {
        let storage = &self.0.storage;

        let user = storage.get(USER_KEY).await?;
        let token = match storage.get(TOKEN_KEY).await? {
            Some(token) => Some(token),
            None => storage.get(LEGACY_TOKEN_KEY).await?,
        };

        let (user, token) = match (user, token) {
            (Some(user), Some(token)) => (user, token),
            (None, None) => {
                debug!("No session persisted");
                return Ok(());
            }
            _ => {
                warn!("Incomplete session persisted, discarding");
                storage.remove_all(SESSION_KEYS).await?;
                return Ok(());
            }
        };

        let user: User = match serde_json::from_str(&user) {
            Ok(user) => user,
            Err(err) => {
                warn!(%err, "Malformed user record persisted, discarding");
                storage.remove_all(SESSION_KEYS).await?;
                return Ok(());
            }
        };

        let username = user.username.clone();
        {
            let mut state = self.0.state.write().await;
            if state.is_authenticated() {
                debug!("Logged in before restoring, keeping the current session");
                return Ok(());
            }

            state.auth = Some(Authenticated {
                user,
                credential: Credential::new(token),
            });
        }

        info!(user = %username, "Session restored");
        self.notify(SessionEvent::CredentialSet);
        Ok(())
    }

    /// Logs the user in
    ///
    /// Nothing is stored until both the credential and the user profile are obtained, so a
    /// failed login leaves the session as it was.
    #[instrument(skip(self, password))]
    pub async fn login(&self, email: &str, password: &str) -> Result<User, Error> {
        let api = &self.0.api;

        let credential = api.login(email, password).await.map_err(|err| {
            if err.is_client_error() {
                Error::InvalidCredentials
            } else {
                Error::server(err)
            }
        })?;

        let user = api
            .profile(&credential)
            .await
            .map_err(Error::server)?
            .into_user(&self.0.avatar_base_url);
        let record = serde_json::to_string(&user)?;

        let changed = {
            // Holding the lock while storing keeps the storage and memory in line when logins
            // race.
            let mut state = self.0.state.write().await;
            self.0
                .storage
                .set_all(&[(USER_KEY, record.as_str()), (TOKEN_KEY, credential.as_str())])
                .await?;

            let changed = state.credential() != Some(&credential);
            if changed {
                state.totals = Totals::default();
            }
            state.auth = Some(Authenticated {
                user: user.clone(),
                credential,
            });
            changed
        };

        info!(user = %user.username, "Logged in");
        if changed {
            self.notify(SessionEvent::CredentialSet);
        }
        Ok(user)
    }

    /// Clears the session and its persisted copy. No server call is made.
    ///
    /// The in-memory session is cleared even if the storage cannot be updated.
    #[instrument(skip(self))]
    pub async fn logout(&self) -> Result<(), Error> {
        let result = {
            let mut state = self.0.state.write().await;
            self.clear(&mut state).await
        };

        info!("Logged out");
        self.notify(SessionEvent::Cleared);
        result
    }

    async fn clear(&self, state: &mut SessionState) -> Result<(), Error> {
        *state = SessionState::default();
        self.0.storage.remove_all(SESSION_KEYS).await?;
        Ok(())
    }

    /// Refreshes the totals of the logged in user
    ///
    /// If the server rejects the credential, the session is logged out. Totals fetched with a
    /// credential that is not current anymore are discarded.
    #[instrument(skip(self))]
    pub async fn fetch_totals(&self) -> Result<Totals, Error> {
        let credential = self.credential().await.ok_or(Error::Unauthenticated)?;

        match self.0.api.totals(&credential).await {
            Ok(totals) => {
                {
                    let mut state = self.0.state.write().await;
                    if state.credential() != Some(&credential) {
                        debug!("Credential changed, discarding totals");
                        return Err(Error::CredentialChanged);
                    }
                    state.totals = totals;
                }

                debug!(?totals, "Totals updated");
                self.notify(SessionEvent::TotalsUpdated(totals));
                Ok(totals)
            }
            Err(api::Error::Unauthorized) => {
                if self.expire(&credential).await? {
                    Err(Error::SessionExpired)
                } else {
                    Err(Error::CredentialChanged)
                }
            }
            Err(err) => Err(Error::server(err)),
        }
    }

    /// Logs out after the server rejected the credential, unless it was replaced meanwhile
    ///
    /// Returns `false` if the session was kept because the credential is not current anymore.
    async fn expire(&self, credential: &Credential) -> Result<bool, Error> {
        let result = {
            let mut state = self.0.state.write().await;
            if state.credential() != Some(credential) {
                debug!("Rejected credential already replaced");
                return Ok(false);
            }
            self.clear(&mut state).await
        };

        warn!("Credential rejected by the server, logged out");
        self.notify(SessionEvent::Cleared);
        result.map(|()| true)
    }

    /// Creates a new account. The session itself is not affected.
    #[instrument(skip(self))]
    pub async fn register(&self, registration: &Registration) -> Result<(), Error> {
        registration.validate().map_err(Error::ValidationFailed)?;

        self.0
            .api
            .register(registration)
            .await
            .map_err(|err| match err {
                api::Error::Validation(errors) => Error::ValidationFailed(errors),
                err => Error::server(err),
            })?;

        info!(username = %registration.username, "Account registered");
        Ok(())
    }

    /// Reaction to the `CredentialSet` event
    pub async fn on_credential_set(&self) -> Result<Totals, Error> {
        self.fetch_totals().await
    }

    /// Spawns the task calling `on_credential_set` every time a credential is set
    ///
    /// The task does not keep the store alive, it finishes once the last store handle is dropped.
    pub fn refresh_totals_on_credential_set(&self) -> JoinHandle<()> {
        let mut events = self.subscribe();
        let session = Arc::downgrade(&self.0);

        tokio::spawn(async move {
            loop {
                match events.recv().await {
                    Ok(SessionEvent::CredentialSet) => {}
                    Ok(_) => continue,
                    Err(RecvError::Lagged(skipped)) => {
                        // A credential could be set among the skipped events
                        warn!(skipped, "Session events lagged behind");
                    }
                    Err(RecvError::Closed) => break,
                }

                let Some(session) = session.upgrade().map(Session) else {
                    break;
                };

                match session.on_credential_set().await {
                    Ok(_) | Err(Error::Unauthenticated) | Err(Error::CredentialChanged) => (),
                    Err(err) => warn!(%err, "Refreshing totals failed"),
                }
            }

            debug!("Totals refresher finished");
        })
    }
}
