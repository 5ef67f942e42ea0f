pub mod claims;
pub mod store;

use std::sync::Arc;

use chrono::Utc;
use reqwest::StatusCode;
use tokio::sync::{Mutex, RwLock};
use tracing::{info, warn};

use crate::api::{AdminRequest, ApiClient, ApiResponse};
use crate::error::ApiError;
use crate::models::TokenPair;
use store::SessionStore;

/// Holds the admin token pair and wraps every authenticated call.
///
/// The pair sits behind an `RwLock`; refreshes serialize on a separate gate
/// so parallel 401s collapse into a single refresh call.
pub struct SessionManager {
    api: Arc<ApiClient>,
    store: Arc<dyn SessionStore>,
    tokens: RwLock<Option<TokenPair>>,
    refresh_gate: Mutex<()>,
}

impl SessionManager {
    /// Hydrates from the store, like the admin UI rehydrating from local
    /// storage on page load.
    pub fn new(api: Arc<ApiClient>, store: Arc<dyn SessionStore>) -> Result<Self, ApiError> {
        let tokens = store.load()?;
        Ok(SessionManager {
            api,
            store,
            tokens: RwLock::new(tokens),
            refresh_gate: Mutex::new(()),
        })
    }

    /// Exchanges credentials for a session. Nothing is stored unless the
    /// backend granted both tokens.
    pub async fn login(&self, username: &str, password: &str) -> Result<(), ApiError> {
        let pair = self.api.login(username, password).await?;
        self.install(pair).await;
        Ok(())
    }

    /// Best-effort server-side revocation, then unconditional local clear.
    pub async fn logout(&self) -> Result<(), ApiError> {
        let refresh = {
            let guard = self.tokens.read().await;
            guard.as_ref().map(|pair| pair.refresh_token.clone())
        };
        if let Some(refresh_token) = refresh {
            if let Err(err) = self.api.logout(&refresh_token).await {
                warn!("server-side logout failed, clearing locally anyway: {err}");
            }
        }
        self.clear().await;
        Ok(())
    }

    pub async fn is_authenticated(&self) -> bool {
        let guard = self.tokens.read().await;
        match guard.as_ref() {
            Some(pair) => !claims::token_expired(&pair.access_token, Utc::now()),
            None => false,
        }
    }

    /// Display label for the signed-in admin, `"Admin"` when the token
    /// carries no usable identity claim or there is no session at all.
    pub async fn identity(&self) -> String {
        let guard = self.tokens.read().await;
        guard
            .as_ref()
            .and_then(|pair| claims::decode_unverified(&pair.access_token))
            .map(|claims| claims.identity().to_string())
            .unwrap_or_else(|| "Admin".to_string())
    }

    pub async fn access_token(&self) -> Option<String> {
        let guard = self.tokens.read().await;
        guard.as_ref().map(|pair| pair.access_token.clone())
    }

    async fn install(&self, pair: TokenPair) {
        if let Err(err) = self.store.save(&pair) {
            // The in-memory session stays authoritative for this process.
            warn!("could not persist session: {err}");
        }
        *self.tokens.write().await = Some(pair);
    }

    async fn clear(&self) {
        *self.tokens.write().await = None;
        if let Err(err) = self.store.clear() {
            warn!("could not clear persisted session: {err}");
        }
    }

    /// Refreshes the access token unless another task already did while we
    /// waited for the gate. `seen_access` is the token the caller observed;
    /// a stored token that differs means the refresh already happened.
    ///
    /// Any refresh failure clears the whole session: a session that cannot
    /// refresh is dead, never half-valid.
    async fn refresh_if_stale(&self, seen_access: &str) -> Result<(), ApiError> {
        let _gate = self.refresh_gate.lock().await;

        let refresh_token = {
            let guard = self.tokens.read().await;
            match guard.as_ref() {
                None => return Err(ApiError::SessionExpired),
                Some(pair) if pair.access_token != seen_access => return Ok(()),
                Some(pair) => pair.refresh_token.clone(),
            }
        };

        info!("refreshing access token");
        let grant = match self.api.refresh(&refresh_token).await {
            Ok(grant) => grant,
            Err(err) => {
                warn!("token refresh rejected: {err}");
                self.clear().await;
                return Err(ApiError::SessionExpired);
            }
        };
        match grant.access_token {
            Some(access) if !access.is_empty() => {
                // The backend may or may not rotate the refresh token.
                let rotated = grant
                    .refresh_token
                    .filter(|token| !token.is_empty())
                    .unwrap_or(refresh_token);
                self.install(TokenPair {
                    access_token: access,
                    refresh_token: rotated,
                })
                .await;
                Ok(())
            }
            _ => {
                warn!("token refresh returned no access token");
                self.clear().await;
                Err(ApiError::SessionExpired)
            }
        }
    }

    /// Authenticated request wrapper.
    ///
    /// Order of operations: fail fast with no session, refresh up front when
    /// the access token is already expired locally, then send. A 401 answer
    /// triggers exactly one refresh-and-retry using the token current at
    /// retry time; a second 401 is returned to the caller.
    pub async fn request(&self, request: AdminRequest) -> Result<ApiResponse, ApiError> {
        let mut access = self.access_token().await.ok_or(ApiError::Unauthenticated)?;

        if claims::token_expired(&access, Utc::now()) {
            self.refresh_if_stale(&access).await?;
            access = self.access_token().await.ok_or(ApiError::SessionExpired)?;
        }

        let response = self.api.execute(&request, Some(&access)).await?;
        if response.status != StatusCode::UNAUTHORIZED {
            return response.into_result();
        }

        info!(path = %request.path, "got 401, refreshing and retrying once");
        self.refresh_if_stale(&access).await?;
        let retry_access = self.access_token().await.ok_or(ApiError::SessionExpired)?;
        self.api
            .execute(&request, Some(&retry_access))
            .await?
            .into_result()
    }
}
