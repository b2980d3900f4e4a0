//! Application root context

use std::sync::Arc;

use color_eyre::Result;
use color_eyre::eyre::WrapErr;
use shop::{Cart, Catalog};
use tokio::sync::{Mutex, MutexGuard};
use tracing::debug;

use crate::config::Config;
use crate::model::api::ApiClient;
use crate::model::session::Session;
use crate::model::storage::Storage;

struct ContextInner {
    /// Session store
    session: Session,
    /// Cart of the current run, never persisted
    cart: Mutex<Cart>,
    /// Products on offer
    catalog: Catalog,
}

/// State shared by everything acting on behalf of the user
#[derive(Clone)]
pub struct Context(Arc<ContextInner>);

impl Context {
    pub fn new(session: Session, catalog: Catalog) -> Self {
        Self(Arc::new(ContextInner {
            session,
            cart: Mutex::new(Cart::new()),
            catalog,
        }))
    }

    /// Context from configuration
    ///
    /// The totals refresher is subscribed before the persisted session is restored, so a restored
    /// credential triggers the refresh as well.
    pub async fn with_config(config: Config) -> Result<Self> {
        let storage = Storage::with_config(config.storage).await?;
        let api = ApiClient::with_config(&config.api)?;
        let session = Session::new(storage, api, config.session.avatar_base_url);

        if config.session.refresh_totals {
            session.refresh_totals_on_credential_set();
        }
        session.hydrate().await?;

        let catalog = match config.catalog {
            Some(path) => {
                let catalog = tokio::fs::read_to_string(&path)
                    .await
                    .wrap_err_with(|| format!("Cannot read catalog {}", path.display()))?;
                let catalog = Catalog::from_toml(&catalog)?;
                debug!(?path, products = catalog.products().len(), "Catalog loaded");
                catalog
            }
            None => Catalog::default(),
        };

        Ok(Self::new(session, catalog))
    }

    /// Context for testing purposes - in-memory storage, no automatic totals refresh
    #[cfg(test)]
    pub async fn test(api: crate::config::Api, catalog: Catalog) -> Result<Self> {
        let storage = Storage::memory(1).await?;
        let api = ApiClient::with_config(&api)?;
        let session = Session::new(storage, api, crate::testing::AVATARS);
        session.hydrate().await?;

        Ok(Self::new(session, catalog))
    }

    /// Access to the session store
    pub fn session(&self) -> &Session {
        &self.0.session
    }

    /// Locks the cart
    pub async fn cart(&self) -> MutexGuard<'_, Cart> {
        self.0.cart.lock().await
    }

    /// Access to the catalog
    pub fn catalog(&self) -> &Catalog {
        &self.0.catalog
    }
}
