use std::sync::Arc;

use anyhow::{Context, Error};
use bank::{get_bank, get_bank_remote, similarity::SimilarityScale, store::SignatureStore};
use tracing::info;

use super::{
    catalog::ModelCatalog,
    config::Config,
    database::ProposalDb,
    mailer::{LogMailer, Mailer},
};

pub struct State {
    pub store: SignatureStore,
    pub config: Config,
    pub db: Arc<ProposalDb>,
    pub mailer: Arc<dyn Mailer>,
    pub catalog: ModelCatalog,
    pub scale: SimilarityScale,
}

impl State {
    pub async fn new() -> Result<Arc<Self>, Error> {
        let config = Config::load()?;

        let database = match &config.database_url {
            Some(url) => {
                info!("Loading signature database from {url}");
                get_bank_remote(url).await?
            }
            None => {
                info!("Loading signature database from {}", config.database_path);
                get_bank(&config.database_path)?
            }
        };
        let store = SignatureStore::from(database);
        info!(
            "Loaded {} models ({} with signatures)",
            store.len(),
            store.with_signature_count()
        );

        let db = ProposalDb::open(&config.proposals_db_path).context("opening proposals database")?;
        let catalog = ModelCatalog::new(config.catalog_url.clone(), config.catalog_timeout)?;

        Ok(Arc::new(Self::from_parts(
            config,
            store,
            Arc::new(db),
            Arc::new(LogMailer),
            catalog,
        )))
    }

    pub fn from_parts(
        config: Config,
        store: SignatureStore,
        db: Arc<ProposalDb>,
        mailer: Arc<dyn Mailer>,
        catalog: ModelCatalog,
    ) -> Self {
        let scale = SimilarityScale::new(config.similarity_max_distance);

        Self {
            store,
            config,
            db,
            mailer,
            catalog,
            scale,
        }
    }
}
