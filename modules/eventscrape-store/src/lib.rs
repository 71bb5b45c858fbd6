//! Postgres persistence. One repository per aggregate, all sharing a pool.

pub mod canonical;
pub mod error;
pub mod events;
pub mod exports;
pub mod filter;
pub mod matches;
pub mod runs;
pub mod schedules;
pub mod settings;
pub mod sources;

pub use error::{Result, StoreError};
pub use events::{
    OccurrenceInsert, OccurrenceRow, RawEventInsert, RawEventRow, SeriesInsert, SeriesRow,
    UpsertAction,
};
pub use filter::EventFilter;

use sqlx::postgres::PgPoolOptions;
use sqlx::PgPool;

#[derive(Clone)]
pub struct Store {
    pool: PgPool,
}

impl Store {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn connect(database_url: &str) -> Result<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(10)
            .connect(database_url)
            .await?;
        Ok(Self { pool })
    }

    /// Run the embedded SQL migrations.
    pub async fn migrate(&self) -> Result<()> {
        sqlx::migrate!("./migrations")
            .run(&self.pool)
            .await
            .map_err(|e| StoreError::Database(e.into()))?;
        Ok(())
    }

    /// Cheap liveness probe for the health endpoint.
    pub async fn ping(&self) -> Result<()> {
        sqlx::query("SELECT 1").execute(&self.pool).await?;
        Ok(())
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    pub fn sources(&self) -> sources::SourceRepo<'_> {
        sources::SourceRepo::new(&self.pool)
    }

    pub fn runs(&self) -> runs::RunRepo<'_> {
        runs::RunRepo::new(&self.pool)
    }

    pub fn events(&self) -> events::EventRepo<'_> {
        events::EventRepo::new(&self.pool)
    }

    pub fn matches(&self) -> matches::MatchRepo<'_> {
        matches::MatchRepo::new(&self.pool)
    }

    pub fn canonical(&self) -> canonical::CanonicalRepo<'_> {
        canonical::CanonicalRepo::new(&self.pool)
    }

    pub fn schedules(&self) -> schedules::ScheduleRepo<'_> {
        schedules::ScheduleRepo::new(&self.pool)
    }

    pub fn exports(&self) -> exports::ExportRepo<'_> {
        exports::ExportRepo::new(&self.pool)
    }

    pub fn settings(&self) -> settings::SettingsRepo<'_> {
        settings::SettingsRepo::new(&self.pool)
    }
}
