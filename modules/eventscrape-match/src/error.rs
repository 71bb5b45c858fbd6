use thiserror::Error;

pub type Result<T> = std::result::Result<T, MatchError>;

#[derive(Error, Debug)]
pub enum MatchError {
    #[error(transparent)]
    Store(#[from] eventscrape_store::StoreError),

    #[error("match {0} is not open")]
    NotOpen(uuid::Uuid),
}
