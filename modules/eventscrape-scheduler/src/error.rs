use thiserror::Error;

pub type Result<T> = std::result::Result<T, SchedulerError>;

#[derive(Error, Debug)]
pub enum SchedulerError {
    #[error(transparent)]
    Store(#[from] eventscrape_store::StoreError),

    #[error(transparent)]
    Queue(#[from] eventscrape_queue::QueueError),

    #[error(transparent)]
    Export(#[from] eventscrape_export::ExportError),

    #[error("schedule {0} has no source configured")]
    MissingSource(uuid::Uuid),
}
