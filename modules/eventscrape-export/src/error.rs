use thiserror::Error;

pub type Result<T> = std::result::Result<T, ExportError>;

#[derive(Error, Debug)]
pub enum ExportError {
    #[error(transparent)]
    Store(#[from] eventscrape_store::StoreError),

    #[error("file error: {0}")]
    Io(#[from] std::io::Error),

    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("wordpress api returned {status}: {message}")]
    WordPressApi { status: u16, message: String },

    #[error("export params invalid: {0}")]
    InvalidParams(String),

    #[error("wp-rest export requires wordpress_settings_id")]
    MissingWordPressSettings,
}
