use thiserror::Error;

#[derive(Debug, Error, PartialEq)]
pub enum StoreError {
    #[error("no record {id} in {collection}")]
    NotFound { collection: String, id: String },

    #[error("{0}")]
    Other(String),
}
