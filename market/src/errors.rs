use thiserror::Error;

#[derive(Error, Debug)]
pub enum FetchError {
    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("empty funding history for {0}")]
    EmptyFunding(String),

    #[error("order book for {0} has no levels")]
    EmptyBook(String),
}
