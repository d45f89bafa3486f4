use thiserror::Error;

#[derive(Error, Debug)]
pub enum CacheError {
    #[error("cache backend unreachable: {0}")]
    Unreachable(String),
}
