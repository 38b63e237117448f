use crate::db::DbError;
use crate::model::card::CardStatus;
use crate::model::{CardId, ProjectId};
use crate::repo::RepoError;
use thiserror::Error;

pub type ServiceResult<T> = Result<T, ServiceError>;

/// Errors surfaced by service operations.
///
/// Storage failures are carried verbatim in `Repo`.
#[derive(Debug, Error)]
pub enum ServiceError {
    #[error("{entity} not found: {id}")]
    NotFound { entity: &'static str, id: i64 },
    #[error("invalid project: {0}")]
    InvalidProject(ProjectId),
    #[error("invalid status: {0:?}")]
    InvalidStatus(CardStatus),
    #[error("invalid update: {0}")]
    InvalidUpdate(&'static str),
    #[error("card title is required")]
    TitleRequired,
    #[error("card tracking already in progress: {0}")]
    AlreadyActive(CardId),
    #[error("card tracking already stopped: {0}")]
    AlreadyStopped(CardId),
    #[error(transparent)]
    Repo(RepoError),
}

impl From<RepoError> for ServiceError {
    fn from(value: RepoError) -> Self {
        match value {
            RepoError::NotFound { entity, id } => Self::NotFound { entity, id },
            other => Self::Repo(other),
        }
    }
}

impl From<DbError> for ServiceError {
    fn from(value: DbError) -> Self {
        Self::Repo(RepoError::Db(value))
    }
}

impl From<rusqlite::Error> for ServiceError {
    fn from(value: rusqlite::Error) -> Self {
        Self::Repo(RepoError::from(value))
    }
}
