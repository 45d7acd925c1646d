//! Wrapper types for converting from higher level types to sql data types

use derive_more::{From, Into};
use rusqlite::{
    types::{FromSql, FromSqlError, FromSqlResult, ToSqlOutput, ValueRef},
    Error, ToSql,
};

use crate::{album::TrackOverlay, photo::AlbumId};

#[derive(Debug, Clone, From, Into)]
pub(crate) struct AlbumIdSql(pub AlbumId);

impl ToSql for AlbumIdSql {
    fn to_sql(&self) -> Result<ToSqlOutput<'_>, Error> {
        Ok(self.0.as_str().into())
    }
}

impl FromSql for AlbumIdSql {
    fn column_result(value: ValueRef<'_>) -> FromSqlResult<Self> {
        AlbumId::new(value.as_str()?)
            .map(AlbumIdSql)
            .map_err(|e| FromSqlError::Other(Box::new(e)))
    }
}

#[derive(Debug, Clone, From, Into)]
pub(crate) struct TrackOverlaySql(pub TrackOverlay);

impl ToSql for TrackOverlaySql {
    fn to_sql(&self) -> Result<ToSqlOutput<'_>, Error> {
        serde_json::to_string(self.0.as_json())
            .map(|v| v.into())
            .map_err(|e| Error::ToSqlConversionFailure(e.into()))
    }
}

impl FromSql for TrackOverlaySql {
    fn column_result(value: ValueRef<'_>) -> FromSqlResult<Self> {
        TrackOverlay::from_slice(value.as_bytes()?)
            .map(TrackOverlaySql)
            .map_err(|e| FromSqlError::Other(Box::new(e)))
    }
}
