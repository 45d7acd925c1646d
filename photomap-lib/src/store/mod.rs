//! SQLite row types backing the catalog.

pub(crate) mod album_sql;
pub(crate) mod converters;
pub(crate) mod photo_sql;
pub(crate) mod track_sql;
