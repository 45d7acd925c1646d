use std::io::{Error, ErrorKind};
use std::path::{Path, PathBuf};
use std::str::FromStr;

use derive_more::{Display, Into};

/// A canonicalized path that pointed at a directory when it was parsed.
#[derive(Clone, Debug, Display, Into, PartialEq, Eq)]
#[display("{}", _0.display())]
pub struct ExistingDir(PathBuf);

impl ExistingDir {
    pub fn new(path: impl AsRef<Path>) -> Result<Self, Error> {
        let path = path.as_ref().canonicalize()?;
        if !path.is_dir() {
            return Err(Error::new(
                ErrorKind::InvalidInput,
                format!("{} is not a directory", path.display()),
            ));
        }
        Ok(Self(path))
    }
}

impl FromStr for ExistingDir {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::new(s)
    }
}

impl AsRef<Path> for ExistingDir {
    fn as_ref(&self) -> &Path {
        self.0.as_ref()
    }
}
