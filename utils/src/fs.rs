use std::path::{Path, PathBuf};

#[derive(thiserror::Error, Debug)]
pub enum Error {
    #[error("could not open file {path:?}")]
    OpenFile {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("could not create file {path:?}")]
    CreateFile {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("could not create directories {path:?}")]
    CreateDirectories {
        path: PathBuf,
        source: std::io::Error,
    },
}

impl Error {
    /// The underlying I/O error.
    #[must_use]
    pub fn io(&self) -> &std::io::Error {
        match self {
            Error::OpenFile { source, .. }
            | Error::CreateFile { source, .. }
            | Error::CreateDirectories { source, .. } => source,
        }
    }
}

impl From<Error> for std::io::Error {
    fn from(err: Error) -> Self {
        match err {
            Error::OpenFile { source, .. }
            | Error::CreateFile { source, .. }
            | Error::CreateDirectories { source, .. } => source,
        }
    }
}

#[inline]
pub fn open_readable(path: impl AsRef<Path>) -> Result<std::io::BufReader<std::fs::File>, Error> {
    let path = path.as_ref();
    let file = std::fs::File::open(path).map_err(|source| Error::OpenFile {
        source,
        path: path.to_path_buf(),
    })?;
    Ok(std::io::BufReader::new(file))
}

/// Opens a file for writing, creating missing parent directories.
#[inline]
pub fn open_writable(path: impl AsRef<Path>) -> Result<std::io::BufWriter<std::fs::File>, Error> {
    let path = path.as_ref();
    if let Some(parent) = path.parent().filter(|parent| !parent.as_os_str().is_empty()) {
        create_dirs(parent)?;
    }
    let file = std::fs::File::create(path).map_err(|source| Error::CreateFile {
        source,
        path: path.to_path_buf(),
    })?;
    Ok(std::io::BufWriter::new(file))
}

#[inline]
pub fn create_dirs(path: impl AsRef<Path>) -> Result<(), Error> {
    let path = path.as_ref();
    match std::fs::create_dir_all(path) {
        Ok(()) => Ok(()),
        Err(err) if err.kind() == std::io::ErrorKind::AlreadyExists => Ok(()),
        Err(source) => Err(Error::CreateDirectories {
            path: path.to_path_buf(),
            source,
        }),
    }
}

#[cfg(test)]
mod tests {
    #[test]
    fn open_missing_file_names_path() {
        let err = super::open_readable("/definitely/not/here.txt").unwrap_err();
        assert_eq!(err.io().kind(), std::io::ErrorKind::NotFound);
        assert!(err.to_string().contains("not/here.txt"));
    }
}
