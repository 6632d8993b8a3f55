use std::path::{Path, PathBuf};

use thiserror::Error;

use super::http_source::HttpBinarySource;
use super::local::LocalBinarySource;
use super::sftp::{SftpBinarySource, SftpLocation, SftpUrlError};
use super::zip_sftp_source::ZipSftpBinarySource;
use super::zip_source::ZipBinarySource;
use super::BinarySource;

#[derive(Error, Debug)]
pub enum BinarySourceFactoryError {
    #[error("invalid sftp location: {0}")]
    Sftp(#[from] SftpUrlError),
}

/// Select a `BinarySource` implementation from a binaries-location prefix.
///
/// `location` is the job's configured binaries location field; `filename`
/// is the value recorded for one file in a
/// row's `FILES`/`ITEM_FILES` column. The prefixes recognised are `zip:`,
/// `sftp:`, `zip+sftp:`, `http:`/`https:`; anything else is treated as a
/// local directory that `filename` is joined onto.
pub fn open_binary_source(
    location: &str,
    filename: &str,
    http_client: reqwest::Client,
) -> Result<Box<dyn BinarySource>, BinarySourceFactoryError> {
    if let Some(archive) = location.strip_prefix("zip+sftp:") {
        let sftp_location = SftpLocation::parse(archive)?;
        return Ok(Box::new(ZipSftpBinarySource::new(sftp_location, filename)));
    }
    if let Some(archive) = location.strip_prefix("zip:") {
        return Ok(Box::new(ZipBinarySource::new(
            PathBuf::from(archive),
            filename,
        )));
    }
    if location.starts_with("sftp:") {
        let mut sftp_location = SftpLocation::parse(location)?;
        sftp_location.path = join_path_segments(&sftp_location.path, filename);
        return Ok(Box::new(SftpBinarySource::new(sftp_location)));
    }
    if location.starts_with("http:") || location.starts_with("https:") {
        let url = format!("{}/{}", location.trim_end_matches('/'), filename.trim_start_matches('/'));
        return Ok(Box::new(HttpBinarySource::new(http_client, url)));
    }
    let path = Path::new(location).join(filename);
    Ok(Box::new(LocalBinarySource::new(path)))
}

fn join_path_segments(base: &str, filename: &str) -> String {
    format!("{}/{}", base.trim_end_matches('/'), filename.trim_start_matches('/'))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn local_prefix_joins_path() {
        let client = reqwest::Client::new();
        let src = open_binary_source("/data/binaries", "page1.jpg", client).unwrap();
        let _: Box<dyn BinarySource> = src;
    }
}
