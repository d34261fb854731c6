use std::{
    fs::File,
    path::{Path, PathBuf},
    str::FromStr,
    sync::Arc,
    time::Duration,
};

use reqwest::{StatusCode, Url};
use thiserror::Error;

/// A fixture fetch error.
#[derive(Clone, Debug, Error)]
pub enum FetchError {
    /// An invalid URL.
    #[error("invalid fixture URL {0}")]
    InvalidUrl(String),
    /// A HTTP error.
    #[error("{0}")]
    Http(String),
    /// An unexpected HTTP status.
    #[error("fetching {url} returned {status}")]
    Status {
        /// The URL.
        url: String,
        /// The HTTP status.
        status: StatusCode,
    },
    /// An IO error.
    #[error(transparent)]
    IOError(#[from] Arc<std::io::Error>),
    /// The fetched file is empty.
    #[error("fetched fixture {} is empty", .0.display())]
    Empty(PathBuf),
}

impl From<std::io::Error> for FetchError {
    fn from(err: std::io::Error) -> Self {
        Self::IOError(Arc::new(err))
    }
}

#[allow(clippy::needless_pass_by_value)]
fn handle_reqwest_error(err: reqwest::Error) -> FetchError {
    FetchError::Http(err.to_string())
}

/// The path a download is staged at before it is moved to `path`.
fn partial_path(path: &Path) -> PathBuf {
    let mut file_name = path.file_name().unwrap_or_default().to_os_string();
    file_name.push(".part");
    path.with_file_name(file_name)
}

/// Ensure a local copy of the fixture at `remote_url` exists at `local_path`.
///
/// Does nothing if a non-empty file already exists at `local_path`.
/// Otherwise the fixture is downloaded, or copied for a `file://` URL, to a `.part` file that is renamed to `local_path` once complete.
/// The request is bounded by `timeout` and retried once if it times out or fails to connect.
///
/// # Errors
/// Returns a [`FetchError`] if the fixture cannot be fetched or is empty.
pub fn ensure_local_copy(
    remote_url: &str,
    local_path: &Path,
    timeout: Duration,
) -> Result<PathBuf, FetchError> {
    if std::fs::metadata(local_path).is_ok_and(|metadata| metadata.len() > 0) {
        log::debug!("using cached fixture {}", local_path.display());
        return Ok(local_path.to_path_buf());
    }
    let url = Url::from_str(remote_url).map_err(|_| FetchError::InvalidUrl(remote_url.to_string()))?;
    if let Some(parent) = local_path.parent() {
        std::fs::create_dir_all(parent)?;
    }

    let part = partial_path(local_path);
    let fetched = if url.scheme() == "file" {
        copy_file(&url, &part)
    } else {
        download(&url, &part, timeout)
    };
    let size = match fetched {
        Ok(size) => size,
        Err(err) => {
            let _ = std::fs::remove_file(&part);
            return Err(err);
        }
    };
    if size == 0 {
        let _ = std::fs::remove_file(&part);
        return Err(FetchError::Empty(local_path.to_path_buf()));
    }
    std::fs::rename(&part, local_path)?;
    log::info!(
        "fetched fixture {remote_url} to {} ({size} bytes)",
        local_path.display()
    );
    Ok(local_path.to_path_buf())
}

fn copy_file(url: &Url, part: &Path) -> Result<u64, FetchError> {
    let source = url
        .to_file_path()
        .map_err(|()| FetchError::InvalidUrl(url.to_string()))?;
    Ok(std::fs::copy(source, part)?)
}

fn download(url: &Url, part: &Path, timeout: Duration) -> Result<u64, FetchError> {
    let client = reqwest::blocking::Client::builder()
        .timeout(timeout)
        .build()
        .map_err(handle_reqwest_error)?;
    let mut retried = false;
    let mut response = loop {
        match client.get(url.clone()).send() {
            Ok(response) => break response,
            Err(err) if !retried && (err.is_timeout() || err.is_connect()) => {
                log::warn!("fetching {url} failed, retrying: {err}");
                retried = true;
            }
            Err(err) => return Err(handle_reqwest_error(err)),
        }
    };
    if response.status() != StatusCode::OK {
        return Err(FetchError::Status {
            url: url.to_string(),
            status: response.status(),
        });
    }
    let mut file = File::create(part)?;
    response.copy_to(&mut file).map_err(handle_reqwest_error)
}

#[cfg(test)]
mod tests {
    use std::{
        io::{Read, Write},
        net::TcpListener,
    };

    use super::*;

    const TIMEOUT: Duration = Duration::from_secs(5);

    /// Serve a single HTTP response on a local port.
    fn serve_once(status: &'static str, body: &'static [u8]) -> String {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let address = listener.local_addr().unwrap();
        std::thread::spawn(move || {
            let (mut stream, _) = listener.accept().unwrap();
            let mut request = Vec::new();
            let mut buffer = [0u8; 1024];
            while !request.ends_with(b"\r\n\r\n") {
                let read = stream.read(&mut buffer).unwrap();
                if read == 0 {
                    break;
                }
                request.extend_from_slice(&buffer[..read]);
            }
            write!(
                stream,
                "HTTP/1.1 {status}\r\nContent-Length: {}\r\nConnection: close\r\n\r\n",
                body.len()
            )
            .unwrap();
            stream.write_all(body).unwrap();
        });
        format!("http://{address}/fixture.grib")
    }

    #[test]
    fn fetch_http() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("cache").join("fixture.grib");
        let url = serve_once("200 OK", b"GRIB");
        assert_eq!(ensure_local_copy(&url, &path, TIMEOUT).unwrap(), path);
        assert_eq!(std::fs::read(&path).unwrap(), b"GRIB");
        assert!(!partial_path(&path).exists());

        // cached, the server is gone
        assert_eq!(ensure_local_copy(&url, &path, TIMEOUT).unwrap(), path);
    }

    #[test]
    fn fetch_http_status() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("fixture.grib");
        let url = serve_once("404 Not Found", b"");
        assert!(matches!(
            ensure_local_copy(&url, &path, TIMEOUT),
            Err(FetchError::Status {
                status: StatusCode::NOT_FOUND,
                ..
            })
        ));
        assert!(!path.exists());
    }

    #[test]
    fn fetch_http_empty() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("fixture.grib");
        let url = serve_once("200 OK", b"");
        assert!(matches!(
            ensure_local_copy(&url, &path, TIMEOUT),
            Err(FetchError::Empty(_))
        ));
        assert!(!path.exists());
        assert!(!partial_path(&path).exists());
    }

    #[test]
    fn fetch_file() {
        let dir = tempfile::TempDir::new().unwrap();
        let source = dir.path().join("source.grib");
        std::fs::write(&source, b"GRIB").unwrap();
        let url = Url::from_file_path(&source).unwrap();
        let path = dir.path().join("fixture.grib");
        ensure_local_copy(url.as_str(), &path, TIMEOUT).unwrap();
        assert_eq!(std::fs::read(&path).unwrap(), b"GRIB");

        std::fs::write(&source, b"").unwrap();
        let empty = dir.path().join("empty.grib");
        assert!(matches!(
            ensure_local_copy(url.as_str(), &empty, TIMEOUT),
            Err(FetchError::Empty(_))
        ));
    }

    #[test]
    fn fetch_invalid() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("fixture.grib");
        assert!(matches!(
            ensure_local_copy("not a url", &path, TIMEOUT),
            Err(FetchError::InvalidUrl(_))
        ));
        // nothing listens on the discard port
        assert!(matches!(
            ensure_local_copy("http://127.0.0.1:9/fixture.grib", &path, TIMEOUT),
            Err(FetchError::Http(_))
        ));
    }
}
