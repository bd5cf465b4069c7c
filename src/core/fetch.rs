use crate::config::Config;
use std::io::{self, Read, Write};
use std::time::Duration;
use thiserror::Error;

/// Bytes moved per read while streaming a response to disk.
pub const CHUNK_SIZE: usize = 8192;

#[derive(Debug, Error)]
pub enum FetchError {
    #[error("HTTP error: {0}")]
    Http(#[from] ureq::Error),

    #[error("Unexpected status {status}")]
    Status { status: u16 },

    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    #[error("Deadline exceeded before the request started")]
    DeadlineExceeded,
}

/// The transport boundary: GET `url` and stream the body into `sink`,
/// returning the number of bytes written.
pub trait Fetch: Sync {
    fn fetch(&self, url: &str, sink: &mut dyn Write) -> Result<u64, FetchError>;
}

impl<F: Fetch + ?Sized> Fetch for &F {
    fn fetch(&self, url: &str, sink: &mut dyn Write) -> Result<u64, FetchError> {
        (**self).fetch(url, sink)
    }
}

pub struct HttpFetcher {
    agent: ureq::Agent,
}

impl HttpFetcher {
    pub fn new(timeout: Duration, user_agent: &str) -> Self {
        let config = ureq::Agent::config_builder()
            .http_status_as_error(false)
            .timeout_global(Some(timeout))
            .user_agent(user_agent)
            .build();
        Self {
            agent: config.into(),
        }
    }

    pub fn from_config(config: &Config) -> Self {
        Self::new(config.fetch_timeout(), &config.user_agent)
    }
}

impl Fetch for HttpFetcher {
    fn fetch(&self, url: &str, sink: &mut dyn Write) -> Result<u64, FetchError> {
        let response = self.agent.get(url).call()?;
        let status = response.status();
        if !status.is_success() {
            return Err(FetchError::Status {
                status: status.as_u16(),
            });
        }
        let mut reader = response.into_body().into_reader();
        Ok(copy_chunked(&mut reader, sink)?)
    }
}

/// Copy `reader` into `sink` in `CHUNK_SIZE` pieces.
pub fn copy_chunked(reader: &mut dyn Read, sink: &mut dyn Write) -> io::Result<u64> {
    let mut buffer = [0; CHUNK_SIZE];
    let mut total = 0;
    loop {
        let bytes_read = match reader.read(&mut buffer) {
            Ok(0) => break,
            Ok(n) => n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(e),
        };
        sink.write_all(&buffer[..bytes_read])?;
        total += bytes_read as u64;
    }
    sink.flush()?;
    Ok(total)
}
