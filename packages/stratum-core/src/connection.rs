//! Connection string parsing.
//!
//! Selects the object-store backend and its credentials from a single URL:
//!
//! - `s3://key:secret@bucket.region/prefix?endpoint=...` — S3-compatible
//! - `file:///absolute/path` — local filesystem, for single-node deployments
//! - `memory://` — in-process, for tests and deterministic CI

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Backend {
    S3 {
        access_key: Option<String>,
        secret_key: Option<String>,
        bucket: String,
        region: Option<String>,
        endpoint: Option<String>,
        prefix: String,
    },
    File {
        root: String,
    },
    Memory,
}

#[derive(Debug, thiserror::Error)]
pub enum ConnectionStringError {
    #[error("unsupported scheme {scheme:?}; expected one of s3, file, memory")]
    UnsupportedScheme { scheme: String },
    #[error("missing bucket in s3 connection string {url:?}")]
    MissingBucket { url: String },
    #[error("malformed connection string {url:?}: {reason}")]
    Malformed { url: String, reason: String },
}

/// Parses a connection string into a [`Backend`] descriptor.
///
/// # Errors
///
/// See [`ConnectionStringError`].
pub fn parse(url: &str) -> Result<Backend, ConnectionStringError> {
    let (scheme, rest) = url.split_once("://").ok_or_else(|| ConnectionStringError::Malformed {
        url: url.to_string(),
        reason: "missing '://'".to_string(),
    })?;

    match scheme {
        "memory" => Ok(Backend::Memory),
        "file" => Ok(Backend::File {
            root: rest.to_string(),
        }),
        "s3" => parse_s3(url, rest),
        other => Err(ConnectionStringError::UnsupportedScheme {
            scheme: other.to_string(),
        }),
    }
}

fn parse_s3(url: &str, rest: &str) -> Result<Backend, ConnectionStringError> {
    let (rest, query) = match rest.split_once('?') {
        Some((body, query)) => (body, Some(query)),
        None => (rest, None),
    };

    let (credentials, host_and_path) = match rest.split_once('@') {
        Some((creds, remainder)) => (Some(creds), remainder),
        None => (None, rest),
    };

    let (access_key, secret_key) = match credentials {
        Some(creds) => match creds.split_once(':') {
            Some((k, s)) => (Some(k.to_string()), Some(s.to_string())),
            None => (Some(creds.to_string()), None),
        },
        None => (None, None),
    };

    let (host, path) = match host_and_path.split_once('/') {
        Some((h, p)) => (h, p.to_string()),
        None => (host_and_path, String::new()),
    };

    if host.is_empty() {
        return Err(ConnectionStringError::MissingBucket {
            url: url.to_string(),
        });
    }

    let (bucket, region) = match host.split_once('.') {
        Some((b, r)) => (b.to_string(), Some(r.to_string())),
        None => (host.to_string(), None),
    };

    let mut endpoint = None;
    if let Some(query) = query {
        for pair in query.split('&') {
            if let Some((k, v)) = pair.split_once('=') {
                if k == "endpoint" {
                    endpoint = Some(v.to_string());
                }
            }
        }
    }

    Ok(Backend::S3 {
        access_key,
        secret_key,
        bucket,
        region,
        endpoint,
        prefix: path,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_memory() {
        assert_eq!(parse("memory://").unwrap(), Backend::Memory);
    }

    #[test]
    fn parses_file() {
        let backend = parse("file:///var/data/store").unwrap();
        assert_eq!(
            backend,
            Backend::File {
                root: "/var/data/store".to_string()
            }
        );
    }

    #[test]
    fn parses_s3_with_credentials_and_region() {
        let backend = parse("s3://AKIA:secret@my-bucket.us-east-1/prefix").unwrap();
        match backend {
            Backend::S3 {
                access_key,
                secret_key,
                bucket,
                region,
                prefix,
                ..
            } => {
                assert_eq!(access_key.as_deref(), Some("AKIA"));
                assert_eq!(secret_key.as_deref(), Some("secret"));
                assert_eq!(bucket, "my-bucket");
                assert_eq!(region.as_deref(), Some("us-east-1"));
                assert_eq!(prefix, "prefix");
            }
            _ => panic!("expected s3 backend"),
        }
    }

    #[test]
    fn parses_s3_with_endpoint_query_param() {
        let backend = parse("s3://bucket/prefix?endpoint=http://localhost:9000").unwrap();
        match backend {
            Backend::S3 { endpoint, .. } => {
                assert_eq!(endpoint.as_deref(), Some("http://localhost:9000"));
            }
            _ => panic!("expected s3 backend"),
        }
    }

    #[test]
    fn parses_s3_without_credentials() {
        let backend = parse("s3://bucket/prefix").unwrap();
        match backend {
            Backend::S3 {
                access_key,
                secret_key,
                bucket,
                ..
            } => {
                assert!(access_key.is_none());
                assert!(secret_key.is_none());
                assert_eq!(bucket, "bucket");
            }
            _ => panic!("expected s3 backend"),
        }
    }

    #[test]
    fn rejects_unsupported_scheme() {
        let err = parse("ftp://host/path").unwrap_err();
        assert!(matches!(err, ConnectionStringError::UnsupportedScheme { .. }));
    }

    #[test]
    fn rejects_missing_bucket() {
        let err = parse("s3:///prefix").unwrap_err();
        assert!(matches!(err, ConnectionStringError::MissingBucket { .. }));
    }

    #[test]
    fn rejects_malformed_url() {
        assert!(parse("not-a-url-at-all").is_err());
    }
}
