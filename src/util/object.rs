use crate::model::fs::FsError;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Provider {
    AWS,
    GCS,
}

pub fn parse_provider_from_uri(bucket_uri: &str) -> Result<Provider, FsError> {
    if bucket_uri.starts_with("s3://") {
        Ok(Provider::AWS)
    } else if bucket_uri.starts_with("gs://") {
        Ok(Provider::GCS)
    } else {
        Err(FsError::Config {
            message: format!("failed to parse provider of: {}", bucket_uri),
        })
    }
}

pub fn parse_bucket_from_uri(bucket_uri: &str) -> Result<&str, FsError> {
    let bucket = bucket_uri
        .split_once("://")
        .map(|(_, rest)| rest.trim_end_matches('/'))
        .unwrap_or("");

    if bucket.is_empty() || bucket.contains('/') {
        return Err(FsError::Config {
            message: format!("failed to parse bucket of: {}", bucket_uri),
        });
    }

    Ok(bucket)
}

/// Object keys never start with a slash; callers may still pass `/a/b`.
pub fn object_key(path: &str) -> &str {
    path.trim_start_matches('/')
}

/// Listing prefix for a directory path: `"a/b"` becomes `"a/b/"`, root becomes `""`.
pub fn dir_prefix(path: &str) -> String {
    let key = object_key(path).trim_end_matches('/');
    if key.is_empty() {
        String::new()
    } else {
        format!("{}/", key)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_provider() {
        assert!(matches!(parse_provider_from_uri("s3://bucket"), Ok(Provider::AWS)));
        assert!(matches!(parse_provider_from_uri("gs://bucket"), Ok(Provider::GCS)));
        assert!(matches!(parse_provider_from_uri("ftp://bucket"), Err(_)));
    }

    #[test]
    fn test_parse_bucket() {
        let cases = vec![
            ("s3://bucket", Some("bucket")),
            ("gs://bucket/", Some("bucket")),
            ("gs://bucket/nested", None),
            ("s3://", None),
            ("bucket", None),
        ];

        for (input, expected) in cases {
            let result = parse_bucket_from_uri(input).ok();
            assert_eq!(result, expected, "failed for case: {}", input);
        }
    }

    #[test]
    fn test_object_key() {
        let cases = vec![
            ("a/b.txt", "a/b.txt"),
            ("/a/b.txt", "a/b.txt"),
            ("//a", "a"),
            ("", ""),
        ];

        for (input, expected) in cases {
            assert_eq!(object_key(input), expected, "failed for case: {}", input);
        }
    }

    #[test]
    fn test_dir_prefix() {
        let cases = vec![
            ("d", "d/"),
            ("d/", "d/"),
            ("/folder/subfolder", "folder/subfolder/"),
            ("/", ""),
            ("", ""),
        ];

        for (input, expected) in cases {
            assert_eq!(dir_prefix(input), expected, "failed for case: {}", input);
        }
    }
}
