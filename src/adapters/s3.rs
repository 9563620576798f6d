use std::{
    io::{self, Cursor, Read, Write},
    time::{Duration, Instant, SystemTime},
};

use aws_sdk_s3::{presigning::PresigningConfig, primitives::ByteStream};

use crate::{
    adapters::{ListPage, ObjectAttrs, ObjectSink, ObjectStore, SignMethod},
    model::fs::FsError,
    util::poll::{poll_until_ready_error, PollError},
};

/// Bucket on S3 or an S3-compatible endpoint.
#[derive(Clone)]
pub struct S3Store {
    client: aws_sdk_s3::Client,
    bucket: String,
}

impl S3Store {
    pub fn new(client: aws_sdk_s3::Client, bucket: &str) -> Self {
        Self {
            client,
            bucket: bucket.to_string(),
        }
    }
}

fn modified_time(last_modified: Option<&aws_sdk_s3::primitives::DateTime>) -> Option<SystemTime> {
    last_modified.map(|lm| {
        SystemTime::UNIX_EPOCH + Duration::new(lm.secs().max(0) as u64, lm.subsec_nanos())
    })
}

impl ObjectStore for S3Store {
    fn attributes(&self, key: &str, deadline: Option<Instant>) -> Result<ObjectAttrs, FsError> {
        let req = self.client.head_object().bucket(&self.bucket).key(key);

        let ho = match poll_until_ready_error(req.send(), deadline) {
            Err(PollError::Failed(err)) => {
                if let Some(svc_err) = err.as_service_error() {
                    if svc_err.is_not_found() {
                        return Err(FsError::not_found(key));
                    }
                }

                return Err(FsError::store(format!(
                    "failed to head_object: {}, {}",
                    key, err
                )));
            }
            Err(err) => return Err(err.into_fs_error(&format!("head_object: {}", key))),
            Ok(ho) => ho,
        };

        Ok(ObjectAttrs {
            key: key.to_string(),
            size: ho.content_length().unwrap_or(0).max(0) as u64,
            modified_time: modified_time(ho.last_modified()),
            content_type: ho.content_type().map(|ct| ct.to_string()),
        })
    }

    fn delete(&self, key: &str, deadline: Option<Instant>) -> Result<(), FsError> {
        // delete_object succeeds for absent keys, so check existence first.
        self.attributes(key, deadline)?;

        let req = self.client.delete_object().bucket(&self.bucket).key(key);

        poll_until_ready_error(req.send(), deadline)
            .map_err(|err| err.into_fs_error(&format!("failed to delete_object: {}", key)))?;

        Ok(())
    }

    fn open_writer(&self, key: &str) -> Result<Box<dyn ObjectSink>, FsError> {
        Ok(Box::new(S3Sink {
            client: self.client.clone(),
            bucket: self.bucket.clone(),
            key: key.to_string(),
            body: Vec::new(),
        }))
    }

    fn open_reader(
        &self,
        key: &str,
        deadline: Option<Instant>,
    ) -> Result<Box<dyn Read + Send>, FsError> {
        let req = self.client.get_object().bucket(&self.bucket).key(key);

        let o = match poll_until_ready_error(req.send(), deadline) {
            Err(PollError::Failed(err)) => {
                if let Some(svc_err) = err.as_service_error() {
                    if svc_err.is_no_such_key() {
                        return Err(FsError::not_found(key));
                    }
                }

                return Err(FsError::store(format!(
                    "failed to get_object: {}, {}",
                    key, err
                )));
            }
            Err(err) => return Err(err.into_fs_error(&format!("get_object: {}", key))),
            Ok(o) => o,
        };

        let bytes = poll_until_ready_error(o.body.collect(), deadline)
            .map_err(|err| err.into_fs_error(&format!("failed to collect body: {}", key)))?;

        Ok(Box::new(Cursor::new(bytes.into_bytes().to_vec())))
    }

    fn list(
        &self,
        prefix: &str,
        cursor: Option<&str>,
        max_results: Option<usize>,
        deadline: Option<Instant>,
    ) -> Result<ListPage, FsError> {
        let mut page = ListPage::default();
        let mut continuation_token = cursor.map(|c| c.to_string());

        loop {
            let remaining = max_results.map(|max| max.saturating_sub(page.objects.len()));
            let req = self
                .client
                .list_objects_v2()
                .bucket(&self.bucket)
                .prefix(prefix)
                .set_continuation_token(continuation_token.clone())
                .set_max_keys(remaining.map(|r| r.min(i32::MAX as usize) as i32));

            let lo = poll_until_ready_error(req.send(), deadline).map_err(|err| {
                err.into_fs_error(&format!("failed to list_objects at: {}", prefix))
            })?;

            for o in lo.contents() {
                page.objects.push(ObjectAttrs {
                    key: o.key().unwrap_or("").to_string(),
                    size: o.size().unwrap_or(0).max(0) as u64,
                    modified_time: modified_time(o.last_modified()),
                    content_type: None,
                });
            }

            continuation_token = lo.next_continuation_token().map(|tok| tok.to_string());
            if continuation_token.is_none() || max_results.is_some() {
                break;
            }
        }

        page.next_cursor = continuation_token;
        Ok(page)
    }

    /// Presigns with the client's own credentials; `identity` and
    /// `private_key` only apply to stores that sign with a service key.
    fn sign_url(
        &self,
        key: &str,
        _identity: &str,
        _private_key: &[u8],
        method: SignMethod,
        expiry: Duration,
        deadline: Option<Instant>,
    ) -> Result<String, FsError> {
        let config = PresigningConfig::expires_in(expiry).map_err(|err| {
            FsError::store(format!("failed to build presigning config: {}, {}", key, err))
        })?;

        let presigned = match method {
            SignMethod::Get => poll_until_ready_error(
                self.client
                    .get_object()
                    .bucket(&self.bucket)
                    .key(key)
                    .presigned(config),
                deadline,
            )
            .map_err(|err| err.into_fs_error(&format!("failed to presign get_object: {}", key)))?,
            SignMethod::Put => poll_until_ready_error(
                self.client
                    .put_object()
                    .bucket(&self.bucket)
                    .key(key)
                    .presigned(config),
                deadline,
            )
            .map_err(|err| err.into_fs_error(&format!("failed to presign put_object: {}", key)))?,
        };

        Ok(presigned.uri().to_string())
    }
}

struct S3Sink {
    client: aws_sdk_s3::Client,
    bucket: String,
    key: String,
    body: Vec<u8>,
}

impl Write for S3Sink {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.body.extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

impl ObjectSink for S3Sink {
    fn close(self: Box<Self>, deadline: Option<Instant>) -> Result<(), FsError> {
        let S3Sink {
            client,
            bucket,
            key,
            body,
        } = *self;

        let req = client
            .put_object()
            .bucket(bucket)
            .key(&key)
            .body(ByteStream::from(body));

        poll_until_ready_error(req.send(), deadline)
            .map_err(|err| err.into_fs_error(&format!("failed to put_object at: {}", key)))?;

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use aws_sdk_s3::primitives::DateTime;

    use super::*;

    #[test]
    fn test_modified_time() {
        let with_nanos = DateTime::from_secs_and_nanos(1_700_000_000, 500);
        let before_epoch = DateTime::from_secs(-10);

        let cases = vec![
            (None, None),
            (
                Some(&with_nanos),
                Some(SystemTime::UNIX_EPOCH + Duration::new(1_700_000_000, 500)),
            ),
            (Some(&before_epoch), Some(SystemTime::UNIX_EPOCH)),
        ];

        for (input, expected) in cases {
            assert_eq!(modified_time(input), expected, "failed for case: {:?}", input);
        }
    }
}
