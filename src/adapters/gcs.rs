use std::{
    io::{self, Cursor, Read, Write},
    time::{Duration, Instant, SystemTime},
};

use google_cloud_storage::{
    client::Client,
    http::{
        objects::{
            delete::DeleteObjectRequest,
            download::Range,
            get::GetObjectRequest,
            list::ListObjectsRequest,
            upload::{Media, UploadObjectRequest, UploadType},
            Object,
        },
        Error,
    },
    sign::{SignBy, SignedURLMethod, SignedURLOptions},
};

use crate::{
    adapters::{ListPage, ObjectAttrs, ObjectSink, ObjectStore, SignMethod},
    model::fs::FsError,
    util::poll::{poll_until_ready_error, PollError},
};

/// Bucket on Google Cloud Storage.
#[derive(Clone)]
pub struct GcsStore {
    client: Client,
    bucket: String,
}

impl GcsStore {
    pub fn new(client: Client, bucket: &str) -> Self {
        Self {
            client,
            bucket: bucket.to_string(),
        }
    }
}

fn is_not_found<T>(res: &Result<T, PollError<Error>>) -> bool {
    matches!(res, Err(PollError::Failed(Error::Response(err))) if err.code == 404)
}

fn modified_time(updated: Option<time::OffsetDateTime>) -> Option<SystemTime> {
    updated.map(SystemTime::from)
}

fn to_attrs(obj: Object) -> ObjectAttrs {
    ObjectAttrs {
        size: obj.size.max(0) as u64,
        modified_time: modified_time(obj.updated),
        content_type: obj.content_type,
        key: obj.name,
    }
}

impl ObjectStore for GcsStore {
    fn attributes(&self, key: &str, deadline: Option<Instant>) -> Result<ObjectAttrs, FsError> {
        let req = GetObjectRequest {
            bucket: self.bucket.clone(),
            object: key.to_string(),
            ..Default::default()
        };

        let res = poll_until_ready_error(self.client.get_object(&req), deadline);
        if is_not_found(&res) {
            return Err(FsError::not_found(key));
        }

        let obj = res.map_err(|err| err.into_fs_error(&format!("failed to get_object: {}", key)))?;

        Ok(to_attrs(obj))
    }

    fn delete(&self, key: &str, deadline: Option<Instant>) -> Result<(), FsError> {
        let req = DeleteObjectRequest {
            bucket: self.bucket.clone(),
            object: key.to_string(),
            ..Default::default()
        };

        let res = poll_until_ready_error(self.client.delete_object(&req), deadline);
        if is_not_found(&res) {
            return Err(FsError::not_found(key));
        }

        res.map_err(|err| err.into_fs_error(&format!("failed to delete_object: {}", key)))
    }

    fn open_writer(&self, key: &str) -> Result<Box<dyn ObjectSink>, FsError> {
        Ok(Box::new(GcsSink {
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
        let req = GetObjectRequest {
            bucket: self.bucket.clone(),
            object: key.to_string(),
            ..Default::default()
        };

        let res = poll_until_ready_error(
            self.client.download_object(&req, &Range::default()),
            deadline,
        );
        if is_not_found(&res) {
            return Err(FsError::not_found(key));
        }

        let bytes =
            res.map_err(|err| err.into_fs_error(&format!("failed to download_object: {}", key)))?;

        Ok(Box::new(Cursor::new(bytes)))
    }

    fn list(
        &self,
        prefix: &str,
        cursor: Option<&str>,
        max_results: Option<usize>,
        deadline: Option<Instant>,
    ) -> Result<ListPage, FsError> {
        let mut page = ListPage::default();
        let mut page_token = cursor.map(|c| c.to_string());

        loop {
            let remaining = max_results.map(|max| max.saturating_sub(page.objects.len()));
            let req = ListObjectsRequest {
                bucket: self.bucket.clone(),
                prefix: Some(prefix.to_string()),
                page_token: page_token.clone(),
                max_results: remaining.map(|r| r.min(i32::MAX as usize) as i32),
                ..Default::default()
            };

            let lo = poll_until_ready_error(self.client.list_objects(&req), deadline).map_err(
                |err| err.into_fs_error(&format!("failed to list_objects at: {}", prefix)),
            )?;

            if let Some(objs) = lo.items {
                page.objects.extend(objs.into_iter().map(to_attrs));
            }

            page_token = lo.next_page_token;
            // A bounded page is one request; an unbounded one drains every page.
            if page_token.is_none() || max_results.is_some() {
                break;
            }
        }

        page.next_cursor = page_token;
        Ok(page)
    }

    fn sign_url(
        &self,
        key: &str,
        identity: &str,
        private_key: &[u8],
        method: SignMethod,
        expiry: Duration,
        deadline: Option<Instant>,
    ) -> Result<String, FsError> {
        let opts = SignedURLOptions {
            method: match method {
                SignMethod::Get => SignedURLMethod::GET,
                SignMethod::Put => SignedURLMethod::PUT,
            },
            expires: expiry,
            ..Default::default()
        };

        poll_until_ready_error(
            self.client.signed_url(
                &self.bucket,
                key,
                Some(identity.to_string()),
                Some(SignBy::PrivateKey(private_key.to_vec())),
                opts,
            ),
            deadline,
        )
        .map_err(|err| err.into_fs_error(&format!("failed to sign url for: {}", key)))
    }
}

struct GcsSink {
    client: Client,
    bucket: String,
    key: String,
    body: Vec<u8>,
}

impl Write for GcsSink {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.body.extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

impl ObjectSink for GcsSink {
    fn close(self: Box<Self>, deadline: Option<Instant>) -> Result<(), FsError> {
        let GcsSink {
            client,
            bucket,
            key,
            body,
        } = *self;

        let req = UploadObjectRequest {
            bucket,
            ..Default::default()
        };
        let upload_type = UploadType::Simple(Media::new(key.clone()));

        poll_until_ready_error(client.upload_object(&req, body, &upload_type), deadline)
            .map_err(|err| err.into_fs_error(&format!("failed to upload_object at: {}", key)))?;

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;

    #[test]
    fn test_modified_time() {
        let cases = vec![
            (None, None),
            (
                Some(time::OffsetDateTime::UNIX_EPOCH),
                Some(SystemTime::UNIX_EPOCH),
            ),
            (
                time::OffsetDateTime::from_unix_timestamp(1_700_000_000).ok(),
                Some(SystemTime::UNIX_EPOCH + Duration::from_secs(1_700_000_000)),
            ),
        ];

        for (input, expected) in cases {
            assert_eq!(modified_time(input), expected, "failed for case: {:?}", input);
        }
    }

    #[test]
    fn test_to_attrs() {
        let obj = Object {
            name: "folder/file".to_string(),
            size: 42,
            content_type: Some("text/plain".to_string()),
            updated: Some(time::OffsetDateTime::UNIX_EPOCH),
            ..Default::default()
        };

        let attrs = to_attrs(obj);

        assert_eq!(attrs.key, "folder/file");
        assert_eq!(attrs.size, 42);
        assert_eq!(attrs.content_type.as_deref(), Some("text/plain"));
        assert_eq!(attrs.modified_time, Some(SystemTime::UNIX_EPOCH));
    }
}
