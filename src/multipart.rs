//! Pulling one file out of an inbound `multipart/form-data` body.
//!
//! We make a single pass over the body with `multer`, accumulating the chunks
//! of the one part we care about and draining everything else. The result is
//! fully decoded; it gets re-encoded into a fresh form before it goes
//! anywhere near FileMaker.

use bytes::{Bytes, BytesMut};
use futures_util::{stream, Stream};
use std::convert::Infallible;

use crate::error::ProxyError;

/// The form part name that FileMaker's container endpoint expects, which is
/// also what our front end sends.
pub const UPLOAD_PART: &str = "upload";

#[derive(Clone, Debug, PartialEq)]
pub struct UploadedFile {
    pub bytes: Bytes,
    pub filename: Option<String>,
    pub content_type: Option<String>,
}

/// Read the part named `part_name` out of a buffered request body.
pub async fn read_file_part(
    content_type: Option<&str>,
    body: Bytes,
    part_name: &str,
    max_bytes: u64,
) -> Result<UploadedFile, ProxyError> {
    let chunks = stream::once(async move { Ok::<Bytes, Infallible>(body) });
    read_file_part_from_stream(content_type, chunks, part_name, max_bytes).await
}

/// Read the part named `part_name` out of a streamed request body.
///
/// Only a file part counts: a plain text field that happens to share the
/// name is skipped like any other field.
///
/// Fails with [`ProxyError::NoFileReceived`] if the stream ends without a
/// non-empty part of that name, and with [`ProxyError::Multipart`] if the
/// body is malformed or carries the part more than once.
pub async fn read_file_part_from_stream<S, O, E>(
    content_type: Option<&str>,
    chunks: S,
    part_name: &str,
    max_bytes: u64,
) -> Result<UploadedFile, ProxyError>
where
    S: Stream<Item = Result<O, E>> + Send + 'static,
    O: Into<Bytes> + 'static,
    E: Into<Box<dyn std::error::Error + Send + Sync>> + 'static,
{
    let content_type = content_type
        .ok_or_else(|| ProxyError::Multipart("missing Content-Type header".to_owned()))?;
    let boundary = multer::parse_boundary(content_type)
        .map_err(|e| ProxyError::Multipart(format!("bad Content-Type `{content_type}`: {e}")))?;

    let mut multipart = multer::Multipart::new(chunks, boundary);
    let mut found: Option<UploadedFile> = None;

    while let Some(mut field) = multipart
        .next_field()
        .await
        .map_err(|e| ProxyError::Multipart(e.to_string()))?
    {
        if field.name() != Some(part_name) || field.file_name().is_none() {
            while field
                .chunk()
                .await
                .map_err(|e| ProxyError::Multipart(e.to_string()))?
                .is_some()
            {}
            continue;
        }

        if found.is_some() {
            return Err(ProxyError::Multipart(format!(
                "more than one `{part_name}` part"
            )));
        }

        let filename = field.file_name().map(str::to_owned);
        let part_type = field.content_type().map(|m| m.to_string());
        let mut buf = BytesMut::new();

        while let Some(chunk) = field
            .chunk()
            .await
            .map_err(|e| ProxyError::Multipart(e.to_string()))?
        {
            if (buf.len() + chunk.len()) as u64 > max_bytes {
                return Err(ProxyError::PayloadTooLarge { limit: max_bytes });
            }

            buf.extend_from_slice(&chunk);
        }

        found = Some(UploadedFile {
            bytes: buf.freeze(),
            filename,
            content_type: part_type,
        });
    }

    match found {
        Some(file) if !file.bytes.is_empty() => Ok(file),
        _ => Err(ProxyError::NoFileReceived(part_name.to_owned())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const CT: &str = "multipart/form-data; boundary=X-BOUNDARY";

    fn body(parts: &[(&str, Option<&str>, &str)]) -> Bytes {
        let mut s = String::new();

        for (name, filename, data) in parts {
            s.push_str("--X-BOUNDARY\r\n");
            match filename {
                Some(f) => s.push_str(&format!(
                    "Content-Disposition: form-data; name=\"{name}\"; filename=\"{f}\"\r\nContent-Type: image/png\r\n\r\n"
                )),
                None => s.push_str(&format!(
                    "Content-Disposition: form-data; name=\"{name}\"\r\n\r\n"
                )),
            }
            s.push_str(data);
            s.push_str("\r\n");
        }

        s.push_str("--X-BOUNDARY--\r\n");
        Bytes::from(s)
    }

    #[tokio::test]
    async fn extracts_upload_part() {
        let b = body(&[
            ("note", None, "hello"),
            ("upload", Some("sig.png"), "PNGDATA"),
            ("other", Some("x.txt"), "ignored"),
        ]);
        let file = read_file_part(Some(CT), b, UPLOAD_PART, 1024).await.unwrap();
        assert_eq!(&file.bytes[..], b"PNGDATA");
        assert_eq!(file.filename.as_deref(), Some("sig.png"));
        assert_eq!(file.content_type.as_deref(), Some("image/png"));
    }

    #[tokio::test]
    async fn reassembles_chunked_stream() {
        let b = body(&[("upload", Some("sig.png"), "PNGDATA-PNGDATA-PNGDATA")]);
        let pieces: Vec<Result<Bytes, Infallible>> = b
            .chunks(5)
            .map(|c| Ok(Bytes::copy_from_slice(c)))
            .collect();
        let file = read_file_part_from_stream(Some(CT), stream::iter(pieces), UPLOAD_PART, 1024)
            .await
            .unwrap();
        assert_eq!(&file.bytes[..], b"PNGDATA-PNGDATA-PNGDATA");
    }

    #[tokio::test]
    async fn no_file_received() {
        let b = body(&[("note", None, "hello")]);
        let err = read_file_part(Some(CT), b, UPLOAD_PART, 1024).await.unwrap_err();
        assert!(matches!(err, ProxyError::NoFileReceived(_)));

        let b = body(&[("upload", Some("sig.png"), "")]);
        let err = read_file_part(Some(CT), b, UPLOAD_PART, 1024).await.unwrap_err();
        assert!(matches!(err, ProxyError::NoFileReceived(_)));
    }

    #[tokio::test]
    async fn text_field_is_not_a_file() {
        let b = Bytes::from(
            "--B\r\nContent-Disposition: form-data; name=\"upload\"\r\n\r\nhello\r\n--B--\r\n",
        );
        let err = read_file_part(Some("multipart/form-data; boundary=B"), b, UPLOAD_PART, 1024)
            .await
            .unwrap_err();
        assert!(matches!(err, ProxyError::NoFileReceived(_)));

        // A text field ahead of the real file doesn't count as a duplicate.
        let b = body(&[("upload", None, "hello"), ("upload", Some("sig.png"), "PNGDATA")]);
        let file = read_file_part(Some(CT), b, UPLOAD_PART, 1024).await.unwrap();
        assert_eq!(&file.bytes[..], b"PNGDATA");
    }

    #[tokio::test]
    async fn empty_filename_is_still_a_file() {
        let b = Bytes::from(
            "--B\r\nContent-Disposition: form-data; name=\"upload\"; filename=\"\"\r\n\r\nPNGDATA\r\n--B--\r\n",
        );
        let file = read_file_part(Some("multipart/form-data; boundary=B"), b, UPLOAD_PART, 1024)
            .await
            .unwrap();
        assert_eq!(&file.bytes[..], b"PNGDATA");
        assert_eq!(file.filename.as_deref(), Some(""));
        assert_eq!(file.content_type, None);
    }

    #[tokio::test]
    async fn rejects_bad_bodies() {
        let err = read_file_part(None, Bytes::new(), UPLOAD_PART, 1024).await.unwrap_err();
        assert!(matches!(err, ProxyError::Multipart(_)));

        let err = read_file_part(Some("application/json"), Bytes::from("{}"), UPLOAD_PART, 1024)
            .await
            .unwrap_err();
        assert!(matches!(err, ProxyError::Multipart(_)));

        let truncated = Bytes::from("--X-BOUNDARY\r\nContent-Disposition: form-data; name=\"upload\"; filename=\"a\"\r\n\r\nPNG");
        let err = read_file_part(Some(CT), truncated, UPLOAD_PART, 1024).await.unwrap_err();
        assert!(matches!(err, ProxyError::Multipart(_)));

        let b = body(&[("upload", Some("a.png"), "one"), ("upload", Some("b.png"), "two")]);
        let err = read_file_part(Some(CT), b, UPLOAD_PART, 1024).await.unwrap_err();
        assert!(matches!(err, ProxyError::Multipart(_)));
    }

    #[tokio::test]
    async fn enforces_size_limit() {
        let b = body(&[("upload", Some("sig.png"), "0123456789")]);
        let err = read_file_part(Some(CT), b, UPLOAD_PART, 4).await.unwrap_err();
        assert_eq!(err.status_code(), 413);
    }
}
