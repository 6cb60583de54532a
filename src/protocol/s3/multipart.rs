//! Streaming upload of bodies whose length is not known up front

use bytes::Bytes;
use tokio::io::{AsyncRead, AsyncReadExt};
use tracing::{debug, warn};

use super::error::TransportResult;
use super::types::UploadPartInfo;
use super::ObjectClient;

/// Largest buffer reserved before any data has arrived
const INITIAL_BUFFER: u64 = 1024 * 1024;

/// Upload `reader` to `bucket/key` in parts of `part_size` bytes
///
/// A body that ends inside the first part goes up as a single PUT. Anything
/// longer becomes a multipart upload whose parts are exactly `part_size` bytes
/// except the last. A failed multipart upload is aborted before the error is
/// returned. Returns the number of bytes stored.
pub async fn upload_stream<R>(
    client: &dyn ObjectClient,
    bucket: &str,
    key: &str,
    reader: &mut R,
    part_size: u64,
) -> TransportResult<u64>
where
    R: AsyncRead + Unpin + Send + ?Sized,
{
    let first = read_part(reader, part_size).await?;

    if (first.len() as u64) < part_size {
        let size = first.len() as u64;
        client.put_object(bucket, key, Bytes::from(first)).await?;
        debug!(bucket, key, size, "stored object with single put");
        return Ok(size);
    }

    let upload_id = client.create_multipart_upload(bucket, key).await?;

    match upload_parts(client, bucket, key, &upload_id, reader, part_size, first).await {
        Ok(total) => Ok(total),
        Err(e) => {
            if let Err(abort_err) = client.abort_multipart_upload(bucket, key, &upload_id).await {
                warn!(bucket, key, upload_id, error = %abort_err, "failed to abort multipart upload");
            }
            Err(e)
        }
    }
}

async fn upload_parts<R>(
    client: &dyn ObjectClient,
    bucket: &str,
    key: &str,
    upload_id: &str,
    reader: &mut R,
    part_size: u64,
    first: Vec<u8>,
) -> TransportResult<u64>
where
    R: AsyncRead + Unpin + Send + ?Sized,
{
    let mut completed_parts: Vec<UploadPartInfo> = Vec::new();
    let mut total = 0u64;
    let mut part_number = 1i32;
    let mut chunk = first;

    loop {
        let short = (chunk.len() as u64) < part_size;

        let part = client
            .upload_part(bucket, key, upload_id, part_number, Bytes::from(chunk))
            .await?;
        total += part.size as u64;
        completed_parts.push(part);

        if short {
            break;
        }

        chunk = read_part(reader, part_size).await?;
        if chunk.is_empty() {
            break;
        }
        part_number += 1;
    }

    client
        .complete_multipart_upload(bucket, key, upload_id, &completed_parts)
        .await?;

    debug!(
        bucket,
        key,
        parts = completed_parts.len(),
        size = total,
        "completed multipart upload"
    );
    Ok(total)
}

/// Read up to `part_size` bytes, fewer only at end of stream
async fn read_part<R>(reader: &mut R, part_size: u64) -> std::io::Result<Vec<u8>>
where
    R: AsyncRead + Unpin + ?Sized,
{
    let mut buffer = Vec::with_capacity(part_size.min(INITIAL_BUFFER) as usize);
    (&mut *reader).take(part_size).read_to_end(&mut buffer).await?;
    Ok(buffer)
}
