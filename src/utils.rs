use bytes::Bytes;
use std::{io, path::Path};
use tokio::io::{AsyncRead, AsyncReadExt};

use crate::protocol::FileTime;

/// Reads up to `len` bytes, stopping short only at the end of the stream.
pub async fn read_chunk<R: AsyncRead + Unpin>(reader: &mut R, len: usize) -> io::Result<Bytes> {
    let mut buf = Vec::with_capacity(len);
    let _ = reader.take(len as u64).read_to_end(&mut buf).await?;
    Ok(Bytes::from(buf))
}

/// Discards the first `len` bytes of a stream.
pub async fn skip<R: AsyncRead + Unpin>(reader: &mut R, len: u64) -> io::Result<u64> {
    tokio::io::copy(&mut reader.take(len), &mut tokio::io::sink()).await
}

/// Access and modification time of a local file.
pub async fn local_times(path: &Path) -> io::Result<(FileTime, FileTime)> {
    let metadata = tokio::fs::metadata(path).await?;
    Ok((
        FileTime::from(metadata.accessed()?),
        FileTime::from(metadata.modified()?),
    ))
}

/// Fails with `InvalidData` when `mtime` is out of the local clock's range.
pub async fn set_local_mtime(file: tokio::fs::File, mtime: FileTime) -> io::Result<()> {
    let mtime = mtime.to_system_time().ok_or_else(|| {
        io::Error::new(
            io::ErrorKind::InvalidData,
            format!("modification time {} out of range", mtime.seconds),
        )
    })?;
    let file = file.into_std().await;
    tokio::task::spawn_blocking(move || file.set_modified(mtime))
        .await
        .map_err(io::Error::other)?
}
