//! Length-prefixed bincode codec shared by broker and peer links.
//!
//! Every message on the wire is a u32 big-endian length followed by the
//! bincode body, capped at `MAX_FRAME_SIZE`.

use serde::de::DeserializeOwned;
use serde::Serialize;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

use quadchat_shared::constants::MAX_FRAME_SIZE;

use crate::error::NetError;

/// Write one message to the stream.
pub async fn write_message<W, T>(writer: &mut W, msg: &T) -> Result<(), NetError>
where
    W: AsyncWrite + Unpin,
    T: Serialize,
{
    let body = bincode::serialize(msg)?;
    if body.len() > MAX_FRAME_SIZE {
        return Err(NetError::FrameTooLarge {
            size: body.len(),
            max: MAX_FRAME_SIZE,
        });
    }
    writer.write_u32(body.len() as u32).await?;
    writer.write_all(&body).await?;
    writer.flush().await?;
    Ok(())
}

/// Read one message from the stream, enforcing the frame size cap before
/// allocating the body buffer.
pub async fn read_message<R, T>(reader: &mut R) -> Result<T, NetError>
where
    R: AsyncRead + Unpin,
    T: DeserializeOwned,
{
    let len = reader.read_u32().await? as usize;
    if len > MAX_FRAME_SIZE {
        return Err(NetError::FrameTooLarge {
            size: len,
            max: MAX_FRAME_SIZE,
        });
    }
    let mut body = vec![0u8; len];
    reader.read_exact(&mut body).await?;
    Ok(bincode::deserialize(&body)?)
}

#[cfg(test)]
mod tests {
    use super::*;

    use quadchat_shared::protocol::{Frame, Hello};
    use quadchat_shared::types::PeerIdentity;

    #[tokio::test]
    async fn test_write_read_roundtrip() {
        let (mut a, mut b) = tokio::io::duplex(4096);

        let frame = Frame::Hello(Hello {
            identity: PeerIdentity::generate("campus"),
        });
        write_message(&mut a, &frame).await.unwrap();

        let read: Frame = read_message(&mut b).await.unwrap();
        match (frame, read) {
            (Frame::Hello(sent), Frame::Hello(got)) => {
                assert_eq!(sent.identity, got.identity)
            }
            _ => panic!("Frame kind mismatch"),
        }
    }

    #[tokio::test]
    async fn test_sequential_messages_keep_boundaries() {
        let (mut a, mut b) = tokio::io::duplex(4096);

        for i in 0..3u32 {
            write_message(&mut a, &format!("msg-{i}")).await.unwrap();
        }
        for i in 0..3u32 {
            let got: String = read_message(&mut b).await.unwrap();
            assert_eq!(got, format!("msg-{i}"));
        }
    }

    #[tokio::test]
    async fn test_oversized_length_rejected() {
        let (mut a, mut b) = tokio::io::duplex(64);

        // Hand-craft a header claiming an absurd body length.
        a.write_u32(u32::MAX).await.unwrap();

        let result: Result<String, _> = read_message(&mut b).await;
        assert!(matches!(result, Err(NetError::FrameTooLarge { .. })));
    }
}
