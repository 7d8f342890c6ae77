//! The read-dispatch-write loop shared by every transport.

use tokio::io::{AsyncRead, AsyncWrite};

use crate::error::TransportError;
use crate::mcp::server::McpSession;
use crate::mcp::shutdown::Shutdown;
use crate::mcp::stream::FramedStream;

/// Serves one connection until end of stream, error or shutdown.
///
/// Messages are processed strictly in order: the next read starts only once
/// the previous response has been written. Shutdown is honoured between
/// messages and while waiting for the first byte of a message. Once any byte
/// of a message has arrived, that message is read, dispatched and answered
/// before the loop stops; the read deadline bounds how long that can take.
///
/// Returns the number of messages processed.
///
/// # Errors
///
/// Returns the framing or I/O error that ended the connection. Protocol
/// errors never end up here; they are answered on the wire.
pub async fn serve_connection<R, W>(
    stream: &mut FramedStream<R, W>,
    session: &mut McpSession,
    shutdown: &Shutdown,
) -> Result<u64, TransportError>
where
    R: AsyncRead + Unpin,
    W: AsyncWrite + Unpin,
{
    let mut processed = 0;

    loop {
        if shutdown.is_cancelled() {
            tracing::debug!(processed, "Shutdown requested, leaving connection loop");
            break;
        }

        if stream.buffered() == 0 {
            let filled = tokio::select! {
                biased;
                () = shutdown.cancelled() => {
                    tracing::debug!(processed, "Shutdown requested while idle");
                    break;
                }
                filled = stream.fill_buffer() => filled?,
            };
            if filled == 0 {
                tracing::debug!(processed, "Peer closed the stream");
                break;
            }
        }

        let Some(payload) = stream.read_message().await? else {
            tracing::debug!(processed, "Peer closed the stream");
            break;
        };

        if let Some(response) = session.handle_payload(&payload).await {
            stream.write_message(&response).await?;
        }
        processed += 1;
    }

    Ok(processed)
}

#[cfg(test)]
mod tests {
    use serde_json::Value;
    use tokio::io::{AsyncReadExt, AsyncWriteExt, DuplexStream, ReadHalf, WriteHalf};

    use super::*;
    use crate::mcp::framing::encode_frame;
    use crate::mcp::shutdown;

    fn framed(side: DuplexStream) -> FramedStream<ReadHalf<DuplexStream>, WriteHalf<DuplexStream>> {
        let (reader, writer) = tokio::io::split(side);
        FramedStream::new(reader, writer)
    }

    #[tokio::test]
    async fn answers_in_order_and_stops_at_eof() {
        let (client, server) = tokio::io::duplex(4096);
        let mut client = framed(client);
        let mut server = framed(server);
        let mut session = McpSession::new(None);

        let serving = tokio::spawn(async move {
            serve_connection(&mut server, &mut session, &Shutdown::never()).await
        });

        client
            .write_message(br#"{"jsonrpc":"2.0","id":"a","method":"tools/list"}"#)
            .await
            .unwrap();
        client
            .write_message(br#"{"jsonrpc":"2.0","method":"initialized"}"#)
            .await
            .unwrap();
        client
            .write_message(br#"{"jsonrpc":"2.0","id":"b","method":"foo/bar"}"#)
            .await
            .unwrap();
        client.shutdown().await;

        let first: Value =
            serde_json::from_slice(&client.read_message().await.unwrap().unwrap()).unwrap();
        let second: Value =
            serde_json::from_slice(&client.read_message().await.unwrap().unwrap()).unwrap();
        assert_eq!(first["id"], "a");
        assert_eq!(second["id"], "b");
        assert_eq!(second["error"]["code"], -32601);

        assert_eq!(serving.await.unwrap().unwrap(), 3);
        assert_eq!(client.read_message().await.unwrap(), None);
    }

    #[tokio::test]
    async fn framing_errors_end_the_connection() {
        let (client, server) = tokio::io::duplex(4096);
        let (_client_reader, mut client_writer) = tokio::io::split(client);
        let mut server = framed(server);
        let mut session = McpSession::new(None);

        client_writer
            .write_all(b"Content-Length: 9999999999\r\n\r\n")
            .await
            .unwrap();

        let result = serve_connection(&mut server, &mut session, &Shutdown::never()).await;
        assert!(matches!(result, Err(TransportError::Framing(_))));
    }

    #[tokio::test]
    async fn stops_when_idle_and_cancelled() {
        let (_client, server) = tokio::io::duplex(4096);
        let mut server = framed(server);
        let mut session = McpSession::new(None);
        let (trigger, shutdown) = shutdown::channel();

        let serving =
            tokio::spawn(async move { serve_connection(&mut server, &mut session, &shutdown).await });
        trigger.cancel();

        let processed = tokio::time::timeout(std::time::Duration::from_secs(1), serving)
            .await
            .expect("loop should observe shutdown")
            .unwrap()
            .unwrap();
        assert_eq!(processed, 0);
    }

    #[tokio::test]
    async fn finishes_a_partly_received_message_after_cancel() {
        let (client, server) = tokio::io::duplex(4096);
        let (mut client_reader, mut client_writer) = tokio::io::split(client);
        let mut server = framed(server);
        let mut session = McpSession::new(None);
        let (trigger, shutdown) = shutdown::channel();

        let serving =
            tokio::spawn(async move { serve_connection(&mut server, &mut session, &shutdown).await });

        let frame = encode_frame(br#"{"jsonrpc":"2.0","id":"1","method":"initialize"}"#);
        let (head, tail) = frame.split_at(30);
        client_writer.write_all(head).await.unwrap();
        tokio::time::sleep(std::time::Duration::from_millis(50)).await;
        trigger.cancel();
        tokio::time::sleep(std::time::Duration::from_millis(50)).await;
        client_writer.write_all(tail).await.unwrap();

        let processed = tokio::time::timeout(std::time::Duration::from_secs(1), serving)
            .await
            .expect("loop should stop after answering")
            .unwrap()
            .unwrap();
        assert_eq!(processed, 1);

        let mut response = Vec::new();
        client_reader.read_to_end(&mut response).await.unwrap();
        let mut buffer = crate::mcp::framing::FrameBuffer::new();
        buffer.extend(&response).unwrap();
        let frame = buffer.next_frame().unwrap().unwrap();
        let value: Value = serde_json::from_slice(&frame).unwrap();
        assert_eq!(value["id"], "1");
        assert!(value["result"]["serverInfo"].is_object());
    }

    #[tokio::test]
    async fn already_cancelled_reads_nothing() {
        let input = encode_frame(br#"{"jsonrpc":"2.0","id":1,"method":"tools/list"}"#);
        let mut server = FramedStream::new(&input[..], Vec::new());
        let mut session = McpSession::new(None);
        let (trigger, shutdown) = shutdown::channel();
        trigger.cancel();

        let processed = serve_connection(&mut server, &mut session, &shutdown)
            .await
            .unwrap();
        assert_eq!(processed, 0);
        assert_eq!(server.buffered(), 0);
    }
}
