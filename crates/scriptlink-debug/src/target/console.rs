//! Console relays for the runtime's stdout and stderr

use crate::events::{ConsoleEvent, ConsoleStream, HostEvents};
use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::task::JoinHandle;
use tracing::{debug, trace};

const CHUNK_SIZE: usize = 8192;

/// Relay a child stream as console events until it closes.
///
/// The last event is always an end-of-stream marker.
pub fn spawn_relay<R>(mut reader: R, stream: ConsoleStream, events: HostEvents) -> JoinHandle<()>
where
    R: AsyncRead + Send + Unpin + 'static,
{
    tokio::spawn(async move {
        let mut buf = vec![0u8; CHUNK_SIZE];
        let mut carry: Vec<u8> = Vec::new();

        loop {
            let n = match reader.read(&mut buf).await {
                Ok(0) => break,
                Ok(n) => n,
                Err(e) => {
                    debug!(%stream, "Console read failed: {}", e);
                    break;
                }
            };
            carry.extend_from_slice(&buf[..n]);
            let text = take_utf8(&mut carry);
            if !text.is_empty() {
                trace!(%stream, len = text.len(), "Console output");
                events.emit(ConsoleEvent::text(stream, text)).await;
            }
        }

        if !carry.is_empty() {
            let rest = String::from_utf8_lossy(&carry).into_owned();
            events.emit(ConsoleEvent::text(stream, rest)).await;
        }
        events.emit(ConsoleEvent::end(stream)).await;
        debug!(%stream, "Console relay finished");
    })
}

/// Drain the decodable prefix of `bytes`, keeping an incomplete trailing
/// sequence for the next read. Invalid sequences become U+FFFD.
fn take_utf8(bytes: &mut Vec<u8>) -> String {
    let mut out = String::new();
    let mut rest: &[u8] = bytes;
    loop {
        match std::str::from_utf8(rest) {
            Ok(valid) => {
                out.push_str(valid);
                rest = &[];
                break;
            }
            Err(e) => {
                let (valid, tail) = rest.split_at(e.valid_up_to());
                out.push_str(&String::from_utf8_lossy(valid));
                match e.error_len() {
                    Some(len) => {
                        out.push(char::REPLACEMENT_CHARACTER);
                        rest = &tail[len..];
                    }
                    None => {
                        rest = tail;
                        break;
                    }
                }
            }
        }
    }
    let keep = rest.to_vec();
    *bytes = keep;
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::HostEvent;
    use tokio::io::AsyncWriteExt;

    #[test]
    fn test_take_utf8_keeps_incomplete_tail() {
        let mut bytes = "héllo".as_bytes().to_vec();
        let split = bytes.split_off(2);
        assert_eq!(take_utf8(&mut bytes), "h");
        assert_eq!(bytes, vec![0xC3]);

        bytes.extend_from_slice(&split);
        assert_eq!(take_utf8(&mut bytes), "éllo");
        assert!(bytes.is_empty());
    }

    #[test]
    fn test_take_utf8_replaces_invalid_bytes() {
        let mut bytes = vec![b'a', 0xFF, b'b'];
        assert_eq!(take_utf8(&mut bytes), "a\u{FFFD}b");
        assert!(bytes.is_empty());
    }

    #[tokio::test]
    async fn test_relay_ends_with_end_of_stream() {
        let events = HostEvents::new(16);
        let mut rx = events.subscribe().await;
        let (mut writer, reader) = tokio::io::duplex(64);

        let relay = spawn_relay(reader, ConsoleStream::Stdout, events);
        writer.write_all(b"hello\n").await.unwrap();
        drop(writer);
        relay.await.unwrap();

        let mut text = String::new();
        let mut last = None;
        while let Ok(HostEvent::Console(event)) = rx.try_recv() {
            text.push_str(&event.text);
            last = Some(event);
        }
        assert_eq!(text, "hello\n");
        assert_eq!(last, Some(ConsoleEvent::end(ConsoleStream::Stdout)));
    }
}
