//! The construction path: display parsing, the setup exchange, and worker
//! startup through a network provider.

mod common;

use std::io;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use common::{reply_frame, request, setup_success_block, spawn_server};
use tokio::io::{AsyncReadExt, AsyncWriteExt, DuplexStream};
use xlink::{Conn, ConnConfig, DisplayAddress, NetworkProvider, Registry, Xid, wire};

/// Hands out a pre-built stream once, whatever the display says.
#[derive(Clone)]
struct PipeProvider {
    stream: Arc<Mutex<Option<DuplexStream>>>,
}

#[async_trait]
impl NetworkProvider for PipeProvider {
    type Stream = DuplexStream;

    async fn connect(&self, _display: &DisplayAddress) -> io::Result<DuplexStream> {
        self.stream
            .lock()
            .expect("provider lock")
            .take()
            .ok_or_else(|| io::Error::other("stream already taken"))
    }
}

/// Answer the client prologue with a success block, then keep serving
/// requests through the scripted responder.
fn spawn_handshaking_server(
    mut stream: DuplexStream,
    base: u32,
    mask: u32,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let mut head = [0u8; 12];
        stream.read_exact(&mut head).await.expect("prologue head");
        assert_eq!(head[0], 0x6c);
        assert_eq!(wire::u16_at(&head, 2), 11);
        let name_len = wire::u16_at(&head, 6) as usize;
        let data_len = wire::u16_at(&head, 8) as usize;
        let mut auth = vec![0u8; wire::pad(name_len) + wire::pad(data_len)];
        stream.read_exact(&mut auth).await.expect("prologue auth");

        stream
            .write_all(&setup_success_block(base, mask))
            .await
            .expect("setup block");

        spawn_server(stream, |req, sequence| {
            if req[0] == 77 {
                reply_frame(sequence, 0)
            } else {
                Vec::new()
            }
        })
        .await
        .expect("responder");
    })
}

#[tokio::test]
async fn test_connect_handshake_and_first_request() {
    let (client, server) = tokio::io::duplex(4096);
    spawn_handshaking_server(server, 0x0040_0000, 0x003f_ffff);

    let provider = PipeProvider {
        stream: Arc::new(Mutex::new(Some(client))),
    };
    let conn = Conn::connect_with(
        &provider,
        Some("mockhost:7.0"),
        Registry::new(),
        ConnConfig::default(),
    )
    .await
    .expect("connect");

    assert_eq!(conn.setup().resource_id_base, 0x0040_0000);
    assert_eq!(conn.setup().vendor, "xlink test server");
    let screen = conn.default_screen().expect("one advertised screen");
    assert_eq!(screen.root, Xid::new(0x123));
    assert_eq!(screen.width_in_pixels, 1920);

    let id = conn.generate_id().await.expect("fresh id");
    assert_eq!(id.value() & 0x0040_0000, 0x0040_0000);

    let cookie = conn
        .send_request(request(77, 4), true, true)
        .await
        .expect("submit");
    let bytes = cookie.reply().await.expect("reply").expect("reply bytes");
    assert_eq!(wire::sequence_number(&bytes), 1);
}
