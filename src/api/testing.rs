// ============================================================================
// Serveur HTTP de test
// ============================================================================
// Répond aux requêtes successives avec une liste de statuts fixés, une
// connexion par requête. Les requêtes brutes reçues sont renvoyées dans un
// canal pour inspection.
// ============================================================================

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc;

/// Démarre le serveur ; retourne l'URL du webhook et les requêtes reçues
pub(crate) async fn status_server(statuses: Vec<u16>) -> (String, mpsc::UnboundedReceiver<String>) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let (tx, rx) = mpsc::unbounded_channel();

    tokio::spawn(async move {
        for status in statuses {
            let Ok((mut stream, _)) = listener.accept().await else {
                return;
            };

            let request = read_request(&mut stream).await;
            let _ = tx.send(request);

            let response = format!(
                "HTTP/1.1 {} {}\r\ncontent-length: 0\r\nconnection: close\r\n\r\n",
                status,
                if status < 300 { "OK" } else { "Error" }
            );
            let _ = stream.write_all(response.as_bytes()).await;
            let _ = stream.shutdown().await;
        }
    });

    (format!("http://{}/ayn-chat", addr), rx)
}

/// Lit en-têtes + corps (selon content-length)
async fn read_request(stream: &mut TcpStream) -> String {
    let mut request = Vec::new();
    let mut chunk = [0u8; 1024];

    loop {
        let n = match stream.read(&mut chunk).await {
            Ok(0) | Err(_) => break,
            Ok(n) => n,
        };
        request.extend_from_slice(&chunk[..n]);

        if let Some(end) = request.windows(4).position(|w| w == b"\r\n\r\n") {
            let headers = String::from_utf8_lossy(&request[..end]).to_ascii_lowercase();
            let length = headers
                .lines()
                .find_map(|line| line.strip_prefix("content-length:"))
                .and_then(|value| value.trim().parse::<usize>().ok())
                .unwrap_or(0);

            if request.len() >= end + 4 + length {
                break;
            }
        }
    }

    String::from_utf8_lossy(&request).into_owned()
}
