//! Startet den kompletten Server mit simulierter Engine

use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use onair_server::config::{EngineTyp, ServerConfig};
use onair_server::Server;
use serde_json::Value;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::watch;
use tokio_tungstenite::tungstenite::Message;

async fn freier_port() -> u16 {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    listener.local_addr().unwrap().port()
}

async fn test_config() -> ServerConfig {
    let mut config = ServerConfig::default();
    config.netzwerk.bind_adresse = "127.0.0.1".into();
    config.netzwerk.port = freier_port().await;
    config.observability.port = freier_port().await;
    config.medien.engine = EngineTyp::Simulation;
    config
}

async fn warten_bis_erreichbar(port: u16) {
    for _ in 0..50 {
        if TcpStream::connect(("127.0.0.1", port)).await.is_ok() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    panic!("Port {port} nicht erreichbar");
}

async fn http_get(port: u16, pfad: &str) -> String {
    let mut stream = TcpStream::connect(("127.0.0.1", port)).await.unwrap();
    let anfrage = format!("GET {pfad} HTTP/1.1\r\nHost: localhost\r\nConnection: close\r\n\r\n");
    stream.write_all(anfrage.as_bytes()).await.unwrap();
    let mut antwort = String::new();
    stream.read_to_string(&mut antwort).await.unwrap();
    antwort
}

#[tokio::test]
async fn server_bedient_signaling_und_health() {
    let config = test_config().await;
    let ws_port = config.netzwerk.port;
    let obs_port = config.observability.port;

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let server = tokio::spawn(Server::neu(config).mit_shutdown_starten(shutdown_rx));

    warten_bis_erreichbar(ws_port).await;
    warten_bis_erreichbar(obs_port).await;

    let (mut ws, _) = tokio_tungstenite::connect_async(format!("ws://127.0.0.1:{ws_port}/call"))
        .await
        .unwrap();
    ws.send(Message::Text(
        r#"{"id":"presenter","sdpOffer":"v=0"}"#.to_string(),
    ))
    .await
    .unwrap();

    let antwort: Value = loop {
        let frame = tokio::time::timeout(Duration::from_secs(2), ws.next())
            .await
            .unwrap()
            .unwrap()
            .unwrap();
        if let Message::Text(text) = frame {
            break serde_json::from_str(&text).unwrap();
        }
    };
    assert_eq!(antwort["id"], "presenterResponse");
    assert_eq!(antwort["response"], "accepted");

    let health = http_get(obs_port, "/health").await;
    assert!(health.starts_with("HTTP/1.1 200"));
    assert!(health.contains("\"media_engine_connected\":true"));

    let metriken = http_get(obs_port, "/metrics").await;
    assert!(metriken.contains("onair_rooms_active 1"));

    shutdown_tx.send(true).unwrap();
    let ergebnis = tokio::time::timeout(Duration::from_secs(5), server)
        .await
        .expect("Server hat nicht rechtzeitig beendet")
        .unwrap();
    assert!(ergebnis.is_ok());
}

#[tokio::test]
async fn kurento_nicht_erreichbar_bricht_start_ab() {
    let mut config = test_config().await;
    config.medien.engine = EngineTyp::Kurento;
    config.medien.kurento_url = format!("ws://127.0.0.1:{}/kurento", freier_port().await);
    config.observability.aktiviert = false;

    let (_tx, rx) = watch::channel(false);
    let fehler = Server::neu(config).mit_shutdown_starten(rx).await.unwrap_err();
    assert!(fehler.to_string().contains("Media-Engine"));
}
