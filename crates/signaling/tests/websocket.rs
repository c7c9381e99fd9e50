//! End-to-End-Tests ueber echte WebSocket-Verbindungen

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use onair_media::SimulierteEngine;
use onair_observability::OnairMetrics;
use onair_signaling::{SignalingConfig, SignalingServer, SignalingState};
use serde_json::{json, Value};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::watch;
use tokio_tungstenite::tungstenite::{self, Message};
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};

type Client = WebSocketStream<MaybeTlsStream<TcpStream>>;

struct TestServer {
    addr: SocketAddr,
    state: Arc<SignalingState>,
    shutdown_tx: watch::Sender<bool>,
}

async fn server_starten(config: SignalingConfig) -> TestServer {
    let engine = SimulierteEngine::neu();
    let metriken = OnairMetrics::neu().unwrap();
    let state = SignalingState::neu(config, Arc::new(engine), metriken);

    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    let server = SignalingServer::neu(Arc::clone(&state), addr);
    tokio::spawn(async move {
        let _ = server.mit_listener_starten(listener, shutdown_rx).await;
    });

    TestServer {
        addr,
        state,
        shutdown_tx,
    }
}

async fn client(addr: SocketAddr) -> Client {
    let (ws, _) = connect_async(format!("ws://{addr}/call")).await.unwrap();
    ws
}

async fn senden(ws: &mut Client, wert: Value) {
    ws.send(Message::Text(wert.to_string())).await.unwrap();
}

/// Liest das naechste JSON-Objekt, Steuer-Frames werden uebersprungen
async fn lesen(ws: &mut Client) -> Value {
    loop {
        let frame = tokio::time::timeout(Duration::from_secs(2), ws.next())
            .await
            .expect("Keine Nachricht innerhalb von 2s")
            .expect("Stream beendet")
            .unwrap();
        if let Message::Text(text) = frame {
            return serde_json::from_str(&text).unwrap();
        }
    }
}

/// Liest bis zur ersten Nachricht mit der gegebenen `id`
async fn lesen_bis(ws: &mut Client, id: &str) -> Value {
    loop {
        let wert = lesen(ws).await;
        if wert["id"] == id {
            return wert;
        }
    }
}

async fn presenter(ws: &mut Client) -> String {
    senden(ws, json!({"id": "presenter", "sdpOffer": "v=0 presenter"})).await;
    let antwort = lesen_bis(ws, "presenterResponse").await;
    assert_eq!(antwort["response"], "accepted", "{antwort}");
    assert!(antwort["sdpAnswer"].as_str().unwrap().starts_with("v=0"));
    antwort["presenterId"].as_str().unwrap().to_string()
}

#[tokio::test]
async fn presenter_und_viewer_ueber_websocket() {
    let server = server_starten(SignalingConfig::default()).await;

    let mut p = client(server.addr).await;
    let presenter_id = presenter(&mut p).await;

    // Kandidat aus gatherCandidates
    let kandidat = lesen_bis(&mut p, "iceCandidate").await;
    assert!(kandidat["candidate"]["candidate"]
        .as_str()
        .unwrap()
        .starts_with("candidate:"));
    assert!(kandidat["candidate"]["sdpMLineIndex"].is_number());

    let mut v = client(server.addr).await;
    senden(
        &mut v,
        json!({"id": "viewer", "target": presenter_id, "sdpOffer": "v=0 viewer"}),
    )
    .await;
    let antwort = lesen_bis(&mut v, "viewerResponse").await;
    assert_eq!(antwort["response"], "accepted", "{antwort}");

    senden(
        &mut v,
        json!({
            "id": "onIceCandidate",
            "candidate": {"candidate": "candidate:1 1 UDP 1 10.0.0.1 5000 typ host", "sdpMid": "0", "sdpMLineIndex": 0}
        }),
    )
    .await;

    senden(&mut p, json!({"id": "stop"})).await;
    let stop = lesen_bis(&mut v, "stopCommunication").await;
    assert_eq!(stop, json!({"id": "stopCommunication"}));

    tokio::time::sleep(Duration::from_millis(50)).await;
    assert_eq!(server.state.coordinator.registry().raum_anzahl(), 0);
    let _ = server.shutdown_tx.send(true);
}

#[tokio::test]
async fn viewer_ohne_sendung_wird_abgelehnt() {
    let server = server_starten(SignalingConfig::default()).await;
    let mut v = client(server.addr).await;

    senden(
        &mut v,
        json!({"id": "viewer", "target": "X", "sdpOffer": "v=0"}),
    )
    .await;
    let antwort = lesen(&mut v).await;
    assert_eq!(antwort["id"], "viewerResponse");
    assert_eq!(antwort["response"], "rejected");
    assert!(antwort["message"]
        .as_str()
        .unwrap()
        .starts_with("No active sender"));
}

#[tokio::test]
async fn ungueltige_nachrichten_werden_ignoriert() {
    let server = server_starten(SignalingConfig::default()).await;
    let mut p = client(server.addr).await;

    senden(&mut p, json!({"id": "gibtEsNicht"})).await;
    p.send(Message::Text("kein json".into())).await.unwrap();
    p.send(Message::Binary(vec![1, 2, 3])).await.unwrap();

    // Verbindung bleibt nutzbar
    presenter(&mut p).await;
    assert_eq!(server.state.coordinator.registry().raum_anzahl(), 1);
}

#[tokio::test]
async fn trennen_des_presenters_beendet_viewer() {
    let server = server_starten(SignalingConfig::default()).await;

    let mut p = client(server.addr).await;
    let presenter_id = presenter(&mut p).await;

    let mut v = client(server.addr).await;
    senden(
        &mut v,
        json!({"id": "viewer", "target": presenter_id, "sdpOffer": "v=0"}),
    )
    .await;
    assert_eq!(lesen_bis(&mut v, "viewerResponse").await["response"], "accepted");

    p.close(None).await.unwrap();
    drop(p);

    lesen_bis(&mut v, "stopCommunication").await;
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert_eq!(server.state.coordinator.sitzungs_anzahl(), 1);
    assert_eq!(server.state.coordinator.registry().raum_anzahl(), 0);
}

#[tokio::test]
async fn verbindungslimit_liefert_503() {
    let config = SignalingConfig {
        max_verbindungen: 1,
        ..SignalingConfig::default()
    };
    let server = server_starten(config).await;

    let _erster = client(server.addr).await;
    tokio::time::sleep(Duration::from_millis(100)).await;
    assert_eq!(server.state.coordinator.sitzungs_anzahl(), 1);

    match connect_async(format!("ws://{}/call", server.addr)).await {
        Err(tungstenite::Error::Http(antwort)) => assert_eq!(antwort.status(), 503),
        andere => panic!("503 erwartet, erhalten: {:?}", andere.map(|(_, r)| r.status())),
    }
}

#[tokio::test]
async fn gleichzeitige_upgrades_ueberschreiten_limit_nicht() {
    let config = SignalingConfig {
        max_verbindungen: 2,
        ..SignalingConfig::default()
    };
    let server = server_starten(config).await;
    let url = format!("ws://{}/call", server.addr);

    let versuche = futures_util::future::join_all(
        (0..6).map(|_| connect_async(url.clone())),
    )
    .await;

    let mut offen = Vec::new();
    let mut abgelehnt = 0;
    for versuch in versuche {
        match versuch {
            Ok((ws, _)) => offen.push(ws),
            Err(tungstenite::Error::Http(antwort)) => {
                assert_eq!(antwort.status(), 503);
                abgelehnt += 1;
            }
            Err(e) => panic!("Unerwarteter Fehler: {e}"),
        }
    }
    assert_eq!(offen.len(), 2);
    assert_eq!(abgelehnt, 4);
    assert_eq!(server.state.freie_plaetze(), 0);

    // Nach dem Schliessen einer Verbindung ist wieder ein Platz frei
    let mut erster = offen.remove(0);
    erster.close(None).await.unwrap();
    drop(erster);

    let mut neu = None;
    for _ in 0..40 {
        if let Ok((ws, _)) = connect_async(url.clone()).await {
            neu = Some(ws);
            break;
        }
        tokio::time::sleep(Duration::from_millis(50)).await;
    }
    assert!(neu.is_some(), "Freigewordener Platz wurde nicht vergeben");
    assert_eq!(server.state.freie_plaetze(), 0);
}

#[tokio::test]
async fn shutdown_schliesst_verbindungen() {
    let server = server_starten(SignalingConfig::default()).await;
    let mut p = client(server.addr).await;
    presenter(&mut p).await;

    server.shutdown_tx.send(true).unwrap();

    let ende = tokio::time::timeout(Duration::from_secs(2), async {
        while let Some(frame) = p.next().await {
            match frame {
                Ok(Message::Close(_)) | Err(_) => break,
                Ok(_) => continue,
            }
        }
    })
    .await;
    assert!(ende.is_ok(), "Verbindung wurde nicht geschlossen");

    tokio::time::sleep(Duration::from_millis(100)).await;
    assert_eq!(server.state.coordinator.registry().raum_anzahl(), 0);
}
