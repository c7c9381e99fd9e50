//! Kurento Media Server Adapter (JSON-RPC 2.0 ueber WebSocket)
//!
//! Eine einzige WebSocket-Verbindung wird von allen Sessions geteilt.
//! Anfragen werden ueber ihre JSON-RPC-`id` den Antworten zugeordnet,
//! `onEvent`-Benachrichtigungen werden als `MedienEreignis` verteilt.
//!
//! ```text
//! aufrufen() --> ausgang (mpsc) --> Schreib-Task --> KMS
//!                                                     |
//! oneshot <-- offene_anfragen <-- Lese-Task <---------+
//!                                     |
//!                                     +--> EreignisVerteiler (IceCandidateFound)
//! ```

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use std::time::Duration;

use async_trait::async_trait;
use dashmap::DashMap;
use futures_util::{SinkExt, StreamExt};
use onair_core::types::{EndpointId, IceKandidat, PipelineId};
use parking_lot::Mutex;
use serde_json::{json, Map, Value};
use tokio::sync::{mpsc, oneshot};
use tokio_tungstenite::{connect_async, tungstenite::Message};

use crate::engine::{EreignisVerteiler, MedienEngine, MedienEreignis, MedienObjekt};
use crate::error::{MedienFehler, MedienResult};

/// Fehlercode des KMS fuer unbekannte Objekte
const OBJEKT_NICHT_GEFUNDEN: i64 = 40101;

/// Intervall fuer Keepalive-Pings an den KMS
const PING_INTERVALL: Duration = Duration::from_secs(60);

type RpcErgebnis = MedienResult<Value>;

/// Eine gesendete Anfrage, die auf ihre Antwort wartet
struct OffeneAnfrage {
    tx: oneshot::Sender<RpcErgebnis>,
    /// `create`: ein verspaetet erzeugtes Objekt wird wieder freigegeben
    erstellung: bool,
}

struct KurentoInner {
    ausgang: mpsc::UnboundedSender<String>,
    offene_anfragen: DashMap<u64, OffeneAnfrage>,
    naechste_id: AtomicU64,
    /// Vom KMS vergebene Session, wird bei jeder Anfrage mitgeschickt
    kms_session: Mutex<Option<String>>,
    verbunden: AtomicBool,
    verteiler: EreignisVerteiler,
    rpc_timeout: Duration,
}

/// Media-Engine-Implementierung fuer den Kurento Media Server
#[derive(Clone)]
pub struct KurentoEngine {
    inner: Arc<KurentoInner>,
}

impl KurentoEngine {
    /// Baut die WebSocket-Verbindung zum KMS auf und startet Lese-, Schreib-
    /// und Ping-Task
    pub async fn oeffnen(url: &str, rpc_timeout: Duration) -> MedienResult<Self> {
        let (ws, _) = connect_async(url)
            .await
            .map_err(|e| MedienFehler::nicht_erreichbar(format!("{url}: {e}")))?;
        let (mut schreiber, mut leser) = ws.split();
        let (ausgang_tx, mut ausgang_rx) = mpsc::unbounded_channel::<String>();

        let inner = Arc::new(KurentoInner {
            ausgang: ausgang_tx,
            offene_anfragen: DashMap::new(),
            naechste_id: AtomicU64::new(1),
            kms_session: Mutex::new(None),
            verbunden: AtomicBool::new(true),
            verteiler: EreignisVerteiler::neu(),
            rpc_timeout,
        });

        // Schreib-Task: endet wenn alle Sender (d.h. die Engine) weg sind
        let schreib_inner = Arc::downgrade(&inner);
        tokio::spawn(async move {
            while let Some(text) = ausgang_rx.recv().await {
                if let Err(e) = schreiber.send(Message::Text(text)).await {
                    tracing::warn!(fehler = %e, "Senden an Kurento fehlgeschlagen");
                    break;
                }
            }
            let _ = schreiber.close().await;
            if let Some(inner) = schreib_inner.upgrade() {
                inner.verbindung_verloren("Schreib-Task beendet");
            }
        });

        // Lese-Task
        let lese_inner = Arc::downgrade(&inner);
        tokio::spawn(async move {
            while let Some(nachricht) = leser.next().await {
                let Some(inner) = lese_inner.upgrade() else {
                    return;
                };
                match nachricht {
                    Ok(Message::Text(text)) => inner.eingang_verarbeiten(&text),
                    Ok(Message::Close(_)) => break,
                    Ok(_) => {}
                    Err(e) => {
                        tracing::warn!(fehler = %e, "Lesefehler auf Kurento-Verbindung");
                        break;
                    }
                }
            }
            if let Some(inner) = lese_inner.upgrade() {
                inner.verbindung_verloren("Verbindung vom KMS geschlossen");
            }
        });

        let engine = Self { inner };
        engine.ping_task_starten();

        tracing::info!(url = %url, "Verbindung zum Kurento Media Server hergestellt");
        Ok(engine)
    }

    fn ping_task_starten(&self) {
        let schwach: Weak<KurentoInner> = Arc::downgrade(&self.inner);
        tokio::spawn(async move {
            let mut intervall = tokio::time::interval(PING_INTERVALL);
            intervall.tick().await;
            loop {
                intervall.tick().await;
                let Some(inner) = schwach.upgrade() else {
                    break;
                };
                if !inner.verbunden.load(Ordering::Acquire) {
                    break;
                }
                let mut params = Map::new();
                params.insert("interval".into(), json!(PING_INTERVALL.as_millis() as u64 * 4));
                if let Err(e) = inner.aufrufen("ping", params).await {
                    tracing::warn!(fehler = %e, "Kurento-Ping fehlgeschlagen");
                }
            }
        });
    }

    async fn invoke(
        &self,
        objekt: &str,
        operation: &str,
        operation_params: Value,
    ) -> MedienResult<Value> {
        let mut params = Map::new();
        params.insert("object".into(), json!(objekt));
        params.insert("operation".into(), json!(operation));
        params.insert("operationParams".into(), operation_params);
        self.inner.aufrufen("invoke", params).await
    }

    async fn erstellen(&self, typ: &str, constructor_params: Value) -> MedienResult<String> {
        let mut params = Map::new();
        params.insert("type".into(), json!(typ));
        params.insert("constructorParams".into(), constructor_params);
        params.insert("properties".into(), json!({}));
        let ergebnis = self.inner.aufrufen("create", params).await?;
        wert_als_string(&ergebnis)
    }
}

impl KurentoInner {
    async fn aufrufen(&self, methode: &str, mut params: Map<String, Value>) -> MedienResult<Value> {
        if !self.verbunden.load(Ordering::Acquire) {
            return Err(MedienFehler::nicht_erreichbar("keine Verbindung zum KMS"));
        }

        let session = self.kms_session.lock().clone();
        if let Some(session) = session {
            params.insert("sessionId".into(), Value::String(session));
        }

        let id = self.naechste_id.fetch_add(1, Ordering::Relaxed);
        let anfrage = json!({
            "jsonrpc": "2.0",
            "id": id,
            "method": methode,
            "params": params,
        });

        let erstellung = methode == "create";
        let (tx, rx) = oneshot::channel();
        self.offene_anfragen
            .insert(id, OffeneAnfrage { tx, erstellung });

        tracing::trace!(id, methode, "Kurento-Anfrage");
        if self.ausgang.send(anfrage.to_string()).is_err() {
            self.offene_anfragen.remove(&id);
            return Err(MedienFehler::nicht_erreichbar("Schreib-Task beendet"));
        }

        match tokio::time::timeout(self.rpc_timeout, rx).await {
            Ok(Ok(ergebnis)) => ergebnis,
            Ok(Err(_)) => Err(MedienFehler::nicht_erreichbar("Antwortkanal geschlossen")),
            Err(_) => {
                // `create` bleibt offen, damit eine spaete Antwort freigegeben wird
                if !erstellung {
                    self.offene_anfragen.remove(&id);
                }
                tracing::warn!(id, methode, "Keine Antwort vom KMS innerhalb des Zeitlimits");
                Err(MedienFehler::Zeitlimit(methode.to_string()))
            }
        }
    }

    fn eingang_verarbeiten(self: &Arc<Self>, text: &str) {
        let wert: Value = match serde_json::from_str(text) {
            Ok(w) => w,
            Err(e) => {
                tracing::warn!(fehler = %e, "Ungueltiges JSON vom KMS");
                return;
            }
        };

        if wert.get("method").and_then(Value::as_str) == Some("onEvent") {
            self.ereignis_verarbeiten(&wert["params"]["value"]);
            return;
        }

        let Some(id) = wert.get("id").and_then(Value::as_u64) else {
            tracing::debug!("KMS-Nachricht ohne id ignoriert");
            return;
        };
        let Some((_, anfrage)) = self.offene_anfragen.remove(&id) else {
            tracing::debug!(id, "Antwort auf unbekannte oder abgelaufene Anfrage");
            return;
        };

        let ergebnis = if let Some(fehler) = wert.get("error") {
            Err(MedienFehler::Rpc {
                code: fehler.get("code").and_then(Value::as_i64).unwrap_or(0),
                nachricht: fehler
                    .get("message")
                    .and_then(Value::as_str)
                    .unwrap_or("unbekannter Fehler")
                    .to_string(),
            })
        } else {
            let result = wert.get("result").cloned().unwrap_or(Value::Null);
            if let Some(session) = result.get("sessionId").and_then(Value::as_str) {
                let mut aktuell = self.kms_session.lock();
                if aktuell.as_deref() != Some(session) {
                    tracing::debug!(session, "KMS-Session uebernommen");
                    *aktuell = Some(session.to_string());
                }
            }
            Ok(result)
        };

        // Empfaenger weg: Aufrufer hat aufgegeben (Zeitlimit oder Abbruch)
        if let Err(Ok(result)) = anfrage.tx.send(ergebnis) {
            if anfrage.erstellung {
                self.verwaistes_objekt_freigeben(&result);
            }
        }
    }

    /// Gibt ein Objekt frei, dessen `create`-Antwort niemand mehr erwartet
    fn verwaistes_objekt_freigeben(self: &Arc<Self>, result: &Value) {
        let Ok(kennung) = wert_als_string(result) else {
            return;
        };
        tracing::info!(objekt = %kennung, "Verspaetet erzeugtes Objekt wird freigegeben");
        let inner = Arc::clone(self);
        tokio::spawn(async move {
            let mut params = Map::new();
            params.insert("object".into(), json!(kennung));
            match inner.aufrufen("release", params).await {
                Ok(_) => {}
                Err(e) if ist_objekt_unbekannt(&e) => {}
                Err(e) => {
                    tracing::warn!(objekt = %kennung, fehler = %e, "Freigabe des verwaisten Objekts fehlgeschlagen")
                }
            }
        });
    }

    fn ereignis_verarbeiten(&self, wert: &Value) {
        if wert.get("type").and_then(Value::as_str) != Some("IceCandidateFound") {
            tracing::trace!(ereignis = %wert, "KMS-Ereignis ignoriert");
            return;
        }

        let endpoint = wert
            .get("object")
            .or_else(|| wert.pointer("/data/source"))
            .and_then(Value::as_str);
        let kandidat = wert
            .pointer("/data/candidate")
            .cloned()
            .and_then(|k| serde_json::from_value::<IceKandidat>(k).ok());

        match (endpoint, kandidat) {
            (Some(endpoint), Some(kandidat)) => {
                self.verteiler.senden(MedienEreignis::KandidatGefunden {
                    endpoint: EndpointId::neu(endpoint),
                    kandidat,
                });
            }
            _ => tracing::warn!(ereignis = %wert, "Unvollstaendiges IceCandidateFound-Ereignis"),
        }
    }

    fn verbindung_verloren(&self, grund: &str) {
        if !self.verbunden.swap(false, Ordering::AcqRel) {
            return;
        }
        tracing::error!(grund, "Verbindung zum Kurento Media Server verloren");

        let offen: Vec<u64> = self.offene_anfragen.iter().map(|e| *e.key()).collect();
        for id in offen {
            if let Some((_, anfrage)) = self.offene_anfragen.remove(&id) {
                let _ = anfrage.tx.send(Err(MedienFehler::nicht_erreichbar(grund)));
            }
        }
    }
}

fn wert_als_string(ergebnis: &Value) -> MedienResult<String> {
    ergebnis
        .get("value")
        .and_then(Value::as_str)
        .map(str::to_string)
        .ok_or_else(|| MedienFehler::UngueltigeAntwort(format!("kein 'value' in {ergebnis}")))
}

fn ist_objekt_unbekannt(fehler: &MedienFehler) -> bool {
    match fehler {
        MedienFehler::Rpc { code, nachricht } => {
            *code == OBJEKT_NICHT_GEFUNDEN || nachricht.to_lowercase().contains("not found")
        }
        MedienFehler::UnbekanntesObjekt(_) => true,
        _ => false,
    }
}

#[async_trait]
impl MedienEngine for KurentoEngine {
    async fn pipeline_erstellen(&self) -> MedienResult<PipelineId> {
        let id = self.erstellen("MediaPipeline", json!({})).await?;
        tracing::debug!(pipeline = %id, "MediaPipeline erstellt");
        Ok(PipelineId::neu(id))
    }

    async fn endpoint_erstellen(
        &self,
        pipeline: &PipelineId,
        datenkanaele: bool,
    ) -> MedienResult<EndpointId> {
        let id = self
            .erstellen(
                "WebRtcEndpoint",
                json!({
                    "mediaPipeline": pipeline.as_str(),
                    "useDataChannels": datenkanaele,
                }),
            )
            .await?;
        let endpoint = EndpointId::neu(id);

        let mut params = Map::new();
        params.insert("type".into(), json!("IceCandidateFound"));
        params.insert("object".into(), json!(endpoint.as_str()));
        if let Err(e) = self.inner.aufrufen("subscribe", params).await {
            // Ohne Abonnement waere der Endpoint unbrauchbar
            let _ = self.freigeben(&MedienObjekt::Endpoint(endpoint.clone())).await;
            return Err(e);
        }

        tracing::debug!(endpoint = %endpoint, pipeline = %pipeline, "WebRtcEndpoint erstellt");
        Ok(endpoint)
    }

    async fn angebot_verarbeiten(
        &self,
        endpoint: &EndpointId,
        sdp_angebot: &str,
    ) -> MedienResult<String> {
        let ergebnis = self
            .invoke(
                endpoint.as_str(),
                "processOffer",
                json!({ "offer": sdp_angebot }),
            )
            .await
            .map_err(|e| match e {
                MedienFehler::Rpc { nachricht, .. } => MedienFehler::VerhandlungFehlgeschlagen(nachricht),
                andere => andere,
            })?;
        wert_als_string(&ergebnis)
    }

    async fn kandidaten_sammeln(&self, endpoint: &EndpointId) -> MedienResult<()> {
        self.invoke(endpoint.as_str(), "gatherCandidates", json!({}))
            .await
            .map(|_| ())
    }

    async fn verbinden(&self, quelle: &EndpointId, senke: &EndpointId) -> MedienResult<()> {
        self.invoke(quelle.as_str(), "connect", json!({ "sink": senke.as_str() }))
            .await
            .map(|_| ())
    }

    async fn kandidat_hinzufuegen(
        &self,
        endpoint: &EndpointId,
        kandidat: &IceKandidat,
    ) -> MedienResult<()> {
        let candidate = json!({
            "__module__": "kurento",
            "__type__": "IceCandidate",
            "candidate": kandidat.candidate,
            "sdpMid": kandidat.sdp_mid,
            "sdpMLineIndex": kandidat.sdp_m_line_index,
        });
        self.invoke(
            endpoint.as_str(),
            "addIceCandidate",
            json!({ "candidate": candidate }),
        )
        .await
        .map(|_| ())
    }

    async fn freigeben(&self, objekt: &MedienObjekt) -> MedienResult<()> {
        let mut params = Map::new();
        params.insert("object".into(), json!(objekt.kennung()));
        match self.inner.aufrufen("release", params).await {
            Ok(_) => {
                tracing::debug!(objekt = %objekt, "Medienobjekt freigegeben");
                Ok(())
            }
            Err(e) if ist_objekt_unbekannt(&e) => {
                tracing::debug!(objekt = %objekt, "Medienobjekt war bereits freigegeben");
                Ok(())
            }
            Err(e) => Err(e),
        }
    }

    fn ereignisse_abonnieren(&self) -> mpsc::UnboundedReceiver<MedienEreignis> {
        self.inner.verteiler.abonnieren()
    }

    fn ist_verfuegbar(&self) -> bool {
        self.inner.verbunden.load(Ordering::Acquire)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn objekt_unbekannt_erkennung() {
        assert!(ist_objekt_unbekannt(&MedienFehler::Rpc {
            code: OBJEKT_NICHT_GEFUNDEN,
            nachricht: "x".into()
        }));
        assert!(ist_objekt_unbekannt(&MedienFehler::Rpc {
            code: 40000,
            nachricht: "Object 'abc' not found".into()
        }));
        assert!(!ist_objekt_unbekannt(&MedienFehler::Zeitlimit("release".into())));
    }

    #[test]
    fn wert_als_string_liest_value() {
        assert_eq!(
            wert_als_string(&json!({"value": "abc", "sessionId": "s"})).unwrap(),
            "abc"
        );
        assert!(matches!(
            wert_als_string(&json!({})),
            Err(MedienFehler::UngueltigeAntwort(_))
        ));
    }
}
