//! Signaling-Koordinator – Zustandsmaschine ueber alle Verbindungen
//!
//! Interpretiert eingehende Client-Nachrichten, veraendert die Raum-Registry,
//! ruft die Media-Engine auf und schickt Antworten und Ereignisse ueber die
//! Send-Queue der jeweiligen Session zurueck.
//!
//! ## Zustaende pro Verbindung (implizit ueber die Registry)
//! ```text
//! unbestimmt --presenter--> sendet ----stop/trennen----+
//!     |                                                 v
//!     +-------viewer------> schaut ----stop/trennen--> beendet
//! ```
//!
//! ## Kandidaten-Routing
//! Die Engine liefert `(EndpointId, Kandidat)` auf einem geordneten Kanal.
//! Ein einzelner Router-Task sucht die Session in `routen` und legt den
//! Kandidaten in deren Send-Queue. Routen werden beim Erstellen eines
//! Endpoints eingetragen und bei seiner Freigabe entfernt.

use std::sync::{Arc, Weak};

use dashmap::DashMap;
use onair_core::types::{EndpointId, IceKandidat, PipelineId, SessionId};
use onair_media::{MedienEngine, MedienEreignis, MedienObjekt};
use onair_observability::OnairMetrics;
use onair_protocol::{ClientNachricht, ServerNachricht};
use tokio::sync::mpsc;

use crate::error::{SignalingError, SignalingResult};
use crate::registry::{RaumRegistry, RaumZugang};
use crate::server_state::SignalingConfig;
use crate::session::{Rolle, Session};

/// Waehrend einer Verhandlung erzeugte Medienobjekte
///
/// Liegt ausserhalb des Timeout-Futures, damit ein Abbruch durch das
/// Zeitlimit die bereits erzeugten Objekte nicht verliert.
#[derive(Debug, Default)]
struct Erzeugt {
    pipeline: Option<PipelineId>,
    endpoint: Option<EndpointId>,
}

// ---------------------------------------------------------------------------
// SignalingCoordinator
// ---------------------------------------------------------------------------

/// Zentrale Koordination aller Sessions und Raeume
///
/// Clone teilt den inneren Zustand.
#[derive(Clone)]
pub struct SignalingCoordinator {
    inner: Arc<CoordinatorInner>,
}

struct CoordinatorInner {
    engine: Arc<dyn MedienEngine>,
    config: Arc<SignalingConfig>,
    registry: RaumRegistry,
    sessions: DashMap<SessionId, Arc<Session>>,
    routen: DashMap<EndpointId, Arc<Session>>,
    metriken: OnairMetrics,
}

impl SignalingCoordinator {
    /// Erstellt den Koordinator und startet den Ereignis-Router
    pub fn neu(
        engine: Arc<dyn MedienEngine>,
        config: Arc<SignalingConfig>,
        metriken: OnairMetrics,
    ) -> Self {
        let ereignisse = engine.ereignisse_abonnieren();
        let inner = Arc::new(CoordinatorInner {
            engine,
            config,
            registry: RaumRegistry::neu(),
            sessions: DashMap::new(),
            routen: DashMap::new(),
            metriken,
        });
        router_starten(Arc::downgrade(&inner), ereignisse);
        Self { inner }
    }

    // -----------------------------------------------------------------------
    // Verbindungs-Lebenszyklus
    // -----------------------------------------------------------------------

    /// Legt eine Session fuer eine neue Verbindung an
    pub fn verbinden(&self, id: SessionId) -> (Arc<Session>, mpsc::Receiver<ServerNachricht>) {
        let (session, rx) = Session::mit_queue(id.clone());
        let session = Arc::new(session);
        if self
            .inner
            .sessions
            .insert(id.clone(), Arc::clone(&session))
            .is_some()
        {
            tracing::warn!(session_id = %id, "SessionId doppelt vergeben – alte Session ersetzt");
        }
        self.inner
            .metriken
            .verbundene_sitzungen
            .set(self.inner.sessions.len() as i64);
        tracing::debug!(session_id = %id, "Session angelegt");
        (session, rx)
    }

    /// Raeumt eine getrennte Verbindung ab (wie `stop`, danach Session entfernen)
    pub async fn trennen(&self, session: &Arc<Session>) {
        {
            let _sperre = session.verhandlung_sperren().await;
            self.beenden(session).await;
        }
        self.inner.sessions.remove(session.id());
        self.inner
            .metriken
            .verbundene_sitzungen
            .set(self.inner.sessions.len() as i64);
        tracing::debug!(session_id = %session.id(), "Session entfernt");
    }

    /// Verarbeitet eine eingehende Client-Nachricht
    pub async fn verarbeiten(&self, session: &Arc<Session>, nachricht: ClientNachricht) {
        tracing::trace!(session_id = %session.id(), art = nachricht.art(), "Nachricht empfangen");
        match nachricht {
            ClientNachricht::Presenter { sdp_offer } => self.presenter(session, &sdp_offer).await,
            ClientNachricht::Viewer { target, sdp_offer } => {
                self.viewer(session, &target, &sdp_offer).await
            }
            ClientNachricht::OnIceCandidate { candidate } => {
                self.kandidat(session, candidate).await
            }
            ClientNachricht::Stop => self.stop(session).await,
        }
    }

    // -----------------------------------------------------------------------
    // presenter
    // -----------------------------------------------------------------------

    /// Verhandelt die Session als Presenter eines neuen Raums
    pub async fn presenter(&self, session: &Arc<Session>, sdp_angebot: &str) {
        let _sperre = session.verhandlung_sperren().await;
        let id = session.id().clone();

        if let Err(e) = self.inner.registry.reservieren(session) {
            tracing::info!(presenter = %id, fehler = %e, "Presenter-Anfrage abgelehnt");
            self.inner.metriken.verhandlung_zaehlen("presenter", "abgelehnt");
            session.senden_oder_loggen(ServerNachricht::presenter_abgelehnt(e.client_nachricht()));
            return;
        }

        let mut erzeugt = Erzeugt::default();
        let ergebnis = tokio::time::timeout(
            self.inner.config.verhandlungs_timeout,
            self.presenter_verhandeln(session, sdp_angebot, &mut erzeugt),
        )
        .await
        .unwrap_or(Err(SignalingError::Zeitlimit));

        // Bei Fehlern bleiben die Objekte in `erzeugt` und werden zurueckgerollt.
        // Ab der Aktivierung verbinden Viewer den Endpoint der Session als Quelle.
        let ergebnis = ergebnis.and_then(|sdp_antwort| {
            match (erzeugt.pipeline.clone(), erzeugt.endpoint.clone()) {
                (Some(pipeline), Some(endpoint)) => {
                    let alt = session.endpoint_setzen(endpoint.clone());
                    if let Err(e) = self.inner.registry.aktivieren(&id, pipeline.clone()) {
                        session.endpoint_nehmen();
                        if let Some(alt) = alt {
                            session.endpoint_setzen(alt);
                        }
                        return Err(e);
                    }
                    Ok((sdp_antwort, pipeline, endpoint, alt))
                }
                _ => Err(SignalingError::VerhandlungFehlgeschlagen(
                    "Medienobjekte fehlen".into(),
                )),
            }
        });

        match ergebnis {
            Ok((sdp_antwort, pipeline, endpoint, alt)) => {
                if let Some(alt) = alt {
                    self.objekt_freigeben(MedienObjekt::Endpoint(alt)).await;
                }
                session.rolle_setzen(Rolle::Presenter);
                self.inner.metriken.verhandlung_zaehlen("presenter", "akzeptiert");
                self.raum_metriken_aktualisieren();
                tracing::info!(presenter = %id, pipeline = %pipeline, "Raum eroeffnet");

                session.senden_oder_loggen(ServerNachricht::presenter_akzeptiert(
                    sdp_antwort,
                    id.clone(),
                ));
                self.kandidaten_sammeln(&id, &endpoint).await;
            }
            Err(e) => {
                tracing::warn!(presenter = %id, fehler = %e, "Presenter-Verhandlung fehlgeschlagen");
                self.erzeugte_freigeben(erzeugt).await;
                self.inner.registry.reservierung_aufheben(&id);
                self.inner
                    .metriken
                    .verhandlung_zaehlen("presenter", e.metrik_ergebnis());
                session.senden_oder_loggen(ServerNachricht::presenter_abgelehnt(e.client_nachricht()));
            }
        }
    }

    async fn presenter_verhandeln(
        &self,
        session: &Arc<Session>,
        sdp_angebot: &str,
        erzeugt: &mut Erzeugt,
    ) -> SignalingResult<String> {
        let engine = &self.inner.engine;

        let pipeline = engine.pipeline_erstellen().await?;
        erzeugt.pipeline = Some(pipeline.clone());

        let endpoint = engine
            .endpoint_erstellen(&pipeline, self.inner.config.datenkanaele)
            .await?;
        erzeugt.endpoint = Some(endpoint.clone());
        self.inner.routen.insert(endpoint.clone(), Arc::clone(session));

        let sdp_antwort = engine.angebot_verarbeiten(&endpoint, sdp_angebot).await?;
        Ok(sdp_antwort)
    }

    // -----------------------------------------------------------------------
    // viewer
    // -----------------------------------------------------------------------

    /// Verhandelt die Session als Viewer im Raum von `ziel`
    pub async fn viewer(&self, session: &Arc<Session>, ziel: &SessionId, sdp_angebot: &str) {
        let _sperre = session.verhandlung_sperren().await;
        let id = session.id().clone();

        let zugang = match self.inner.registry.beitreten(ziel, session) {
            Ok(zugang) => zugang,
            Err(e) => {
                tracing::info!(viewer = %id, presenter = %ziel, fehler = %e, "Viewer-Anfrage abgelehnt");
                self.inner.metriken.verhandlung_zaehlen("viewer", "abgelehnt");
                session.senden_oder_loggen(ServerNachricht::viewer_abgelehnt(e.client_nachricht()));
                return;
            }
        };
        self.raum_metriken_aktualisieren();

        let mut erzeugt = Erzeugt::default();
        let ergebnis = tokio::time::timeout(
            self.inner.config.verhandlungs_timeout,
            self.viewer_verhandeln(session, &zugang, sdp_angebot, &mut erzeugt),
        )
        .await
        .unwrap_or(Err(SignalingError::Zeitlimit));

        let ergebnis = ergebnis.and_then(|sdp_antwort| {
            erzeugt
                .endpoint
                .clone()
                .map(|endpoint| (sdp_antwort, endpoint))
                .ok_or_else(|| SignalingError::VerhandlungFehlgeschlagen("Endpoint fehlt".into()))
        });

        match ergebnis {
            Ok((sdp_antwort, endpoint)) => {
                if let Some(alt) = session.endpoint_setzen(endpoint.clone()) {
                    self.objekt_freigeben(MedienObjekt::Endpoint(alt)).await;
                }

                // Raum kann waehrend der Verhandlung aufgeloest worden sein
                if !self.inner.registry.ist_viewer(ziel, &id) {
                    tracing::info!(viewer = %id, presenter = %ziel, "Raum waehrend Verhandlung beendet");
                    self.endpoint_freigeben(session).await;
                    self.inner.metriken.verhandlung_zaehlen("viewer", "abgelehnt");
                    session.senden_oder_loggen(ServerNachricht::viewer_abgelehnt(
                        SignalingError::KeinPresenter.client_nachricht(),
                    ));
                    return;
                }

                session.rolle_setzen(Rolle::Viewer);
                self.inner.metriken.verhandlung_zaehlen("viewer", "akzeptiert");
                tracing::info!(viewer = %id, presenter = %ziel, "Viewer beigetreten");

                session.senden_oder_loggen(ServerNachricht::viewer_akzeptiert(sdp_antwort));
                self.kandidaten_sammeln(&id, &endpoint).await;
            }
            Err(e) => {
                tracing::warn!(viewer = %id, presenter = %ziel, fehler = %e, "Viewer-Verhandlung fehlgeschlagen");
                self.erzeugte_freigeben(erzeugt).await;
                self.inner.registry.verlassen(&id);
                self.raum_metriken_aktualisieren();
                self.inner
                    .metriken
                    .verhandlung_zaehlen("viewer", e.metrik_ergebnis());
                session.senden_oder_loggen(ServerNachricht::viewer_abgelehnt(e.client_nachricht()));
            }
        }
    }

    async fn viewer_verhandeln(
        &self,
        session: &Arc<Session>,
        zugang: &RaumZugang,
        sdp_angebot: &str,
        erzeugt: &mut Erzeugt,
    ) -> SignalingResult<String> {
        let engine = &self.inner.engine;

        let endpoint = engine
            .endpoint_erstellen(&zugang.pipeline, self.inner.config.datenkanaele)
            .await?;
        erzeugt.endpoint = Some(endpoint.clone());
        self.inner.routen.insert(endpoint.clone(), Arc::clone(session));

        let quelle = zugang
            .presenter
            .endpoint()
            .ok_or(SignalingError::KeinPresenter)?;
        engine.verbinden(&quelle, &endpoint).await?;

        let sdp_antwort = engine.angebot_verarbeiten(&endpoint, sdp_angebot).await?;
        Ok(sdp_antwort)
    }

    // -----------------------------------------------------------------------
    // onIceCandidate
    // -----------------------------------------------------------------------

    /// Uebergibt einen Client-Kandidaten an den eigenen Endpoint der Session
    pub async fn kandidat(&self, session: &Arc<Session>, kandidat: IceKandidat) {
        let Some(endpoint) = session.endpoint() else {
            tracing::debug!(
                session_id = %session.id(),
                rolle = %self.inner.registry.rolle(session.id()),
                "Kandidat ohne Endpoint verworfen"
            );
            return;
        };

        match self
            .inner
            .engine
            .kandidat_hinzufuegen(&endpoint, &kandidat)
            .await
        {
            Ok(()) => self.inner.metriken.kandidaten_empfangen_total.inc(),
            Err(e) => tracing::warn!(
                session_id = %session.id(),
                endpoint = %endpoint,
                fehler = %e,
                "Kandidat konnte nicht uebergeben werden"
            ),
        }
    }

    // -----------------------------------------------------------------------
    // stop
    // -----------------------------------------------------------------------

    /// Beendet die Sendung bzw. verlaesst den Raum (idempotent)
    pub async fn stop(&self, session: &Arc<Session>) {
        let _sperre = session.verhandlung_sperren().await;
        self.beenden(session).await;
    }

    /// Gemeinsamer Abbau fuer `stop` und Verbindungsende
    ///
    /// Erwartet, dass der Aufrufer die Verhandlungssperre der Session haelt.
    async fn beenden(&self, session: &Arc<Session>) {
        let id = session.id();

        if let Ok(raum) = self.inner.registry.aufloesen(id) {
            self.raum_metriken_aktualisieren();
            tracing::info!(presenter = %id, viewer = raum.viewer.len(), "Raum wird aufgeloest");

            for (v, _) in &raum.viewer {
                v.rolle_setzen(Rolle::Unbestimmt);
                v.senden_oder_loggen(ServerNachricht::StopCommunication);
            }
            // Nur die Endpoints aus diesem Raum; ein Viewer kann nach
            // `stopCommunication` schon einem anderen Raum beigetreten sein.
            for (v, endpoint) in &raum.viewer {
                if let Some(endpoint) = endpoint {
                    if v.endpoint_nehmen_wenn(endpoint) {
                        self.objekt_freigeben(MedienObjekt::Endpoint(endpoint.clone()))
                            .await;
                    }
                }
            }
            if let Some(pipeline) = raum.pipeline {
                self.objekt_freigeben(MedienObjekt::Pipeline(pipeline)).await;
            }
            self.endpoint_freigeben(session).await;
        } else if let Some(presenter) = self.inner.registry.verlassen(id) {
            self.raum_metriken_aktualisieren();
            tracing::info!(viewer = %id, presenter = %presenter, "Viewer hat den Raum verlassen");
            self.endpoint_freigeben(session).await;
        } else if self.endpoint_freigeben(session).await {
            tracing::debug!(session_id = %id, "Verwaisten Endpoint freigegeben");
        }

        session.rolle_setzen(Rolle::Unbestimmt);
    }

    // -----------------------------------------------------------------------
    // Freigabe-Helfer
    // -----------------------------------------------------------------------

    /// Gibt den Endpoint einer Session frei und entfernt seine Route
    ///
    /// Gibt `true` zurueck wenn ein Endpoint freigegeben wurde.
    async fn endpoint_freigeben(&self, session: &Arc<Session>) -> bool {
        match session.freigeben(self.inner.engine.as_ref()).await {
            Some(endpoint) => {
                self.inner.routen.remove(&endpoint);
                true
            }
            None => false,
        }
    }

    async fn objekt_freigeben(&self, objekt: MedienObjekt) {
        if let MedienObjekt::Endpoint(ep) = &objekt {
            self.inner.routen.remove(ep);
        }
        if let Err(e) = self.inner.engine.freigeben(&objekt).await {
            tracing::warn!(objekt = %objekt, fehler = %e, "Freigabe fehlgeschlagen");
        }
    }

    /// Rollback: erst Endpoint, dann Pipeline
    async fn erzeugte_freigeben(&self, erzeugt: Erzeugt) {
        if let Some(endpoint) = erzeugt.endpoint {
            self.objekt_freigeben(MedienObjekt::Endpoint(endpoint)).await;
        }
        if let Some(pipeline) = erzeugt.pipeline {
            self.objekt_freigeben(MedienObjekt::Pipeline(pipeline)).await;
        }
    }

    async fn kandidaten_sammeln(&self, id: &SessionId, endpoint: &EndpointId) {
        if let Err(e) = self.inner.engine.kandidaten_sammeln(endpoint).await {
            tracing::warn!(session_id = %id, endpoint = %endpoint, fehler = %e, "gatherCandidates fehlgeschlagen");
        }
    }

    fn raum_metriken_aktualisieren(&self) {
        let m = &self.inner.metriken;
        m.aktive_raeume.set(self.inner.registry.raum_anzahl() as i64);
        m.aktive_viewer.set(self.inner.registry.viewer_anzahl() as i64);
    }

    // -----------------------------------------------------------------------
    // Abfragen
    // -----------------------------------------------------------------------

    pub fn registry(&self) -> &RaumRegistry {
        &self.inner.registry
    }

    pub fn session(&self, id: &SessionId) -> Option<Arc<Session>> {
        self.inner.sessions.get(id).map(|s| Arc::clone(s.value()))
    }

    pub fn sitzungs_anzahl(&self) -> usize {
        self.inner.sessions.len()
    }

    /// Anzahl registrierter Kandidaten-Routen (= lebende Endpoints)
    pub fn routen_anzahl(&self) -> usize {
        self.inner.routen.len()
    }

    pub fn engine_verfuegbar(&self) -> bool {
        self.inner.engine.ist_verfuegbar()
    }
}

// ---------------------------------------------------------------------------
// Ereignis-Router
// ---------------------------------------------------------------------------

fn router_starten(
    inner: Weak<CoordinatorInner>,
    mut ereignisse: mpsc::UnboundedReceiver<MedienEreignis>,
) {
    tokio::spawn(async move {
        while let Some(ereignis) = ereignisse.recv().await {
            let Some(inner) = inner.upgrade() else {
                break;
            };
            inner.ereignis_routen(ereignis);
        }
        tracing::debug!("Ereignis-Router beendet");
    });
}

impl CoordinatorInner {
    fn ereignis_routen(&self, ereignis: MedienEreignis) {
        match ereignis {
            MedienEreignis::KandidatGefunden { endpoint, kandidat } => {
                let ziel = self.routen.get(&endpoint).map(|s| Arc::clone(s.value()));
                match ziel {
                    Some(session) => {
                        session.senden_oder_loggen(ServerNachricht::ice_kandidat(kandidat));
                        self.metriken.kandidaten_weitergeleitet_total.inc();
                    }
                    None => {
                        tracing::trace!(endpoint = %endpoint, "Kandidat fuer unbekannten Endpoint verworfen");
                    }
                }
            }
        }
    }
}
