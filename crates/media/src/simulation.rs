//! Simulierte Media-Engine
//!
//! Haelt Pipelines und Endpoints nur im Speicher. Fuer Tests und lokale
//! Entwicklung ohne Kurento. Fehler und Verzoegerungen koennen gezielt
//! eingeplant werden, um Rollback- und Timeout-Pfade zu pruefen.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use onair_core::types::{EndpointId, IceKandidat, PipelineId};
use parking_lot::Mutex;
use tokio::sync::mpsc;

use crate::engine::{EreignisVerteiler, MedienEngine, MedienEreignis, MedienObjekt};
use crate::error::{MedienFehler, MedienResult};

/// Operationen der simulierten Engine, fuer die Fehler eingeplant werden koennen
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SimOperation {
    PipelineErstellen,
    EndpointErstellen,
    AngebotVerarbeiten,
    KandidatenSammeln,
    Verbinden,
    KandidatHinzufuegen,
    Freigeben,
}

#[derive(Debug)]
struct SimEndpoint {
    pipeline: PipelineId,
    freigegeben: bool,
}

#[derive(Debug, Default)]
struct SimZustand {
    naechste_nummer: u64,
    pipelines: HashMap<PipelineId, bool>,
    endpoints: HashMap<EndpointId, SimEndpoint>,
    /// Anzahl der freigeben-Aufrufe je Objektkennung
    freigabe_aufrufe: HashMap<String, u32>,
    verbindungen: Vec<(EndpointId, EndpointId)>,
    kandidaten: Vec<(EndpointId, IceKandidat)>,
    fehler: HashSet<SimOperation>,
    angebot_verzoegerung: Option<Duration>,
    freigabe_verzoegerung: Option<Duration>,
    nicht_erreichbar: bool,
}

impl SimZustand {
    fn naechste_kennung(&mut self, praefix: &str) -> String {
        self.naechste_nummer += 1;
        format!("{praefix}-{}", self.naechste_nummer)
    }

    fn pruefen(&self, op: SimOperation) -> MedienResult<()> {
        if self.nicht_erreichbar {
            return Err(MedienFehler::nicht_erreichbar("Simulation deaktiviert"));
        }
        if self.fehler.contains(&op) {
            return Err(match op {
                SimOperation::AngebotVerarbeiten => {
                    MedienFehler::VerhandlungFehlgeschlagen("SDP-Angebot abgelehnt".into())
                }
                andere => MedienFehler::Rpc {
                    code: -1,
                    nachricht: format!("Eingeplanter Fehler bei {andere:?}"),
                },
            });
        }
        Ok(())
    }

    fn aktiver_endpoint(&self, id: &EndpointId) -> MedienResult<&SimEndpoint> {
        match self.endpoints.get(id) {
            Some(ep) if !ep.freigegeben => Ok(ep),
            _ => Err(MedienFehler::UnbekanntesObjekt(id.to_string())),
        }
    }
}

/// In-Process-Media-Engine
#[derive(Clone, Default)]
pub struct SimulierteEngine {
    zustand: Arc<Mutex<SimZustand>>,
    verteiler: Arc<EreignisVerteiler>,
}

impl SimulierteEngine {
    pub fn neu() -> Self {
        Self::default()
    }

    // -----------------------------------------------------------------------
    // Steuerung fuer Tests
    // -----------------------------------------------------------------------

    /// Laesst alle weiteren Aufrufe der Operation fehlschlagen
    pub fn fehler_einplanen(&self, op: SimOperation) {
        self.zustand.lock().fehler.insert(op);
    }

    pub fn fehler_aufheben(&self, op: SimOperation) {
        self.zustand.lock().fehler.remove(&op);
    }

    /// Verzoegert jede SDP-Verarbeitung um die angegebene Dauer
    pub fn angebot_verzoegerung_setzen(&self, dauer: Option<Duration>) {
        self.zustand.lock().angebot_verzoegerung = dauer;
    }

    /// Verzoegert jede Freigabe um die angegebene Dauer
    pub fn freigabe_verzoegerung_setzen(&self, dauer: Option<Duration>) {
        self.zustand.lock().freigabe_verzoegerung = dauer;
    }

    /// Simuliert einen Verbindungsverlust zur Engine
    pub fn erreichbarkeit_setzen(&self, erreichbar: bool) {
        self.zustand.lock().nicht_erreichbar = !erreichbar;
    }

    /// Meldet einen Kandidaten fuer einen beliebigen Endpoint
    pub fn kandidat_melden(&self, endpoint: &EndpointId, kandidat: IceKandidat) {
        self.verteiler.senden(MedienEreignis::KandidatGefunden {
            endpoint: endpoint.clone(),
            kandidat,
        });
    }

    // -----------------------------------------------------------------------
    // Abfragen fuer Tests
    // -----------------------------------------------------------------------

    /// Wie oft `freigeben` fuer dieses Objekt aufgerufen wurde
    pub fn freigabe_aufrufe(&self, objekt: &MedienObjekt) -> u32 {
        self.zustand
            .lock()
            .freigabe_aufrufe
            .get(objekt.kennung())
            .copied()
            .unwrap_or(0)
    }

    pub fn ist_freigegeben(&self, objekt: &MedienObjekt) -> bool {
        let z = self.zustand.lock();
        match objekt {
            MedienObjekt::Pipeline(id) => z.pipelines.get(id).copied().unwrap_or(false),
            MedienObjekt::Endpoint(id) => z.endpoints.get(id).map(|e| e.freigegeben).unwrap_or(false),
        }
    }

    pub fn aktive_pipelines(&self) -> usize {
        self.zustand.lock().pipelines.values().filter(|f| !**f).count()
    }

    pub fn aktive_endpoints(&self) -> usize {
        self.zustand
            .lock()
            .endpoints
            .values()
            .filter(|e| !e.freigegeben)
            .count()
    }

    /// Alle jemals erstellten Endpoints einer Pipeline
    pub fn endpoints_in_pipeline(&self, pipeline: &PipelineId) -> Vec<EndpointId> {
        let z = self.zustand.lock();
        let mut ids: Vec<EndpointId> = z
            .endpoints
            .iter()
            .filter(|(_, ep)| &ep.pipeline == pipeline)
            .map(|(id, _)| id.clone())
            .collect();
        ids.sort_by(|a, b| a.as_str().cmp(b.as_str()));
        ids
    }

    /// Alle erstellten Pipelines (auch freigegebene)
    pub fn pipelines(&self) -> Vec<PipelineId> {
        self.zustand.lock().pipelines.keys().cloned().collect()
    }

    pub fn verbindungen(&self) -> Vec<(EndpointId, EndpointId)> {
        self.zustand.lock().verbindungen.clone()
    }

    /// Alle an einen Endpoint uebergebenen entfernten Kandidaten
    pub fn hinzugefuegte_kandidaten(&self, endpoint: &EndpointId) -> Vec<IceKandidat> {
        self.zustand
            .lock()
            .kandidaten
            .iter()
            .filter(|(ep, _)| ep == endpoint)
            .map(|(_, k)| k.clone())
            .collect()
    }
}

#[async_trait]
impl MedienEngine for SimulierteEngine {
    async fn pipeline_erstellen(&self) -> MedienResult<PipelineId> {
        let mut z = self.zustand.lock();
        z.pruefen(SimOperation::PipelineErstellen)?;
        let id = PipelineId::neu(z.naechste_kennung("sim-pipeline"));
        z.pipelines.insert(id.clone(), false);
        Ok(id)
    }

    async fn endpoint_erstellen(
        &self,
        pipeline: &PipelineId,
        _datenkanaele: bool,
    ) -> MedienResult<EndpointId> {
        let mut z = self.zustand.lock();
        z.pruefen(SimOperation::EndpointErstellen)?;
        if z.pipelines.get(pipeline).copied() != Some(false) {
            return Err(MedienFehler::UnbekanntesObjekt(pipeline.to_string()));
        }
        let id = EndpointId::neu(z.naechste_kennung("sim-endpoint"));
        z.endpoints.insert(
            id.clone(),
            SimEndpoint {
                pipeline: pipeline.clone(),
                freigegeben: false,
            },
        );
        Ok(id)
    }

    async fn angebot_verarbeiten(
        &self,
        endpoint: &EndpointId,
        sdp_angebot: &str,
    ) -> MedienResult<String> {
        let verzoegerung = {
            let z = self.zustand.lock();
            z.pruefen(SimOperation::AngebotVerarbeiten)?;
            z.aktiver_endpoint(endpoint)?;
            z.angebot_verzoegerung
        };

        if let Some(dauer) = verzoegerung {
            tokio::time::sleep(dauer).await;
        }

        if sdp_angebot.trim().is_empty() {
            return Err(MedienFehler::VerhandlungFehlgeschlagen(
                "Leeres SDP-Angebot".into(),
            ));
        }

        Ok(format!(
            "v=0\r\no=- {} 0 IN IP4 127.0.0.1\r\ns=onair-simulation\r\nt=0 0\r\n",
            endpoint.as_str()
        ))
    }

    async fn kandidaten_sammeln(&self, endpoint: &EndpointId) -> MedienResult<()> {
        let nummer = {
            let mut z = self.zustand.lock();
            z.pruefen(SimOperation::KandidatenSammeln)?;
            z.aktiver_endpoint(endpoint)?;
            z.naechste_nummer += 1;
            z.naechste_nummer
        };

        self.kandidat_melden(
            endpoint,
            IceKandidat {
                candidate: format!(
                    "candidate:{nummer} 1 UDP 2122260223 127.0.0.1 {} typ host",
                    40000 + nummer % 20000
                ),
                sdp_mid: "0".to_string(),
                sdp_m_line_index: 0,
            },
        );
        Ok(())
    }

    async fn verbinden(&self, quelle: &EndpointId, senke: &EndpointId) -> MedienResult<()> {
        let mut z = self.zustand.lock();
        z.pruefen(SimOperation::Verbinden)?;
        z.aktiver_endpoint(quelle)?;
        z.aktiver_endpoint(senke)?;
        z.verbindungen.push((quelle.clone(), senke.clone()));
        Ok(())
    }

    async fn kandidat_hinzufuegen(
        &self,
        endpoint: &EndpointId,
        kandidat: &IceKandidat,
    ) -> MedienResult<()> {
        let mut z = self.zustand.lock();
        z.pruefen(SimOperation::KandidatHinzufuegen)?;
        z.aktiver_endpoint(endpoint)?;
        z.kandidaten.push((endpoint.clone(), kandidat.clone()));
        Ok(())
    }

    async fn freigeben(&self, objekt: &MedienObjekt) -> MedienResult<()> {
        let verzoegerung = self.zustand.lock().freigabe_verzoegerung;
        if let Some(dauer) = verzoegerung {
            tokio::time::sleep(dauer).await;
        }

        let mut z = self.zustand.lock();
        *z.freigabe_aufrufe
            .entry(objekt.kennung().to_string())
            .or_insert(0) += 1;
        z.pruefen(SimOperation::Freigeben)?;

        match objekt {
            MedienObjekt::Pipeline(id) => {
                if let Some(freigegeben) = z.pipelines.get_mut(id) {
                    *freigegeben = true;
                }
            }
            MedienObjekt::Endpoint(id) => {
                if let Some(ep) = z.endpoints.get_mut(id) {
                    ep.freigegeben = true;
                }
            }
        }
        Ok(())
    }

    fn ereignisse_abonnieren(&self) -> mpsc::UnboundedReceiver<MedienEreignis> {
        self.verteiler.abonnieren()
    }

    fn ist_verfuegbar(&self) -> bool {
        !self.zustand.lock().nicht_erreichbar
    }
}
