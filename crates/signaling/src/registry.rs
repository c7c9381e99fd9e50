//! Raum-Registry – Wer sendet, wer schaut wem zu
//!
//! Zwei Indizes ueber dieselbe Raummenge:
//! - `raeume`: Presenter-SessionId -> Raum
//! - `viewer_index`: Viewer-SessionId -> Presenter-SessionId
//!
//! Beide werden unter einem einzigen Mutex gemeinsam veraendert. Der Lock
//! wird nie ueber ein `.await` gehalten.
//!
//! ## Raum-Lebenszyklus
//! ```text
//! reservieren() -> [reserviert] -> aktivieren(pipeline) -> [aktiv] -> aufloesen()
//!                       |
//!                       +-> reservierung_aufheben()  (Verhandlung gescheitert)
//! ```
//! Reservierte Raeume blockieren weitere Presenter-Versuche derselben
//! Session, sind fuer Viewer aber unsichtbar.

use std::collections::HashMap;
use std::sync::Arc;

use onair_core::types::{EndpointId, PipelineId, SessionId};
use parking_lot::Mutex;

use crate::error::{SignalingError, SignalingResult};
use crate::session::{Rolle, Session};

// ---------------------------------------------------------------------------
// Raum
// ---------------------------------------------------------------------------

/// Ein Presenter mit seinen Viewern
#[derive(Debug)]
struct Raum {
    presenter: Arc<Session>,
    /// `None` solange der Raum nur reserviert ist
    pipeline: Option<PipelineId>,
    viewer: HashMap<SessionId, Arc<Session>>,
}

impl Raum {
    fn ist_aktiv(&self) -> bool {
        self.pipeline.is_some()
    }

    fn viewer_anzahl(&self) -> usize {
        self.viewer.len()
    }
}

/// Ein aufgeloester Raum, bereit fuer die Abbau-Kaskade
///
/// `viewer` enthaelt zu jedem ehemaligen Viewer den Endpoint, den er beim
/// Aufloesen hielt. Nur diese Endpoints gehoeren zum Raum; was ein Viewer
/// danach setzt, gehoert schon einem anderen Raum.
#[derive(Debug)]
pub struct AufgeloesterRaum {
    pub presenter: Arc<Session>,
    pub pipeline: Option<PipelineId>,
    pub viewer: Vec<(Arc<Session>, Option<EndpointId>)>,
}

/// Was ein Viewer nach dem Beitritt fuer seine Verhandlung braucht
#[derive(Debug, Clone)]
pub struct RaumZugang {
    pub presenter: Arc<Session>,
    pub pipeline: PipelineId,
}

// ---------------------------------------------------------------------------
// RaumRegistry
// ---------------------------------------------------------------------------

#[derive(Debug, Default)]
struct Indizes {
    raeume: HashMap<SessionId, Raum>,
    viewer_index: HashMap<SessionId, SessionId>,
}

/// Thread-sichere Raumverwaltung
#[derive(Debug, Default)]
pub struct RaumRegistry {
    inner: Mutex<Indizes>,
}

impl RaumRegistry {
    pub fn neu() -> Self {
        Self::default()
    }

    /// Reserviert einen Raum fuer die Presenter-Session
    ///
    /// Fehler: `SendetBereits` wenn die Session schon einen Raum haelt,
    /// `SchautBereits` wenn sie Viewer in einem Raum ist.
    pub fn reservieren(&self, presenter: &Arc<Session>) -> SignalingResult<()> {
        let mut idx = self.inner.lock();
        let id = presenter.id();
        if idx.raeume.contains_key(id) {
            return Err(SignalingError::SendetBereits);
        }
        if idx.viewer_index.contains_key(id) {
            return Err(SignalingError::SchautBereits);
        }
        idx.raeume.insert(
            id.clone(),
            Raum {
                presenter: Arc::clone(presenter),
                pipeline: None,
                viewer: HashMap::new(),
            },
        );
        Ok(())
    }

    /// Macht einen reservierten Raum mit seiner Pipeline fuer Viewer sichtbar
    pub fn aktivieren(&self, presenter_id: &SessionId, pipeline: PipelineId) -> SignalingResult<()> {
        let mut idx = self.inner.lock();
        match idx.raeume.get_mut(presenter_id) {
            Some(raum) if raum.pipeline.is_none() => {
                raum.pipeline = Some(pipeline);
                Ok(())
            }
            Some(_) => Err(SignalingError::SendetBereits),
            None => Err(SignalingError::KeinPresenter),
        }
    }

    /// Entfernt eine Reservierung, die nie aktiviert wurde
    ///
    /// Aktive Raeume bleiben unberuehrt. Gibt `true` zurueck wenn entfernt.
    pub fn reservierung_aufheben(&self, presenter_id: &SessionId) -> bool {
        let mut idx = self.inner.lock();
        let reserviert = idx
            .raeume
            .get(presenter_id)
            .map(|r| !r.ist_aktiv())
            .unwrap_or(false);
        if reserviert {
            idx.raeume.remove(presenter_id);
        }
        reserviert
    }

    /// Fuegt einen Viewer zum aktiven Raum eines Presenters hinzu
    pub fn beitreten(
        &self,
        presenter_id: &SessionId,
        viewer: &Arc<Session>,
    ) -> SignalingResult<RaumZugang> {
        let mut idx = self.inner.lock();
        let viewer_id = viewer.id();

        let aktiv = idx
            .raeume
            .get(presenter_id)
            .map(Raum::ist_aktiv)
            .unwrap_or(false);
        if !aktiv {
            return Err(SignalingError::KeinPresenter);
        }
        if idx.raeume.contains_key(viewer_id) {
            return Err(SignalingError::SendetBereits);
        }
        if idx.viewer_index.contains_key(viewer_id) {
            return Err(SignalingError::SchautBereits);
        }

        let raum = idx
            .raeume
            .get_mut(presenter_id)
            .ok_or(SignalingError::KeinPresenter)?;
        let pipeline = raum.pipeline.clone().ok_or(SignalingError::KeinPresenter)?;
        raum.viewer.insert(viewer_id.clone(), Arc::clone(viewer));
        let zugang = RaumZugang {
            presenter: Arc::clone(&raum.presenter),
            pipeline,
        };
        idx.viewer_index
            .insert(viewer_id.clone(), presenter_id.clone());
        Ok(zugang)
    }

    /// Entfernt einen Viewer aus seinem Raum
    ///
    /// Gibt die Presenter-SessionId zurueck, `None` wenn die Session nicht schaut.
    pub fn verlassen(&self, viewer_id: &SessionId) -> Option<SessionId> {
        let mut idx = self.inner.lock();
        let presenter_id = idx.viewer_index.remove(viewer_id)?;
        if let Some(raum) = idx.raeume.get_mut(&presenter_id) {
            raum.viewer.remove(viewer_id);
        }
        Some(presenter_id)
    }

    /// Entfernt einen aktiven Raum samt aller Viewer-Eintraege
    ///
    /// Reservierte Raeume gehoeren ihrer laufenden Verhandlung und werden
    /// hier nicht angetastet. Die Endpoints der Viewer werden unter dem Lock
    /// festgehalten.
    pub fn aufloesen(&self, presenter_id: &SessionId) -> SignalingResult<AufgeloesterRaum> {
        let mut idx = self.inner.lock();
        let aktiv = idx
            .raeume
            .get(presenter_id)
            .map(Raum::ist_aktiv)
            .unwrap_or(false);
        if !aktiv {
            return Err(SignalingError::KeinPresenter);
        }
        let raum = idx
            .raeume
            .remove(presenter_id)
            .ok_or(SignalingError::KeinPresenter)?;
        let viewer = raum
            .viewer
            .into_iter()
            .map(|(viewer_id, session)| {
                idx.viewer_index.remove(&viewer_id);
                let endpoint = session.endpoint();
                (session, endpoint)
            })
            .collect();
        Ok(AufgeloesterRaum {
            presenter: raum.presenter,
            pipeline: raum.pipeline,
            viewer,
        })
    }

    /// Presenter-SessionId des Raums, in dem die Session Viewer ist
    pub fn raum_fuer_viewer(&self, viewer_id: &SessionId) -> Option<SessionId> {
        self.inner.lock().viewer_index.get(viewer_id).cloned()
    }

    /// Prueft ob `viewer_id` Viewer im Raum von `presenter_id` ist
    pub fn ist_viewer(&self, presenter_id: &SessionId, viewer_id: &SessionId) -> bool {
        self.inner.lock().viewer_index.get(viewer_id) == Some(presenter_id)
    }

    /// Prueft ob die Session einen aktiven Raum haelt
    pub fn ist_aktiv(&self, presenter_id: &SessionId) -> bool {
        self.inner
            .lock()
            .raeume
            .get(presenter_id)
            .map(Raum::ist_aktiv)
            .unwrap_or(false)
    }

    /// Aus der Registry abgeleitete Rolle einer Session
    pub fn rolle(&self, session_id: &SessionId) -> Rolle {
        let idx = self.inner.lock();
        if idx.raeume.contains_key(session_id) {
            Rolle::Presenter
        } else if idx.viewer_index.contains_key(session_id) {
            Rolle::Viewer
        } else {
            Rolle::Unbestimmt
        }
    }

    /// Anzahl aktiver (nicht nur reservierter) Raeume
    pub fn raum_anzahl(&self) -> usize {
        self.inner
            .lock()
            .raeume
            .values()
            .filter(|r| r.ist_aktiv())
            .count()
    }

    /// Anzahl Viewer ueber alle Raeume
    pub fn viewer_anzahl(&self) -> usize {
        self.inner.lock().viewer_index.len()
    }

    /// Viewer-Anzahl eines bestimmten Raums
    pub fn viewer_im_raum(&self, presenter_id: &SessionId) -> usize {
        self.inner
            .lock()
            .raeume
            .get(presenter_id)
            .map(Raum::viewer_anzahl)
            .unwrap_or(0)
    }
}
