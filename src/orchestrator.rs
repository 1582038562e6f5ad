//! Screen-level state machine: upload, mark, generate, show the result.
//!
//! The UI feeds [`Event`]s in and executes the [`Command`]s that come back.
//! Every accepted event ends with a preview re-render, so the cached marker
//! always matches the current anchors.

use tracing::{debug, info, warn};

use crate::arrow::{ArrowStyle, Marker};
use crate::composite::{self, BaseImage, CompositedArtifact, ExportFormat};
use crate::config::DEFAULT_PROMPT;
use crate::geometry::Point;
use crate::marks::{MarkState, PointSet};
use crate::service::{GeneratedImage, GenerationOutcome, GenerationRequest};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum AppState {
    Upload,
    Marking,
    Generating,
    Result,
}

pub enum Event {
    ImageLoaded(BaseImage),
    LoadFailed(String),
    AddPoint(Point),
    Undo,
    ClearPoints,
    Export,
    Regenerate,
    /// Back to marking on the same image with fresh anchors.
    Restart,
    UploadNew,
    GenerationFinished(GenerationOutcome),
}

impl Event {
    fn name(&self) -> &'static str {
        match self {
            Self::ImageLoaded(_) => "image_loaded",
            Self::LoadFailed(_) => "load_failed",
            Self::AddPoint(_) => "add_point",
            Self::Undo => "undo",
            Self::ClearPoints => "clear_points",
            Self::Export => "export",
            Self::Regenerate => "regenerate",
            Self::Restart => "restart",
            Self::UploadNew => "upload_new",
            Self::GenerationFinished(_) => "generation_finished",
        }
    }
}

/// Side effects the caller must carry out.
#[derive(Debug, PartialEq, Eq)]
pub enum Command {
    Generate(GenerationRequest),
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Attempt {
    First,
    Regenerate,
}

/// The uploaded image and the anchors placed on it.
pub struct MarkingSession {
    pub image: BaseImage,
    pub points: PointSet,
}

pub struct Orchestrator {
    state: AppState,
    session: Option<MarkingSession>,
    artifact: Option<CompositedArtifact>,
    result: Option<GeneratedImage>,
    error: Option<String>,
    in_flight: Option<Attempt>,
    preview: Marker,
    style: ArrowStyle,
    format: ExportFormat,
    prompt: String,
}

impl Default for Orchestrator {
    fn default() -> Self {
        Self::new(ArrowStyle::default(), ExportFormat::default(), DEFAULT_PROMPT.to_string())
    }
}

impl Orchestrator {
    pub fn new(style: ArrowStyle, format: ExportFormat, prompt: String) -> Self {
        Self {
            state: AppState::Upload,
            session: None,
            artifact: None,
            result: None,
            error: None,
            in_flight: None,
            preview: Marker::None,
            style,
            format,
            prompt,
        }
    }

    pub fn state(&self) -> AppState {
        self.state
    }

    pub fn error(&self) -> Option<&str> {
        self.error.as_deref()
    }

    pub fn dismiss_error(&mut self) {
        self.error = None;
    }

    pub fn session(&self) -> Option<&MarkingSession> {
        self.session.as_ref()
    }

    pub fn result(&self) -> Option<&GeneratedImage> {
        self.result.as_ref()
    }

    /// The map last sent for generation, kept for regeneration.
    pub fn artifact(&self) -> Option<&CompositedArtifact> {
        self.artifact.as_ref()
    }

    pub fn style(&self) -> &ArrowStyle {
        &self.style
    }

    /// The marker to paint, recomputed after every accepted event.
    pub fn preview(&self) -> &Marker {
        &self.preview
    }

    pub fn mark_state(&self) -> MarkState {
        self.session
            .as_ref()
            .map_or(MarkState::Empty, |s| s.points.state())
    }

    pub fn can_export(&self) -> bool {
        self.state == AppState::Marking && self.mark_state() == MarkState::TwoPoints
    }

    pub fn can_regenerate(&self) -> bool {
        self.state == AppState::Result && self.artifact.is_some()
    }

    pub fn dispatch(&mut self, event: Event) -> Option<Command> {
        let name = event.name();
        let before = self.state;
        let (accepted, command) = self.apply(event);

        if !accepted {
            debug!(event = name, state = ?before, "orchestrator: event ignored");
            return None;
        }
        if before != self.state {
            info!(event = name, from = ?before, to = ?self.state, "orchestrator: transition");
        }
        self.render();
        command
    }

    fn apply(&mut self, event: Event) -> (bool, Option<Command>) {
        match (self.state, event) {
            (AppState::Generating, Event::GenerationFinished(outcome)) => {
                self.finish_generation(outcome);
                (true, None)
            }
            // Inputs stay locked until the in-flight call resolves.
            (AppState::Generating, _) => (false, None),
            (_, Event::UploadNew) => {
                self.discard_all();
                self.state = AppState::Upload;
                (true, None)
            }
            (AppState::Upload, Event::ImageLoaded(image)) => {
                self.discard_all();
                self.session = Some(MarkingSession {
                    image,
                    points: PointSet::default(),
                });
                self.state = AppState::Marking;
                (true, None)
            }
            (_, Event::LoadFailed(message)) => {
                warn!(%message, "orchestrator: image rejected");
                self.error = Some(message);
                (true, None)
            }
            (AppState::Marking, Event::AddPoint(point)) => {
                let added = self.points_mut().is_some_and(|p| p.add(point));
                (added, None)
            }
            (AppState::Marking, Event::Undo) => {
                let undone = self.points_mut().is_some_and(PointSet::undo);
                (undone, None)
            }
            (AppState::Marking, Event::ClearPoints) => match self.points_mut() {
                Some(points) if !points.is_empty() => {
                    points.reset();
                    (true, None)
                }
                _ => (false, None),
            },
            (AppState::Marking, Event::Export) => self.start_first_generation(),
            (AppState::Result, Event::Regenerate) => self.start_regeneration(),
            (AppState::Result, Event::Restart) => {
                if let Some(points) = self.points_mut() {
                    points.reset();
                }
                self.artifact = None;
                self.result = None;
                self.error = None;
                self.state = AppState::Marking;
                (true, None)
            }
            _ => (false, None),
        }
    }

    fn start_first_generation(&mut self) -> (bool, Option<Command>) {
        let Some(session) = self.session.as_mut() else {
            return (false, None);
        };
        if session.points.pair().is_none() {
            return (false, None);
        }

        match composite::export(&session.image, &session.points, &self.style, self.format) {
            Ok(artifact) => {
                debug!(points = session.points.len(), "orchestrator: map composited");
                session.points.set_enabled(false);
                self.artifact = Some(artifact.clone());
                self.error = None;
                self.in_flight = Some(Attempt::First);
                self.state = AppState::Generating;
                (true, Some(self.request_for(artifact)))
            }
            Err(e) => {
                warn!(error = %e, "orchestrator: export failed");
                self.error = Some(e.to_string());
                (true, None)
            }
        }
    }

    fn start_regeneration(&mut self) -> (bool, Option<Command>) {
        let Some(artifact) = self.artifact.clone() else {
            warn!("orchestrator: regenerate without cached map");
            self.error = Some(
                "The marked map is no longer available. Mark the viewpoint and direction again."
                    .to_string(),
            );
            self.result = None;
            if let Some(points) = self.points_mut() {
                points.set_enabled(true);
            }
            self.state = AppState::Marking;
            return (true, None);
        };

        self.error = None;
        self.in_flight = Some(Attempt::Regenerate);
        self.state = AppState::Generating;
        (true, Some(self.request_for(artifact)))
    }

    fn finish_generation(&mut self, outcome: GenerationOutcome) {
        let attempt = self.in_flight.take().unwrap_or(Attempt::First);
        let failure = match outcome {
            GenerationOutcome::Image(image) => {
                info!(
                    mime = %image.mime,
                    bytes = image.bytes.len(),
                    "orchestrator: image received"
                );
                self.result = Some(image);
                self.error = None;
                self.state = AppState::Result;
                return;
            }
            GenerationOutcome::Empty => "The service returned no image. Try again.".to_string(),
            GenerationOutcome::Failed(reason) => format!("Generation failed: {reason}"),
        };

        warn!(?attempt, error = %failure, "orchestrator: generation unsuccessful");
        self.error = Some(failure);
        if attempt == Attempt::Regenerate && self.result.is_some() {
            // Keep showing the last good image under the error.
            self.state = AppState::Result;
        } else {
            if let Some(points) = self.points_mut() {
                points.set_enabled(true);
            }
            self.state = AppState::Marking;
        }
    }

    fn request_for(&self, artifact: CompositedArtifact) -> Command {
        Command::Generate(GenerationRequest {
            artifact,
            prompt: self.prompt.clone(),
        })
    }

    fn render(&mut self) {
        self.preview = match &self.session {
            Some(session) => Marker::for_points(&session.points, &self.style),
            None => Marker::None,
        };
    }

    fn points_mut(&mut self) -> Option<&mut PointSet> {
        self.session.as_mut().map(|s| &mut s.points)
    }

    fn discard_all(&mut self) {
        self.session = None;
        self.artifact = None;
        self.result = None;
        self.error = None;
        self.in_flight = None;
    }

    #[cfg(test)]
    fn forget_artifact(&mut self) {
        self.artifact = None;
    }
}
