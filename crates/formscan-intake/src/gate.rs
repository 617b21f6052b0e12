//! Verification gate: the review surface between a scan and the record form.
//!
//! ```text
//! Idle ──select──▶ ImageSelected ──begin──▶ Processing ──complete──▶ Reviewing ──confirm──▶ Confirmed
//!   ▲                   ▲                       │                        │
//!   └──clear/cancel─────┴──────retry────────────┴──fail──▶ Error ────────┘
//! ```
//!
//! At most one extraction is in flight per session. Each `begin` hands out a
//! [`Ticket`]; an outcome delivered with a ticket from an earlier generation
//! (the session was cancelled or restarted meanwhile) is discarded.

use std::fmt;
use std::sync::Arc;

use chrono::Utc;
use formscan_ai::{Extraction, Extractor, ImageNormalizer, NormalizeError, VisionModel};
use formscan_core::{
    DomainProfile, DraftError, ExtractionResult, FieldValue, IdentifierMinter, RecordDraft,
    SchemaError,
};
use thiserror::Error;
use tracing::{debug, info, warn};

const DECODE_MESSAGE: &str = "Could not read that file as an image. Choose a clearer photo or another file.";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GateState {
    Idle,
    ImageSelected,
    Processing,
    Reviewing,
    Error,
    Confirmed,
}

impl GateState {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::ImageSelected => "image-selected",
            Self::Processing => "processing",
            Self::Reviewing => "reviewing",
            Self::Error => "error",
            Self::Confirmed => "confirmed",
        }
    }
}

impl fmt::Display for GateState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Error, PartialEq)]
pub enum GateError {
    #[error("an extraction is already in progress")]
    Busy,

    #[error("cannot {action} while {state}")]
    InvalidState {
        action: &'static str,
        state: GateState,
    },

    #[error(transparent)]
    Field(#[from] SchemaError),

    #[error(transparent)]
    Draft(#[from] DraftError),
}

/// Whether a delivered outcome was applied to the session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Applied {
    Applied,
    /// The session moved on (cancelled, cleared or restarted); outcome dropped.
    Discarded,
}

/// Claim on one in-flight extraction.
#[derive(Debug)]
pub struct Ticket {
    generation: u64,
    /// The selected image's raw bytes.
    pub image: Arc<[u8]>,
}

#[derive(Clone)]
struct SelectedImage {
    name: String,
    bytes: Arc<[u8]>,
}

enum Stage {
    Idle,
    ImageSelected(SelectedImage),
    Processing(SelectedImage),
    Reviewing {
        image: Option<SelectedImage>,
        result: ExtractionResult,
        notice: Option<String>,
    },
    Error(String),
    Confirmed(RecordDraft),
}

impl Stage {
    fn state(&self) -> GateState {
        match self {
            Self::Idle => GateState::Idle,
            Self::ImageSelected(_) => GateState::ImageSelected,
            Self::Processing(_) => GateState::Processing,
            Self::Reviewing { .. } => GateState::Reviewing,
            Self::Error(_) => GateState::Error,
            Self::Confirmed(_) => GateState::Confirmed,
        }
    }
}

/// One open scan dialog for one domain profile.
pub struct ScanSession {
    profile: &'static DomainProfile,
    stage: Stage,
    generation: u64,
}

impl ScanSession {
    pub fn new(profile: &'static DomainProfile) -> Self {
        Self {
            profile,
            stage: Stage::Idle,
            generation: 0,
        }
    }

    /// Session that starts in review with an extraction obtained elsewhere,
    /// e.g. from already-recognised text.
    pub fn reviewing(profile: &'static DomainProfile, extraction: Extraction) -> Self {
        let mut session = Self::new(profile);
        session.stage = reviewing_stage(None, extraction);
        session
    }

    pub fn profile(&self) -> &'static DomainProfile {
        self.profile
    }

    pub fn state(&self) -> GateState {
        self.stage.state()
    }

    fn invalid(&self, action: &'static str) -> GateError {
        if self.state() == GateState::Processing {
            GateError::Busy
        } else {
            GateError::InvalidState {
                action,
                state: self.state(),
            }
        }
    }

    /// Choose (or replace) the image to scan. Any previous result is dropped.
    pub fn select_image(&mut self, name: impl Into<String>, bytes: impl Into<Arc<[u8]>>) -> Result<(), GateError> {
        match self.stage {
            Stage::Processing(_) | Stage::Confirmed(_) => Err(self.invalid("select an image")),
            _ => {
                let image = SelectedImage {
                    name: name.into(),
                    bytes: bytes.into(),
                };
                debug!(profile = self.profile.name, image = %image.name, bytes = image.bytes.len(), "image selected");
                self.stage = Stage::ImageSelected(image);
                Ok(())
            }
        }
    }

    /// Name of the selected image, if any.
    pub fn image_name(&self) -> Option<&str> {
        match &self.stage {
            Stage::ImageSelected(image) | Stage::Processing(image) => Some(&image.name),
            Stage::Reviewing { image: Some(image), .. } => Some(&image.name),
            _ => None,
        }
    }

    /// Drop the selection (and any result or error) and go back to idle.
    pub fn clear_selection(&mut self) -> Result<(), GateError> {
        match self.stage {
            Stage::Processing(_) | Stage::Confirmed(_) => Err(self.invalid("clear the selection")),
            _ => {
                self.generation += 1;
                self.stage = Stage::Idle;
                Ok(())
            }
        }
    }

    /// Discard the current result and return to the selected image so it can
    /// be scanned again.
    pub fn retry(&mut self) -> Result<(), GateError> {
        match std::mem::replace(&mut self.stage, Stage::Idle) {
            Stage::Reviewing { image: Some(image), .. } => {
                self.stage = Stage::ImageSelected(image);
                Ok(())
            }
            // Nothing to scan again; start over.
            Stage::Reviewing { image: None, .. } | Stage::Error(_) => Ok(()),
            other => {
                self.stage = other;
                Err(self.invalid("retry"))
            }
        }
    }

    /// Close the dialog: drop the image and any result. An extraction still in
    /// flight will be discarded when it lands.
    pub fn cancel(&mut self) {
        if matches!(self.stage, Stage::Confirmed(_)) {
            return;
        }
        self.generation += 1;
        self.stage = Stage::Idle;
        debug!(profile = self.profile.name, generation = self.generation, "session cancelled");
    }

    /// Start processing the selected image.
    pub fn begin(&mut self) -> Result<Ticket, GateError> {
        let image = match &self.stage {
            Stage::ImageSelected(image) => image.clone(),
            _ => return Err(self.invalid("start processing")),
        };
        self.generation += 1;
        let ticket = Ticket {
            generation: self.generation,
            image: Arc::clone(&image.bytes),
        };
        self.stage = Stage::Processing(image);
        Ok(ticket)
    }

    fn is_current(&self, ticket: &Ticket) -> bool {
        ticket.generation == self.generation && matches!(self.stage, Stage::Processing(_))
    }

    /// Deliver an extraction outcome for `ticket`.
    pub fn complete(&mut self, ticket: Ticket, extraction: Extraction) -> Applied {
        if !self.is_current(&ticket) {
            debug!(generation = ticket.generation, current = self.generation, "discarding stale extraction");
            return Applied::Discarded;
        }
        match std::mem::replace(&mut self.stage, Stage::Idle) {
            Stage::Processing(image) => {
                self.stage = reviewing_stage(Some(image), extraction);
                Applied::Applied
            }
            other => {
                self.stage = other;
                Applied::Discarded
            }
        }
    }

    /// Deliver a failure that happened before any extraction (bad image).
    pub fn fail(&mut self, ticket: Ticket, message: impl Into<String>) -> Applied {
        if !self.is_current(&ticket) {
            return Applied::Discarded;
        }
        self.stage = Stage::Error(message.into());
        Applied::Applied
    }

    /// Normalize the selected image, run the extraction and move to review
    /// (or to error if the image could not be decoded).
    pub async fn process<M: VisionModel>(
        &mut self,
        normalizer: &ImageNormalizer,
        extractor: &Extractor<M>,
    ) -> Result<GateState, GateError> {
        let ticket = self.begin()?;

        let normalizer = *normalizer;
        let bytes = Arc::clone(&ticket.image);
        let normalized = tokio::task::spawn_blocking(move || normalizer.normalize(&bytes))
            .await
            .map_err(NormalizeError::from)
            .and_then(|r| r);

        match normalized {
            Ok(payload) => {
                let extraction = extractor.extract_image(&payload, self.profile).await;
                self.complete(ticket, extraction);
            }
            Err(e) => {
                warn!(profile = self.profile.name, error = %e, "image could not be normalized");
                self.fail(ticket, DECODE_MESSAGE);
            }
        }
        Ok(self.state())
    }

    pub fn result(&self) -> Option<&ExtractionResult> {
        match &self.stage {
            Stage::Reviewing { result, .. } => Some(result),
            _ => None,
        }
    }

    /// Message shown alongside a fallback result.
    pub fn notice(&self) -> Option<&str> {
        match &self.stage {
            Stage::Reviewing { notice, .. } => notice.as_deref(),
            _ => None,
        }
    }

    pub fn error(&self) -> Option<&str> {
        match &self.stage {
            Stage::Error(message) => Some(message),
            _ => None,
        }
    }

    pub fn draft(&self) -> Option<&RecordDraft> {
        match &self.stage {
            Stage::Confirmed(draft) => Some(draft),
            _ => None,
        }
    }

    /// Override one extracted field with user-typed text.
    ///
    /// Confidence is display-only and cannot be edited.
    pub fn edit(&mut self, field: &str, input: &str) -> Result<(), GateError> {
        let profile = self.profile;
        let schema = &profile.schema;
        let state = self.state();
        let Stage::Reviewing { result, .. } = &mut self.stage else {
            return Err(GateError::InvalidState {
                action: "edit",
                state,
            });
        };
        let spec = schema
            .field(field)
            .ok_or_else(|| SchemaError::UnknownField(field.to_string()))?;
        let value = FieldValue::parse(field, spec.kind, input)?;
        result.set(schema, field, value)?;
        Ok(())
    }

    /// Accept the reviewed result and turn it into a record draft.
    pub fn confirm(&mut self, minter: &mut IdentifierMinter) -> Result<RecordDraft, GateError> {
        let Stage::Reviewing { result, .. } = &self.stage else {
            return Err(self.invalid("confirm"));
        };
        let draft = RecordDraft::from_confirmed(self.profile, result, minter, Utc::now().date_naive())?;
        info!(
            profile = self.profile.name,
            confidence = result.confidence(),
            "extraction confirmed"
        );
        self.stage = Stage::Confirmed(draft.clone());
        Ok(draft)
    }
}

fn reviewing_stage(image: Option<SelectedImage>, extraction: Extraction) -> Stage {
    let notice = extraction.message().map(str::to_string);
    Stage::Reviewing {
        image,
        result: extraction.result,
        notice,
    }
}
