use std::fmt::{Display, Formatter};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Instant;

use tracing::{debug, info, warn};

use crate::config::EngineConfig;
use crate::transcription::{self, NullTranscriber, Transcriber};
use crate::types::AudioInput;

use super::alignment::segmenter::split_units;
use super::metrics::ScoringInput;
use super::reference::DirectoryReferenceSource;
use super::result::{EvaluationResult, Outcome};
use super::{
    AudioRole, AudioSignal, EvaluationMode, FeatureExtractor, FeatureSequence,
    MetricCalculator, PronunciationError, ReferenceStore, Result, SequenceAligner,
    SignalLoader, Transcript, UnitSegmenter, UnitTiming, VoiceVariant, DEFAULT_REFERENCE_TEXT,
};

/// Where the reference pronunciation comes from.
#[derive(Debug, Clone)]
pub enum ReferenceAudio {
    /// Encoded audio uploaded with the request.
    Provided(AudioInput),
    /// An already normalized signal, e.g. one held by a caller-side cache.
    Signal(Arc<AudioSignal>),
    /// Looked up in the dispatcher's reference store by text and voice.
    Fetch(VoiceVariant),
}

impl Default for ReferenceAudio {
    fn default() -> Self {
        ReferenceAudio::Fetch(VoiceVariant::default())
    }
}

#[derive(Debug, Clone)]
pub struct EvaluationRequest {
    pub reference_text: String,
    pub reference: ReferenceAudio,
    pub candidate: AudioInput,
    pub mode: EvaluationMode,
    /// Precomputed transcript; takes precedence over the dispatcher's transcriber.
    pub transcript: Option<Transcript>,
    /// Reference timing per unit, replacing proportional allocation.
    pub word_timings: Option<Vec<UnitTiming>>,
}

impl EvaluationRequest {
    pub fn new(candidate: AudioInput, reference: ReferenceAudio) -> Self {
        Self {
            reference_text: DEFAULT_REFERENCE_TEXT.to_string(),
            reference,
            candidate,
            mode: EvaluationMode::default(),
            transcript: None,
            word_timings: None,
        }
    }

    pub fn with_text(mut self, text: impl Into<String>) -> Self {
        self.reference_text = text.into();
        self
    }

    pub fn with_mode(mut self, mode: EvaluationMode) -> Self {
        self.mode = mode;
        self
    }

    pub fn with_transcript(mut self, transcript: Transcript) -> Self {
        self.transcript = Some(transcript);
        self
    }

    pub fn with_word_timings(mut self, timings: Vec<UnitTiming>) -> Self {
        self.word_timings = Some(timings);
        self
    }
}

/// Cooperative cancellation shared between a caller and a running evaluation.
#[derive(Debug, Clone, Default)]
pub struct CancellationToken {
    cancelled: Arc<AtomicBool>,
}

impl CancellationToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }

    pub fn check(&self, stage: &'static str) -> Result<()> {
        if self.is_cancelled() {
            Err(PronunciationError::Cancelled { stage })
        } else {
            Ok(())
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FeatureSet {
    Reference,
    Both,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PipelineStage {
    Idle,
    FeatureReady(FeatureSet),
    Aligned,
    Segmented,
    Scored,
    Assembled,
    Failed(String),
}

impl Display for PipelineStage {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            PipelineStage::Idle => f.write_str("idle"),
            PipelineStage::FeatureReady(FeatureSet::Reference) => {
                f.write_str("feature-ready(reference)")
            }
            PipelineStage::FeatureReady(FeatureSet::Both) => f.write_str("feature-ready(both)"),
            PipelineStage::Aligned => f.write_str("aligned"),
            PipelineStage::Segmented => f.write_str("segmented"),
            PipelineStage::Scored => f.write_str("scored"),
            PipelineStage::Assembled => f.write_str("assembled"),
            PipelineStage::Failed(reason) => write!(f, "failed({reason})"),
        }
    }
}

/// Logs every transition of one request through the pipeline.
struct StageTracker {
    request: u64,
    stage: PipelineStage,
}

impl StageTracker {
    fn new(request: u64) -> Self {
        Self {
            request,
            stage: PipelineStage::Idle,
        }
    }

    fn advance(&mut self, next: PipelineStage) {
        debug!(request = self.request, from = %self.stage, to = %next, "pipeline transition");
        self.stage = next;
    }
}

/// Output shape requested from the scorer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Scoring {
    Mode(EvaluationMode),
    Legacy,
}

impl Scoring {
    /// Units are characters for both word and legacy scoring.
    fn unit_mode(self) -> EvaluationMode {
        match self {
            Scoring::Mode(mode) => mode,
            Scoring::Legacy => EvaluationMode::Word,
        }
    }

    fn label(self) -> &'static str {
        match self {
            Scoring::Mode(mode) => mode.as_str(),
            Scoring::Legacy => "LEGACY",
        }
    }
}

/// Runs the loader, extractor, aligner, segmenter and scorer for one request
/// and assembles the result shape for its mode.
pub struct ModeDispatcher {
    loader: SignalLoader,
    extractor: FeatureExtractor,
    aligner: SequenceAligner,
    segmenter: UnitSegmenter,
    calculator: MetricCalculator,
    transcriber: Arc<dyn Transcriber>,
    references: Option<Arc<ReferenceStore>>,
    next_request: AtomicU64,
}

impl ModeDispatcher {
    /// Core pipeline without a transcriber or reference store.
    pub fn new(config: &EngineConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            loader: SignalLoader::new(config.features.sample_rate, config.loader),
            extractor: FeatureExtractor::new(config.features),
            aligner: SequenceAligner::new(&config.alignment),
            segmenter: UnitSegmenter::new(config.features),
            calculator: MetricCalculator::new(config.scoring),
            transcriber: Arc::new(NullTranscriber),
            references: None,
            next_request: AtomicU64::new(1),
        })
    }

    /// Pipeline with the transcriber and reference directory named in `config`.
    pub fn from_config(config: &EngineConfig) -> Result<Self> {
        let mut dispatcher =
            Self::new(config)?.with_transcriber(transcription::from_config(&config.transcriber));
        if let Some(directory) = config.reference.directory.as_ref() {
            let store = ReferenceStore::new(
                Arc::new(DirectoryReferenceSource::new(directory)),
                dispatcher.loader.clone(),
                std::time::Duration::from_secs(config.reference.cache_ttl_seconds),
            );
            dispatcher = dispatcher.with_reference_store(Arc::new(store));
        }
        Ok(dispatcher)
    }

    pub fn with_transcriber(mut self, transcriber: Arc<dyn Transcriber>) -> Self {
        self.transcriber = transcriber;
        self
    }

    pub fn with_reference_store(mut self, store: Arc<ReferenceStore>) -> Self {
        self.references = Some(store);
        self
    }

    pub fn loader(&self) -> &SignalLoader {
        &self.loader
    }

    pub fn evaluate(&self, request: EvaluationRequest) -> Result<EvaluationResult> {
        self.evaluate_with_cancel(request, &CancellationToken::new())
    }

    pub fn evaluate_with_cancel(
        &self,
        request: EvaluationRequest,
        token: &CancellationToken,
    ) -> Result<EvaluationResult> {
        let mode = request.mode;
        self.run(request, Scoring::Mode(mode), token)
    }

    /// Whole-utterance DTW scoring with a per-letter split of the reference.
    pub fn evaluate_legacy(&self, request: EvaluationRequest) -> Result<EvaluationResult> {
        self.run(request, Scoring::Legacy, &CancellationToken::new())
    }

    pub fn evaluate_legacy_with_cancel(
        &self,
        request: EvaluationRequest,
        token: &CancellationToken,
    ) -> Result<EvaluationResult> {
        self.run(request, Scoring::Legacy, token)
    }

    pub(crate) fn run(
        &self,
        request: EvaluationRequest,
        scoring: Scoring,
        token: &CancellationToken,
    ) -> Result<EvaluationResult> {
        let request_id = self.next_request.fetch_add(1, Ordering::Relaxed);
        let started = Instant::now();
        let mut tracker = StageTracker::new(request_id);
        match self.run_stages(request, scoring, token, &mut tracker) {
            Ok(result) => {
                info!(
                    request = request_id,
                    mode = scoring.label(),
                    overall_score = result.overall_score(),
                    units = result.unit_count(),
                    transcript = result.transcript.is_some(),
                    elapsed_ms = started.elapsed().as_millis() as u64,
                    "evaluation complete"
                );
                Ok(result)
            }
            Err(err) => {
                tracker.advance(PipelineStage::Failed(err.to_string()));
                info!(
                    request = request_id,
                    mode = scoring.label(),
                    error = %err,
                    "evaluation failed"
                );
                Err(err)
            }
        }
    }

    fn run_stages(
        &self,
        request: EvaluationRequest,
        scoring: Scoring,
        token: &CancellationToken,
        tracker: &mut StageTracker,
    ) -> Result<EvaluationResult> {
        validate_request(&request, scoring)?;
        token.check("loading audio")?;

        let EvaluationRequest {
            reference_text,
            reference,
            candidate,
            transcript,
            word_timings,
            ..
        } = request;
        let candidate_signal = self.loader.load(candidate, AudioRole::Candidate)?;
        let reference_signal = self.reference_signal(reference, &reference_text)?;
        token.check("feature extraction")?;

        let (reference_features, candidate_features) =
            self.extract_pair(&reference_signal, &candidate_signal)?;
        tracker.advance(PipelineStage::FeatureReady(FeatureSet::Reference));
        tracker.advance(PipelineStage::FeatureReady(FeatureSet::Both));
        token.check("alignment")?;

        let path = self.aligner.align(&reference_features, &candidate_features)?;
        tracker.advance(PipelineStage::Aligned);
        token.check("segmentation")?;

        let projections = self.segmenter.segment(
            &reference_text,
            scoring.unit_mode(),
            reference_features.frame_count(),
            &path,
            word_timings.as_deref(),
        )?;
        tracker.advance(PipelineStage::Segmented);
        token.check("scoring")?;

        let input = ScoringInput {
            reference: &reference_features,
            candidate: &candidate_features,
            path: &path,
            projections: &projections,
        };
        let outcome = match scoring {
            Scoring::Mode(EvaluationMode::Word) => Outcome::Word {
                word_result: self.calculator.word(&input),
            },
            Scoring::Mode(EvaluationMode::Sentence) => Outcome::Sentence {
                sentence_result: self.calculator.sentence(&input),
            },
            Scoring::Legacy => Outcome::Legacy(self.calculator.legacy(
                &input,
                &reference_signal,
                &candidate_signal,
            )),
        };
        tracker.advance(PipelineStage::Scored);
        token.check("assembly")?;

        let transcript = transcript.or_else(|| self.transcribe(&candidate_signal));
        let result = EvaluationResult::new(outcome).with_transcript(transcript);
        tracker.advance(PipelineStage::Assembled);
        Ok(result)
    }

    fn reference_signal(&self, reference: ReferenceAudio, text: &str) -> Result<Arc<AudioSignal>> {
        match reference {
            ReferenceAudio::Provided(input) => {
                Ok(Arc::new(self.loader.load(input, AudioRole::Reference)?))
            }
            ReferenceAudio::Signal(signal) => Ok(signal),
            ReferenceAudio::Fetch(voice) => match self.references.as_ref() {
                Some(store) => store.resolve(text, voice),
                None => Err(PronunciationError::reference_fetch(
                    "no reference source is configured",
                )),
            },
        }
    }

    /// Extracts both feature sequences, the reference on its own thread.
    fn extract_pair(
        &self,
        reference: &AudioSignal,
        candidate: &AudioSignal,
    ) -> Result<(FeatureSequence, FeatureSequence)> {
        thread::scope(|scope| {
            let spawned = thread::Builder::new()
                .name("extract-reference".to_string())
                .spawn_scoped(scope, || self.extractor.extract(reference, AudioRole::Reference));
            let candidate_features = self.extractor.extract(candidate, AudioRole::Candidate);
            let reference_features = match spawned {
                Ok(handle) => handle.join().unwrap_or_else(|_| {
                    Err(PronunciationError::feature(
                        AudioRole::Reference,
                        "extraction thread panicked",
                    ))
                }),
                Err(err) => {
                    warn!(error = %err, "could not spawn extraction thread; running inline");
                    self.extractor.extract(reference, AudioRole::Reference)
                }
            };
            Ok((reference_features?, candidate_features?))
        })
    }

    fn transcribe(&self, signal: &AudioSignal) -> Option<Transcript> {
        match self.transcriber.transcribe(signal) {
            Ok(transcript) => transcript,
            Err(err) => {
                warn!(
                    transcriber = self.transcriber.name(),
                    error = %format!("{err:#}"),
                    "transcription failed; omitting transcript"
                );
                None
            }
        }
    }
}

impl std::fmt::Debug for ModeDispatcher {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ModeDispatcher")
            .field("extractor", &self.extractor)
            .field("aligner", &self.aligner)
            .field("transcriber", &self.transcriber.name())
            .field("references", &self.references)
            .finish()
    }
}

/// Rejects structurally invalid requests before any audio is decoded.
fn validate_request(request: &EvaluationRequest, scoring: Scoring) -> Result<()> {
    if request.candidate.is_empty() {
        return Err(PronunciationError::input("learner audio is required"));
    }
    if let ReferenceAudio::Provided(input) = &request.reference {
        if input.is_empty() {
            return Err(PronunciationError::input("reference audio is empty"));
        }
    }
    let units = split_units(&request.reference_text, scoring.unit_mode())?;
    if let Some(timings) = &request.word_timings {
        if timings.len() != units.len() {
            return Err(PronunciationError::input(format!(
                "{} unit timings supplied for {} units",
                timings.len(),
                units.len()
            )));
        }
    }
    Ok(())
}
