mod common;

use approx::assert_relative_eq;
use common::{hello_segments, render, silence, wav_bytes, world_segments, SAMPLE_RATE};
use spoken_eval::config::EngineConfig;
use spoken_eval::pronunciation::result::{Outcome, SentenceResult, WordResult};
use spoken_eval::pronunciation::{
    EvaluationMode, EvaluationRequest, ModeDispatcher, PronunciationError, ReferenceAudio,
};
use spoken_eval::types::AudioInput;

fn wav_input(samples: &[f32]) -> AudioInput {
    AudioInput::new(wav_bytes(samples, SAMPLE_RATE)).with_format_hint("wav")
}

fn word(config: &EngineConfig, reference: &[f32], learner: &[f32]) -> WordResult {
    let request = EvaluationRequest::new(
        wav_input(learner),
        ReferenceAudio::Provided(wav_input(reference)),
    )
    .with_text("Hello");
    let result = ModeDispatcher::new(config)
        .expect("dispatcher")
        .evaluate(request)
        .expect("evaluate");
    match result.outcome {
        Outcome::Word { word_result } => word_result,
        other => panic!("expected a word result, got {other:?}"),
    }
}

fn sentence(config: &EngineConfig, reference: &[f32], learner: &[f32]) -> SentenceResult {
    let request = EvaluationRequest::new(
        wav_input(learner),
        ReferenceAudio::Provided(wav_input(reference)),
    )
    .with_text("Hello world")
    .with_mode(EvaluationMode::Sentence);
    let result = ModeDispatcher::new(config)
        .expect("dispatcher")
        .evaluate(request)
        .expect("evaluate");
    match result.outcome {
        Outcome::Sentence { sentence_result } => sentence_result,
        other => panic!("expected a sentence result, got {other:?}"),
    }
}

fn two_words(first: &[common::Segment], second: &[common::Segment]) -> Vec<f32> {
    let mut samples = render(first, 0.8);
    samples.extend(silence(0.25));
    samples.extend(render(second, 0.8));
    samples
}

#[test]
fn word_overall_follows_configured_weights() {
    let config = EngineConfig::from_json(
        r#"{"scoring": {"word_weights": {"mfcc": 1.0, "energy": 0.0, "pitch": 0.0}}}"#,
    )
    .expect("config");
    let reference = render(&hello_segments(), 0.8);
    let learner = render(&world_segments(), 0.5);
    let result = word(&config, &reference, &learner);
    assert_relative_eq!(result.overall_score, result.mfcc_score, epsilon = 1e-3);
}

#[test]
fn unit_scores_follow_configured_weights() {
    let config = EngineConfig::from_json(
        r#"{"scoring": {"unit_weights": {"mfcc": 0.0, "energy": 0.0, "duration": 1.0, "pitch": 0.0}}}"#,
    )
    .expect("config");
    let reference = render(&hello_segments(), 0.8);
    let learner = render(&world_segments(), 0.8);
    let result = word(&config, &reference, &learner);
    for character in &result.character_scores {
        assert_relative_eq!(character.score, character.metrics.duration, epsilon = 1e-3);
    }
}

#[test]
fn halving_loudness_halves_the_energy_term() {
    let config = EngineConfig::default();
    let loud = render(&hello_segments(), 0.8);
    let quiet = render(&hello_segments(), 0.4);

    let quieter = word(&config, &loud, &quiet);
    let louder = word(&config, &quiet, &loud);
    // 100 * exp(-ln 2)
    assert!((40.0..60.0).contains(&quieter.energy_score), "{}", quieter.energy_score);
    assert_relative_eq!(quieter.energy_score, louder.energy_score, epsilon = 2.0);
}

#[test]
fn sentence_overall_follows_configured_weights() {
    let config = EngineConfig::from_json(
        r#"{"scoring": {"sentence_weights": {"pronunciation": 0.0, "fluency": 1.0, "word_total": 0.0}}}"#,
    )
    .expect("config");
    let audio = two_words(&hello_segments(), &world_segments());
    let result = sentence(&config, &audio, &audio);
    assert_relative_eq!(result.overall_score, result.fluency_score, epsilon = 1e-3);
}

#[test]
fn tighter_mfcc_scale_never_recognizes_more_words() {
    let reference = two_words(&hello_segments(), &world_segments());
    let learner = two_words(&world_segments(), &hello_segments());

    let lenient = sentence(&EngineConfig::default(), &reference, &learner);
    let strict_config =
        EngineConfig::from_json(r#"{"scoring": {"scales": {"mfcc": 0.001}}}"#).expect("config");
    let strict = sentence(&strict_config, &reference, &learner);
    assert!(strict.word_total_score <= lenient.word_total_score);
    assert!(strict.pronunciation_score <= lenient.pronunciation_score);
}

#[test]
fn zero_weights_are_rejected_up_front() {
    let mut config = EngineConfig::default();
    config.scoring.word_weights.mfcc = 0.0;
    config.scoring.word_weights.energy = 0.0;
    config.scoring.word_weights.pitch = 0.0;
    let err = ModeDispatcher::new(&config).unwrap_err();
    assert!(matches!(err, PronunciationError::Config { .. }));
}
