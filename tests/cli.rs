mod common;

use std::fs;

use anyhow::Result;
use assert_cmd::Command;
use common::{hello_segments, render, write_wav};
use predicates::prelude::*;

fn pronunciation() -> Result<Command> {
    let mut cmd = Command::cargo_bin("pronunciation")?;
    cmd.env("DISABLE_WHISPER", "1").env_remove("RUST_LOG");
    Ok(cmd)
}

#[test]
fn evaluate_prints_a_word_result() -> Result<()> {
    let dir = tempfile::tempdir()?;
    let learner = dir.path().join("learner.wav");
    let reference = dir.path().join("reference.wav");
    write_wav(&learner, &render(&hello_segments(), 0.7));
    write_wav(&reference, &render(&hello_segments(), 0.8));

    pronunciation()?
        .args(["evaluate", "--learner"])
        .arg(&learner)
        .arg("--reference")
        .arg(&reference)
        .assert()
        .success()
        .stdout(predicate::str::contains("\"mode\":\"WORD\""))
        .stdout(predicate::str::contains("character_scores"));
    Ok(())
}

#[test]
fn evaluate_uses_the_reference_library() -> Result<()> {
    let dir = tempfile::tempdir()?;
    let library = dir.path().join("refs");
    fs::create_dir_all(library.join("1"))?;
    write_wav(&library.join("1").join("hello.wav"), &render(&hello_segments(), 0.8));
    let learner = dir.path().join("learner.wav");
    write_wav(&learner, &render(&hello_segments(), 0.8));

    pronunciation()?
        .args(["evaluate", "--mode", "legacy", "--voice", "1", "--learner"])
        .arg(&learner)
        .arg("--reference-dir")
        .arg(&library)
        .assert()
        .success()
        .stdout(predicate::str::contains("\"mode\":\"LEGACY\""))
        .stdout(predicate::str::contains("letter_scores"));
    Ok(())
}

#[test]
fn evaluate_without_a_reference_fails() -> Result<()> {
    let dir = tempfile::tempdir()?;
    let learner = dir.path().join("learner.wav");
    write_wav(&learner, &render(&hello_segments(), 0.8));

    pronunciation()?
        .args(["evaluate", "--learner"])
        .arg(&learner)
        .assert()
        .failure()
        .stderr(predicate::str::contains("--reference"));
    Ok(())
}

#[test]
fn evaluate_rejects_unknown_modes() -> Result<()> {
    pronunciation()?
        .args([
            "evaluate",
            "--learner",
            "a.wav",
            "--reference",
            "b.wav",
            "--mode",
            "paragraph",
        ])
        .assert()
        .failure();
    Ok(())
}

#[test]
fn stretch_writes_a_slower_recording() -> Result<()> {
    let dir = tempfile::tempdir()?;
    let input = dir.path().join("in.wav");
    let output = dir.path().join("out.wav");
    write_wav(&input, &render(&hello_segments(), 0.8));

    pronunciation()?
        .arg("stretch")
        .arg(&input)
        .arg(&output)
        .args(["--factor", "0.5"])
        .assert()
        .success();

    let reader = hound::WavReader::open(&output)?;
    let seconds = reader.duration() as f32 / reader.spec().sample_rate as f32;
    assert!(seconds > 1.5, "expected roughly two seconds, got {seconds}");
    Ok(())
}
