use std::collections::HashMap;
use std::fmt::{Display, Formatter};
use std::fs;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

use anyhow::{bail, Context};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::types::AudioInput;

use super::loader::SignalLoader;
use super::{AudioRole, AudioSignal, PronunciationError, Result};

const REFERENCE_EXTENSIONS: [&str; 4] = ["wav", "mp3", "ogg", "flac"];

/// Which reference voice to fetch: `1` is variant A, `2` is variant B.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(try_from = "u8", into = "u8")]
pub enum VoiceVariant {
    A,
    #[default]
    B,
}

impl VoiceVariant {
    pub fn code(self) -> u8 {
        match self {
            VoiceVariant::A => 1,
            VoiceVariant::B => 2,
        }
    }

    pub fn from_code(code: u8) -> Result<Self> {
        match code {
            1 => Ok(VoiceVariant::A),
            2 => Ok(VoiceVariant::B),
            other => Err(PronunciationError::input(format!(
                "voice variant must be 1 or 2, got {other}"
            ))),
        }
    }
}

impl TryFrom<u8> for VoiceVariant {
    type Error = PronunciationError;

    fn try_from(code: u8) -> Result<Self> {
        Self::from_code(code)
    }
}

impl From<VoiceVariant> for u8 {
    fn from(voice: VoiceVariant) -> Self {
        voice.code()
    }
}

impl Display for VoiceVariant {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.code())
    }
}

impl FromStr for VoiceVariant {
    type Err = PronunciationError;

    fn from_str(value: &str) -> Result<Self> {
        let code = value.trim().parse::<u8>().map_err(|_| {
            PronunciationError::input(format!("voice variant must be 1 or 2, got \"{value}\""))
        })?;
        Self::from_code(code)
    }
}

/// Produces encoded reference audio for a text and voice.
pub trait ReferenceSource: Send + Sync {
    fn fetch(&self, text: &str, voice: VoiceVariant) -> anyhow::Result<AudioInput>;
}

/// Reads pre-rendered references laid out as `<root>/<voice>/<text>.<ext>`.
#[derive(Debug, Clone)]
pub struct DirectoryReferenceSource {
    root: PathBuf,
}

impl DirectoryReferenceSource {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn locate(&self, text: &str, voice: VoiceVariant) -> Option<PathBuf> {
        let dir = self.root.join(voice.code().to_string());
        let names = [text.to_string(), text.to_lowercase()];
        names.iter().find_map(|name| {
            REFERENCE_EXTENSIONS
                .iter()
                .map(|ext| dir.join(format!("{name}.{ext}")))
                .find(|path| path.is_file())
        })
    }
}

impl ReferenceSource for DirectoryReferenceSource {
    fn fetch(&self, text: &str, voice: VoiceVariant) -> anyhow::Result<AudioInput> {
        let text = text.trim();
        if text.is_empty() || text.contains(['/', '\\']) || text.contains("..") {
            bail!("\"{text}\" is not a valid reference name");
        }
        let Some(path) = self.locate(text, voice) else {
            bail!(
                "no reference recording for \"{text}\" (voice {voice}) under {}",
                self.root.display()
            );
        };
        let bytes = fs::read(&path)
            .with_context(|| format!("failed to read reference {}", path.display()))?;
        let mut input = AudioInput::new(bytes);
        if let Some(ext) = path.extension().and_then(|ext| ext.to_str()) {
            input = input.with_format_hint(ext);
        }
        Ok(input)
    }
}

struct CacheEntry {
    signal: Arc<AudioSignal>,
    stored_at: Instant,
}

/// Fetch-or-populate access to reference signals with a time-to-live cache.
pub struct ReferenceStore {
    source: Arc<dyn ReferenceSource>,
    loader: SignalLoader,
    ttl: Duration,
    entries: Mutex<HashMap<(String, VoiceVariant), CacheEntry>>,
}

impl ReferenceStore {
    pub fn new(source: Arc<dyn ReferenceSource>, loader: SignalLoader, ttl: Duration) -> Self {
        Self {
            source,
            loader,
            ttl,
            entries: Mutex::new(HashMap::new()),
        }
    }

    pub fn resolve(&self, text: &str, voice: VoiceVariant) -> Result<Arc<AudioSignal>> {
        let key = (text.trim().to_lowercase(), voice);
        if let Some(signal) = self.cached(&key) {
            debug!(text = %key.0, %voice, "reference cache hit");
            return Ok(signal);
        }

        let input = self
            .source
            .fetch(text.trim(), voice)
            .map_err(PronunciationError::reference_fetch)?;
        let signal = Arc::new(self.loader.load(input, AudioRole::Reference)?);
        info!(
            text = %key.0,
            %voice,
            seconds = signal.duration_seconds(),
            "reference fetched"
        );

        let mut entries = self.lock();
        let now = Instant::now();
        entries.retain(|_, entry| now.duration_since(entry.stored_at) < self.ttl);
        entries.insert(
            key,
            CacheEntry {
                signal: Arc::clone(&signal),
                stored_at: now,
            },
        );
        Ok(signal)
    }

    pub fn cached_len(&self) -> usize {
        self.lock().len()
    }

    pub fn clear(&self) {
        self.lock().clear();
    }

    fn cached(&self, key: &(String, VoiceVariant)) -> Option<Arc<AudioSignal>> {
        let mut entries = self.lock();
        match entries.get(key) {
            Some(entry) if entry.stored_at.elapsed() < self.ttl => Some(Arc::clone(&entry.signal)),
            Some(_) => {
                entries.remove(key);
                None
            }
            None => None,
        }
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<(String, VoiceVariant), CacheEntry>> {
        self.entries.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl std::fmt::Debug for ReferenceStore {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ReferenceStore")
            .field("ttl", &self.ttl)
            .field("cached", &self.cached_len())
            .finish()
    }
}
