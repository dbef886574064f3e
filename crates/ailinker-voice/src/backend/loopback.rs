//! Offline TTS backend.
//!
//! Produces 16-bit silence whose duration is proportional to the length of
//! the submitted text, delivered through the same result-record protocol a
//! network backend uses. Useful for running the node without credentials
//! and for exercising the framing path end to end.

use std::collections::VecDeque;

use ailinker_core::{
    AudioFormat, LoopbackConfig, OperationType, SynthesisPhase, TtsConnection, TtsPortError,
    TtsResultRecord,
};

/// Bytes per sample of the generated PCM.
const BYTES_PER_SAMPLE: usize = 2;

/// Silent-PCM TTS connection.
#[derive(Debug)]
pub struct LoopbackTts {
    config: LoopbackConfig,
    audio: AudioFormat,
    connected: bool,
    voice_type: Option<String>,
    operation: OperationType,
    results: VecDeque<TtsResultRecord>,
}

impl LoopbackTts {
    #[must_use]
    pub fn new(config: LoopbackConfig, audio: AudioFormat) -> Self {
        Self {
            config,
            audio,
            connected: false,
            voice_type: None,
            operation: OperationType::default(),
            results: VecDeque::new(),
        }
    }

    /// Voice selected for subsequent submissions.
    #[must_use]
    pub fn voice_type(&self) -> Option<&str> {
        self.voice_type.as_deref()
    }

    /// Bytes of PCM produced for `text`.
    #[must_use]
    pub fn audio_len(&self, text: &str) -> usize {
        let chars = text.chars().count();
        let samples_per_ms = self.audio.samplerate as usize / 1000;
        chars
            * self.config.ms_per_char as usize
            * samples_per_ms
            * BYTES_PER_SAMPLE
            * usize::from(self.audio.channels.max(1))
    }
}

impl TtsConnection for LoopbackTts {
    fn launch(&mut self) -> Result<(), TtsPortError> {
        if self.audio.samplerate < 1000 {
            return Err(TtsPortError::Launch(format!(
                "samplerate {} Hz is below 1 kHz",
                self.audio.samplerate
            )));
        }
        self.connected = true;
        tracing::info!(
            samplerate = self.audio.samplerate,
            channels = self.audio.channels,
            "Loopback TTS ready"
        );
        Ok(())
    }

    fn execute(&mut self, text: &str) -> Result<(), TtsPortError> {
        if !self.connected {
            return Err(TtsPortError::Submit("loopback connection is closed".into()));
        }

        let total = self.audio_len(text);
        self.results
            .push_back(TtsResultRecord::synthesis(SynthesisPhase::Started, Vec::new()));

        match self.operation {
            OperationType::Query => {
                self.results
                    .push_back(TtsResultRecord::synthesis(SynthesisPhase::Complete, vec![0; total]));
            }
            OperationType::Submit => {
                let chunk = self.config.chunk_bytes.max(1);
                let mut remaining = total;
                while remaining > chunk {
                    self.results
                        .push_back(TtsResultRecord::synthesis(SynthesisPhase::Audio, vec![0; chunk]));
                    remaining -= chunk;
                }
                self.results.push_back(TtsResultRecord::synthesis(
                    SynthesisPhase::Complete,
                    vec![0; remaining],
                ));
            }
        }
        tracing::debug!(
            chars = text.chars().count(),
            bytes = total,
            voice = self.voice_type.as_deref().unwrap_or("default"),
            "Loopback synthesis queued"
        );
        Ok(())
    }

    fn get_result(&mut self) -> Option<TtsResultRecord> {
        self.results.pop_front()
    }

    fn auto_connect(&mut self) {
        self.connected = true;
        self.results.push_back(TtsResultRecord::connected());
    }

    fn connect_close(&mut self) {
        if self.connected {
            tracing::debug!("Loopback TTS closed");
        }
        self.connected = false;
        self.results.clear();
    }

    fn set_voice_type(&mut self, voice_type: &str) {
        self.voice_type = Some(voice_type.to_string());
    }

    fn set_operation_type(&mut self, operation: OperationType) {
        self.operation = operation;
    }
}
