//! Subcommand definitions.

use clap::Subcommand;

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Run the TTS node; each stdin line is spoken as a `request/tts`
    Tts {
        /// Node name used in outgoing envelopes
        #[arg(long)]
        name: Option<String>,
    },
    /// Run the chat node; each stdin line is an utterance
    Chat {
        /// Node name used in outgoing envelopes
        #[arg(long)]
        name: Option<String>,
    },
    /// Run chat and TTS together; each stdin line is an utterance
    Run,
    /// Print the effective configuration as JSON
    Config,
}
