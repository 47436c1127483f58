use serde::{Deserialize, Serialize};
use tracing::warn;

/// Transcript speaker
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Participant {
    User,
    Agent,
}

impl Participant {
    /// Map a wire `sender` value
    pub fn from_sender(sender: &str) -> Self {
        match sender {
            "human" | "user" => Participant::User,
            "bot" | "agent" => Participant::Agent,
            other => {
                warn!("Unknown transcript sender '{}', attributing to agent", other);
                Participant::Agent
            }
        }
    }
}

/// One utterance in the live transcript
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TranscriptEntry {
    pub speaker: Participant,
    pub text: String,
}

/// Merges partial fragments into a growing transcript.
///
/// Only the last entry is ever modified, so earlier entries never change
/// once a different speaker has taken a turn.
#[derive(Debug, Default)]
pub struct TranscriptAggregator {
    entries: Vec<TranscriptEntry>,
}

impl TranscriptAggregator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, speaker: Participant, text: &str) {
        match self.entries.last_mut() {
            Some(last) if last.speaker == speaker => {
                last.text.push(' ');
                last.text.push_str(text);
            }
            _ => self.entries.push(TranscriptEntry {
                speaker,
                text: text.to_string(),
            }),
        }
    }

    pub fn entries(&self) -> &[TranscriptEntry] {
        &self.entries
    }

    pub fn snapshot(&self) -> Vec<TranscriptEntry> {
        self.entries.clone()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(speaker: Participant, text: &str) -> TranscriptEntry {
        TranscriptEntry {
            speaker,
            text: text.to_string(),
        }
    }

    #[test]
    fn test_merges_consecutive_fragments() {
        let mut transcript = TranscriptAggregator::new();
        transcript.push(Participant::User, "hi");
        transcript.push(Participant::User, "there");
        transcript.push(Participant::Agent, "hello");

        assert_eq!(
            transcript.entries(),
            &[
                entry(Participant::User, "hi there"),
                entry(Participant::Agent, "hello"),
            ]
        );
    }

    #[test]
    fn test_never_merges_non_adjacent_turns() {
        let mut transcript = TranscriptAggregator::new();
        transcript.push(Participant::User, "one");
        transcript.push(Participant::Agent, "two");
        transcript.push(Participant::User, "three");

        assert_eq!(transcript.len(), 3);
        assert_eq!(transcript.entries()[0], entry(Participant::User, "one"));
        assert_eq!(transcript.entries()[2], entry(Participant::User, "three"));
    }

    #[test]
    fn test_empty_fragment_still_joins() {
        let mut transcript = TranscriptAggregator::new();
        transcript.push(Participant::Agent, "okay");
        transcript.push(Participant::Agent, "");
        assert_eq!(transcript.entries(), &[entry(Participant::Agent, "okay ")]);
    }

    #[test]
    fn test_repeated_words_kept() {
        let mut transcript = TranscriptAggregator::new();
        transcript.push(Participant::User, "no");
        transcript.push(Participant::User, "no");
        assert_eq!(transcript.entries(), &[entry(Participant::User, "no no")]);
    }

    #[test]
    fn test_sender_mapping() {
        assert_eq!(Participant::from_sender("human"), Participant::User);
        assert_eq!(Participant::from_sender("user"), Participant::User);
        assert_eq!(Participant::from_sender("bot"), Participant::Agent);
        assert_eq!(Participant::from_sender("agent"), Participant::Agent);
        assert_eq!(Participant::from_sender("narrator"), Participant::Agent);
    }
}
