use serde::{ Serialize, Deserialize };

#[derive(Serialize, Deserialize, Debug, PartialEq)]
#[serde(tag = "type")]
pub enum ClientMessage {
    #[serde(rename = "identify")] Identify {
        user_id: String,
    },
    /// `send` is true when the send button was pressed; otherwise the
    /// submission only counts when it has no line breaks. `input_generation`
    /// names the input widget the draft came from.
    #[serde(rename = "input")] Input {
        content: String,
        #[serde(default)]
        send: bool,
        input_generation: u64,
    },
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct TranscriptEntry {
    pub speaker: String,
    pub role: String,
    pub content: String,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(tag = "type")]
pub enum ServerMessage {
    #[serde(rename = "identify")] Identify {
        greeting: String,
    },
    #[serde(rename = "transcript")] Transcript {
        user_id: String,
        welcome: String,
        messages: Vec<TranscriptEntry>,
        input_generation: u64,
        thinking: bool,
        timestamp: i64,
    },
    #[serde(rename = "error")] Error {
        message: String,
    },
}
