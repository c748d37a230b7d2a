//! AI personality presets and instruction building.

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Personality {
    Facilitator,
    Expert,
    Brainstorm,
    Critic,
    Custom,
}

impl Personality {
    /// Unknown names fall back to the facilitator.
    pub fn parse(name: &str) -> Self {
        match name.trim().to_ascii_lowercase().as_str() {
            "expert" => Self::Expert,
            "brainstorm" => Self::Brainstorm,
            "critic" => Self::Critic,
            "custom" => Self::Custom,
            _ => Self::Facilitator,
        }
    }

    fn base_prompt(self) -> &'static str {
        match self {
            Self::Facilitator => {
                "You are a friendly facilitator in a group voice conversation. \
                 Keep the discussion moving, draw quieter people in, and summarize \
                 agreement when you hear it."
            }
            Self::Expert => {
                "You are a knowledgeable expert taking part in a group voice conversation. \
                 Give accurate, concrete answers and say so when you are unsure."
            }
            Self::Brainstorm => {
                "You are an energetic brainstorming partner in a group voice conversation. \
                 Build on ideas, offer unexpected angles, and keep criticism for later."
            }
            Self::Critic => {
                "You are a constructive critic in a group voice conversation. \
                 Point out weak assumptions and risks, and suggest how to address them."
            }
            Self::Custom => "You are an AI participant in a group voice conversation.",
        }
    }
}

/// Everything that shapes the AI's instructions for one room.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PersonaSettings {
    pub personality: Personality,
    pub topic: Option<String>,
    pub custom_instructions: Option<String>,
}

impl PersonaSettings {
    pub fn new(personality: &str, topic: Option<&str>, custom: Option<&str>) -> Self {
        let non_empty = |s: Option<&str>| s.map(str::trim).filter(|s| !s.is_empty()).map(String::from);
        Self {
            personality: Personality::parse(personality),
            topic: non_empty(topic),
            custom_instructions: non_empty(custom),
        }
    }

    /// Session-level instructions, naming the current speaker when known.
    pub fn session_instructions(&self, speaker: Option<&str>) -> String {
        let mut out = String::from(self.personality.base_prompt());
        out.push_str(" Keep spoken replies short: two or three sentences.");
        if let Some(topic) = &self.topic {
            out.push_str(&format!(" The room's topic is: {topic}."));
        }
        if let Some(custom) = &self.custom_instructions {
            out.push(' ');
            out.push_str(custom);
        }
        if let Some(name) = speaker {
            out.push_str(&format!(" You are currently being addressed by {name}."));
        }
        out
    }

    /// Per-response instructions restating persona, topic and who else is present.
    pub fn response_instructions(&self, speaker: &str, others: &[String]) -> String {
        let mut out = self.session_instructions(Some(speaker));
        if !others.is_empty() {
            out.push_str(&format!(
                " Other participants in the room: {}.",
                others.join(", ")
            ));
        }
        out.push_str(&format!(" Answer {speaker} directly."));
        out
    }
}
