//! AI turn-taking: the push-to-talk state machine and persona prompts.

mod controller;
mod personality;

pub use controller::{AiSession, Speaker, TurnController, TurnEffect, TurnSettings};
pub use personality::{PersonaSettings, Personality};
